//! LoRaWAN-side wire values and codecs.

use log::warn;

/// Regional band plan selected with `AT+BAND`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Eu433 = 0,
    Cn470 = 1,
    Ru864 = 2,
    In865 = 3,
    Eu868 = 4,
    Us915 = 5,
    Au915 = 6,
    Kr920 = 7,
    As923 = 8,
    As923_2 = 9,
    As923_3 = 10,
    As923_4 = 11,
}

impl Band {
    pub(crate) const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Band::Eu433),
            1 => Some(Band::Cn470),
            2 => Some(Band::Ru864),
            3 => Some(Band::In865),
            4 => Some(Band::Eu868),
            5 => Some(Band::Us915),
            6 => Some(Band::Au915),
            7 => Some(Band::Kr920),
            8 => Some(Band::As923),
            9 => Some(Band::As923_2),
            10 => Some(Band::As923_3),
            11 => Some(Band::As923_4),
            _ => None,
        }
    }

    /// Whether the band uses a channel-mask sub-band (`AT+MASK`).
    pub(crate) const fn uses_sub_band(self) -> bool {
        matches!(self, Band::Us915 | Band::Au915 | Band::Cn470)
    }

    /// Highest sub-band number the plan defines.
    pub(crate) const fn sub_band_count(self) -> u8 {
        match self {
            Band::Cn470 => 12,
            Band::Us915 | Band::Au915 => 8,
            _ => 0,
        }
    }
}

/// Device class selected with `AT+CLASS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    A,
    B,
    C,
}

impl DeviceClass {
    pub(crate) const fn letter(self) -> char {
        match self {
            DeviceClass::A => 'A',
            DeviceClass::B => 'B',
            DeviceClass::C => 'C',
        }
    }

    pub(crate) fn from_letter(value: &str) -> Option<Self> {
        match value.as_bytes().first() {
            Some(b'A' | b'a') => Some(DeviceClass::A),
            Some(b'B' | b'b') => Some(DeviceClass::B),
            Some(b'C' | b'c') => Some(DeviceClass::C),
            _ => None,
        }
    }
}

/// Activation scheme selected with `AT+NJM`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    Abp = 0,
    Otaa = 1,
}

impl JoinMode {
    pub(crate) const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(JoinMode::Abp),
            1 => Some(JoinMode::Otaa),
            _ => None,
        }
    }
}

/// Data rate index (`AT+DR`, `AT+RX2DR`).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRate {
    Dr0 = 0,
    Dr1 = 1,
    Dr2 = 2,
    Dr3 = 3,
    Dr4 = 4,
    Dr5 = 5,
    Dr6 = 6,
    Dr7 = 7,
}

impl DataRate {
    pub(crate) const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DataRate::Dr0),
            1 => Some(DataRate::Dr1),
            2 => Some(DataRate::Dr2),
            3 => Some(DataRate::Dr3),
            4 => Some(DataRate::Dr4),
            5 => Some(DataRate::Dr5),
            6 => Some(DataRate::Dr6),
            7 => Some(DataRate::Dr7),
            _ => None,
        }
    }
}

/// Channel sub-band for the wide 915/470 MHz plans (`AT+MASK`).
///
/// Rendered as a four-digit uppercase hex channel mask: `All` clears the
/// mask, band *n* sets bit *n − 1*.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubBand {
    All = 0,
    B1 = 1,
    B2 = 2,
    B3 = 3,
    B4 = 4,
    B5 = 5,
    B6 = 6,
    B7 = 7,
    B8 = 8,
    B9 = 9,
    B10 = 10,
    B11 = 11,
    B12 = 12,
}

impl SubBand {
    /// Sub-band number, 0 meaning all channels.
    pub(crate) const fn number(self) -> u8 {
        self as u8
    }

    /// The channel mask written on the wire.
    pub const fn mask(self) -> u16 {
        match self {
            SubBand::All => 0,
            _ => 1 << (self as u16 - 1),
        }
    }

    /// Recovers a sub-band from a wire mask.
    pub const fn from_mask(mask: u16) -> Option<Self> {
        if mask == 0 {
            return Some(SubBand::All);
        }
        if !mask.is_power_of_two() {
            return None;
        }
        match mask.trailing_zeros() {
            0 => Some(SubBand::B1),
            1 => Some(SubBand::B2),
            2 => Some(SubBand::B3),
            3 => Some(SubBand::B4),
            4 => Some(SubBand::B5),
            5 => Some(SubBand::B6),
            6 => Some(SubBand::B7),
            7 => Some(SubBand::B8),
            8 => Some(SubBand::B9),
            9 => Some(SubBand::B10),
            10 => Some(SubBand::B11),
            11 => Some(SubBand::B12),
            _ => None,
        }
    }
}

/// Maps a requested ERP in dBm to the regional `AT+TXP` index.
///
/// Only the 868 and 915 MHz families have defined curves; other plans fall
/// back to index 0 with a warning.
pub(crate) fn tx_power_index(band: Band, dbm: u8) -> u8 {
    match band {
        Band::Eu868 => {
            if dbm >= 16 {
                0
            } else if dbm < 2 {
                10
            } else {
                (16 - dbm) / 2
            }
        }
        Band::Us915 | Band::Au915 => {
            if dbm >= 30 {
                0
            } else if dbm < 10 {
                10
            } else {
                (30 - dbm) / 2
            }
        }
        _ => {
            warn!("no tx power table for {band:?}, using index 0");
            0
        }
    }
}

/// Class restriction for multicast groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McClass {
    B,
    C,
}

impl McClass {
    pub(crate) const fn letter(self) -> char {
        match self {
            McClass::B => 'B',
            McClass::C => 'C',
        }
    }
}

/// A multicast group descriptor (`AT+ADDMULC`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MulticastGroup {
    /// Receiving class of the group session.
    pub class: McClass,
    /// Multicast device address.
    pub dev_addr: [u8; 4],
    /// Multicast network session key.
    pub nwk_s_key: [u8; 16],
    /// Multicast application session key.
    pub app_s_key: [u8; 16],
    /// Downlink frequency in Hz.
    pub frequency: u32,
    /// Downlink data rate.
    pub data_rate: DataRate,
    /// Class-B ping periodicity (0..=7), ignored for class C.
    pub periodicity: u8,
}
