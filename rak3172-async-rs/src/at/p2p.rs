//! P2P-side wire values (`AT+P2P` family).

use crate::at::Dialect;

/// Lowest carrier frequency the module accepts, in Hz.
pub const MIN_FREQUENCY: u32 = 150_000_000;
/// Highest carrier frequency the module accepts, in Hz.
pub const MAX_FREQUENCY: u32 = 960_000_000;

/// Spreading factor (`AT+PSF`). SF5 exists on current firmware only.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadingFactor {
    Sf5 = 5,
    Sf6 = 6,
    Sf7 = 7,
    Sf8 = 8,
    Sf9 = 9,
    Sf10 = 10,
    Sf11 = 11,
    Sf12 = 12,
}

impl SpreadingFactor {
    pub(crate) const fn from_u8(value: u8) -> Option<Self> {
        match value {
            5 => Some(SpreadingFactor::Sf5),
            6 => Some(SpreadingFactor::Sf6),
            7 => Some(SpreadingFactor::Sf7),
            8 => Some(SpreadingFactor::Sf8),
            9 => Some(SpreadingFactor::Sf9),
            10 => Some(SpreadingFactor::Sf10),
            11 => Some(SpreadingFactor::Sf11),
            12 => Some(SpreadingFactor::Sf12),
            _ => None,
        }
    }
}

/// Signal bandwidth (`AT+PBW`).
///
/// Legacy firmware numbers these as codes 0..2, current firmware takes the
/// width in kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    Khz125,
    Khz250,
    Khz500,
}

impl Bandwidth {
    pub(crate) const fn code(self, dialect: Dialect) -> u16 {
        match dialect {
            Dialect::Legacy => match self {
                Bandwidth::Khz125 => 0,
                Bandwidth::Khz250 => 1,
                Bandwidth::Khz500 => 2,
            },
            Dialect::Rui3 => match self {
                Bandwidth::Khz125 => 125,
                Bandwidth::Khz250 => 250,
                Bandwidth::Khz500 => 500,
            },
        }
    }

    pub(crate) const fn from_code(dialect: Dialect, code: u16) -> Option<Self> {
        match (dialect, code) {
            (Dialect::Legacy, 0) | (Dialect::Rui3, 125) => Some(Bandwidth::Khz125),
            (Dialect::Legacy, 1) | (Dialect::Rui3, 250) => Some(Bandwidth::Khz250),
            (Dialect::Legacy, 2) | (Dialect::Rui3, 500) => Some(Bandwidth::Khz500),
            _ => None,
        }
    }
}

/// Coding rate (`AT+PCR`), written as indexes 0..=3 for 4/5..=4/8.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingRate {
    Cr4_5 = 0,
    Cr4_6 = 1,
    Cr4_7 = 2,
    Cr4_8 = 3,
}

impl CodingRate {
    pub(crate) const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CodingRate::Cr4_5),
            1 => Some(CodingRate::Cr4_6),
            2 => Some(CodingRate::Cr4_7),
            3 => Some(CodingRate::Cr4_8),
            _ => None,
        }
    }
}

/// Complete P2P modem setup written with `AT+P2P`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct P2pConfig {
    /// Carrier frequency in Hz.
    pub frequency: u32,
    /// Spreading factor.
    pub spreading_factor: SpreadingFactor,
    /// Signal bandwidth.
    pub bandwidth: Bandwidth,
    /// Coding rate.
    pub coding_rate: CodingRate,
    /// Preamble length in symbols (2..=65535).
    pub preamble_length: u16,
    /// Transmit power in dBm (5..=22).
    pub tx_power_dbm: u8,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            frequency: 868_000_000,
            spreading_factor: SpreadingFactor::Sf7,
            bandwidth: Bandwidth::Khz125,
            coding_rate: CodingRate::Cr4_5,
            preamble_length: 8,
            tx_power_dbm: 14,
        }
    }
}

/// Receive window argument of `AT+PRECV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenWindow {
    /// Open the window for the given number of milliseconds (1..=65533).
    Millis(u16),
    /// Stay listening with no deadline until one packet arrives.
    UntilFirst,
    /// Listen continuously, delivering every packet.
    Continuous,
}

impl ListenWindow {
    /// Wire encoding. 0 stops listening and is not a valid window, 65534 and
    /// 65535 are the continuous and until-first markers.
    pub(crate) const fn code(self) -> Option<u16> {
        match self {
            ListenWindow::Millis(0) => None,
            ListenWindow::Millis(ms) if ms > 65533 => None,
            ListenWindow::Millis(ms) => Some(ms),
            ListenWindow::UntilFirst => Some(65535),
            ListenWindow::Continuous => Some(65534),
        }
    }

    /// Whether the window closes itself after the first packet.
    pub(crate) const fn is_single_shot(self) -> bool {
        !matches!(self, ListenWindow::Continuous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_windows_encode_their_markers() {
        assert_eq!(ListenWindow::Millis(1).code(), Some(1));
        assert_eq!(ListenWindow::Millis(65533).code(), Some(65533));
        assert_eq!(ListenWindow::UntilFirst.code(), Some(65535));
        assert_eq!(ListenWindow::Continuous.code(), Some(65534));
    }

    #[test]
    fn reserved_window_values_do_not_encode() {
        assert_eq!(ListenWindow::Millis(0).code(), None);
        assert_eq!(ListenWindow::Millis(65534).code(), None);
        assert_eq!(ListenWindow::Millis(65535).code(), None);
    }

    #[test]
    fn only_continuous_windows_stay_open() {
        assert!(ListenWindow::Millis(500).is_single_shot());
        assert!(ListenWindow::UntilFirst.is_single_shot());
        assert!(!ListenWindow::Continuous.is_single_shot());
    }

    #[test]
    fn bandwidth_codes_differ_by_dialect() {
        assert_eq!(Bandwidth::Khz125.code(Dialect::Legacy), 0);
        assert_eq!(Bandwidth::Khz500.code(Dialect::Legacy), 2);
        assert_eq!(Bandwidth::Khz125.code(Dialect::Rui3), 125);
        assert_eq!(Bandwidth::Khz500.code(Dialect::Rui3), 500);
        for bandwidth in [Bandwidth::Khz125, Bandwidth::Khz250, Bandwidth::Khz500] {
            for dialect in [Dialect::Legacy, Dialect::Rui3] {
                assert_eq!(
                    Bandwidth::from_code(dialect, bandwidth.code(dialect)),
                    Some(bandwidth)
                );
            }
        }
        assert_eq!(Bandwidth::from_code(Dialect::Legacy, 125), None);
        assert_eq!(Bandwidth::from_code(Dialect::Rui3, 0), None);
    }
}
