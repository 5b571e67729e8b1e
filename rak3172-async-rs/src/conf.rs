//! Wrappers for link and session configuration parameters.

use embassy_time::Duration;

use crate::at::lorawan::{Band, DeviceClass, SubBand};
use crate::at::{BaudRate, Dialect};

/// Configuration of the serial session itself.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// AT dialect the module firmware speaks. Never auto-detected.
    pub dialect: Dialect,
    /// Baud rate the host UART is currently running at.
    pub baud: BaudRate,
    /// How long a command exchange waits for each reply line.
    pub command_timeout: Duration,
    /// Quiet period after which a reboot splash screen counts as finished.
    pub settle_timeout: Duration,
    /// Upper bound on waiting for a confirmed-uplink outcome.
    pub confirm_timeout: Duration,
    /// Poll period of the blocking join and confirmed-send loops.
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: Dialect::Rui3,
            baud: BaudRate::B115200,
            command_timeout: Duration::from_millis(500),
            settle_timeout: Duration::from_millis(500),
            confirm_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(20),
        }
    }
}

/// Network activation credentials.
///
/// Key material is binary; the driver renders it as hex on the wire.
#[derive(Clone, Copy)]
pub enum Activation {
    /// Over-the-air activation (`AT+NJM=1`).
    Otaa {
        dev_eui: [u8; 8],
        app_eui: [u8; 8],
        app_key: [u8; 16],
    },
    /// Activation by personalization (`AT+NJM=0`).
    Abp {
        dev_addr: [u8; 4],
        nwk_s_key: [u8; 16],
        app_s_key: [u8; 16],
    },
}

/// Parameters used to bring up the LoRaWAN session.
#[derive(Clone, Copy)]
pub struct LorawanConfig {
    /// OTAA or ABP credentials.
    pub activation: Activation,
    /// Device class to operate in.
    pub class: DeviceClass,
    /// Regional band plan.
    pub band: Band,
    /// Channel sub-band, required by the wide 915/470 MHz plans.
    pub sub_band: Option<SubBand>,
    /// Requested transmit power in dBm ERP, mapped to a regional index.
    pub tx_power_dbm: u8,
    /// Whether to enable adaptive data rate.
    pub adr: bool,
}

/// Parameters of a join request.
#[derive(Debug, Clone, Copy)]
pub struct JoinOptions {
    /// Join retries the module should perform on its own.
    pub attempts: u8,
    /// Whether the module should re-join automatically after resets.
    pub auto_join: bool,
    /// Seconds between module-side join retries. The firmware rejects
    /// anything below 7.
    pub interval_s: u16,
    /// Overall deadline of the blocking join loop.
    pub timeout: Duration,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            attempts: 5,
            auto_join: false,
            interval_s: 10,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Parameters of an uplink transmission.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransmitOptions {
    /// Request a network confirmation for this uplink.
    pub confirmed: bool,
    /// Module-side retransmissions for confirmed uplinks (0..=7).
    pub retries: u8,
}

/// Serial links able to change their bit rate at runtime.
///
/// Implemented by the application for its UART pair so the driver can retune
/// the host side after `AT+BAUD` and fall back to the previous rate when the
/// new one cannot be applied.
#[allow(async_fn_in_trait)]
pub trait SerialReconfigure {
    /// Transport error produced by reconfiguration.
    type Error: core::fmt::Debug;

    /// Applies `baud` to the host UART.
    async fn set_baud_rate(&mut self, baud: BaudRate) -> Result<(), Self::Error>;
}
