//! An asynchronous, `no_std` host-side driver for RAKwireless RAK3172 and other
//! RUI3-class LoRa/LoRaWAN modules driven over a UART AT-command link.
//!
//! The driver is split into two halves sharing one [`State`]: a [`Rak3172`]
//! handle owning the UART transmit side and carrying every command, and an
//! [`Ingress`] reader owning the receive side. `Ingress::run` assembles lines,
//! tells unsolicited `+EVT:` traffic apart from command responses, and routes
//! both; the application spawns it as its own task. All queues are bounded and
//! every blocking operation takes an explicit timeout.
//!
//! Two firmware dialects exist in the field and differ in framing details
//! (response echo, blank status lines, receive-event layout, delay units).
//! The dialect is part of [`conf::Config`] and is never auto-detected.
//!
//! # Usage
//!
//! ```no_run
//! use embassy_futures::join::join;
//! use embedded_io_async::{Read, Write};
//! use rak3172_async::at::lorawan::{Band, DeviceClass};
//! use rak3172_async::conf::{Activation, Config, JoinOptions, LorawanConfig, TransmitOptions};
//! use rak3172_async::{split, State};
//!
//! async fn run_radio<W: Write, R: Read>(state: &'static State, uart_tx: W, uart_rx: R) {
//!     let (mut radio, mut ingress) = split(state, uart_tx, uart_rx, Config::default());
//!     // `ingress.run()` normally lives in its own spawned task.
//!     let _ = join(ingress.run(), async {
//!         radio.init().await?;
//!         radio
//!             .lorawan_init(&LorawanConfig {
//!                 activation: Activation::Otaa {
//!                     dev_eui: [0x00; 8],
//!                     app_eui: [0x00; 8],
//!                     app_key: [0x00; 16],
//!                 },
//!                 class: DeviceClass::A,
//!                 band: Band::Eu868,
//!                 sub_band: None,
//!                 tx_power_dbm: 16,
//!                 adr: true,
//!             })
//!             .await?;
//!         radio.join(&JoinOptions::default()).await?;
//!         radio.transmit(2, b"hello", &TransmitOptions::default()).await
//!     })
//!     .await;
//! }
//! ```

#![no_std]

pub mod at;
pub mod conf;
pub mod state;

mod rak;
pub use rak::*;

pub use state::{ReceivedMessage, RxWindow, State};
