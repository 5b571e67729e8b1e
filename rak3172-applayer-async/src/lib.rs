//! LoRaWAN application-layer packages on top of `rak3172_async`.
//!
//! Implements the clock-synchronization package (port 202) and the
//! fragmented data block transport used for firmware updates (port 201).
//! Both exchange hex-encoded command payloads over the driver's uplink and
//! downlink paths and never touch the serial line themselves.
//!
//! # Usage
//!
//! ```no_run
//! use embassy_time::Duration;
//! use embedded_io_async::Write;
//! use rak3172_applayer_async::ClockSync;
//! use rak3172_async::Rak3172;
//!
//! async fn sync<W: Write>(radio: &mut Rak3172<'_, W>) {
//!     let mut clock = ClockSync::default();
//!     match clock.sync_time(radio, true, None, Duration::from_secs(30)).await {
//!         Ok(Some(now)) => log::info!("network time: {now}"),
//!         Ok(None) => {}
//!         Err(err) => log::warn!("clock sync failed: {err:?}"),
//!     }
//! }
//! ```

#![no_std]

pub mod clock_sync;
pub mod fuota;
mod multicast;

pub use clock_sync::ClockSync;
pub use fuota::{FragmentStorage, Fuota, SliceStorage};
