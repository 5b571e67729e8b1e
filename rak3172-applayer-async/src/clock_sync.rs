//! LoRaWAN application-layer clock synchronization.
//!
//! Speaks the clock-sync package protocol: the device uplinks an
//! `AppTimeReq` carrying a 4-bit token and receives the GPS-epoch time in
//! the matching `AppTimeAns`. Tokens tie answers to requests; a stale
//! answer is discarded and the wait continues.

use chrono::{DateTime, Utc};
use embassy_time::{Duration, Instant};
use embedded_io_async::Write;
use log::{debug, warn};
use rak3172_async::at::lorawan::MulticastGroup;
use rak3172_async::conf::TransmitOptions;
use rak3172_async::{Error, Rak3172};

use crate::multicast;

/// Default clock-sync application port.
pub const DEFAULT_PORT: u8 = 202;

/// Seconds between the GPS epoch (1980-01-06) and the Unix epoch.
const GPS_TO_UNIX_OFFSET: i64 = 315_964_800;
/// Package identifier reported in version answers.
const PACKAGE_IDENTIFIER: u8 = 1;

const PACKAGE_VERSION_CMD: u8 = 0x00;
const APP_TIME_CMD: u8 = 0x01;
const PERIODICITY_CMD: u8 = 0x02;

/// Clock-sync package state: port, version and the request token.
///
/// The token lives here rather than in any global so every session tracks
/// its own request/answer pairing.
pub struct ClockSync {
    port: u8,
    package_version: u8,
    token: u8,
}

impl ClockSync {
    /// Creates a package instance on the given port.
    pub const fn new(port: u8, package_version: u8) -> Self {
        Self {
            port,
            package_version,
            token: 0,
        }
    }

    /// The token the next request will carry.
    pub fn token(&self) -> u8 {
        self.token
    }

    /// Requests the network time and converts the answer to UTC.
    ///
    /// With a multicast `group` the device temporarily switches to class C
    /// and registers the group so the answer can arrive on the shared
    /// session; class and group set are restored before returning. Answers
    /// carrying a stale token are discarded and the wait continues. When
    /// `ans_required` is false a silent network is not an error and `None`
    /// comes back.
    ///
    /// # Arguments
    ///
    /// * `radio` - A joined LoRaWAN session.
    /// * `ans_required` - Ask the server to always answer; a missing answer
    ///   then fails the call.
    /// * `group` - Optional multicast group to receive the answer on.
    /// * `timeout` - How long to wait for the answer.
    pub async fn sync_time<W: Write>(
        &mut self,
        radio: &mut Rak3172<'_, W>,
        ans_required: bool,
        group: Option<&MulticastGroup>,
        timeout: Duration,
    ) -> Result<Option<DateTime<Utc>>, Error<W::Error>> {
        let prior = multicast::enter(radio, group).await?;
        let result = self.exchange_time(radio, ans_required, timeout).await;
        multicast::restore(radio, group, prior).await;
        result
    }

    async fn exchange_time<W: Write>(
        &mut self,
        radio: &mut Rak3172<'_, W>,
        ans_required: bool,
        timeout: Duration,
    ) -> Result<Option<DateTime<Utc>>, Error<W::Error>> {
        let token = self.token & 0x0F;
        let param = ((ans_required as u8) << 4) | token;
        // DeviceTime is sent as zero; only the server's absolute time is
        // of interest.
        let request = [APP_TIME_CMD, 0, 0, 0, 0, param];
        radio
            .transmit(self.port, &request, &TransmitOptions::default())
            .await?;
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let message = match radio.receive(deadline - now).await {
                Ok(message) => message,
                Err(Error::Timeout) => break,
                Err(err) => return Err(err),
            };
            if message.port != self.port {
                debug!("ignoring downlink on port {}", message.port);
                continue;
            }
            if let Some(gps_seconds) = parse_app_time_ans(&message.payload, token) {
                self.token = (token + 1) % 16;
                let unix = gps_seconds as i64 + GPS_TO_UNIX_OFFSET;
                let datetime =
                    DateTime::from_timestamp(unix, 0).ok_or(Error::InvalidResponse)?;
                return Ok(Some(datetime));
            }
        }
        if ans_required {
            warn!("no time answer within {} s", timeout.as_secs());
            Err(Error::CommandFailed)
        } else {
            Ok(None)
        }
    }

    /// Uplinks the package identity in answer to a version request.
    pub async fn respond_package_version<W: Write>(
        &mut self,
        radio: &mut Rak3172<'_, W>,
    ) -> Result<(), Error<W::Error>> {
        let answer = [PACKAGE_VERSION_CMD, PACKAGE_IDENTIFIER, self.package_version];
        radio
            .transmit(self.port, &answer, &TransmitOptions::default())
            .await
    }

    /// Waits for a forced-resync request from the server.
    ///
    /// Returns the requested number of `AppTimeReq` transmissions, or
    /// `None` when no request arrives within the timeout.
    pub async fn is_force_resync<W: Write>(
        &mut self,
        radio: &mut Rak3172<'_, W>,
        group: Option<&MulticastGroup>,
        timeout: Duration,
    ) -> Result<Option<u8>, Error<W::Error>> {
        let prior = multicast::enter(radio, group).await?;
        let result = self.wait_force_resync(radio, timeout).await;
        multicast::restore(radio, group, prior).await;
        result
    }

    async fn wait_force_resync<W: Write>(
        &mut self,
        radio: &mut Rak3172<'_, W>,
        timeout: Duration,
    ) -> Result<Option<u8>, Error<W::Error>> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let message = match radio.receive(deadline - now).await {
                Ok(message) => message,
                Err(Error::Timeout) => return Ok(None),
                Err(err) => return Err(err),
            };
            if message.port != self.port {
                continue;
            }
            // A lone version request has no parameter byte and is not a
            // resync order.
            if message.payload.first() == Some(&PACKAGE_VERSION_CMD) && message.payload.len() >= 2
            {
                return Ok(Some(message.payload[1] & 0x07));
            }
            debug!("ignoring clock-sync downlink while waiting for resync");
        }
    }

    /// Handles a periodicity request from the server.
    ///
    /// Waits for the request, answers it with the given device time and
    /// support flag, and returns the requested period nibble. `None` means
    /// no request arrived within the timeout.
    ///
    /// # Arguments
    ///
    /// * `radio` - A joined LoRaWAN session.
    /// * `device_time` - Current device time, GPS seconds.
    /// * `not_supported` - Report that periodic resync is not supported.
    /// * `timeout` - How long to wait for the request.
    pub async fn handle_periodicity<W: Write>(
        &mut self,
        radio: &mut Rak3172<'_, W>,
        device_time: u32,
        not_supported: bool,
        timeout: Duration,
    ) -> Result<Option<u8>, Error<W::Error>> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let message = match radio.receive(deadline - now).await {
                Ok(message) => message,
                Err(Error::Timeout) => return Ok(None),
                Err(err) => return Err(err),
            };
            if message.port != self.port
                || message.payload.first() != Some(&PERIODICITY_CMD)
                || message.payload.len() < 2
            {
                continue;
            }
            let period = message.payload[1] & 0x0F;
            let time = device_time.to_be_bytes();
            let answer = [
                PERIODICITY_CMD,
                time[0],
                time[1],
                time[2],
                time[3],
                not_supported as u8,
            ];
            radio
                .transmit(self.port, &answer, &TransmitOptions::default())
                .await?;
            return Ok(Some(period));
        }
    }
}

impl Default for ClockSync {
    fn default() -> Self {
        Self::new(DEFAULT_PORT, 1)
    }
}

/// Extracts the GPS time from an `AppTimeAns`, or `None` when the answer is
/// malformed or carries the wrong token.
fn parse_app_time_ans(payload: &[u8], token: u8) -> Option<u32> {
    if payload.len() < 6 || payload[0] != APP_TIME_CMD {
        debug!("not a time answer, ignoring");
        return None;
    }
    let token_ans = payload[5] & 0x0F;
    if token_ans != token {
        debug!("discarding stale time answer (token {token_ans}, expected {token})");
        return None;
    }
    Some(u32::from_le_bytes([
        payload[1], payload[2], payload[3], payload[4],
    ]))
}
