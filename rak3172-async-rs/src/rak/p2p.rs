//! P2P radio configuration, transmit and the listening subsystem.

use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Instant, Timer};
use embedded_io_async::Write;
use heapless::String;
use log::{debug, warn};

use super::err::Error;
use super::{fmt_cmd, parse_num, Rak3172};
use crate::at::hex;
use crate::at::p2p::{
    Bandwidth, CodingRate, ListenWindow, P2pConfig, SpreadingFactor, MAX_FREQUENCY, MIN_FREQUENCY,
};
use crate::at::{Dialect, WorkingMode};
use crate::state::{ReceivedMessage, State};

/// Longest P2P payload `AT+PSEND` accepts.
const MAX_P2P_PAYLOAD: usize = 500;

/// Forwards packets from the parser into the listen queue.
///
/// Returned by [`Rak3172::listen`]; run it as its own task for the lifetime
/// of the receive window. It ends on [`Rak3172::stop_listen`] or, for
/// single-shot windows, after the first packet.
pub struct ListenPump<'a> {
    shared: &'a State,
}

impl<'a> ListenPump<'a> {
    /// Pumps parsed packets until the window closes.
    pub async fn run(&mut self) {
        loop {
            match select(self.shared.listen_stop.wait(), self.shared.p2p_rx.receive()).await {
                Either::First(()) => return,
                Either::Second(message) => {
                    self.shared.push_listen(message);
                    if self.shared.is_single_shot() {
                        debug!("single-shot window closed by first packet");
                        self.shared.set_rx_timeout(true);
                        self.shared.set_busy(false);
                        self.shared.set_listening(false);
                        return;
                    }
                }
            }
        }
    }
}

impl<'a, W: Write> Rak3172<'a, W> {
    /// Programs the whole P2P radio profile (`AT+P2P`).
    pub async fn configure_p2p(&mut self, config: &P2pConfig) -> Result<(), Error<W::Error>> {
        self.require_p2p()?;
        validate_p2p(config, self.config().dialect)?;
        let cmd: String<48> = fmt_cmd(format_args!(
            "AT+P2P={}:{}:{}:{}:{}:{}",
            config.frequency,
            config.spreading_factor as u8,
            config.bandwidth.code(self.config().dialect),
            config.coding_rate as u8,
            config.preamble_length,
            config.tx_power_dbm
        ))
        .map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Sets the P2P carrier frequency in Hz (`AT+PFREQ`).
    pub async fn set_p2p_frequency(&mut self, hz: u32) -> Result<(), Error<W::Error>> {
        self.require_p2p()?;
        if !(MIN_FREQUENCY..=MAX_FREQUENCY).contains(&hz) {
            return Err(Error::InvalidArgument);
        }
        let cmd: String<24> = fmt_cmd(format_args!("AT+PFREQ={hz}")).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the P2P carrier frequency in Hz.
    pub async fn p2p_frequency(&mut self) -> Result<u32, Error<W::Error>> {
        self.require_p2p()?;
        let line = self.query("AT+PFREQ=?").await?;
        parse_num(&line).ok_or(Error::InvalidResponse)
    }

    /// Sets the P2P spreading factor (`AT+PSF`).
    pub async fn set_spreading_factor(
        &mut self,
        sf: SpreadingFactor,
    ) -> Result<(), Error<W::Error>> {
        self.require_p2p()?;
        if sf == SpreadingFactor::Sf5 && self.config().dialect == Dialect::Legacy {
            return Err(Error::InvalidArgument);
        }
        let cmd: String<16> =
            fmt_cmd(format_args!("AT+PSF={}", sf as u8)).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the P2P spreading factor.
    pub async fn spreading_factor(&mut self) -> Result<SpreadingFactor, Error<W::Error>> {
        self.require_p2p()?;
        let line = self.query("AT+PSF=?").await?;
        parse_num::<u8>(&line)
            .and_then(SpreadingFactor::from_u8)
            .ok_or(Error::InvalidResponse)
    }

    /// Sets the P2P bandwidth (`AT+PBW`). The wire code depends on the
    /// dialect: legacy firmware takes an index, RUI3 takes kHz.
    pub async fn set_bandwidth(&mut self, bandwidth: Bandwidth) -> Result<(), Error<W::Error>> {
        self.require_p2p()?;
        let cmd: String<16> = fmt_cmd(format_args!(
            "AT+PBW={}",
            bandwidth.code(self.config().dialect)
        ))
        .map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the P2P bandwidth.
    pub async fn bandwidth(&mut self) -> Result<Bandwidth, Error<W::Error>> {
        self.require_p2p()?;
        let line = self.query("AT+PBW=?").await?;
        parse_num::<u16>(&line)
            .and_then(|code| Bandwidth::from_code(self.config().dialect, code))
            .ok_or(Error::InvalidResponse)
    }

    /// Sets the P2P coding rate (`AT+PCR`).
    pub async fn set_coding_rate(&mut self, cr: CodingRate) -> Result<(), Error<W::Error>> {
        self.require_p2p()?;
        let cmd: String<16> =
            fmt_cmd(format_args!("AT+PCR={}", cr as u8)).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the P2P coding rate.
    pub async fn coding_rate(&mut self) -> Result<CodingRate, Error<W::Error>> {
        self.require_p2p()?;
        let line = self.query("AT+PCR=?").await?;
        parse_num::<u8>(&line)
            .and_then(CodingRate::from_u8)
            .ok_or(Error::InvalidResponse)
    }

    /// Sets the P2P preamble length (`AT+PPL`, at least 2 symbols).
    pub async fn set_preamble_length(&mut self, symbols: u16) -> Result<(), Error<W::Error>> {
        self.require_p2p()?;
        if symbols < 2 {
            return Err(Error::InvalidArgument);
        }
        let cmd: String<16> =
            fmt_cmd(format_args!("AT+PPL={symbols}")).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the P2P preamble length.
    pub async fn preamble_length(&mut self) -> Result<u16, Error<W::Error>> {
        self.require_p2p()?;
        let line = self.query("AT+PPL=?").await?;
        parse_num(&line).ok_or(Error::InvalidResponse)
    }

    /// Sets the P2P transmit power in dBm (`AT+PTP`, 5..=22).
    pub async fn set_p2p_tx_power(&mut self, dbm: u8) -> Result<(), Error<W::Error>> {
        self.require_p2p()?;
        if !(5..=22).contains(&dbm) {
            return Err(Error::InvalidArgument);
        }
        let cmd: String<16> = fmt_cmd(format_args!("AT+PTP={dbm}")).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the P2P transmit power in dBm.
    pub async fn p2p_tx_power(&mut self) -> Result<u8, Error<W::Error>> {
        self.require_p2p()?;
        let line = self.query("AT+PTP=?").await?;
        parse_num(&line).ok_or(Error::InvalidResponse)
    }

    /// Enables or disables P2P payload encryption (`AT+ENCRY`).
    pub async fn set_p2p_encryption(&mut self, enabled: bool) -> Result<(), Error<W::Error>> {
        self.require_p2p()?;
        let cmd: String<16> =
            fmt_cmd(format_args!("AT+ENCRY={}", enabled as u8)).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Loads the P2P encryption key (`AT+ENCKEY`).
    pub async fn set_p2p_encryption_key(&mut self, key: &[u8; 8]) -> Result<(), Error<W::Error>> {
        self.require_p2p()?;
        let mut cmd: String<32> = String::new();
        cmd.push_str("AT+ENCKEY=").map_err(|_| Error::NoMemory)?;
        hex::push_hex(&mut cmd, key).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Transmits a P2P payload (`AT+PSEND`).
    pub async fn p2p_send(&mut self, payload: &[u8]) -> Result<(), Error<W::Error>> {
        self.require_p2p()?;
        if payload.is_empty() || payload.len() > MAX_P2P_PAYLOAD {
            return Err(Error::InvalidArgument);
        }
        let mut cmd: String<1024> = String::new();
        cmd.push_str("AT+PSEND=").map_err(|_| Error::NoMemory)?;
        hex::push_hex(&mut cmd, payload).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Opens a receive window and hands back the pump that feeds the listen
    /// queue.
    ///
    /// Spawn [`ListenPump::run`] as its own task. Packets are then popped
    /// with [`Rak3172::listen_pop`]; close the window with
    /// [`Rak3172::stop_listen`]. Single-shot windows close themselves after
    /// the first packet or on the module's timeout event.
    pub async fn listen(&mut self, window: ListenWindow) -> Result<ListenPump<'a>, Error<W::Error>> {
        self.require_p2p()?;
        if self.shared().is_listening() {
            return Err(Error::InvalidState);
        }
        let code = window.code().ok_or(Error::InvalidArgument)?;
        let cmd: String<16> = fmt_cmd(format_args!("AT+PRECV={code}")).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await?;
        self.shared().drain_p2p();
        self.shared().listen_stop.reset();
        self.shared().set_rx_timeout(false);
        self.shared().set_single_shot(window.is_single_shot());
        self.shared().set_listening(true);
        if window.is_single_shot() {
            self.shared().set_busy(true);
        }
        Ok(ListenPump {
            shared: self.shared(),
        })
    }

    /// Pops a packet from the listen queue without waiting.
    pub fn listen_pop(&mut self) -> Option<ReceivedMessage> {
        self.shared().listen.try_receive().ok()
    }

    /// Closes the receive window.
    ///
    /// Stops the pump, issues `AT+PRECV=0` and drops any queued packets.
    /// Calling this on a session that is not listening does nothing.
    pub async fn stop_listen(&mut self) -> Result<(), Error<W::Error>> {
        self.require_p2p()?;
        if !self.shared().is_listening() {
            return Ok(());
        }
        self.shared().set_listening(false);
        self.shared().listen_stop.signal(());
        self.command_unchecked("AT+PRECV=0").await?;
        self.shared().set_rx_timeout(true);
        self.shared().set_busy(false);
        self.shared().drain_p2p();
        Ok(())
    }

    /// One-shot receive: opens a timed window and waits for the first
    /// packet.
    ///
    /// # Arguments
    ///
    /// * `timeout_ms` - Window length in milliseconds, 1..=65533.
    pub async fn p2p_receive(&mut self, timeout_ms: u16) -> Result<ReceivedMessage, Error<W::Error>> {
        self.require_p2p()?;
        if self.shared().is_listening() {
            return Err(Error::InvalidState);
        }
        let code = ListenWindow::Millis(timeout_ms)
            .code()
            .ok_or(Error::InvalidArgument)?;
        self.shared().drain_p2p();
        self.shared().set_rx_timeout(false);
        let cmd: String<16> = fmt_cmd(format_args!("AT+PRECV={code}")).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await?;
        // Leave slack past the module's own timeout before giving up on the
        // event.
        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64 + 1000);
        loop {
            if let Ok(message) = self.shared().p2p_rx.try_receive() {
                return Ok(message);
            }
            if self.shared().rx_timeout() {
                return Err(Error::Timeout);
            }
            if Instant::now() >= deadline {
                warn!("receive window produced no timeout event");
                self.shared().set_rx_timeout(true);
                return Err(Error::Timeout);
            }
            Timer::after(self.config().poll_interval).await;
        }
    }

    pub(crate) fn require_p2p(&self) -> Result<(), Error<W::Error>> {
        match self.shared().mode() {
            WorkingMode::P2p | WorkingMode::P2pFsk => Ok(()),
            WorkingMode::Lorawan => Err(Error::InvalidMode),
        }
    }
}

fn validate_p2p<TSERR>(config: &P2pConfig, dialect: Dialect) -> Result<(), Error<TSERR>> {
    if !(MIN_FREQUENCY..=MAX_FREQUENCY).contains(&config.frequency) {
        return Err(Error::InvalidArgument);
    }
    if config.preamble_length < 2 {
        return Err(Error::InvalidArgument);
    }
    if !(5..=22).contains(&config.tx_power_dbm) {
        return Err(Error::InvalidArgument);
    }
    if config.spreading_factor == SpreadingFactor::Sf5 && dialect == Dialect::Legacy {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}
