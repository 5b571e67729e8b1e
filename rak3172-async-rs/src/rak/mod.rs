//! The session handle and the shared command channel.

use core::fmt::{self, Write as _};

use embassy_time::{with_timeout, Duration, Timer};
use embedded_hal::digital::OutputPin;
use embedded_io_async::{Read, Write};
use heapless::String;
use log::{debug, trace, warn};

use crate::at::lorawan::Band;
use crate::at::{BaudRate, Dialect, WorkingMode};
use crate::conf::{Config, SerialReconfigure};
use crate::state::{ResponseLine, State};

pub mod err;
mod ingress;
mod lorawan;
mod p2p;

pub use err::Error;
pub use ingress::Ingress;
pub use p2p::ListenPump;

/// Identity block read from the module during `init`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleInfo {
    /// Firmware version (`AT+VER`).
    pub firmware_version: String<32>,
    /// Hardware model (`AT+HWMODEL`).
    pub hardware_model: String<32>,
    /// Serial number (`AT+SN`).
    pub serial_number: String<32>,
}

/// The command-side handle of a module session.
///
/// Owns the UART transmit half. All AT exchanges run through it, one at a
/// time; unsolicited traffic is handled by the paired [`Ingress`] task.
pub struct Rak3172<'a, W> {
    tx: W,
    shared: &'a State,
    config: Config,
    band: Option<Band>,
    info: Option<ModuleInfo>,
}

/// Opens a module session over a split UART.
///
/// Returns the command handle and the reader; spawn [`Ingress::run`] before
/// issuing commands, or no reply will ever be seen.
///
/// # Arguments
///
/// * `state` - The shared session state, typically a `static`.
/// * `uart_tx` - The UART transmit half connected to the module.
/// * `uart_rx` - The UART receive half connected to the module.
/// * `config` - Link configuration, including the firmware dialect.
pub fn split<'a, W: Write, R: Read>(
    state: &'a State,
    uart_tx: W,
    uart_rx: R,
    config: Config,
) -> (Rak3172<'a, W>, Ingress<'a, R>) {
    (
        Rak3172 {
            tx: uart_tx,
            shared: state,
            config,
            band: None,
            info: None,
        },
        Ingress::new(uart_rx, state, config.dialect),
    )
}

impl<'a, W: Write> Rak3172<'a, W> {
    /// Probes the module and loads its current working mode and identity.
    ///
    /// The mode reported by `AT+NWM` becomes the session's view of the
    /// module; when the query fails the P2P power-on default is assumed.
    pub async fn init(&mut self) -> Result<(), Error<W::Error>> {
        let mut last = Error::Timeout;
        let mut ready = false;
        for _ in 0..3 {
            match self.command("AT").await {
                Ok(()) => {
                    ready = true;
                    break;
                }
                Err(err) => {
                    debug!("module probe failed: {err:?}");
                    last = err;
                }
            }
        }
        if !ready {
            return Err(last);
        }
        match self.query("AT+NWM=?").await {
            Ok(line) => match parse_num::<u8>(&line).and_then(WorkingMode::from_u8) {
                Some(mode) => self.shared.set_mode(mode),
                None => warn!("unexpected AT+NWM reply: {line}"),
            },
            Err(err) => warn!("could not read working mode, assuming P2P: {err:?}"),
        }
        if self.shared.mode() == WorkingMode::Lorawan && self.refresh_joined().await.is_err() {
            warn!("could not read network join status");
        }
        if self.read_module_info().await.is_err() {
            debug!("module identity not available");
        }
        Ok(())
    }

    /// The current working mode as seen by the driver.
    pub fn mode(&self) -> WorkingMode {
        self.shared.mode()
    }

    /// Whether a command or confirmed transfer is in flight.
    pub fn is_busy(&self) -> bool {
        self.shared.is_busy()
    }

    /// Whether the LoRaWAN session is joined.
    pub fn is_joined(&self) -> bool {
        self.shared.is_joined()
    }

    /// Whether the last confirmed uplink went unacknowledged.
    pub fn confirm_error(&self) -> bool {
        self.shared.confirm_error()
    }

    /// Whether a P2P receive window is currently open.
    pub fn is_listening(&self) -> bool {
        !self.shared.rx_timeout()
    }

    /// The identity block read during `init`, if the module answered.
    pub fn module_info(&self) -> Option<&ModuleInfo> {
        self.info.as_ref()
    }

    /// Switches the radio stack with `AT+NWM` and waits out the reboot
    /// splash screen. Clears the joined and busy flags.
    pub async fn set_mode(&mut self, mode: WorkingMode) -> Result<(), Error<W::Error>> {
        let cmd: String<16> =
            fmt_cmd(format_args!("AT+NWM={}", mode as u8)).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await?;
        self.drain_splash().await;
        self.shared.set_mode(mode);
        self.shared.set_joined(false);
        self.shared.set_busy(false);
        Ok(())
    }

    /// Soft-resets the module with `ATZ` and waits out the boot banner.
    pub async fn reset(&mut self) -> Result<(), Error<W::Error>> {
        if self.shared.is_busy() {
            return Err(Error::Busy);
        }
        self.shared.reset_responses();
        // ATZ reboots without a status line.
        self.write_line("ATZ").await?;
        self.drain_splash().await;
        self.shared.set_joined(false);
        self.shared.set_busy(false);
        Ok(())
    }

    /// Pulses the module's active-low reset line and waits out the boot
    /// banner.
    pub async fn hardware_reset<RST: OutputPin>(
        &mut self,
        reset: &mut RST,
    ) -> Result<(), Error<W::Error>> {
        reset.set_low().map_err(|_| Error::Pin)?;
        Timer::after(Duration::from_millis(100)).await;
        reset.set_high().map_err(|_| Error::Pin)?;
        self.shared.reset_responses();
        self.drain_splash().await;
        self.shared.set_joined(false);
        self.shared.set_busy(false);
        Ok(())
    }

    /// Moves the link to a new baud rate.
    ///
    /// The module is retuned first, then the host UART through `uart`. When
    /// the host side cannot follow, the previous host rate is restored and
    /// the call fails; the module keeps the new rate and needs a reset.
    pub async fn set_baud_rate<U: SerialReconfigure>(
        &mut self,
        uart: &mut U,
        baud: BaudRate,
    ) -> Result<(), Error<W::Error>> {
        let cmd: String<20> =
            fmt_cmd(format_args!("AT+BAUD={}", baud.bps())).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await?;
        if let Err(err) = uart.set_baud_rate(baud).await {
            warn!("host UART rejected {} baud: {err:?}", baud.bps());
            if let Err(err) = uart.set_baud_rate(self.config.baud).await {
                warn!("baud rollback failed: {err:?}");
            }
            return Err(Error::InvalidState);
        }
        self.config.baud = baud;
        Ok(())
    }

    /// Reads the module-side baud rate.
    pub async fn baud_rate(&mut self) -> Result<BaudRate, Error<W::Error>> {
        let line = self.query("AT+BAUD=?").await?;
        parse_num::<u32>(&line)
            .and_then(BaudRate::from_bps)
            .ok_or(Error::InvalidResponse)
    }

    /// Puts the module to sleep for the given time.
    pub async fn sleep(&mut self, duration: Duration) -> Result<(), Error<W::Error>> {
        let cmd: String<24> = fmt_cmd(format_args!("AT+SLEEP={}", duration.as_millis()))
            .map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Queries version, hardware model and serial number.
    pub async fn read_module_info(&mut self) -> Result<ModuleInfo, Error<W::Error>> {
        let firmware_version = self.query("AT+VER=?").await?;
        let hardware_model = self.query("AT+HWMODEL=?").await?;
        let serial_number = self.query("AT+SN=?").await?;
        let info = ModuleInfo {
            firmware_version: trimmed(&firmware_version),
            hardware_model: trimmed(&hardware_model),
            serial_number: trimmed(&serial_number),
        };
        self.info = Some(info.clone());
        Ok(info)
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn shared(&self) -> &'a State {
        self.shared
    }

    pub(crate) fn cached_band(&self) -> Option<Band> {
        self.band
    }

    pub(crate) fn cache_band(&mut self, band: Band) {
        self.band = Some(band);
    }

    /// Issues a command expecting a bare status reply.
    pub(crate) async fn command(&mut self, cmd: &str) -> Result<(), Error<W::Error>> {
        self.exchange(cmd, false, true).await.map(|_| ())
    }

    /// Issues a stop-class command past the busy gate.
    pub(crate) async fn command_unchecked(&mut self, cmd: &str) -> Result<(), Error<W::Error>> {
        self.exchange(cmd, false, false).await.map(|_| ())
    }

    /// Issues a query expecting a value line before the status.
    pub(crate) async fn query(&mut self, cmd: &str) -> Result<ResponseLine, Error<W::Error>> {
        match self.exchange(cmd, true, true).await? {
            Some(value) => Ok(value),
            None => Err(Error::InvalidResponse),
        }
    }

    /// One full command exchange.
    ///
    /// Flushes stale response lines, writes the command, optionally pops the
    /// value line and finally maps the status line. In the legacy dialect a
    /// blank line precedes the status and is discarded here.
    async fn exchange(
        &mut self,
        cmd: &str,
        expect_value: bool,
        gate_busy: bool,
    ) -> Result<Option<ResponseLine>, Error<W::Error>> {
        if gate_busy && self.shared.is_busy() {
            return Err(Error::Busy);
        }
        self.shared.reset_responses();
        self.write_line(cmd).await?;
        let value = if expect_value {
            let line = self.next_response().await?;
            Some(strip_echo(&line, self.config.dialect))
        } else {
            None
        };
        let mut status = self.next_response().await?;
        if self.config.dialect == Dialect::Legacy && status.is_empty() {
            status = self.next_response().await?;
        }
        map_status(&status).map(|()| value)
    }

    pub(crate) async fn write_line(&mut self, cmd: &str) -> Result<(), Error<W::Error>> {
        trace!("> {cmd}");
        self.tx.write_all(cmd.as_bytes()).await.map_err(Error::Serial)?;
        self.tx.write_all(b"\r\n").await.map_err(Error::Serial)?;
        self.tx.flush().await.map_err(Error::Serial)
    }

    pub(crate) async fn next_response(&mut self) -> Result<ResponseLine, Error<W::Error>> {
        with_timeout(self.config.command_timeout, self.shared.responses.receive())
            .await
            .map_err(|_| Error::Timeout)
    }

    /// Swallows reboot output until the line goes quiet for a settle period.
    pub(crate) async fn drain_splash(&mut self) {
        while let Ok(line) =
            with_timeout(self.config.settle_timeout, self.shared.responses.receive()).await
        {
            trace!("splash: {line}");
        }
    }
}

fn strip_echo(line: &ResponseLine, dialect: Dialect) -> ResponseLine {
    if dialect == Dialect::Rui3 {
        if let Some(pos) = line.find('=') {
            return trimmed(&line[pos + 1..]);
        }
    }
    line.clone()
}

fn map_status<TSERR>(status: &str) -> Result<(), Error<TSERR>> {
    let status = status.trim();
    if status == "OK" || status.starts_with("OK ") {
        return Ok(());
    }
    if status.contains("AT_BUSY_ERROR") {
        return Err(Error::Busy);
    }
    if status.contains("Restricted") {
        return Err(Error::Restricted);
    }
    warn!("command failed: {status}");
    Err(Error::CommandFailed)
}

/// Renders a command into a fixed-capacity line.
pub(crate) fn fmt_cmd<const N: usize>(args: fmt::Arguments<'_>) -> Result<String<N>, ()> {
    let mut out = String::new();
    out.write_fmt(args).map_err(|_| ())?;
    Ok(out)
}

/// Parses a trimmed numeric reply.
pub(crate) fn parse_num<T: core::str::FromStr>(line: &str) -> Option<T> {
    line.trim().parse().ok()
}

/// Parses a 0/1 flag reply.
pub(crate) fn parse_flag(line: &str) -> Option<bool> {
    match line.trim() {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

fn trimmed<const N: usize>(line: &str) -> String<N> {
    let mut out = String::new();
    for ch in line.trim().chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}
