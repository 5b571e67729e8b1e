//! LoRaWAN session layer: activation, join, uplinks, downlinks and the
//! parameter catalog.

use embassy_time::{with_timeout, Duration, Instant, Timer};
use embedded_io_async::Write;
use heapless::{String, Vec};
use log::{debug, warn};

use super::err::Error;
use super::{fmt_cmd, parse_flag, parse_num, strip_echo, Rak3172};
use crate::at::hex;
use crate::at::lorawan::{
    tx_power_index, Band, DataRate, DeviceClass, JoinMode, McClass, MulticastGroup, SubBand,
};
use crate::at::{Dialect, WorkingMode};
use crate::conf::{Activation, JoinOptions, LorawanConfig, TransmitOptions};
use crate::state::{ReceivedMessage, MAX_PAYLOAD_LEN};

/// Payloads above this length go out with `AT+LPSEND`.
const LONG_PAYLOAD_THRESHOLD: usize = 500;

impl<'a, W: Write> Rak3172<'a, W> {
    /// Brings up the LoRaWAN stack and programs the whole session.
    ///
    /// Enters LoRaWAN mode, aborts any join left over from a previous run,
    /// refreshes the joined flag, then writes class, ADR, band, sub-band
    /// where the plan has one, TX power and join mode before loading the
    /// activation keys.
    ///
    /// # Arguments
    ///
    /// * `config` - Session parameters including the activation keys.
    pub async fn lorawan_init(&mut self, config: &LorawanConfig) -> Result<(), Error<W::Error>> {
        if self.shared().mode() != WorkingMode::Lorawan {
            self.set_mode(WorkingMode::Lorawan).await?;
        }
        self.stop_join().await?;
        self.refresh_joined().await?;
        self.set_class(config.class).await?;
        self.set_adr(config.adr).await?;
        self.set_band(config.band).await?;
        if let Some(sub_band) = config.sub_band {
            if config.band.uses_sub_band() {
                self.set_sub_band(sub_band).await?;
            } else {
                warn!("{:?} has no sub-bands, ignoring {sub_band:?}", config.band);
            }
        }
        self.set_tx_power(config.tx_power_dbm).await?;
        match config.activation {
            Activation::Otaa {
                dev_eui,
                app_eui,
                app_key,
            } => {
                self.set_join_mode(JoinMode::Otaa).await?;
                self.set_otaa_keys(&dev_eui, &app_eui, &app_key).await?;
            }
            Activation::Abp {
                dev_addr,
                nwk_s_key,
                app_s_key,
            } => {
                self.set_join_mode(JoinMode::Abp).await?;
                self.set_abp_keys(&dev_addr, &nwk_s_key, &app_s_key).await?;
            }
        }
        Ok(())
    }

    /// Writes the OTAA identity (`AT+DEVEUI`, `AT+APPEUI`, `AT+APPKEY`).
    pub async fn set_otaa_keys(
        &mut self,
        dev_eui: &[u8; 8],
        app_eui: &[u8; 8],
        app_key: &[u8; 16],
    ) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        let cmd: String<48> = key_command("AT+DEVEUI=", dev_eui).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await?;
        let cmd: String<48> = key_command("AT+APPEUI=", app_eui).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await?;
        let cmd: String<48> = key_command("AT+APPKEY=", app_key).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Writes the ABP session (`AT+APPSKEY`, `AT+NWKSKEY`, `AT+DEVADDR`).
    pub async fn set_abp_keys(
        &mut self,
        dev_addr: &[u8; 4],
        nwk_s_key: &[u8; 16],
        app_s_key: &[u8; 16],
    ) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        let cmd: String<48> = key_command("AT+APPSKEY=", app_s_key).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await?;
        let cmd: String<48> = key_command("AT+NWKSKEY=", nwk_s_key).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await?;
        let cmd: String<48> = key_command("AT+DEVADDR=", dev_addr).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Starts a join attempt without waiting for the result.
    ///
    /// Already-joined sessions return without touching the wire. The join
    /// outcome arrives through the event stream; watch [`Rak3172::is_joined`]
    /// or use [`Rak3172::join`] to block.
    pub async fn start_join(&mut self, options: &JoinOptions) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        if self.shared().is_joined() {
            return Ok(());
        }
        let cmd = join_command::<W::Error>(options)?;
        self.command(&cmd).await?;
        self.arm_join(options);
        Ok(())
    }

    /// Joins the network, blocking until the module reports a result.
    ///
    /// Polls the join outcome every [`crate::conf::Config::poll_interval`].
    /// In the legacy dialect each failure event reissues the join command
    /// until the attempt budget runs out. A timeout aborts the join.
    ///
    /// # Arguments
    ///
    /// * `options` - Attempt budget, retry interval and overall timeout.
    pub async fn join(&mut self, options: &JoinOptions) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        if self.shared().is_joined() {
            return Ok(());
        }
        let cmd = join_command::<W::Error>(options)?;
        self.command(&cmd).await?;
        self.arm_join(options);
        let deadline = Instant::now() + options.timeout;
        loop {
            Timer::after(self.config().poll_interval).await;
            if self.shared().take_join_event() {
                if self.shared().is_joined() {
                    return Ok(());
                }
                let left = self.shared().join_attempts_left();
                if left == 0 {
                    return Err(Error::CommandFailed);
                }
                if self.config().dialect == Dialect::Legacy {
                    debug!("join failed, reissuing ({left} attempts left)");
                    self.shared().set_busy(false);
                    self.command(&cmd).await?;
                    self.shared().set_busy(true);
                }
            }
            if Instant::now() >= deadline {
                warn!("join timed out");
                let _ = self.stop_join().await;
                return Err(Error::Timeout);
            }
        }
    }

    /// Aborts an in-flight join and clears the busy flag.
    pub async fn stop_join(&mut self) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        self.command_unchecked("AT+JOIN=0:0:10:0").await?;
        self.shared().set_busy(false);
        Ok(())
    }

    /// Re-reads the network join status (`AT+NJS`).
    pub async fn refresh_joined(&mut self) -> Result<bool, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+NJS=?").await?;
        let joined = parse_flag(&line).ok_or(Error::InvalidResponse)?;
        self.shared().set_joined(joined);
        Ok(joined)
    }

    /// Sends an uplink.
    ///
    /// Payloads up to 500 bytes go out with `AT+SEND` after programming the
    /// confirmation register; longer ones use `AT+LPSEND` with the confirmed
    /// flag inline. A confirmed transmit blocks until the module reports the
    /// acknowledgement outcome; a missing acknowledgement surfaces as
    /// [`Error::InvalidResponse`].
    ///
    /// # Arguments
    ///
    /// * `port` - Application port, 1..=233.
    /// * `payload` - Up to 1000 bytes of payload.
    /// * `options` - Confirmation mode and retry budget.
    pub async fn transmit(
        &mut self,
        port: u8,
        payload: &[u8],
        options: &TransmitOptions,
    ) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        if !self.shared().is_joined() {
            return Err(Error::NotJoined);
        }
        if !(1..=233).contains(&port) {
            return Err(Error::WrongPort);
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::InvalidArgument);
        }
        if options.retries > 7 {
            return Err(Error::InvalidArgument);
        }
        self.shared().set_confirm_error(false);
        if options.confirmed {
            self.set_retries(options.retries).await?;
        }
        if payload.len() > LONG_PAYLOAD_THRESHOLD {
            let mut cmd: String<2048> =
                fmt_cmd(format_args!("AT+LPSEND={port}:{}:", options.confirmed as u8))
                    .map_err(|_| Error::NoMemory)?;
            hex::push_hex(&mut cmd, payload).map_err(|_| Error::NoMemory)?;
            self.command(&cmd).await?;
        } else {
            self.set_confirmed(options.confirmed).await?;
            let mut cmd: String<1024> =
                fmt_cmd(format_args!("AT+SEND={port}:")).map_err(|_| Error::NoMemory)?;
            hex::push_hex(&mut cmd, payload).map_err(|_| Error::NoMemory)?;
            self.command(&cmd).await?;
        }
        self.shared().set_busy(true);
        if options.confirmed {
            let deadline = Instant::now() + self.config().confirm_timeout;
            while self.shared().is_busy() {
                if Instant::now() >= deadline {
                    warn!("confirmation wait timed out");
                    self.shared().set_busy(false);
                    return Err(Error::Timeout);
                }
                Timer::after(self.config().poll_interval).await;
            }
            if self.shared().confirm_error() {
                return Err(Error::InvalidResponse);
            }
        }
        Ok(())
    }

    /// Waits up to `timeout` for a downlink.
    pub async fn receive(&mut self, timeout: Duration) -> Result<ReceivedMessage, Error<W::Error>> {
        self.require_lorawan()?;
        with_timeout(timeout, self.shared().downlink.receive())
            .await
            .map_err(|_| Error::Timeout)
    }

    /// Pops a downlink without waiting.
    pub fn try_receive(&mut self) -> Option<ReceivedMessage> {
        self.shared().downlink.try_receive().ok()
    }

    /// Sets the confirmed-uplink retry budget (`AT+RETY`, 0..=7).
    pub async fn set_retries(&mut self, retries: u8) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        if retries > 7 {
            return Err(Error::InvalidArgument);
        }
        let cmd: String<16> = fmt_cmd(format_args!("AT+RETY={retries}")).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the confirmed-uplink retry budget.
    pub async fn retries(&mut self) -> Result<u8, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+RETY=?").await?;
        parse_num(&line).ok_or(Error::InvalidResponse)
    }

    /// Sets the default confirmation mode (`AT+CFM`).
    pub async fn set_confirmed(&mut self, confirmed: bool) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        let cmd: String<16> =
            fmt_cmd(format_args!("AT+CFM={}", confirmed as u8)).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the default confirmation mode.
    pub async fn confirmed(&mut self) -> Result<bool, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+CFM=?").await?;
        parse_flag(&line).ok_or(Error::InvalidResponse)
    }

    /// Selects public or private network sync words (`AT+PNM`).
    pub async fn set_public_network(&mut self, public: bool) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        let cmd: String<16> =
            fmt_cmd(format_args!("AT+PNM={}", public as u8)).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the public-network flag.
    pub async fn public_network(&mut self) -> Result<bool, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+PNM=?").await?;
        parse_flag(&line).ok_or(Error::InvalidResponse)
    }

    /// Selects the regional band plan (`AT+BAND`).
    pub async fn set_band(&mut self, band: Band) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        let cmd: String<16> =
            fmt_cmd(format_args!("AT+BAND={}", band as u8)).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await?;
        self.cache_band(band);
        Ok(())
    }

    /// Reads the regional band plan.
    pub async fn band(&mut self) -> Result<Band, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+BAND=?").await?;
        let band = parse_num::<u8>(&line)
            .and_then(Band::from_u8)
            .ok_or(Error::InvalidResponse)?;
        self.cache_band(band);
        Ok(band)
    }

    /// Selects the channel sub-band (`AT+MASK`). Only meaningful on the
    /// US915, AU915 and CN470 plans.
    pub async fn set_sub_band(&mut self, sub_band: SubBand) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        let band = self.current_band().await?;
        if !band.uses_sub_band() {
            return Err(Error::InvalidState);
        }
        if sub_band != SubBand::All && sub_band.number() > band.sub_band_count() {
            return Err(Error::InvalidArgument);
        }
        let cmd: String<16> =
            fmt_cmd(format_args!("AT+MASK={:04X}", sub_band.mask())).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the channel sub-band back from the mask register.
    pub async fn sub_band(&mut self) -> Result<SubBand, Error<W::Error>> {
        self.require_lorawan()?;
        let band = self.current_band().await?;
        if !band.uses_sub_band() {
            return Err(Error::InvalidState);
        }
        let line = self.query("AT+MASK=?").await?;
        let mask = u16::from_str_radix(line.trim(), 16).map_err(|_| Error::InvalidResponse)?;
        SubBand::from_mask(mask).ok_or(Error::InvalidResponse)
    }

    /// Sets the device class (`AT+CLASS`).
    pub async fn set_class(&mut self, class: DeviceClass) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        let cmd: String<16> =
            fmt_cmd(format_args!("AT+CLASS={}", class.letter())).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the device class.
    pub async fn class(&mut self) -> Result<DeviceClass, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+CLASS=?").await?;
        DeviceClass::from_letter(line.trim()).ok_or(Error::InvalidResponse)
    }

    /// Sets the uplink data rate (`AT+DR`).
    pub async fn set_data_rate(&mut self, data_rate: DataRate) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        let cmd: String<16> =
            fmt_cmd(format_args!("AT+DR={}", data_rate as u8)).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the uplink data rate.
    pub async fn data_rate(&mut self) -> Result<DataRate, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+DR=?").await?;
        parse_num::<u8>(&line)
            .and_then(DataRate::from_u8)
            .ok_or(Error::InvalidResponse)
    }

    /// Enables or disables adaptive data rate (`AT+ADR`).
    pub async fn set_adr(&mut self, adr: bool) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        let cmd: String<16> =
            fmt_cmd(format_args!("AT+ADR={}", adr as u8)).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the adaptive data rate flag.
    pub async fn adr(&mut self) -> Result<bool, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+ADR=?").await?;
        parse_flag(&line).ok_or(Error::InvalidResponse)
    }

    /// Sets the activation mode (`AT+NJM`).
    pub async fn set_join_mode(&mut self, mode: JoinMode) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        let cmd: String<16> =
            fmt_cmd(format_args!("AT+NJM={}", mode as u8)).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the activation mode.
    pub async fn join_mode(&mut self) -> Result<JoinMode, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+NJM=?").await?;
        parse_num::<u8>(&line)
            .and_then(JoinMode::from_u8)
            .ok_or(Error::InvalidResponse)
    }

    /// Sets the RX1 window delay in seconds (`AT+RX1DL`).
    pub async fn set_rx1_delay(&mut self, seconds: u8) -> Result<(), Error<W::Error>> {
        self.set_delay("AT+RX1DL=", seconds).await
    }

    /// Reads the RX1 window delay in seconds.
    pub async fn rx1_delay(&mut self) -> Result<u8, Error<W::Error>> {
        self.get_delay("AT+RX1DL=?").await
    }

    /// Sets the RX2 window delay in seconds (`AT+RX2DL`).
    pub async fn set_rx2_delay(&mut self, seconds: u8) -> Result<(), Error<W::Error>> {
        self.set_delay("AT+RX2DL=", seconds).await
    }

    /// Reads the RX2 window delay in seconds.
    pub async fn rx2_delay(&mut self) -> Result<u8, Error<W::Error>> {
        self.get_delay("AT+RX2DL=?").await
    }

    /// Sets the join RX1 window delay in seconds (`AT+JN1DL`).
    pub async fn set_join_rx1_delay(&mut self, seconds: u8) -> Result<(), Error<W::Error>> {
        self.set_delay("AT+JN1DL=", seconds).await
    }

    /// Reads the join RX1 window delay in seconds.
    pub async fn join_rx1_delay(&mut self) -> Result<u8, Error<W::Error>> {
        self.get_delay("AT+JN1DL=?").await
    }

    /// Sets the join RX2 window delay in seconds (`AT+JN2DL`).
    pub async fn set_join_rx2_delay(&mut self, seconds: u8) -> Result<(), Error<W::Error>> {
        self.set_delay("AT+JN2DL=", seconds).await
    }

    /// Reads the join RX2 window delay in seconds.
    pub async fn join_rx2_delay(&mut self) -> Result<u8, Error<W::Error>> {
        self.get_delay("AT+JN2DL=?").await
    }

    /// Sets the RX2 window frequency in Hz (`AT+RX2FQ`).
    pub async fn set_rx2_frequency(&mut self, hz: u32) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        let cmd: String<24> = fmt_cmd(format_args!("AT+RX2FQ={hz}")).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the RX2 window frequency in Hz.
    pub async fn rx2_frequency(&mut self) -> Result<u32, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+RX2FQ=?").await?;
        parse_num(&line).ok_or(Error::InvalidResponse)
    }

    /// Sets the RX2 window data rate (`AT+RX2DR`).
    pub async fn set_rx2_data_rate(&mut self, data_rate: DataRate) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        let cmd: String<16> =
            fmt_cmd(format_args!("AT+RX2DR={}", data_rate as u8)).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the RX2 window data rate.
    pub async fn rx2_data_rate(&mut self) -> Result<DataRate, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+RX2DR=?").await?;
        parse_num::<u8>(&line)
            .and_then(DataRate::from_u8)
            .ok_or(Error::InvalidResponse)
    }

    /// Sets the transmit power from a requested dBm level.
    ///
    /// The module takes a regional power index; the conversion follows the
    /// band plan read during init. Bands without a published conversion fall
    /// back to index 0 with a warning.
    pub async fn set_tx_power(&mut self, dbm: u8) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        let band = self.current_band().await?;
        let index = tx_power_index(band, dbm);
        let cmd: String<16> = fmt_cmd(format_args!("AT+TXP={index}")).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the remaining duty-cycle wait time in seconds (`AT+DUTYTIME`).
    pub async fn duty_time(&mut self) -> Result<u32, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+DUTYTIME=?").await?;
        parse_num(&line).ok_or(Error::InvalidResponse)
    }

    /// Reads the RSSI of the last received packet in dBm.
    pub async fn rssi(&mut self) -> Result<i8, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+RSSI=?").await?;
        parse_num(&line).ok_or(Error::InvalidResponse)
    }

    /// Reads the SNR of the last received packet in dB.
    pub async fn snr(&mut self) -> Result<i8, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+SNR=?").await?;
        parse_num(&line).ok_or(Error::InvalidResponse)
    }

    /// Sets the class-B ping slot periodicity (`AT+PGSLOT`, 0..=7).
    pub async fn set_ping_slot(&mut self, periodicity: u8) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        if periodicity > 7 {
            return Err(Error::InvalidArgument);
        }
        let cmd: String<16> =
            fmt_cmd(format_args!("AT+PGSLOT={periodicity}")).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Reads the class-B ping slot periodicity.
    pub async fn ping_slot(&mut self) -> Result<u8, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+PGSLOT=?").await?;
        parse_num(&line).ok_or(Error::InvalidResponse)
    }

    /// Reads the class-B beacon frequency in Hz (`AT+BFREQ`).
    pub async fn beacon_frequency(&mut self) -> Result<u32, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query("AT+BFREQ=?").await?;
        parse_num(&line).ok_or(Error::InvalidResponse)
    }

    /// Reads the network-provided local time line (`AT+LTIME`).
    pub async fn local_time(&mut self) -> Result<crate::state::ResponseLine, Error<W::Error>> {
        self.require_lorawan()?;
        self.query("AT+LTIME=?").await
    }

    /// Registers a multicast group (`AT+ADDMULC`).
    pub async fn add_multicast_group(
        &mut self,
        group: &MulticastGroup,
    ) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        let mut cmd: String<128> =
            fmt_cmd(format_args!("AT+ADDMULC={}:", group.class.letter()))
                .map_err(|_| Error::NoMemory)?;
        hex::push_hex(&mut cmd, &group.dev_addr).map_err(|_| Error::NoMemory)?;
        cmd.push(':').map_err(|_| Error::NoMemory)?;
        hex::push_hex(&mut cmd, &group.nwk_s_key).map_err(|_| Error::NoMemory)?;
        cmd.push(':').map_err(|_| Error::NoMemory)?;
        hex::push_hex(&mut cmd, &group.app_s_key).map_err(|_| Error::NoMemory)?;
        let tail: String<24> = fmt_cmd(format_args!(
            ":{}:{}:{}",
            group.frequency, group.data_rate as u8, group.periodicity
        ))
        .map_err(|_| Error::NoMemory)?;
        cmd.push_str(&tail).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Removes a multicast group by device address (`AT+RMVMULC`).
    pub async fn remove_multicast_group(
        &mut self,
        dev_addr: &[u8; 4],
    ) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        let mut cmd: String<24> = String::new();
        cmd.push_str("AT+RMVMULC=").map_err(|_| Error::NoMemory)?;
        hex::push_hex(&mut cmd, dev_addr).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    /// Lists the registered multicast groups (`AT+LSTMULC`).
    ///
    /// The reply spans one line per group before the status, so this runs
    /// its own exchange instead of [`Rak3172::query`].
    pub async fn multicast_groups(&mut self) -> Result<Vec<MulticastGroup, 4>, Error<W::Error>> {
        self.require_lorawan()?;
        if self.shared().is_busy() {
            return Err(Error::Busy);
        }
        self.shared().reset_responses();
        self.write_line("AT+LSTMULC=?").await?;
        let mut groups: Vec<MulticastGroup, 4> = Vec::new();
        loop {
            let line = self.next_response().await?;
            let text = line.trim();
            if text == "OK" {
                return Ok(groups);
            }
            if text.is_empty() {
                continue;
            }
            if text.contains("AT_BUSY_ERROR") {
                return Err(Error::Busy);
            }
            if text.starts_with("AT_") {
                warn!("multicast listing failed: {text}");
                return Err(Error::CommandFailed);
            }
            let value = strip_echo(&line, self.config().dialect);
            match parse_multicast_line(&value) {
                Some(group) => {
                    if groups.push(group).is_err() {
                        warn!("more multicast groups than slots, dropping {value}");
                    }
                }
                None => debug!("skipping multicast line: {value}"),
            }
        }
    }

    pub(crate) fn require_lorawan(&self) -> Result<(), Error<W::Error>> {
        if self.shared().mode() == WorkingMode::Lorawan {
            Ok(())
        } else {
            Err(Error::InvalidMode)
        }
    }

    fn arm_join(&mut self, options: &JoinOptions) {
        self.shared()
            .set_join_attempts_left(options.attempts.saturating_add(1));
        self.shared().set_busy(true);
    }

    async fn current_band(&mut self) -> Result<Band, Error<W::Error>> {
        match self.cached_band() {
            Some(band) => Ok(band),
            None => self.band().await,
        }
    }

    async fn set_delay(&mut self, prefix: &str, seconds: u8) -> Result<(), Error<W::Error>> {
        self.require_lorawan()?;
        // Legacy firmware takes these delays in milliseconds.
        let wire = match self.config().dialect {
            Dialect::Legacy => seconds as u32 * 1000,
            Dialect::Rui3 => seconds as u32,
        };
        let cmd: String<24> = fmt_cmd(format_args!("{prefix}{wire}")).map_err(|_| Error::NoMemory)?;
        self.command(&cmd).await
    }

    async fn get_delay(&mut self, cmd: &str) -> Result<u8, Error<W::Error>> {
        self.require_lorawan()?;
        let line = self.query(cmd).await?;
        let wire: u32 = parse_num(&line).ok_or(Error::InvalidResponse)?;
        let seconds = match self.config().dialect {
            Dialect::Legacy => wire / 1000,
            Dialect::Rui3 => wire,
        };
        Ok(seconds as u8)
    }
}

fn join_command<TSERR>(options: &JoinOptions) -> Result<String<32>, Error<TSERR>> {
    if options.interval_s < 7 || options.attempts < 1 {
        return Err(Error::InvalidArgument);
    }
    fmt_cmd(format_args!(
        "AT+JOIN=1:{}:{}:{}",
        options.auto_join as u8, options.interval_s, options.attempts
    ))
    .map_err(|_| Error::NoMemory)
}

fn key_command<const N: usize>(prefix: &str, key: &[u8]) -> Result<String<N>, ()> {
    let mut cmd: String<N> = String::new();
    cmd.push_str(prefix).map_err(|_| ())?;
    hex::push_hex(&mut cmd, key)?;
    Ok(cmd)
}

fn parse_multicast_line(line: &str) -> Option<MulticastGroup> {
    let mut parts = line.trim().split(':');
    let class = match parts.next()?.trim() {
        "B" | "b" => McClass::B,
        "C" | "c" => McClass::C,
        _ => return None,
    };
    let mut dev_addr = [0u8; 4];
    hex::decode_exact(parts.next()?.trim(), &mut dev_addr).ok()?;
    let mut nwk_s_key = [0u8; 16];
    hex::decode_exact(parts.next()?.trim(), &mut nwk_s_key).ok()?;
    let mut app_s_key = [0u8; 16];
    hex::decode_exact(parts.next()?.trim(), &mut app_s_key).ok()?;
    let frequency: u32 = parts.next()?.trim().parse().ok()?;
    let data_rate = DataRate::from_u8(parts.next()?.trim().parse().ok()?)?;
    let periodicity: u8 = parts.next()?.trim().parse().ok()?;
    Some(MulticastGroup {
        class,
        dev_addr,
        nwk_s_key,
        app_s_key,
        frequency,
        data_rate,
        periodicity,
    })
}
