//! Serial reader task. Assembles lines and routes them to the response
//! queue or the event handlers.

use core::mem;

use embedded_io_async::Read;
use heapless::Vec;
use log::{debug, trace, warn};

use super::err::Error;
use super::trimmed;
use crate::at::event::{classify, Classified, Event};
use crate::at::Dialect;
use crate::state::{ReceivedMessage, RxWindow, State, MAX_LINE_LEN, MAX_RESPONSE_LEN};

/// The receive half of a module session.
///
/// Must be polled continuously, typically from its own task; every command
/// reply and every unsolicited event flows through [`Ingress::run`].
pub struct Ingress<'a, R> {
    rx: R,
    shared: &'a State,
    dialect: Dialect,
    line: Vec<u8, MAX_LINE_LEN>,
    pending_meta: Option<(RxWindow, i8, i8)>,
    overflow: bool,
}

impl<'a, R: Read> Ingress<'a, R> {
    pub(crate) fn new(rx: R, shared: &'a State, dialect: Dialect) -> Self {
        Self {
            rx,
            shared,
            dialect,
            line: Vec::new(),
            pending_meta: None,
            overflow: false,
        }
    }

    /// Reads the UART until the stream ends or the serial link fails.
    pub async fn run(&mut self) -> Result<(), Error<R::Error>> {
        let mut buf = [0u8; 64];
        loop {
            let count = self.rx.read(&mut buf).await.map_err(Error::Serial)?;
            if count == 0 {
                debug!("serial reader reached end of stream");
                return Ok(());
            }
            for &byte in &buf[..count] {
                self.push_byte(byte);
            }
        }
    }

    fn push_byte(&mut self, byte: u8) {
        match byte {
            b'\r' => {}
            b'\n' => self.finish_line(),
            _ => {
                if self.line.push(byte).is_err() && !self.overflow {
                    warn!("serial line exceeds {MAX_LINE_LEN} bytes, discarding frame");
                    self.overflow = true;
                }
            }
        }
    }

    fn finish_line(&mut self) {
        if self.overflow {
            // The frame is unusable and any command waiting on it would pair
            // with the wrong status line.
            self.line.clear();
            self.overflow = false;
            self.shared.reset_responses();
            return;
        }
        let line = mem::take(&mut self.line);
        match core::str::from_utf8(&line) {
            Ok(text) => self.process_line(text),
            Err(_) => warn!("dropping non-UTF-8 serial line"),
        }
    }

    fn process_line(&mut self, line: &str) {
        trace!("< {line}");
        if line.is_empty() {
            // Legacy replies frame the status with a blank line; RUI3 blank
            // lines are noise.
            if self.dialect == Dialect::Legacy {
                self.shared.push_response(heapless::String::new());
            }
            return;
        }
        match classify(line, self.shared.mode(), self.dialect) {
            Classified::Response => self
                .shared
                .push_response(trimmed::<MAX_RESPONSE_LEN>(line)),
            Classified::Event(event) => self.handle_event(event),
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Joined => {
                debug!("network joined");
                self.shared.set_joined(true);
                self.shared.set_busy(false);
                self.shared.set_join_event(true);
            }
            Event::JoinFailed => {
                let remaining = self.shared.consume_join_attempt();
                debug!("join attempt failed, {remaining} left");
                self.shared.set_joined(false);
                if remaining == 0 {
                    self.shared.set_busy(false);
                }
                self.shared.set_join_event(true);
            }
            Event::TxDone => {
                self.shared.set_busy(false);
            }
            Event::ConfirmedOk => {
                self.shared.set_confirm_error(false);
                self.shared.set_busy(false);
            }
            Event::ConfirmedFailed => {
                warn!("confirmed uplink went unacknowledged");
                self.shared.set_confirm_error(true);
                self.shared.set_busy(false);
            }
            Event::Downlink(message) => self.shared.push_downlink(message),
            Event::DownlinkMeta { window, rssi, snr } => {
                self.pending_meta = Some((window, rssi, snr));
            }
            Event::DownlinkData { port, payload } => match self.pending_meta.take() {
                Some((window, rssi, snr)) => self.shared.push_downlink(ReceivedMessage {
                    payload,
                    rssi,
                    snr,
                    port,
                    window: Some(window),
                    is_multicast: false,
                }),
                None => warn!("downlink payload without a preceding metadata line"),
            },
            Event::P2pPacket(message) => self.shared.push_p2p(message),
            Event::P2pRxTimeout => {
                debug!("receive window expired");
                self.shared.set_rx_timeout(true);
                if self.shared.is_listening() {
                    self.shared.set_listening(false);
                    self.shared.listen_stop.signal(());
                }
                self.shared.set_busy(false);
            }
            Event::Ignored => {}
        }
    }
}
