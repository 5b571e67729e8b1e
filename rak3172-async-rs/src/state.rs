//! Session state shared between the command handle and the reader task.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use heapless::{String, Vec};
use log::warn;

use crate::at::WorkingMode;

/// Longest raw line the assembler accepts. Sized for a maximum downlink
/// rendered as hex plus event framing.
pub const MAX_LINE_LEN: usize = 2048;
/// Longest stored command-response line.
pub const MAX_RESPONSE_LEN: usize = 160;
/// Largest payload carried by a queued message.
pub const MAX_PAYLOAD_LEN: usize = 1000;
/// Depth of every bounded queue in the session.
pub const QUEUE_DEPTH: usize = 8;

/// One line of command-channel output, CR/LF stripped.
pub type ResponseLine = String<MAX_RESPONSE_LEN>;

type Queue<T> = Channel<CriticalSectionRawMutex, T, QUEUE_DEPTH>;

/// LoRaWAN receive window a downlink arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxWindow {
    /// First class-A window.
    Rx1,
    /// Second class-A window.
    Rx2,
    /// Class-B ping slot.
    RxB,
    /// Class-C continuous window.
    RxC,
}

/// A message popped from one of the receive queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Decoded payload bytes.
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
    /// Signal strength reported by the module.
    pub rssi: i8,
    /// Signal-to-noise ratio reported by the module.
    pub snr: i8,
    /// Application port. Always 0 for P2P traffic.
    pub port: u8,
    /// Receive window. `None` for P2P traffic.
    pub window: Option<RxWindow>,
    /// Whether the downlink addressed a multicast group.
    pub is_multicast: bool,
}

struct Flags {
    busy: AtomicBool,
    joined: AtomicBool,
    confirm_error: AtomicBool,
    rx_timeout: AtomicBool,
    join_event: AtomicBool,
    listening: AtomicBool,
    single_shot: AtomicBool,
    join_attempts_left: AtomicU8,
    mode: AtomicU8,
}

/// Queues and status flags shared by [`crate::Rak3172`], [`crate::Ingress`]
/// and the P2P listen pump. Keep one per module, typically in a `static`.
pub struct State {
    pub(crate) responses: Queue<ResponseLine>,
    pub(crate) downlink: Queue<ReceivedMessage>,
    pub(crate) p2p_rx: Queue<ReceivedMessage>,
    pub(crate) listen: Queue<ReceivedMessage>,
    pub(crate) listen_stop: Signal<CriticalSectionRawMutex, ()>,
    flags: Flags,
}

impl State {
    /// Creates an empty session state.
    pub const fn new() -> Self {
        Self {
            responses: Channel::new(),
            downlink: Channel::new(),
            p2p_rx: Channel::new(),
            listen: Channel::new(),
            listen_stop: Signal::new(),
            flags: Flags {
                busy: AtomicBool::new(false),
                joined: AtomicBool::new(false),
                confirm_error: AtomicBool::new(false),
                // No window has ever been open, so the listening observer
                // reports false from the start.
                rx_timeout: AtomicBool::new(true),
                join_event: AtomicBool::new(false),
                listening: AtomicBool::new(false),
                single_shot: AtomicBool::new(false),
                join_attempts_left: AtomicU8::new(0),
                mode: AtomicU8::new(WorkingMode::P2p as u8),
            },
        }
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.flags.busy.load(Ordering::Relaxed)
    }

    pub(crate) fn set_busy(&self, busy: bool) {
        self.flags.busy.store(busy, Ordering::Relaxed);
    }

    pub(crate) fn is_joined(&self) -> bool {
        self.flags.joined.load(Ordering::Relaxed)
    }

    pub(crate) fn set_joined(&self, joined: bool) {
        self.flags.joined.store(joined, Ordering::Relaxed);
    }

    pub(crate) fn confirm_error(&self) -> bool {
        self.flags.confirm_error.load(Ordering::Relaxed)
    }

    pub(crate) fn set_confirm_error(&self, failed: bool) {
        self.flags.confirm_error.store(failed, Ordering::Relaxed);
    }

    pub(crate) fn rx_timeout(&self) -> bool {
        self.flags.rx_timeout.load(Ordering::Relaxed)
    }

    pub(crate) fn set_rx_timeout(&self, value: bool) {
        self.flags.rx_timeout.store(value, Ordering::Relaxed);
    }

    pub(crate) fn set_join_event(&self, value: bool) {
        self.flags.join_event.store(value, Ordering::Relaxed);
    }

    /// Consumes a pending join event notification.
    pub(crate) fn take_join_event(&self) -> bool {
        self.flags.join_event.swap(false, Ordering::Relaxed)
    }

    pub(crate) fn is_listening(&self) -> bool {
        self.flags.listening.load(Ordering::Relaxed)
    }

    pub(crate) fn set_listening(&self, value: bool) {
        self.flags.listening.store(value, Ordering::Relaxed);
    }

    pub(crate) fn is_single_shot(&self) -> bool {
        self.flags.single_shot.load(Ordering::Relaxed)
    }

    pub(crate) fn set_single_shot(&self, value: bool) {
        self.flags.single_shot.store(value, Ordering::Relaxed);
    }

    pub(crate) fn join_attempts_left(&self) -> u8 {
        self.flags.join_attempts_left.load(Ordering::Relaxed)
    }

    pub(crate) fn set_join_attempts_left(&self, value: u8) {
        self.flags.join_attempts_left.store(value, Ordering::Relaxed);
    }

    /// Decrements the join attempt counter, saturating at zero, and returns
    /// the new value.
    pub(crate) fn consume_join_attempt(&self) -> u8 {
        let left = self.join_attempts_left().saturating_sub(1);
        self.set_join_attempts_left(left);
        left
    }

    pub(crate) fn mode(&self) -> WorkingMode {
        WorkingMode::from_u8(self.flags.mode.load(Ordering::Relaxed)).unwrap_or(WorkingMode::P2p)
    }

    pub(crate) fn set_mode(&self, mode: WorkingMode) {
        self.flags.mode.store(mode as u8, Ordering::Relaxed);
    }

    /// Drops every line queued on the command-response channel.
    pub(crate) fn reset_responses(&self) {
        while self.responses.try_receive().is_ok() {}
    }

    pub(crate) fn push_response(&self, line: ResponseLine) {
        if self.responses.try_send(line).is_err() {
            warn!("response queue full, dropping line");
        }
    }

    pub(crate) fn push_downlink(&self, message: ReceivedMessage) {
        if self.downlink.try_send(message).is_err() {
            warn!("downlink queue full, dropping message");
        }
    }

    pub(crate) fn push_p2p(&self, message: ReceivedMessage) {
        if self.p2p_rx.try_send(message).is_err() {
            warn!("p2p receive queue full, dropping message");
        }
    }

    pub(crate) fn push_listen(&self, message: ReceivedMessage) {
        if self.listen.try_send(message).is_err() {
            warn!("listen queue full, dropping message");
        }
    }

    pub(crate) fn drain_p2p(&self) {
        while self.p2p_rx.try_receive().is_ok() {}
        while self.listen.try_receive().is_ok() {}
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}
