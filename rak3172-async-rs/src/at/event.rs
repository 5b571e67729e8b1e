//! Classification of module output lines.
//!
//! The reader task feeds every assembled line through [`classify`]; the
//! result decides whether the line belongs to the command/response stream or
//! is an unsolicited `+EVT:` notification, already parsed.

use heapless::Vec;
use log::{debug, warn};

use crate::at::{hex, Dialect, WorkingMode};
use crate::state::{ReceivedMessage, RxWindow, MAX_PAYLOAD_LEN};

/// A line of module output, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// The line belongs to the command/response stream.
    Response,
    /// The line is an unsolicited module event.
    Event(Event),
}

/// Unsolicited events recognized on the serial link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The network accepted a join request.
    Joined,
    /// A join attempt failed.
    JoinFailed,
    /// An unconfirmed uplink left the radio.
    TxDone,
    /// A confirmed uplink was acknowledged.
    ConfirmedOk,
    /// A confirmed uplink was not acknowledged.
    ConfirmedFailed,
    /// A complete downlink (single-line form).
    Downlink(ReceivedMessage),
    /// Legacy downlink metadata; the payload arrives on the next line.
    DownlinkMeta {
        window: RxWindow,
        rssi: i8,
        snr: i8,
    },
    /// Legacy downlink payload line, paired with the preceding metadata.
    DownlinkData {
        port: u8,
        payload: Vec<u8, MAX_PAYLOAD_LEN>,
    },
    /// A received P2P packet.
    P2pPacket(ReceivedMessage),
    /// The P2P receive window closed without a packet.
    P2pRxTimeout,
    /// A recognized event line the driver takes no action on.
    Ignored,
}

/// Splits module output into responses and parsed events.
///
/// Which event grammar applies depends on the current working mode and, for
/// LoRaWAN receive events, on the firmware dialect.
pub fn classify(line: &str, mode: WorkingMode, dialect: Dialect) -> Classified {
    let Some(rest) = line.strip_prefix("+EVT:") else {
        return Classified::Response;
    };
    let event = match mode {
        WorkingMode::Lorawan => classify_lorawan(rest, dialect),
        WorkingMode::P2p | WorkingMode::P2pFsk => classify_p2p(rest),
    };
    Classified::Event(event)
}

fn classify_lorawan(rest: &str, dialect: Dialect) -> Event {
    if rest == "JOINED" {
        return Event::Joined;
    }
    if rest.starts_with("JOIN_FAILED") || rest.starts_with("JOIN FAILED") {
        return Event::JoinFailed;
    }
    if rest == "TX_DONE" || rest == "TX DONE" {
        return Event::TxDone;
    }
    if rest.starts_with("SEND_CONFIRMED_OK") || rest.starts_with("SEND CONFIRMED OK") {
        return Event::ConfirmedOk;
    }
    if rest.starts_with("SEND_CONFIRMED_FAILED") || rest.starts_with("SEND CONFIRMED FAILED") {
        return Event::ConfirmedFailed;
    }
    if let Some(after) = rest.strip_prefix("RX_") {
        return parse_rx(after, dialect);
    }
    if dialect == Dialect::Legacy {
        if let Some(event) = parse_legacy_data(rest) {
            return event;
        }
    }
    debug!("unhandled event: +EVT:{rest}");
    Event::Ignored
}

fn parse_rx(after: &str, dialect: Dialect) -> Event {
    let window = match after.as_bytes().first() {
        Some(b'1') => RxWindow::Rx1,
        Some(b'2') => RxWindow::Rx2,
        Some(b'B') => RxWindow::RxB,
        Some(b'C') => RxWindow::RxC,
        _ => {
            warn!("unknown receive window in +EVT:RX_{after}");
            return Event::Ignored;
        }
    };
    let rest = &after[1..];
    if dialect == Dialect::Legacy && rest.starts_with(',') {
        return parse_legacy_meta(window, rest);
    }
    let Some(fields) = rest.strip_prefix(':') else {
        warn!("malformed receive event: +EVT:RX_{after}");
        return Event::Ignored;
    };
    // <UNICAST|MULTICAST>:<rssi>:<snr>:<port>:<hex payload>
    let mut parts = fields.split(':');
    let cast = parts.next();
    let rssi = parts.next().and_then(|v| v.parse::<i8>().ok());
    let snr = parts.next().and_then(|v| v.parse::<i8>().ok());
    let port = parts.next().and_then(|v| v.parse::<u8>().ok());
    let payload_text = parts.next();
    let (Some(cast), Some(rssi), Some(snr), Some(port), Some(payload_text)) =
        (cast, rssi, snr, port, payload_text)
    else {
        warn!("malformed receive event: +EVT:RX_{after}");
        return Event::Ignored;
    };
    let mut payload = Vec::new();
    if hex::decode_into(payload_text, &mut payload).is_err() {
        warn!("bad payload hex in receive event");
        return Event::Ignored;
    }
    Event::Downlink(ReceivedMessage {
        payload,
        rssi,
        snr,
        port,
        window: Some(window),
        is_multicast: cast == "MULTICAST",
    })
}

// +EVT:RX_1, RSSI -89, SNR 4
fn parse_legacy_meta(window: RxWindow, rest: &str) -> Event {
    let mut rssi = None;
    let mut snr = None;
    for part in rest.split(',') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("RSSI") {
            rssi = value.trim().parse::<i8>().ok();
        } else if let Some(value) = part.strip_prefix("SNR") {
            snr = value.trim().parse::<i8>().ok();
        }
    }
    match (rssi, snr) {
        (Some(rssi), Some(snr)) => Event::DownlinkMeta { window, rssi, snr },
        _ => {
            warn!("malformed legacy receive metadata");
            Event::Ignored
        }
    }
}

// +EVT:<port>:<hex payload>
fn parse_legacy_data(rest: &str) -> Option<Event> {
    let (port_text, payload_text) = rest.split_once(':')?;
    let port = port_text.parse::<u8>().ok()?;
    let mut payload = Vec::new();
    hex::decode_into(payload_text, &mut payload).ok()?;
    Some(Event::DownlinkData { port, payload })
}

fn classify_p2p(rest: &str) -> Event {
    if rest.starts_with("RXP2P RECEIVE TIMEOUT") {
        return Event::P2pRxTimeout;
    }
    if let Some(fields) = rest.strip_prefix("RXP2P:") {
        // <rssi>:<snr>:<hex payload>
        let mut parts = fields.split(':');
        let rssi = parts.next().and_then(|v| v.parse::<i8>().ok());
        let snr = parts.next().and_then(|v| v.parse::<i8>().ok());
        let payload_text = parts.next();
        let (Some(rssi), Some(snr), Some(payload_text)) = (rssi, snr, payload_text) else {
            warn!("malformed p2p receive event: +EVT:RXP2P:{fields}");
            return Event::Ignored;
        };
        let mut payload = Vec::new();
        if hex::decode_into(payload_text, &mut payload).is_err() {
            warn!("bad payload hex in p2p receive event");
            return Event::Ignored;
        }
        return Event::P2pPacket(ReceivedMessage {
            payload,
            rssi,
            snr,
            port: 0,
            window: None,
            is_multicast: false,
        });
    }
    debug!("unhandled p2p event: +EVT:{rest}");
    Event::Ignored
}
