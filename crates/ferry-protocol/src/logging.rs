/// Structured logging for transfer endpoints.
///
/// Both state machines emit `TransferEvent`s through a `TransferLogger`
/// so the loops stay testable: production wires in `TracingLogger`,
/// tests record events and assert on them.

use std::fmt;

use crate::segment::MessageType;
use crate::sequence::SeqBit;

/// One log entry from a transfer endpoint.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub endpoint: &'static str,
    pub event: TransferEvent,
}

/// Transfer events that can be logged.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// Sender: segment handed to the channel.
    SegmentSent {
        kind: MessageType,
        seq: SeqBit,
        payload_len: usize,
        retransmit: bool,
    },
    /// Sender: an ACK byte arrived.
    AckReceived {
        ack: u8,
        matched: bool,
    },
    /// Sender: wait window expired with no matching ACK.
    AckTimeout {
        kind: MessageType,
        seq: SeqBit,
    },
    /// Receiver: first header seen, peer identity fixed.
    PeerLocked {
        origin: String,
    },
    /// Receiver: announced size accepted.
    SizeAccepted {
        size: u32,
    },
    /// Receiver: file name accepted.
    NameAccepted {
        name: String,
    },
    /// Receiver: fresh data chunk written.
    DataAccepted {
        seq: SeqBit,
        len: usize,
        total: u64,
    },
    /// Receiver: duplicate segment satisfied with a fresh ACK.
    DuplicateAcked {
        kind: MessageType,
        ack: SeqBit,
    },
    /// Receiver: segment dropped without effect.
    SegmentIgnored {
        reason: &'static str,
    },
    /// Either side: transfer finished.
    TransferComplete {
        bytes: u64,
        duration_ms: u64,
        retransmits: u64,
    },
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SegmentSent { kind, seq, payload_len, retransmit } => {
                write!(f, "segment_sent kind={} seq={} len={} retransmit={}", kind, seq, payload_len, retransmit)
            }
            Self::AckReceived { ack, matched } => {
                write!(f, "ack_received ack={} matched={}", ack, matched)
            }
            Self::AckTimeout { kind, seq } => {
                write!(f, "ack_timeout kind={} seq={}", kind, seq)
            }
            Self::PeerLocked { origin } => {
                write!(f, "peer_locked origin={}", origin)
            }
            Self::SizeAccepted { size } => {
                write!(f, "size_accepted bytes={}", size)
            }
            Self::NameAccepted { name } => {
                write!(f, "name_accepted name={}", name)
            }
            Self::DataAccepted { seq, len, total } => {
                write!(f, "data_accepted seq={} len={} total={}", seq, len, total)
            }
            Self::DuplicateAcked { kind, ack } => {
                write!(f, "duplicate_acked kind={} ack={}", kind, ack)
            }
            Self::SegmentIgnored { reason } => {
                write!(f, "segment_ignored reason={}", reason)
            }
            Self::TransferComplete { bytes, duration_ms, retransmits } => {
                write!(f, "transfer_complete bytes={} duration_ms={} retransmits={}", bytes, duration_ms, retransmits)
            }
        }
    }
}

/// Trait for transfer logging. Implementations can write to tracing,
/// record for assertions, or discard.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        // Info for lifecycle events, debug for per-segment spam.
        match &entry.event {
            TransferEvent::PeerLocked { .. }
            | TransferEvent::SizeAccepted { .. }
            | TransferEvent::NameAccepted { .. }
            | TransferEvent::TransferComplete { .. } => {
                tracing::info!(endpoint = entry.endpoint, "{}", entry.event);
            }
            _ => {
                tracing::debug!(endpoint = entry.endpoint, "{}", entry.event);
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}
