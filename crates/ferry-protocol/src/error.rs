/// Protocol error taxonomy shared by the codec and both endpoints.
///
/// Loss and corruption on the wire are never errors; they fold into the
/// timeout-and-retransmit path. Only malformed local input and broken
/// invariants surface here.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Malformed origin address or port handed to the codec.
    #[error("malformed origin {input:?}: {reason}")]
    Format { input: String, reason: &'static str },

    /// Received datagram shorter than the minimum for its segment shape.
    /// The caller discards it as if nothing arrived.
    #[error("truncated datagram: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    /// Sequence byte outside {0, 1}. The protocol never produces one;
    /// seeing it means the datagram is garbage.
    #[error("invalid sequence bit {0}, must be 0 or 1")]
    InvalidSequenceBit(u8),
}
