/// Stop-and-wait file transfer over UDP.
///
/// One file moves from a sending endpoint to a receiving endpoint
/// through a relay that may drop, duplicate, or corrupt datagrams. A
/// single alternating sequence bit and fixed-timeout retransmission
/// make the transfer reliable: exactly one segment is in flight at any
/// moment, and the receiver ACKs every segment it has seen so the
/// sender can always make progress.
///
/// Layout:
/// - `segment`: wire format, encode and decode
/// - `sequence`: the alternating bit
/// - `channel`: UDP socket with timeout-aware receive
/// - `sender` / `receiver`: the two endpoint loops
/// - `logging`: transfer event reporting
/// - `error`: wire-level decode errors
pub mod channel;
pub mod error;
pub mod logging;
pub mod receiver;
pub mod segment;
pub mod sender;
pub mod sequence;

// Re-export the types endpoints and tests reach for.
pub use channel::DatagramChannel;
pub use error::ProtocolError;
pub use logging::{NullLogger, TracingLogger, TransferEvent, TransferLog, TransferLogger};
pub use receiver::{run_receiver, RecvConfig, RecvError, RecvSummary};
pub use segment::{MessageType, Origin, MAX_DATA_CHUNK};
pub use sender::{run_sender, SendConfig, SendError, SendSummary};
pub use sequence::SeqBit;
