/// Receiving endpoint: validate, ACK, write, reassemble.
///
/// Flow:
///   1. Bind the UDP socket and wait for the first segment
///   2. Lock onto the origin carried in its header
///   3. Walk AwaitingFileSize → AwaitingFileName → AwaitingFile, ACKing
///      every accepted segment and re-ACKing every duplicate so a lost
///      ACK can never stall the sender
///   4. The zero-length data segment completes the transfer; linger
///      briefly afterwards to re-ACK retransmissions of it
///
/// The ARQ rules live in `ReceiverMachine`, a pure core with no sockets
/// or files, so every duplicate and ordering case is testable without a
/// network. `run_receiver` wraps it with the actual I/O.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::channel::DatagramChannel;
use crate::logging::{TransferEvent, TransferLog, TransferLogger};
use crate::segment::{
    self, MessageType, Origin, RawHeader, FILE_NAME_WIDTH, FILE_SIZE_PAYLOAD_LEN, MAX_DATA_CHUNK,
    MAX_SEGMENT,
};
use crate::sequence::SeqBit;

/// Receiver configuration.
pub struct RecvConfig {
    /// Local bind address.
    pub bind: SocketAddr,
    /// Relay address ACKs are sent to.
    pub relay: SocketAddr,
    /// Directory the received file lands in; created if missing.
    pub output_dir: PathBuf,
    /// Receive timeout per loop iteration; only bounds how often the
    /// blocking read wakes up, the receiver itself never retransmits.
    pub idle_timeout: Duration,
    /// Quiet window after completion during which retransmissions of the
    /// final segment are still re-ACKed. Zero disables the linger.
    pub linger: Duration,
}

/// Transfer result.
#[derive(Debug)]
pub struct RecvSummary {
    pub file_name: String,
    pub announced_size: u32,
    pub bytes_written: u64,
    /// Fresh data segments written (the end-of-file segment not counted).
    pub data_segments: u64,
    /// Duplicates satisfied with a re-ACK, linger included.
    pub duplicates_acked: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum RecvError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The byte counter disagreed with the announced size when the
    /// end-of-file segment arrived.
    #[error("announced {announced} bytes but wrote {written}")]
    SizeMismatch { announced: u32, written: u64 },
}

/// Receiver phases, in transfer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverPhase {
    AwaitingFileSize,
    AwaitingFileName,
    AwaitingFile,
    Complete,
}

/// What the I/O loop should do with one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Drop it; nothing changes.
    Ignore { reason: &'static str },
    /// A duplicate: send `ack` again, state unchanged.
    ReAck { kind: MessageType, ack: SeqBit },
    /// Fresh file-size segment: size recorded, send `ack`.
    AcceptSize { size: u32, ack: SeqBit },
    /// Fresh file-name segment: open `name` for writing, send `ack`.
    AcceptName { name: String, ack: SeqBit },
    /// Fresh data chunk: write the payload, send `ack`. `eof` marks the
    /// zero-length completion segment.
    AcceptData { ack: SeqBit, eof: bool },
}

/// Pure ARQ decision core. Owns the peer lock, the phase, the expected
/// sequence bit, and the byte counter; everything else is the loop's.
pub struct ReceiverMachine {
    phase: ReceiverPhase,
    peer: Option<Origin>,
    announced_size: Option<u32>,
    expected_data_bit: SeqBit,
    bytes_written: u64,
}

impl ReceiverMachine {
    pub fn new() -> ReceiverMachine {
        ReceiverMachine {
            phase: ReceiverPhase::AwaitingFileSize,
            peer: None,
            announced_size: None,
            // Reassigned when the name is accepted; until then no data
            // segment can be accepted at all.
            expected_data_bit: SeqBit::Zero,
            bytes_written: 0,
        }
    }

    pub fn phase(&self) -> ReceiverPhase {
        self.phase
    }

    /// The locked peer, once the first decodable header arrived.
    pub fn peer(&self) -> Option<Origin> {
        self.peer
    }

    pub fn announced_size(&self) -> Option<u32> {
        self.announced_size
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Decide what to do with one decoded segment. Mutates phase, peer
    /// lock, expected bit, and byte counter; side effects are the
    /// caller's.
    pub fn on_segment(&mut self, header: RawHeader, payload: &[u8]) -> Disposition {
        // Identity first: the origin in the header, not the transport
        // source, names the peer. First segment seen fixes it for good.
        match self.peer {
            None => self.peer = Some(header.origin),
            Some(peer) if peer != header.origin => {
                return Disposition::Ignore {
                    reason: "foreign origin",
                };
            }
            Some(_) => {}
        }

        let seq = match SeqBit::try_from(header.seq) {
            Ok(bit) => bit,
            Err(_) => {
                return Disposition::Ignore {
                    reason: "sequence bit out of range",
                };
            }
        };
        let kind = match MessageType::from_wire(header.kind) {
            Some(kind) => kind,
            None => {
                return Disposition::Ignore {
                    reason: "unknown message type",
                };
            }
        };

        match (self.phase, kind) {
            (ReceiverPhase::AwaitingFileSize, MessageType::FileSize) => {
                if payload.len() < FILE_SIZE_PAYLOAD_LEN {
                    return Disposition::Ignore {
                        reason: "short file_size payload",
                    };
                }
                let size = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                self.announced_size = Some(size);
                self.phase = ReceiverPhase::AwaitingFileName;
                Disposition::AcceptSize { size, ack: seq }
            }
            (ReceiverPhase::AwaitingFileSize, _) => Disposition::Ignore {
                reason: "waiting for file_size",
            },

            (ReceiverPhase::AwaitingFileName, MessageType::FileName) => {
                if payload.len() < FILE_NAME_WIDTH {
                    return Disposition::Ignore {
                        reason: "short file_name payload",
                    };
                }
                let name = segment::unpack_fixed_text(&payload[..FILE_NAME_WIDTH]);
                // The first data segment carries the flipped name bit.
                self.expected_data_bit = seq.flip();
                self.phase = ReceiverPhase::AwaitingFile;
                Disposition::AcceptName { name, ack: seq }
            }
            (ReceiverPhase::AwaitingFileName, MessageType::FileSize) => {
                // Our size ACK was lost and the sender is still stuck on
                // the size segment. Re-ACK it without reprocessing.
                Disposition::ReAck { kind, ack: seq }
            }
            (ReceiverPhase::AwaitingFileName, MessageType::FileData) => Disposition::Ignore {
                reason: "data before file_name",
            },

            (ReceiverPhase::AwaitingFile, MessageType::FileData) => {
                if payload.len() > MAX_DATA_CHUNK {
                    return Disposition::Ignore {
                        reason: "oversized data payload",
                    };
                }
                if seq != self.expected_data_bit {
                    // Duplicate of the chunk we already ACKed. Satisfy it
                    // with the previous bit; writing again would corrupt.
                    return Disposition::ReAck {
                        kind,
                        ack: self.expected_data_bit.flip(),
                    };
                }
                let eof = payload.is_empty();
                self.bytes_written += payload.len() as u64;
                self.expected_data_bit = self.expected_data_bit.flip();
                if eof {
                    self.phase = ReceiverPhase::Complete;
                }
                Disposition::AcceptData { ack: seq, eof }
            }
            (ReceiverPhase::AwaitingFile, MessageType::FileName) => {
                // Our name ACK was lost.
                Disposition::ReAck { kind, ack: seq }
            }
            (ReceiverPhase::AwaitingFile, MessageType::FileSize) => Disposition::Ignore {
                reason: "file_size after file_name",
            },

            (ReceiverPhase::Complete, MessageType::FileData) => {
                // The final ACK may have been lost; keep satisfying
                // retransmissions of the end-of-file segment.
                if seq == self.expected_data_bit.flip() {
                    Disposition::ReAck { kind, ack: seq }
                } else {
                    Disposition::Ignore {
                        reason: "transfer already complete",
                    }
                }
            }
            (ReceiverPhase::Complete, _) => Disposition::Ignore {
                reason: "transfer already complete",
            },
        }
    }
}

impl Default for ReceiverMachine {
    fn default() -> ReceiverMachine {
        ReceiverMachine::new()
    }
}

/// Run the receiver for one transfer. Blocks until the end-of-file
/// segment arrives and the linger window closes, or an I/O error ends
/// the transfer. Partial output stays on disk on failure.
pub fn run_receiver(
    config: RecvConfig,
    logger: Arc<dyn TransferLogger>,
) -> Result<RecvSummary, RecvError> {
    let channel = DatagramChannel::bind(config.bind, config.idle_timeout)?;
    let mut machine = ReceiverMachine::new();
    let mut buf = [0u8; MAX_SEGMENT];
    let mut out: Option<File> = None;
    let mut file_name = String::new();
    let mut data_segments: u64 = 0;
    let mut duplicates_acked: u64 = 0;
    let mut started: Option<Instant> = None;

    loop {
        let (len, _src) = match channel.recv_timeout(&mut buf)? {
            Some(received) => received,
            // The sender drives the clock; keep waiting.
            None => continue,
        };
        let datagram = &buf[..len];

        let header = match segment::decode_sender_header(datagram) {
            Ok(header) => header,
            Err(_) => {
                logger.log(recv_log(TransferEvent::SegmentIgnored {
                    reason: "truncated header",
                }));
                continue;
            }
        };

        let first_contact = machine.peer().is_none();
        let disposition = machine.on_segment(header, segment::segment_payload(datagram));
        if first_contact && machine.peer().is_some() {
            started = Some(Instant::now());
            logger.log(recv_log(TransferEvent::PeerLocked {
                origin: header.origin.to_string(),
            }));
        }

        match disposition {
            Disposition::Ignore { reason } => {
                logger.log(recv_log(TransferEvent::SegmentIgnored { reason }));
            }
            Disposition::ReAck { kind, ack } => {
                channel.send_to(&segment::encode_ack(ack), config.relay)?;
                duplicates_acked += 1;
                logger.log(recv_log(TransferEvent::DuplicateAcked { kind, ack }));
            }
            Disposition::AcceptSize { size, ack } => {
                channel.send_to(&segment::encode_ack(ack), config.relay)?;
                logger.log(recv_log(TransferEvent::SizeAccepted { size }));
            }
            Disposition::AcceptName { name, ack } => {
                fs::create_dir_all(&config.output_dir)?;
                let path = config.output_dir.join(sanitize_name(&name));
                out = Some(
                    OpenOptions::new()
                        .write(true)
                        .create(true)
                        .truncate(true)
                        .open(&path)?,
                );
                file_name = name;
                channel.send_to(&segment::encode_ack(ack), config.relay)?;
                logger.log(recv_log(TransferEvent::NameAccepted {
                    name: file_name.clone(),
                }));
            }
            Disposition::AcceptData { ack, eof } => {
                if eof {
                    // End of file is authoritative, but the counter must
                    // agree with the announcement; failing here leaves the
                    // sender unsatisfied, which is the truthful outcome.
                    if let Some(file) = out.as_mut() {
                        file.sync_all()?;
                    }
                    let announced = machine.announced_size().unwrap_or(0);
                    if machine.bytes_written() != u64::from(announced) {
                        return Err(RecvError::SizeMismatch {
                            announced,
                            written: machine.bytes_written(),
                        });
                    }
                    channel.send_to(&segment::encode_ack(ack), config.relay)?;
                    break;
                }
                // Write before ACKing: a failed write must look like a
                // lost segment to the sender, not a delivered one.
                if let Some(file) = out.as_mut() {
                    file.write_all(segment::segment_payload(datagram))?;
                }
                channel.send_to(&segment::encode_ack(ack), config.relay)?;
                data_segments += 1;
                logger.log(recv_log(TransferEvent::DataAccepted {
                    seq: ack,
                    len: datagram.len() - segment::SENDER_HEADER_LEN,
                    total: machine.bytes_written(),
                }));
            }
        }
    }

    linger(&channel, &mut machine, &config, &logger, &mut duplicates_acked)?;

    let elapsed = started.map(|t| t.elapsed()).unwrap_or_default();
    logger.log(recv_log(TransferEvent::TransferComplete {
        bytes: machine.bytes_written(),
        duration_ms: elapsed.as_millis() as u64,
        retransmits: duplicates_acked,
    }));

    Ok(RecvSummary {
        file_name,
        announced_size: machine.announced_size().unwrap_or(0),
        bytes_written: machine.bytes_written(),
        data_segments,
        duplicates_acked,
        elapsed,
    })
}

/// Keep re-ACKing retransmissions of the final segment until the sender
/// has been quiet for one full linger window. Without this, a lost final
/// ACK would strand the sender retransmitting into a closed socket.
fn linger(
    channel: &DatagramChannel,
    machine: &mut ReceiverMachine,
    config: &RecvConfig,
    logger: &Arc<dyn TransferLogger>,
    duplicates_acked: &mut u64,
) -> io::Result<()> {
    if config.linger.is_zero() {
        return Ok(());
    }
    let mut deadline = Instant::now() + config.linger;
    let mut buf = [0u8; MAX_SEGMENT];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(());
        }
        channel.set_read_timeout(remaining)?;
        let (len, _src) = match channel.recv_timeout(&mut buf)? {
            Some(received) => received,
            None => continue,
        };
        let datagram = &buf[..len];
        let header = match segment::decode_sender_header(datagram) {
            Ok(header) => header,
            Err(_) => continue,
        };
        if let Disposition::ReAck { kind, ack } =
            machine.on_segment(header, segment::segment_payload(datagram))
        {
            channel.send_to(&segment::encode_ack(ack), config.relay)?;
            *duplicates_acked += 1;
            logger.log(recv_log(TransferEvent::DuplicateAcked { kind, ack }));
            // The sender is still retrying; restart the quiet window.
            deadline = Instant::now() + config.linger;
        }
    }
}

/// Reduce a decoded file name to its final path component so a crafted
/// name cannot escape the receive directory.
fn sanitize_name(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("unnamed")
}

fn recv_log(event: TransferEvent) -> TransferLog {
    TransferLog {
        endpoint: "receiver",
        event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn peer() -> Origin {
        Origin::new(Ipv4Addr::new(10, 0, 0, 1), 5555)
    }

    fn header(kind: u8, seq: u8) -> RawHeader {
        RawHeader {
            origin: peer(),
            kind,
            seq,
        }
    }

    fn size_payload(size: u32) -> [u8; 4] {
        size.to_be_bytes()
    }

    fn name_payload(name: &str) -> Vec<u8> {
        segment::pack_fixed_text(name, FILE_NAME_WIDTH)
    }

    /// Machine that already accepted size=3000 and name (bit 1); the
    /// first data bit expected is 0.
    fn machine_in_data_phase() -> ReceiverMachine {
        let mut machine = ReceiverMachine::new();
        assert_eq!(
            machine.on_segment(header(1, 0), &size_payload(3000)),
            Disposition::AcceptSize {
                size: 3000,
                ack: SeqBit::Zero
            }
        );
        assert_eq!(
            machine.on_segment(header(2, 1), &name_payload("data.bin")),
            Disposition::AcceptName {
                name: "data.bin".to_string(),
                ack: SeqBit::One
            }
        );
        machine
    }

    #[test]
    fn test_first_segment_locks_peer_and_accepts_size() {
        let mut machine = ReceiverMachine::new();
        assert_eq!(machine.peer(), None);
        let disposition = machine.on_segment(header(1, 0), &size_payload(42));
        assert_eq!(
            disposition,
            Disposition::AcceptSize {
                size: 42,
                ack: SeqBit::Zero
            }
        );
        assert_eq!(machine.peer(), Some(peer()));
        assert_eq!(machine.phase(), ReceiverPhase::AwaitingFileName);
        assert_eq!(machine.announced_size(), Some(42));
    }

    #[test]
    fn test_noise_before_size_is_ignored() {
        let mut machine = ReceiverMachine::new();
        for kind in [2u8, 3] {
            assert!(matches!(
                machine.on_segment(header(kind, 0), &[0u8; 20]),
                Disposition::Ignore { .. }
            ));
            assert_eq!(machine.phase(), ReceiverPhase::AwaitingFileSize);
        }
    }

    #[test]
    fn test_duplicate_size_is_reacked_without_reprocessing() {
        let mut machine = ReceiverMachine::new();
        machine.on_segment(header(1, 0), &size_payload(42));
        // Retransmission with a different (corrupted) length: the stored
        // size must not change and the phase must hold.
        let disposition = machine.on_segment(header(1, 0), &size_payload(99));
        assert_eq!(
            disposition,
            Disposition::ReAck {
                kind: MessageType::FileSize,
                ack: SeqBit::Zero
            }
        );
        assert_eq!(machine.announced_size(), Some(42));
        assert_eq!(machine.phase(), ReceiverPhase::AwaitingFileName);
    }

    #[test]
    fn test_name_sets_expected_data_bit() {
        let mut machine = machine_in_data_phase();
        // First chunk carries bit 0 (name bit flipped).
        let disposition = machine.on_segment(header(3, 0), &[7u8; 1000]);
        assert_eq!(
            disposition,
            Disposition::AcceptData {
                ack: SeqBit::Zero,
                eof: false
            }
        );
        assert_eq!(machine.bytes_written(), 1000);
    }

    #[test]
    fn test_data_before_name_is_ignored() {
        let mut machine = ReceiverMachine::new();
        machine.on_segment(header(1, 0), &size_payload(10));
        assert_eq!(
            machine.on_segment(header(3, 1), &[7u8; 10]),
            Disposition::Ignore {
                reason: "data before file_name"
            }
        );
        assert_eq!(machine.phase(), ReceiverPhase::AwaitingFileName);
    }

    #[test]
    fn test_duplicate_name_is_reacked() {
        let mut machine = machine_in_data_phase();
        let disposition = machine.on_segment(header(2, 1), &name_payload("data.bin"));
        assert_eq!(
            disposition,
            Disposition::ReAck {
                kind: MessageType::FileName,
                ack: SeqBit::One
            }
        );
        assert_eq!(machine.phase(), ReceiverPhase::AwaitingFile);
        assert_eq!(machine.bytes_written(), 0);
    }

    #[test]
    fn test_size_after_name_is_ignored() {
        let mut machine = machine_in_data_phase();
        assert_eq!(
            machine.on_segment(header(1, 0), &size_payload(3000)),
            Disposition::Ignore {
                reason: "file_size after file_name"
            }
        );
    }

    #[test]
    fn test_data_alternates_and_duplicates_reack_previous_bit() {
        let mut machine = machine_in_data_phase();
        machine.on_segment(header(3, 0), &[1u8; 1000]);

        // Stale retransmission of the chunk just ACKed.
        let disposition = machine.on_segment(header(3, 0), &[1u8; 1000]);
        assert_eq!(
            disposition,
            Disposition::ReAck {
                kind: MessageType::FileData,
                ack: SeqBit::Zero
            }
        );
        assert_eq!(machine.bytes_written(), 1000);

        // The next fresh chunk carries the flipped bit.
        let disposition = machine.on_segment(header(3, 1), &[2u8; 1000]);
        assert_eq!(
            disposition,
            Disposition::AcceptData {
                ack: SeqBit::One,
                eof: false
            }
        );
        assert_eq!(machine.bytes_written(), 2000);
    }

    #[test]
    fn test_foreign_origin_is_ignored_after_lock() {
        let mut machine = machine_in_data_phase();
        let rogue = RawHeader {
            origin: Origin::new(Ipv4Addr::new(10, 9, 8, 7), 4444),
            kind: 3,
            seq: 0,
        };
        assert_eq!(
            machine.on_segment(rogue, &[9u8; 1000]),
            Disposition::Ignore {
                reason: "foreign origin"
            }
        );
        assert_eq!(machine.peer(), Some(peer()));
        assert_eq!(machine.bytes_written(), 0);
        assert_eq!(machine.phase(), ReceiverPhase::AwaitingFile);
    }

    #[test]
    fn test_out_of_range_bytes_are_ignored() {
        let mut machine = machine_in_data_phase();
        assert_eq!(
            machine.on_segment(header(3, 7), &[1u8; 10]),
            Disposition::Ignore {
                reason: "sequence bit out of range"
            }
        );
        assert_eq!(
            machine.on_segment(header(9, 0), &[1u8; 10]),
            Disposition::Ignore {
                reason: "unknown message type"
            }
        );
        assert_eq!(machine.bytes_written(), 0);
    }

    #[test]
    fn test_short_payloads_are_ignored() {
        let mut machine = ReceiverMachine::new();
        assert_eq!(
            machine.on_segment(header(1, 0), &[0u8; 3]),
            Disposition::Ignore {
                reason: "short file_size payload"
            }
        );
        assert_eq!(machine.phase(), ReceiverPhase::AwaitingFileSize);

        machine.on_segment(header(1, 0), &size_payload(10));
        assert_eq!(
            machine.on_segment(header(2, 1), &[b'a'; 19]),
            Disposition::Ignore {
                reason: "short file_name payload"
            }
        );
        assert_eq!(machine.phase(), ReceiverPhase::AwaitingFileName);
    }

    #[test]
    fn test_oversized_data_payload_is_ignored() {
        let mut machine = machine_in_data_phase();
        assert_eq!(
            machine.on_segment(header(3, 0), &[1u8; MAX_DATA_CHUNK + 1]),
            Disposition::Ignore {
                reason: "oversized data payload"
            }
        );
    }

    #[test]
    fn test_empty_data_segment_completes() {
        let mut machine = machine_in_data_phase();
        machine.on_segment(header(3, 0), &[1u8; 1000]);
        let disposition = machine.on_segment(header(3, 1), &[]);
        assert_eq!(
            disposition,
            Disposition::AcceptData {
                ack: SeqBit::One,
                eof: true
            }
        );
        assert_eq!(machine.phase(), ReceiverPhase::Complete);
        assert_eq!(machine.bytes_written(), 1000);
    }

    #[test]
    fn test_retransmitted_final_segment_is_reacked_after_complete() {
        let mut machine = machine_in_data_phase();
        machine.on_segment(header(3, 0), &[1u8; 1000]);
        machine.on_segment(header(3, 1), &[]);
        assert_eq!(machine.phase(), ReceiverPhase::Complete);

        let disposition = machine.on_segment(header(3, 1), &[]);
        assert_eq!(
            disposition,
            Disposition::ReAck {
                kind: MessageType::FileData,
                ack: SeqBit::One
            }
        );
        // Fresh-looking traffic after completion is not resurrected.
        assert_eq!(
            machine.on_segment(header(3, 0), &[1u8; 10]),
            Disposition::Ignore {
                reason: "transfer already complete"
            }
        );
    }

    #[test]
    fn test_sanitize_name_strips_directories() {
        assert_eq!(sanitize_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_name("dir/inner.txt"), "inner.txt");
        assert_eq!(sanitize_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_name(""), "unnamed");
        assert_eq!(sanitize_name(".."), "unnamed");
    }
}
