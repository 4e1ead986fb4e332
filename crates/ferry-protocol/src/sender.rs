/// Sending endpoint: announce size, announce name, stream data chunks.
///
/// Flow:
///   1. Open the file; its length must fit the 4-byte size field
///   2. Bind the UDP socket
///   3. Walk SendingSize → SendingName → SendingData with exactly one
///      outstanding segment, retransmitting it on a fixed timeout until
///      the matching ACK arrives
///   4. The data phase reads 1000-byte chunks; the empty read at end of
///      file is itself sent as the final segment and acknowledged like
///      any other

use std::fs::File;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::channel::DatagramChannel;
use crate::logging::{TransferEvent, TransferLog, TransferLogger};
use crate::segment::{self, MessageType, Origin, MAX_DATA_CHUNK, MAX_SEGMENT, SENDER_HEADER_LEN};
use crate::sequence::SeqBit;

/// Sender configuration.
pub struct SendConfig {
    /// Identity stamped into every header; what the receiver locks onto.
    pub origin: Origin,
    /// Relay address every segment is sent to.
    pub relay: SocketAddr,
    /// Local bind address.
    pub bind: SocketAddr,
    /// File to transfer.
    pub file_path: PathBuf,
    /// How long to wait for an ACK before retransmitting.
    pub ack_timeout: Duration,
    /// Delay after each send; throttles against local buffer overrun.
    pub pacing: Duration,
}

/// Transfer result.
#[derive(Debug)]
pub struct SendSummary {
    pub file_name: String,
    pub file_size: u32,
    /// Data segments carrying content (the end-of-file segment not counted).
    pub data_segments: u64,
    /// Retransmissions across all phases.
    pub retransmits: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The announced length travels as a u32; larger files cannot be
    /// represented on the wire.
    #[error("{} is {size} bytes, which does not fit the 4-byte length field", .path.display())]
    FileTooLarge { path: PathBuf, size: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SenderPhase {
    SendingSize,
    SendingName,
    SendingData,
    Complete,
}

/// Run the sender. Blocks until the transfer completes or an I/O error
/// ends it; wire loss never surfaces, only retransmission.
pub fn run_sender(
    config: SendConfig,
    logger: Arc<dyn TransferLogger>,
) -> Result<SendSummary, SendError> {
    let mut file = File::open(&config.file_path)?;
    let file_len = file.metadata()?.len();
    let size = u32::try_from(file_len).map_err(|_| SendError::FileTooLarge {
        path: config.file_path.clone(),
        size: file_len,
    })?;
    let file_name = config
        .file_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("unnamed")
        .to_string();

    let channel = DatagramChannel::bind(config.bind, config.ack_timeout)?;
    let mut io = SenderIo {
        channel,
        config: &config,
        logger,
        retransmits: 0,
    };

    let start = Instant::now();
    let mut seq = SeqBit::Zero;
    let mut data_segments: u64 = 0;
    let mut chunk = vec![0u8; MAX_DATA_CHUNK];
    let mut phase = SenderPhase::SendingSize;

    loop {
        phase = match phase {
            SenderPhase::SendingSize => {
                let segment = segment::file_size_segment(config.origin, seq, size);
                io.deliver(&segment, MessageType::FileSize, seq)?;
                seq = seq.flip();
                SenderPhase::SendingName
            }
            SenderPhase::SendingName => {
                let segment = segment::file_name_segment(config.origin, seq, &file_name);
                io.deliver(&segment, MessageType::FileName, seq)?;
                seq = seq.flip();
                SenderPhase::SendingData
            }
            SenderPhase::SendingData => {
                let n = read_chunk(&mut file, &mut chunk)?;
                let segment = segment::file_data_segment(config.origin, seq, &chunk[..n]);
                io.deliver(&segment, MessageType::FileData, seq)?;
                seq = seq.flip();
                if n == 0 {
                    // The acknowledged empty segment was the end-of-file
                    // marker; nothing is sent after it.
                    SenderPhase::Complete
                } else {
                    data_segments += 1;
                    SenderPhase::SendingData
                }
            }
            SenderPhase::Complete => break,
        };
    }

    let elapsed = start.elapsed();
    io.logger.log(send_log(TransferEvent::TransferComplete {
        bytes: u64::from(size),
        duration_ms: elapsed.as_millis() as u64,
        retransmits: io.retransmits,
    }));

    Ok(SendSummary {
        file_name,
        file_size: size,
        data_segments,
        retransmits: io.retransmits,
        elapsed,
    })
}

struct SenderIo<'a> {
    channel: DatagramChannel,
    config: &'a SendConfig,
    logger: Arc<dyn TransferLogger>,
    retransmits: u64,
}

impl SenderIo<'_> {
    /// Send one segment and retransmit it unchanged until its ACK arrives.
    fn deliver(&mut self, segment: &[u8], kind: MessageType, seq: SeqBit) -> io::Result<()> {
        let mut retransmit = false;
        loop {
            self.channel.send_to(segment, self.config.relay)?;
            self.logger.log(send_log(TransferEvent::SegmentSent {
                kind,
                seq,
                payload_len: segment.len() - SENDER_HEADER_LEN,
                retransmit,
            }));
            if retransmit {
                self.retransmits += 1;
            }
            // Pacing guards the local socket buffer, not correctness.
            if !self.config.pacing.is_zero() {
                thread::sleep(self.config.pacing);
            }
            if self.await_matching_ack(seq)? {
                return Ok(());
            }
            self.logger.log(send_log(TransferEvent::AckTimeout { kind, seq }));
            retransmit = true;
        }
    }

    /// Wait up to the ACK timeout for the ACK matching `expected`. Stale
    /// and malformed ACKs are consumed without restarting the window.
    /// Returns false when the window closes empty-handed.
    fn await_matching_ack(&self, expected: SeqBit) -> io::Result<bool> {
        let deadline = Instant::now() + self.config.ack_timeout;
        let mut buf = [0u8; MAX_SEGMENT];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            self.channel.set_read_timeout(remaining)?;
            let (len, _src) = match self.channel.recv_timeout(&mut buf)? {
                Some(received) => received,
                None => continue,
            };
            let ack = match segment::decode_ack(&buf[..len]) {
                Ok(byte) => byte,
                // A zero-length datagram; no different from a lost one.
                Err(_) => continue,
            };
            let matched = ack == expected.wire();
            self.logger.log(send_log(TransferEvent::AckReceived { ack, matched }));
            if matched {
                return Ok(true);
            }
        }
    }
}

/// Read up to one full chunk, filling through short reads. Returns the
/// number of bytes read; zero only at end of file.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn send_log(event: TransferEvent) -> TransferLog {
    TransferLog {
        endpoint: "sender",
        event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::Ipv4Addr;

    use crate::logging::NullLogger;

    #[test]
    fn test_read_chunk_fills_and_terminates() {
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        let mut reader = Cursor::new(data.clone());
        let mut buf = vec![0u8; MAX_DATA_CHUNK];

        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 1000);
        assert_eq!(&buf[..1000], &data[..1000]);
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 1000);
        assert_eq!(&buf[..1000], &data[1000..2000]);
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 500);
        assert_eq!(&buf[..500], &data[2000..]);
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_chunk_empty_input() {
        let mut reader = Cursor::new(Vec::<u8>::new());
        let mut buf = vec![0u8; MAX_DATA_CHUNK];
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_oversized_file_is_rejected() {
        let path = std::env::temp_dir().join("ferry_test_oversized.bin");
        // Sparse file: only the metadata length matters, nothing is read.
        let file = File::create(&path).unwrap();
        let too_big = u64::from(u32::MAX) + 1;
        file.set_len(too_big).unwrap();
        drop(file);

        let config = SendConfig {
            origin: Origin::new(Ipv4Addr::LOCALHOST, 5555),
            relay: "127.0.0.1:0".parse().unwrap(),
            bind: "127.0.0.1:0".parse().unwrap(),
            file_path: path.clone(),
            ack_timeout: Duration::from_millis(10),
            pacing: Duration::ZERO,
        };
        let result = run_sender(config, Arc::new(NullLogger));
        assert!(
            matches!(result, Err(SendError::FileTooLarge { size, .. }) if size == too_big),
            "expected the length-field rejection, got {result:?}"
        );

        let _ = std::fs::remove_file(&path);
    }
}
