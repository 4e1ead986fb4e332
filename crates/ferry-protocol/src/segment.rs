/// Wire format for the alternating-bit transfer protocol.
///
/// ```text
/// Sender-originated segment:
/// [0..4]   origin IPv4 octets
/// [4..6]   origin port (u16 BE)
/// [6]      message type (1 = file size, 2 = file name, 3 = file data)
/// [7]      sequence bit (0 or 1)
/// [8..]    payload (4 bytes, 20 bytes, or up to 1000 bytes by type)
///
/// Receiver-originated segment (ACK):
/// [0]      acknowledged sequence bit
/// ```
///
/// 8-byte header + up to 1000 bytes payload = 1008 bytes max, well under
/// loopback and Ethernet MTUs. Multi-byte integers are big-endian.
///
/// The origin travels in-band because segments arrive via a relay: the
/// datagram's transport source is the relay, not the sender, so the
/// receiver locks onto the header origin instead.

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::ProtocolError;
use crate::sequence::SeqBit;

/// Sender header size in bytes.
pub const SENDER_HEADER_LEN: usize = 8;

/// ACK segment size in bytes.
pub const ACK_LEN: usize = 1;

/// File-size payload: one u32 BE.
pub const FILE_SIZE_PAYLOAD_LEN: usize = 4;

/// Fixed width of the file-name payload.
pub const FILE_NAME_WIDTH: usize = 20;

/// Maximum bytes of file content per data segment. A zero-length data
/// payload marks end of file.
pub const MAX_DATA_CHUNK: usize = 1000;

/// Maximum sender segment size (header + largest payload).
pub const MAX_SEGMENT: usize = SENDER_HEADER_LEN + MAX_DATA_CHUNK;

/// Sender identity stamped into every segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Origin {
    pub fn new(ip: Ipv4Addr, port: u16) -> Origin {
        Origin { ip, port }
    }

    /// Parse an operator-supplied dotted-decimal address and port.
    pub fn parse(addr: &str, port: u32) -> Result<Origin, ProtocolError> {
        let ip: Ipv4Addr = addr.parse().map_err(|_| ProtocolError::Format {
            input: addr.to_string(),
            reason: "not a dotted-decimal IPv4 address",
        })?;
        let port = u16::try_from(port).map_err(|_| ProtocolError::Format {
            input: port.to_string(),
            reason: "port does not fit in 16 bits",
        })?;
        Ok(Origin { ip, port })
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Segment kinds a sender can originate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    FileSize = 1,
    FileName = 2,
    FileData = 3,
}

impl MessageType {
    /// Decode a wire tag. An unknown tag is channel noise for the caller
    /// to drop, not a codec failure.
    pub fn from_wire(tag: u8) -> Option<MessageType> {
        match tag {
            1 => Some(MessageType::FileSize),
            2 => Some(MessageType::FileName),
            3 => Some(MessageType::FileData),
            _ => None,
        }
    }

    pub fn wire(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::FileSize => "file_size",
            MessageType::FileName => "file_name",
            MessageType::FileData => "file_data",
        };
        write!(f, "{}", name)
    }
}

/// Sender header as it appeared on the wire.
///
/// `kind` and `seq` stay raw bytes: out-of-range values reach the state
/// machines, which decide whether the segment is droppable noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    pub origin: Origin,
    pub kind: u8,
    pub seq: u8,
}

/// Encode the 8-byte sender header.
pub fn encode_sender_header(
    origin: Origin,
    kind: MessageType,
    seq: SeqBit,
) -> [u8; SENDER_HEADER_LEN] {
    let mut buf = [0u8; SENDER_HEADER_LEN];
    buf[0..4].copy_from_slice(&origin.ip.octets());
    buf[4..6].copy_from_slice(&origin.port.to_be_bytes());
    buf[6] = kind.wire();
    buf[7] = seq.wire();
    buf
}

/// Decode a sender header. Fails only on truncation; range checks on
/// `kind` and `seq` are the state machines' job.
pub fn decode_sender_header(data: &[u8]) -> Result<RawHeader, ProtocolError> {
    if data.len() < SENDER_HEADER_LEN {
        return Err(ProtocolError::Truncated {
            needed: SENDER_HEADER_LEN,
            got: data.len(),
        });
    }
    Ok(RawHeader {
        origin: Origin {
            ip: Ipv4Addr::new(data[0], data[1], data[2], data[3]),
            port: u16::from_be_bytes([data[4], data[5]]),
        },
        kind: data[6],
        seq: data[7],
    })
}

/// Payload slice of a raw sender segment. Call only after
/// `decode_sender_header` succeeded on the same bytes.
pub fn segment_payload(data: &[u8]) -> &[u8] {
    &data[SENDER_HEADER_LEN..]
}

/// Encode the single-byte ACK.
pub fn encode_ack(bit: SeqBit) -> [u8; ACK_LEN] {
    [bit.wire()]
}

/// Decode an ACK byte. Range validation is the caller's.
pub fn decode_ack(data: &[u8]) -> Result<u8, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::Truncated {
            needed: ACK_LEN,
            got: 0,
        });
    }
    Ok(data[0])
}

/// Build a complete file-size segment: header + u32 BE length.
pub fn file_size_segment(origin: Origin, seq: SeqBit, len: u32) -> Vec<u8> {
    let mut seg = Vec::with_capacity(SENDER_HEADER_LEN + FILE_SIZE_PAYLOAD_LEN);
    seg.extend_from_slice(&encode_sender_header(origin, MessageType::FileSize, seq));
    seg.extend_from_slice(&len.to_be_bytes());
    seg
}

/// Build a complete file-name segment: header + 20-byte fixed text.
pub fn file_name_segment(origin: Origin, seq: SeqBit, name: &str) -> Vec<u8> {
    let mut seg = Vec::with_capacity(SENDER_HEADER_LEN + FILE_NAME_WIDTH);
    seg.extend_from_slice(&encode_sender_header(origin, MessageType::FileName, seq));
    seg.extend_from_slice(&pack_fixed_text(name, FILE_NAME_WIDTH));
    seg
}

/// Build a complete file-data segment. An empty chunk is the end-of-file
/// marker.
pub fn file_data_segment(origin: Origin, seq: SeqBit, chunk: &[u8]) -> Vec<u8> {
    debug_assert!(chunk.len() <= MAX_DATA_CHUNK);
    let mut seg = Vec::with_capacity(SENDER_HEADER_LEN + chunk.len());
    seg.extend_from_slice(&encode_sender_header(origin, MessageType::FileData, seq));
    seg.extend_from_slice(chunk);
    seg
}

/// Pack text into exactly `width` bytes of UTF-8: truncate backward to a
/// code-point boundary if too long, pad right with ASCII space if short.
/// Never splits a multi-byte character. Total for any input and width.
pub fn pack_fixed_text(source: &str, width: usize) -> Vec<u8> {
    let mut cut = source.len().min(width);
    while !source.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = Vec::with_capacity(width);
    out.extend_from_slice(&source.as_bytes()[..cut]);
    out.resize(width, b' ');
    out
}

/// Inverse of `pack_fixed_text`: decode as UTF-8, dropping an undecodable
/// trailing fragment, then strip trailing whitespace.
pub fn unpack_fixed_text(data: &[u8]) -> String {
    let text = match std::str::from_utf8(data) {
        Ok(text) => text,
        // A fragment produced by width truncation can only sit at the
        // tail; everything before valid_up_to decodes cleanly.
        Err(e) => std::str::from_utf8(&data[..e.valid_up_to()]).unwrap_or(""),
    };
    text.trim_end().to_string()
}
