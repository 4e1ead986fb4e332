/// Alternating sequence bit for stop-and-wait ARQ.
///
/// With one segment outstanding at a time, a single bit is enough to
/// tell a fresh segment from a retransmission of the previous one. Both
/// endpoints flip it in lockstep: the sender on a matching ACK, the
/// receiver on a correctly sequenced segment.

use std::fmt;

use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqBit {
    Zero,
    One,
}

impl SeqBit {
    /// The transition rule: next(0) = 1, next(1) = 0.
    pub fn flip(self) -> SeqBit {
        match self {
            SeqBit::Zero => SeqBit::One,
            SeqBit::One => SeqBit::Zero,
        }
    }

    /// Byte carried on the wire.
    pub fn wire(self) -> u8 {
        match self {
            SeqBit::Zero => 0,
            SeqBit::One => 1,
        }
    }
}

impl TryFrom<u8> for SeqBit {
    type Error = ProtocolError;

    /// Wire-side validation. A closed enum cannot hold a third value, so
    /// the "impossible" sequence byte is caught here and nowhere else.
    fn try_from(value: u8) -> Result<SeqBit, ProtocolError> {
        match value {
            0 => Ok(SeqBit::Zero),
            1 => Ok(SeqBit::One),
            other => Err(ProtocolError::InvalidSequenceBit(other)),
        }
    }
}

impl fmt::Display for SeqBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_is_an_involution() {
        assert_eq!(SeqBit::Zero.flip(), SeqBit::One);
        assert_eq!(SeqBit::One.flip(), SeqBit::Zero);
        assert_eq!(SeqBit::Zero.flip().flip(), SeqBit::Zero);
        assert_eq!(SeqBit::One.flip().flip(), SeqBit::One);
    }

    #[test]
    fn test_wire_round_trip() {
        assert_eq!(SeqBit::try_from(SeqBit::Zero.wire()), Ok(SeqBit::Zero));
        assert_eq!(SeqBit::try_from(SeqBit::One.wire()), Ok(SeqBit::One));
    }

    #[test]
    fn test_rejects_other_bytes() {
        for byte in [2u8, 3, 17, 0xFF] {
            assert_eq!(
                SeqBit::try_from(byte),
                Err(ProtocolError::InvalidSequenceBit(byte))
            );
        }
    }
}
