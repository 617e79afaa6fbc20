//! The fixed 21-byte handshake record exchanged once per connection right
//! after a TCP connect/accept, before any schema blob or frame traffic: a
//! fixed-size record with an explicit byte layout, encoded/decoded as a
//! whole rather than field-by-field off the stream.
//!
//! Byte layout: `[0:4) producer_ranks_total, [4:12) connection_id,
//! [12:16) sender_rank, [16:20) sender_ranks_total, [20] endianness`.
//! `sender_rank` and `sender_ranks_total` describe whichever side is
//! sending the record - a consumer sending this to a producer fills in
//! its own rank/size there, which is why the same record type serves
//! both directions.

use crate::error::{Result, StreamError};
use crate::util::cursor::{ReadCursor, WriteCursor};
use crate::wire::Endianness;

pub const HANDSHAKE_SIZE: usize = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeRecord {
    /// The producer group's total rank count, as already known/assumed
    /// by the sender; the receiving producer rejects the connection if
    /// this doesn't match its own size.
    pub producer_ranks_total: i32,
    /// Opaque identifier chosen by the consumer rank that first
    /// connected to the producer's master listener; carried unchanged to
    /// every connection that consumer's group opens.
    pub connection_id: u64,
    /// The sending rank's own rank number.
    pub sender_rank: i32,
    /// The sending rank's own group size.
    pub sender_ranks_total: i32,
    pub endianness: Endianness,
}

impl HandshakeRecord {
    pub fn encode(&self) -> [u8; HANDSHAKE_SIZE] {
        let mut w = WriteCursor::with_capacity(HANDSHAKE_SIZE);
        w.write_u32_be(self.producer_ranks_total as u32);
        w.write_bytes(&self.connection_id.to_be_bytes());
        w.write_u32_be(self.sender_rank as u32);
        w.write_u32_be(self.sender_ranks_total as u32);
        w.write_u8(self.endianness.as_byte());
        let bytes = w.into_vec();
        let mut out = [0u8; HANDSHAKE_SIZE];
        out.copy_from_slice(&bytes);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HANDSHAKE_SIZE {
            return Err(StreamError::HandshakeSize {
                expected: HANDSHAKE_SIZE,
                got: bytes.len(),
            });
        }
        let mut r = ReadCursor::new(bytes);
        let producer_ranks_total = r.read_u32_be()? as i32;
        let connection_id = u64::from_be_bytes(r.read_bytes(8)?.try_into().unwrap());
        let sender_rank = r.read_u32_be()? as i32;
        let sender_ranks_total = r.read_u32_be()? as i32;
        let endianness = Endianness::from_byte(r.read_u8()?);
        Ok(Self {
            producer_ranks_total,
            connection_id,
            sender_rank,
            sender_ranks_total,
            endianness,
        })
    }
}

/// Patches the `sender_rank` field of an already-encoded record in
/// place, used after a broadcast record is received: every consumer
/// rank overwrites this field with its own rank before sending the
/// record onward to its assigned producer connections.
pub fn patch_sender_rank(record_bytes: &mut [u8; HANDSHAKE_SIZE], rank: i32) {
    record_bytes[12..16].copy_from_slice(&(rank as u32).to_be_bytes());
}

pub fn patch_endianness(record_bytes: &mut [u8; HANDSHAKE_SIZE], endianness: Endianness) {
    record_bytes[20] = endianness.as_byte();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HandshakeRecord {
        HandshakeRecord {
            producer_ranks_total: 8,
            connection_id: 0xDEAD_BEEF,
            sender_rank: 3,
            sender_ranks_total: 4,
            endianness: Endianness::probe(),
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let record = sample();
        let bytes = record.encode();
        assert_eq!(bytes.len(), HANDSHAKE_SIZE);
        assert_eq!(HandshakeRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn rejects_wrong_size() {
        let err = HandshakeRecord::decode(&[0u8; 20]).unwrap_err();
        assert!(matches!(err, StreamError::HandshakeSize { .. }));
    }

    #[test]
    fn patch_helpers_mutate_in_place() {
        let mut bytes = sample().encode();
        patch_sender_rank(&mut bytes, 2);
        patch_endianness(&mut bytes, Endianness::Big);
        let decoded = HandshakeRecord::decode(&bytes).unwrap();
        assert_eq!(decoded.sender_rank, 2);
        assert_eq!(decoded.endianness, Endianness::Big);
        assert_eq!(decoded.connection_id, 0xDEAD_BEEF);
    }
}
