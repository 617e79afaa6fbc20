//! Per-value frame message codec and the `tokio_util::codec::Decoder` that
//! turns a raw TCP byte stream into a sequence of [`FrameMessage`]s: a
//! four-byte network-byte-order length prefix followed by a payload,
//! decoded incrementally out of a growing `BytesMut` rather than
//! requiring the whole message up front.
//!
//! Deliberately preserved wire quirk: the *name length* inside a value
//! payload is **native** byte order, while the length prefix wrapping the
//! whole message - and every integer in the schema blob (`wire::schema`)
//! - is network byte order. Changing this is a wire-protocol version
//! bump, not a silent fix.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Result, StreamError};

pub const END_OF_FRAME: u8 = 0xFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameMessage {
    /// One variable's current value, `name` plus its raw value bytes.
    Value { name: String, payload: Vec<u8> },
    /// The single-byte `0xFF` sentinel: end-of-frame when sent
    /// producer -> consumer, a time-step release when sent
    /// consumer -> producer. Direction gives it its meaning; the byte
    /// layout is identical either way.
    Sentinel,
}

impl FrameMessage {
    fn encoded_len(&self) -> usize {
        match self {
            FrameMessage::Sentinel => 1,
            FrameMessage::Value { name, payload } => 4 + name.len() + payload.len(),
        }
    }
}

/// Length-delimited codec for [`FrameMessage`]: `u32` network-byte-order
/// total length, then the payload described above.
#[derive(Debug, Default)]
pub struct FrameCodec {
    next_len: Option<usize>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self { next_len: None }
    }
}

impl Decoder for FrameCodec {
    type Item = FrameMessage;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<FrameMessage>> {
        let len = match self.next_len {
            Some(len) => len,
            None => {
                if src.len() < 4 {
                    return Ok(None);
                }
                let len = u32::from_be_bytes(src[0..4].try_into().unwrap()) as usize;
                src.advance(4);
                self.next_len = Some(len);
                len
            }
        };

        if src.len() < len {
            return Ok(None);
        }
        let payload = src.split_to(len);
        self.next_len = None;

        if payload.len() == 1 {
            if payload[0] != END_OF_FRAME {
                return Err(StreamError::SchemaDecode(format!(
                    "unexpected single-byte frame payload 0x{:02x}",
                    payload[0]
                )));
            }
            return Ok(Some(FrameMessage::Sentinel));
        }
        if payload.len() <= 4 {
            return Err(StreamError::SchemaDecode(format!(
                "frame payload too short to contain a name length: {} bytes",
                payload.len()
            )));
        }

        let name_len = u32::from_ne_bytes(payload[0..4].try_into().unwrap()) as usize;
        if 4 + name_len > payload.len() {
            return Err(StreamError::SchemaDecode(format!(
                "frame name_length {name_len} overruns payload of {} bytes",
                payload.len()
            )));
        }
        let name = String::from_utf8(payload[4..4 + name_len].to_vec())
            .map_err(|e| StreamError::SchemaDecode(format!("invalid utf8 in frame name: {e}")))?;
        let value = payload[4 + name_len..].to_vec();

        Ok(Some(FrameMessage::Value {
            name,
            payload: value,
        }))
    }
}

impl Encoder<FrameMessage> for FrameCodec {
    type Error = StreamError;

    fn encode(&mut self, item: FrameMessage, dst: &mut BytesMut) -> Result<()> {
        let len = item.encoded_len();
        dst.reserve(4 + len);
        dst.put_u32(len as u32);
        match item {
            FrameMessage::Sentinel => dst.put_u8(END_OF_FRAME),
            FrameMessage::Value { name, payload } => {
                dst.put_u32_ne(name.len() as u32);
                dst.put_slice(name.as_bytes());
                dst.put_slice(&payload);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: FrameMessage) -> FrameMessage {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(msg, &mut buf).unwrap();
        codec.decode(&mut buf).unwrap().unwrap()
    }

    #[test]
    fn round_trips_a_named_value() {
        let msg = FrameMessage::Value {
            name: "time_step".into(),
            payload: 7u32.to_ne_bytes().to_vec(),
        };
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn round_trips_the_sentinel() {
        assert_eq!(round_trip(FrameMessage::Sentinel), FrameMessage::Sentinel);
    }

    #[test]
    fn decoder_waits_for_a_full_message_across_partial_reads() {
        let mut codec = FrameCodec::new();
        let mut full = BytesMut::new();
        codec
            .encode(
                FrameMessage::Value {
                    name: "x".into(),
                    payload: vec![1, 2, 3, 4],
                },
                &mut full,
            )
            .unwrap();

        let mut partial = BytesMut::from(&full[..full.len() - 2]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[full.len() - 2..]);
        assert!(codec.decode(&mut partial).unwrap().is_some());
    }

    #[test]
    fn rejects_a_non_sentinel_single_byte_payload() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(1);
        buf.put_u8(0x01);
        assert!(codec.decode(&mut buf).is_err());
    }
}
