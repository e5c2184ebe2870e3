//! Framing codec for CHAT packets
//!
//! Implements `tokio_util::codec::{Encoder, Decoder}` so a `TcpStream` can
//! be wrapped in `Framed<_, PacketCodec>`. Decoding is defensive in a fixed
//! order: magic, then declared length, and only then is buffer space for the
//! payload reserved. A frame that fails any check is unrecoverable and the
//! caller is expected to drop the connection.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{Flags, MessageType, Packet, HEADER_LEN, MAGIC, MAX_PAYLOAD_LEN, PROTOCOL_VERSION, TRAILER_LEN};
use crate::ProtocolError;

/// Stateless framing codec (no state beyond the buffered bytes)
#[derive(Debug, Default, Clone)]
pub struct PacketCodec;

impl PacketCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        if packet.payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge {
                size: packet.payload.len(),
            });
        }

        let frame_len = HEADER_LEN + packet.payload.len() + TRAILER_LEN;
        dst.reserve(frame_len);

        let start = dst.len();
        dst.put_u32(MAGIC);
        dst.put_u16(packet.message_type.code());
        dst.put_u8(PROTOCOL_VERSION);
        dst.put_u8(packet.flags.bits());
        dst.put_u64(packet.message_id);
        dst.put_u32(packet.payload.len() as u32);
        dst.put_u64(packet.timestamp);
        dst.put_slice(&packet.payload);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&dst[start..]);
        dst.put_u32(hasher.finalize());

        Ok(())
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, ProtocolError> {
        if src.len() < HEADER_LEN {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        }

        // Magic first: anything else on the wire is not ours.
        let magic = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic {
                found: [src[0], src[1], src[2], src[3]],
            });
        }

        // Length check before any payload allocation. The field is unsigned
        // on the wire but peers that write it signed must still be rejected.
        let raw_len = u32::from_be_bytes([src[16], src[17], src[18], src[19]]);
        if (raw_len as i32) < 0 || raw_len as usize > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadOverflow {
                length: raw_len as i32 as i64,
            });
        }
        let payload_len = raw_len as usize;

        let frame_len = HEADER_LEN + payload_len + TRAILER_LEN;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        // Full frame buffered: verify integrity before interpreting anything.
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&src[..HEADER_LEN + payload_len]);
        let actual = hasher.finalize();
        let expected = u32::from_be_bytes([
            src[HEADER_LEN + payload_len],
            src[HEADER_LEN + payload_len + 1],
            src[HEADER_LEN + payload_len + 2],
            src[HEADER_LEN + payload_len + 3],
        ]);
        if expected != actual {
            return Err(ProtocolError::ChecksumMismatch { expected, actual });
        }

        let mut header = src.split_to(HEADER_LEN);
        header.advance(4); // magic
        let type_code = header.get_u16();
        let _version = header.get_u8();
        let flags = Flags::from_bits(header.get_u8());
        let message_id = header.get_u64();
        let _payload_len = header.get_u32();
        let timestamp = header.get_u64();

        let payload: Bytes = src.split_to(payload_len).freeze();
        src.advance(TRAILER_LEN);

        let message_type = MessageType::try_from(type_code)?;

        Ok(Some(Packet {
            message_type,
            flags,
            message_id,
            timestamp,
            payload,
        }))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn roundtrip_arbitrary_payload(
            payload in proptest::collection::vec(any::<u8>(), 0..4096),
            message_id in any::<u64>(),
            timestamp in any::<u64>(),
        ) {
            let packet = Packet {
                message_type: MessageType::MessageSendReq,
                flags: Flags::empty(),
                message_id,
                timestamp,
                payload: Bytes::from(payload),
            };
            let mut buf = BytesMut::new();
            let mut codec = PacketCodec::new();
            codec.encode(packet.clone(), &mut buf).unwrap();
            let decoded = codec.decode(&mut buf).unwrap().unwrap();
            prop_assert_eq!(decoded, packet);
            prop_assert!(buf.is_empty());
        }

        #[test]
        fn bit_flip_never_decodes_silently(
            payload in proptest::collection::vec(any::<u8>(), 1..256),
            flip_bit in 0usize..64,
        ) {
            let packet = Packet::new(MessageType::MessageSendReq, 42, payload);
            let mut buf = BytesMut::new();
            PacketCodec::new().encode(packet.clone(), &mut buf).unwrap();

            let idx = (flip_bit / 8) % buf.len();
            buf[idx] ^= 1 << (flip_bit % 8);

            // A flipped byte either fails a structural check or the CRC;
            // it must never come back as a different, valid packet.
            match PacketCodec::new().decode(&mut buf) {
                Ok(Some(decoded)) => prop_assert_eq!(decoded, packet),
                Ok(None) => {}
                Err(_) => {}
            }
        }
    }
}
