//! Packet framing.
//!
//! Every packet starts with an 11-byte header:
//!
//! ```text
//! [transaction id: i64 BE][packet type: 3 ASCII bytes]
//! ```
//!
//! Types that carry data follow it with `[body length: i32 BE][body]`.
//! TERMINATE and NAMESPACE_LIST_REQUEST end at the header.
//!
//! Readers pull the header first, then (if needed) the length prefix,
//! then exactly that many body bytes. [`PacketCodec`] exposes each step
//! so a stream reader never has to buffer beyond the current packet.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Packet, PacketBody, PacketType, ProtocolError};

/// Bytes in the fixed packet header.
pub const HEADER_LEN: usize = 11;

/// Bytes in the body length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default cap on a single body. Larger lengths are treated as garbage.
pub const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

/// The decoded fixed part of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub transaction_id: i64,
    pub packet_type: PacketType,
}

impl FrameHeader {
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self, ProtocolError> {
        let (id, kind) = bytes.split_at(8);
        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(id);
        let mut kind_bytes = [0u8; 3];
        kind_bytes.copy_from_slice(kind);
        Ok(Self {
            transaction_id: i64::from_be_bytes(id_bytes),
            packet_type: PacketType::from_identifier(&kind_bytes)?,
        })
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i64(self.transaction_id);
        buf.put_slice(self.packet_type.identifier());
    }
}

/// Encodes and decodes framed packets.
#[derive(Debug, Clone, Copy)]
pub struct PacketCodec {
    max_body_len: usize,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(MAX_BODY_LEN)
    }
}

impl PacketCodec {
    pub fn new(max_body_len: usize) -> Self {
        Self { max_body_len }
    }

    pub fn max_body_len(&self) -> usize {
        self.max_body_len
    }

    /// Serializes a whole packet, header included.
    ///
    /// # Errors
    /// [`ProtocolError::UnassignedTransactionId`] if the packet has no id
    /// yet; any body encoding error; `InvalidArgument` if the body is
    /// larger than this codec accepts.
    pub fn encode(&self, packet: &Packet) -> Result<Bytes, ProtocolError> {
        let transaction_id = packet
            .transaction_id()
            .ok_or(ProtocolError::UnassignedTransactionId)?;
        let packet_type = packet.packet_type();

        let mut body = BytesMut::new();
        packet.body().encode(&mut body)?;

        let mut out = BytesMut::with_capacity(HEADER_LEN + LENGTH_PREFIX_LEN + body.len());
        FrameHeader {
            transaction_id,
            packet_type,
        }
        .encode(&mut out);

        if packet_type.contains_data() {
            if body.len() > self.max_body_len {
                return Err(ProtocolError::InvalidArgument(format!(
                    "{packet_type} body of {} bytes exceeds the {} byte limit",
                    body.len(),
                    self.max_body_len
                )));
            }
            // The prefix is an i32.
            let len = i32::try_from(body.len()).map_err(|_| {
                ProtocolError::InvalidArgument(format!("body of {} bytes", body.len()))
            })?;
            out.put_i32(len);
            out.put_slice(&body);
        }
        Ok(out.freeze())
    }

    pub fn decode_header(&self, bytes: &[u8; HEADER_LEN]) -> Result<FrameHeader, ProtocolError> {
        FrameHeader::decode(bytes)
    }

    /// Validates a body length prefix.
    ///
    /// # Errors
    /// `Malformed` for a negative length or one above the codec's limit.
    pub fn decode_body_len(&self, bytes: [u8; LENGTH_PREFIX_LEN]) -> Result<usize, ProtocolError> {
        let raw = i32::from_be_bytes(bytes);
        let len = usize::try_from(raw)
            .map_err(|_| ProtocolError::Malformed(format!("negative body length {raw}")))?;
        if len > self.max_body_len {
            return Err(ProtocolError::Malformed(format!(
                "body length {len} exceeds the {} byte limit",
                self.max_body_len
            )));
        }
        Ok(len)
    }

    /// Builds a packet from an already-split header and body.
    pub fn decode_body(&self, header: FrameHeader, body: &[u8]) -> Result<Packet, ProtocolError> {
        let body = PacketBody::decode(header.packet_type, body)?;
        Ok(Packet::new(body).with_transaction_id(header.transaction_id))
    }

    /// Decodes one complete frame. Trailing bytes are an error.
    pub fn decode(&self, frame: &[u8]) -> Result<Packet, ProtocolError> {
        let header_bytes: &[u8; HEADER_LEN] = frame
            .get(..HEADER_LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| ProtocolError::truncated("packet header", HEADER_LEN, frame.len()))?;
        let header = self.decode_header(header_bytes)?;
        let rest = &frame[HEADER_LEN..];

        if !header.packet_type.contains_data() {
            if !rest.is_empty() {
                return Err(ProtocolError::Malformed(format!(
                    "{} trailing bytes after {} header",
                    rest.len(),
                    header.packet_type
                )));
            }
            return self.decode_body(header, &[]);
        }

        let prefix: [u8; LENGTH_PREFIX_LEN] = rest
            .get(..LENGTH_PREFIX_LEN)
            .and_then(|p| p.try_into().ok())
            .ok_or_else(|| {
                ProtocolError::truncated("body length", LENGTH_PREFIX_LEN, rest.len())
            })?;
        let len = self.decode_body_len(prefix)?;
        let body = &rest[LENGTH_PREFIX_LEN..];
        if body.len() != len {
            return Err(ProtocolError::Malformed(format!(
                "{} body declares {len} bytes but frame carries {}",
                header.packet_type,
                body.len()
            )));
        }
        self.decode_body(header, body)
    }
}

/// Encodes `packet` with the default body limit.
pub fn encode_packet(packet: &Packet) -> Result<Bytes, ProtocolError> {
    PacketCodec::default().encode(packet)
}

/// Decodes one complete frame with the default body limit.
pub fn decode_packet(frame: &[u8]) -> Result<Packet, ProtocolError> {
    PacketCodec::default().decode(frame)
}

/// Validates a body length prefix against [`MAX_BODY_LEN`].
pub fn decode_body_len(bytes: [u8; LENGTH_PREFIX_LEN]) -> Result<usize, ProtocolError> {
    PacketCodec::default().decode_body_len(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    #[test]
    fn test_terminate_is_header_only() {
        let codec = PacketCodec::default();
        let bytes = codec
            .encode(&Packet::new(PacketBody::Terminate).with_transaction_id(7))
            .unwrap();
        assert_eq!(&bytes[..], b"\0\0\0\0\0\0\0\x07trm");
    }

    #[test]
    fn test_return_frame_layout() {
        let codec = PacketCodec::default();
        let bytes = codec
            .encode(&Packet::new(PacketBody::FunctionReturn(Value::Int32(5))).with_transaction_id(0))
            .unwrap();
        let expected: Vec<u8> = [
            &[0u8; 8][..],
            b"ret",
            &[0, 0, 0, 9],
            &[0x03, 0, 0, 0, 4, 0, 0, 0, 5],
        ]
        .concat();
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_unassigned_id_is_rejected() {
        let err = PacketCodec::default()
            .encode(&Packet::new(PacketBody::Terminate))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnassignedTransactionId));
    }

    #[test]
    fn test_negative_body_length_is_malformed() {
        let err = PacketCodec::default()
            .decode_body_len([0xFF, 0xFF, 0xFF, 0xFF])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_body_length_above_limit_is_malformed() {
        let codec = PacketCodec::new(8);
        assert_eq!(codec.decode_body_len([0, 0, 0, 8]).unwrap(), 8);
        assert!(codec.decode_body_len([0, 0, 0, 9]).is_err());
    }

    #[test]
    fn test_encode_respects_limit() {
        let codec = PacketCodec::new(4);
        let err = codec
            .encode(&Packet::new(PacketBody::Error("too long".into())).with_transaction_id(1))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidArgument(_)));
    }

    #[test]
    fn test_unknown_identifier_in_header() {
        let mut frame = [0u8; HEADER_LEN];
        frame[8..].copy_from_slice(b"zzz");
        let err = PacketCodec::default().decode(&frame).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownPacketType(_)));
    }

    #[test]
    fn test_free_functions_use_default_limit() {
        let packet = Packet::new(PacketBody::NamespaceListRequest).with_transaction_id(3);
        let bytes = encode_packet(&packet).unwrap();
        assert_eq!(decode_packet(&bytes).unwrap(), packet);
        assert!(decode_body_len((MAX_BODY_LEN as i32 + 1).to_be_bytes()).is_err());
    }

    #[test]
    fn test_short_frame_is_malformed() {
        let err = PacketCodec::default().decode(b"\0\0\0").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_body_length_mismatch_is_malformed() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&0i64.to_be_bytes());
        frame.extend_from_slice(b"err");
        frame.extend_from_slice(&5i32.to_be_bytes());
        frame.extend_from_slice(b"abc");
        let err = PacketCodec::default().decode(&frame).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }
}
