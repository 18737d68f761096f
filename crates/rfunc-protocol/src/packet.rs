//! Packet types and their body grammars.
//!
//! A packet is a transaction id plus one typed body. The closed set of
//! packet types is identified on the wire by three ASCII bytes; framing
//! (header and length prefix) lives in [`crate::codec`].

use std::fmt;

use bytes::{Buf, BufMut};

use crate::spec::{read_nul_terminated, NUL};
use crate::{MethodSpecification, ProtocolError, Value};

/// Transaction id carried by the HANDSHAKE exchanged at connection start.
/// Ordinary traffic numbers from 0 upwards and never uses it.
pub const HANDSHAKE_TRANSACTION_ID: i64 = -2;

// ---------------------------------------------------------------------------
// PacketType
// ---------------------------------------------------------------------------

/// Every kind of packet the protocol knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Handshake,
    Terminate,
    FunctionListRequest,
    NamespaceListRequest,
    FunctionList,
    NamespaceList,
    FunctionCall,
    FunctionReturn,
    Error,
}

impl PacketType {
    pub const ALL: [PacketType; 9] = [
        PacketType::Handshake,
        PacketType::Terminate,
        PacketType::FunctionListRequest,
        PacketType::NamespaceListRequest,
        PacketType::FunctionList,
        PacketType::NamespaceList,
        PacketType::FunctionCall,
        PacketType::FunctionReturn,
        PacketType::Error,
    ];

    /// The three ASCII bytes written in the packet header.
    pub const fn identifier(self) -> &'static [u8; 3] {
        match self {
            PacketType::Handshake => b"hds",
            PacketType::Terminate => b"trm",
            PacketType::FunctionListRequest => b"flr",
            PacketType::NamespaceListRequest => b"nlr",
            PacketType::FunctionList => b"fls",
            PacketType::NamespaceList => b"nls",
            PacketType::FunctionCall => b"fcl",
            PacketType::FunctionReturn => b"ret",
            PacketType::Error => b"err",
        }
    }

    /// # Errors
    /// [`ProtocolError::UnknownPacketType`] if no type uses `id`.
    pub fn from_identifier(id: &[u8; 3]) -> Result<Self, ProtocolError> {
        Self::ALL
            .into_iter()
            .find(|pt| pt.identifier() == id)
            .ok_or_else(|| {
                ProtocolError::UnknownPacketType(String::from_utf8_lossy(id).into_owned())
            })
    }

    /// Whether a length-prefixed body follows the header.
    pub const fn contains_data(self) -> bool {
        !matches!(
            self,
            PacketType::Terminate | PacketType::NamespaceListRequest
        )
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Identifiers are ASCII by construction.
        f.write_str(std::str::from_utf8(self.identifier()).unwrap_or("???"))
    }
}

// ---------------------------------------------------------------------------
// PacketBody
// ---------------------------------------------------------------------------

/// The typed payload of a packet.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketBody {
    /// First packet in each direction; carries the sender's version.
    Handshake { version: String },
    /// Initiator is done with the connection. Never answered.
    Terminate,
    /// "Which methods live in this namespace?"
    FunctionListRequest { namespace: String },
    /// "Which namespaces exist?"
    NamespaceListRequest,
    FunctionList(Vec<MethodSpecification>),
    NamespaceList(Vec<String>),
    FunctionCall {
        namespace: String,
        method: MethodSpecification,
        arguments: Vec<Value>,
    },
    FunctionReturn(Value),
    /// A typed failure reported to the remote side.
    Error(String),
}

impl PacketBody {
    pub fn packet_type(&self) -> PacketType {
        match self {
            PacketBody::Handshake { .. } => PacketType::Handshake,
            PacketBody::Terminate => PacketType::Terminate,
            PacketBody::FunctionListRequest { .. } => PacketType::FunctionListRequest,
            PacketBody::NamespaceListRequest => PacketType::NamespaceListRequest,
            PacketBody::FunctionList(_) => PacketType::FunctionList,
            PacketBody::NamespaceList(_) => PacketType::NamespaceList,
            PacketBody::FunctionCall { .. } => PacketType::FunctionCall,
            PacketBody::FunctionReturn(_) => PacketType::FunctionReturn,
            PacketBody::Error(_) => PacketType::Error,
        }
    }

    /// Appends the body bytes (without the length prefix). Bodiless
    /// types write nothing.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), ProtocolError> {
        match self {
            PacketBody::Terminate | PacketBody::NamespaceListRequest => {}
            PacketBody::Handshake { version } => buf.put_slice(version.as_bytes()),
            PacketBody::FunctionListRequest { namespace } => buf.put_slice(namespace.as_bytes()),
            PacketBody::Error(message) => buf.put_slice(message.as_bytes()),
            PacketBody::NamespaceList(names) => {
                for name in names {
                    if name.as_bytes().contains(&NUL) {
                        return Err(ProtocolError::InvalidArgument(format!(
                            "namespace name {name:?} contains a NUL character"
                        )));
                    }
                    buf.put_slice(name.as_bytes());
                    buf.put_u8(NUL);
                }
            }
            PacketBody::FunctionList(methods) => {
                for method in methods {
                    put_prefixed(buf, &method.to_bytes()?)?;
                }
            }
            PacketBody::FunctionCall {
                namespace,
                method,
                arguments,
            } => {
                put_prefixed(buf, namespace.as_bytes())?;
                put_prefixed(buf, &method.to_bytes()?)?;
                for value in arguments {
                    value.encode(buf)?;
                }
            }
            PacketBody::FunctionReturn(value) => value.encode(buf)?,
        }
        Ok(())
    }

    /// Decodes a body of the given type. `body` must be exactly the bytes
    /// covered by the length prefix (empty for bodiless types).
    pub fn decode(packet_type: PacketType, body: &[u8]) -> Result<Self, ProtocolError> {
        let mut buf = body;
        let decoded = match packet_type {
            PacketType::Terminate | PacketType::NamespaceListRequest => {
                if !body.is_empty() {
                    return Err(ProtocolError::Malformed(format!(
                        "{packet_type} packets carry no body, got {} bytes",
                        body.len()
                    )));
                }
                if packet_type == PacketType::Terminate {
                    PacketBody::Terminate
                } else {
                    PacketBody::NamespaceListRequest
                }
            }
            PacketType::Handshake => PacketBody::Handshake {
                version: utf8(body, "handshake version")?,
            },
            PacketType::FunctionListRequest => PacketBody::FunctionListRequest {
                namespace: utf8(body, "namespace name")?,
            },
            PacketType::Error => PacketBody::Error(utf8(body, "error message")?),
            PacketType::NamespaceList => {
                let mut names = Vec::new();
                while buf.has_remaining() {
                    names.push(read_nul_terminated(&mut buf, "namespace name")?);
                }
                PacketBody::NamespaceList(names)
            }
            PacketType::FunctionList => {
                let mut methods = Vec::new();
                while buf.has_remaining() {
                    let record = read_prefixed(&mut buf, "method specification")?;
                    methods.push(MethodSpecification::from_bytes(record)?);
                }
                PacketBody::FunctionList(methods)
            }
            PacketType::FunctionCall => {
                let namespace = utf8(read_prefixed(&mut buf, "namespace name")?, "namespace name")?;
                let method =
                    MethodSpecification::from_bytes(read_prefixed(&mut buf, "method specification")?)?;
                let mut arguments = Vec::new();
                while buf.has_remaining() {
                    arguments.push(Value::decode(&mut buf)?);
                }
                PacketBody::FunctionCall {
                    namespace,
                    method,
                    arguments,
                }
            }
            PacketType::FunctionReturn => PacketBody::FunctionReturn(Value::from_bytes(body)?),
        };
        Ok(decoded)
    }
}

fn utf8(bytes: &[u8], what: &str) -> Result<String, ProtocolError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| ProtocolError::Malformed(format!("{what} is not UTF-8: {e}")))
}

fn put_prefixed<B: BufMut>(buf: &mut B, bytes: &[u8]) -> Result<(), ProtocolError> {
    let len = i32::try_from(bytes.len()).map_err(|_| {
        ProtocolError::InvalidArgument(format!(
            "record of {} bytes exceeds the length prefix",
            bytes.len()
        ))
    })?;
    buf.put_i32(len);
    buf.put_slice(bytes);
    Ok(())
}

/// Splits one `[len:i32][bytes]` record off the front of `buf`.
fn read_prefixed<'a>(buf: &mut &'a [u8], what: &str) -> Result<&'a [u8], ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::truncated(
            &format!("{what} length"),
            4,
            buf.remaining(),
        ));
    }
    let raw_len = buf.get_i32();
    let len = usize::try_from(raw_len)
        .map_err(|_| ProtocolError::Malformed(format!("negative {what} length {raw_len}")))?;
    let bytes: &'a [u8] = *buf;
    if bytes.len() < len {
        return Err(ProtocolError::truncated(what, len, bytes.len()));
    }
    let (record, rest) = bytes.split_at(len);
    *buf = rest;
    Ok(record)
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A body plus the transaction id that correlates it.
///
/// Packets are built without an id; the connection layer assigns one
/// right before writing. Encoding a packet that still has no id is an
/// error.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    transaction_id: Option<i64>,
    body: PacketBody,
}

impl Packet {
    /// A packet with no transaction id yet.
    pub fn new(body: PacketBody) -> Self {
        Self {
            transaction_id: None,
            body,
        }
    }

    /// A HANDSHAKE carrying `version`, stamped with the reserved id.
    pub fn handshake(version: impl Into<String>) -> Self {
        Self::new(PacketBody::Handshake {
            version: version.into(),
        })
        .with_transaction_id(HANDSHAKE_TRANSACTION_ID)
    }

    pub fn with_transaction_id(mut self, id: i64) -> Self {
        self.transaction_id = Some(id);
        self
    }

    pub fn set_transaction_id(&mut self, id: i64) {
        self.transaction_id = Some(id);
    }

    pub fn transaction_id(&self) -> Option<i64> {
        self.transaction_id
    }

    pub fn packet_type(&self) -> PacketType {
        self.body.packet_type()
    }

    pub fn body(&self) -> &PacketBody {
        &self.body
    }

    pub fn into_body(self) -> PacketBody {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArgumentSpecification;

    #[test]
    fn test_identifiers_are_unique_ascii() {
        for (i, a) in PacketType::ALL.iter().enumerate() {
            assert!(a.identifier().is_ascii());
            for b in &PacketType::ALL[i + 1..] {
                assert_ne!(a.identifier(), b.identifier(), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn test_identifier_lookup() {
        for pt in PacketType::ALL {
            assert_eq!(PacketType::from_identifier(pt.identifier()).unwrap(), pt);
        }
        let err = PacketType::from_identifier(b"xyz").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownPacketType(ref id) if id == "xyz"));
    }

    #[test]
    fn test_only_terminate_and_namespace_request_are_bodiless() {
        let bodiless: Vec<PacketType> = PacketType::ALL
            .into_iter()
            .filter(|pt| !pt.contains_data())
            .collect();
        assert_eq!(
            bodiless,
            vec![PacketType::Terminate, PacketType::NamespaceListRequest]
        );
    }

    #[test]
    fn test_display_is_identifier() {
        assert_eq!(PacketType::FunctionReturn.to_string(), "ret");
    }

    #[test]
    fn test_handshake_uses_sentinel_id() {
        let p = Packet::handshake("1.0");
        assert_eq!(p.transaction_id(), Some(HANDSHAKE_TRANSACTION_ID));
        assert_eq!(p.packet_type(), PacketType::Handshake);
    }

    #[test]
    fn test_namespace_list_body_layout() {
        let mut out = Vec::new();
        PacketBody::NamespaceList(vec!["".into(), "math".into()])
            .encode(&mut out)
            .unwrap();
        assert_eq!(out, b"\0math\0".to_vec());

        let decoded = PacketBody::decode(PacketType::NamespaceList, &out).unwrap();
        assert_eq!(decoded, PacketBody::NamespaceList(vec!["".into(), "math".into()]));
    }

    #[test]
    fn test_namespace_list_rejects_nul_in_name() {
        let mut out = Vec::new();
        let err = PacketBody::NamespaceList(vec!["a\0b".into()])
            .encode(&mut out)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidArgument(_)));
    }

    #[test]
    fn test_function_call_body_layout() {
        let method = MethodSpecification::new(
            "f",
            "",
            ArgumentSpecification::from_types([crate::ValueType::Int8]),
        )
        .unwrap();
        let body = PacketBody::FunctionCall {
            namespace: "ns".into(),
            method,
            arguments: vec![Value::Int8(-1)],
        };
        let mut out = Vec::new();
        body.encode(&mut out).unwrap();

        let expected: Vec<u8> = [
            &[0, 0, 0, 2][..],
            b"ns",
            &[0, 0, 0, 10],
            b"f\0\0",
            &[1, 0x01],
            b"arg0\0",
            &[0x01, 0, 0, 0, 1, 0xFF],
        ]
        .concat();
        assert_eq!(out, expected);
        assert_eq!(PacketBody::decode(PacketType::FunctionCall, &out).unwrap(), body);
    }

    #[test]
    fn test_function_call_truncated_record_is_malformed() {
        let err = PacketBody::decode(PacketType::FunctionCall, &[0, 0, 0, 9, b'n']).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_function_list_negative_length_is_malformed() {
        let err =
            PacketBody::decode(PacketType::FunctionList, &[0xFF, 0xFF, 0xFF, 0xFE]).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_bodiless_type_with_body_is_malformed() {
        let err = PacketBody::decode(PacketType::Terminate, &[1]).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_empty_function_list_request_means_default_namespace() {
        let decoded = PacketBody::decode(PacketType::FunctionListRequest, &[]).unwrap();
        assert_eq!(
            decoded,
            PacketBody::FunctionListRequest {
                namespace: String::new()
            }
        );
    }
}
