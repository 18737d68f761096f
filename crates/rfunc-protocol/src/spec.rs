//! Method signatures: argument lists, methods, and namespace listings.
//!
//! These types describe *what* can be called, never *how*. The server
//! pairs them with handlers in its registry; the client keeps a cache of
//! them after discovery.
//!
//! Dispatch identity is deliberately narrow: two argument specifications
//! are equal iff their ordered **types** match. Argument names and method
//! descriptions are documentation only.

use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::{ProtocolError, Value, ValueType};

/// Separator used between NUL-terminated strings on the wire.
pub(crate) const NUL: u8 = 0x00;

/// Most arguments a specification can carry (its count is one byte).
pub const MAX_ARGUMENTS: usize = u8::MAX as usize;

/// Rejects strings that would break NUL-terminated wire fields.
fn ensure_no_nul(what: &str, s: &str) -> Result<(), ProtocolError> {
    if s.as_bytes().contains(&NUL) {
        return Err(ProtocolError::InvalidArgument(format!(
            "{what} cannot contain a NUL character"
        )));
    }
    Ok(())
}

/// Reads one NUL-terminated UTF-8 string from the front of `buf`.
pub(crate) fn read_nul_terminated(buf: &mut &[u8], what: &str) -> Result<String, ProtocolError> {
    let bytes: &[u8] = *buf;
    let end = bytes.iter().position(|b| *b == NUL).ok_or_else(|| {
        ProtocolError::Malformed(format!("unterminated {what}"))
    })?;
    let s = std::str::from_utf8(&bytes[..end])
        .map_err(|e| ProtocolError::Malformed(format!("{what} is not UTF-8: {e}")))?
        .to_owned();
    *buf = &bytes[end + 1..];
    Ok(s)
}

// ---------------------------------------------------------------------------
// ArgumentSpecification
// ---------------------------------------------------------------------------

/// One declared parameter: its type and a descriptive name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub value_type: ValueType,
    pub name: String,
}

/// The ordered parameter list of a method.
///
/// Together with the method name, the type sequence forms the dispatch
/// key. `PartialEq` and `Hash` only look at types; names are ignored.
///
/// # Text form
///
/// ```
/// use rfunc_protocol::{ArgumentSpecification, ValueType};
///
/// let spec = ArgumentSpecification::parse("int32 a, string").unwrap();
/// assert_eq!(spec.types(), vec![ValueType::Int32, ValueType::String]);
/// assert_eq!(spec.to_string(), "int32 a, string arg1");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "ArgumentList")]
pub struct ArgumentSpecification {
    arguments: Vec<Argument>,
}

impl ArgumentSpecification {
    /// The empty specification ("no arguments").
    pub const NONE: ArgumentSpecification = ArgumentSpecification {
        arguments: Vec::new(),
    };

    /// Builds a specification from parallel type and name lists.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidArgument`] if the lists differ in length
    /// or a name contains a NUL character.
    pub fn new(types: Vec<ValueType>, names: Vec<String>) -> Result<Self, ProtocolError> {
        if types.len() != names.len() {
            return Err(ProtocolError::InvalidArgument(format!(
                "argument list length mismatch: {} types, {} names",
                types.len(),
                names.len()
            )));
        }
        for name in &names {
            ensure_no_nul("argument name", name)?;
        }
        let arguments = types
            .into_iter()
            .zip(names)
            .map(|(value_type, name)| Argument { value_type, name })
            .collect();
        Ok(Self { arguments })
    }

    /// Builds a specification from types alone, naming them `arg0..argN`.
    pub fn from_types(types: impl IntoIterator<Item = ValueType>) -> Self {
        let arguments = types
            .into_iter()
            .enumerate()
            .map(|(index, value_type)| Argument {
                value_type,
                name: default_name(index),
            })
            .collect();
        Self { arguments }
    }

    /// Derives the dispatch key of a concrete argument list.
    pub fn from_values(values: &[Value]) -> Self {
        Self::from_types(values.iter().map(Value::value_type))
    }

    /// Parses the text form `"<type> <name>, <type>, ..."`.
    ///
    /// Blank input is [`NONE`](Self::NONE). A segment without a name gets
    /// `arg<index>`. One trailing comma is ignored.
    ///
    /// # Errors
    /// [`ProtocolError::Parse`] for an empty segment, a segment with more
    /// than two tokens, or an unknown type name.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim();
        let text = text.strip_suffix(',').map_or(text, str::trim_end);
        if text.is_empty() {
            return Ok(Self::NONE);
        }

        let mut arguments = Vec::new();
        for (index, segment) in text.split(',').enumerate() {
            let tokens: Vec<&str> = segment.split_whitespace().collect();
            let (type_name, name) = match tokens.as_slice() {
                [type_name] => (*type_name, default_name(index)),
                [type_name, name] => (*type_name, (*name).to_owned()),
                _ => {
                    return Err(ProtocolError::Parse(format!(
                        "cannot parse '{}' as an argument in '{text}'",
                        segment.trim()
                    )));
                }
            };
            let value_type: ValueType = type_name.parse()?;
            ensure_no_nul("argument name", &name)?;
            arguments.push(Argument { value_type, name });
        }
        Ok(Self { arguments })
    }

    /// Canonical text form; the inverse of [`parse`](Self::parse).
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Number of declared arguments.
    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// The ordered type sequence (the part that matters for dispatch).
    pub fn types(&self) -> Vec<ValueType> {
        self.arguments.iter().map(|a| a.value_type).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.arguments.iter().map(|a| a.name.as_str()).collect()
    }

    /// `true` iff every declared argument has type `value_type`.
    pub fn is_all_of_type(&self, value_type: ValueType) -> bool {
        self.arguments.iter().all(|a| a.value_type == value_type)
    }

    /// Appends the binary form:
    /// `[count:1][tag × count][(name NUL) × count]`.
    ///
    /// # Errors
    /// [`ProtocolError::TooManyArguments`] above 255 arguments.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), ProtocolError> {
        let count = u8::try_from(self.arguments.len())
            .map_err(|_| ProtocolError::TooManyArguments(self.arguments.len()))?;
        buf.put_u8(count);
        for argument in &self.arguments {
            buf.put_u8(argument.value_type.tag());
        }
        for argument in &self.arguments {
            buf.put_slice(argument.name.as_bytes());
            buf.put_u8(NUL);
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::new();
        self.encode(&mut out)?;
        Ok(out)
    }

    /// Decodes the binary form. The whole input is consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut buf = bytes;
        if !buf.has_remaining() {
            return Err(ProtocolError::truncated("argument count", 1, 0));
        }
        let count = usize::from(buf.get_u8());
        if buf.remaining() < count {
            return Err(ProtocolError::truncated(
                "argument type tags",
                count,
                buf.remaining(),
            ));
        }

        let mut types = Vec::with_capacity(count);
        for _ in 0..count {
            types.push(ValueType::from_tag(buf.get_u8())?);
        }

        let mut names = Vec::with_capacity(count);
        while buf.has_remaining() {
            names.push(read_nul_terminated(&mut buf, "argument name")?);
        }
        if names.len() != count {
            return Err(ProtocolError::Malformed(format!(
                "argument specification declares {count} types but carries {} names",
                names.len()
            )));
        }

        let arguments = types
            .into_iter()
            .zip(names)
            .map(|(value_type, name)| Argument { value_type, name })
            .collect();
        Ok(Self { arguments })
    }
}

/// Unchecked serde form of [`ArgumentSpecification`].
#[derive(Deserialize)]
struct ArgumentList {
    arguments: Vec<Argument>,
}

impl TryFrom<ArgumentList> for ArgumentSpecification {
    type Error = ProtocolError;

    fn try_from(list: ArgumentList) -> Result<Self, Self::Error> {
        let (types, names) = list
            .arguments
            .into_iter()
            .map(|a| (a.value_type, a.name))
            .unzip();
        Self::new(types, names)
    }
}

fn default_name(index: usize) -> String {
    format!("arg{index}")
}

impl PartialEq for ArgumentSpecification {
    fn eq(&self, other: &Self) -> bool {
        self.arguments.len() == other.arguments.len()
            && self
                .arguments
                .iter()
                .zip(&other.arguments)
                .all(|(a, b)| a.value_type == b.value_type)
    }
}

impl Eq for ArgumentSpecification {}

impl Hash for ArgumentSpecification {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for argument in &self.arguments {
            argument.value_type.hash(state);
        }
    }
}

impl fmt::Display for ArgumentSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, argument) in self.arguments.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", argument.value_type, argument.name)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MethodSpecification
// ---------------------------------------------------------------------------

/// A method's public signature: name, human description, parameters.
///
/// Equality is `(name, arguments)`. Two specs that differ only in their
/// description or argument names are the same method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "MethodSignature")]
pub struct MethodSpecification {
    name: String,
    description: String,
    arguments: ArgumentSpecification,
}

impl MethodSpecification {
    /// # Errors
    /// [`ProtocolError::InvalidArgument`] if `name` or `description`
    /// contains a NUL character (NUL terminates both fields on the wire).
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        arguments: ArgumentSpecification,
    ) -> Result<Self, ProtocolError> {
        let name = name.into();
        let description = description.into();
        ensure_no_nul("method name", &name)?;
        ensure_no_nul("method description", &description)?;
        Ok(Self {
            name,
            description,
            arguments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn arguments(&self) -> &ArgumentSpecification {
        &self.arguments
    }

    /// `true` if this spec answers to `name` called with `arguments`.
    pub fn matches(&self, name: &str, arguments: &ArgumentSpecification) -> bool {
        self.name == name && &self.arguments == arguments
    }

    /// Appends `name NUL description NUL <arguments>`.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), ProtocolError> {
        buf.put_slice(self.name.as_bytes());
        buf.put_u8(NUL);
        buf.put_slice(self.description.as_bytes());
        buf.put_u8(NUL);
        self.arguments.encode(buf)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::new();
        self.encode(&mut out)?;
        Ok(out)
    }

    /// Decodes the binary form. The whole input is consumed: everything
    /// after the second NUL belongs to the argument specification.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut buf = bytes;
        let name = read_nul_terminated(&mut buf, "method name")?;
        let description = read_nul_terminated(&mut buf, "method description")?;
        let arguments = ArgumentSpecification::from_bytes(buf)?;
        Ok(Self {
            name,
            description,
            arguments,
        })
    }
}

/// Unchecked serde form of [`MethodSpecification`].
#[derive(Deserialize)]
struct MethodSignature {
    name: String,
    description: String,
    arguments: ArgumentSpecification,
}

impl TryFrom<MethodSignature> for MethodSpecification {
    type Error = ProtocolError;

    fn try_from(raw: MethodSignature) -> Result<Self, Self::Error> {
        Self::new(raw.name, raw.description, raw.arguments)
    }
}

impl PartialEq for MethodSpecification {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.arguments == other.arguments
    }
}

impl Eq for MethodSpecification {}

impl Hash for MethodSpecification {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.arguments.hash(state);
    }
}

impl fmt::Display for MethodSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.arguments)
    }
}

// ---------------------------------------------------------------------------
// NamespaceSpecification
// ---------------------------------------------------------------------------

/// What a remote namespace exposed at discovery time.
///
/// Purely descriptive: the server re-resolves every call on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSpecification {
    name: String,
    methods: Vec<MethodSpecification>,
}

impl NamespaceSpecification {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn with_methods(
        name: impl Into<String>,
        methods: impl IntoIterator<Item = MethodSpecification>,
    ) -> Self {
        Self {
            name: name.into(),
            methods: methods.into_iter().collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_method(&mut self, method: MethodSpecification) {
        self.methods.push(method);
    }

    /// Method specs in the order the server listed them.
    pub fn methods(&self) -> &[MethodSpecification] {
        &self.methods
    }

    /// Finds the spec called `name` whose types match `arguments`.
    pub fn find(&self, name: &str, arguments: &ArgumentSpecification) -> Option<&MethodSpecification> {
        self.methods.iter().find(|m| m.matches(name, arguments))
    }

    /// Finds the spec that a call with these concrete values would hit.
    pub fn find_for_values(&self, name: &str, values: &[Value]) -> Option<&MethodSpecification> {
        self.find(name, &ArgumentSpecification::from_values(values))
    }
}
