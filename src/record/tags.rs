//! Auxiliary tag codec.
//!
//! Each field is a two byte tag, a one byte type code and a value whose shape
//! depends on the type code:
//!
//! | Code | Value |
//! |------|-------|
//! | `A` | printable character |
//! | `c C s S i I` | signed/unsigned integers of 1, 2 or 4 bytes |
//! | `f` | 32-bit float |
//! | `Z` | NUL-terminated string |
//! | `H` | NUL-terminated hex string |
//! | `B` | sub-type code, `u32` count, then that many fixed-width elements |

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::{error::RecordError, Result};

/// Byte width of a fixed-width type code, `None` for variable-length types
#[must_use]
pub const fn fixed_width(type_code: u8) -> Option<usize> {
    match type_code {
        b'A' | b'c' | b'C' => Some(1),
        b's' | b'S' => Some(2),
        b'i' | b'I' | b'f' => Some(4),
        _ => None,
    }
}

/// Typed elements of a `B` array
#[derive(Clone, Debug, PartialEq)]
pub enum Array {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Float(Vec<f32>),
}
impl Array {
    /// The element type code
    #[must_use]
    pub fn subtype(&self) -> u8 {
        match self {
            Self::Int8(_) => b'c',
            Self::UInt8(_) => b'C',
            Self::Int16(_) => b's',
            Self::UInt16(_) => b'S',
            Self::Int32(_) => b'i',
            Self::UInt32(_) => b'I',
            Self::Float(_) => b'f',
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Int8(v) => v.len(),
            Self::UInt8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::UInt16(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::UInt32(v) => v.len(),
            Self::Float(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn decode(subtype: u8, bytes: &[u8]) -> Self {
        match subtype {
            b'c' => Self::Int8(bytes.iter().map(|&b| b as i8).collect()),
            b'C' => Self::UInt8(bytes.to_vec()),
            b's' => Self::Int16(bytes.chunks_exact(2).map(LittleEndian::read_i16).collect()),
            b'S' => Self::UInt16(bytes.chunks_exact(2).map(LittleEndian::read_u16).collect()),
            b'i' => Self::Int32(bytes.chunks_exact(4).map(LittleEndian::read_i32).collect()),
            b'I' => Self::UInt32(bytes.chunks_exact(4).map(LittleEndian::read_u32).collect()),
            _ => Self::Float(bytes.chunks_exact(4).map(LittleEndian::read_f32).collect()),
        }
    }

    fn encode_into(&self, dst: &mut Vec<u8>) {
        match self {
            Self::Int8(v) => dst.extend(v.iter().map(|&x| x as u8)),
            Self::UInt8(v) => dst.extend_from_slice(v),
            Self::Int16(v) => v.iter().for_each(|&x| dst.extend_from_slice(&x.to_le_bytes())),
            Self::UInt16(v) => v.iter().for_each(|&x| dst.extend_from_slice(&x.to_le_bytes())),
            Self::Int32(v) => v.iter().for_each(|&x| dst.extend_from_slice(&x.to_le_bytes())),
            Self::UInt32(v) => v.iter().for_each(|&x| dst.extend_from_slice(&x.to_le_bytes())),
            Self::Float(v) => v.iter().for_each(|&x| dst.extend_from_slice(&x.to_le_bytes())),
        }
    }
}

/// A decoded auxiliary value, tagged by its on-disk type
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Char(u8),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Float(f32),
    String(String),
    Hex(String),
    Array(Array),
}
impl Value {
    /// The on-disk type code
    #[must_use]
    pub fn type_code(&self) -> u8 {
        match self {
            Self::Char(_) => b'A',
            Self::Int8(_) => b'c',
            Self::UInt8(_) => b'C',
            Self::Int16(_) => b's',
            Self::UInt16(_) => b'S',
            Self::Int32(_) => b'i',
            Self::UInt32(_) => b'I',
            Self::Float(_) => b'f',
            Self::String(_) => b'Z',
            Self::Hex(_) => b'H',
            Self::Array(_) => b'B',
        }
    }

    /// Widens any integer variant
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Self::Int8(v) => Some(i64::from(v)),
            Self::UInt8(v) => Some(i64::from(v)),
            Self::Int16(v) => Some(i64::from(v)),
            Self::UInt16(v) => Some(i64::from(v)),
            Self::Int32(v) => Some(i64::from(v)),
            Self::UInt32(v) => Some(i64::from(v)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Hex(s) => Some(s),
            _ => None,
        }
    }
}

/// One auxiliary field
#[derive(Clone, Debug, PartialEq)]
pub struct AuxField {
    tag: [u8; 2],
    value: Value,
}
impl AuxField {
    #[must_use]
    pub fn new(tag: [u8; 2], value: Value) -> Self {
        Self { tag, value }
    }

    #[must_use]
    pub fn tag(&self) -> [u8; 2] {
        self.tag
    }

    #[must_use]
    pub fn tag_str(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub(crate) fn encode_into(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(&self.tag);
        dst.push(self.value.type_code());
        match &self.value {
            Value::Char(v) | Value::UInt8(v) => dst.push(*v),
            Value::Int8(v) => dst.push(*v as u8),
            Value::Int16(v) => dst.extend_from_slice(&v.to_le_bytes()),
            Value::UInt16(v) => dst.extend_from_slice(&v.to_le_bytes()),
            Value::Int32(v) => dst.extend_from_slice(&v.to_le_bytes()),
            Value::UInt32(v) => dst.extend_from_slice(&v.to_le_bytes()),
            Value::Float(v) => dst.extend_from_slice(&v.to_le_bytes()),
            Value::String(s) | Value::Hex(s) => {
                dst.extend_from_slice(s.as_bytes());
                dst.push(0);
            }
            Value::Array(array) => {
                dst.push(array.subtype());
                dst.extend_from_slice(&(array.len() as u32).to_le_bytes());
                array.encode_into(dst);
            }
        }
    }
}

/// Formats as SAM text, `TG:TYPE:VALUE`
impl fmt::Display for AuxField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = String::from_utf8_lossy(&self.tag);
        match &self.value {
            Value::Char(c) => write!(f, "{tag}:A:{}", *c as char),
            Value::Float(v) => write!(f, "{tag}:f:{v}"),
            Value::String(s) => write!(f, "{tag}:Z:{s}"),
            Value::Hex(s) => write!(f, "{tag}:H:{s}"),
            Value::Array(array) => {
                write!(f, "{tag}:B:{}", array.subtype() as char)?;
                match array {
                    Array::Int8(v) => v.iter().try_for_each(|x| write!(f, ",{x}")),
                    Array::UInt8(v) => v.iter().try_for_each(|x| write!(f, ",{x}")),
                    Array::Int16(v) => v.iter().try_for_each(|x| write!(f, ",{x}")),
                    Array::UInt16(v) => v.iter().try_for_each(|x| write!(f, ",{x}")),
                    Array::Int32(v) => v.iter().try_for_each(|x| write!(f, ",{x}")),
                    Array::UInt32(v) => v.iter().try_for_each(|x| write!(f, ",{x}")),
                    Array::Float(v) => v.iter().try_for_each(|x| write!(f, ",{x}")),
                }
            }
            integer => write!(f, "{tag}:i:{}", integer.as_int().unwrap_or_default()),
        }
    }
}

/// Cursor over the auxiliary region of one record
struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
}
impl<'a> FieldReader<'a> {
    fn take(&mut self, n: usize, tag: &[u8; 2]) -> Result<&'a [u8]> {
        let Some(bytes) = self
            .pos
            .checked_add(n)
            .and_then(|end| self.data.get(self.pos..end))
        else {
            return Err(RecordError::MalformedTag(format!(
                "field {} needs {n} bytes at offset {} but only {} remain",
                String::from_utf8_lossy(tag),
                self.pos,
                self.data.len() - self.pos
            ))
            .into());
        };
        self.pos += n;
        Ok(bytes)
    }

    fn take_nul_terminated(&mut self, tag: &[u8; 2]) -> Result<String> {
        let rest = &self.data[self.pos..];
        let Some(len) = memchr::memchr(0, rest) else {
            return Err(RecordError::MalformedTag(format!(
                "string field {} is not NUL-terminated",
                String::from_utf8_lossy(tag)
            ))
            .into());
        };
        let text = std::str::from_utf8(&rest[..len])?.to_string();
        self.pos += len + 1;
        Ok(text)
    }

    fn next_field(&mut self) -> Result<AuxField> {
        let header = self.take(3, b"??")?;
        let tag = [header[0], header[1]];
        let type_code = header[2];

        let value = match type_code {
            b'Z' => Value::String(self.take_nul_terminated(&tag)?),
            b'H' => Value::Hex(self.take_nul_terminated(&tag)?),
            b'B' => {
                let head = self.take(5, &tag)?;
                let subtype = head[0];
                let count = LittleEndian::read_u32(&head[1..]) as usize;
                let Some(width) = fixed_width(subtype).filter(|_| subtype != b'A') else {
                    return Err(RecordError::UnsupportedFieldWidth {
                        tag: String::from_utf8_lossy(&tag).into_owned(),
                        subtype: subtype as char,
                    }
                    .into());
                };
                let bytes = self.take(count.saturating_mul(width), &tag)?;
                Value::Array(Array::decode(subtype, bytes))
            }
            code => {
                let Some(width) = fixed_width(code) else {
                    return Err(RecordError::UnknownTagType {
                        tag: String::from_utf8_lossy(&tag).into_owned(),
                        type_code: code as char,
                    }
                    .into());
                };
                let bytes = self.take(width, &tag)?;
                match code {
                    b'A' => Value::Char(bytes[0]),
                    b'c' => Value::Int8(bytes[0] as i8),
                    b'C' => Value::UInt8(bytes[0]),
                    b's' => Value::Int16(LittleEndian::read_i16(bytes)),
                    b'S' => Value::UInt16(LittleEndian::read_u16(bytes)),
                    b'i' => Value::Int32(LittleEndian::read_i32(bytes)),
                    b'I' => Value::UInt32(LittleEndian::read_u32(bytes)),
                    _ => Value::Float(LittleEndian::read_f32(bytes)),
                }
            }
        };
        Ok(AuxField { tag, value })
    }
}

/// Decodes fields until `data` is exhausted
pub(crate) fn decode(data: &[u8]) -> Result<Vec<AuxField>> {
    let mut reader = FieldReader { data, pos: 0 };
    let mut fields = Vec::new();
    while reader.pos < data.len() {
        fields.push(reader.next_field()?);
    }
    Ok(fields)
}

pub(crate) fn encode_into(fields: &[AuxField], dst: &mut Vec<u8>) {
    for field in fields {
        field.encode_into(dst);
    }
}
