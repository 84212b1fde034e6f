//! NDN-TLV encoding helpers.
//!
//! Types and lengths are VAR-NUMBERs:
//! - `< 253`: one byte
//! - `<= 0xffff`: `253` followed by 2 bytes big-endian
//! - `<= 0xffffffff`: `254` followed by 4 bytes
//! - otherwise `255` followed by 8 bytes
//!
//! Non-negative integer values use the shortest of 1, 2, 4 or 8 bytes.

use crate::error::{CoreError, Result};
use crate::name::{Component, Name};

/// TLV type numbers for names.
pub mod types {
    pub const NAME: u64 = 7;
    pub const IMPLICIT_DIGEST: u64 = 1;
    pub const GENERIC_COMPONENT: u64 = 8;
    pub const VERSION_COMPONENT: u64 = 54;
}

/// Append a VAR-NUMBER.
pub fn write_var_number(buf: &mut Vec<u8>, n: u64) {
    if n < 253 {
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(253);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(254);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(255);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encoded size of a VAR-NUMBER.
pub fn var_number_len(n: u64) -> usize {
    if n < 253 {
        1
    } else if n <= 0xffff {
        3
    } else if n <= 0xffffffff {
        5
    } else {
        9
    }
}

/// Encoded size of a whole TLV with a value of `value_len` bytes.
pub fn tlv_len(typ: u64, value_len: usize) -> usize {
    var_number_len(typ) + var_number_len(value_len as u64) + value_len
}

/// Append a TLV element.
pub fn write_tlv(buf: &mut Vec<u8>, typ: u64, value: &[u8]) {
    write_var_number(buf, typ);
    write_var_number(buf, value.len() as u64);
    buf.extend_from_slice(value);
}

/// Shortest big-endian encoding of a non-negative integer.
pub fn nonneg_bytes(n: u64) -> Vec<u8> {
    if n <= 0xff {
        vec![n as u8]
    } else if n <= 0xffff {
        (n as u16).to_be_bytes().to_vec()
    } else if n <= 0xffffffff {
        (n as u32).to_be_bytes().to_vec()
    } else {
        n.to_be_bytes().to_vec()
    }
}

/// Append a TLV whose value is a non-negative integer.
pub fn write_nonneg_tlv(buf: &mut Vec<u8>, typ: u64, n: u64) {
    write_tlv(buf, typ, &nonneg_bytes(n));
}

/// Decode a non-negative integer value.
pub fn read_nonneg(value: &[u8]) -> Result<u64> {
    match value.len() {
        1 => Ok(value[0] as u64),
        2 => Ok(u16::from_be_bytes([value[0], value[1]]) as u64),
        4 => Ok(u32::from_be_bytes([value[0], value[1], value[2], value[3]]) as u64),
        8 => {
            let mut arr = [0u8; 8];
            arr.copy_from_slice(value);
            Ok(u64::from_be_bytes(arr))
        }
        n => Err(CoreError::Tlv(format!("invalid non-negative integer length {}", n))),
    }
}

/// Append a Name TLV.
pub fn write_name(buf: &mut Vec<u8>, name: &Name) {
    let value = name_value(name);
    write_tlv(buf, types::NAME, &value);
}

/// Encoded size of a Name TLV.
pub fn name_len(name: &Name) -> usize {
    tlv_len(types::NAME, name_value(name).len())
}

fn name_value(name: &Name) -> Vec<u8> {
    let mut value = Vec::new();
    for c in name {
        let typ = match c {
            Component::Generic(_) => types::GENERIC_COMPONENT,
            Component::Version(_) => types::VERSION_COMPONENT,
            Component::ImplicitDigest(_) => types::IMPLICIT_DIGEST,
        };
        write_tlv(&mut value, typ, &c.value_bytes());
    }
    value
}

/// Decode the value of a Name TLV (the part after its type and length).
pub fn read_name_value(value: &[u8]) -> Result<Name> {
    let mut reader = TlvReader::new(value);
    let mut name = Name::new();
    while !reader.is_empty() {
        let (typ, v) = reader.read_tlv()?;
        let component = match typ {
            types::GENERIC_COMPONENT => Component::Generic(v.to_vec()),
            types::VERSION_COMPONENT => Component::Version(read_nonneg(v)?),
            types::IMPLICIT_DIGEST => {
                let digest: [u8; 32] = v
                    .try_into()
                    .map_err(|_| CoreError::Tlv("implicit digest must be 32 bytes".into()))?;
                Component::ImplicitDigest(digest)
            }
            other => return Err(CoreError::Tlv(format!("unknown name component type {}", other))),
        };
        name.push(component);
    }
    Ok(name)
}

/// Sequential reader over a buffer of TLV elements.
#[derive(Debug, Clone)]
pub struct TlvReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> TlvReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// True once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_var_number(&mut self) -> Result<u64> {
        let first = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| CoreError::Tlv("unexpected end of input".into()))?;
        self.pos += 1;
        let width = match first {
            253 => 2,
            254 => 4,
            255 => 8,
            n => return Ok(n as u64),
        };
        let bytes = self.take(width)?;
        read_nonneg(bytes)
    }

    /// Type of the next element without consuming it.
    pub fn peek_type(&self) -> Option<u64> {
        self.clone().read_var_number().ok()
    }

    /// Read the next element, returning its type and value.
    pub fn read_tlv(&mut self) -> Result<(u64, &'a [u8])> {
        let typ = self.read_var_number()?;
        let len = self.read_var_number()?;
        let len = usize::try_from(len).map_err(|_| CoreError::Tlv("length overflow".into()))?;
        let value = self.take(len)?;
        Ok((typ, value))
    }

    /// Read the next element, requiring it to have type `expected`.
    pub fn expect_tlv(&mut self, expected: u64) -> Result<&'a [u8]> {
        let (typ, value) = self.read_tlv()?;
        if typ != expected {
            return Err(CoreError::Tlv(format!("expected type {}, found {}", expected, typ)));
        }
        Ok(value)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| CoreError::Tlv("element exceeds buffer".into()))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }
}
