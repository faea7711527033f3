//! AMF0 encoder and decoder
//!
//! Type markers in the supported subset:
//! ```text
//! 0x00 - Number (IEEE 754 double)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (key-value pairs until 0x000009)
//! 0x05 - Null
//! 0x06 - Undefined
//! 0x08 - ECMA Array (associative array with a count hint)
//! 0x09 - Object End (0x000009 sequence)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use crate::error::AmfError;

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_LONG_STRING: u8 = 0x0C;

/// Maximum nesting depth for objects/arrays (prevent stack overflow)
const MAX_NESTING_DEPTH: usize = 64;

/// AMF0 value as used by the command layer
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    Null,
    Undefined,
    Boolean(bool),
    Number(f64),
    String(String),
    /// Key-value object; ECMA arrays decode into this too
    Object(HashMap<String, AmfValue>),
}

impl AmfValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, AmfValue>> {
        match self {
            AmfValue::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, AmfValue::Null | AmfValue::Undefined)
    }

    /// Get a property from an object value
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.as_object()?.get(key)
    }

    /// Get a string property from an object value
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Get a number property from an object value
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }
}

impl Default for AmfValue {
    fn default() -> Self {
        AmfValue::Null
    }
}

/// Encode a single AMF0 value
pub fn encode(out: &mut BytesMut, value: &AmfValue) {
    match value {
        AmfValue::Null => {
            out.put_u8(MARKER_NULL);
        }
        AmfValue::Undefined => {
            out.put_u8(MARKER_UNDEFINED);
        }
        AmfValue::Boolean(b) => {
            out.put_u8(MARKER_BOOLEAN);
            out.put_u8(if *b { 1 } else { 0 });
        }
        AmfValue::Number(n) => {
            out.put_u8(MARKER_NUMBER);
            out.put_f64(*n);
        }
        AmfValue::String(s) => {
            if s.len() > 0xFFFF {
                out.put_u8(MARKER_LONG_STRING);
                out.put_u32(s.len() as u32);
            } else {
                out.put_u8(MARKER_STRING);
                out.put_u16(s.len() as u16);
            }
            out.put_slice(s.as_bytes());
        }
        AmfValue::Object(props) => {
            out.put_u8(MARKER_OBJECT);
            for (key, val) in props {
                write_utf8(out, key);
                encode(out, val);
            }
            // Object end: empty key followed by the end marker
            out.put_u16(0);
            out.put_u8(MARKER_OBJECT_END);
        }
    }
}

/// Encode a sequence of values into a fresh buffer
pub fn encode_all(values: &[AmfValue]) -> Bytes {
    let mut out = BytesMut::with_capacity(256);
    for value in values {
        encode(&mut out, value);
    }
    out.freeze()
}

/// Decode a single AMF0 value from the buffer
pub fn decode(buf: &mut Bytes) -> Result<AmfValue, AmfError> {
    decode_at_depth(buf, 0)
}

/// Decode all values from buffer until exhausted
pub fn decode_all(buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
    let mut values = Vec::new();
    while buf.has_remaining() {
        values.push(decode(buf)?);
    }
    Ok(values)
}

fn decode_at_depth(buf: &mut Bytes, depth: usize) -> Result<AmfValue, AmfError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(AmfError::NestingTooDeep);
    }
    if buf.is_empty() {
        return Err(AmfError::UnexpectedEof);
    }

    match buf.get_u8() {
        MARKER_NUMBER => {
            if buf.remaining() < 8 {
                return Err(AmfError::UnexpectedEof);
            }
            Ok(AmfValue::Number(buf.get_f64()))
        }
        MARKER_BOOLEAN => {
            if buf.is_empty() {
                return Err(AmfError::UnexpectedEof);
            }
            Ok(AmfValue::Boolean(buf.get_u8() != 0))
        }
        MARKER_STRING => Ok(AmfValue::String(read_utf8(buf)?)),
        MARKER_LONG_STRING => Ok(AmfValue::String(read_utf8_long(buf)?)),
        MARKER_OBJECT => decode_properties(buf, depth),
        MARKER_NULL => Ok(AmfValue::Null),
        MARKER_UNDEFINED => Ok(AmfValue::Undefined),
        MARKER_ECMA_ARRAY => {
            if buf.remaining() < 4 {
                return Err(AmfError::UnexpectedEof);
            }
            // Count is only a hint; the properties still end with the
            // empty-key/end-marker sequence.
            let _count = buf.get_u32();
            decode_properties(buf, depth)
        }
        other => Err(AmfError::UnsupportedMarker(other)),
    }
}

fn decode_properties(buf: &mut Bytes, depth: usize) -> Result<AmfValue, AmfError> {
    let mut properties = HashMap::new();

    loop {
        let key = read_utf8(buf)?;
        if key.is_empty() {
            if buf.is_empty() {
                // Some encoders omit the trailing end marker.
                break;
            }
            if buf.get_u8() == MARKER_OBJECT_END {
                break;
            }
            break;
        }

        let value = decode_at_depth(buf, depth + 1)?;
        properties.insert(key, value);
    }

    Ok(AmfValue::Object(properties))
}

fn write_utf8(out: &mut BytesMut, s: &str) {
    out.put_u16(s.len() as u16);
    out.put_slice(s.as_bytes());
}

fn read_utf8(buf: &mut Bytes) -> Result<String, AmfError> {
    if buf.remaining() < 2 {
        return Err(AmfError::UnexpectedEof);
    }
    let len = buf.get_u16() as usize;
    read_utf8_body(buf, len)
}

fn read_utf8_long(buf: &mut Bytes) -> Result<String, AmfError> {
    if buf.remaining() < 4 {
        return Err(AmfError::UnexpectedEof);
    }
    let len = buf.get_u32() as usize;
    read_utf8_body(buf, len)
}

fn read_utf8_body(buf: &mut Bytes, len: usize) -> Result<String, AmfError> {
    if buf.remaining() < len {
        return Err(AmfError::UnexpectedEof);
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| AmfError::InvalidString)
}
