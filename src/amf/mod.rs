//! AMF0 subset for the RTMP command layer
//!
//! Commands (`connect`, `publish`, `play`, ...) and stream metadata travel
//! as AMF0-encoded payloads. Only the types those messages actually use
//! are supported: Number, Boolean, String, Object, Null/Undefined and
//! ECMA arrays. Anything else is a decode error, which tears down the
//! offending connection only.

pub mod amf0;

pub use amf0::{decode, decode_all, encode, encode_all, AmfValue};
