use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use thiserror::Error as ThisError;

use crate::backend::Value;

/// Marks a legacy string value holding base64 encoded binary data.
pub const BASE64_TAG: &str = "__64__";

/// Payloads at least this long are never stored as integers.
const MAX_INTEGER_LEN: usize = 10;

#[derive(Debug, ThisError, PartialEq)]
pub enum ValueError {
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
    #[error("cannot reply with a {0} value")]
    Unsupported(&'static str),
}

/// Converts client payloads to bin values and back.
///
/// Short decimal payloads are stored as integers so they can be incremented in place. In legacy
/// mode payloads holding a NUL byte are base64 encoded behind [`BASE64_TAG`] and other text is
/// stored as a string; everything else is stored as a raw blob.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValueCodec {
    legacy: bool,
}

impl ValueCodec {
    pub fn new(legacy: bool) -> ValueCodec {
        ValueCodec { legacy }
    }

    pub fn encode(&self, payload: &[u8]) -> Value {
        if let Some(i) = parse_integer(payload) {
            return Value::Int(i);
        }

        if !self.legacy {
            return Value::Blob(Bytes::copy_from_slice(payload));
        }

        if payload.contains(&0) {
            return Value::Str(format!("{BASE64_TAG}{}", STANDARD.encode(payload)));
        }

        match std::str::from_utf8(payload) {
            Ok(s) => Value::Str(s.to_string()),
            Err(_) => Value::Blob(Bytes::copy_from_slice(payload)),
        }
    }

    pub fn decode(&self, value: &Value) -> Result<Bytes, ValueError> {
        match value {
            Value::Int(i) => Ok(Bytes::from(i.to_string())),
            Value::Str(s) => match s.strip_prefix(BASE64_TAG) {
                Some(encoded) => STANDARD
                    .decode(encoded)
                    .map(Bytes::from)
                    .map_err(|err| ValueError::InvalidBase64(err.to_string())),
                None => Ok(Bytes::copy_from_slice(s.as_bytes())),
            },
            Value::Blob(bytes) => Ok(bytes.clone()),
            Value::List(_) => Err(ValueError::Unsupported("list")),
            Value::Nil => Err(ValueError::Unsupported("nil")),
        }
    }
}

fn parse_integer(payload: &[u8]) -> Option<i64> {
    if payload.is_empty() || payload.len() >= MAX_INTEGER_LEN {
        return None;
    }
    std::str::from_utf8(payload).ok()?.parse().ok()
}
