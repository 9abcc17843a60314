//! Message model and the two wire formats spoken with the proxy: the
//! `FTMSG/1.0` envelope carried inside each record, and the JSON batch/record
//! wrappers around it.

pub mod batch;
pub mod envelope;

use std::collections::BTreeMap;
use thiserror::Error;

pub use batch::{decode_batch, decode_raw_message, RawMessage, WireBatch, WireRecord};
pub use envelope::{build_envelope, parse_envelope, CRLF, MESSAGE_VERSION};

/// A queue message: headers keyed by name plus an opaque body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Message {
    pub fn new(headers: BTreeMap<String, String>, body: impl Into<String>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("proxy batch is not a JSON array of records: {0}")]
    InvalidBatch(#[source] serde_json::Error),
    #[error("record is not a {{value, partition, offset}} object: {0}")]
    InvalidRecord(#[source] serde_json::Error),
    #[error("record value is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("record value is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("failed to encode record batch: {0}")]
    Encode(#[source] serde_json::Error),
}
