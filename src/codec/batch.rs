use crate::codec::envelope::parse_envelope;
use crate::codec::{Message, WireError};
use crate::metrics::metrics;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One record as returned by a poll. `value` is the base64 encoded envelope;
/// the proxy sends `null` for a tombstone.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub partition: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    pub key: String,
    pub value: String,
}

/// Body of a produce request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireBatch {
    pub records: Vec<WireRecord>,
}

impl WireBatch {
    /// Wraps one envelope in a batch, base64 encoding key and value. An empty
    /// key stays empty rather than being encoded.
    pub fn single(key: &str, envelope: &str) -> Self {
        let key = if key.is_empty() {
            String::new()
        } else {
            STANDARD.encode(key)
        };
        Self {
            records: vec![WireRecord {
                key,
                value: STANDARD.encode(envelope),
            }],
        }
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Encode)
    }
}

/// Decodes one record value: base64, then the envelope.
pub fn decode_raw_message(value: &str) -> Result<Message, WireError> {
    let decoded = STANDARD.decode(value)?;
    let raw = String::from_utf8(decoded)?;
    Ok(parse_envelope(&raw))
}

/// Decodes a poll response body. A body that is not a JSON array fails the
/// whole batch; an element that is not a record, or whose value does not
/// decode, is dropped. A tombstone (`null` or missing value) decodes as an
/// empty message.
pub fn decode_batch(data: &[u8]) -> Result<Vec<Message>, WireError> {
    let elements: Vec<JsonValue> =
        serde_json::from_slice(data).map_err(WireError::InvalidBatch)?;

    let mut messages = Vec::with_capacity(elements.len());
    for element in elements {
        let partition = element.get("partition").and_then(JsonValue::as_i64);
        let offset = element.get("offset").and_then(JsonValue::as_i64);

        let decoded = serde_json::from_value::<RawMessage>(element)
            .map_err(WireError::InvalidRecord)
            .and_then(|record| decode_raw_message(record.value.as_deref().unwrap_or_default()));

        match decoded {
            Ok(message) => messages.push(message),
            Err(err) => {
                metrics().inc_messages_dropped();
                tracing::error!(
                    target: "restq::codec",
                    event = "message_dropped",
                    partition = partition.unwrap_or(-1),
                    offset = offset.unwrap_or(-1),
                    error = %err
                );
            }
        }
    }
    Ok(messages)
}
