#![forbid(unsafe_code)]

//! The message envelope:
//!
//! ```text
//! message-version CRLF
//! *(message-header CRLF)
//! CRLF
//! message-body
//! ```

use crate::codec::Message;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const MESSAGE_VERSION: &str = "FTMSG/1.0";
pub const CRLF: &str = "\r\n";

/// Serialises a message with its headers in lexicographic order, so the same
/// message always produces the same bytes.
pub fn build_envelope(message: &Message) -> String {
    let mut envelope = String::with_capacity(
        MESSAGE_VERSION.len() + CRLF.len() * 2 + message.body.len() + message.headers.len() * 32,
    );
    envelope.push_str(MESSAGE_VERSION);
    envelope.push_str(CRLF);

    for (name, value) in &message.headers {
        envelope.push_str(name);
        envelope.push_str(": ");
        envelope.push_str(value);
        envelope.push_str(CRLF);
    }

    envelope.push_str(CRLF);
    envelope.push_str(&message.body);
    envelope
}

/// Splits a decoded envelope into headers and a trimmed body. Never fails: an
/// envelope without a blank line is read as headers only.
pub fn parse_envelope(raw: &str) -> Message {
    let split = header_section_end(raw);
    Message {
        headers: parse_headers(&raw[..split]),
        body: raw[split..].trim().to_string(),
    }
}

fn header_section_end(raw: &str) -> usize {
    if let Some(index) = raw.find("\r\n\r\n") {
        return index;
    }
    if let Some(index) = raw.find("\n\n") {
        return index;
    }
    tracing::warn!(
        target: "restq::codec",
        event = "message_without_body",
        raw = %raw
    );
    raw.len()
}

// Values stop at the first character outside this set, so a value holding
// e.g. `+` or `,` is truncated there.
fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([A-Za-z0-9_\-]+):([A-Za-z0-9_\-:/. ]*)").expect("header pattern compiles")
    })
}

fn parse_headers(section: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for captures in header_pattern().captures_iter(section) {
        let (Some(name), Some(value)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        headers.insert(
            name.as_str().to_string(),
            value.as_str().trim_matches(' ').to_string(),
        );
    }
    headers
}
