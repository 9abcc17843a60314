#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use restq::client::HttpClientPool;
use restq::config::{HttpClientConfig, QueueConfig};
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

pub const GROUP: &str = "suggestor";
pub const TOPIC: &str = "MetadataPublishEvents";

pub fn pool() -> HttpClientPool {
    let settings = HttpClientConfig {
        request_timeout: Duration::from_secs(5),
        ..HttpClientConfig::default()
    };
    HttpClientPool::new(settings).expect("http client pool")
}

pub fn queue_config<I, S>(addrs: I) -> QueueConfig
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut config = QueueConfig::new(addrs, GROUP, TOPIC);
    config.backoff_period = 1;
    config
}

pub fn instance_path(id: &str) -> String {
    format!("/consumers/{GROUP}/instances/{id}")
}

/// The proxy reports instances under its own, unreachable host name.
pub fn instance_response(id: &str) -> JsonValue {
    json!({
        "base_uri": format!("http://kafka-rest-internal:8082{}", instance_path(id)),
        "instance_id": id,
    })
}

pub fn encode(raw: &str) -> String {
    STANDARD.encode(raw)
}

pub fn record(raw_envelope: &str, offset: i64) -> JsonValue {
    json!({ "value": encode(raw_envelope), "partition": 0, "offset": offset })
}
