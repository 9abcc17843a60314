#[path = "common/mod.rs"]
mod common;

use common::{encode, TOPIC};
use httpmock::{Method::POST, MockServer};
use restq::codec::Message;
use restq::config::ProducerConfig;
use restq::producer::{MessageProducer, ProxyProducer, SendError, CONTENT_TYPE};
use serde_json::json;

fn producer(server: &MockServer) -> ProxyProducer {
    let mut config = ProducerConfig::new(server.base_url(), TOPIC);
    config.authorization = Some("Basic producer".to_string());
    ProxyProducer::new(config, common::pool())
}

#[tokio::test]
async fn posts_sorted_envelope_as_single_record() {
    let server = MockServer::start_async().await;
    let expected_envelope = "FTMSG/1.0\r\nA: 1\r\nB: 2\r\n\r\nx";
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/topics/{TOPIC}"))
                .header("Content-Type", CONTENT_TYPE)
                .header("Authorization", "Basic producer")
                .json_body(json!({
                    "records": [{ "key": encode("uuid-1"), "value": encode(expected_envelope) }]
                }));
            then.status(200);
        })
        .await;

    let message = Message::default()
        .with_header("B", "2")
        .with_header("A", "1");
    let message = Message {
        body: "x".to_string(),
        ..message
    };

    producer(&server)
        .send_message("uuid-1", &message)
        .await
        .expect("send succeeds");
    mock.assert_async().await;
}

#[tokio::test]
async fn host_override_is_sent_with_authorization() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/topics/{TOPIC}"))
                .header("Host", "kafka")
                .header("Authorization", "Basic producer");
            then.status(200);
        })
        .await;

    let mut config = ProducerConfig::new(server.base_url(), TOPIC);
    config.queue = Some("kafka".to_string());
    config.authorization = Some("Basic producer".to_string());
    let producer = ProxyProducer::new(config, common::pool());

    producer
        .send_raw_message("uuid-2", "FTMSG/1.0\r\n\r\n{}")
        .await
        .expect("send succeeds");
    mock.assert_async().await;
}

#[tokio::test]
async fn raw_message_with_empty_key() {
    let server = MockServer::start_async().await;
    let raw = "FTMSG/1.0\r\nMessage-Id: m\r\n\r\n{}";
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).json_body(json!({
                "records": [{ "key": "", "value": encode(raw) }]
            }));
            then.status(200);
        })
        .await;

    producer(&server)
        .send_raw_message("", raw)
        .await
        .expect("send succeeds");
    mock.assert_async().await;
}

#[tokio::test]
async fn non_ok_response_is_a_send_failure() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(500);
        })
        .await;

    let err = producer(&server)
        .send_message("k", &Message::default())
        .await
        .expect_err("500 fails");

    mock.assert_hits_async(1).await;
    assert!(matches!(err, SendError::Call(_)));
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn default_client_producer_targets_topic_url() {
    let producer = ProxyProducer::with_default_client(ProducerConfig::new(
        "http://proxy.example:8080/",
        TOPIC,
    ))
    .expect("producer");
    assert_eq!(
        producer.url(),
        format!("http://proxy.example:8080/topics/{TOPIC}")
    );
}
