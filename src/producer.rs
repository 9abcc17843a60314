use crate::client::{CallError, HttpCaller, HttpClientPool};
use crate::codec::{build_envelope, Message, WireBatch, WireError};
use crate::config::{HttpClientConfig, ProducerConfig};
use crate::health::{ConnectivityProbe, HealthError};
use crate::metrics::metrics;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use thiserror::Error;

pub const CONTENT_TYPE: &str = "application/vnd.kafka.binary.v1+json";

#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Call(#[from] CallError),
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl SendError {
    pub fn status(&self) -> Option<u16> {
        match self {
            SendError::Call(err) => err.status(),
            SendError::Wire(_) => None,
        }
    }
}

#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Wraps `message` in an envelope and posts it under `key`.
    async fn send_message(&self, key: &str, message: &Message) -> Result<(), SendError>;

    /// Posts an already built envelope under `key`.
    async fn send_raw_message(&self, key: &str, envelope: &str) -> Result<(), SendError>;
}

/// Posts single-record batches to the proxy's topic endpoint. No retries.
#[derive(Clone)]
pub struct ProxyProducer {
    url: String,
    topic: String,
    caller: HttpCaller,
    probe: ConnectivityProbe,
}

impl ProxyProducer {
    pub fn new(config: ProducerConfig, pool: HttpClientPool) -> Self {
        let caller = HttpCaller::new(pool.clone())
            .with_authorization(config.authorization())
            .with_host(config.host_override());
        let probe = ConnectivityProbe::for_producer(&config, pool);
        Self {
            url: format!("{}/topics/{}", config.addr.trim_end_matches('/'), config.topic),
            topic: config.topic,
            caller,
            probe,
        }
    }

    /// A producer on its own client: 60s timeout, 100 idle connections per host.
    pub fn with_default_client(config: ProducerConfig) -> Result<Self, reqwest::Error> {
        let pool = HttpClientPool::new(HttpClientConfig::producer_defaults())?;
        Ok(Self::new(config, pool))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn check_connectivity(&self) -> Result<String, HealthError> {
        self.probe.check().await
    }
}

#[async_trait]
impl MessageProducer for ProxyProducer {
    async fn send_message(&self, key: &str, message: &Message) -> Result<(), SendError> {
        self.send_raw_message(key, &build_envelope(message)).await
    }

    async fn send_raw_message(&self, key: &str, envelope: &str) -> Result<(), SendError> {
        let body = WireBatch::single(key, envelope).to_json()?;

        let result = self
            .caller
            .call(
                Method::POST,
                &self.url,
                Some(body),
                &[("Content-Type", CONTENT_TYPE)],
                StatusCode::OK,
            )
            .await;

        metrics().record_send(result.is_ok());
        match result {
            Ok(_) => {
                tracing::debug!(
                    target: "restq::producer",
                    event = "message_sent",
                    topic = %self.topic,
                    key = %key
                );
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    target: "restq::producer",
                    event = "send_failed",
                    topic = %self.topic,
                    key = %key,
                    error = %err
                );
                Err(err.into())
            }
        }
    }
}
