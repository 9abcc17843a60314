use crate::client::{CallError, HttpCaller, HttpClientPool};
use crate::config::{ProducerConfig, QueueConfig};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use thiserror::Error;

pub const PROBE_TIMEOUT: Duration = Duration::from_millis(4500);

#[derive(Debug, Error)]
pub enum HealthError {
    #[error(transparent)]
    Call(#[from] CallError),
    #[error("topic list from `{url}` is not a JSON array of names: {source}")]
    InvalidTopics {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("topic `{topic}` was not found at `{url}`")]
    TopicMissing { url: String, topic: String },
    #[error("no proxy address is reachable: {}", .failures.join("; "))]
    Unreachable { failures: Vec<String> },
}

/// Checks that the proxy answers and knows about the configured topic.
#[derive(Clone)]
pub struct ConnectivityProbe {
    caller: HttpCaller,
    addrs: Vec<String>,
    topic: String,
}

impl ConnectivityProbe {
    pub fn for_consumer(config: &QueueConfig, pool: HttpClientPool) -> Self {
        Self {
            caller: probe_caller(pool, config.authorization(), config.host_override()),
            addrs: config.addrs.clone(),
            topic: config.topic.clone(),
        }
    }

    pub fn for_producer(config: &ProducerConfig, pool: HttpClientPool) -> Self {
        Self {
            caller: probe_caller(pool, config.authorization(), config.host_override()),
            addrs: vec![config.addr.clone()],
            topic: config.topic.clone(),
        }
    }

    /// Succeeds as soon as one address passes; otherwise reports every
    /// address's failure.
    pub async fn check(&self) -> Result<String, HealthError> {
        let mut failures = Vec::with_capacity(self.addrs.len());

        for addr in &self.addrs {
            match self.check_address(addr).await {
                Ok(()) => {
                    return Ok(format!(
                        "proxy at {addr} is reachable and serves topic {}",
                        self.topic
                    ))
                }
                Err(err) => {
                    tracing::warn!(
                        target: "restq::health",
                        event = "proxy_unreachable",
                        address = %addr,
                        error = %err
                    );
                    failures.push(format!("{addr}: {err}"));
                }
            }
        }

        Err(HealthError::Unreachable { failures })
    }

    async fn check_address(&self, addr: &str) -> Result<(), HealthError> {
        let url = format!("{}/topics", addr.trim_end_matches('/'));
        let body = self
            .caller
            .call(Method::GET, &url, None, &[], StatusCode::OK)
            .await?;
        let topics: Vec<String> =
            serde_json::from_slice(&body).map_err(|source| HealthError::InvalidTopics {
                url: url.clone(),
                source,
            })?;

        if topics.iter().any(|topic| topic == &self.topic) {
            Ok(())
        } else {
            Err(HealthError::TopicMissing {
                url,
                topic: self.topic.clone(),
            })
        }
    }
}

fn probe_caller(pool: HttpClientPool, authorization: Option<&str>, host: Option<&str>) -> HttpCaller {
    HttpCaller::new(pool)
        .with_authorization(authorization)
        .with_host(host)
        .with_timeout(PROBE_TIMEOUT)
}
