//! HTTP plumbing shared by the queue caller, the producer and the probes.
//!
//! [`HttpClientPool`] owns the pooled `reqwest::Client` and can swap it for a
//! fresh one, which is how idle keep-alive connections get closed: requests
//! already in flight finish on the old client, new requests open new sockets.

pub mod ageing;

use crate::config::HttpClientConfig;
use crate::metrics::metrics;
use bytes::Bytes;
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION, HOST};
use reqwest::{Method, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

pub use ageing::AgeingClient;

#[derive(Clone)]
pub struct HttpClientPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    settings: HttpClientConfig,
    client: RwLock<reqwest::Client>,
    generation: AtomicU64,
}

impl HttpClientPool {
    pub fn new(settings: HttpClientConfig) -> Result<Self, reqwest::Error> {
        let client = build_client(&settings)?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                settings,
                client: RwLock::new(client),
                generation: AtomicU64::new(0),
            }),
        })
    }

    pub fn settings(&self) -> &HttpClientConfig {
        &self.inner.settings
    }

    /// Returns a handle to the current client; cheap, clones share the pool.
    pub fn client(&self) -> reqwest::Client {
        match self.inner.client.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of times the connection pool has been recycled.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Relaxed)
    }

    /// Drops every idle pooled connection by replacing the client.
    pub fn close_idle_connections(&self) -> bool {
        let fresh = match build_client(&self.inner.settings) {
            Ok(client) => client,
            Err(err) => {
                tracing::warn!(
                    target: "restq::client",
                    event = "idle_recycle_failed",
                    error = %err,
                    "failed to rebuild HTTP client; keeping existing connections"
                );
                return false;
            }
        };

        let retired = match self.inner.client.write() {
            Ok(mut guard) => std::mem::replace(&mut *guard, fresh),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), fresh),
        };
        drop(retired);

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        metrics().inc_idle_recycles();
        tracing::debug!(
            target: "restq::client",
            event = "idle_connections_closed",
            generation
        );
        true
    }
}

fn build_client(settings: &HttpClientConfig) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .timeout(settings.request_timeout)
        .connect_timeout(settings.connect_timeout)
        .pool_max_idle_per_host(settings.pool_max_idle_per_host);

    if let Some(idle) = settings.pool_idle_timeout {
        builder = builder.pool_idle_timeout(idle);
    }

    builder.build()
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("invalid request to `{url}`: {reason}")]
    InvalidRequest { url: String, reason: String },
    #[error("request to `{url}` failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response status {status} from `{url}`, expected {expected}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        expected: u16,
    },
    #[error("failed to read response from `{url}` (status {status}): {source}")]
    Body {
        url: String,
        status: u16,
        #[source]
        source: reqwest::Error,
    },
}

impl CallError {
    pub fn url(&self) -> &str {
        match self {
            CallError::InvalidRequest { url, .. }
            | CallError::Transport { url, .. }
            | CallError::UnexpectedStatus { url, .. }
            | CallError::Body { url, .. } => url,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CallError::UnexpectedStatus { status, .. } | CallError::Body { status, .. } => {
                Some(*status)
            }
            CallError::InvalidRequest { .. } | CallError::Transport { .. } => None,
        }
    }
}

/// Issues single proxy requests with the configured authorization and host
/// override, checking the response against one expected status.
#[derive(Clone)]
pub struct HttpCaller {
    pool: HttpClientPool,
    authorization: Option<String>,
    host: Option<String>,
    timeout: Option<Duration>,
}

impl HttpCaller {
    pub fn new(pool: HttpClientPool) -> Self {
        Self {
            pool,
            authorization: None,
            host: None,
            timeout: None,
        }
    }

    pub fn with_authorization(mut self, authorization: Option<&str>) -> Self {
        self.authorization = authorization
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        self
    }

    pub fn with_host(mut self, host: Option<&str>) -> Self {
        self.host = host.filter(|value| !value.is_empty()).map(str::to_string);
        self
    }

    /// Per-request deadline overriding the client's own timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn pool(&self) -> &HttpClientPool {
        &self.pool
    }

    pub async fn call(
        &self,
        method: Method,
        url: &str,
        body: Option<String>,
        headers: &[(&str, &str)],
        expected: StatusCode,
    ) -> Result<Bytes, CallError> {
        let mut request = self.pool.client().request(method.clone(), url);

        for (name, value) in headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|err| CallError::InvalidRequest {
                    url: url.to_string(),
                    reason: format!("invalid header name `{name}`: {err}"),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|err| CallError::InvalidRequest {
                    url: url.to_string(),
                    reason: format!("invalid header value for `{name}`: {err}"),
                })?;
            request = request.header(header_name, header_value);
        }

        if let Some(authorization) = &self.authorization {
            request = request.header(AUTHORIZATION, authorization.as_str());
        }
        if let Some(host) = &self.host {
            request = request.header(HOST, host.as_str());
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|source| {
            tracing::error!(
                target: "restq::client",
                event = "request_failed",
                method = %method,
                url = %url,
                error = %source
            );
            CallError::Transport {
                url: url.to_string(),
                source,
            }
        })?;

        let status = response.status();
        // A 5xx may come from a backend that left the DNS pool while our
        // keep-alive sockets still point at it.
        if status.is_server_error() {
            self.pool.close_idle_connections();
        }

        if status != expected {
            let _ = response.bytes().await;
            tracing::error!(
                target: "restq::client",
                event = "unexpected_status",
                method = %method,
                url = %url,
                status = status.as_u16(),
                expected = expected.as_u16()
            );
            return Err(CallError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
                expected: expected.as_u16(),
            });
        }

        response.bytes().await.map_err(|source| CallError::Body {
            url: url.to_string(),
            status: status.as_u16(),
            source,
        })
    }
}
