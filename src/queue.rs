//! The proxy's consumer-instance protocol: create, poll, commit, destroy.

use crate::client::{CallError, HttpCaller, HttpClientPool};
use crate::codec::{decode_batch, Message, WireError};
use crate::config::QueueConfig;
use crate::metrics::metrics;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use url::Url;

/// A server-side consumer-group instance as reported by the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConsumerInstance {
    pub base_uri: String,
    #[serde(default)]
    pub instance_id: String,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Call(#[from] CallError),
    #[error("invalid consumer instance response: {0}")]
    InvalidInstance(#[source] serde_json::Error),
    #[error("cannot build instance URL from `{url}`: {source}")]
    InstanceUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl QueueError {
    /// HTTP status of a protocol failure, when the proxy answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            QueueError::Call(err) => err.status(),
            _ => None,
        }
    }
}

/// Operations a stream worker performs against the proxy. A caller belongs to
/// exactly one worker, hence `&mut self`.
#[async_trait]
pub trait QueueCaller: Send + Sync + 'static {
    async fn create_instance(&mut self) -> Result<ConsumerInstance, QueueError>;
    async fn consume_messages(
        &mut self,
        instance: &ConsumerInstance,
    ) -> Result<Vec<Message>, QueueError>;
    async fn commit_offsets(&mut self, instance: &ConsumerInstance) -> Result<(), QueueError>;
    async fn destroy_instance(&mut self, instance: &ConsumerInstance) -> Result<(), QueueError>;
}

/// Talks to the proxy over HTTP, rotating through the configured addresses
/// each time a new instance is created.
pub struct ProxyQueueCaller {
    addrs: Vec<String>,
    addr_index: usize,
    group: String,
    topic: String,
    offset: String,
    auto_commit: bool,
    caller: HttpCaller,
}

impl ProxyQueueCaller {
    pub fn new(config: &QueueConfig, pool: HttpClientPool) -> Self {
        let caller = HttpCaller::new(pool)
            .with_authorization(config.authorization())
            .with_host(config.host_override());
        Self {
            addrs: config.addrs.clone(),
            addr_index: 0,
            group: config.group.clone(),
            topic: config.topic.clone(),
            offset: config.offset().to_string(),
            auto_commit: config.auto_commit_enable,
            caller,
        }
    }

    /// Address used by the current instance.
    pub fn active_address(&self) -> &str {
        self.addrs
            .get(self.addr_index)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn instance_url(&self, instance: &ConsumerInstance) -> Result<Url, QueueError> {
        instance_url(self.active_address(), &instance.base_uri)
    }

    fn instance_subpath(
        &self,
        instance: &ConsumerInstance,
        suffix: &str,
    ) -> Result<String, QueueError> {
        let mut url = self.instance_url(instance)?;
        let path = format!("{}{}", url.path().trim_end_matches('/'), suffix);
        url.set_path(&path);
        Ok(url.to_string())
    }
}

/// Grafts the path of the proxy-reported `base_uri` onto the configured
/// address; the proxy may report an internal host name we cannot reach.
pub fn instance_url(addr: &str, base_uri: &str) -> Result<Url, QueueError> {
    let base_path = match Url::parse(base_uri) {
        Ok(url) => url.path().to_string(),
        Err(url::ParseError::RelativeUrlWithoutBase) => base_uri.to_string(),
        Err(source) => {
            return Err(QueueError::InstanceUrl {
                url: base_uri.to_string(),
                source,
            })
        }
    };

    let mut url = Url::parse(addr).map_err(|source| QueueError::InstanceUrl {
        url: addr.to_string(),
        source,
    })?;
    let path = format!("{}{}", url.path().trim_end_matches('/'), base_path);
    url.set_path(&path);
    Ok(url)
}

#[async_trait]
impl QueueCaller for ProxyQueueCaller {
    async fn create_instance(&mut self) -> Result<ConsumerInstance, QueueError> {
        if !self.addrs.is_empty() {
            self.addr_index = (self.addr_index + 1) % self.addrs.len();
        }
        let url = format!(
            "{}/consumers/{}",
            self.active_address().trim_end_matches('/'),
            self.group
        );
        let body = json!({
            "auto.offset.reset": self.offset,
            "auto.commit.enable": self.auto_commit.to_string(),
        });

        let data = self
            .caller
            .call(
                Method::POST,
                &url,
                Some(body.to_string()),
                &[("Content-Type", "application/json")],
                StatusCode::OK,
            )
            .await?;

        let instance: ConsumerInstance = serde_json::from_slice(&data).map_err(|err| {
            tracing::error!(
                target: "restq::queue",
                event = "instance_response_invalid",
                url = %url,
                error = %err
            );
            QueueError::InvalidInstance(err)
        })?;

        metrics().inc_instances_created();
        tracing::info!(
            target: "restq::queue",
            event = "instance_created",
            group = %self.group,
            address = %self.active_address(),
            base_uri = %instance.base_uri
        );
        Ok(instance)
    }

    async fn consume_messages(
        &mut self,
        instance: &ConsumerInstance,
    ) -> Result<Vec<Message>, QueueError> {
        let url = self.instance_subpath(instance, &format!("/topics/{}", self.topic))?;
        let data = self
            .caller
            .call(
                Method::GET,
                &url,
                None,
                &[("Accept", "application/json")],
                StatusCode::OK,
            )
            .await?;
        Ok(decode_batch(&data)?)
    }

    async fn commit_offsets(&mut self, instance: &ConsumerInstance) -> Result<(), QueueError> {
        let url = self.instance_subpath(instance, "/offsets")?;
        self.caller
            .call(Method::POST, &url, None, &[], StatusCode::OK)
            .await?;
        Ok(())
    }

    async fn destroy_instance(&mut self, instance: &ConsumerInstance) -> Result<(), QueueError> {
        let url = self.instance_url(instance)?.to_string();
        self.caller
            .call(Method::DELETE, &url, None, &[], StatusCode::NO_CONTENT)
            .await?;
        metrics().inc_instances_destroyed();
        tracing::info!(
            target: "restq::queue",
            event = "instance_destroyed",
            url = %url
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_url_keeps_configured_host() {
        let url = instance_url(
            "http://proxy.example:8080",
            "http://kafka-rest-internal:8082/consumers/group/instances/rest-consumer-1",
        )
        .expect("url");

        assert_eq!(
            url.as_str(),
            "http://proxy.example:8080/consumers/group/instances/rest-consumer-1"
        );
    }

    #[test]
    fn instance_url_appends_to_address_path() {
        let url = instance_url(
            "http://proxy.example/__kafka-rest-proxy/",
            "http://internal/consumers/g/instances/i",
        )
        .expect("url");

        assert_eq!(
            url.as_str(),
            "http://proxy.example/__kafka-rest-proxy/consumers/g/instances/i"
        );
    }

    #[test]
    fn instance_url_accepts_bare_paths() {
        let url = instance_url("http://proxy:8080", "/consumers/g/instances/i").expect("url");
        assert_eq!(url.as_str(), "http://proxy:8080/consumers/g/instances/i");
    }

    #[test]
    fn instance_url_rejects_bad_address() {
        let err = instance_url("::not a url::", "/consumers/g/instances/i").expect_err("rejected");
        assert!(matches!(err, QueueError::InstanceUrl { .. }));
    }

    #[test]
    fn instance_deserialises_without_id() {
        let instance: ConsumerInstance =
            serde_json::from_str(r#"{"base_uri":"http://h/consumers/g/instances/i"}"#)
                .expect("instance");
        assert_eq!(instance.instance_id, "");
    }

    #[test]
    fn first_address_is_active_before_any_create() {
        let pool = HttpClientPool::new(Default::default()).expect("pool");
        let config = QueueConfig::new(["http://a:1", "http://b:1"], "g", "t");
        let caller = ProxyQueueCaller::new(&config, pool);
        assert_eq!(caller.active_address(), "http://a:1");
    }
}
