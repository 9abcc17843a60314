use crate::error::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use url::Url;

pub const DEFAULT_OFFSET: &str = "largest";
pub const DEFAULT_BACKOFF_SECS: u64 = 8;
pub const DEFAULT_STREAM_COUNT: usize = 1;
pub const DEFAULT_PROCESSORS: usize = 100;

/// Top-level service configuration: one consumer, an optional producer and the
/// shared HTTP client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub consumer: QueueConfig,
    #[serde(default)]
    pub producer: Option<ProducerConfig>,
    #[serde(default)]
    pub http: HttpClientConfig,
}

impl ServiceConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("RESTQ").separator("__"))
            .build()?
            .try_deserialize()
    }
}

/// Consumer-side settings: where the proxy lives and how streams poll it.
///
/// Zero or empty values behave like unset ones; read them through the accessor
/// methods rather than the raw fields.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(rename = "address", alias = "addrs")]
    pub addrs: Vec<String>,
    pub group: String,
    pub topic: String,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub offset: String,
    #[serde(default)]
    pub backoff_period: u64,
    #[serde(default)]
    pub stream_count: usize,
    #[serde(default)]
    pub concurrent_processing: bool,
    #[serde(default)]
    pub no_of_processors: usize,
    #[serde(default)]
    pub authorization_key: Option<String>,
    #[serde(default)]
    pub auto_commit_enable: bool,
}

impl QueueConfig {
    pub fn new<I, S>(addrs: I, group: impl Into<String>, topic: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addrs: addrs.into_iter().map(Into::into).collect(),
            group: group.into(),
            topic: topic.into(),
            queue: None,
            offset: String::new(),
            backoff_period: 0,
            stream_count: 0,
            concurrent_processing: false,
            no_of_processors: 0,
            authorization_key: None,
            auto_commit_enable: false,
        }
    }

    pub fn offset(&self) -> &str {
        if self.offset.is_empty() {
            DEFAULT_OFFSET
        } else {
            &self.offset
        }
    }

    pub fn backoff(&self) -> Duration {
        if self.backoff_period == 0 {
            Duration::from_secs(DEFAULT_BACKOFF_SECS)
        } else {
            Duration::from_secs(self.backoff_period)
        }
    }

    pub fn streams(&self) -> usize {
        if self.stream_count == 0 {
            DEFAULT_STREAM_COUNT
        } else {
            self.stream_count
        }
    }

    pub fn processors(&self) -> usize {
        if self.no_of_processors == 0 {
            DEFAULT_PROCESSORS
        } else {
            self.no_of_processors
        }
    }

    pub fn authorization(&self) -> Option<&str> {
        non_empty(self.authorization_key.as_deref())
    }

    pub fn host_override(&self) -> Option<&str> {
        non_empty(self.queue.as_deref())
    }

    pub fn validate(&self) -> Result<()> {
        if self.addrs.is_empty() {
            crate::bail_err!("consumer config requires at least one proxy address");
        }
        for addr in &self.addrs {
            Url::parse(addr)
                .map_err(|err| crate::err!("invalid proxy address `{addr}`: {err}"))?;
        }
        if self.group.trim().is_empty() {
            crate::bail_err!("consumer config requires a consumer group");
        }
        if self.topic.trim().is_empty() {
            crate::bail_err!("consumer config requires a topic");
        }
        Ok(())
    }
}

/// Producer-side settings for posting records to a single proxy address.
#[derive(Debug, Clone, Deserialize)]
pub struct ProducerConfig {
    #[serde(rename = "address", alias = "addr")]
    pub addr: String,
    pub topic: String,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub authorization: Option<String>,
}

impl ProducerConfig {
    pub fn new(addr: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            topic: topic.into(),
            queue: None,
            authorization: None,
        }
    }

    pub fn authorization(&self) -> Option<&str> {
        non_empty(self.authorization.as_deref())
    }

    pub fn host_override(&self) -> Option<&str> {
        non_empty(self.queue.as_deref())
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.addr)
            .map_err(|err| crate::err!("invalid producer address `{}`: {err}", self.addr))?;
        if self.topic.trim().is_empty() {
            crate::bail_err!("producer config requires a topic");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpClientConfig {
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub request_timeout: Duration,
    #[serde(
        default = "default_connect_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub connect_timeout: Duration,
    #[serde(default = "default_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub pool_idle_timeout: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub ageing_interval: Option<Duration>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            pool_max_idle_per_host: default_max_idle_per_host(),
            pool_idle_timeout: None,
            ageing_interval: None,
        }
    }
}

impl HttpClientConfig {
    /// Settings used by a producer built without an explicit client.
    pub fn producer_defaults() -> Self {
        Self {
            pool_max_idle_per_host: 100,
            ..Self::default()
        }
    }
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

const fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_max_idle_per_host() -> usize {
    20
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => humantime::parse_duration(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
