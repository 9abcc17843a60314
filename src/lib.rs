#![allow(clippy::result_large_err)]

pub mod client;
pub mod codec;
pub mod config;
pub mod consumer;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod producer;
pub mod queue;
pub mod telemetry;

pub use client::{AgeingClient, CallError, HttpCaller, HttpClientPool};
pub use codec::{Message, WireError};
pub use config::{HttpClientConfig, ProducerConfig, QueueConfig, ServiceConfig};
pub use consumer::{BatchHandler, Consumer, MessageHandler};
pub use error::{Error, Result};
pub use health::{ConnectivityProbe, HealthError};
pub use producer::{MessageProducer, ProxyProducer, SendError};
pub use queue::{ConsumerInstance, ProxyQueueCaller, QueueCaller, QueueError};
