//! The consumer: a set of independent polling streams sharing one handler.

pub mod dispatch;
pub mod handler;
pub mod stream;

use crate::client::{AgeingClient, HttpClientPool};
use crate::config::QueueConfig;
use crate::error::Result;
use crate::health::{ConnectivityProbe, HealthError};
use crate::metrics::metrics;
use crate::queue::{ProxyQueueCaller, QueueCaller};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub use dispatch::{DispatchError, DispatchPool};
pub use handler::{BatchHandler, BatchProcessor, MessageHandler, MessageProcessor, SplitProcessor};
pub use stream::{CycleOutcome, InstanceState, StreamWorker};

pub struct Consumer<Q: QueueCaller = ProxyQueueCaller> {
    topic: String,
    stream_count: usize,
    workers: Mutex<Vec<StreamWorker<Q>>>,
    shutdown: CancellationToken,
    ageing: Option<AgeingClient>,
    probe: Option<ConnectivityProbe>,
}

impl Consumer<ProxyQueueCaller> {
    /// Streams calling `handler` once per message.
    pub fn new<H: MessageHandler>(config: QueueConfig, handler: H, pool: HttpClientPool) -> Self {
        let processor: Arc<dyn MessageProcessor> = Arc::new(SplitProcessor::new(handler));
        Self::over_proxy(&config, processor, pool)
    }

    /// Streams calling `handler` once per non-empty polled batch.
    pub fn batched<H: BatchHandler>(config: QueueConfig, handler: H, pool: HttpClientPool) -> Self {
        let processor: Arc<dyn MessageProcessor> = Arc::new(BatchProcessor::new(handler));
        Self::over_proxy(&config, processor, pool)
    }

    /// Like [`Consumer::new`], also running `ageing` for as long as the
    /// consumer runs.
    pub fn with_ageing<H: MessageHandler>(
        config: QueueConfig,
        handler: H,
        ageing: AgeingClient,
    ) -> Self {
        let mut consumer = Self::new(config, handler, ageing.pool().clone());
        consumer.ageing = Some(ageing);
        consumer
    }

    fn over_proxy(
        config: &QueueConfig,
        processor: Arc<dyn MessageProcessor>,
        pool: HttpClientPool,
    ) -> Self {
        let probe = ConnectivityProbe::for_consumer(config, pool.clone());
        let mut consumer =
            Self::with_callers(config, processor, || ProxyQueueCaller::new(config, pool.clone()));
        consumer.probe = Some(probe);
        consumer
    }
}

impl<Q: QueueCaller> Consumer<Q> {
    /// Builds one stream per configured stream, each with its own caller.
    pub fn with_callers<F>(
        config: &QueueConfig,
        processor: Arc<dyn MessageProcessor>,
        mut make_caller: F,
    ) -> Self
    where
        F: FnMut() -> Q,
    {
        let stream_count = config.streams();
        let workers = (0..stream_count)
            .map(|id| {
                let worker = StreamWorker::new(
                    id,
                    config.topic.clone(),
                    make_caller(),
                    Arc::clone(&processor),
                    config.backoff(),
                )
                .with_auto_commit(config.auto_commit_enable);
                if config.concurrent_processing {
                    worker.with_dispatch(config.processors())
                } else {
                    worker
                }
            })
            .collect();

        Self {
            topic: config.topic.clone(),
            stream_count,
            workers: Mutex::new(workers),
            shutdown: CancellationToken::new(),
            ageing: None,
            probe: None,
        }
    }

    pub fn stream_count(&self) -> usize {
        self.stream_count
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs every stream until [`Consumer::stop`] is called and all of them
    /// have destroyed their instances. A consumer can only be started once.
    pub async fn start(&self) -> Result<()> {
        let workers = {
            let mut guard = match self.workers.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *guard)
        };
        if workers.is_empty() {
            crate::bail_err!("consumer for topic `{}` was already started", self.topic);
        }

        tracing::info!(
            target: "restq::consumer",
            event = "consumer_started",
            topic = %self.topic,
            streams = self.stream_count
        );

        let ageing = self
            .ageing
            .as_ref()
            .map(|ageing| ageing.start_ageing_process(self.shutdown.clone()));

        let mut streams = JoinSet::new();
        for mut worker in workers {
            let shutdown = self.shutdown.clone();
            streams.spawn(async move {
                worker.consume_while_active(shutdown).await;
            });
        }

        while let Some(joined) = streams.join_next().await {
            if let Err(err) = joined {
                tracing::error!(
                    target: "restq::consumer",
                    event = "stream_aborted",
                    topic = %self.topic,
                    error = %err
                );
            }
        }

        self.shutdown.cancel();
        if let Some(handle) = ageing {
            handle.await?;
        }

        let totals = metrics().snapshot();
        tracing::info!(
            target: "restq::consumer",
            event = "consumer_stopped",
            topic = %self.topic,
            instances_created = totals.instances_created,
            instances_destroyed = totals.instances_destroyed,
            polls = totals.polls,
            empty_polls = totals.empty_polls,
            messages_received = totals.messages_received,
            messages_dropped = totals.messages_dropped,
            messages_dispatched = totals.messages_dispatched,
            commits = totals.commits,
            cycle_failures = totals.cycle_failures,
            handler_panics = totals.handler_panics,
            idle_recycles = totals.idle_recycles
        );
        Ok(())
    }

    /// Signals every stream to finish its current cycle and exit. Does not
    /// wait; `start()` returns once they have.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub async fn check_connectivity(&self) -> Result<String, HealthError> {
        match &self.probe {
            Some(probe) => probe.check().await,
            None => Err(HealthError::Unreachable {
                failures: vec!["consumer has no connectivity probe".to_string()],
            }),
        }
    }
}
