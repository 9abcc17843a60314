//! One polling stream: owns at most one consumer instance and drives it
//! through create, poll, dispatch and commit until shutdown.

use crate::codec::Message;
use crate::consumer::dispatch::{DispatchError, DispatchPool};
use crate::consumer::handler::MessageProcessor;
use crate::metrics::metrics;
use crate::queue::{ConsumerInstance, QueueCaller, QueueError};
use crate::stream_event;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const TARGET: &str = "restq::stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    NoInstance,
    Active(ConsumerInstance),
}

impl InstanceState {
    pub fn instance(&self) -> Option<&ConsumerInstance> {
        match self {
            InstanceState::Active(instance) => Some(instance),
            InstanceState::NoInstance => None,
        }
    }
}

/// How a single poll cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Messages were handed to the application (and committed unless the
    /// proxy auto-commits).
    Processed(usize),
    /// The poll returned nothing; the worker backed off.
    Idle,
    /// A proxy call failed; the worker backed off.
    Failed,
    /// Application code panicked; nothing was committed.
    Panicked,
}

#[derive(Debug, Error)]
enum CycleError {
    #[error("creating consumer instance: {0}")]
    Create(#[source] QueueError),
    #[error("consuming messages: {0}")]
    Poll(#[source] QueueError),
    #[error("committing offsets: {0}")]
    Commit(#[source] QueueError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

pub struct StreamWorker<Q: QueueCaller> {
    id: usize,
    topic: String,
    queue: Q,
    state: InstanceState,
    processor: Arc<dyn MessageProcessor>,
    dispatch: Option<DispatchPool>,
    backoff: Duration,
    auto_commit: bool,
}

impl<Q: QueueCaller> StreamWorker<Q> {
    pub fn new(
        id: usize,
        topic: impl Into<String>,
        queue: Q,
        processor: Arc<dyn MessageProcessor>,
        backoff: Duration,
    ) -> Self {
        Self {
            id,
            topic: topic.into(),
            queue,
            state: InstanceState::NoInstance,
            processor,
            dispatch: None,
            backoff,
            auto_commit: false,
        }
    }

    /// Hand each batch to a pool of `workers` tasks instead of processing it
    /// inline.
    pub fn with_dispatch(mut self, workers: usize) -> Self {
        self.dispatch = Some(DispatchPool::new(workers));
        self
    }

    /// The proxy commits on its own; skip the explicit commit.
    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> &InstanceState {
        &self.state
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Runs cycles until `shutdown` is cancelled, then destroys the live
    /// instance. The signal is only observed between cycles.
    pub async fn consume_while_active(&mut self, shutdown: CancellationToken) {
        stream_event!(info, TARGET, "stream_started", stream = self.id, topic = self.topic);
        loop {
            if shutdown.is_cancelled() {
                self.shutdown().await;
                stream_event!(info, TARGET, "stream_stopped", stream = self.id, topic = self.topic);
                return;
            }
            self.run_cycle().await;
            tokio::task::yield_now().await;
        }
    }

    /// One create/poll/dispatch/commit pass under a panic boundary.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let result = AssertUnwindSafe(self.consume()).catch_unwind().await;

        match result {
            Ok(Ok(0)) => {
                tokio::time::sleep(self.backoff).await;
                CycleOutcome::Idle
            }
            Ok(Ok(count)) => CycleOutcome::Processed(count),
            Ok(Err(CycleError::Dispatch(err))) => {
                metrics().inc_handler_panics();
                stream_event!(
                    error,
                    TARGET,
                    "cycle_panicked",
                    stream = self.id,
                    topic = self.topic,
                    error = err
                );
                CycleOutcome::Panicked
            }
            Ok(Err(err)) => {
                metrics().inc_cycle_failures();
                stream_event!(
                    error,
                    TARGET,
                    "cycle_failed",
                    stream = self.id,
                    topic = self.topic,
                    error = err
                );
                tokio::time::sleep(self.backoff).await;
                CycleOutcome::Failed
            }
            Err(panic) => {
                metrics().inc_handler_panics();
                stream_event!(
                    error,
                    TARGET,
                    "cycle_panicked",
                    stream = self.id,
                    topic = self.topic,
                    error = panic_message(panic.as_ref())
                );
                CycleOutcome::Panicked
            }
        }
    }

    async fn consume(&mut self) -> Result<usize, CycleError> {
        let instance = match self.state.instance().cloned() {
            Some(instance) => instance,
            None => {
                let instance = self
                    .queue
                    .create_instance()
                    .await
                    .map_err(CycleError::Create)?;
                self.state = InstanceState::Active(instance.clone());
                instance
            }
        };

        let messages = match self.queue.consume_messages(&instance).await {
            Ok(messages) => messages,
            Err(err) => {
                self.discard_instance(&instance).await;
                return Err(CycleError::Poll(err));
            }
        };
        metrics().record_poll(messages.len());

        if messages.is_empty() {
            return Ok(0);
        }

        let count = self.process(messages).await?;
        metrics().add_messages_dispatched(count);

        if !self.auto_commit {
            if let Err(err) = self.queue.commit_offsets(&instance).await {
                self.discard_instance(&instance).await;
                return Err(CycleError::Commit(err));
            }
            metrics().inc_commits();
        }

        Ok(count)
    }

    async fn process(&self, messages: Vec<Message>) -> Result<usize, CycleError> {
        match &self.dispatch {
            Some(pool) => Ok(pool.dispatch(messages, Arc::clone(&self.processor)).await?),
            None => {
                let count = messages.len();
                self.processor.process(messages).await;
                Ok(count)
            }
        }
    }

    async fn discard_instance(&mut self, instance: &ConsumerInstance) {
        if let Err(err) = self.queue.destroy_instance(instance).await {
            stream_event!(
                error,
                TARGET,
                "instance_destroy_failed",
                stream = self.id,
                topic = self.topic,
                error = err
            );
        }
        self.state = InstanceState::NoInstance;
    }

    async fn shutdown(&mut self) {
        let state = std::mem::replace(&mut self.state, InstanceState::NoInstance);
        if let InstanceState::Active(instance) = state {
            self.discard_instance(&instance).await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
