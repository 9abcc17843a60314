use crate::codec::Message;
use crate::consumer::handler::MessageProcessor;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinSet};

pub const CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch worker panicked: {0}")]
    WorkerPanicked(#[source] JoinError),
    #[error("dispatch worker was cancelled: {0}")]
    WorkerCancelled(#[source] JoinError),
}

impl From<JoinError> for DispatchError {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            DispatchError::WorkerPanicked(err)
        } else {
            DispatchError::WorkerCancelled(err)
        }
    }
}

/// Fans one polled batch out to a fixed number of tasks through a bounded
/// channel. Completion order is not the batch order.
#[derive(Debug, Clone, Copy)]
pub struct DispatchPool {
    workers: usize,
}

impl DispatchPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Hands every message to `processor` as a single-message batch and waits
    /// for all of them. Returns how many were handled.
    pub async fn dispatch(
        &self,
        messages: Vec<Message>,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<usize, DispatchError> {
        if messages.is_empty() {
            return Ok(0);
        }

        let slots = self.workers.min(messages.len());
        let (tx, rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));
        let mut tasks = JoinSet::new();

        tasks.spawn(async move {
            for message in messages {
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            0usize
        });

        for _ in 0..slots {
            let rx = Arc::clone(&rx);
            let processor = Arc::clone(&processor);
            tasks.spawn(async move {
                let mut handled = 0usize;
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(message) = next else {
                        break;
                    };
                    processor.process(vec![message]).await;
                    handled += 1;
                }
                handled
            });
        }
        // Only the slots hold the receiver now; if they all die the feeder
        // stops instead of blocking on a full channel.
        drop(rx);

        let mut handled = 0usize;
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(count) => handled += count,
                Err(err) => {
                    if failure.is_none() {
                        failure = Some(err);
                    }
                }
            }
        }

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(handled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::handler::SplitProcessor;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn batch(count: usize) -> Vec<Message> {
        (0..count)
            .map(|index| Message::new(BTreeMap::new(), index.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn every_message_is_handled_exactly_once() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let processor: Arc<dyn MessageProcessor> =
            Arc::new(SplitProcessor::new(move |message: Message| {
                let sink = Arc::clone(&sink);
                async move {
                    tokio::task::yield_now().await;
                    sink.lock().unwrap().push(message.body);
                }
            }));

        let handled = DispatchPool::new(7)
            .dispatch(batch(300), processor)
            .await
            .expect("dispatch");

        assert_eq!(handled, 300);
        let mut bodies: Vec<usize> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|body| body.parse().unwrap())
            .collect();
        bodies.sort_unstable();
        assert_eq!(bodies, (0..300).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn runs_at_most_pool_size_concurrently() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (active_in, peak_in) = (Arc::clone(&active), Arc::clone(&peak));
        let processor: Arc<dyn MessageProcessor> =
            Arc::new(SplitProcessor::new(move |_message: Message| {
                let active = Arc::clone(&active_in);
                let peak = Arc::clone(&peak_in);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            }));

        let handled = DispatchPool::new(3)
            .dispatch(batch(20), processor)
            .await
            .expect("dispatch");

        assert_eq!(handled, 20);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn worker_panic_is_reported() {
        let processor: Arc<dyn MessageProcessor> =
            Arc::new(SplitProcessor::new(|message: Message| async move {
                if message.body == "3" {
                    panic!("handler failure");
                }
            }));

        let err = DispatchPool::new(2)
            .dispatch(batch(10), processor)
            .await
            .expect_err("panic surfaces");

        assert!(matches!(err, DispatchError::WorkerPanicked(_)));
    }

    #[tokio::test]
    async fn empty_batch_spawns_nothing() {
        let processor: Arc<dyn MessageProcessor> =
            Arc::new(SplitProcessor::new(|_message: Message| async move {
                panic!("not called");
            }));

        let handled = DispatchPool::new(4)
            .dispatch(Vec::new(), processor)
            .await
            .expect("dispatch");
        assert_eq!(handled, 0);
    }
}
