use crate::codec::Message;
use async_trait::async_trait;
use std::future::Future;

/// Application callback receiving one message at a time.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: Message);
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, message: Message) {
        (self)(message).await
    }
}

/// Application callback receiving a whole polled batch.
#[async_trait]
pub trait BatchHandler: Send + Sync + 'static {
    async fn handle_batch(&self, messages: Vec<Message>);
}

#[async_trait]
impl<F, Fut> BatchHandler for F
where
    F: Fn(Vec<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle_batch(&self, messages: Vec<Message>) {
        (self)(messages).await
    }
}

/// What a stream worker hands messages to, sequentially or from a dispatch slot.
#[async_trait]
pub trait MessageProcessor: Send + Sync + 'static {
    async fn process(&self, messages: Vec<Message>);
}

/// Calls a [`MessageHandler`] once per message, in batch order.
pub struct SplitProcessor<H> {
    handler: H,
}

impl<H: MessageHandler> SplitProcessor<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<H: MessageHandler> MessageProcessor for SplitProcessor<H> {
    async fn process(&self, messages: Vec<Message>) {
        for message in messages {
            self.handler.handle(message).await;
        }
    }
}

/// Calls a [`BatchHandler`] once per non-empty batch.
pub struct BatchProcessor<H> {
    handler: H,
}

impl<H: BatchHandler> BatchProcessor<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<H: BatchHandler> MessageProcessor for BatchProcessor<H> {
    async fn process(&self, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        self.handler.handle_batch(messages).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn message(body: &str) -> Message {
        Message::new(Default::default(), body)
    }

    #[tokio::test]
    async fn split_processor_preserves_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let processor = SplitProcessor::new(move |message: Message| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(message.body);
            }
        });

        processor
            .process(vec![message("1"), message("2"), message("3")])
            .await;

        assert_eq!(*seen.lock().unwrap(), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn batch_processor_skips_empty_batches() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let processor = BatchProcessor::new(move |messages: Vec<Message>| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(messages.len());
            }
        });

        processor.process(Vec::new()).await;
        processor.process(vec![message("a"), message("b")]).await;

        assert_eq!(*calls.lock().unwrap(), vec![2]);
    }
}
