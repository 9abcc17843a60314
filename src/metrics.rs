use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// Process-wide counters for the consumer and producer paths.
#[derive(Default)]
pub struct MetricsCollector {
    instances_created: AtomicU64,
    instances_destroyed: AtomicU64,
    polls: AtomicU64,
    empty_polls: AtomicU64,
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,
    messages_dispatched: AtomicU64,
    commits: AtomicU64,
    cycle_failures: AtomicU64,
    handler_panics: AtomicU64,
    send_success: AtomicU64,
    send_failure: AtomicU64,
    idle_recycles: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub instances_created: u64,
    pub instances_destroyed: u64,
    pub polls: u64,
    pub empty_polls: u64,
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub messages_dispatched: u64,
    pub commits: u64,
    pub cycle_failures: u64,
    pub handler_panics: u64,
    pub send_success: u64,
    pub send_failure: u64,
    pub idle_recycles: u64,
}

impl MetricsCollector {
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
        INSTANCE.get_or_init(Self::default)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            instances_created: self.instances_created.load(Ordering::Relaxed),
            instances_destroyed: self.instances_destroyed.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            cycle_failures: self.cycle_failures.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            send_success: self.send_success.load(Ordering::Relaxed),
            send_failure: self.send_failure.load(Ordering::Relaxed),
            idle_recycles: self.idle_recycles.load(Ordering::Relaxed),
        }
    }

    pub fn inc_instances_created(&self) {
        self.instances_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_instances_destroyed(&self) {
        self.instances_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll(&self, received: usize) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        if received == 0 {
            self.empty_polls.fetch_add(1, Ordering::Relaxed);
        }
        self.messages_received
            .fetch_add(received as u64, Ordering::Relaxed);
    }

    pub fn inc_messages_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_messages_dispatched(&self, count: usize) {
        self.messages_dispatched
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn inc_commits(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cycle_failures(&self) {
        self.cycle_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_handler_panics(&self) {
        self.handler_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send(&self, success: bool) {
        if success {
            self.send_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.send_failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_idle_recycles(&self) {
        self.idle_recycles.fetch_add(1, Ordering::Relaxed);
    }
}

/// Returns the shared `MetricsCollector` instance.
pub fn metrics() -> &'static MetricsCollector {
    MetricsCollector::global()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_polls_are_counted_separately() {
        let collector = MetricsCollector::default();
        collector.record_poll(0);
        collector.record_poll(3);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.polls, 2);
        assert_eq!(snapshot.empty_polls, 1);
        assert_eq!(snapshot.messages_received, 3);
    }

    #[test]
    fn send_outcomes_split_by_result() {
        let collector = MetricsCollector::default();
        collector.record_send(true);
        collector.record_send(false);
        collector.record_send(false);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.send_success, 1);
        assert_eq!(snapshot.send_failure, 2);
    }
}
