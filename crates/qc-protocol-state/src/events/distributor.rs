//! # Event Distributor
//!
//! Fans protocol notifications out to registered consumers, synchronously and
//! in registration order. A panicking consumer is contained and logged; the
//! mutator never sees consumer failures.

use crate::ports::outbound::ProtocolConsumer;
use parking_lot::RwLock;
use shared_types::Header;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Registry of notification consumers.
#[derive(Default)]
pub struct Distributor {
    consumers: RwLock<Vec<Arc<dyn ProtocolConsumer>>>,
}

impl Distributor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_consumer(&self, consumer: Arc<dyn ProtocolConsumer>) {
        self.consumers.write().push(consumer);
    }

    pub fn len(&self) -> usize {
        self.consumers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.read().is_empty()
    }

    fn each(&self, notification: &'static str, f: impl Fn(&dyn ProtocolConsumer)) {
        // Snapshot so consumers may register others while being notified.
        let consumers = self.consumers.read().clone();
        for (index, consumer) in consumers.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| f(consumer.as_ref()))).is_err() {
                warn!(
                    notification,
                    consumer = index,
                    "[protocol-state] Consumer panicked, notification dropped"
                );
            }
        }
    }
}

impl ProtocolConsumer for Distributor {
    fn block_finalized(&self, header: &Header) {
        self.each("block_finalized", |c| c.block_finalized(header));
    }

    fn block_processable(&self, header: &Header) {
        self.each("block_processable", |c| c.block_processable(header));
    }

    fn epoch_setup_phase_started(&self, counter: u64, header: &Header) {
        self.each("epoch_setup_phase_started", |c| {
            c.epoch_setup_phase_started(counter, header)
        });
    }

    fn epoch_committed_phase_started(&self, counter: u64, header: &Header) {
        self.each("epoch_committed_phase_started", |c| {
            c.epoch_committed_phase_started(counter, header)
        });
    }

    fn epoch_transition(&self, counter: u64, header: &Header) {
        self.each("epoch_transition", |c| c.epoch_transition(counter, header));
    }

    fn critical(&self, reason: &str) {
        self.each("critical", |c| c.critical(reason));
    }
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConsumer;

impl ProtocolConsumer for NoopConsumer {
    fn block_finalized(&self, _header: &Header) {}

    fn block_processable(&self, _header: &Header) {}

    fn epoch_setup_phase_started(&self, _counter: u64, _header: &Header) {}

    fn epoch_committed_phase_started(&self, _counter: u64, _header: &Header) {}

    fn epoch_transition(&self, _counter: u64, _header: &Header) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingConsumer;
    use shared_bus::ProtocolEvent;

    struct Panicking;

    impl ProtocolConsumer for Panicking {
        fn block_finalized(&self, _header: &Header) {
            panic!("consumer failure");
        }
        fn block_processable(&self, _header: &Header) {}
        fn epoch_setup_phase_started(&self, _counter: u64, _header: &Header) {}
        fn epoch_committed_phase_started(&self, _counter: u64, _header: &Header) {}
        fn epoch_transition(&self, _counter: u64, _header: &Header) {}
    }

    #[test]
    fn test_fan_out_in_registration_order() {
        let distributor = Distributor::new();
        let first = Arc::new(RecordingConsumer::default());
        let second = Arc::new(RecordingConsumer::default());
        distributor.add_consumer(first.clone());
        distributor.add_consumer(Arc::new(NoopConsumer));
        distributor.add_consumer(second.clone());
        assert_eq!(distributor.len(), 3);

        let header = Header::default();
        distributor.block_finalized(&header);
        distributor.epoch_transition(2, &header);

        let expected = vec![
            ProtocolEvent::BlockFinalized(header.clone()),
            ProtocolEvent::EpochTransition {
                counter: 2,
                header: header.clone(),
            },
        ];
        assert_eq!(first.events(), expected);
        assert_eq!(second.events(), expected);
    }

    #[test]
    fn test_panicking_consumer_is_contained() {
        let distributor = Distributor::new();
        let recorder = Arc::new(RecordingConsumer::default());
        distributor.add_consumer(Arc::new(Panicking));
        distributor.add_consumer(recorder.clone());

        distributor.block_finalized(&Header::default());
        assert_eq!(recorder.events().len(), 1);
    }
}
