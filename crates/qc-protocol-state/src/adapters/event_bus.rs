//! Event Bus Adapter
//!
//! Forwards protocol notifications to `shared-bus` subscribers.

use crate::ports::outbound::ProtocolConsumer;
use shared_bus::{EventPublisher, ProtocolEvent};
use shared_types::Header;
use std::sync::Arc;
use tracing::trace;

/// `ProtocolConsumer` that publishes every notification on the bus.
pub struct BusConsumer<P: EventPublisher> {
    publisher: Arc<P>,
}

impl<P: EventPublisher> BusConsumer<P> {
    pub fn new(publisher: Arc<P>) -> Self {
        Self { publisher }
    }

    fn publish(&self, event: ProtocolEvent) {
        let receivers = self.publisher.publish(event);
        trace!(receivers, "[protocol-state] Notification forwarded to bus");
    }
}

impl<P: EventPublisher> ProtocolConsumer for BusConsumer<P> {
    fn block_finalized(&self, header: &Header) {
        self.publish(ProtocolEvent::BlockFinalized(header.clone()));
    }

    fn block_processable(&self, header: &Header) {
        self.publish(ProtocolEvent::BlockProcessable(header.clone()));
    }

    fn epoch_setup_phase_started(&self, counter: u64, header: &Header) {
        self.publish(ProtocolEvent::EpochSetupPhaseStarted {
            counter,
            header: header.clone(),
        });
    }

    fn epoch_committed_phase_started(&self, counter: u64, header: &Header) {
        self.publish(ProtocolEvent::EpochCommittedPhaseStarted {
            counter,
            header: header.clone(),
        });
    }

    fn epoch_transition(&self, counter: u64, header: &Header) {
        self.publish(ProtocolEvent::EpochTransition {
            counter,
            header: header.clone(),
        });
    }

    fn critical(&self, reason: &str) {
        self.publish(ProtocolEvent::CriticalError {
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{EventFilter, EventTopic, InMemoryEventBus};

    #[tokio::test]
    async fn test_notifications_reach_subscribers() {
        let bus = Arc::new(InMemoryEventBus::new());
        let mut sub = bus.subscribe(EventFilter::topics(vec![
            EventTopic::EpochPhase,
            EventTopic::Critical,
        ]));
        let consumer = BusConsumer::new(bus.clone());

        let header = Header {
            height: 9,
            ..Default::default()
        };
        consumer.block_finalized(&header);
        consumer.epoch_transition(2, &header);
        consumer.critical("epoch halt");

        assert_eq!(
            sub.recv().await,
            Some(ProtocolEvent::EpochTransition { counter: 2, header })
        );
        assert!(matches!(
            sub.recv().await,
            Some(ProtocolEvent::CriticalError { .. })
        ));
        assert_eq!(bus.events_published(), 3);
    }
}
