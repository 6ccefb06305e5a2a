//! # Integration Test Flows
//!
//! Drives the protocol state the way a node does and checks what
//! subscribers on the shared bus observe.
//!
//! ## Flows Tested:
//!
//! 1. **Epoch lifecycle**: setup and commit sealed, phase events published at finalization
//!    and observed by both subscriptions and event streams
//! 2. **Epoch halt**: crossing the final view uncommitted reaches critical subscribers
//! 3. **Processable blocks**: `MarkValid` announces parents on the processing topic
//! 4. **Concurrent readers**: snapshots stay consistent while the chain grows

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;

    use qc_protocol_state::test_utils::*;
    use qc_protocol_state::{BusConsumer, MutatorApi, StateApi};
    use shared_bus::{EventFilter, EventPublisher, EventTopic, InMemoryEventBus, ProtocolEvent};
    use shared_types::{Block, Header, Payload, ServiceEvent};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Bootstrapped state whose notifications are published on a fresh bus.
    fn bus_state() -> (RootFixture, TestState, Arc<InMemoryEventBus>) {
        init_tracing();
        let fixture = RootFixture::new();
        let state = fixture.bootstrapped_state();
        let bus = Arc::new(InMemoryEventBus::new());
        state
            .distributor()
            .add_consumer(Arc::new(BusConsumer::new(Arc::clone(&bus))));
        (fixture, state, bus)
    }

    fn extend(state: &TestState, parent: &Header, payload: Payload) -> anyhow::Result<Block> {
        let block = child_with_payload(parent, parent.view + 1, payload);
        state.extend(&block)?;
        Ok(block)
    }

    // =============================================================================
    // EPOCH LIFECYCLE
    // =============================================================================

    #[tokio::test]
    async fn test_epoch_lifecycle_over_bus() -> anyhow::Result<()> {
        let (fixture, state, bus) = bus_state();
        let mut phases = bus.subscribe(EventFilter::topics(vec![EventTopic::EpochPhase]));
        let mut finalized = bus.subscribe(EventFilter::topics(vec![EventTopic::Finalization]));
        let mut phase_stream = bus.event_stream(EventFilter::topics(vec![EventTopic::EpochPhase]));

        let setup = setup_fixture(2, RootFixture::FINAL_VIEW + 1000, participants());
        let commit = commit_for(&setup);

        let b1 = extend(&state, &fixture.root.header, Payload::default())?;
        let result1 = result_for(&b1, &fixture.result, vec![ServiceEvent::Setup(setup)]);
        let b2 = extend(
            &state,
            &b1.header,
            Payload {
                receipts: vec![receipt_for_result(result1.clone(), EXECUTOR)],
                ..Default::default()
            },
        )?;
        let result2 = result_for(&b2, &result1, vec![ServiceEvent::Commit(commit)]);
        let b3 = extend(
            &state,
            &b2.header,
            Payload {
                receipts: vec![receipt_for_result(result2.clone(), EXECUTOR)],
                seals: vec![seal_for(&result1)],
                ..Default::default()
            },
        )?;
        let b4 = extend(
            &state,
            &b3.header,
            Payload {
                seals: vec![seal_for(&result2)],
                ..Default::default()
            },
        )?;
        let b5 = child_at_view(&b4.header, RootFixture::FINAL_VIEW + 1);
        state.extend(&b5)?;

        // Nothing is announced before finalization.
        assert!(phases.drain().is_empty());

        for block in [&b1, &b2, &b3, &b4, &b5] {
            state.finalize(&block.id())?;
        }

        let expected = vec![
            ProtocolEvent::EpochSetupPhaseStarted {
                counter: 1,
                header: b3.header.clone(),
            },
            ProtocolEvent::EpochCommittedPhaseStarted {
                counter: 1,
                header: b4.header.clone(),
            },
            ProtocolEvent::EpochTransition {
                counter: 2,
                header: b5.header.clone(),
            },
        ];
        assert_eq!(phases.drain(), expected);

        // Stream consumers see the same sequence.
        let mut streamed = Vec::with_capacity(expected.len());
        for _ in 0..expected.len() {
            let event = timeout(Duration::from_secs(1), phase_stream.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("event stream closed"))?;
            streamed.push(event);
        }
        assert_eq!(streamed, expected);
        assert_eq!(finalized.drain().len(), 5);
        assert_eq!(bus.events_published(), 8);

        let head = state.final_snapshot()?;
        assert_eq!(head.epochs().current()?.counter(), 2);
        assert_eq!(head.epochs().previous()?.counter(), 1);
        assert_eq!(state.sealed()?.block_id(), b2.id());
        Ok(())
    }

    #[tokio::test]
    async fn test_epoch_halt_raises_critical_event() -> anyhow::Result<()> {
        let (fixture, state, bus) = bus_state();
        let mut critical = bus.subscribe(EventFilter::topics(vec![EventTopic::Critical]));

        let block = child_at_view(&fixture.root.header, RootFixture::FINAL_VIEW + 1);
        let err = state
            .extend(&block)
            .expect_err("epoch 1 has no committed successor");
        assert!(err.is_fatal());

        let event = timeout(Duration::from_secs(1), critical.recv()).await?;
        assert!(matches!(event, Some(ProtocolEvent::CriticalError { .. })));

        // The halted block was not stored.
        assert!(state.at_block_id(&block.id()).is_err());
        assert_eq!(state.final_snapshot()?.block_id(), fixture.root.id());
        Ok(())
    }

    // =============================================================================
    // PROCESSING
    // =============================================================================

    #[tokio::test]
    async fn test_mark_valid_announces_processable_parent() -> anyhow::Result<()> {
        let (fixture, state, bus) = bus_state();
        let mut processing = bus.subscribe(EventFilter::topics(vec![EventTopic::Processing]));

        let b1 = extend(&state, &fixture.root.header, Payload::default())?;
        let b2 = extend(&state, &b1.header, Payload::default())?;
        let b3 = extend(&state, &b2.header, Payload::default())?;

        for block in [&b1, &b2, &b3] {
            state.mark_valid(&block.id())?;
        }

        let event = timeout(Duration::from_secs(1), processing.recv()).await?;
        assert_eq!(event, Some(ProtocolEvent::BlockProcessable(b1.header.clone())));
        assert_eq!(
            processing.drain(),
            vec![ProtocolEvent::BlockProcessable(b2.header.clone())]
        );
        Ok(())
    }

    // =============================================================================
    // CONCURRENCY
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_snapshots_readable_while_extending() -> anyhow::Result<()> {
        init_tracing();
        let fixture = RootFixture::new();
        let state = Arc::new(fixture.bootstrapped_state());
        let root = fixture.root.header.clone();

        let writer = {
            let state = Arc::clone(&state);
            tokio::task::spawn_blocking(move || -> anyhow::Result<u64> {
                let mut parent = root;
                for _ in 0..64 {
                    let block = extend(&state, &parent, Payload::default())?;
                    state.finalize(&block.id())?;
                    parent = block.header;
                }
                Ok(parent.height)
            })
        };

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let state = Arc::clone(&state);
                tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
                    let mut last = 0;
                    for _ in 0..200 {
                        let head = state.final_snapshot()?;
                        let height = head.head().height;
                        anyhow::ensure!(height >= last, "finalized height went backwards");
                        anyhow::ensure!(state.sealed()?.head().height <= height);
                        anyhow::ensure!(state.at_height(height)?.block_id() == head.block_id());
                        last = height;
                    }
                    Ok(())
                })
            })
            .collect();

        let tip = writer.await??;
        for reader in readers {
            reader.await??;
        }
        assert_eq!(tip, 64);
        assert_eq!(state.final_snapshot()?.head().height, 64);
        Ok(())
    }
}
