//! # Mutator API Implementation
//!
//! Bootstrap, block insertion, finalization and validity marking.

use super::extension::ExtendMode;
use super::*;
use crate::domain::epoch::{verify_commit, verify_setup_structure};
use crate::domain::transition::{phase_events, EpochPhaseEvent};
use crate::metrics;
use crate::ports::inbound::MutatorApi;
use crate::ports::outbound::{EntityBatch, ProtocolConsumer};
use shared_types::{Block, EpochCommit, ExecutionResult, Seal, ServiceEvent};
use tracing::{debug, info};

impl<S: EntityStore, R: ReceiptValidator> MutatorApi for ProtocolState<S, R> {
    fn bootstrap(&self, root: &Block, result: &ExecutionResult, seal: &Seal) -> StateResult<()> {
        match self.store.retrieve_root_height() {
            Ok(_) => return Err(StateError::AlreadyBootstrapped),
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let (setup, commit) = verify_root(root, result, seal, &self.config)?;
        let root_id = root.id();
        let height = root.header.height;
        let status = EpochStatus::root(root_id, setup, commit);

        let mut batch = EntityBatch::new();
        batch
            .insert_header(&root.header)
            .insert_payload(root_id, &root.payload)
            .insert_result(result)
            .insert_seal(seal)
            .index_seal(root_id, seal.id())
            .insert_epoch_setup(setup)
            .insert_epoch_commit(commit)
            .insert_epoch_status(root_id, &status)
            .index_height(height, root_id)
            .set_root_height(height)
            .set_finalized_height(height)
            .set_sealed_height(height)
            .mark_valid(root_id)
            .mark_payload_validated(root_id);
        self.store.commit(batch)?;

        info!(
            block_id = %hex::encode(root_id),
            height,
            epoch = setup.counter,
            final_view = setup.final_view,
            participants = setup.participants.len(),
            "[protocol-state] Bootstrapped from root block"
        );
        metrics::record_finalized(height, height);
        metrics::set_epoch(status.counter, status.phase().as_u8());
        self.statuses.lock().put(root_id, status);
        Ok(())
    }

    fn extend(&self, candidate: &Block) -> StateResult<()> {
        self.insert_block(candidate, ExtendMode::Full)
    }

    fn header_extend(&self, candidate: &Block) -> StateResult<()> {
        self.insert_block(candidate, ExtendMode::HeaderOnly)
    }

    fn finalize(&self, block_id: &Identifier) -> StateResult<()> {
        let header = self.header_of(block_id)?;
        let finalized_height = self.finalized_height()?;

        if header.height <= finalized_height {
            if self.store.lookup_block_height(header.height)? == *block_id {
                debug!(height = header.height, "[protocol-state] Block already finalized");
                return Ok(());
            }
            return Err(StateError::InvalidFinalization {
                reason: format!(
                    "block conflicts with the finalized block at height {}",
                    header.height
                ),
            });
        }

        let finalized_id = self.store.lookup_block_height(finalized_height)?;
        if header.parent_id != finalized_id {
            return Err(StateError::InvalidFinalization {
                reason: format!(
                    "parent of block at height {} is not the latest finalized block",
                    header.height
                ),
            });
        }

        let seal = self.store.lookup_seal_by_block(block_id)?;
        let sealed_height = self.store.retrieve_header(&seal.block_id)?.height;
        let parent_status = self.status_of(&header.parent_id)?;
        let status = self.status_of(block_id)?;

        let mut batch = EntityBatch::new();
        batch
            .index_height(header.height, *block_id)
            .set_finalized_height(header.height)
            .set_sealed_height(sealed_height);
        self.store.commit(batch)?;

        info!(
            block_id = %hex::encode(block_id),
            height = header.height,
            sealed_height,
            epoch = status.counter,
            "[protocol-state] Block finalized"
        );
        metrics::record_finalized(header.height, sealed_height);
        metrics::set_epoch(status.counter, status.phase().as_u8());

        self.distributor.block_finalized(&header);
        for event in phase_events(&parent_status, &status) {
            match event {
                EpochPhaseEvent::SetupPhaseStarted { counter } => {
                    info!(counter, height = header.height, "[protocol-state] Epoch setup phase started");
                    self.distributor.epoch_setup_phase_started(counter, &header);
                }
                EpochPhaseEvent::CommittedPhaseStarted { counter } => {
                    info!(counter, height = header.height, "[protocol-state] Epoch committed phase started");
                    self.distributor.epoch_committed_phase_started(counter, &header);
                }
                EpochPhaseEvent::Transition { counter } => {
                    info!(counter, height = header.height, "[protocol-state] Epoch transition");
                    self.distributor.epoch_transition(counter, &header);
                }
            }
        }
        Ok(())
    }

    fn mark_valid(&self, block_id: &Identifier) -> StateResult<()> {
        let header = self.header_of(block_id)?;
        if self.store.retrieve_block_validity(block_id)? {
            return Ok(());
        }
        let root_height = self.root_height()?;

        let mut batch = EntityBatch::new();
        batch.mark_valid(*block_id);
        self.store.commit(batch)?;
        debug!(height = header.height, "[protocol-state] Block marked valid");

        // The root is never announced as processable.
        if header.height > root_height + 1 {
            let parent = self.store.retrieve_header(&header.parent_id)?;
            self.distributor.block_processable(&parent);
        }
        Ok(())
    }
}

fn verify_root<'a>(
    root: &Block,
    result: &ExecutionResult,
    seal: &'a Seal,
    config: &ProtocolStateConfig,
) -> StateResult<(&'a EpochSetup, &'a EpochCommit)> {
    let fail = |reason: String| StateError::InvalidBootstrap { reason };
    let root_id = root.id();

    if let Some(chain_id) = &config.chain_id {
        if &root.header.chain_id != chain_id {
            return Err(fail(format!(
                "root chain id {} does not match {chain_id}",
                root.header.chain_id
            )));
        }
    }
    if root.header.payload_hash != root.payload.hash() {
        return Err(fail("root payload hash does not match payload".into()));
    }
    if !root.payload.is_empty() {
        return Err(fail("root payload must be empty".into()));
    }
    if result.block_id != root_id {
        return Err(fail("root result does not execute the root block".into()));
    }
    if seal.block_id != root_id {
        return Err(fail("root seal does not seal the root block".into()));
    }
    if seal.result_id != result.id() {
        return Err(fail("root seal does not reference the root result".into()));
    }
    if result.final_state_commitment() != Some(seal.final_state) {
        return Err(fail("root seal final state differs from the root result".into()));
    }
    if seal.service_events != result.service_events {
        return Err(fail("root seal service events differ from the root result".into()));
    }

    let (setup, commit) = match seal.service_events.as_slice() {
        [ServiceEvent::Setup(setup), ServiceEvent::Commit(commit)]
        | [ServiceEvent::Commit(commit), ServiceEvent::Setup(setup)] => (setup, commit),
        _ => {
            return Err(fail(
                "root seal must carry exactly one epoch setup and one epoch commit".into(),
            ))
        }
    };

    verify_setup_structure(setup).map_err(|e| fail(e.to_string()))?;
    if setup.final_view <= root.header.view {
        return Err(fail(format!(
            "final view {} must be greater than root view {}",
            setup.final_view, root.header.view
        )));
    }
    verify_commit(commit, setup).map_err(|e| fail(e.to_string()))?;
    Ok((setup, commit))
}
