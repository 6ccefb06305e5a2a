//! # Extension Checks
//!
//! Validates a candidate block against its fork and builds the batch that
//! inserts it. Nothing is written unless every check passes.
//!
//! | Step | Extend | HeaderExtend |
//! |------|--------|--------------|
//! | chain id, parent, height, view | yes | yes |
//! | conflicts with finalized history | yes | yes |
//! | payload hash | yes | - |
//! | guarantees | yes | - |
//! | receipts + receipt validator | yes | - |
//! | seal chain by block linkage | yes | yes |
//! | sealed results incorporated, final state | yes | - |
//! | epoch status derivation | yes | yes |
//!
//! A block already inserted by `HeaderExtend` is not final: a later `Extend`
//! runs the full checks on its stored payload and records that it passed.

use super::*;
use crate::domain::seal_chain::{self, SealChainInput};
use crate::domain::transition::{derive_status, ChildBlock, TransitionError};
use crate::metrics;
use crate::ports::outbound::{EntityBatch, ProtocolConsumer, ReceiptError};
use shared_types::{Block, ExecutionResult};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExtendMode {
    Full,
    HeaderOnly,
}

impl ExtendMode {
    fn label(self) -> &'static str {
        match self {
            ExtendMode::Full => "full",
            ExtendMode::HeaderOnly => "header",
        }
    }
}

/// One ancestor of the candidate.
struct ForkBlock {
    id: Identifier,
    header: Header,
}

impl<S: EntityStore, R: ReceiptValidator> ProtocolState<S, R> {
    pub(crate) fn insert_block(&self, candidate: &Block, mode: ExtendMode) -> StateResult<()> {
        let outcome = self.try_insert(candidate, mode);
        match &outcome {
            Ok(()) => metrics::record_extension_accepted(mode.label()),
            Err(err) => {
                debug!(
                    height = candidate.header.height,
                    view = candidate.header.view,
                    error = %err,
                    "[protocol-state] Extension rejected"
                );
                metrics::record_extension_rejected(rejection_label(err));
            }
        }
        outcome
    }

    fn try_insert(&self, candidate: &Block, mode: ExtendMode) -> StateResult<()> {
        let block_id = candidate.header.id();
        if !self.store.header_exists(&block_id)? {
            return self.validate_and_insert(candidate, mode);
        }
        if mode == ExtendMode::HeaderOnly || self.store.retrieve_payload_validated(&block_id)? {
            debug!(block_id = %hex::encode(block_id), "[protocol-state] Block already known");
            return Ok(());
        }

        // Inserted by HeaderExtend: the stored payload still needs the full checks.
        debug!(
            block_id = %hex::encode(block_id),
            "[protocol-state] Validating payload of header-only block"
        );
        let stored = Block {
            header: candidate.header.clone(),
            payload: self.store.retrieve_payload(&block_id)?,
        };
        self.validate_and_insert(&stored, mode)
    }

    fn validate_and_insert(&self, candidate: &Block, mode: ExtendMode) -> StateResult<()> {
        let header = &candidate.header;
        let block_id = header.id();
        let root_height = self.root_height()?;

        let chain_id = self.expected_chain_id(root_height)?;
        if header.chain_id != chain_id {
            return Err(StateError::invalid(format!(
                "chain id {} does not match {chain_id}",
                header.chain_id
            )));
        }

        if !self.store.header_exists(&header.parent_id)? {
            return Err(StateError::missing_parent(&header.parent_id, header.height));
        }
        let parent = self.store.retrieve_header(&header.parent_id)?;

        if header.height != parent.height + 1 {
            return Err(StateError::invalid(format!(
                "height {} does not follow parent height {}",
                header.height, parent.height
            )));
        }
        if header.view <= parent.view {
            return Err(StateError::invalid(format!(
                "view {} does not exceed parent view {}",
                header.view, parent.view
            )));
        }

        let finalized_height = self.finalized_height()?;
        if header.height <= finalized_height {
            return Err(StateError::outdated(format!(
                "height {} is already finalized",
                header.height
            )));
        }

        let last_sealed = self.store.lookup_seal_by_block(&header.parent_id)?;
        let sealed_height = self.store.retrieve_header(&last_sealed.block_id)?.height;
        let guarantee_floor = header.height.saturating_sub(self.config.guarantee_expiry);

        let mut floor = finalized_height.min(sealed_height + 1);
        if mode == ExtendMode::Full {
            floor = floor.min(guarantee_floor);
        }
        let fork = self.fork_of(header.parent_id, parent, floor.max(root_height), root_height)?;

        let finalized_id = self.store.lookup_block_height(finalized_height)?;
        let finalized_on_fork = fork
            .iter()
            .find(|block| block.header.height == finalized_height)
            .map(|block| block.id);
        if finalized_on_fork != Some(finalized_id) {
            return Err(StateError::outdated(format!(
                "fork does not include the finalized block at height {finalized_height}"
            )));
        }

        // Ascending, ending at the parent.
        let unsealed: Vec<&ForkBlock> = fork
            .iter()
            .rev()
            .filter(|block| block.header.height > sealed_height)
            .collect();

        let incorporated = match mode {
            ExtendMode::Full => {
                if header.payload_hash != candidate.payload.hash() {
                    return Err(StateError::invalid("payload hash does not match payload"));
                }
                self.check_guarantees(candidate, &fork, guarantee_floor)?;
                self.check_receipts(candidate, &unsealed)?
            }
            ExtendMode::HeaderOnly => HashMap::new(),
        };

        let seals = &candidate.payload.seals;
        if seals.len() > self.config.max_seals_per_payload {
            return Err(StateError::invalid(format!(
                "{} seals exceed the limit of {}",
                seals.len(),
                self.config.max_seals_per_payload
            )));
        }
        let unsealed_ids: Vec<Identifier> = unsealed.iter().map(|block| block.id).collect();
        let chain = seal_chain::resolve(SealChainInput {
            seals,
            unsealed: &unsealed_ids,
            incorporated: (mode == ExtendMode::Full).then_some(&incorporated),
        })
        .map_err(|e| StateError::invalid(e.to_string()))?;

        let parent_status = self.status_of(&header.parent_id)?;
        let events = chain
            .ordered
            .iter()
            .flat_map(|seal| seal.service_events.iter());
        let transition = derive_status(
            &parent_status,
            ChildBlock {
                id: block_id,
                view: header.view,
            },
            events,
            &StoredEvents(self.store.as_ref()),
        )
        .map_err(|e| self.transition_error(e, header))?;

        let mut batch = EntityBatch::new();
        batch
            .insert_header(header)
            .insert_payload(block_id, &candidate.payload);
        for receipt in &candidate.payload.receipts {
            batch.insert_result(&receipt.execution_result);
        }
        for seal in &chain.ordered {
            batch.insert_seal(seal);
        }
        let seal_id = chain.tip().map_or_else(|| last_sealed.id(), |tip| tip.id());
        batch.index_seal(block_id, seal_id);
        for setup in &transition.setups {
            batch.insert_epoch_setup(setup);
        }
        for commit in &transition.commits {
            batch.insert_epoch_commit(commit);
        }
        batch.insert_epoch_status(block_id, &transition.status);
        if mode == ExtendMode::Full {
            batch.mark_payload_validated(block_id);
        }
        self.store.commit(batch)?;

        debug!(
            block_id = %hex::encode(block_id),
            height = header.height,
            view = header.view,
            seals = chain.ordered.len(),
            phase = ?transition.status.phase(),
            "[protocol-state] Block inserted"
        );
        self.statuses.lock().put(block_id, transition.status);
        Ok(())
    }

    fn expected_chain_id(&self, root_height: u64) -> StateResult<String> {
        if let Some(chain_id) = &self.config.chain_id {
            return Ok(chain_id.clone());
        }
        let root_id = self.store.lookup_block_height(root_height)?;
        Ok(self.store.retrieve_header(&root_id)?.chain_id)
    }

    /// Ancestors from the parent down to `floor`, descending.
    fn fork_of(
        &self,
        parent_id: Identifier,
        parent: Header,
        floor: u64,
        root_height: u64,
    ) -> StateResult<Vec<ForkBlock>> {
        let mut fork = Vec::new();
        let mut id = parent_id;
        let mut header = parent;
        loop {
            let height = header.height;
            let next = header.parent_id;
            fork.push(ForkBlock { id, header });
            if height <= floor || height <= root_height {
                break;
            }
            id = next;
            header = self.store.retrieve_header(&id)?;
        }
        Ok(fork)
    }

    fn check_guarantees(
        &self,
        candidate: &Block,
        fork: &[ForkBlock],
        floor: u64,
    ) -> StateResult<()> {
        let guarantees = &candidate.payload.guarantees;
        if guarantees.is_empty() {
            return Ok(());
        }

        let mut included = HashSet::new();
        for block in fork.iter().filter(|block| block.header.height >= floor) {
            let payload = self.store.retrieve_payload(&block.id)?;
            included.extend(payload.guarantees.iter().map(|g| g.collection_id));
        }

        let mut in_payload = HashSet::with_capacity(guarantees.len());
        for guarantee in guarantees {
            let collection = hex::encode(guarantee.collection_id);
            if !in_payload.insert(guarantee.collection_id) {
                return Err(StateError::invalid(format!(
                    "duplicate guarantee for collection {collection}"
                )));
            }
            if included.contains(&guarantee.collection_id) {
                return Err(StateError::invalid(format!(
                    "collection {collection} already guaranteed on this fork"
                )));
            }
            let reference = match self.store.retrieve_header(&guarantee.reference_block_id) {
                Ok(reference) => reference,
                Err(StorageError::NotFound(_)) => {
                    return Err(StateError::invalid(format!(
                        "guarantee for collection {collection} references an unknown block"
                    )))
                }
                Err(e) => return Err(e.into()),
            };
            if reference.height < floor {
                return Err(StateError::invalid(format!(
                    "guarantee for collection {collection} expired at height {}",
                    reference.height + self.config.guarantee_expiry
                )));
            }
        }
        Ok(())
    }

    /// Checks the payload's receipts and returns the results incorporated on
    /// the fork above its latest sealed block.
    fn check_receipts(
        &self,
        candidate: &Block,
        unsealed: &[&ForkBlock],
    ) -> StateResult<HashMap<Identifier, ExecutionResult>> {
        let heights: HashMap<Identifier, u64> = unsealed
            .iter()
            .map(|block| (block.id, block.header.height))
            .collect();

        let mut incorporated = HashMap::new();
        let mut seen = HashSet::new();
        for block in unsealed {
            let payload = self.store.retrieve_payload(&block.id)?;
            for receipt in payload.receipts {
                seen.insert(receipt.dedup_key());
                let result = receipt.execution_result;
                incorporated.insert(result.id(), result);
            }
        }

        let mut previous_height: Option<u64> = None;
        for receipt in &candidate.payload.receipts {
            let receipt_id = hex::encode(receipt.id());
            let executed = receipt.execution_result.block_id;
            let Some(&height) = heights.get(&executed) else {
                return Err(StateError::invalid(format!(
                    "receipt {receipt_id} is for block {} which is not unsealed on this fork",
                    hex::encode(executed)
                )));
            };
            if previous_height.is_some_and(|previous| previous >= height) {
                return Err(StateError::invalid(
                    "receipts are not sorted by executed block height",
                ));
            }
            previous_height = Some(height);

            if !seen.insert(receipt.dedup_key()) {
                return Err(StateError::invalid(format!(
                    "duplicate receipt {receipt_id} on this fork"
                )));
            }

            self.validator.validate(receipt).map_err(|e| match e {
                ReceiptError::InvalidInput(_) => StateError::InvalidReceipt {
                    receipt_id,
                    source: e,
                },
                ReceiptError::Internal(_) => StateError::ReceiptValidator(e),
            })?;
        }

        Ok(incorporated)
    }

    fn transition_error(&self, err: TransitionError, header: &Header) -> StateError {
        match err {
            TransitionError::EpochHalt {
                counter,
                final_view,
                view,
            } => {
                error!(
                    counter,
                    final_view,
                    view,
                    height = header.height,
                    "[protocol-state] Epoch halt: final view passed without a committed next epoch"
                );
                let err = StateError::EpochHalt {
                    counter,
                    final_view,
                    view,
                };
                self.distributor.critical(&err.to_string());
                err
            }
            TransitionError::InvalidServiceEvent(e) => StateError::invalid(e.to_string()),
            TransitionError::Storage(e) => e.into(),
        }
    }
}
