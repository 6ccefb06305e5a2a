//! Receipt Validator Adapters
//!
//! - `AcceptAllReceiptValidator`: permissive, isolates extension logic in tests
//! - `StructuralReceiptValidator`: identity, signature and chunk checks
//!   against the entity store

use crate::domain::identity;
use crate::ports::outbound::{EntityStore, ReceiptError, ReceiptValidator, SignatureVerifier};
use shared_types::{ExecutionReceipt, Role, StorageError};
use std::sync::Arc;
use tracing::debug;

/// Accepts every receipt.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllReceiptValidator;

impl ReceiptValidator for AcceptAllReceiptValidator {
    fn validate(&self, _receipt: &ExecutionReceipt) -> Result<(), ReceiptError> {
        Ok(())
    }
}

/// Validates a receipt against the executed block and the epoch it belongs to.
///
/// Checks, in order:
/// 1. executed block is known
/// 2. executor is an execution participant with positive stake
/// 3. executor signature over the result id
/// 4. one chunk per collection plus the system chunk, indexed from 0, all
///    for the executed block
/// 5. previous result is known and executes the parent block
pub struct StructuralReceiptValidator<S: EntityStore, V: SignatureVerifier> {
    store: Arc<S>,
    verifier: V,
}

impl<S: EntityStore, V: SignatureVerifier> StructuralReceiptValidator<S, V> {
    pub fn new(store: Arc<S>, verifier: V) -> Self {
        Self { store, verifier }
    }
}

fn classify(err: StorageError, what: impl FnOnce() -> String) -> ReceiptError {
    match err {
        StorageError::NotFound(_) => ReceiptError::InvalidInput(what()),
        other => ReceiptError::Internal(other.to_string()),
    }
}

impl<S: EntityStore, V: SignatureVerifier> ReceiptValidator for StructuralReceiptValidator<S, V> {
    fn validate(&self, receipt: &ExecutionReceipt) -> Result<(), ReceiptError> {
        let result = &receipt.execution_result;
        let block_id = result.block_id;

        let header = self
            .store
            .retrieve_header(&block_id)
            .map_err(|e| classify(e, || format!("unknown block {}", hex::encode(block_id))))?;

        let status = self
            .store
            .retrieve_epoch_status(&block_id)
            .map_err(|e| ReceiptError::Internal(e.to_string()))?;
        let setup = self
            .store
            .retrieve_epoch_setup(&status.current.setup_id)
            .map_err(|e| ReceiptError::Internal(e.to_string()))?;

        let executor = identity::find(&setup.participants, &receipt.executor_id).ok_or_else(|| {
            ReceiptError::InvalidInput(format!("unknown executor {}", receipt.executor_id))
        })?;
        if executor.role != Role::Execution {
            return Err(ReceiptError::InvalidInput(format!(
                "executor {} has role {}",
                executor.node_id, executor.role
            )));
        }
        if executor.stake == 0 {
            return Err(ReceiptError::InvalidInput(format!(
                "executor {} has zero stake",
                executor.node_id
            )));
        }

        let result_id = result.id();
        if !self
            .verifier
            .verify(&result_id, &receipt.executor_signature, &executor.staking_key)
        {
            debug!(executor = %executor.node_id, "[protocol-state] Receipt signature rejected");
            return Err(ReceiptError::InvalidInput("invalid executor signature".into()));
        }

        let payload = self
            .store
            .retrieve_payload(&block_id)
            .map_err(|e| classify(e, || "payload of executed block unknown".into()))?;
        let expected_chunks = payload.guarantees.len() + 1;
        if result.chunks.len() != expected_chunks {
            return Err(ReceiptError::InvalidInput(format!(
                "expected {expected_chunks} chunks, got {}",
                result.chunks.len()
            )));
        }
        for (i, chunk) in result.chunks.iter().enumerate() {
            if chunk.index != i as u64 || chunk.collection_index != i as u32 {
                return Err(ReceiptError::InvalidInput(format!(
                    "chunk {i} has index {} and collection index {}",
                    chunk.index, chunk.collection_index
                )));
            }
            if chunk.block_id != block_id {
                return Err(ReceiptError::InvalidInput(format!(
                    "chunk {i} is for another block"
                )));
            }
        }

        let previous = self
            .store
            .retrieve_execution_result(&result.previous_result_id)
            .map_err(|e| classify(e, || "previous result unknown".into()))?;
        if previous.block_id != header.parent_id {
            return Err(ReceiptError::InvalidInput(
                "previous result does not execute the parent block".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::signature_verifier::Ed25519SignatureVerifier;
    use crate::test_utils::*;
    use crate::MutatorApi;
    use shared_types::NodeId;

    #[test]
    fn test_structural_checks() {
        let fixture = RootFixture::new();
        let state = fixture.bootstrapped_state();
        let block1 = child_of(&fixture.root.header);
        state.extend(&block1).unwrap();

        let validator =
            StructuralReceiptValidator::new(state.store().clone(), Ed25519SignatureVerifier);

        let good = receipt_for(&block1, &fixture.result, EXECUTOR);
        assert_eq!(validator.validate(&good), Ok(()));

        // Extra chunk breaks both the structure and the signature.
        let mut extra_chunk = good.clone();
        extra_chunk.execution_result.chunks.push(Default::default());
        assert!(matches!(
            validator.validate(&extra_chunk),
            Err(ReceiptError::InvalidInput(_))
        ));

        // Signed by a key that is not the executor's staking key.
        let mut forged = receipt_for(&block1, &fixture.result, 9);
        forged.executor_id = good.executor_id;
        assert!(matches!(
            validator.validate(&forged),
            Err(ReceiptError::InvalidInput(_))
        ));

        // Correctly signed, but by a verification node.
        let wrong_role = receipt_for(&block1, &fixture.result, VERIFIER);
        assert!(matches!(
            validator.validate(&wrong_role),
            Err(ReceiptError::InvalidInput(_))
        ));

        // Not a participant at all.
        let mut stranger = good.clone();
        stranger.executor_id = NodeId([0xAB; 32]);
        assert!(matches!(
            validator.validate(&stranger),
            Err(ReceiptError::InvalidInput(_))
        ));

        // Previous result must execute the parent block.
        let block2 = child_of(&block1.header);
        state.extend(&block2).unwrap();
        let skipping = receipt_for(&block2, &fixture.result, EXECUTOR);
        assert!(matches!(
            validator.validate(&skipping),
            Err(ReceiptError::InvalidInput(_))
        ));

        // Result for a block the store has never seen.
        let mut unknown = good;
        unknown.execution_result.block_id = [0xEE; 32];
        assert!(matches!(
            validator.validate(&unknown),
            Err(ReceiptError::InvalidInput(_))
        ));
    }
}
