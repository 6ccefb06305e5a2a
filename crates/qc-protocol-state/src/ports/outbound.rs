//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the protocol state requires from its host:
//!
//! - `KeyValueStore`: ordered byte store with atomic batches
//! - `EntityStore`: typed entity access layered on a key-value store
//! - `ReceiptValidator`: integrity checks for included receipts
//! - `SignatureVerifier`: staking-key signature checks
//! - `ProtocolConsumer`: receivers of finalization and epoch notifications

use crate::domain::epoch::EpochStatus;
use shared_types::{
    EpochCommit, EpochSetup, ExecutionReceipt, ExecutionResult, Header, Identifier, Payload,
    PublicKey, Seal, Signature, StorageError,
};
use thiserror::Error;

// =============================================================================
// STORAGE
// =============================================================================

/// Abstract interface for key-value database operations.
///
/// Testing and embedding: `InMemoryKVStore` (adapters/memory.rs).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch are applied, or NONE are.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StorageError>;

    fn exists(&self, key: &[u8]) -> Result<bool, StorageError>;

    /// All pairs whose key starts with `prefix`, in key order.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// One typed write inside an `EntityBatch`.
#[derive(Debug, Clone)]
pub enum EntityWrite {
    Header(Header),
    Payload { block_id: Identifier, payload: Payload },
    Seal(Seal),
    /// Latest seal on the fork ending at `block_id`.
    SealIndex { block_id: Identifier, seal_id: Identifier },
    Result(ExecutionResult),
    EpochSetup(EpochSetup),
    EpochCommit(EpochCommit),
    EpochStatus { block_id: Identifier, status: EpochStatus },
    /// Finalized block at `height`; strict, never overwritten.
    HeightIndex { height: u64, block_id: Identifier },
    FinalizedHeight(u64),
    SealedHeight(u64),
    RootHeight(u64),
    Validity { block_id: Identifier },
    /// The block's payload passed the full extension checks.
    PayloadValidated { block_id: Identifier },
}

/// Writes applied together by `EntityStore::commit`.
#[derive(Debug, Clone, Default)]
pub struct EntityBatch {
    writes: Vec<EntityWrite>,
}

impl EntityBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: EntityWrite) -> &mut Self {
        self.writes.push(write);
        self
    }

    pub fn insert_header(&mut self, header: &Header) -> &mut Self {
        self.push(EntityWrite::Header(header.clone()))
    }

    pub fn insert_payload(&mut self, block_id: Identifier, payload: &Payload) -> &mut Self {
        self.push(EntityWrite::Payload {
            block_id,
            payload: payload.clone(),
        })
    }

    pub fn insert_seal(&mut self, seal: &Seal) -> &mut Self {
        self.push(EntityWrite::Seal(seal.clone()))
    }

    pub fn index_seal(&mut self, block_id: Identifier, seal_id: Identifier) -> &mut Self {
        self.push(EntityWrite::SealIndex { block_id, seal_id })
    }

    pub fn insert_result(&mut self, result: &ExecutionResult) -> &mut Self {
        self.push(EntityWrite::Result(result.clone()))
    }

    pub fn insert_epoch_setup(&mut self, setup: &EpochSetup) -> &mut Self {
        self.push(EntityWrite::EpochSetup(setup.clone()))
    }

    pub fn insert_epoch_commit(&mut self, commit: &EpochCommit) -> &mut Self {
        self.push(EntityWrite::EpochCommit(commit.clone()))
    }

    pub fn insert_epoch_status(&mut self, block_id: Identifier, status: &EpochStatus) -> &mut Self {
        self.push(EntityWrite::EpochStatus {
            block_id,
            status: status.clone(),
        })
    }

    pub fn index_height(&mut self, height: u64, block_id: Identifier) -> &mut Self {
        self.push(EntityWrite::HeightIndex { height, block_id })
    }

    pub fn set_finalized_height(&mut self, height: u64) -> &mut Self {
        self.push(EntityWrite::FinalizedHeight(height))
    }

    pub fn set_sealed_height(&mut self, height: u64) -> &mut Self {
        self.push(EntityWrite::SealedHeight(height))
    }

    pub fn set_root_height(&mut self, height: u64) -> &mut Self {
        self.push(EntityWrite::RootHeight(height))
    }

    pub fn mark_valid(&mut self, block_id: Identifier) -> &mut Self {
        self.push(EntityWrite::Validity { block_id })
    }

    pub fn mark_payload_validated(&mut self, block_id: Identifier) -> &mut Self {
        self.push(EntityWrite::PayloadValidated { block_id })
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_writes(self) -> Vec<EntityWrite> {
        self.writes
    }
}

/// Typed access to protocol entities.
///
/// Reads observe only fully committed batches. Missing entities are
/// `StorageError::NotFound`.
pub trait EntityStore: Send + Sync {
    fn retrieve_header(&self, block_id: &Identifier) -> Result<Header, StorageError>;

    fn header_exists(&self, block_id: &Identifier) -> Result<bool, StorageError>;

    fn retrieve_payload(&self, block_id: &Identifier) -> Result<Payload, StorageError>;

    fn retrieve_seal(&self, seal_id: &Identifier) -> Result<Seal, StorageError>;

    /// Latest seal on the fork ending at `block_id`.
    fn lookup_seal_by_block(&self, block_id: &Identifier) -> Result<Seal, StorageError>;

    fn retrieve_execution_result(&self, result_id: &Identifier)
        -> Result<ExecutionResult, StorageError>;

    /// Finalized block at `height`.
    fn lookup_block_height(&self, height: u64) -> Result<Identifier, StorageError>;

    fn retrieve_epoch_setup(&self, setup_id: &Identifier) -> Result<EpochSetup, StorageError>;

    fn retrieve_epoch_commit(&self, commit_id: &Identifier) -> Result<EpochCommit, StorageError>;

    fn retrieve_epoch_status(&self, block_id: &Identifier) -> Result<EpochStatus, StorageError>;

    fn retrieve_block_validity(&self, block_id: &Identifier) -> Result<bool, StorageError>;

    /// Whether the block was inserted by `Extend` rather than `HeaderExtend` only.
    fn retrieve_payload_validated(&self, block_id: &Identifier) -> Result<bool, StorageError>;

    fn retrieve_finalized_height(&self) -> Result<u64, StorageError>;

    fn retrieve_sealed_height(&self) -> Result<u64, StorageError>;

    fn retrieve_root_height(&self) -> Result<u64, StorageError>;

    /// Apply every write in `batch`, or none of them.
    fn commit(&self, batch: EntityBatch) -> Result<(), StorageError>;
}

// =============================================================================
// VALIDATION COLLABORATORS
// =============================================================================

/// Classification of a receipt validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiptError {
    /// The receipt itself is invalid; the including block is invalid.
    #[error("invalid receipt: {0}")]
    InvalidInput(String),

    /// The validator could not reach a verdict.
    #[error("receipt validation failed internally: {0}")]
    Internal(String),
}

/// Integrity checks for execution receipts included in a payload.
///
/// Called synchronously once per newly included receipt; must not block on
/// network I/O.
pub trait ReceiptValidator: Send + Sync {
    fn validate(&self, receipt: &ExecutionReceipt) -> Result<(), ReceiptError>;
}

/// Staking-key signature verification.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool;
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Receiver of protocol notifications.
///
/// Called synchronously on the finalizing thread, in order. Implementations
/// must return quickly; failures stay inside the consumer.
pub trait ProtocolConsumer: Send + Sync {
    fn block_finalized(&self, header: &Header);

    fn block_processable(&self, header: &Header);

    fn epoch_setup_phase_started(&self, counter: u64, header: &Header);

    fn epoch_committed_phase_started(&self, counter: u64, header: &Header);

    fn epoch_transition(&self, counter: u64, header: &Header);

    /// A chain-halting condition was detected.
    fn critical(&self, _reason: &str) {}
}
