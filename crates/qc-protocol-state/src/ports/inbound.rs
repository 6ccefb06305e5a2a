//! Driving Ports (API - Inbound)
//!
//! `MutatorApi` is the only way to change protocol state; callers serialize
//! its calls (single writer). `StateApi` may be used concurrently with the
//! writer and always answers from committed data.

use crate::error::StateResult;
use shared_types::{Block, ExecutionResult, Identifier, Seal};

/// Mutating entry points.
pub trait MutatorApi: Send + Sync {
    /// Initialize an empty store with the root block, its result and seal.
    fn bootstrap(&self, root: &Block, result: &ExecutionResult, seal: &Seal) -> StateResult<()>;

    /// Validate header and payload, then insert the block.
    fn extend(&self, candidate: &Block) -> StateResult<()>;

    /// Header-only validation for followers that cannot check payload contents yet.
    fn header_extend(&self, candidate: &Block) -> StateResult<()>;

    /// Finalize a block whose parent is the latest finalized block.
    fn finalize(&self, block_id: &Identifier) -> StateResult<()>;

    /// Record that a block passed validity checks.
    fn mark_valid(&self, block_id: &Identifier) -> StateResult<()>;
}

/// Read side.
pub trait StateApi: Send + Sync {
    type Snapshot;

    /// Snapshot at the latest finalized block.
    fn final_snapshot(&self) -> StateResult<Self::Snapshot>;

    /// Snapshot at the latest sealed block.
    fn sealed(&self) -> StateResult<Self::Snapshot>;

    fn at_block_id(&self, block_id: &Identifier) -> StateResult<Self::Snapshot>;

    /// Snapshot at the finalized block at `height`.
    fn at_height(&self, height: u64) -> StateResult<Self::Snapshot>;
}
