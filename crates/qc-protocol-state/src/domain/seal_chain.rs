//! # Seal Chain Resolution
//!
//! Orders the seals of one payload into the single contiguous chain that
//! extends the fork's latest sealed block.
//!
//! ```text
//!  last sealed      unsealed fork (ascending)
//!      S ──→ U1 ──→ U2 ──→ U3 ──→ parent ──→ candidate
//!            ↑      ↑
//!          seal   seal        (payload order irrelevant)
//! ```
//!
//! Walks the unsealed blocks in height order, consuming the seal for each
//! block until one is missing. Seals left over are not connected and the
//! payload is rejected as a whole.

use shared_types::{ExecutionResult, Identifier, Seal};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SealChainError {
    #[error("duplicate seal for block {0}")]
    DuplicateBlock(String),

    #[error("duplicate seal for result {0}")]
    DuplicateResult(String),

    #[error("seal for block {0} does not extend the sealed chain of this fork")]
    NotConnected(String),

    #[error("sealed result {0} is not incorporated on this fork")]
    NotIncorporated(String),

    #[error("sealed result {result_id} executes block {actual}, seal is for {expected}")]
    ResultBlockMismatch {
        result_id: String,
        expected: String,
        actual: String,
    },

    #[error("seal final state differs from result {0}")]
    FinalStateMismatch(String),

    #[error("seal service events differ from result {0}")]
    ServiceEventMismatch(String),
}

/// Inputs for resolving one payload's seals.
pub struct SealChainInput<'a> {
    pub seals: &'a [Seal],
    /// Fork blocks above the latest sealed block, ascending, ending at the parent.
    pub unsealed: &'a [Identifier],
    /// Results incorporated on the fork. `None` checks block linkage only.
    pub incorporated: Option<&'a HashMap<Identifier, ExecutionResult>>,
}

/// The payload's seals in chain order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealChain<'a> {
    pub ordered: Vec<&'a Seal>,
}

impl<'a> SealChain<'a> {
    /// Seal of the highest block sealed by the payload.
    pub fn tip(&self) -> Option<&'a Seal> {
        self.ordered.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

pub fn resolve<'a>(input: SealChainInput<'a>) -> Result<SealChain<'a>, SealChainError> {
    let mut by_block: HashMap<Identifier, &'a Seal> = HashMap::with_capacity(input.seals.len());
    let mut results = HashSet::with_capacity(input.seals.len());

    for seal in input.seals {
        if by_block.insert(seal.block_id, seal).is_some() {
            return Err(SealChainError::DuplicateBlock(hex::encode(seal.block_id)));
        }
        if !results.insert(seal.result_id) {
            return Err(SealChainError::DuplicateResult(hex::encode(seal.result_id)));
        }
    }

    let mut ordered = Vec::with_capacity(by_block.len());
    for block_id in input.unsealed {
        let Some(seal) = by_block.remove(block_id) else {
            break;
        };
        if let Some(incorporated) = input.incorporated {
            verify_result(seal, incorporated)?;
        }
        ordered.push(seal);
    }

    if let Some(seal) = input
        .seals
        .iter()
        .find(|seal| by_block.contains_key(&seal.block_id))
    {
        return Err(SealChainError::NotConnected(hex::encode(seal.block_id)));
    }

    Ok(SealChain { ordered })
}

fn verify_result(
    seal: &Seal,
    incorporated: &HashMap<Identifier, ExecutionResult>,
) -> Result<(), SealChainError> {
    let result = incorporated
        .get(&seal.result_id)
        .ok_or_else(|| SealChainError::NotIncorporated(hex::encode(seal.result_id)))?;
    if result.block_id != seal.block_id {
        return Err(SealChainError::ResultBlockMismatch {
            result_id: hex::encode(seal.result_id),
            expected: hex::encode(seal.block_id),
            actual: hex::encode(result.block_id),
        });
    }
    if result.final_state_commitment() != Some(seal.final_state) {
        return Err(SealChainError::FinalStateMismatch(hex::encode(
            seal.result_id,
        )));
    }
    if result.service_events != seal.service_events {
        return Err(SealChainError::ServiceEventMismatch(hex::encode(
            seal.result_id,
        )));
    }
    Ok(())
}
