//! # Epoch Status
//!
//! Per-block record of the epoch a block belongs to and how far the next
//! epoch has progressed.
//!
//! ```text
//!   ┌─────────┐  setup sealed   ┌───────┐  commit sealed  ┌───────────┐
//!   │ STAKING │ ──────────────→ │ SETUP │ ──────────────→ │ COMMITTED │
//!   └─────────┘                 └───────┘                 └───────────┘
//!        ↑                                                      │
//!        └──────────── view > final_view (counter + 1) ─────────┘
//! ```
//!
//! Setup and commit events are referenced by content id, never by counter,
//! so two forks can carry different events for the same upcoming epoch.

use crate::domain::identity::{node_ids_with_role, validate_identities, IdentityError};
use serde::{Deserialize, Serialize};
use shared_types::{EpochCommit, EpochSetup, Identifier, NodeId, Role};
use std::collections::HashSet;
use thiserror::Error;

/// Phase of the current epoch as of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EpochPhase {
    Staking,
    Setup,
    Committed,
}

impl EpochPhase {
    /// Numeric encoding used for metrics.
    pub fn as_u8(self) -> u8 {
        match self {
            EpochPhase::Staking => 0,
            EpochPhase::Setup => 1,
            EpochPhase::Committed => 2,
        }
    }
}

/// Ids of a fully committed epoch's service events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochEventIds {
    pub setup_id: Identifier,
    pub commit_id: Identifier,
}

/// Next epoch as far as it has been sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEpoch {
    pub setup_id: Identifier,
    pub final_view: u64,
    pub commit_id: Option<Identifier>,
}

/// Epoch state as of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochStatus {
    /// First block of the current epoch (the root block for the bootstrap epoch).
    pub first_block_id: Identifier,
    pub counter: u64,
    /// Last view (inclusive) of the current epoch.
    pub final_view: u64,
    pub previous: Option<EpochEventIds>,
    pub current: EpochEventIds,
    pub next: Option<PendingEpoch>,
}

impl EpochStatus {
    /// Status of the bootstrap epoch.
    pub fn root(root_id: Identifier, setup: &EpochSetup, commit: &EpochCommit) -> Self {
        Self {
            first_block_id: root_id,
            counter: setup.counter,
            final_view: setup.final_view,
            previous: None,
            current: EpochEventIds {
                setup_id: setup.id(),
                commit_id: commit.id(),
            },
            next: None,
        }
    }

    pub fn phase(&self) -> EpochPhase {
        match &self.next {
            None => EpochPhase::Staking,
            Some(PendingEpoch {
                commit_id: None, ..
            }) => EpochPhase::Setup,
            Some(PendingEpoch {
                commit_id: Some(_),
                ..
            }) => EpochPhase::Committed,
        }
    }

    /// Whether a block at `view` lies beyond the current epoch.
    pub fn is_past_final_view(&self, view: u64) -> bool {
        view > self.final_view
    }
}

/// Reasons a service event is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceEventError {
    #[error("wrong epoch counter: expected {expected}, got {actual}")]
    WrongCounter { expected: u64, actual: u64 },

    #[error("final view {final_view} must be greater than {minimum}")]
    FinalViewTooLow { final_view: u64, minimum: u64 },

    #[error("invalid participants: {0}")]
    InvalidParticipants(#[from] IdentityError),

    #[error("invalid cluster assignment: {0}")]
    InvalidAssignment(String),

    #[error("empty random source")]
    EmptyRandomSource,

    #[error("epoch setup for counter {counter} already pending")]
    SetupAlreadyPending { counter: u64 },

    #[error("epoch commit without a pending epoch setup")]
    NoPendingSetup,

    #[error("next epoch already committed")]
    AlreadyCommitted,

    #[error("expected {expected} cluster QCs, got {actual}")]
    ClusterQcMismatch { expected: usize, actual: usize },

    #[error("missing DKG group key")]
    MissingGroupKey,

    #[error("DKG participants do not match the consensus participants")]
    DkgParticipantMismatch,
}

/// Checks on a setup event that do not depend on chain position.
pub fn verify_setup_structure(setup: &EpochSetup) -> Result<(), ServiceEventError> {
    validate_identities(&setup.participants)?;
    verify_assignments(setup)?;
    if setup.random_source.is_empty() {
        return Err(ServiceEventError::EmptyRandomSource);
    }
    Ok(())
}

/// Full check of a setup event sealed in a block at `block_view`.
pub fn verify_setup(
    setup: &EpochSetup,
    status: &EpochStatus,
    block_view: u64,
) -> Result<(), ServiceEventError> {
    if status.next.is_some() {
        return Err(ServiceEventError::SetupAlreadyPending {
            counter: status.counter + 1,
        });
    }
    let expected = status.counter + 1;
    if setup.counter != expected {
        return Err(ServiceEventError::WrongCounter {
            expected,
            actual: setup.counter,
        });
    }
    let minimum = block_view.max(status.final_view);
    if setup.final_view <= minimum {
        return Err(ServiceEventError::FinalViewTooLow {
            final_view: setup.final_view,
            minimum,
        });
    }
    verify_setup_structure(setup)
}

/// Check a commit event against the setup it closes.
pub fn verify_commit(commit: &EpochCommit, setup: &EpochSetup) -> Result<(), ServiceEventError> {
    if commit.counter != setup.counter {
        return Err(ServiceEventError::WrongCounter {
            expected: setup.counter,
            actual: commit.counter,
        });
    }
    if commit.cluster_qcs.len() != setup.assignments.len() {
        return Err(ServiceEventError::ClusterQcMismatch {
            expected: setup.assignments.len(),
            actual: commit.cluster_qcs.len(),
        });
    }
    if commit.dkg_group_key.is_none() {
        return Err(ServiceEventError::MissingGroupKey);
    }
    let consensus: HashSet<NodeId> = node_ids_with_role(&setup.participants, Role::Consensus)
        .into_iter()
        .collect();
    let dkg: HashSet<NodeId> = commit.dkg_participants.keys().copied().collect();
    if consensus != dkg {
        return Err(ServiceEventError::DkgParticipantMismatch);
    }
    Ok(())
}

/// Every collector in exactly one non-empty cluster, nobody else assigned.
fn verify_assignments(setup: &EpochSetup) -> Result<(), ServiceEventError> {
    let collectors: HashSet<NodeId> = node_ids_with_role(&setup.participants, Role::Collection)
        .into_iter()
        .collect();
    let mut assigned = HashSet::with_capacity(collectors.len());

    for (index, cluster) in setup.assignments.iter().enumerate() {
        if cluster.is_empty() {
            return Err(ServiceEventError::InvalidAssignment(format!(
                "cluster {index} is empty"
            )));
        }
        for node_id in cluster {
            if !collectors.contains(node_id) {
                return Err(ServiceEventError::InvalidAssignment(format!(
                    "{node_id} is not a collection participant"
                )));
            }
            if !assigned.insert(*node_id) {
                return Err(ServiceEventError::InvalidAssignment(format!(
                    "{node_id} assigned more than once"
                )));
            }
        }
    }

    if assigned.len() != collectors.len() {
        return Err(ServiceEventError::InvalidAssignment(format!(
            "{} of {} collectors unassigned",
            collectors.len() - assigned.len(),
            collectors.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{commit_for, participants, setup_fixture};

    fn root_status() -> EpochStatus {
        let setup = setup_fixture(1, 100, participants());
        let commit = commit_for(&setup);
        EpochStatus::root([0xAA; 32], &setup, &commit)
    }

    #[test]
    fn test_phase_follows_pending_epoch() {
        let mut status = root_status();
        assert_eq!(status.phase(), EpochPhase::Staking);

        status.next = Some(PendingEpoch {
            setup_id: [1; 32],
            final_view: 200,
            commit_id: None,
        });
        assert_eq!(status.phase(), EpochPhase::Setup);

        if let Some(next) = status.next.as_mut() {
            next.commit_id = Some([2; 32]);
        }
        assert_eq!(status.phase(), EpochPhase::Committed);
    }

    #[test]
    fn test_final_view_is_inclusive() {
        let status = root_status();
        assert!(!status.is_past_final_view(100));
        assert!(status.is_past_final_view(101));
    }

    #[test]
    fn test_setup_counter_must_increment() {
        let setup = setup_fixture(3, 500, participants());
        assert_eq!(
            verify_setup(&setup, &root_status(), 10),
            Err(ServiceEventError::WrongCounter {
                expected: 2,
                actual: 3
            })
        );
    }

    #[test]
    fn test_setup_final_view_bounds() {
        let status = root_status();
        // Below the current epoch's final view.
        let setup = setup_fixture(2, 90, participants());
        assert!(matches!(
            verify_setup(&setup, &status, 10),
            Err(ServiceEventError::FinalViewTooLow { minimum: 100, .. })
        ));
        // Not above the sealing block's view.
        let setup = setup_fixture(2, 150, participants());
        assert!(matches!(
            verify_setup(&setup, &status, 150),
            Err(ServiceEventError::FinalViewTooLow { minimum: 150, .. })
        ));
        assert_eq!(verify_setup(&setup, &status, 149), Ok(()));
    }

    #[test]
    fn test_setup_rejects_bad_assignments() {
        let mut setup = setup_fixture(2, 500, participants());
        setup.assignments.push(Vec::new());
        assert!(matches!(
            verify_setup_structure(&setup),
            Err(ServiceEventError::InvalidAssignment(_))
        ));

        let mut setup = setup_fixture(2, 500, participants());
        let collector = setup.assignments[0][0];
        setup.assignments.push(vec![collector]);
        assert!(matches!(
            verify_setup_structure(&setup),
            Err(ServiceEventError::InvalidAssignment(_))
        ));

        let mut setup = setup_fixture(2, 500, participants());
        setup.assignments.clear();
        assert!(matches!(
            verify_setup_structure(&setup),
            Err(ServiceEventError::InvalidAssignment(_))
        ));
    }

    #[test]
    fn test_setup_rejects_empty_random_source() {
        let mut setup = setup_fixture(2, 500, participants());
        setup.random_source.clear();
        assert_eq!(
            verify_setup_structure(&setup),
            Err(ServiceEventError::EmptyRandomSource)
        );
    }

    #[test]
    fn test_commit_consistency() {
        let setup = setup_fixture(2, 500, participants());
        assert_eq!(verify_commit(&commit_for(&setup), &setup), Ok(()));

        let mut commit = commit_for(&setup);
        commit.counter = 3;
        assert!(matches!(
            verify_commit(&commit, &setup),
            Err(ServiceEventError::WrongCounter { .. })
        ));

        let mut commit = commit_for(&setup);
        commit.cluster_qcs.push(Default::default());
        assert!(matches!(
            verify_commit(&commit, &setup),
            Err(ServiceEventError::ClusterQcMismatch { .. })
        ));

        let mut commit = commit_for(&setup);
        commit.dkg_group_key = None;
        assert_eq!(
            verify_commit(&commit, &setup),
            Err(ServiceEventError::MissingGroupKey)
        );

        let mut commit = commit_for(&setup);
        commit.dkg_participants.pop_first();
        assert_eq!(
            verify_commit(&commit, &setup),
            Err(ServiceEventError::DkgParticipantMismatch)
        );
    }
}
