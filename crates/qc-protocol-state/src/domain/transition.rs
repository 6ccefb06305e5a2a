//! Epoch status derivation.
//!
//! A child's status is a pure function of its parent's status, its view and
//! the service events sealed by its payload. Order of application:
//!
//! 1. Rollover when `view > final_view` (requires a committed next epoch).
//! 2. Each sealed service event, in seal-chain order.

use crate::domain::epoch::{
    verify_commit, verify_setup, EpochEventIds, EpochPhase, EpochStatus, PendingEpoch,
    ServiceEventError,
};
use shared_types::{EpochCommit, EpochSetup, Identifier, ServiceEvent, StorageError};
use thiserror::Error;

/// Read access to previously stored setup events.
pub trait EpochEventSource {
    fn epoch_setup(&self, setup_id: &Identifier) -> Result<EpochSetup, StorageError>;
}

/// Position of the block whose status is being derived.
#[derive(Debug, Clone, Copy)]
pub struct ChildBlock {
    pub id: Identifier,
    pub view: u64,
}

/// Derived status plus the events first seen in this block.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub status: EpochStatus,
    pub setups: Vec<EpochSetup>,
    pub commits: Vec<EpochCommit>,
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("epoch {counter} ended at view {final_view}, view {view} has no committed next epoch")]
    EpochHalt {
        counter: u64,
        final_view: u64,
        view: u64,
    },

    #[error("invalid service event: {0}")]
    InvalidServiceEvent(#[from] ServiceEventError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub fn derive_status<'a, E>(
    parent: &EpochStatus,
    block: ChildBlock,
    events: impl IntoIterator<Item = &'a ServiceEvent>,
    source: &E,
) -> Result<StatusTransition, TransitionError>
where
    E: EpochEventSource + ?Sized,
{
    let mut status = if parent.is_past_final_view(block.view) {
        rollover(parent, block)?
    } else {
        parent.clone()
    };

    let mut setups = Vec::new();
    let mut commits = Vec::new();

    for event in events {
        match event {
            ServiceEvent::Setup(setup) => {
                verify_setup(setup, &status, block.view)?;
                status.next = Some(PendingEpoch {
                    setup_id: setup.id(),
                    final_view: setup.final_view,
                    commit_id: None,
                });
                setups.push(setup.clone());
            }
            ServiceEvent::Commit(commit) => {
                let pending = status.next.ok_or(ServiceEventError::NoPendingSetup)?;
                if pending.commit_id.is_some() {
                    return Err(ServiceEventError::AlreadyCommitted.into());
                }
                // The setup may have been sealed earlier in this same payload.
                let setup = match setups.iter().find(|s| s.id() == pending.setup_id) {
                    Some(setup) => setup.clone(),
                    None => source.epoch_setup(&pending.setup_id)?,
                };
                verify_commit(commit, &setup)?;
                status.next = Some(PendingEpoch {
                    commit_id: Some(commit.id()),
                    ..pending
                });
                commits.push(commit.clone());
            }
        }
    }

    Ok(StatusTransition {
        status,
        setups,
        commits,
    })
}

fn rollover(parent: &EpochStatus, block: ChildBlock) -> Result<EpochStatus, TransitionError> {
    match parent.next {
        Some(PendingEpoch {
            setup_id,
            final_view,
            commit_id: Some(commit_id),
        }) => Ok(EpochStatus {
            first_block_id: block.id,
            counter: parent.counter + 1,
            final_view,
            previous: Some(parent.current),
            current: EpochEventIds {
                setup_id,
                commit_id,
            },
            next: None,
        }),
        _ => Err(TransitionError::EpochHalt {
            counter: parent.counter,
            final_view: parent.final_view,
            view: block.view,
        }),
    }
}

/// Notification owed when a block with status `child` is finalized on top of `parent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochPhaseEvent {
    SetupPhaseStarted { counter: u64 },
    CommittedPhaseStarted { counter: u64 },
    Transition { counter: u64 },
}

pub fn phase_events(parent: &EpochStatus, child: &EpochStatus) -> Vec<EpochPhaseEvent> {
    let mut events = Vec::new();

    let base = if child.counter > parent.counter {
        events.push(EpochPhaseEvent::Transition {
            counter: child.counter,
        });
        EpochPhase::Staking
    } else {
        parent.phase()
    };

    let phase = child.phase();
    if base == EpochPhase::Staking && phase >= EpochPhase::Setup {
        events.push(EpochPhaseEvent::SetupPhaseStarted {
            counter: child.counter,
        });
    }
    if base < EpochPhase::Committed && phase == EpochPhase::Committed {
        events.push(EpochPhaseEvent::CommittedPhaseStarted {
            counter: child.counter,
        });
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{commit_for, participants, setup_fixture};
    use std::collections::HashMap;

    #[derive(Default)]
    struct Setups(HashMap<Identifier, EpochSetup>);

    impl EpochEventSource for Setups {
        fn epoch_setup(&self, setup_id: &Identifier) -> Result<EpochSetup, StorageError> {
            self.0
                .get(setup_id)
                .cloned()
                .ok_or_else(|| StorageError::NotFound("setup".into()))
        }
    }

    fn root() -> EpochStatus {
        let setup = setup_fixture(1, 100, participants());
        EpochStatus::root([0; 32], &setup, &commit_for(&setup))
    }

    fn child(view: u64) -> ChildBlock {
        ChildBlock {
            id: [view as u8; 32],
            view,
        }
    }

    #[test]
    fn test_no_events_keeps_status() {
        let parent = root();
        let derived = derive_status(&parent, child(5), [], &Setups::default()).unwrap();
        assert_eq!(derived.status, parent);
        assert!(derived.setups.is_empty());
    }

    #[test]
    fn test_setup_then_commit_across_blocks() {
        let parent = root();
        let setup = setup_fixture(2, 1000, participants());
        let setup_event = ServiceEvent::Setup(setup.clone());
        let first = derive_status(&parent, child(5), [&setup_event], &Setups::default()).unwrap();
        assert_eq!(first.status.phase(), EpochPhase::Setup);
        assert_eq!(first.setups, vec![setup.clone()]);

        let mut source = Setups::default();
        source.0.insert(setup.id(), setup.clone());
        let commit_event = ServiceEvent::Commit(commit_for(&setup));
        let second = derive_status(&first.status, child(6), [&commit_event], &source).unwrap();
        assert_eq!(second.status.phase(), EpochPhase::Committed);
        assert_eq!(second.commits.len(), 1);
    }

    #[test]
    fn test_setup_and_commit_in_one_payload() {
        let setup = setup_fixture(2, 1000, participants());
        let events = [
            ServiceEvent::Setup(setup.clone()),
            ServiceEvent::Commit(commit_for(&setup)),
        ];
        let derived = derive_status(&root(), child(5), events.iter(), &Setups::default()).unwrap();
        assert_eq!(derived.status.phase(), EpochPhase::Committed);
    }

    #[test]
    fn test_commit_without_setup() {
        let setup = setup_fixture(2, 1000, participants());
        let event = ServiceEvent::Commit(commit_for(&setup));
        let err = derive_status(&root(), child(5), [&event], &Setups::default()).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidServiceEvent(ServiceEventError::NoPendingSetup)
        ));
    }

    #[test]
    fn test_rollover_requires_commit() {
        let setup = setup_fixture(2, 1000, participants());
        let event = ServiceEvent::Setup(setup);
        let pending = derive_status(&root(), child(5), [&event], &Setups::default()).unwrap();

        let err = derive_status(&pending.status, child(101), [], &Setups::default()).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::EpochHalt {
                counter: 1,
                final_view: 100,
                view: 101
            }
        ));
    }

    #[test]
    fn test_rollover_into_next_epoch() {
        let setup = setup_fixture(2, 1000, participants());
        let events = [
            ServiceEvent::Setup(setup.clone()),
            ServiceEvent::Commit(commit_for(&setup)),
        ];
        let parent = root();
        let committed = derive_status(&parent, child(5), events.iter(), &Setups::default())
            .unwrap()
            .status;

        let next = derive_status(&committed, child(107), [], &Setups::default())
            .unwrap()
            .status;
        assert_eq!(next.counter, 2);
        assert_eq!(next.final_view, 1000);
        assert_eq!(next.first_block_id, [107; 32]);
        assert_eq!(next.previous, Some(parent.current));
        assert_eq!(next.phase(), EpochPhase::Staking);

        assert_eq!(
            phase_events(&committed, &next),
            vec![EpochPhaseEvent::Transition { counter: 2 }]
        );
    }

    #[test]
    fn test_phase_events_between_statuses() {
        let parent = root();
        let setup = setup_fixture(2, 1000, participants());
        let event = ServiceEvent::Setup(setup.clone());
        let in_setup = derive_status(&parent, child(5), [&event], &Setups::default())
            .unwrap()
            .status;
        assert_eq!(
            phase_events(&parent, &in_setup),
            vec![EpochPhaseEvent::SetupPhaseStarted { counter: 1 }]
        );
        assert!(phase_events(&in_setup, &in_setup).is_empty());

        let mut both = in_setup.clone();
        if let Some(next) = both.next.as_mut() {
            next.commit_id = Some([9; 32]);
        }
        assert_eq!(
            phase_events(&parent, &both),
            vec![
                EpochPhaseEvent::SetupPhaseStarted { counter: 1 },
                EpochPhaseEvent::CommittedPhaseStarted { counter: 1 }
            ]
        );
    }
}
