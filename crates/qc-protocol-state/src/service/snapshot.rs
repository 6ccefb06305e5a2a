//! # Snapshots
//!
//! Read-only views of the protocol state as of one reference block. A
//! snapshot answers from the epoch status stored for its block, so queries
//! against blocks on different forks never interfere.

use super::*;
use crate::domain::epoch::EpochPhase;
use crate::domain::identity;
use crate::ports::inbound::StateApi;
use shared_types::{
    DkgParticipant, EpochCommit, Identity, NodeId, PublicKey, Seal, StateCommitment,
};
use std::collections::BTreeMap;

impl<S: EntityStore, R: ReceiptValidator> StateApi for ProtocolState<S, R> {
    type Snapshot = Snapshot<S>;

    fn final_snapshot(&self) -> StateResult<Snapshot<S>> {
        let height = self.finalized_height()?;
        let block_id = self.store.lookup_block_height(height)?;
        self.snapshot(&block_id)
    }

    fn sealed(&self) -> StateResult<Snapshot<S>> {
        let height = self.sealed_height()?;
        let block_id = self.store.lookup_block_height(height)?;
        self.snapshot(&block_id)
    }

    fn at_block_id(&self, block_id: &Identifier) -> StateResult<Snapshot<S>> {
        self.snapshot(block_id)
    }

    fn at_height(&self, height: u64) -> StateResult<Snapshot<S>> {
        let block_id = self.store.lookup_block_height(height).map_err(|e| match e {
            StorageError::NotFound(_) => {
                StateError::not_available(format!("finalized block at height {height}"))
            }
            other => other.into(),
        })?;
        self.snapshot(&block_id)
    }
}

impl<S: EntityStore, R: ReceiptValidator> ProtocolState<S, R> {
    fn snapshot(&self, block_id: &Identifier) -> StateResult<Snapshot<S>> {
        let header = self.header_of(block_id)?;
        let status = self.status_of(block_id)?;
        Ok(Snapshot {
            store: Arc::clone(&self.store),
            block_id: *block_id,
            header,
            status,
        })
    }
}

/// Protocol state as of one block.
pub struct Snapshot<S: EntityStore> {
    store: Arc<S>,
    block_id: Identifier,
    header: Header,
    status: EpochStatus,
}

impl<S: EntityStore> Snapshot<S> {
    pub fn head(&self) -> &Header {
        &self.header
    }

    pub fn block_id(&self) -> Identifier {
        self.block_id
    }

    /// Seal of the highest block sealed on this block's fork.
    pub fn seal(&self) -> StateResult<Seal> {
        Ok(self.store.lookup_seal_by_block(&self.block_id)?)
    }

    /// Final state commitment of the latest sealed result.
    pub fn commit(&self) -> StateResult<StateCommitment> {
        Ok(self.seal()?.final_state)
    }

    pub fn phase(&self) -> EpochPhase {
        self.status.phase()
    }

    pub fn status(&self) -> &EpochStatus {
        &self.status
    }

    pub fn is_valid(&self) -> StateResult<bool> {
        Ok(self.store.retrieve_block_validity(&self.block_id)?)
    }

    /// Current epoch participants matching `filter`.
    ///
    /// Once the next epoch is set up, its joining participants are included
    /// with zero stake.
    pub fn identities(&self, filter: impl Fn(&Identity) -> bool) -> StateResult<Vec<Identity>> {
        let current = self.store.retrieve_epoch_setup(&self.status.current.setup_id)?;
        let mut identities = current.participants;

        if let Some(next) = &self.status.next {
            let next = self.store.retrieve_epoch_setup(&next.setup_id)?;
            for joining in next.participants {
                if identity::find(&identities, &joining.node_id).is_none() {
                    identities.push(Identity {
                        stake: 0,
                        ..joining
                    });
                }
            }
        }

        identities.retain(|identity| filter(identity));
        Ok(identities)
    }

    pub fn identity(&self, node_id: &NodeId) -> StateResult<Identity> {
        self.identities(|identity| identity.node_id == *node_id)?
            .into_iter()
            .next()
            .ok_or_else(|| StateError::not_available(format!("identity {node_id}")))
    }

    pub fn epochs(&self) -> Epochs<'_, S> {
        Epochs { snapshot: self }
    }
}

/// Epoch queries relative to a snapshot.
pub struct Epochs<'a, S: EntityStore> {
    snapshot: &'a Snapshot<S>,
}

impl<S: EntityStore> Epochs<'_, S> {
    pub fn current(&self) -> StateResult<Epoch> {
        let ids = self.snapshot.status.current;
        self.load(&ids.setup_id, Some(&ids.commit_id))
    }

    /// Next epoch, once its setup is sealed on this fork.
    pub fn next(&self) -> StateResult<Epoch> {
        let next = self
            .snapshot
            .status
            .next
            .ok_or_else(|| StateError::not_available("next epoch is not set up"))?;
        self.load(&next.setup_id, next.commit_id.as_ref())
    }

    pub fn previous(&self) -> StateResult<Epoch> {
        let ids = self
            .snapshot
            .status
            .previous
            .ok_or_else(|| StateError::not_available("no epoch before the root epoch"))?;
        self.load(&ids.setup_id, Some(&ids.commit_id))
    }

    fn load(&self, setup_id: &Identifier, commit_id: Option<&Identifier>) -> StateResult<Epoch> {
        let store = &self.snapshot.store;
        let setup = store.retrieve_epoch_setup(setup_id)?;
        let commit = commit_id
            .map(|id| store.retrieve_epoch_commit(id))
            .transpose()?;
        Ok(Epoch { setup, commit })
    }
}

/// One epoch's setup and, once committed, its commit.
#[derive(Debug, Clone)]
pub struct Epoch {
    setup: EpochSetup,
    commit: Option<EpochCommit>,
}

impl Epoch {
    pub fn counter(&self) -> u64 {
        self.setup.counter
    }

    pub fn final_view(&self) -> u64 {
        self.setup.final_view
    }

    pub fn initial_identities(&self) -> &[Identity] {
        &self.setup.participants
    }

    pub fn random_source(&self) -> &[u8] {
        &self.setup.random_source
    }

    pub fn is_committed(&self) -> bool {
        self.commit.is_some()
    }

    /// Collector identities grouped by cluster.
    pub fn clustering(&self) -> StateResult<Vec<Vec<Identity>>> {
        (0..self.setup.assignments.len())
            .map(|index| self.cluster(index))
            .collect()
    }

    pub fn cluster(&self, index: usize) -> StateResult<Vec<Identity>> {
        let members = self
            .setup
            .assignments
            .get(index)
            .ok_or_else(|| StateError::not_available(format!("cluster {index}")))?;
        members
            .iter()
            .map(|node_id| {
                identity::find(&self.setup.participants, node_id).ok_or_else(|| {
                    StateError::not_available(format!("cluster member {node_id}"))
                })
            })
            .collect()
    }

    pub fn dkg(&self) -> StateResult<Dkg<'_>> {
        let commit = self
            .commit
            .as_ref()
            .ok_or_else(|| StateError::not_available("epoch is not committed"))?;
        let group_key = commit
            .dkg_group_key
            .ok_or_else(|| StateError::not_available("DKG group key"))?;
        Ok(Dkg {
            group_key,
            participants: &commit.dkg_participants,
        })
    }
}

/// DKG output of a committed epoch.
#[derive(Debug, Clone, Copy)]
pub struct Dkg<'a> {
    group_key: PublicKey,
    participants: &'a BTreeMap<NodeId, DkgParticipant>,
}

impl Dkg<'_> {
    pub fn size(&self) -> usize {
        self.participants.len()
    }

    pub fn group_key(&self) -> PublicKey {
        self.group_key
    }

    pub fn index(&self, node_id: &NodeId) -> StateResult<u32> {
        Ok(self.participant(node_id)?.index)
    }

    pub fn key_share(&self, node_id: &NodeId) -> StateResult<PublicKey> {
        Ok(self.participant(node_id)?.key_share)
    }

    fn participant(&self, node_id: &NodeId) -> StateResult<&DkgParticipant> {
        self.participants
            .get(node_id)
            .ok_or_else(|| StateError::not_available(format!("DKG participant {node_id}")))
    }
}
