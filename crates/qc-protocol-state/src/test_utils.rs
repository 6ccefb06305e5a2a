//! Test fixtures: identities, epoch events, a bootstrapped root and block
//! builders.

use crate::adapters::{AcceptAllReceiptValidator, InMemoryKVStore, KvEntityStore};
use crate::config::ProtocolStateConfig;
use crate::domain::identity::node_ids_with_role;
use crate::ports::inbound::MutatorApi;
use crate::ports::outbound::ProtocolConsumer;
use crate::service::ProtocolState;
use ed25519_dalek::{Signer, SigningKey};
use parking_lot::Mutex;
use shared_bus::ProtocolEvent;
use shared_types::{
    Block, Chunk, DkgParticipant, EpochCommit, EpochSetup, ExecutionReceipt, ExecutionResult,
    Header, Identity, NodeId, Payload, QuorumCertificate, Role, Seal, ServiceEvent, ZERO_ID,
};
use std::sync::Arc;

pub const CHAIN_ID: &str = "protocol-state-test";

/// Seed of the execution participant in `participants()`.
pub const EXECUTOR: u8 = 3;

/// Seed of a verification participant in `participants()`.
pub const VERIFIER: u8 = 4;

pub type TestState = ProtocolState<KvEntityStore<InMemoryKVStore>, AcceptAllReceiptValidator>;

pub fn staking_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

pub fn identity(seed: u8, role: Role) -> Identity {
    Identity {
        node_id: NodeId([seed; 32]),
        address: format!("node-{seed}.{role}.test:3569"),
        role,
        stake: 1000,
        staking_key: staking_key(seed).verifying_key().to_bytes(),
    }
}

/// One collection, one consensus, one execution and two verification nodes.
pub fn participants() -> Vec<Identity> {
    vec![
        identity(1, Role::Collection),
        identity(2, Role::Consensus),
        identity(EXECUTOR, Role::Execution),
        identity(VERIFIER, Role::Verification),
        identity(5, Role::Verification),
    ]
}

/// Setup with all collectors in a single cluster.
pub fn setup_fixture(counter: u64, final_view: u64, participants: Vec<Identity>) -> EpochSetup {
    let collectors = node_ids_with_role(&participants, Role::Collection);
    EpochSetup {
        counter,
        final_view,
        participants,
        assignments: vec![collectors],
        random_source: counter.to_be_bytes().repeat(2),
    }
}

/// Commit matching `setup`: one QC per cluster, DKG over the consensus nodes.
pub fn commit_for(setup: &EpochSetup) -> EpochCommit {
    let cluster_qcs = setup
        .assignments
        .iter()
        .map(|cluster| QuorumCertificate {
            view: setup.counter,
            signer_ids: cluster.clone(),
            ..Default::default()
        })
        .collect();
    let dkg_participants = node_ids_with_role(&setup.participants, Role::Consensus)
        .into_iter()
        .enumerate()
        .map(|(index, node_id)| {
            let participant = DkgParticipant {
                index: index as u32,
                key_share: [index as u8 + 1; 32],
            };
            (node_id, participant)
        })
        .collect();
    EpochCommit {
        counter: setup.counter,
        cluster_qcs,
        dkg_participants,
        dkg_group_key: Some([0xDD; 32]),
    }
}

pub fn new_state() -> TestState {
    state_with_config(ProtocolStateConfig::default())
}

pub fn state_with_config(config: ProtocolStateConfig) -> TestState {
    ProtocolState::new(
        Arc::new(KvEntityStore::new(InMemoryKVStore::new())),
        Arc::new(AcceptAllReceiptValidator),
        config,
    )
    .expect("valid test config")
}

/// Root block with the epoch 1 setup and commit in its seal.
pub struct RootFixture {
    pub root: Block,
    pub result: ExecutionResult,
    pub seal: Seal,
    pub setup: EpochSetup,
    pub commit: EpochCommit,
}

impl RootFixture {
    pub const FINAL_VIEW: u64 = 1000;

    pub fn new() -> Self {
        Self::with_participants(participants())
    }

    pub fn with_participants(participants: Vec<Identity>) -> Self {
        Self::build(participants, 0, 0)
    }

    /// Root taken from a snapshot at `height` rather than genesis.
    pub fn at(height: u64, view: u64) -> Self {
        Self::build(participants(), height, view)
    }

    fn build(participants: Vec<Identity>, height: u64, view: u64) -> Self {
        let setup = setup_fixture(1, view + Self::FINAL_VIEW, participants);
        let commit = commit_for(&setup);

        let mut root = Block {
            header: Header {
                chain_id: CHAIN_ID.to_string(),
                parent_id: if height == 0 { ZERO_ID } else { [0xFE; 32] },
                height,
                view,
                timestamp: 0,
                payload_hash: ZERO_ID,
                proposer_id: NodeId([2; 32]),
            },
            payload: Payload::default(),
        };
        root.set_payload(Payload::default());
        let root_id = root.id();

        let service_events = vec![
            ServiceEvent::Setup(setup.clone()),
            ServiceEvent::Commit(commit.clone()),
        ];
        let result = ExecutionResult {
            previous_result_id: ZERO_ID,
            block_id: root_id,
            chunks: vec![Chunk {
                collection_index: 0,
                index: 0,
                block_id: root_id,
                start_state: ZERO_ID,
                end_state: root_id,
            }],
            service_events: service_events.clone(),
        };
        let seal = Seal {
            block_id: root_id,
            result_id: result.id(),
            final_state: root_id,
            service_events,
        };

        Self {
            root,
            result,
            seal,
            setup,
            commit,
        }
    }

    /// Applies `edit` to the root result's service events and reseals it.
    pub fn edit_events(&mut self, edit: impl FnOnce(&mut Vec<ServiceEvent>)) {
        edit(&mut self.result.service_events);
        self.seal = seal_for(&self.result);
    }

    pub fn bootstrapped_state(&self) -> TestState {
        let state = new_state();
        self.bootstrap(&state);
        state
    }

    pub fn bootstrap(&self, state: &TestState) {
        state
            .bootstrap(&self.root, &self.result, &self.seal)
            .expect("bootstrap root fixture");
    }
}

impl Default for RootFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Empty child one view above `parent`.
pub fn child_of(parent: &Header) -> Block {
    child_at_view(parent, parent.view + 1)
}

pub fn child_at_view(parent: &Header, view: u64) -> Block {
    child_with_payload(parent, view, Payload::default())
}

pub fn child_with_payload(parent: &Header, view: u64, payload: Payload) -> Block {
    let mut block = Block {
        header: Header {
            chain_id: parent.chain_id.clone(),
            parent_id: parent.id(),
            height: parent.height + 1,
            view,
            timestamp: parent.timestamp + 1,
            payload_hash: ZERO_ID,
            proposer_id: NodeId([2; 32]),
        },
        payload: Payload::default(),
    };
    block.set_payload(payload);
    block
}

/// Result for `block` following `previous`, with one chunk per guarantee
/// plus the system chunk. The final state is the block id.
pub fn result_for(
    block: &Block,
    previous: &ExecutionResult,
    service_events: Vec<ServiceEvent>,
) -> ExecutionResult {
    let block_id = block.id();
    let start_state = previous.final_state_commitment().unwrap_or(ZERO_ID);
    let chunks = (0..=block.payload.guarantees.len())
        .map(|i| Chunk {
            collection_index: i as u32,
            index: i as u64,
            block_id,
            start_state,
            end_state: block_id,
        })
        .collect();
    ExecutionResult {
        previous_result_id: previous.id(),
        block_id,
        chunks,
        service_events,
    }
}

/// Receipt signed with the staking key of `seed`.
pub fn receipt_for(block: &Block, previous: &ExecutionResult, seed: u8) -> ExecutionReceipt {
    receipt_for_result(result_for(block, previous, Vec::new()), seed)
}

pub fn receipt_for_result(result: ExecutionResult, seed: u8) -> ExecutionReceipt {
    let executor_signature = staking_key(seed).sign(&result.id()).to_bytes();
    ExecutionReceipt {
        executor_id: NodeId([seed; 32]),
        execution_result: result,
        executor_signature,
    }
}

/// Seal carrying the result's service events.
pub fn seal_for(result: &ExecutionResult) -> Seal {
    Seal {
        block_id: result.block_id,
        result_id: result.id(),
        final_state: result.final_state_commitment().unwrap_or(ZERO_ID),
        service_events: result.service_events.clone(),
    }
}

/// Records every notification as a bus event.
#[derive(Default)]
pub struct RecordingConsumer {
    events: Mutex<Vec<ProtocolEvent>>,
}

impl RecordingConsumer {
    pub fn events(&self) -> Vec<ProtocolEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ProtocolConsumer for RecordingConsumer {
    fn block_finalized(&self, header: &Header) {
        self.events
            .lock()
            .push(ProtocolEvent::BlockFinalized(header.clone()));
    }

    fn block_processable(&self, header: &Header) {
        self.events
            .lock()
            .push(ProtocolEvent::BlockProcessable(header.clone()));
    }

    fn epoch_setup_phase_started(&self, counter: u64, header: &Header) {
        self.events.lock().push(ProtocolEvent::EpochSetupPhaseStarted {
            counter,
            header: header.clone(),
        });
    }

    fn epoch_committed_phase_started(&self, counter: u64, header: &Header) {
        self.events
            .lock()
            .push(ProtocolEvent::EpochCommittedPhaseStarted {
                counter,
                header: header.clone(),
            });
    }

    fn epoch_transition(&self, counter: u64, header: &Header) {
        self.events.lock().push(ProtocolEvent::EpochTransition {
            counter,
            header: header.clone(),
        });
    }

    fn critical(&self, reason: &str) {
        self.events.lock().push(ProtocolEvent::CriticalError {
            reason: reason.to_string(),
        });
    }
}
