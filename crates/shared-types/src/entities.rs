//! # Core Domain Entities
//!
//! Entities exchanged between the protocol-state core, its storage and the
//! components feeding it candidate blocks.
//!
//! ## Clusters
//!
//! - **Chain**: `Header`, `Payload`, `Block`, `CollectionGuarantee`
//! - **Execution**: `Chunk`, `ExecutionResult`, `ExecutionReceipt`, `Seal`
//! - **Epochs**: `Identity`, `Role`, `EpochSetup`, `EpochCommit`, `ServiceEvent`
//!
//! Every entity that is referenced by id is content addressed: its id is the
//! SHA-256 digest of its bincode encoding (see [`content_hash`]). Maps inside
//! hashed entities are `BTreeMap`s so the encoding is deterministic.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

/// Content identifier of an entity.
pub type Identifier = Hash;

/// A 64-byte Ed25519 signature.
pub type Signature = [u8; 64];

/// A 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

/// Commitment to the execution state after a block.
pub type StateCommitment = Hash;

/// Identifier used for "no entity" references, e.g. the parent of a genesis block.
pub const ZERO_ID: Identifier = [0u8; 32];

/// Compute the content hash of any serializable entity.
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> Hash {
    let mut hasher = Sha256::new();
    bincode::serialize_into(&mut hasher, value)
        .expect("entities are plain data and encode into a hasher without error");
    hasher.finalize().into()
}

/// Unique identifier of a staked node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct NodeId(pub [u8; 32]);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// Block header. The block id is the content hash of the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Header {
    /// Chain the block belongs to.
    pub chain_id: String,
    /// Id of the parent block.
    pub parent_id: Identifier,
    /// Height in the chain; parent height + 1.
    pub height: u64,
    /// Consensus view; strictly greater than the parent view.
    pub view: u64,
    /// Unix timestamp (milliseconds) when the block was proposed.
    pub timestamp: u64,
    /// Content hash of the payload.
    pub payload_hash: Hash,
    /// Node that proposed the block.
    pub proposer_id: NodeId,
}

impl Header {
    /// Block id.
    pub fn id(&self) -> Identifier {
        content_hash(self)
    }
}

/// Attestation by a collection cluster that a collection is available.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionGuarantee {
    pub collection_id: Identifier,
    /// Block the collection's transactions reference; bounds its expiry.
    pub reference_block_id: Identifier,
    pub signer_ids: Vec<NodeId>,
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
}

impl CollectionGuarantee {
    pub fn id(&self) -> Identifier {
        self.collection_id
    }
}

/// Block body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Payload {
    pub guarantees: Vec<CollectionGuarantee>,
    pub seals: Vec<Seal>,
    pub receipts: Vec<ExecutionReceipt>,
}

impl Payload {
    /// Content hash committed to by `Header::payload_hash`.
    pub fn hash(&self) -> Hash {
        content_hash(self)
    }

    pub fn is_empty(&self) -> bool {
        self.guarantees.is_empty() && self.seals.is_empty() && self.receipts.is_empty()
    }
}

/// Header and payload pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Block {
    pub header: Header,
    pub payload: Payload,
}

impl Block {
    pub fn id(&self) -> Identifier {
        self.header.id()
    }

    /// Replace the payload and update the header's payload hash.
    pub fn set_payload(&mut self, payload: Payload) {
        self.header.payload_hash = payload.hash();
        self.payload = payload;
    }
}

// =============================================================================
// CLUSTER B: EXECUTION
// =============================================================================

/// One unit of verifiable execution work within a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Chunk {
    pub collection_index: u32,
    pub index: u64,
    pub block_id: Identifier,
    pub start_state: StateCommitment,
    pub end_state: StateCommitment,
}

/// Outcome of executing a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExecutionResult {
    pub previous_result_id: Identifier,
    pub block_id: Identifier,
    pub chunks: Vec<Chunk>,
    pub service_events: Vec<ServiceEvent>,
}

impl ExecutionResult {
    pub fn id(&self) -> Identifier {
        content_hash(self)
    }

    /// State commitment after the last chunk.
    pub fn final_state_commitment(&self) -> Option<StateCommitment> {
        self.chunks.last().map(|chunk| chunk.end_state)
    }
}

/// An execution node's signed commitment to a result.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    pub executor_id: NodeId,
    pub execution_result: ExecutionResult,
    #[serde_as(as = "Bytes")]
    pub executor_signature: Signature,
}

impl ExecutionReceipt {
    pub fn id(&self) -> Identifier {
        content_hash(self)
    }

    /// Two receipts are duplicates when this pair coincides.
    pub fn dedup_key(&self) -> (NodeId, Identifier) {
        (self.executor_id, self.execution_result.id())
    }
}

/// Attestation that a result has been verified, sealing the block it executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Seal {
    pub block_id: Identifier,
    pub result_id: Identifier,
    pub final_state: StateCommitment,
    pub service_events: Vec<ServiceEvent>,
}

impl Seal {
    pub fn id(&self) -> Identifier {
        content_hash(self)
    }
}

// =============================================================================
// CLUSTER C: IDENTITIES AND EPOCHS
// =============================================================================

/// Protocol role of a staked node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Collection,
    Consensus,
    Execution,
    Verification,
}

impl Role {
    /// Every role a valid participant set must cover.
    pub const ALL: [Role; 4] = [
        Role::Collection,
        Role::Consensus,
        Role::Execution,
        Role::Verification,
    ];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Collection => "collection",
            Role::Consensus => "consensus",
            Role::Execution => "execution",
            Role::Verification => "verification",
        };
        f.write_str(name)
    }
}

/// A staked participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub node_id: NodeId,
    /// Network address; unique across participants.
    pub address: String,
    pub role: Role,
    pub stake: u64,
    pub staking_key: PublicKey,
}

/// Quorum certificate produced by a collection cluster for its root block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QuorumCertificate {
    pub view: u64,
    pub block_id: Identifier,
    pub signer_ids: Vec<NodeId>,
    pub sig_data: Vec<u8>,
}

/// Per-node DKG output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgParticipant {
    pub index: u32,
    pub key_share: PublicKey,
}

/// Service event opening the setup phase of the next epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EpochSetup {
    pub counter: u64,
    /// Last view (inclusive) of the epoch this event sets up.
    pub final_view: u64,
    pub participants: Vec<Identity>,
    /// Partition of the collection-role participants into clusters.
    pub assignments: Vec<Vec<NodeId>>,
    pub random_source: Vec<u8>,
}

impl EpochSetup {
    pub fn id(&self) -> Identifier {
        content_hash(self)
    }
}

/// Service event closing the setup phase with the DKG and cluster results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EpochCommit {
    pub counter: u64,
    /// One QC per cluster of the matching setup, in cluster order.
    pub cluster_qcs: Vec<QuorumCertificate>,
    pub dkg_participants: BTreeMap<NodeId, DkgParticipant>,
    pub dkg_group_key: Option<PublicKey>,
}

impl EpochCommit {
    pub fn id(&self) -> Identifier {
        content_hash(self)
    }
}

/// Protocol-level event emitted by the system chunk of an execution result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceEvent {
    Setup(EpochSetup),
    Commit(EpochCommit),
}

impl ServiceEvent {
    pub fn id(&self) -> Identifier {
        match self {
            ServiceEvent::Setup(setup) => setup.id(),
            ServiceEvent::Commit(commit) => commit.id(),
        }
    }

    pub fn counter(&self) -> u64 {
        match self {
            ServiceEvent::Setup(setup) => setup.counter,
            ServiceEvent::Commit(commit) => commit.counter,
        }
    }
}

impl From<EpochSetup> for ServiceEvent {
    fn from(setup: EpochSetup) -> Self {
        ServiceEvent::Setup(setup)
    }
}

impl From<EpochCommit> for ServiceEvent {
    fn from(commit: EpochCommit) -> Self {
        ServiceEvent::Commit(commit)
    }
}
