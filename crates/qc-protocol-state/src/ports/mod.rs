//! Ports module for the protocol state

pub mod inbound;
pub mod outbound;

pub use inbound::{MutatorApi, StateApi};
pub use outbound::{
    BatchOperation, EntityBatch, EntityStore, EntityWrite, KeyValueStore, ProtocolConsumer,
    ReceiptError, ReceiptValidator, SignatureVerifier,
};
