//! Adapters for the protocol state ports
//!
//! - `memory`: ordered in-memory `KeyValueStore`
//! - `entity_store`: `EntityStore` over any `KeyValueStore`
//! - `receipt_validator`: permissive and structural receipt validators
//! - `signature_verifier`: ed25519 staking-key verification
//! - `event_bus`: forwards notifications to `shared-bus`

pub mod entity_store;
pub mod event_bus;
pub mod memory;
pub mod receipt_validator;
pub mod signature_verifier;

pub use entity_store::{KeyPrefix, KvEntityStore};
pub use event_bus::BusConsumer;
pub use memory::InMemoryKVStore;
pub use receipt_validator::{AcceptAllReceiptValidator, StructuralReceiptValidator};
pub use signature_verifier::{AcceptAllSignatures, Ed25519SignatureVerifier};
