//! # Shared Types Crate
//!
//! Entities shared by the protocol-state core, its storage adapters and the
//! event bus.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every entity that crosses a crate boundary is
//!   defined here.
//! - **Content Addressing**: ids are digests of the entity's encoding, so two
//!   nodes holding the same entity agree on its id.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
