//! # Domain Layer
//!
//! Pure protocol rules. Nothing here touches storage or notifications.
//!
//! - `identity`: identity list rules
//! - `epoch`: epoch status, phases and service event checks
//! - `transition`: status derivation and phase events
//! - `seal_chain`: seal chain resolution

pub mod epoch;
pub mod identity;
pub mod seal_chain;
pub mod transition;

pub use epoch::{EpochEventIds, EpochPhase, EpochStatus, PendingEpoch, ServiceEventError};
pub use identity::IdentityError;
pub use seal_chain::{SealChain, SealChainError, SealChainInput};
pub use transition::{EpochPhaseEvent, StatusTransition, TransitionError};
