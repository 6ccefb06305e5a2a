//! Signature Verification Adapter
//!
//! Implements `SignatureVerifier` for ed25519 staking keys.

use crate::ports::outbound::SignatureVerifier;
use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};
use shared_types::{PublicKey, Signature};
use tracing::debug;

/// Ed25519 verifier over raw 32-byte public keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519SignatureVerifier;

impl SignatureVerifier for Ed25519SignatureVerifier {
    fn verify(&self, message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
            debug!("[protocol-state] Rejecting malformed public key");
            return false;
        };
        let signature = DalekSignature::from_bytes(signature);
        verifying_key.verify(message, &signature).is_ok()
    }
}

/// Accepts every signature. For tests and trusted replays only.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllSignatures;

impl SignatureVerifier for AcceptAllSignatures {
    fn verify(&self, _message: &[u8], _signature: &Signature, _public_key: &PublicKey) -> bool {
        true
    }
}
