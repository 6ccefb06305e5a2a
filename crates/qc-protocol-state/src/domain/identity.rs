//! Participant list rules.

use shared_types::{Identity, NodeId, Role};
use std::collections::HashSet;
use thiserror::Error;

/// Reasons an identity list is not a valid participant set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("duplicate node id {0}")]
    DuplicateNodeId(NodeId),

    #[error("duplicate address {0}")]
    DuplicateAddress(String),

    #[error("node {0} has zero stake")]
    ZeroStake(NodeId),

    #[error("no participant with role {0}")]
    MissingRole(Role),
}

/// Check uniqueness of node ids and addresses, positive stake, and that
/// every protocol role is represented.
pub fn validate_identities(identities: &[Identity]) -> Result<(), IdentityError> {
    let mut node_ids = HashSet::with_capacity(identities.len());
    let mut addresses = HashSet::with_capacity(identities.len());

    for identity in identities {
        if !node_ids.insert(identity.node_id) {
            return Err(IdentityError::DuplicateNodeId(identity.node_id));
        }
        if !addresses.insert(identity.address.as_str()) {
            return Err(IdentityError::DuplicateAddress(identity.address.clone()));
        }
        if identity.stake == 0 {
            return Err(IdentityError::ZeroStake(identity.node_id));
        }
    }

    for role in Role::ALL {
        if !identities.iter().any(|identity| identity.role == role) {
            return Err(IdentityError::MissingRole(role));
        }
    }

    Ok(())
}

/// Node ids of all participants with `role`, in list order.
pub fn node_ids_with_role(identities: &[Identity], role: Role) -> Vec<NodeId> {
    identities
        .iter()
        .filter(|identity| identity.role == role)
        .map(|identity| identity.node_id)
        .collect()
}

pub fn find(identities: &[Identity], node_id: &NodeId) -> Option<Identity> {
    identities
        .iter()
        .find(|identity| identity.node_id == *node_id)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(seed: u8, role: Role) -> Identity {
        Identity {
            node_id: NodeId([seed; 32]),
            address: format!("node-{seed}:3569"),
            role,
            stake: 1000,
            staking_key: [seed; 32],
        }
    }

    fn full_set() -> Vec<Identity> {
        vec![
            identity(1, Role::Collection),
            identity(2, Role::Consensus),
            identity(3, Role::Execution),
            identity(4, Role::Verification),
        ]
    }

    #[test]
    fn test_valid_set() {
        assert_eq!(validate_identities(&full_set()), Ok(()));
    }

    #[test]
    fn test_duplicate_node_id() {
        let mut identities = full_set();
        let mut dup = identity(1, Role::Verification);
        dup.address = "other:3569".into();
        identities.push(dup);
        assert_eq!(
            validate_identities(&identities),
            Err(IdentityError::DuplicateNodeId(NodeId([1; 32])))
        );
    }

    #[test]
    fn test_duplicate_address() {
        let mut identities = full_set();
        let mut dup = identity(9, Role::Verification);
        dup.address = identities[0].address.clone();
        identities.push(dup);
        assert!(matches!(
            validate_identities(&identities),
            Err(IdentityError::DuplicateAddress(_))
        ));
    }

    #[test]
    fn test_zero_stake() {
        let mut identities = full_set();
        identities[2].stake = 0;
        assert_eq!(
            validate_identities(&identities),
            Err(IdentityError::ZeroStake(NodeId([3; 32])))
        );
    }

    #[test]
    fn test_each_role_required() {
        for role in Role::ALL {
            let identities: Vec<_> = full_set().into_iter().filter(|i| i.role != role).collect();
            assert_eq!(
                validate_identities(&identities),
                Err(IdentityError::MissingRole(role))
            );
        }
    }

    #[test]
    fn test_node_ids_with_role() {
        let mut identities = full_set();
        identities.push(identity(5, Role::Verification));
        assert_eq!(
            node_ids_with_role(&identities, Role::Verification),
            vec![NodeId([4; 32]), NodeId([5; 32])]
        );
    }
}
