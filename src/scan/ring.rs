use sha2::{Digest, Sha256};
use thiserror::Error;

/// Virtual points placed on the ring for every replica. Changing this value
/// reshuffles ownership across the whole fleet, so it must stay fixed.
pub const POINTS_PER_REPLICA: usize = 3;

#[derive(Debug, Error, PartialEq)]
pub enum RingError {
    #[error("cannot build a partition ring for zero replicas")]
    NoReplicas,
}

/// Consistent-hash ring mapping instance identifiers to the index of the
/// replica that owns them.
///
/// Every replica builds the same ring from the same replica count, so any
/// replica can compute ownership for any instance without talking to the
/// others.
#[derive(Debug, Clone)]
pub struct HashRing {
    replica_count: u32,
    // Sorted by hash.
    points: Vec<(u64, u32)>,
}

impl HashRing {
    pub fn new(replica_count: u32) -> Result<Self, RingError> {
        if replica_count == 0 {
            return Err(RingError::NoReplicas);
        }

        let mut points = Vec::with_capacity(replica_count as usize * POINTS_PER_REPLICA);
        for replica in 0..replica_count {
            for point in 0..POINTS_PER_REPLICA {
                points.push((hash_key(&format!("{replica}-{point}")), replica));
            }
        }
        // Ties are broken by replica index so the order never depends on
        // insertion order.
        points.sort_unstable();

        Ok(Self {
            replica_count,
            points,
        })
    }

    pub fn replica_count(&self) -> u32 {
        self.replica_count
    }

    /// Replica index owning `key`: the first ring point at or after the
    /// key's hash, wrapping around to the start of the ring.
    pub fn owner_of(&self, key: &str) -> u32 {
        let hash = hash_key(key);
        let idx = self.points.partition_point(|(point, _)| *point < hash);
        let (_, replica) = self.points[idx % self.points.len()];
        replica
    }

    pub fn is_owned_by(&self, key: &str, replica: u32) -> bool {
        self.owner_of(key) == replica
    }
}

/// Convenience for one-off lookups.
pub fn owner_of(key: &str, replica_count: u32) -> Result<u32, RingError> {
    Ok(HashRing::new(replica_count)?.owner_of(key))
}

fn hash_key(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn instance_ids(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("2f1c9d3e-0000-4000-8000-{i:012}"))
            .collect()
    }

    #[test]
    fn test_zero_replicas_rejected() {
        assert_eq!(HashRing::new(0).unwrap_err(), RingError::NoReplicas);
        assert!(owner_of("abc", 0).is_err());
    }

    #[test]
    fn test_single_replica_owns_everything() {
        let ring = HashRing::new(1).unwrap();
        for id in instance_ids(50) {
            assert_eq!(ring.owner_of(&id), 0);
        }
    }

    #[test]
    fn test_owner_is_deterministic() {
        for id in instance_ids(200) {
            let first = owner_of(&id, 4).unwrap();
            // A freshly built ring on "another replica" must agree.
            let other = HashRing::new(4).unwrap();
            assert_eq!(first, other.owner_of(&id));
            assert_eq!(first, owner_of(&id, 4).unwrap());
            assert!(first < 4);
        }
    }

    #[test]
    fn test_ownership_partitions_the_inventory() {
        let ids = instance_ids(500);
        let replica_count = 3;
        let ring = HashRing::new(replica_count).unwrap();

        let mut seen = HashSet::new();
        let mut owners_used = HashSet::new();
        for replica in 0..replica_count {
            let owned: Vec<&String> = ids
                .iter()
                .filter(|id| ring.is_owned_by(id, replica))
                .collect();
            if !owned.is_empty() {
                owners_used.insert(replica);
            }
            for id in owned {
                // No instance may be claimed by two replicas.
                assert!(seen.insert(id.clone()), "{id} owned twice");
            }
        }
        assert_eq!(seen.len(), ids.len());
        assert!(owners_used.len() > 1);
    }

    #[test]
    fn test_scaling_up_only_moves_keys_to_new_replica() {
        let before = HashRing::new(3).unwrap();
        let after = HashRing::new(4).unwrap();
        for id in instance_ids(500) {
            let (old, new) = (before.owner_of(&id), after.owner_of(&id));
            if old != new {
                assert_eq!(new, 3, "{id} moved from {old} to {new}");
            }
        }
    }
}
