//! Membership View
//!
//! The immutable, versioned catalog of cluster members. Every member is
//! assigned one position on each of K pseudo-random rings, and the ring
//! neighborhoods define who observes whom.
//!
//! ## Mechanism
//! - **Rings**: for ring k, members are ordered by a seeded hash of the
//!   endpoint. The predecessor of a member on ring k is one of its K
//!   observers; the successor is one of the K endpoints it observes.
//! - **Determinism**: hashing uses the standard `DefaultHasher` with the ring
//!   number as seed, so every node computes the exact same topology from the
//!   same member list.
//! - **Versioning**: the configuration id is a stable hash over the sorted
//!   member identifiers and sorted endpoints. It changes iff membership
//!   changes, and two views built from the same inputs always agree on it.

use super::types::{Endpoint, NodeId};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// The version number every protocol message carries. `-1` is reserved by the
/// join protocol to mean "just stream me the current view".
pub type ConfigurationId = i64;

/// An immutable snapshot of the membership at one configuration version.
#[derive(Debug, Clone)]
pub struct MembershipView {
    k: usize,
    members: BTreeMap<Endpoint, NodeId>,
    rings: Vec<Vec<Endpoint>>,
    configuration_id: ConfigurationId,
}

fn ring_hash(ring: usize, endpoint: &Endpoint) -> u64 {
    let mut hasher = DefaultHasher::new();
    (ring as u64).hash(&mut hasher);
    endpoint.to_string().hash(&mut hasher);
    hasher.finish()
}

/// Sort key within a ring. The endpoint string breaks hash ties so that all
/// nodes agree on the ordering.
fn ring_key(ring: usize, endpoint: &Endpoint) -> (u64, String) {
    (ring_hash(ring, endpoint), endpoint.to_string())
}

impl MembershipView {
    /// Builds a view from positionally paired identifier and endpoint lists.
    pub fn new(k: usize, identifiers: Vec<NodeId>, endpoints: Vec<Endpoint>) -> Self {
        assert!(k > 0, "ring count must be positive");
        assert_eq!(
            identifiers.len(),
            endpoints.len(),
            "identifier and endpoint lists must pair up"
        );

        let members: BTreeMap<Endpoint, NodeId> =
            endpoints.into_iter().zip(identifiers).collect();

        let mut rings = Vec::with_capacity(k);
        for ring in 0..k {
            let mut ordered: Vec<Endpoint> = members.keys().cloned().collect();
            ordered.sort_by_key(|ep| ring_key(ring, ep));
            rings.push(ordered);
        }

        let configuration_id = Self::compute_configuration_id(&members);

        Self {
            k,
            members,
            rings,
            configuration_id,
        }
    }

    fn compute_configuration_id(members: &BTreeMap<Endpoint, NodeId>) -> ConfigurationId {
        let mut identifiers: Vec<&NodeId> = members.values().collect();
        identifiers.sort();

        let mut hasher = DefaultHasher::new();
        for id in identifiers {
            id.0.hash(&mut hasher);
        }
        // BTreeMap iterates endpoints in their string-form order already.
        for endpoint in members.keys() {
            endpoint.to_string().hash(&mut hasher);
        }
        hasher.finish() as ConfigurationId
    }

    pub fn configuration_id(&self) -> ConfigurationId {
        self.configuration_id
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_host_present(&self, endpoint: &Endpoint) -> bool {
        self.members.contains_key(endpoint)
    }

    pub fn is_identifier_present(&self, id: &NodeId) -> bool {
        self.members.values().any(|known| known == id)
    }

    /// Members sorted by their endpoint string form.
    pub fn ordered_members(&self) -> Vec<Endpoint> {
        self.members.keys().cloned().collect()
    }

    /// Identifiers positionally paired with `ordered_members`.
    pub fn ordered_identifiers(&self) -> Vec<NodeId> {
        self.members.values().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn ring(&self, ring: usize) -> &[Endpoint] {
        &self.rings[ring]
    }

    fn position_on_ring(&self, ring: usize, endpoint: &Endpoint) -> Option<usize> {
        self.rings[ring]
            .binary_search_by(|member| ring_key(ring, member).cmp(&ring_key(ring, endpoint)))
            .ok()
    }

    /// The K members that observe `endpoint`: its predecessor on every ring.
    /// Duplicates are preserved so that per-ring votes can be tallied.
    /// Returns `None` for a non-member; an empty list for a singleton view.
    pub fn observers_of(&self, endpoint: &Endpoint) -> Option<Vec<Endpoint>> {
        if !self.is_host_present(endpoint) {
            return None;
        }
        if self.members.len() <= 1 {
            return Some(Vec::new());
        }

        let mut observers = Vec::with_capacity(self.k);
        for ring in 0..self.k {
            let members = &self.rings[ring];
            let position = self
                .position_on_ring(ring, endpoint)
                .expect("present member must appear on every ring");
            let predecessor = (position + members.len() - 1) % members.len();
            observers.push(members[predecessor].clone());
        }
        Some(observers)
    }

    /// The K members that `endpoint` observes: its successor on every ring.
    /// Symmetric to `observers_of`, but a distinct lookup.
    pub fn observed_by(&self, endpoint: &Endpoint) -> Option<Vec<Endpoint>> {
        if !self.is_host_present(endpoint) {
            return None;
        }
        if self.members.len() <= 1 {
            return Some(Vec::new());
        }

        let mut observed = Vec::with_capacity(self.k);
        for ring in 0..self.k {
            let members = &self.rings[ring];
            let position = self
                .position_on_ring(ring, endpoint)
                .expect("present member must appear on every ring");
            let successor = (position + 1) % members.len();
            observed.push(members[successor].clone());
        }
        Some(observed)
    }

    /// The members that would observe `joiner` if it were inserted now: the
    /// predecessor of its insertion point on every ring. Used by the seed to
    /// answer join phase 1 for a not-yet-member endpoint.
    pub fn expected_observers_of(&self, joiner: &Endpoint) -> Vec<Endpoint> {
        if self.members.is_empty() {
            return Vec::new();
        }

        let joiner_keys: Vec<(u64, String)> =
            (0..self.k).map(|ring| ring_key(ring, joiner)).collect();

        let mut observers = Vec::with_capacity(self.k);
        for ring in 0..self.k {
            let members = &self.rings[ring];
            let insertion = members
                .partition_point(|member| ring_key(ring, member) < joiner_keys[ring]);
            let predecessor = (insertion + members.len() - 1) % members.len();
            observers.push(members[predecessor].clone());
        }
        observers
    }

    /// The ring numbers on which `observer` observes `observed`.
    pub fn rings_observed_on(&self, observer: &Endpoint, observed: &Endpoint) -> Vec<u32> {
        match self.observed_by(observer) {
            Some(observed_list) => observed_list
                .iter()
                .enumerate()
                .filter(|(_, peer)| *peer == observed)
                .map(|(ring, _)| ring as u32)
                .collect(),
            None => Vec::new(),
        }
    }
}
