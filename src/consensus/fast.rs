use crate::membership::types::Endpoint;
use crate::membership::view::ConfigurationId;
use crate::transport::protocol::ConsensusProposal;
use std::collections::{HashMap, HashSet};

/// Smallest set size guaranteeing that any two such sets intersect in more
/// than N/2 members.
pub fn fast_quorum_size(membership_size: usize) -> usize {
    (3 * membership_size) / 4 + 1
}

/// One-step consensus: tallies identical proposals per configuration and
/// decides once a fast quorum of distinct senders agrees.
#[derive(Debug)]
pub struct FastPaxos {
    configuration_id: ConfigurationId,
    membership_size: usize,
    votes: HashMap<Vec<Endpoint>, HashSet<Endpoint>>,
    voters: HashSet<Endpoint>,
    local_vote: Option<Vec<Endpoint>>,
    decided: bool,
}

impl FastPaxos {
    pub fn new(configuration_id: ConfigurationId, membership_size: usize) -> Self {
        Self {
            configuration_id,
            membership_size,
            votes: HashMap::new(),
            voters: HashSet::new(),
            local_vote: None,
            decided: false,
        }
    }

    /// Remembers the value this node announced, for the fallback proposer.
    pub fn register_local_vote(&mut self, mut value: Vec<Endpoint>) {
        value.sort();
        self.local_vote = Some(value);
    }

    pub fn local_vote(&self) -> Option<&Vec<Endpoint>> {
        self.local_vote.as_ref()
    }

    pub fn has_decided(&self) -> bool {
        self.decided
    }

    pub fn has_votes(&self) -> bool {
        !self.voters.is_empty()
    }

    /// Tallies one vote. Returns the decided value when this vote completes a
    /// fast quorum. A sender gets exactly one vote per configuration.
    pub fn on_proposal(&mut self, proposal: &ConsensusProposal) -> Option<Vec<Endpoint>> {
        if self.decided || proposal.configuration_id != self.configuration_id {
            return None;
        }
        if !self.voters.insert(proposal.sender.clone()) {
            tracing::debug!("Ignoring duplicate fast-round vote from {}", proposal.sender);
            return None;
        }

        let mut value = proposal.endpoints.clone();
        value.sort();
        let supporters = self.votes.entry(value.clone()).or_default();
        supporters.insert(proposal.sender.clone());

        if supporters.len() >= fast_quorum_size(self.membership_size) {
            self.decided = true;
            return Some(value);
        }
        None
    }

    /// The value with the widest support so far, used to seed the fallback
    /// proposer on nodes that never announced their own proposal.
    pub fn most_voted(&self) -> Option<Vec<Endpoint>> {
        self.votes
            .iter()
            .max_by_key(|(_, supporters)| supporters.len())
            .map(|(value, _)| value.clone())
    }
}
