use crate::membership::types::Endpoint;
use crate::membership::view::ConfigurationId;
use crate::transport::protocol::{
    AcceptMessage, Ballot, PrepareMessage, PromiseMessage, ProposeMessage,
};
use std::collections::{HashMap, HashSet};

/// Single-decree Paxos scoped to one configuration. Each node plays all three
/// roles: proposer (when the fast round fails on it), acceptor, and learner.
///
/// The methods consume inbound messages and return the outbound reply, if
/// any; sending is left to the protocol loop so the state machine stays
/// directly testable.
#[derive(Debug)]
pub struct ClassicPaxos {
    local: Endpoint,
    configuration_id: ConfigurationId,
    membership_size: usize,

    // Acceptor state.
    promised: Option<Ballot>,
    accepted: Option<(Ballot, Vec<Endpoint>)>,

    // Proposer state.
    current_ballot: Option<Ballot>,
    proposal_value: Option<Vec<Endpoint>>,
    promises: Vec<PromiseMessage>,
    promisers: HashSet<Endpoint>,
    proposed: bool,

    // Learner state.
    accept_tally: HashMap<(Ballot, Vec<Endpoint>), HashSet<Endpoint>>,
    highest_round_seen: u64,
    decided: bool,
}

impl ClassicPaxos {
    pub fn new(
        local: Endpoint,
        configuration_id: ConfigurationId,
        membership_size: usize,
    ) -> Self {
        Self {
            local,
            configuration_id,
            membership_size,
            promised: None,
            accepted: None,
            current_ballot: None,
            proposal_value: None,
            promises: Vec::new(),
            promisers: HashSet::new(),
            proposed: false,
            accept_tally: HashMap::new(),
            highest_round_seen: 0,
            decided: false,
        }
    }

    fn majority(&self) -> usize {
        self.membership_size / 2 + 1
    }

    pub fn has_decided(&self) -> bool {
        self.decided
    }

    /// The round a new proposal should use: one past the highest round this
    /// node has observed in the current configuration epoch. Duelling
    /// proposers therefore escalate their backoff window together instead of
    /// counting attempts independently.
    pub fn next_round(&self) -> u64 {
        self.highest_round_seen + 1
    }

    fn observe_round(&mut self, ballot: &Ballot) {
        if ballot.round > self.highest_round_seen {
            self.highest_round_seen = ballot.round;
        }
    }

    fn stale(&self, configuration_id: ConfigurationId) -> bool {
        self.decided || configuration_id != self.configuration_id
    }

    /// Begins a proposer round for `value`. Returns the Prepare to broadcast.
    pub fn start_round(&mut self, value: Vec<Endpoint>) -> PrepareMessage {
        let ballot = Ballot {
            round: self.next_round(),
            proposer: self.local.to_string(),
        };
        self.observe_round(&ballot);
        self.current_ballot = Some(ballot.clone());
        self.proposal_value = Some(value);
        self.promises.clear();
        self.promisers.clear();
        self.proposed = false;

        tracing::info!(
            "Starting classic round {} for configuration {}",
            ballot.round,
            self.configuration_id
        );
        PrepareMessage {
            sender: self.local.clone(),
            configuration_id: self.configuration_id,
            ballot,
        }
    }

    /// Acceptor: answer a Prepare with a Promise when the ballot is at least
    /// as high as anything promised before.
    pub fn on_prepare(&mut self, msg: &PrepareMessage) -> Option<PromiseMessage> {
        if self.stale(msg.configuration_id) {
            return None;
        }
        self.observe_round(&msg.ballot);

        if let Some(promised) = &self.promised {
            if msg.ballot < *promised {
                tracing::debug!(
                    "Rejecting prepare {:?}; already promised {:?}",
                    msg.ballot,
                    promised
                );
                return None;
            }
        }
        self.promised = Some(msg.ballot.clone());

        let (accepted_ballot, accepted_value) = match &self.accepted {
            Some((ballot, value)) => (Some(ballot.clone()), Some(value.clone())),
            None => (None, None),
        };
        Some(PromiseMessage {
            sender: self.local.clone(),
            configuration_id: self.configuration_id,
            ballot: msg.ballot.clone(),
            accepted_ballot,
            accepted_value,
        })
    }

    /// Proposer: collect Promises; on a majority, return the Propose to
    /// broadcast. The value is the highest-ballot accepted value among the
    /// promises, or our own proposal when no acceptor has accepted anything.
    pub fn on_promise(&mut self, msg: &PromiseMessage) -> Option<ProposeMessage> {
        if self.stale(msg.configuration_id) || self.proposed {
            return None;
        }
        let current = self.current_ballot.as_ref()?;
        if msg.ballot != *current {
            return None;
        }
        if !self.promisers.insert(msg.sender.clone()) {
            return None;
        }
        self.promises.push(msg.clone());

        if self.promises.len() < self.majority() {
            return None;
        }

        let inherited = self
            .promises
            .iter()
            .filter_map(|p| {
                p.accepted_ballot
                    .clone()
                    .zip(p.accepted_value.clone())
            })
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, value)| value);

        let value = match inherited.or_else(|| self.proposal_value.clone()) {
            Some(value) => value,
            None => return None,
        };

        self.proposed = true;
        Some(ProposeMessage {
            sender: self.local.clone(),
            configuration_id: self.configuration_id,
            ballot: current.clone(),
            value,
        })
    }

    /// Acceptor: accept a Propose whose ballot is current, and return the
    /// Accept to broadcast to all learners.
    pub fn on_propose(&mut self, msg: &ProposeMessage) -> Option<AcceptMessage> {
        if self.stale(msg.configuration_id) {
            return None;
        }
        self.observe_round(&msg.ballot);

        if let Some(promised) = &self.promised {
            if msg.ballot < *promised {
                return None;
            }
        }
        self.promised = Some(msg.ballot.clone());
        self.accepted = Some((msg.ballot.clone(), msg.value.clone()));

        Some(AcceptMessage {
            sender: self.local.clone(),
            configuration_id: self.configuration_id,
            ballot: msg.ballot.clone(),
            value: msg.value.clone(),
        })
    }

    /// Learner: tally Accepts; a strict majority for one (ballot, value)
    /// decides it.
    pub fn on_accept(&mut self, msg: &AcceptMessage) -> Option<Vec<Endpoint>> {
        if self.stale(msg.configuration_id) {
            return None;
        }
        self.observe_round(&msg.ballot);

        let key = (msg.ballot.clone(), msg.value.clone());
        let supporters = self.accept_tally.entry(key).or_default();
        supporters.insert(msg.sender.clone());

        if supporters.len() >= self.majority() {
            self.decided = true;
            tracing::info!(
                "Classic round decided configuration change {:?}",
                msg.value
            );
            return Some(msg.value.clone());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(port: u16) -> Endpoint {
        Endpoint::new("127.0.0.1", port)
    }

    fn value(ports: &[u16]) -> Vec<Endpoint> {
        ports.iter().map(|p| node(*p)).collect()
    }

    /// Drives a full round among three in-memory nodes and checks that all
    /// of them learn the proposer's value.
    #[test]
    fn test_round_trip_three_nodes() {
        let peers = [node(1000), node(1001), node(1002)];
        let mut nodes: Vec<ClassicPaxos> = peers
            .iter()
            .map(|ep| ClassicPaxos::new(ep.clone(), 9, 3))
            .collect();

        let proposal = value(&[7777]);
        let prepare = nodes[0].start_round(proposal.clone());

        let promises: Vec<PromiseMessage> = nodes
            .iter_mut()
            .filter_map(|n| n.on_prepare(&prepare))
            .collect();
        assert_eq!(promises.len(), 3);

        let mut propose = None;
        for promise in &promises {
            if let Some(p) = nodes[0].on_promise(promise) {
                propose = Some(p);
            }
        }
        let propose = propose.expect("majority of promises must yield a propose");
        assert_eq!(propose.value, proposal);

        let accepts: Vec<AcceptMessage> = nodes
            .iter_mut()
            .filter_map(|n| n.on_propose(&propose))
            .collect();
        assert_eq!(accepts.len(), 3);

        for learner in nodes.iter_mut() {
            let mut decision = None;
            for accept in &accepts {
                if let Some(d) = learner.on_accept(accept) {
                    decision = Some(d);
                }
            }
            assert_eq!(decision, Some(proposal.clone()));
            assert!(learner.has_decided());
        }
    }

    #[test]
    fn test_acceptor_rejects_stale_ballot() {
        let mut acceptor = ClassicPaxos::new(node(1000), 9, 3);

        let high = PrepareMessage {
            sender: node(1001),
            configuration_id: 9,
            ballot: Ballot {
                round: 5,
                proposer: node(1001).to_string(),
            },
        };
        assert!(acceptor.on_prepare(&high).is_some());

        let low = PrepareMessage {
            sender: node(1002),
            configuration_id: 9,
            ballot: Ballot {
                round: 3,
                proposer: node(1002).to_string(),
            },
        };
        assert!(acceptor.on_prepare(&low).is_none());
    }

    #[test]
    fn test_proposer_adopts_highest_accepted_value() {
        let mut proposer = ClassicPaxos::new(node(1000), 9, 3);
        let prepare = proposer.start_round(value(&[7777]));

        let old = Ballot {
            round: 1,
            proposer: node(1001).to_string(),
        };
        let older = Ballot {
            round: 1,
            proposer: node(1000).to_string(),
        };

        let promise_with_value = PromiseMessage {
            sender: node(1001),
            configuration_id: 9,
            ballot: prepare.ballot.clone(),
            accepted_ballot: Some(old),
            accepted_value: Some(value(&[8888])),
        };
        let promise_with_older_value = PromiseMessage {
            sender: node(1002),
            configuration_id: 9,
            ballot: prepare.ballot.clone(),
            accepted_ballot: Some(older),
            accepted_value: Some(value(&[6666])),
        };

        assert!(proposer.on_promise(&promise_with_value).is_none());
        let propose = proposer
            .on_promise(&promise_with_older_value)
            .expect("majority reached");

        // The previously accepted value with the highest ballot wins over
        // both the older acceptance and our own proposal.
        assert_eq!(propose.value, value(&[8888]));
    }

    #[test]
    fn test_duplicate_promises_do_not_fake_majority() {
        let mut proposer = ClassicPaxos::new(node(1000), 9, 5);
        let prepare = proposer.start_round(value(&[7777]));

        let promise = PromiseMessage {
            sender: node(1001),
            configuration_id: 9,
            ballot: prepare.ballot.clone(),
            accepted_ballot: None,
            accepted_value: None,
        };
        assert!(proposer.on_promise(&promise).is_none());
        assert!(proposer.on_promise(&promise).is_none());
        assert!(proposer.on_promise(&promise).is_none());
    }

    #[test]
    fn test_accept_majority_decides_once() {
        let mut learner = ClassicPaxos::new(node(1000), 9, 3);
        let ballot = Ballot {
            round: 2,
            proposer: node(1001).to_string(),
        };

        let accept = |sender: Endpoint| AcceptMessage {
            sender,
            configuration_id: 9,
            ballot: ballot.clone(),
            value: value(&[7777]),
        };

        assert!(learner.on_accept(&accept(node(1001))).is_none());
        assert_eq!(learner.on_accept(&accept(node(1002))), Some(value(&[7777])));
        // Decided: further accepts cannot decide again.
        assert!(learner.on_accept(&accept(node(1000))).is_none());
    }

    #[test]
    fn test_round_derives_from_highest_observed() {
        let mut paxos = ClassicPaxos::new(node(1000), 9, 3);
        assert_eq!(paxos.next_round(), 1);

        let prepare = PrepareMessage {
            sender: node(1001),
            configuration_id: 9,
            ballot: Ballot {
                round: 6,
                proposer: node(1001).to_string(),
            },
        };
        paxos.on_prepare(&prepare);
        assert_eq!(paxos.next_round(), 7);
    }

    #[test]
    fn test_stale_configuration_is_ignored() {
        let mut paxos = ClassicPaxos::new(node(1000), 9, 3);
        let prepare = PrepareMessage {
            sender: node(1001),
            configuration_id: 8,
            ballot: Ballot {
                round: 1,
                proposer: node(1001).to_string(),
            },
        };
        assert!(paxos.on_prepare(&prepare).is_none());
    }
}
