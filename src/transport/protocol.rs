//! Wire protocol types.
//!
//! Two planes carry the protocol, mirroring the split between fire-and-forget
//! and request/response traffic:
//!
//! - The UDP plane carries a bincode-encoded [`ProtocolMessage`]: link-update
//!   batches, fast-round proposals, and classic-Paxos messages. Loss is the
//!   common case and the aggregation layer is built for it.
//! - The HTTP plane (listen port + [`HTTP_PORT_OFFSET`]) carries the JSON
//!   request/response bodies for join phase 1, join phase 2, and probes.
//!
//! Endpoints serialize as `host:port`; node identifiers as their canonical
//! 36-character text form.

use crate::membership::types::{EdgeStatus, Endpoint, NodeId};
use crate::membership::view::ConfigurationId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The HTTP plane listens at the protocol port plus this offset.
pub const HTTP_PORT_OFFSET: u16 = 1000;

pub const ENDPOINT_JOIN: &str = "/membership/join";
pub const ENDPOINT_JOIN_PHASE2: &str = "/membership/join-phase2";
pub const ENDPOINT_PROBE: &str = "/membership/probe";

/// Sentinel configuration id meaning "stream me the current view".
pub const CONFIG_STREAM_CURRENT: ConfigurationId = -1;

/// Outcome of a join phase as judged by the seed or an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinStatusCode {
    SafeToJoin,
    UuidAlreadyInRing,
    HostnameAlreadyInRing,
    ConfigChanged,
    MembershipRejected,
}

/// Phase-1 and phase-2 join request. Phase 1 carries only the identity
/// fields; phase 2 adds the configuration to join and the ring numbers the
/// contacted observer is responsible for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinMessage {
    pub sender: Endpoint,
    pub node_id: NodeId,
    pub configuration_id: Option<ConfigurationId>,
    pub ring_numbers: Vec<u32>,
    pub metadata: HashMap<String, String>,
}

/// Response to either join phase. For a phase-1 `SafeToJoin` the endpoint
/// list carries the joiner's future observers; everywhere else it carries the
/// full member list positionally paired with `identifiers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub sender: Endpoint,
    pub status: JoinStatusCode,
    pub configuration_id: ConfigurationId,
    pub endpoints: Vec<Endpoint>,
    pub identifiers: Vec<NodeId>,
    pub cluster_metadata: HashMap<String, HashMap<String, String>>,
}

/// A single edge-status report. UP reports for joiners carry the joiner's
/// identity and metadata so that every aggregating node can materialize the
/// next configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkUpdate {
    pub link_src: Endpoint,
    pub link_dst: Endpoint,
    pub status: EdgeStatus,
    pub ring_number: u32,
    pub node_id: Option<NodeId>,
    pub metadata: HashMap<String, String>,
}

/// One or more link updates coalesced within a batching window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchedLinkUpdateMessage {
    pub sender: Endpoint,
    pub configuration_id: ConfigurationId,
    pub updates: Vec<LinkUpdate>,
}

/// A fast-round vote: the sender endorses this exact sorted member change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusProposal {
    pub sender: Endpoint,
    pub configuration_id: ConfigurationId,
    pub endpoints: Vec<Endpoint>,
}

/// Classic-Paxos ballot, ordered lexicographically by (round, proposer).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ballot {
    pub round: u64,
    pub proposer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareMessage {
    pub sender: Endpoint,
    pub configuration_id: ConfigurationId,
    pub ballot: Ballot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromiseMessage {
    pub sender: Endpoint,
    pub configuration_id: ConfigurationId,
    pub ballot: Ballot,
    pub accepted_ballot: Option<Ballot>,
    pub accepted_value: Option<Vec<Endpoint>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeMessage {
    pub sender: Endpoint,
    pub configuration_id: ConfigurationId,
    pub ballot: Ballot,
    pub value: Vec<Endpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptMessage {
    pub sender: Endpoint,
    pub configuration_id: ConfigurationId,
    pub ballot: Ballot,
    pub value: Vec<Endpoint>,
}

/// Failure-detector probe and its reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeMessage {
    pub sender: Endpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeStatus {
    Ok,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub status: ProbeStatus,
}

/// Everything carried over the UDP plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProtocolMessage {
    LinkUpdateBatch(BatchedLinkUpdateMessage),
    FastRoundProposal(ConsensusProposal),
    Prepare(PrepareMessage),
    Promise(PromiseMessage),
    Propose(ProposeMessage),
    Accept(AcceptMessage),
}

impl ProtocolMessage {
    /// The endpoint that originated this message.
    pub fn sender(&self) -> &Endpoint {
        match self {
            ProtocolMessage::LinkUpdateBatch(m) => &m.sender,
            ProtocolMessage::FastRoundProposal(m) => &m.sender,
            ProtocolMessage::Prepare(m) => &m.sender,
            ProtocolMessage::Promise(m) => &m.sender,
            ProtocolMessage::Propose(m) => &m.sender,
            ProtocolMessage::Accept(m) => &m.sender,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_serializes_as_host_port() {
        let ep = Endpoint::new("10.0.0.7", 4321);
        let json = serde_json::to_string(&ep).unwrap();
        assert_eq!(json, "\"10.0.0.7:4321\"");

        let back: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ep);
    }

    #[test]
    fn test_protocol_message_bincode_round_trip() {
        let msg = ProtocolMessage::LinkUpdateBatch(BatchedLinkUpdateMessage {
            sender: Endpoint::new("127.0.0.1", 5000),
            configuration_id: 42,
            updates: vec![LinkUpdate {
                link_src: Endpoint::new("127.0.0.1", 5000),
                link_dst: Endpoint::new("127.0.0.1", 5001),
                status: EdgeStatus::Up,
                ring_number: 3,
                node_id: Some(NodeId::new()),
                metadata: HashMap::from([("role".to_string(), "frontend".to_string())]),
            }],
        });

        let bytes = bincode::serialize(&msg).unwrap();
        let back: ProtocolMessage = bincode::deserialize(&bytes).unwrap();
        match back {
            ProtocolMessage::LinkUpdateBatch(batch) => {
                assert_eq!(batch.configuration_id, 42);
                assert_eq!(batch.updates.len(), 1);
                assert_eq!(batch.updates[0].ring_number, 3);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_ballot_order_is_lexicographic() {
        let low = Ballot {
            round: 1,
            proposer: "127.0.0.1:9000".to_string(),
        };
        let high_round = Ballot {
            round: 2,
            proposer: "127.0.0.1:1000".to_string(),
        };
        let high_proposer = Ballot {
            round: 1,
            proposer: "127.0.0.1:9001".to_string(),
        };

        assert!(low < high_round);
        assert!(low < high_proposer);
        assert!(high_proposer < high_round);
    }
}
