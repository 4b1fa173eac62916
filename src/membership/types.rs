use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Unique identifier for a node incarnation.
/// Wrapper around a UUID string so that a crash-restart on the same endpoint
/// is recognizably distinct from the previous incarnation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    /// Generates a new random UUID v4-based NodeId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A (host, port) pair identifying a process on the network.
///
/// Endpoints are totally ordered by their `host:port` string form. All ring
/// placement and member ordering relies on this, so the ordering must not be
/// changed to a numeric port comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Ord for Endpoint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl PartialOrd for Endpoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl From<Endpoint> for String {
    fn from(ep: Endpoint) -> String {
        ep.to_string()
    }
}

impl TryFrom<String> for Endpoint {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("invalid endpoint '{}': missing ':'", s))?;
        if host.is_empty() {
            return Err(format!("invalid endpoint '{}': empty host", s));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("invalid endpoint '{}': {}", s, e))?;
        Ok(Endpoint::new(host, port))
    }
}

/// A single ring-specific verdict from an observer about an observed endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EdgeStatus {
    Up,
    Down,
}

/// An ordered set of endpoints slated for an atomic membership change.
pub type Proposal = Vec<Endpoint>;

/// Cluster events an embedding application can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterEvent {
    /// The detection layer crystallized a stable proposal.
    ViewChangeProposal,
    /// A new configuration was committed and installed.
    ViewChange,
    /// The one-step consensus window lapsed without a decision.
    ViewChangeOneStepFailed,
    /// The local node is not part of the newly installed configuration.
    Kicked,
}

/// One entry of a view-change notification delivered to subscribers.
#[derive(Debug, Clone)]
pub struct NodeStatusChange {
    pub endpoint: Endpoint,
    pub status: EdgeStatus,
    pub metadata: HashMap<String, String>,
}

/// Subscriber callbacks run on the protocol loop and must not block.
pub type SubscriberCallback = Box<dyn Fn(&[NodeStatusChange]) + Send + 'static>;

/// Protocol tunables. The defaults reproduce the deployed constants; L < H <= K
/// is required and checked at service construction.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Number of observation rings.
    pub k: usize,
    /// High watermark: ring reports required to consider an endpoint stable.
    pub h: usize,
    /// Low watermark: ring reports after which an endpoint counts as unstable.
    pub l: usize,
    /// Interval between failure-detector probe cycles.
    pub probe_interval: Duration,
    /// Deadline for a single probe RPC.
    pub probe_timeout: Duration,
    /// Consecutive failed probes before an edge verdict flips to DOWN.
    pub failure_threshold: u64,
    /// Deadline for a generic request/response RPC.
    pub rpc_timeout: Duration,
    /// Bounded retries for request/response RPCs.
    pub rpc_retries: usize,
    /// Deadline for a join phase-2 RPC (the observer parks it until the next
    /// configuration commits).
    pub join_phase2_timeout: Duration,
    /// Bounded attempts for the whole join protocol.
    pub join_attempts: usize,
    /// Window during which outbound link updates are coalesced into one batch.
    pub batching_window: Duration,
    /// Window the fast path gets before falling back to classic Paxos.
    pub fast_round_timeout: Duration,
    /// Base delay for the randomized classic-Paxos proposer backoff.
    pub classic_round_base_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            k: 10,
            h: 9,
            l: 4,
            probe_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(1),
            failure_threshold: 5,
            rpc_timeout: Duration::from_secs(1),
            rpc_retries: 5,
            join_phase2_timeout: Duration::from_secs(5),
            join_attempts: 5,
            batching_window: Duration::from_millis(100),
            fast_round_timeout: Duration::from_secs(3),
            classic_round_base_delay: Duration::from_secs(1),
        }
    }
}
