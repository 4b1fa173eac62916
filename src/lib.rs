//! Ringmesh: strongly consistent cluster membership.
//!
//! This library crate maintains a monotonically versioned view of which
//! processes are members of a cluster. Simultaneous joins and failures are
//! batched into atomic configuration changes, and every member observes the
//! same sequence of configurations in the same order.
//!
//! ## Architecture Modules
//! The protocol engine is composed of four subsystems plus their transport:
//!
//! - **`membership`**: the core engine. The multi-ring topology
//!   (`MembershipView`), the detection aggregator (`WatermarkBuffer`), and
//!   the orchestrating `MembershipService` with its single-threaded protocol
//!   loop.
//! - **`consensus`**: one-step agreement on configuration changes with a
//!   classic Paxos fallback when the fast quorum does not materialize.
//! - **`detector`**: pluggable per-edge failure detection; the default
//!   ping-pong detector debounces verdicts across probe cycles.
//! - **`transport`**: a UDP plane for best-effort protocol broadcast and an
//!   HTTP plane for the join and probe RPCs.
//! - **`cluster`**: the public API. `Cluster::start` bootstraps a seed,
//!   `Cluster::join` runs the two-phase bootstrap against one.

pub mod cluster;
pub mod consensus;
pub mod detector;
pub mod membership;
pub mod transport;

pub use cluster::{Cluster, ClusterError, ClusterOptions};
pub use membership::types::{ClusterEvent, EdgeStatus, Endpoint, NodeId, Settings};
