//! Consensus on configuration changes.
//!
//! Agreement runs in two gears. The fast path decides without coordination
//! when a supermajority of members independently announce the identical
//! proposal; any two fast quorums of `floor(3N/4) + 1` members intersect in
//! more than N/2 members, so at most one value can win. If the fast window
//! lapses undecided, the node falls back to classic single-decree Paxos with
//! randomized proposer backoff.
//!
//! Both gears are pure state machines: they consume messages and return the
//! messages to send or the decided value, leaving all I/O to the protocol
//! loop. All state is scoped to one configuration id and discarded on view
//! change.

pub mod classic;
pub mod fast;

pub use classic::ClassicPaxos;
pub use fast::{fast_quorum_size, FastPaxos};
