//! Transport Module
//!
//! Two planes carry the protocol, following the split between best-effort
//! and request/response traffic:
//!
//! - **UDP plane**: the node's listen address carries bincode-encoded
//!   [`protocol::ProtocolMessage`]s. The broadcast layer fans out here with
//!   no delivery guarantee beyond per-destination FIFO from one sender.
//! - **HTTP plane**: listen port + 1000 serves the join and probe RPCs with
//!   JSON bodies, explicit deadlines, and bounded client-side retries.
//!
//! Both planes only ever hand work into the protocol loop's mailbox; no
//! protocol state lives here.

pub mod broadcast;
pub mod client;
pub mod protocol;
pub mod server;
