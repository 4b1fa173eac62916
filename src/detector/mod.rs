//! Link failure detection.
//!
//! Detection is per-edge: every node periodically checks the K peers it
//! observes on the rings and surfaces a DOWN verdict per observed endpoint.
//! The detector is pluggable; when the embedding application provides no
//! factory, the ping-pong implementation is used.
//!
//! Implementations must tolerate concurrent `check`/`has_failed`/
//! `handle_probe` calls from probe workers alongside serial
//! `on_membership_change` calls from the protocol loop.

pub mod ping_pong;

pub use ping_pong::{PingPongDetector, PingPongDetectorFactory};

use crate::membership::types::Endpoint;
use crate::transport::client::RpcClient;
use crate::transport::protocol::{ProbeMessage, ProbeResponse};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait LinkFailureDetector: Send + Sync {
    /// Performs one probe of an observed peer. Implementations may batch.
    async fn check(&self, observed: &Endpoint);

    /// Pure query of the current verdict for an observed peer.
    fn has_failed(&self, observed: &Endpoint) -> bool;

    /// Receiver side of the probe exchange, so detectors can be symmetric.
    fn handle_probe(&self, incoming: &ProbeMessage) -> ProbeResponse;

    /// Called on every view change with the new observed set.
    fn on_membership_change(&self, observed: Vec<Endpoint>);
}

/// Builds a detector for one node. The factory runs once per `Cluster`
/// bootstrap, after the transport exists.
pub trait LinkFailureDetectorFactory: Send + Sync {
    fn create(&self, local: Endpoint, client: Arc<RpcClient>) -> Arc<dyn LinkFailureDetector>;
}

/// Script-driven detector for tests: an edge fails iff its endpoint has been
/// marked failed. No probing happens.
#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::transport::protocol::ProbeStatus;
    use dashmap::DashSet;

    #[derive(Default)]
    pub struct StaticFailureDetector {
        failed: DashSet<Endpoint>,
    }

    impl StaticFailureDetector {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn mark_failed(&self, endpoint: Endpoint) {
            self.failed.insert(endpoint);
        }

        pub fn mark_recovered(&self, endpoint: &Endpoint) {
            self.failed.remove(endpoint);
        }
    }

    #[async_trait]
    impl LinkFailureDetector for StaticFailureDetector {
        async fn check(&self, _observed: &Endpoint) {}

        fn has_failed(&self, observed: &Endpoint) -> bool {
            self.failed.contains(observed)
        }

        fn handle_probe(&self, _incoming: &ProbeMessage) -> ProbeResponse {
            ProbeResponse {
                status: ProbeStatus::Ok,
            }
        }

        fn on_membership_change(&self, _observed: Vec<Endpoint>) {}
    }

    pub struct StaticFailureDetectorFactory {
        pub detector: Arc<StaticFailureDetector>,
    }

    impl LinkFailureDetectorFactory for StaticFailureDetectorFactory {
        fn create(
            &self,
            _local: Endpoint,
            _client: Arc<RpcClient>,
        ) -> Arc<dyn LinkFailureDetector> {
            self.detector.clone()
        }
    }
}
