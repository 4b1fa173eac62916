//! Default ping-pong failure detector.
//!
//! Probes every observed peer once per cycle over the HTTP plane and flips
//! the verdict to DOWN only after a bounded run of consecutive failures, so a
//! single dropped probe never surfaces as a failure.

use super::{LinkFailureDetector, LinkFailureDetectorFactory};
use crate::membership::types::{Endpoint, Settings};
use crate::transport::client::RpcClient;
use crate::transport::protocol::{ProbeMessage, ProbeResponse, ProbeStatus};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

pub struct PingPongDetector {
    local: Endpoint,
    client: Arc<RpcClient>,
    failure_threshold: u64,
    /// Consecutive probe failures per observed peer.
    failures: DashMap<Endpoint, u64>,
}

impl PingPongDetector {
    pub fn new(local: Endpoint, client: Arc<RpcClient>, failure_threshold: u64) -> Self {
        Self {
            local,
            client,
            failure_threshold,
            failures: DashMap::new(),
        }
    }
}

#[async_trait]
impl LinkFailureDetector for PingPongDetector {
    async fn check(&self, observed: &Endpoint) {
        let probe = ProbeMessage {
            sender: self.local.clone(),
        };

        match self.client.probe(observed, &probe).await {
            Ok(_) => {
                self.failures.insert(observed.clone(), 0);
            }
            Err(e) => {
                let mut misses = self.failures.entry(observed.clone()).or_insert(0);
                *misses += 1;
                tracing::debug!(
                    "Probe of {} failed ({} consecutive): {}",
                    observed,
                    *misses,
                    e
                );
            }
        }
    }

    fn has_failed(&self, observed: &Endpoint) -> bool {
        self.failures
            .get(observed)
            .map(|misses| *misses >= self.failure_threshold)
            .unwrap_or(false)
    }

    fn handle_probe(&self, incoming: &ProbeMessage) -> ProbeResponse {
        tracing::trace!("Answering probe from {}", incoming.sender);
        ProbeResponse {
            status: ProbeStatus::Ok,
        }
    }

    fn on_membership_change(&self, observed: Vec<Endpoint>) {
        // Drop counters for peers we no longer observe; start fresh ones for
        // peers new to our neighborhood.
        self.failures.retain(|peer, _| observed.contains(peer));
        for peer in observed {
            self.failures.entry(peer).or_insert(0);
        }
    }
}

/// The default factory, selected when the caller provides none.
pub struct PingPongDetectorFactory {
    pub settings: Settings,
}

impl LinkFailureDetectorFactory for PingPongDetectorFactory {
    fn create(&self, local: Endpoint, client: Arc<RpcClient>) -> Arc<dyn LinkFailureDetector> {
        Arc::new(PingPongDetector::new(
            local,
            client,
            self.settings.failure_threshold,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(threshold: u64) -> PingPongDetector {
        let client = Arc::new(RpcClient::new(Settings::default()));
        PingPongDetector::new(Endpoint::new("127.0.0.1", 5000), client, threshold)
    }

    #[tokio::test]
    async fn test_verdict_requires_consecutive_failures() {
        let detector = detector(3);
        let dead = Endpoint::new("127.0.0.1", 1); // nothing listens here

        detector.on_membership_change(vec![dead.clone()]);
        assert!(!detector.has_failed(&dead));

        detector.check(&dead).await;
        detector.check(&dead).await;
        assert!(!detector.has_failed(&dead), "below threshold");

        detector.check(&dead).await;
        assert!(detector.has_failed(&dead), "threshold reached");
    }

    #[tokio::test]
    async fn test_membership_change_resets_unobserved_peers() {
        let detector = detector(1);
        let dead = Endpoint::new("127.0.0.1", 1);

        detector.on_membership_change(vec![dead.clone()]);
        detector.check(&dead).await;
        assert!(detector.has_failed(&dead));

        detector.on_membership_change(vec![]);
        assert!(!detector.has_failed(&dead));
    }

    #[test]
    fn test_handle_probe_acknowledges() {
        let detector = detector(3);
        let response = detector.handle_probe(&ProbeMessage {
            sender: Endpoint::new("127.0.0.1", 6000),
        });
        assert_eq!(response.status, ProbeStatus::Ok);
    }
}
