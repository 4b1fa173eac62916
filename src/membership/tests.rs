//! Membership Module Tests
//!
//! Validates the cluster membership protocol end to end over loopback.
//!
//! ## Test Scopes
//! - **Data Structures**: identity types and wire-form serialization.
//! - **Bootstrap**: seed-only start and the two-phase join protocol.
//! - **Churn**: batched concurrent joins, observer-reported failures, and
//!   the events subscribers see along the way.
//! - **Versioning**: configuration-id round trips and stale-configuration
//!   idempotence.

#[cfg(test)]
mod tests {
    use crate::cluster::{Cluster, ClusterOptions};
    use crate::detector::testing::{StaticFailureDetector, StaticFailureDetectorFactory};
    use crate::membership::types::{ClusterEvent, EdgeStatus, Endpoint, NodeId, Settings};
    use crate::membership::view::MembershipView;
    use crate::transport::protocol::{
        BatchedLinkUpdateMessage, JoinResponse, JoinStatusCode, LinkUpdate, ProtocolMessage,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    async fn wait_for<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        condition()
    }

    fn local(port: u16) -> Endpoint {
        Endpoint::new("127.0.0.1", port)
    }

    // ============================================================
    // DATA STRUCTURE TESTS
    // ============================================================

    #[test]
    fn test_node_id_is_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();

        assert_ne!(id1, id2, "Each NodeId should be unique");
    }

    #[test]
    fn test_node_id_is_canonical_uuid_text() {
        let id = NodeId::new();
        assert_eq!(id.0.len(), 36);
        assert_eq!(id.0.matches('-').count(), 4);
    }

    #[test]
    fn test_endpoint_parse_round_trip() {
        let ep: Endpoint = "192.168.1.5:4000".parse().unwrap();
        assert_eq!(ep.host, "192.168.1.5");
        assert_eq!(ep.port, 4000);
        assert_eq!(ep.to_string(), "192.168.1.5:4000");

        assert!("no-port".parse::<Endpoint>().is_err());
        assert!(":4000".parse::<Endpoint>().is_err());
        assert!("host:notaport".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_endpoint_order_follows_string_form() {
        // "...:10" sorts before "...:9" lexicographically.
        let nine = local(9);
        let ten = local(10);
        assert!(ten < nine);
    }

    #[test]
    fn test_join_response_json_round_trip() {
        let response = JoinResponse {
            sender: local(5000),
            status: JoinStatusCode::SafeToJoin,
            configuration_id: -3823,
            endpoints: vec![local(5000), local(5001)],
            identifiers: vec![NodeId::new(), NodeId::new()],
            cluster_metadata: HashMap::from([(
                "127.0.0.1:5000".to_string(),
                HashMap::from([("role".to_string(), "seed".to_string())]),
            )]),
        };

        let json = serde_json::to_string(&response).expect("Serialization failed");
        let restored: JoinResponse = serde_json::from_str(&json).expect("Deserialization failed");

        assert_eq!(restored.status, JoinStatusCode::SafeToJoin);
        assert_eq!(restored.configuration_id, response.configuration_id);
        assert_eq!(restored.endpoints, response.endpoints);
        assert_eq!(restored.identifiers, response.identifiers);
    }

    // ============================================================
    // VERSIONING TESTS
    // ============================================================

    #[test]
    fn test_view_survives_join_response_round_trip() {
        let ids: Vec<NodeId> = (0..5).map(|_| NodeId::new()).collect();
        let eps: Vec<Endpoint> = (0..5).map(|i| local(7000 + i)).collect();
        let view = MembershipView::new(10, ids, eps);

        // The same (endpoints, identifiers) pairing a JoinResponse carries.
        let response = JoinResponse {
            sender: local(7000),
            status: JoinStatusCode::SafeToJoin,
            configuration_id: view.configuration_id(),
            endpoints: view.ordered_members(),
            identifiers: view.ordered_identifiers(),
            cluster_metadata: HashMap::new(),
        };
        let json = serde_json::to_string(&response).unwrap();
        let restored: JoinResponse = serde_json::from_str(&json).unwrap();

        let rebuilt = MembershipView::new(10, restored.identifiers, restored.endpoints);
        assert_eq!(rebuilt.configuration_id(), view.configuration_id());
    }

    // ============================================================
    // BOOTSTRAP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_seed_only_start() {
        let seed_addr = local(36110);
        let seed = Cluster::start(seed_addr.clone(), ClusterOptions::default())
            .await
            .expect("seed must start");

        assert_eq!(seed.member_list(), vec![seed_addr]);
        assert_eq!(seed.membership_size(), 1);

        seed.shutdown().await;
    }

    #[tokio::test]
    async fn test_single_join() {
        let seed_addr = local(36210);
        let joiner_addr = local(36211);

        let seed = Cluster::start(seed_addr.clone(), ClusterOptions::default())
            .await
            .expect("seed must start");
        let c0 = seed.configuration_id();

        let view_changes: Arc<Mutex<Vec<(Endpoint, EdgeStatus)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let sink = view_changes.clone();
        seed.subscribe(
            ClusterEvent::ViewChange,
            Box::new(move |changes| {
                let mut seen = sink.lock().unwrap();
                for change in changes {
                    seen.push((change.endpoint.clone(), change.status));
                }
            }),
        )
        .await
        .unwrap();

        let mut options = ClusterOptions::default();
        options
            .metadata
            .insert("role".to_string(), "worker".to_string());
        let joiner = Cluster::join(joiner_addr.clone(), seed_addr.clone(), options)
            .await
            .expect("join must succeed");

        // Both nodes agree on the new two-member configuration within the
        // bound the protocol promises.
        let converged = wait_for(
            || {
                seed.membership_size() == 2
                    && joiner.membership_size() == 2
                    && seed.configuration_id() == joiner.configuration_id()
            },
            Duration::from_secs(2),
        )
        .await;
        assert!(converged, "seed and joiner did not converge");

        let expected = vec![seed_addr.clone(), joiner_addr.clone()];
        assert_eq!(seed.member_list(), expected);
        assert_eq!(joiner.member_list(), expected);
        assert_ne!(seed.configuration_id(), c0);

        // The subscriber saw the joiner come up.
        let seen = view_changes.lock().unwrap().clone();
        assert_eq!(seen, vec![(joiner_addr.clone(), EdgeStatus::Up)]);

        // The joiner's metadata propagated into the cluster-wide map.
        let metadata = seed.metadata();
        assert_eq!(
            metadata
                .get(&joiner_addr.to_string())
                .and_then(|tags| tags.get("role")),
            Some(&"worker".to_string())
        );

        seed.shutdown().await;
        joiner.shutdown().await;
    }

    #[tokio::test]
    async fn test_parallel_join_is_one_transition() {
        // Widen the batching window so three concurrent phase-2 exchanges
        // coalesce into a single link-update batch at the seed.
        let settings = Settings {
            batching_window: Duration::from_millis(500),
            ..Settings::default()
        };
        let options = ClusterOptions {
            settings,
            ..ClusterOptions::default()
        };

        let seed_addr = local(36310);
        let seed = Cluster::start(seed_addr.clone(), options.clone())
            .await
            .expect("seed must start");
        let c0 = seed.configuration_id();

        let proposals: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = proposals.clone();
        seed.subscribe(
            ClusterEvent::ViewChangeProposal,
            Box::new(move |changes| {
                sink.lock().unwrap().push(changes.len());
            }),
        )
        .await
        .unwrap();

        let (b, c, d) = tokio::join!(
            Cluster::join(local(36311), seed_addr.clone(), options.clone()),
            Cluster::join(local(36312), seed_addr.clone(), options.clone()),
            Cluster::join(local(36313), seed_addr.clone(), options.clone()),
        );
        let b = b.expect("join of b must succeed");
        let c = c.expect("join of c must succeed");
        let d = d.expect("join of d must succeed");

        let nodes = [&seed, &b, &c, &d];
        let converged = wait_for(
            || {
                nodes.iter().all(|n| n.membership_size() == 4)
                    && nodes
                        .iter()
                        .all(|n| n.configuration_id() == seed.configuration_id())
            },
            Duration::from_secs(5),
        )
        .await;
        assert!(converged, "four nodes did not converge on one configuration");
        assert_ne!(seed.configuration_id(), c0);

        // One transition carrying all three joiners.
        let seen = proposals.lock().unwrap().clone();
        assert_eq!(seen, vec![3], "expected a single three-entry proposal");

        for node in nodes {
            node.shutdown().await;
        }
    }

    // ============================================================
    // CHURN TESTS
    // ============================================================

    #[tokio::test]
    async fn test_observer_reported_failure_removes_member() {
        // Script-driven detectors: the seed's detector will report the
        // joiner's edges as failed; the joiner's detector reports nothing.
        let seed_detector = StaticFailureDetector::new();
        let joiner_detector = StaticFailureDetector::new();

        let settings = Settings {
            probe_interval: Duration::from_millis(200),
            ..Settings::default()
        };
        let seed_options = ClusterOptions {
            settings: settings.clone(),
            detector_factory: Some(Arc::new(StaticFailureDetectorFactory {
                detector: seed_detector.clone(),
            })),
            ..ClusterOptions::default()
        };
        let joiner_options = ClusterOptions {
            settings,
            detector_factory: Some(Arc::new(StaticFailureDetectorFactory {
                detector: joiner_detector.clone(),
            })),
            ..ClusterOptions::default()
        };

        let seed_addr = local(36510);
        let joiner_addr = local(36511);
        let seed = Cluster::start(seed_addr.clone(), seed_options)
            .await
            .expect("seed must start");
        let joiner = Cluster::join(joiner_addr.clone(), seed_addr.clone(), joiner_options)
            .await
            .expect("join must succeed");

        assert!(
            wait_for(|| seed.membership_size() == 2, Duration::from_secs(2)).await,
            "join did not converge"
        );

        let kicked = Arc::new(AtomicBool::new(false));
        let flag = kicked.clone();
        joiner
            .subscribe(
                ClusterEvent::Kicked,
                Box::new(move |_| {
                    flag.store(true, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Flip the verdict: the seed now observes every edge to the joiner
        // as failed.
        seed_detector.mark_failed(joiner_addr.clone());

        let removed = wait_for(
            || seed.membership_size() == 1 && kicked.load(Ordering::SeqCst),
            Duration::from_secs(5),
        )
        .await;
        assert!(removed, "failed member was not removed");
        assert_eq!(seed.member_list(), vec![seed_addr]);

        seed.shutdown().await;
        joiner.shutdown().await;
    }

    #[tokio::test]
    async fn test_stale_configuration_batch_is_a_no_op() {
        let seed_addr = local(36410);
        let seed = Cluster::start(seed_addr.clone(), ClusterOptions::default())
            .await
            .expect("seed must start");
        let c0 = seed.configuration_id();

        // A full UP report set for a phantom joiner, but under a
        // configuration id the seed has never seen.
        let phantom = local(36419);
        let batch = BatchedLinkUpdateMessage {
            sender: phantom.clone(),
            configuration_id: c0 ^ 0x5ee5,
            updates: (0..10)
                .map(|ring| LinkUpdate {
                    link_src: phantom.clone(),
                    link_dst: phantom.clone(),
                    status: EdgeStatus::Up,
                    ring_number: ring,
                    node_id: Some(NodeId::new()),
                    metadata: HashMap::new(),
                })
                .collect(),
        };
        let encoded = bincode::serialize(&ProtocolMessage::LinkUpdateBatch(batch)).unwrap();
        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.send_to(&encoded, seed_addr.to_string()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(seed.membership_size(), 1, "stale batch must change nothing");
        assert_eq!(seed.configuration_id(), c0);

        seed.shutdown().await;
    }
}
