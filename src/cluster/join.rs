//! Two-phase bootstrap protocol, joiner side.
//!
//! Phase 1 asks a seed whether the joiner may enter and which members will
//! observe it. Phase 2 fans out to those observers, each of which injects
//! synthetic UP reports for the joiner and answers once the next
//! configuration commits. The whole exchange is retried a bounded number of
//! times; exhaustion surfaces a terminal error and nothing is left running.

use super::{start_node, Cluster, ClusterError, ClusterOptions};
use crate::membership::types::{Endpoint, NodeId};
use crate::membership::view::MembershipView;
use crate::transport::client::RpcClient;
use crate::transport::protocol::{
    JoinMessage, JoinStatusCode, CONFIG_STREAM_CURRENT,
};
use std::collections::HashMap;

pub(crate) async fn join_cluster(
    listen: Endpoint,
    seed: Endpoint,
    options: ClusterOptions,
) -> Result<Cluster, ClusterError> {
    let settings = options.settings.clone();
    let client = RpcClient::new(settings.clone());
    let mut node_id = NodeId::new();

    for attempt in 0..settings.join_attempts {
        // Phase 1: learn the configuration to join and our future observers.
        let phase1 = JoinMessage {
            sender: listen.clone(),
            node_id: node_id.clone(),
            configuration_id: None,
            ring_numbers: Vec::new(),
            metadata: options.metadata.clone(),
        };
        let phase1_response = match client.send_join_phase1(&seed, &phase1).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Join message to seed {} failed: {}", seed, e);
                continue;
            }
        };

        let mut previous_join_succeeded = false;
        match phase1_response.status {
            JoinStatusCode::SafeToJoin => {}
            JoinStatusCode::UuidAlreadyInRing => {
                // Identifier collision: pick a fresh incarnation and retry.
                node_id = NodeId::new();
                continue;
            }
            JoinStatusCode::ConfigChanged => {
                // The seed's view advanced mid-protocol; same identifier,
                // new attempt.
                continue;
            }
            JoinStatusCode::HostnameAlreadyInRing => {
                // A previous phase 2 committed but its response was lost.
                // Ask the members to stream us the configuration instead.
                tracing::info!(
                    "{} already present in configuration {}; requesting a stream of the view",
                    listen,
                    phase1_response.configuration_id
                );
                previous_join_succeeded = true;
            }
            JoinStatusCode::MembershipRejected => {
                tracing::error!("Membership rejected by {}", phase1_response.sender);
                return Err(ClusterError::Rejected(phase1_response.sender));
            }
        }

        let configuration_to_join = if previous_join_succeeded {
            CONFIG_STREAM_CURRENT
        } else {
            phase1_response.configuration_id
        };
        if attempt > 0 {
            tracing::info!(
                "{} is retrying a join under configuration {}",
                listen,
                configuration_to_join
            );
        }

        // Phase 2: batch the K observer slots by endpoint, one message per
        // distinct observer listing the rings it is responsible for.
        let mut rings_per_observer: HashMap<Endpoint, Vec<u32>> = HashMap::new();
        for (ring, observer) in phase1_response.endpoints.iter().enumerate() {
            rings_per_observer
                .entry(observer.clone())
                .or_default()
                .push(ring as u32);
        }

        let calls = rings_per_observer.into_iter().map(|(observer, ring_numbers)| {
            let msg = JoinMessage {
                sender: listen.clone(),
                node_id: node_id.clone(),
                configuration_id: Some(configuration_to_join),
                ring_numbers,
                metadata: options.metadata.clone(),
            };
            let client = &client;
            async move {
                tracing::debug!(
                    "{} sending join phase 2 to {} for configuration {}",
                    msg.sender,
                    observer,
                    configuration_to_join
                );
                client.send_join_phase2(&observer, &msg).await
            }
        });

        for outcome in futures::future::join_all(calls).await {
            let response = match outcome {
                Ok(response) => response,
                Err(e) => {
                    tracing::info!("Join phase 2 call failed: {}", e);
                    continue;
                }
            };
            if response.status == JoinStatusCode::MembershipRejected {
                tracing::info!("Membership rejected by {}", response.sender);
                continue;
            }

            // Deliberately loose acceptance: any configuration other than the
            // one we asked to join counts as success, without checking that
            // we appear in it. This mirrors the deployed retry loop.
            if response.status == JoinStatusCode::SafeToJoin
                && response.configuration_id != configuration_to_join
            {
                tracing::info!(
                    "{} joined configuration {} with {} members",
                    listen,
                    response.configuration_id,
                    response.endpoints.len()
                );
                let view = MembershipView::new(
                    settings.k,
                    response.identifiers.clone(),
                    response.endpoints.clone(),
                );
                return start_node(
                    listen,
                    view,
                    response.cluster_metadata.clone(),
                    options.clone(),
                )
                .await;
            }
        }

        tracing::error!(
            "Join phase 2 by {} for configuration {} produced no usable response; retrying",
            listen,
            configuration_to_join
        );
    }

    Err(ClusterError::JoinFailed(settings.join_attempts))
}
