//! Public cluster API.
//!
//! Applications create a [`Cluster`] either by bootstrapping a seed with
//! [`Cluster::start`] or by joining an existing cluster through a seed with
//! [`Cluster::join`]. Both return a live cluster handle or a terminal
//! [`ClusterError`]; there is no half-joined state.
//!
//! ```no_run
//! use ringmesh::cluster::{Cluster, ClusterOptions};
//! use ringmesh::membership::types::Endpoint;
//!
//! # async fn example() -> Result<(), ringmesh::cluster::ClusterError> {
//! let seed = Cluster::start(Endpoint::new("127.0.0.1", 1234), ClusterOptions::default()).await?;
//! let node = Cluster::join(
//!     Endpoint::new("127.0.0.1", 1235),
//!     Endpoint::new("127.0.0.1", 1234),
//!     ClusterOptions::default(),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod join;

use crate::detector::{
    LinkFailureDetector, LinkFailureDetectorFactory, PingPongDetectorFactory,
};
use crate::membership::service::{ClusterSnapshot, MembershipService, ProtocolEvent};
use crate::membership::types::{
    ClusterEvent, Endpoint, NodeId, Settings, SubscriberCallback,
};
use crate::membership::view::{ConfigurationId, MembershipView};
use crate::transport::broadcast::{Interceptor, UdpBroadcaster};
use crate::transport::client::RpcClient;
use crate::transport::server::{self, ServerContext};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

/// Terminal failures surfaced by `start` and `join`.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("membership rejected by {0}")]
    Rejected(Endpoint),
    #[error("join attempt unsuccessful after {0} attempts")]
    JoinFailed(usize),
    #[error("failed to bind listen address: {0}")]
    BindFailed(#[from] std::io::Error),
    #[error("cluster is shutting down")]
    ShuttingDown,
}

/// Bootstrap options. Interceptors exist for tests that need to drop
/// messages at the transport boundary.
#[derive(Clone, Default)]
pub struct ClusterOptions {
    /// Static application tags for the local node, e.g. "role" -> "frontend".
    pub metadata: HashMap<String, String>,
    /// Detector factory; the ping-pong detector is used when absent.
    pub detector_factory: Option<Arc<dyn LinkFailureDetectorFactory>>,
    pub outbound_interceptors: Vec<Arc<dyn Interceptor>>,
    pub inbound_interceptors: Vec<Arc<dyn Interceptor>>,
    pub settings: Settings,
}

struct NodeTasks {
    loop_task: JoinHandle<()>,
    http_task: JoinHandle<()>,
    udp_task: JoinHandle<()>,
    prober_task: JoinHandle<()>,
}

impl NodeTasks {
    fn abort_all(&self) {
        self.loop_task.abort();
        self.http_task.abort();
        self.udp_task.abort();
        self.prober_task.abort();
    }
}

/// Handle to a running member node.
pub struct Cluster {
    listen: Endpoint,
    event_tx: mpsc::Sender<ProtocolEvent>,
    snapshot: Arc<RwLock<ClusterSnapshot>>,
    tasks: Mutex<Option<NodeTasks>>,
}

impl Cluster {
    /// Bootstraps a new single-member cluster at `listen`.
    pub async fn start(listen: Endpoint, options: ClusterOptions) -> Result<Cluster, ClusterError> {
        let node_id = NodeId::new();
        tracing::info!("Bootstrapping seed {} as {}", listen, node_id);

        let view = MembershipView::new(
            options.settings.k,
            vec![node_id],
            vec![listen.clone()],
        );

        let mut cluster_metadata = HashMap::new();
        if !options.metadata.is_empty() {
            cluster_metadata.insert(listen.to_string(), options.metadata.clone());
        }

        start_node(listen, view, cluster_metadata, options).await
    }

    /// Joins the cluster that `seed` belongs to.
    pub async fn join(
        listen: Endpoint,
        seed: Endpoint,
        options: ClusterOptions,
    ) -> Result<Cluster, ClusterError> {
        join::join_cluster(listen, seed, options).await
    }

    /// Members of the current configuration, sorted by endpoint string form.
    pub fn member_list(&self) -> Vec<Endpoint> {
        self.snapshot
            .read()
            .map(|snapshot| snapshot.endpoints.clone())
            .unwrap_or_default()
    }

    pub fn membership_size(&self) -> usize {
        self.snapshot
            .read()
            .map(|snapshot| snapshot.endpoints.len())
            .unwrap_or(0)
    }

    pub fn configuration_id(&self) -> ConfigurationId {
        self.snapshot
            .read()
            .map(|snapshot| snapshot.configuration_id)
            .unwrap_or_default()
    }

    /// Application tags for all members, keyed by endpoint string form.
    pub fn metadata(&self) -> HashMap<String, HashMap<String, String>> {
        self.snapshot
            .read()
            .map(|snapshot| snapshot.metadata.clone())
            .unwrap_or_default()
    }

    /// Registers a callback for a cluster event. Callbacks run on the
    /// protocol loop and must not block.
    pub async fn subscribe(
        &self,
        event: ClusterEvent,
        callback: SubscriberCallback,
    ) -> Result<(), ClusterError> {
        self.event_tx
            .send(ProtocolEvent::Subscribe { event, callback })
            .await
            .map_err(|_| ClusterError::ShuttingDown)
    }

    /// Drains the protocol loop and tears the transport down. In-flight RPC
    /// futures resolve with a shutdown-status error at their callers.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down {}", self.listen);

        let (done, finished) = oneshot::channel();
        if self
            .event_tx
            .send(ProtocolEvent::Shutdown { done })
            .await
            .is_ok()
        {
            let _ = finished.await;
        }

        if let Some(tasks) = self.tasks.lock().await.take() {
            tasks.abort_all();
        }
    }
}

impl std::fmt::Display for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cluster:{}", self.listen)
    }
}

/// Brings a node up around an already-known view: bind the UDP plane, wire
/// the detector, spawn the protocol loop, the transport tasks, and the probe
/// runner. Shared by the seed bootstrap and the tail of a successful join.
pub(crate) async fn start_node(
    listen: Endpoint,
    view: MembershipView,
    cluster_metadata: HashMap<String, HashMap<String, String>>,
    options: ClusterOptions,
) -> Result<Cluster, ClusterError> {
    let settings = options.settings.clone();

    let socket = UdpSocket::bind(listen.to_string())
        .await
        .map_err(ClusterError::BindFailed)?;
    let socket = Arc::new(socket);

    let client = Arc::new(RpcClient::new(settings.clone()));
    let factory = options.detector_factory.clone().unwrap_or_else(|| {
        Arc::new(PingPongDetectorFactory {
            settings: settings.clone(),
        })
    });
    let detector = factory.create(listen.clone(), client.clone());

    let broadcaster = UdpBroadcaster::new(
        listen.clone(),
        socket.clone(),
        options.outbound_interceptors.clone(),
    );

    let snapshot = Arc::new(RwLock::new(ClusterSnapshot::default()));
    let observed_peers = Arc::new(RwLock::new(Vec::new()));
    let (event_tx, event_rx) = mpsc::channel(1024);

    let service = MembershipService::new(
        listen.clone(),
        settings.clone(),
        view,
        cluster_metadata,
        broadcaster,
        detector.clone(),
        snapshot.clone(),
        observed_peers.clone(),
        event_tx.clone(),
    );

    let context = Arc::new(ServerContext {
        event_tx: event_tx.clone(),
        detector: detector.clone(),
    });
    let transport = server::start(
        &listen,
        socket,
        context,
        options.inbound_interceptors.clone(),
    )
    .await
    .map_err(ClusterError::BindFailed)?;

    let loop_task = tokio::spawn(service.run(event_rx));
    let prober_task = tokio::spawn(probe_loop(
        detector,
        observed_peers,
        event_tx.clone(),
        settings.probe_interval,
    ));

    Ok(Cluster {
        listen,
        event_tx,
        snapshot,
        tasks: Mutex::new(Some(NodeTasks {
            loop_task,
            http_task: transport.http_task,
            udp_task: transport.udp_task,
            prober_task,
        })),
    })
}

/// Drives the failure detector: one probe cycle per interval across the
/// observed peers, surfacing flipped verdicts into the protocol loop.
async fn probe_loop(
    detector: Arc<dyn LinkFailureDetector>,
    observed_peers: Arc<RwLock<Vec<Endpoint>>>,
    event_tx: mpsc::Sender<ProtocolEvent>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let peers = match observed_peers.read() {
            Ok(guard) => guard.clone(),
            Err(_) => Vec::new(),
        };
        if peers.is_empty() {
            continue;
        }

        futures::future::join_all(peers.iter().map(|peer| detector.check(peer))).await;

        for peer in peers {
            if detector.has_failed(&peer)
                && event_tx
                    .send(ProtocolEvent::EdgeFailed { observed: peer })
                    .await
                    .is_err()
            {
                // Protocol loop is gone.
                return;
            }
        }
    }
}
