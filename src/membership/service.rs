//! Membership Service
//!
//! The orchestrator binding topology, detection aggregation, consensus, and
//! the join protocol together.
//!
//! ## Protocol loop
//! All state-mutating work runs on a single task draining one mpsc mailbox:
//! inbound RPCs (with oneshot responders), link-update batches, consensus
//! messages, detector verdicts, and timer events. Transport I/O lives on
//! other tasks and only ever hands events into the mailbox, which pins every
//! non-commutative state transition to one logical thread.
//!
//! The loop never blocks on I/O: outbound broadcasts are fire-and-forget UDP
//! sends, timers are spawned sleeps that re-enter the loop as events, and
//! parked join responses are oneshot senders completed on view install.

use super::types::{
    ClusterEvent, EdgeStatus, Endpoint, NodeId, NodeStatusChange, Proposal, Settings,
    SubscriberCallback,
};
use super::view::{ConfigurationId, MembershipView};
use super::watermark::WatermarkBuffer;
use crate::consensus::{ClassicPaxos, FastPaxos};
use crate::detector::LinkFailureDetector;
use crate::transport::broadcast::UdpBroadcaster;
use crate::transport::protocol::{
    AcceptMessage, BatchedLinkUpdateMessage, ConsensusProposal, JoinMessage, JoinResponse,
    JoinStatusCode, LinkUpdate, PrepareMessage, PromiseMessage, ProposeMessage, ProtocolMessage,
    CONFIG_STREAM_CURRENT,
};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};

/// Read-only view of the cluster published for API callers. Replaced
/// wholesale on every view install; readers clone what they need.
#[derive(Debug, Clone, Default)]
pub struct ClusterSnapshot {
    pub endpoints: Vec<Endpoint>,
    pub configuration_id: ConfigurationId,
    pub metadata: HashMap<String, HashMap<String, String>>,
}

/// Everything the protocol loop reacts to.
pub enum ProtocolEvent {
    JoinPhase1 {
        msg: JoinMessage,
        reply: oneshot::Sender<JoinResponse>,
    },
    JoinPhase2 {
        msg: JoinMessage,
        reply: oneshot::Sender<JoinResponse>,
    },
    LinkUpdates(BatchedLinkUpdateMessage),
    FastRoundProposal(ConsensusProposal),
    Prepare(PrepareMessage),
    Promise(PromiseMessage),
    Propose(ProposeMessage),
    Accept(AcceptMessage),
    /// The probe runner saw an observed peer's verdict flip to DOWN.
    EdgeFailed { observed: Endpoint },
    /// The batching window closed; send the queued link updates.
    BatchFlush,
    FastRoundTimeout { configuration_id: ConfigurationId },
    StartClassicRound { configuration_id: ConfigurationId },
    Subscribe {
        event: ClusterEvent,
        callback: SubscriberCallback,
    },
    Shutdown { done: oneshot::Sender<()> },
}

pub struct MembershipService {
    local: Endpoint,
    settings: Settings,
    view: MembershipView,
    watermark: WatermarkBuffer,
    fast: FastPaxos,
    classic: ClassicPaxos,
    broadcaster: UdpBroadcaster,
    detector: Arc<dyn LinkFailureDetector>,
    snapshot: Arc<RwLock<ClusterSnapshot>>,
    observed_peers: Arc<RwLock<Vec<Endpoint>>>,
    subscriptions: HashMap<ClusterEvent, Vec<SubscriberCallback>>,
    /// Cluster-wide metadata keyed by endpoint string form.
    metadata: HashMap<String, HashMap<String, String>>,
    /// Identities gathered from UP link updates, needed to materialize the
    /// next configuration when a proposal containing joiners is decided.
    joiner_ids: HashMap<Endpoint, NodeId>,
    joiner_metadata: HashMap<Endpoint, HashMap<String, String>>,
    /// Phase-2 responders parked until the next configuration commits.
    parked_joiners: HashMap<Endpoint, Vec<oneshot::Sender<JoinResponse>>>,
    send_queue: Vec<LinkUpdate>,
    flush_scheduled: bool,
    fast_timer_scheduled: bool,
    one_step_failed_fired: bool,
    classic_round_pending: bool,
    /// Edges already reported DOWN in this configuration.
    reported_down: HashSet<Endpoint>,
    event_tx: mpsc::Sender<ProtocolEvent>,
}

impl MembershipService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local: Endpoint,
        settings: Settings,
        view: MembershipView,
        metadata: HashMap<String, HashMap<String, String>>,
        broadcaster: UdpBroadcaster,
        detector: Arc<dyn LinkFailureDetector>,
        snapshot: Arc<RwLock<ClusterSnapshot>>,
        observed_peers: Arc<RwLock<Vec<Endpoint>>>,
        event_tx: mpsc::Sender<ProtocolEvent>,
    ) -> Self {
        let configuration_id = view.configuration_id();
        let size = view.size();
        let service = Self {
            watermark: WatermarkBuffer::new(settings.k, settings.h, settings.l),
            fast: FastPaxos::new(configuration_id, size),
            classic: ClassicPaxos::new(local.clone(), configuration_id, size),
            local,
            settings,
            view,
            broadcaster,
            detector,
            snapshot,
            observed_peers,
            subscriptions: HashMap::new(),
            metadata,
            joiner_ids: HashMap::new(),
            joiner_metadata: HashMap::new(),
            parked_joiners: HashMap::new(),
            send_queue: Vec::new(),
            flush_scheduled: false,
            fast_timer_scheduled: false,
            one_step_failed_fired: false,
            classic_round_pending: false,
            reported_down: HashSet::new(),
            event_tx,
        };
        // Publish the bootstrap view before the loop spawns so API readers
        // and the probe runner never observe an empty snapshot.
        service.publish_snapshot();
        service.publish_observed_peers();
        service
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<ProtocolEvent>) {
        tracing::info!(
            "Protocol loop for {} running under configuration {}",
            self.local,
            self.view.configuration_id()
        );

        while let Some(event) = rx.recv().await {
            match event {
                ProtocolEvent::JoinPhase1 { msg, reply } => self.handle_join_phase1(msg, reply),
                ProtocolEvent::JoinPhase2 { msg, reply } => self.handle_join_phase2(msg, reply),
                ProtocolEvent::LinkUpdates(batch) => self.handle_link_updates(batch).await,
                ProtocolEvent::FastRoundProposal(proposal) => {
                    self.handle_fast_proposal(proposal).await
                }
                ProtocolEvent::Prepare(msg) => self.handle_prepare(msg).await,
                ProtocolEvent::Promise(msg) => self.handle_promise(msg).await,
                ProtocolEvent::Propose(msg) => self.handle_propose(msg).await,
                ProtocolEvent::Accept(msg) => self.handle_accept(msg).await,
                ProtocolEvent::EdgeFailed { observed } => self.handle_edge_failed(observed),
                ProtocolEvent::BatchFlush => self.flush_send_queue().await,
                ProtocolEvent::FastRoundTimeout { configuration_id } => {
                    self.handle_fast_round_timeout(configuration_id)
                }
                ProtocolEvent::StartClassicRound { configuration_id } => {
                    self.start_classic_round(configuration_id).await
                }
                ProtocolEvent::Subscribe { event, callback } => {
                    self.subscriptions.entry(event).or_default().push(callback);
                }
                ProtocolEvent::Shutdown { done } => {
                    let _ = done.send(());
                    break;
                }
            }
        }

        tracing::debug!("Protocol loop for {} exited", self.local);
    }

    // ------------------------------------------------------------------
    // Join handling
    // ------------------------------------------------------------------

    fn handle_join_phase1(&mut self, msg: JoinMessage, reply: oneshot::Sender<JoinResponse>) {
        let response = if self.view.is_host_present(&msg.sender) {
            tracing::info!(
                "Join phase 1: endpoint {} already in configuration {}",
                msg.sender,
                self.view.configuration_id()
            );
            self.full_view_response(JoinStatusCode::HostnameAlreadyInRing)
        } else if self.view.is_identifier_present(&msg.node_id) {
            tracing::info!(
                "Join phase 1: identifier {} already in configuration {}",
                msg.node_id,
                self.view.configuration_id()
            );
            self.full_view_response(JoinStatusCode::UuidAlreadyInRing)
        } else {
            let observers = self.view.expected_observers_of(&msg.sender);
            tracing::info!(
                "Join phase 1: {} is safe to join configuration {}; {} observer slots",
                msg.sender,
                self.view.configuration_id(),
                observers.len()
            );
            JoinResponse {
                sender: self.local.clone(),
                status: JoinStatusCode::SafeToJoin,
                configuration_id: self.view.configuration_id(),
                endpoints: observers,
                identifiers: Vec::new(),
                cluster_metadata: HashMap::new(),
            }
        };
        let _ = reply.send(response);
    }

    fn handle_join_phase2(&mut self, msg: JoinMessage, reply: oneshot::Sender<JoinResponse>) {
        let requested = msg.configuration_id.unwrap_or(CONFIG_STREAM_CURRENT);
        let current = self.view.configuration_id();

        if requested == CONFIG_STREAM_CURRENT {
            // A previous join of this endpoint already committed; stream the
            // current view back immediately.
            let _ = reply.send(self.full_view_response(JoinStatusCode::SafeToJoin));
            return;
        }

        if requested != current {
            tracing::info!(
                "Join phase 2 from {} names configuration {} but {} is current",
                msg.sender,
                requested,
                current
            );
            let _ = reply.send(self.full_view_response(JoinStatusCode::ConfigChanged));
            return;
        }

        tracing::info!(
            "Join phase 2: injecting UP reports for {} on rings {:?}",
            msg.sender,
            msg.ring_numbers
        );
        self.joiner_ids.insert(msg.sender.clone(), msg.node_id.clone());
        self.joiner_metadata
            .insert(msg.sender.clone(), msg.metadata.clone());
        self.parked_joiners
            .entry(msg.sender.clone())
            .or_default()
            .push(reply);

        for ring in &msg.ring_numbers {
            self.send_queue.push(LinkUpdate {
                link_src: self.local.clone(),
                link_dst: msg.sender.clone(),
                status: EdgeStatus::Up,
                ring_number: *ring,
                node_id: Some(msg.node_id.clone()),
                metadata: msg.metadata.clone(),
            });
        }
        self.schedule_flush();
    }

    /// Full current view, used by phase-2 responses and parked joiners.
    fn full_view_response(&self, status: JoinStatusCode) -> JoinResponse {
        JoinResponse {
            sender: self.local.clone(),
            status,
            configuration_id: self.view.configuration_id(),
            endpoints: self.view.ordered_members(),
            identifiers: self.view.ordered_identifiers(),
            cluster_metadata: self.metadata.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Link updates and proposals
    // ------------------------------------------------------------------

    fn schedule_flush(&mut self) {
        if self.flush_scheduled || self.send_queue.is_empty() {
            return;
        }
        self.flush_scheduled = true;
        let tx = self.event_tx.clone();
        let window = self.settings.batching_window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx.send(ProtocolEvent::BatchFlush).await;
        });
    }

    async fn flush_send_queue(&mut self) {
        self.flush_scheduled = false;
        if self.send_queue.is_empty() {
            return;
        }

        let batch = BatchedLinkUpdateMessage {
            sender: self.local.clone(),
            configuration_id: self.view.configuration_id(),
            updates: std::mem::take(&mut self.send_queue),
        };
        tracing::debug!(
            "Flushing {} link updates for configuration {}",
            batch.updates.len(),
            batch.configuration_id
        );

        let members = self.view.ordered_members();
        self.broadcaster
            .broadcast(&ProtocolMessage::LinkUpdateBatch(batch.clone()), &members)
            .await;
        self.handle_link_updates(batch).await;
    }

    async fn handle_link_updates(&mut self, batch: BatchedLinkUpdateMessage) {
        if batch.configuration_id != self.view.configuration_id() {
            tracing::debug!(
                "Dropping link-update batch from {} for configuration {} (current {})",
                batch.sender,
                batch.configuration_id,
                self.view.configuration_id()
            );
            return;
        }

        let mut relevant = Vec::with_capacity(batch.updates.len());
        for update in batch.updates {
            match update.status {
                EdgeStatus::Up => {
                    // UP reports announce joiners; one for an existing member
                    // is stale noise.
                    if self.view.is_host_present(&update.link_dst) {
                        continue;
                    }
                    if let Some(id) = &update.node_id {
                        self.joiner_ids
                            .entry(update.link_dst.clone())
                            .or_insert_with(|| id.clone());
                    }
                    if !update.metadata.is_empty() {
                        self.joiner_metadata
                            .entry(update.link_dst.clone())
                            .or_insert_with(|| update.metadata.clone());
                    }
                    relevant.push(update);
                }
                EdgeStatus::Down => {
                    // DOWN reports only make sense for current members.
                    if !self.view.is_host_present(&update.link_dst) {
                        continue;
                    }
                    relevant.push(update);
                }
            }
        }

        if let Some(proposal) = self.watermark.aggregate(&relevant) {
            self.announce_proposal(proposal).await;
        }
    }

    async fn announce_proposal(&mut self, proposal: Proposal) {
        tracing::info!(
            "Stable proposal {:?} for configuration {}",
            proposal,
            self.view.configuration_id()
        );

        let changes = self.status_changes(&proposal);
        self.notify(ClusterEvent::ViewChangeProposal, &changes);

        self.fast.register_local_vote(proposal.clone());
        let vote = ConsensusProposal {
            sender: self.local.clone(),
            configuration_id: self.view.configuration_id(),
            endpoints: proposal,
        };
        let members = self.view.ordered_members();
        self.broadcaster
            .broadcast(&ProtocolMessage::FastRoundProposal(vote.clone()), &members)
            .await;
        self.handle_fast_proposal(vote).await;
    }

    fn status_changes(&self, proposal: &[Endpoint]) -> Vec<NodeStatusChange> {
        proposal
            .iter()
            .map(|endpoint| {
                if self.view.is_host_present(endpoint) {
                    NodeStatusChange {
                        endpoint: endpoint.clone(),
                        status: EdgeStatus::Down,
                        metadata: self
                            .metadata
                            .get(&endpoint.to_string())
                            .cloned()
                            .unwrap_or_default(),
                    }
                } else {
                    NodeStatusChange {
                        endpoint: endpoint.clone(),
                        status: EdgeStatus::Up,
                        metadata: self
                            .joiner_metadata
                            .get(endpoint)
                            .cloned()
                            .unwrap_or_default(),
                    }
                }
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Consensus
    // ------------------------------------------------------------------

    async fn handle_fast_proposal(&mut self, proposal: ConsensusProposal) {
        if proposal.configuration_id != self.view.configuration_id() {
            tracing::debug!(
                "Dropping fast-round vote from {} for configuration {}",
                proposal.sender,
                proposal.configuration_id
            );
            return;
        }

        // Any node seeing fast-round traffic arms the fallback window, even
        // if its own buffer never emitted a proposal.
        self.schedule_fast_round_timeout();

        if let Some(value) = self.fast.on_proposal(&proposal) {
            tracing::info!(
                "Fast path decided {:?} for configuration {}",
                value,
                self.view.configuration_id()
            );
            self.on_decide(value);
        }
    }

    fn schedule_fast_round_timeout(&mut self) {
        if self.fast_timer_scheduled {
            return;
        }
        self.fast_timer_scheduled = true;
        let tx = self.event_tx.clone();
        let configuration_id = self.view.configuration_id();
        let window = self.settings.fast_round_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx
                .send(ProtocolEvent::FastRoundTimeout { configuration_id })
                .await;
        });
    }

    fn handle_fast_round_timeout(&mut self, configuration_id: ConfigurationId) {
        if configuration_id != self.view.configuration_id()
            || self.fast.has_decided()
            || self.classic.has_decided()
        {
            return;
        }

        if !self.one_step_failed_fired {
            self.one_step_failed_fired = true;
            tracing::warn!(
                "Fast round for configuration {} expired without a decision",
                configuration_id
            );
            let proposal = self
                .fast
                .local_vote()
                .cloned()
                .or_else(|| self.fast.most_voted())
                .unwrap_or_default();
            let changes = self.status_changes(&proposal);
            self.notify(ClusterEvent::ViewChangeOneStepFailed, &changes);
        }
        self.schedule_classic_round(configuration_id);
    }

    /// Schedules a classic round after a randomized backoff in
    /// `[0, base * 2^round)`, which keeps duelling proposers apart.
    fn schedule_classic_round(&mut self, configuration_id: ConfigurationId) {
        if self.classic_round_pending {
            return;
        }
        self.classic_round_pending = true;

        let round = self.classic.next_round().min(16);
        let ceiling =
            self.settings.classic_round_base_delay.as_millis() as u64 * (1u64 << round);
        let backoff = rand::thread_rng().gen_range(0..ceiling.max(1));

        tracing::debug!(
            "Scheduling classic round for configuration {} in {}ms",
            configuration_id,
            backoff
        );
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
            let _ = tx
                .send(ProtocolEvent::StartClassicRound { configuration_id })
                .await;
        });
    }

    async fn start_classic_round(&mut self, configuration_id: ConfigurationId) {
        self.classic_round_pending = false;
        if configuration_id != self.view.configuration_id()
            || self.fast.has_decided()
            || self.classic.has_decided()
        {
            return;
        }

        let value = match self
            .fast
            .local_vote()
            .cloned()
            .or_else(|| self.fast.most_voted())
        {
            Some(value) => value,
            // Nothing to propose; stay a pure acceptor.
            None => return,
        };

        let prepare = self.classic.start_round(value);
        let members = self.view.ordered_members();
        self.broadcaster
            .broadcast(&ProtocolMessage::Prepare(prepare.clone()), &members)
            .await;

        // Promise our own prepare.
        if let Some(promise) = self.classic.on_prepare(&prepare) {
            self.handle_promise(promise).await;
        }

        // Re-arm the backoff so a stalled round is retried at a higher round
        // until a decision or a view change invalidates it.
        self.schedule_classic_round(configuration_id);
    }

    async fn handle_prepare(&mut self, msg: PrepareMessage) {
        if let Some(promise) = self.classic.on_prepare(&msg) {
            self.broadcaster
                .send_one(&ProtocolMessage::Promise(promise), &msg.sender)
                .await;
        }
    }

    async fn handle_promise(&mut self, msg: PromiseMessage) {
        if let Some(propose) = self.classic.on_promise(&msg) {
            let members = self.view.ordered_members();
            self.broadcaster
                .broadcast(&ProtocolMessage::Propose(propose.clone()), &members)
                .await;
            // Accept our own proposal.
            self.handle_propose(propose).await;
        }
    }

    async fn handle_propose(&mut self, msg: ProposeMessage) {
        if let Some(accept) = self.classic.on_propose(&msg) {
            let members = self.view.ordered_members();
            self.broadcaster
                .broadcast(&ProtocolMessage::Accept(accept.clone()), &members)
                .await;
            self.handle_accept(accept).await;
        }
    }

    async fn handle_accept(&mut self, msg: AcceptMessage) {
        if let Some(value) = self.classic.on_accept(&msg) {
            self.on_decide(value);
        }
    }

    // ------------------------------------------------------------------
    // Failure reports
    // ------------------------------------------------------------------

    fn handle_edge_failed(&mut self, observed: Endpoint) {
        if !self.view.is_host_present(&observed) {
            return;
        }
        if !self.reported_down.insert(observed.clone()) {
            return;
        }

        let rings = self.view.rings_observed_on(&self.local, &observed);
        tracing::info!(
            "Observed peer {} failed; reporting DOWN on rings {:?}",
            observed,
            rings
        );
        for ring in rings {
            self.send_queue.push(LinkUpdate {
                link_src: self.local.clone(),
                link_dst: observed.clone(),
                status: EdgeStatus::Down,
                ring_number: ring,
                node_id: None,
                metadata: HashMap::new(),
            });
        }
        self.schedule_flush();
    }

    // ------------------------------------------------------------------
    // View installation
    // ------------------------------------------------------------------

    fn on_decide(&mut self, decided: Vec<Endpoint>) {
        let changes = self.status_changes(&decided);

        let mut endpoints = Vec::with_capacity(self.view.size() + decided.len());
        let mut identifiers = Vec::with_capacity(self.view.size() + decided.len());
        for (endpoint, id) in self
            .view
            .ordered_members()
            .into_iter()
            .zip(self.view.ordered_identifiers())
        {
            if decided.contains(&endpoint) {
                continue; // departing member
            }
            endpoints.push(endpoint);
            identifiers.push(id);
        }
        for endpoint in &decided {
            if self.view.is_host_present(endpoint) {
                continue; // handled above as a departure
            }
            match self.joiner_ids.get(endpoint) {
                Some(id) => {
                    endpoints.push(endpoint.clone());
                    identifiers.push(id.clone());
                }
                None => {
                    debug_assert!(false, "no identifier recorded for joiner {}", endpoint);
                    tracing::error!(
                        "No identifier recorded for joiner {}; dropping it from the next view",
                        endpoint
                    );
                }
            }
        }

        let new_view = MembershipView::new(self.settings.k, identifiers, endpoints);
        self.install(new_view, changes);
    }

    fn install(&mut self, new_view: MembershipView, changes: Vec<NodeStatusChange>) {
        // Fold joiner metadata in, drop departed members' metadata.
        for change in &changes {
            match change.status {
                EdgeStatus::Up => {
                    if let Some(md) = self.joiner_metadata.remove(&change.endpoint) {
                        self.metadata.insert(change.endpoint.to_string(), md);
                    }
                }
                EdgeStatus::Down => {
                    self.metadata.remove(&change.endpoint.to_string());
                }
            }
        }

        self.view = new_view;
        let configuration_id = self.view.configuration_id();

        // Discard all per-configuration protocol state.
        self.watermark.clear();
        self.fast = FastPaxos::new(configuration_id, self.view.size());
        self.classic = ClassicPaxos::new(self.local.clone(), configuration_id, self.view.size());
        self.fast_timer_scheduled = false;
        self.one_step_failed_fired = false;
        self.classic_round_pending = false;
        self.send_queue.clear();
        self.reported_down.clear();
        self.joiner_ids.clear();
        self.joiner_metadata.clear();

        self.publish_snapshot();
        self.publish_observed_peers();

        tracing::info!(
            "Installed configuration {} with {} members",
            configuration_id,
            self.view.size()
        );

        if self.view.is_host_present(&self.local) {
            self.notify(ClusterEvent::ViewChange, &changes);
        } else {
            tracing::warn!(
                "Local node {} is not part of configuration {}",
                self.local,
                configuration_id
            );
            let kicked = vec![NodeStatusChange {
                endpoint: self.local.clone(),
                status: EdgeStatus::Down,
                metadata: HashMap::new(),
            }];
            self.notify(ClusterEvent::Kicked, &kicked);
        }

        // Answer every parked phase-2 joiner with the new configuration.
        let parked = std::mem::take(&mut self.parked_joiners);
        if !parked.is_empty() {
            let response = self.full_view_response(JoinStatusCode::SafeToJoin);
            for (joiner, repliers) in parked {
                tracing::debug!("Answering parked join of {}", joiner);
                for reply in repliers {
                    let _ = reply.send(response.clone());
                }
            }
        }
    }

    fn publish_snapshot(&self) {
        let snapshot = ClusterSnapshot {
            endpoints: self.view.ordered_members(),
            configuration_id: self.view.configuration_id(),
            metadata: self.metadata.clone(),
        };
        if let Ok(mut slot) = self.snapshot.write() {
            *slot = snapshot;
        }
    }

    fn publish_observed_peers(&self) {
        let mut observed = self.view.observed_by(&self.local).unwrap_or_default();
        observed.sort();
        observed.dedup();

        if let Ok(mut slot) = self.observed_peers.write() {
            *slot = observed.clone();
        }
        self.detector.on_membership_change(observed);
    }

    /// Delivers an event to its subscribers. A panicking callback is caught,
    /// logged, and isolated from the loop.
    fn notify(&self, event: ClusterEvent, changes: &[NodeStatusChange]) {
        if let Some(callbacks) = self.subscriptions.get(&event) {
            for callback in callbacks {
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| callback(changes)));
                if outcome.is_err() {
                    tracing::error!("Subscriber callback for {:?} panicked", event);
                }
            }
        }
    }
}
