//! Inbound transport.
//!
//! Bridges both planes into the protocol loop: axum handlers on the HTTP
//! plane forward join RPCs as events carrying oneshot responders, and the UDP
//! receive loop decodes `ProtocolMessage`s into events. Probes never enter
//! the loop; the detector answers them directly from the handler, which is
//! why detectors must tolerate concurrent calls.

use super::broadcast::Interceptor;
use super::protocol::{
    JoinMessage, JoinResponse, ProbeMessage, ProbeResponse, ProtocolMessage, ENDPOINT_JOIN,
    ENDPOINT_JOIN_PHASE2, ENDPOINT_PROBE, HTTP_PORT_OFFSET,
};
use crate::detector::LinkFailureDetector;
use crate::membership::service::ProtocolEvent;
use crate::membership::types::Endpoint;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub struct ServerContext {
    pub event_tx: mpsc::Sender<ProtocolEvent>,
    pub detector: Arc<dyn LinkFailureDetector>,
}

/// Handles for the spawned transport tasks, aborted on shutdown.
pub struct TransportTasks {
    pub http_task: JoinHandle<()>,
    pub udp_task: JoinHandle<()>,
}

/// Binds the HTTP plane and spawns both receive loops.
pub async fn start(
    listen: &Endpoint,
    socket: Arc<UdpSocket>,
    context: Arc<ServerContext>,
    inbound_interceptors: Vec<Arc<dyn Interceptor>>,
) -> std::io::Result<TransportTasks> {
    let app = Router::new()
        .route(ENDPOINT_JOIN, post(handle_join_phase1))
        .route(ENDPOINT_JOIN_PHASE2, post(handle_join_phase2))
        .route(ENDPOINT_PROBE, post(handle_probe))
        .layer(Extension(context.clone()));

    let http_addr = format!("{}:{}", listen.host, listen.port + HTTP_PORT_OFFSET);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("HTTP plane listening on {}", http_addr);

    let http_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("HTTP server exited: {}", e);
        }
    });

    let udp_task = tokio::spawn(receive_loop(socket, context, inbound_interceptors));

    Ok(TransportTasks { http_task, udp_task })
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    context: Arc<ServerContext>,
    interceptors: Vec<Arc<dyn Interceptor>>,
) {
    let mut buf = vec![0u8; 65536];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => match bincode::deserialize::<ProtocolMessage>(&buf[..len]) {
                Ok(message) => {
                    let sender = message.sender().clone();
                    if !interceptors
                        .iter()
                        .all(|interceptor| interceptor.allow(&message, &sender))
                    {
                        tracing::trace!("Interceptor dropped inbound message from {}", sender);
                        continue;
                    }
                    if context.event_tx.send(to_event(message)).await.is_err() {
                        // Protocol loop is gone; nothing left to deliver to.
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to decode datagram from {}: {}", src, e);
                }
            },
            Err(e) => {
                tracing::error!("Failed to receive datagram: {}", e);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}

fn to_event(message: ProtocolMessage) -> ProtocolEvent {
    match message {
        ProtocolMessage::LinkUpdateBatch(batch) => ProtocolEvent::LinkUpdates(batch),
        ProtocolMessage::FastRoundProposal(proposal) => {
            ProtocolEvent::FastRoundProposal(proposal)
        }
        ProtocolMessage::Prepare(msg) => ProtocolEvent::Prepare(msg),
        ProtocolMessage::Promise(msg) => ProtocolEvent::Promise(msg),
        ProtocolMessage::Propose(msg) => ProtocolEvent::Propose(msg),
        ProtocolMessage::Accept(msg) => ProtocolEvent::Accept(msg),
    }
}

async fn handle_join_phase1(
    Extension(context): Extension<Arc<ServerContext>>,
    Json(msg): Json<JoinMessage>,
) -> Result<Json<JoinResponse>, StatusCode> {
    dispatch_join(context, msg, false).await
}

async fn handle_join_phase2(
    Extension(context): Extension<Arc<ServerContext>>,
    Json(msg): Json<JoinMessage>,
) -> Result<Json<JoinResponse>, StatusCode> {
    dispatch_join(context, msg, true).await
}

async fn dispatch_join(
    context: Arc<ServerContext>,
    msg: JoinMessage,
    phase2: bool,
) -> Result<Json<JoinResponse>, StatusCode> {
    let (reply, response) = oneshot::channel();
    let event = if phase2 {
        ProtocolEvent::JoinPhase2 { msg, reply }
    } else {
        ProtocolEvent::JoinPhase1 { msg, reply }
    };

    context
        .event_tx
        .send(event)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    let response = response
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(response))
}

async fn handle_probe(
    Extension(context): Extension<Arc<ServerContext>>,
    Json(msg): Json<ProbeMessage>,
) -> Json<ProbeResponse> {
    Json(context.detector.handle_probe(&msg))
}
