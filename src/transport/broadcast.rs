//! Best-effort broadcast over the shared UDP socket.
//!
//! Serializes a message once and fires it at every destination. There are no
//! delivery guarantees beyond per-destination FIFO from a single sender; the
//! layers above treat loss as the common case.

use super::protocol::ProtocolMessage;
use crate::membership::types::Endpoint;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Hook for dropping messages at the transport boundary. Used by tests to
/// simulate partitions and duelling proposers.
pub trait Interceptor: Send + Sync {
    /// Returns false to drop the message for this peer.
    fn allow(&self, message: &ProtocolMessage, peer: &Endpoint) -> bool;
}

pub struct UdpBroadcaster {
    local: Endpoint,
    socket: Arc<UdpSocket>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl UdpBroadcaster {
    pub fn new(
        local: Endpoint,
        socket: Arc<UdpSocket>,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Self {
        Self {
            local,
            socket,
            interceptors,
        }
    }

    fn allowed(&self, message: &ProtocolMessage, peer: &Endpoint) -> bool {
        self.interceptors
            .iter()
            .all(|interceptor| interceptor.allow(message, peer))
    }

    /// Fans the message out to every listed member except the local node.
    /// The caller applies its own copy directly on the protocol loop.
    pub async fn broadcast(&self, message: &ProtocolMessage, members: &[Endpoint]) {
        let encoded = match bincode::serialize(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Failed to serialize broadcast message: {}", e);
                return;
            }
        };

        for member in members {
            if *member == self.local {
                continue;
            }
            if !self.allowed(message, member) {
                tracing::trace!("Interceptor dropped broadcast to {}", member);
                continue;
            }
            if let Err(e) = self.socket.send_to(&encoded, member.to_string()).await {
                tracing::warn!("Failed to send broadcast to {}: {}", member, e);
            }
        }
    }

    /// Directed best-effort send, used for Paxos replies.
    pub async fn send_one(&self, message: &ProtocolMessage, peer: &Endpoint) {
        if *peer == self.local {
            return;
        }
        if !self.allowed(message, peer) {
            tracing::trace!("Interceptor dropped send to {}", peer);
            return;
        }
        match bincode::serialize(message) {
            Ok(bytes) => {
                if let Err(e) = self.socket.send_to(&bytes, peer.to_string()).await {
                    tracing::warn!("Failed to send to {}: {}", peer, e);
                }
            }
            Err(e) => tracing::error!("Failed to serialize message for {}: {}", peer, e),
        }
    }
}
