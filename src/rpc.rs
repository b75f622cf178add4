use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;

/// Vote solicitation from a candidate.
///
/// The snapshot is the candidate's opaque application state, produced by its
/// `Handler::current_state` and judged by the receiver's
/// `Handler::grant_vote`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub term: u64,
    pub candidate: String,
    pub snapshot: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub term: u64,
    pub granted: bool,
}

/// Periodic leadership assertion from the current leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub term: u64,
    pub leader: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub term: u64,
}

/// Inbound traffic envelope delivered by the driver into a node's event
/// loop. The reply channel carries the node's response back to the driver.
#[derive(Debug)]
pub enum Inbound {
    VoteRequest {
        request: VoteRequest,
        reply: oneshot::Sender<VoteResponse>,
    },
    Heartbeat {
        heartbeat: Heartbeat,
        reply: oneshot::Sender<HeartbeatResponse>,
    },
}

/// Abstract transport between cluster members.
///
/// The node treats any transport error as an absent response for that round;
/// the next timer cycle retries naturally. Implementations decide peer
/// discovery, addressing, and wire encoding (the message types derive serde
/// for that purpose).
#[async_trait]
pub trait RpcDriver: Send + Sync + 'static {
    /// Register a node for inbound delivery. Called once during node
    /// construction, before the event loop starts.
    fn register(&self, node_id: &str, inbound: mpsc::Sender<Inbound>) -> Result<()>;

    /// Remove a node from inbound delivery. Called on shutdown; the driver
    /// must not deliver to the node afterwards.
    fn unregister(&self, node_id: &str);

    /// Identities of the other cluster members currently known to the
    /// transport, excluding `node_id` itself.
    fn peers(&self, node_id: &str) -> Vec<String>;

    /// Solicit a vote from one peer.
    async fn request_vote(&self, peer: &str, request: VoteRequest) -> Result<VoteResponse>;

    /// Assert leadership to one peer.
    async fn send_heartbeat(&self, peer: &str, heartbeat: Heartbeat)
        -> Result<HeartbeatResponse>;
}
