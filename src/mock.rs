use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::rpc::{Heartbeat, HeartbeatResponse, Inbound, RpcDriver, VoteRequest, VoteResponse};

#[derive(Debug, Default)]
struct Registry {
    routes: HashMap<String, mpsc::Sender<Inbound>>,
    // Severed links, stored in both directions.
    severed: HashSet<(String, String)>,
}

impl Registry {
    fn reachable(&self, from: &str, to: &str) -> Option<mpsc::Sender<Inbound>> {
        if self.severed.contains(&(from.to_string(), to.to_string())) {
            return None;
        }
        self.routes.get(to).cloned()
    }
}

/// In-process transport connecting nodes within one process over channels.
///
/// Clone the same `MockRpc` into every node of a cluster. Link cuts via
/// [`sever`](MockRpc::sever) and [`isolate`](MockRpc::isolate) make
/// unreachable peers fail with a transport error, which the nodes treat as a
/// missed round.
#[derive(Debug, Clone, Default)]
pub struct MockRpc {
    inner: Arc<Mutex<Registry>>,
}

impl MockRpc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cut the link between two nodes, in both directions.
    pub fn sever(&self, a: &str, b: &str) {
        let mut reg = self.lock();
        reg.severed.insert((a.to_string(), b.to_string()));
        reg.severed.insert((b.to_string(), a.to_string()));
    }

    /// Restore a previously severed link.
    pub fn heal(&self, a: &str, b: &str) {
        let mut reg = self.lock();
        reg.severed.remove(&(a.to_string(), b.to_string()));
        reg.severed.remove(&(b.to_string(), a.to_string()));
    }

    /// Cut every link touching `node_id`.
    pub fn isolate(&self, node_id: &str) {
        let peers: Vec<String> = self.peers(node_id);
        for peer in peers {
            self.sever(node_id, &peer);
        }
    }

    /// Restore every link touching `node_id`.
    pub fn rejoin(&self, node_id: &str) {
        let mut reg = self.lock();
        reg.severed
            .retain(|(a, b)| a != node_id && b != node_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        // The registry mutex is never held across an await and the closures
        // touching it cannot panic, so poisoning is unreachable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn deliver(&self, from: &str, to: &str, message: Inbound) -> Result<()> {
        let route = self
            .lock()
            .reachable(from, to)
            .ok_or_else(|| Error::Transport(format!("peer {to} unreachable")))?;
        route
            .send(message)
            .await
            .map_err(|_| Error::Transport(format!("peer {to} is gone")))
    }
}

#[async_trait]
impl RpcDriver for MockRpc {
    fn register(&self, node_id: &str, inbound: mpsc::Sender<Inbound>) -> Result<()> {
        let mut reg = self.lock();
        if reg.routes.contains_key(node_id) {
            return Err(Error::Transport(format!(
                "node {node_id} is already registered"
            )));
        }
        reg.routes.insert(node_id.to_string(), inbound);
        Ok(())
    }

    fn unregister(&self, node_id: &str) {
        self.lock().routes.remove(node_id);
    }

    fn peers(&self, node_id: &str) -> Vec<String> {
        self.lock()
            .routes
            .keys()
            .filter(|id| id.as_str() != node_id)
            .cloned()
            .collect()
    }

    async fn request_vote(&self, peer: &str, request: VoteRequest) -> Result<VoteResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let from = request.candidate.clone();
        self.deliver(
            &from,
            peer,
            Inbound::VoteRequest {
                request,
                reply: reply_tx,
            },
        )
        .await?;
        reply_rx
            .await
            .map_err(|_| Error::Transport(format!("peer {peer} dropped the request")))
    }

    async fn send_heartbeat(
        &self,
        peer: &str,
        heartbeat: Heartbeat,
    ) -> Result<HeartbeatResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let from = heartbeat.leader.clone();
        self.deliver(
            &from,
            peer,
            Inbound::Heartbeat {
                heartbeat,
                reply: reply_tx,
            },
        )
        .await?;
        reply_rx
            .await
            .map_err(|_| Error::Transport(format!("peer {peer} dropped the heartbeat")))
    }
}
