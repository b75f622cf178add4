use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{ClusterInfo, Timings};
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::persist::{TermRecord, TermStore};
use crate::rpc::{Heartbeat, HeartbeatResponse, Inbound, RpcDriver, VoteRequest, VoteResponse};
use crate::state::{ElectionState, State};
use crate::timer::random_election_timeout;

/// Messages funnelled back into the event loop by outbound fan-out tasks.
#[derive(Debug)]
enum Control {
    /// A peer answered a vote request sent during the election round whose
    /// term is `round`.
    VoteReply { round: u64, response: VoteResponse },
    /// A peer acknowledged a heartbeat.
    HeartbeatReply { response: HeartbeatResponse },
}

/// A consensus participant: elects and follows a single leader per term.
///
/// All state transitions are serialized through one event loop; the handle
/// only observes. Construction spawns the loop onto the current tokio
/// runtime, so a `Node` must be created from within one.
pub struct Node {
    id: String,
    cluster: ClusterInfo,
    shared: Arc<RwLock<ElectionState>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Creates and starts a node with default [`Timings`].
    ///
    /// The term/vote record is restored from `persist_path` (zero values if
    /// nothing was ever written). Fails with `Error::Config` for an invalid
    /// cluster description and `Error::Storage`/`Error::Corrupt` if the
    /// persistence path cannot be opened or holds a damaged record.
    pub fn new(
        cluster: ClusterInfo,
        handler: Arc<dyn Handler>,
        rpc: Arc<dyn RpcDriver>,
        persist_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        Self::with_timings(cluster, handler, rpc, persist_path, Timings::default())
    }

    /// As [`Node::new`] with explicit timing parameters.
    pub fn with_timings(
        cluster: ClusterInfo,
        handler: Arc<dyn Handler>,
        rpc: Arc<dyn RpcDriver>,
        persist_path: impl Into<PathBuf>,
        timings: Timings,
    ) -> Result<Self> {
        if cluster.name.is_empty() {
            return Err(Error::Config("cluster name must not be empty".into()));
        }
        if cluster.size < 1 {
            return Err(Error::Config("cluster size must be at least 1".into()));
        }
        timings.validate()?;

        let store = TermStore::open(persist_path)?;
        let record = store.load()?;
        let id = format!("{}.{}", cluster.name, Uuid::new_v4());
        let shared = Arc::new(RwLock::new(ElectionState::new(
            record.current_term,
            record.voted_for,
        )));

        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let (control_tx, control_rx) = mpsc::channel(64);
        rpc.register(&id, inbound_tx)?;

        tracing::info!(
            node_id = %id,
            cluster = %cluster.name,
            term = record.current_term,
            "Starting election node"
        );

        let cancel = CancellationToken::new();
        let inner = NodeInner {
            id: id.clone(),
            cluster: cluster.clone(),
            timings,
            handler,
            rpc,
            store,
            shared: shared.clone(),
            control_tx,
        };
        let task = tokio::spawn(inner.run(inbound_rx, control_rx, cancel.clone()));

        Ok(Self {
            id,
            cluster,
            shared,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    /// This node's identity within the cluster.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Static description of the cluster this node participates in.
    pub fn cluster(&self) -> &ClusterInfo {
        &self.cluster
    }

    /// Current state machine position.
    pub async fn state(&self) -> State {
        self.shared.read().await.state
    }

    /// Identity of the last known leader, if any.
    pub async fn leader(&self) -> Option<String> {
        self.shared.read().await.leader.clone()
    }

    pub async fn current_term(&self) -> u64 {
        self.shared.read().await.current_term
    }

    /// Stops the event loop: timers are dropped and the node deregisters
    /// from the RPC driver before the loop exits.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct NodeInner {
    id: String,
    cluster: ClusterInfo,
    timings: Timings,
    handler: Arc<dyn Handler>,
    rpc: Arc<dyn RpcDriver>,
    store: TermStore,
    shared: Arc<RwLock<ElectionState>>,
    control_tx: mpsc::Sender<Control>,
}

impl NodeInner {
    /// The event loop: the single serialization point for every transition.
    ///
    /// Election and heartbeat timing each use one rescheduled deadline, so
    /// there is never more than one live timer per purpose.
    async fn run(
        self,
        mut inbound_rx: mpsc::Receiver<Inbound>,
        mut control_rx: mpsc::Receiver<Control>,
        cancel: CancellationToken,
    ) {
        let mut election_deadline = self.next_election_deadline();
        let mut heartbeat_deadline = Instant::now() + self.timings.heartbeat_interval;

        loop {
            let state = self.shared.read().await.state;

            tokio::select! {
                _ = cancel.cancelled() => break,

                Some(inbound) = inbound_rx.recv() => match inbound {
                    Inbound::VoteRequest { request, reply } => {
                        self.handle_vote_request(request, reply, &mut election_deadline).await;
                    }
                    Inbound::Heartbeat { heartbeat, reply } => {
                        self.handle_heartbeat(heartbeat, reply, &mut election_deadline).await;
                    }
                },

                Some(control) = control_rx.recv() => match control {
                    Control::VoteReply { round, response } => {
                        self.handle_vote_reply(
                            round,
                            response,
                            &mut election_deadline,
                            &mut heartbeat_deadline,
                        )
                        .await;
                    }
                    Control::HeartbeatReply { response } => {
                        self.handle_heartbeat_reply(response, &mut election_deadline).await;
                    }
                },

                // Election timeout: no leader contact for followers and
                // candidates.
                _ = sleep_until(election_deadline), if state != State::Leader => {
                    self.start_election(&mut election_deadline, &mut heartbeat_deadline).await;
                }

                // Heartbeat tick for leaders.
                _ = sleep_until(heartbeat_deadline), if state == State::Leader => {
                    self.broadcast_heartbeats().await;
                    heartbeat_deadline = Instant::now() + self.timings.heartbeat_interval;
                }
            }
        }

        self.rpc.unregister(&self.id);
        tracing::info!(node_id = %self.id, "Election node stopped");
    }

    fn next_election_deadline(&self) -> Instant {
        Instant::now() + random_election_timeout(&self.timings)
    }

    /// Durably records `(term, voted_for)`. The caller updates the
    /// in-memory state only after this returns `true`.
    ///
    /// On failure the handler is told and the caller must abort whatever
    /// transition needed the persist. Remaining a stale follower beats
    /// violating one-vote-per-term.
    fn persist(&self, term: u64, voted_for: Option<&str>) -> bool {
        let record = TermRecord {
            current_term: term,
            voted_for: voted_for.map(str::to_string),
        };
        match self.store.save(&record) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(node_id = %self.id, term, error = %e, "Term persist failed");
                self.handler.async_error(e);
                false
            }
        }
    }

    fn notify(&self, from: State, to: State) {
        if from != to {
            tracing::info!(node_id = %self.id, from = %from, to = %to, "State change");
            self.handler.state_change(from, to);
        }
    }

    /// Election timeout fired: enter (or re-enter) candidacy and solicit
    /// votes from every peer.
    async fn start_election(
        &self,
        election_deadline: &mut Instant,
        heartbeat_deadline: &mut Instant,
    ) {
        let mut st = self.shared.write().await;
        let from = st.state;
        let next_term = st.current_term + 1;

        // The self-vote must be durable before any candidacy is visible.
        if !self.persist(next_term, Some(self.id.as_str())) {
            *election_deadline = self.next_election_deadline();
            return;
        }

        st.become_candidate(&self.id);
        drop(st);

        self.notify(from, State::Candidate);
        *election_deadline = self.next_election_deadline();

        tracing::info!(node_id = %self.id, term = next_term, "Starting election");

        // A single-member cluster wins on the implicit self-vote alone.
        if self.cluster.quorum() <= 1 {
            self.become_leader(heartbeat_deadline).await;
            return;
        }

        let request = VoteRequest {
            term: next_term,
            candidate: self.id.clone(),
            snapshot: self.handler.current_state(),
        };

        // Each peer is asked at most once per round; replies funnel back
        // into the loop tagged with the round's term so late ones from old
        // rounds are discarded.
        for peer in self.rpc.peers(&self.id) {
            let rpc = self.rpc.clone();
            let control = self.control_tx.clone();
            let request = request.clone();
            let rpc_timeout = self.timings.min_election_timeout;
            tokio::spawn(async move {
                match timeout(rpc_timeout, rpc.request_vote(&peer, request)).await {
                    Ok(Ok(response)) => {
                        let _ = control
                            .send(Control::VoteReply {
                                round: next_term,
                                response,
                            })
                            .await;
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(peer = %peer, error = %e, "Vote request failed");
                    }
                    Err(_) => {
                        tracing::debug!(peer = %peer, "Vote request timed out");
                    }
                }
            });
        }
    }

    /// A peer answered one of our vote requests.
    async fn handle_vote_reply(
        &self,
        round: u64,
        response: VoteResponse,
        election_deadline: &mut Instant,
        heartbeat_deadline: &mut Instant,
    ) {
        let mut st = self.shared.write().await;

        if response.term > st.current_term {
            let from = st.state;
            if self.persist(response.term, None) {
                st.become_follower(response.term);
                drop(st);
                self.notify(from, State::Follower);
                *election_deadline = self.next_election_deadline();
            }
            return;
        }

        // Late replies from earlier rounds, or replies arriving after the
        // election resolved, carry no weight.
        if st.state != State::Candidate || st.current_term != round || !response.granted {
            return;
        }

        st.votes_received += 1;
        tracing::debug!(
            node_id = %self.id,
            term = round,
            votes = st.votes_received,
            needed = self.cluster.quorum(),
            "Received vote"
        );

        if st.votes_received >= self.cluster.quorum() {
            drop(st);
            self.become_leader(heartbeat_deadline).await;
        }
    }

    /// Quorum reached: take leadership of the current term and assert it
    /// immediately.
    async fn become_leader(&self, heartbeat_deadline: &mut Instant) {
        {
            let mut st = self.shared.write().await;
            let from = st.state;
            st.become_leader(&self.id);
            let term = st.current_term;
            let votes = st.votes_received;
            drop(st);
            self.notify(from, State::Leader);
            tracing::info!(node_id = %self.id, term, votes, "Became leader");
        }
        *heartbeat_deadline = Instant::now() + self.timings.heartbeat_interval;
        self.broadcast_heartbeats().await;
    }

    /// A peer asked for our vote.
    async fn handle_vote_request(
        &self,
        request: VoteRequest,
        reply: oneshot::Sender<VoteResponse>,
        election_deadline: &mut Instant,
    ) {
        let mut st = self.shared.write().await;

        // A higher term is adopted (clearing any prior vote) before the
        // request is evaluated. If the adoption cannot be persisted the
        // request is refused outright.
        if request.term > st.current_term {
            let from = st.state;
            if !self.persist(request.term, None) {
                let term = st.current_term;
                drop(st);
                let _ = reply.send(VoteResponse {
                    term,
                    granted: false,
                });
                return;
            }
            st.become_follower(request.term);
            self.notify(from, State::Follower);
            *election_deadline = self.next_election_deadline();
        }

        let granted = if request.term < st.current_term {
            false
        } else if st
            .voted_for
            .as_ref()
            .is_some_and(|v| v != &request.candidate)
        {
            // Already committed to someone else this term.
            false
        } else if !self.handler.grant_vote(&request.snapshot) {
            false
        } else {
            // The grant must hit disk before the response leaves, else a
            // crash and restart could hand out a second vote this term.
            let recorded = self.persist(st.current_term, Some(request.candidate.as_str()));
            if recorded {
                st.voted_for = Some(request.candidate.clone());
            }
            recorded
        };

        if granted {
            *election_deadline = self.next_election_deadline();
        }

        let term = st.current_term;
        drop(st);

        tracing::debug!(
            node_id = %self.id,
            candidate = %request.candidate,
            term = request.term,
            granted,
            "Vote request answered"
        );

        let _ = reply.send(VoteResponse { term, granted });
    }

    /// A leader asserted itself to us.
    async fn handle_heartbeat(
        &self,
        heartbeat: Heartbeat,
        reply: oneshot::Sender<HeartbeatResponse>,
        election_deadline: &mut Instant,
    ) {
        let mut st = self.shared.write().await;

        // A stale leader gets our term back and nothing else happens. The
        // same goes for an equal-term assertion while we lead ourselves:
        // only a strictly higher term deposes a leader.
        if heartbeat.term < st.current_term
            || (heartbeat.term == st.current_term && st.state == State::Leader)
        {
            let term = st.current_term;
            drop(st);
            let _ = reply.send(HeartbeatResponse { term });
            return;
        }

        if heartbeat.term > st.current_term && !self.persist(heartbeat.term, None) {
            let term = st.current_term;
            drop(st);
            let _ = reply.send(HeartbeatResponse { term });
            return;
        }

        let from = st.state;
        st.become_follower(heartbeat.term);
        st.leader = Some(heartbeat.leader.clone());
        let term = st.current_term;
        drop(st);

        self.notify(from, State::Follower);
        *election_deadline = self.next_election_deadline();

        let _ = reply.send(HeartbeatResponse { term });
    }

    /// A peer acknowledged one of our heartbeats. Only a higher term in the
    /// acknowledgment matters: it deposes us.
    async fn handle_heartbeat_reply(
        &self,
        response: HeartbeatResponse,
        election_deadline: &mut Instant,
    ) {
        let mut st = self.shared.write().await;
        if response.term <= st.current_term {
            return;
        }

        let from = st.state;
        if self.persist(response.term, None) {
            st.become_follower(response.term);
            drop(st);
            self.notify(from, State::Follower);
            *election_deadline = self.next_election_deadline();
        }
    }

    /// Send a heartbeat to every peer concurrently.
    async fn broadcast_heartbeats(&self) {
        let st = self.shared.read().await;
        if st.state != State::Leader {
            return;
        }
        let heartbeat = Heartbeat {
            term: st.current_term,
            leader: self.id.clone(),
        };
        drop(st);

        for peer in self.rpc.peers(&self.id) {
            let rpc = self.rpc.clone();
            let control = self.control_tx.clone();
            let heartbeat = heartbeat.clone();
            let rpc_timeout = self.timings.min_election_timeout;
            tokio::spawn(async move {
                match timeout(rpc_timeout, rpc.send_heartbeat(&peer, heartbeat)).await {
                    Ok(Ok(response)) => {
                        let _ = control.send(Control::HeartbeatReply { response }).await;
                    }
                    Ok(Err(e)) => {
                        tracing::trace!(peer = %peer, error = %e, "Heartbeat failed");
                    }
                    Err(_) => {
                        tracing::trace!(peer = %peer, "Heartbeat timed out");
                    }
                }
            });
        }
    }
}
