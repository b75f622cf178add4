/// Node role within the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Follower => write!(f, "follower"),
            State::Candidate => write!(f, "candidate"),
            State::Leader => write!(f, "leader"),
        }
    }
}

/// In-memory election position of a node.
///
/// Written only by the node's event loop; observed through `Arc<RwLock>` by
/// the public surface. `current_term` and `voted_for` mirror the durable
/// record and are only advanced after the corresponding persist succeeds.
#[derive(Debug)]
pub struct ElectionState {
    pub state: State,
    pub current_term: u64,
    pub voted_for: Option<String>,
    pub leader: Option<String>,
    pub votes_received: usize,
}

impl ElectionState {
    pub fn new(current_term: u64, voted_for: Option<String>) -> Self {
        Self {
            state: State::Follower,
            current_term,
            voted_for,
            leader: None,
            votes_received: 0,
        }
    }

    /// Fall back to follower at `term`. Clears the vote when the term
    /// actually advances; a vote already cast in `term` is kept.
    pub fn become_follower(&mut self, term: u64) {
        debug_assert!(term >= self.current_term);
        self.state = State::Follower;
        if term > self.current_term {
            self.current_term = term;
            self.voted_for = None;
            self.leader = None;
        }
        self.votes_received = 0;
    }

    /// Enter candidacy for the next term with an implicit self-vote.
    pub fn become_candidate(&mut self, my_id: &str) {
        self.state = State::Candidate;
        self.current_term += 1;
        self.voted_for = Some(my_id.to_string());
        self.votes_received = 1;
        self.leader = None;
    }

    /// Assume leadership of the current term.
    pub fn become_leader(&mut self, my_id: &str) {
        self.state = State::Leader;
        self.leader = Some(my_id.to_string());
    }
}
