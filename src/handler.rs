use tokio::sync::mpsc;

use crate::error::Error;
use crate::state::State;

/// Application callback surface.
///
/// All methods are invoked synchronously from the node's event loop and must
/// not block, or they will stall the node's consensus progress.
pub trait Handler: Send + Sync + 'static {
    /// Fire-and-forget notification of a non-fatal internal error, such as a
    /// persistence failure that aborted a transition.
    fn async_error(&self, error: Error);

    /// Notified on every state machine transition.
    fn state_change(&self, from: State, to: State);

    /// Supplies the opaque application snapshot attached to this node's
    /// outbound vote requests.
    fn current_state(&self) -> Vec<u8>;

    /// Policy gate consulted before granting a vote, given the requesting
    /// candidate's snapshot. Returning `false` withholds the vote even when
    /// the term/vote bookkeeping would allow it.
    fn grant_vote(&self, candidate_state: &[u8]) -> bool;
}

/// A `Handler` that forwards errors and state changes over channels and
/// grants every vote. Convenient for callers that would rather poll channels
/// than implement the trait.
pub struct ChanHandler {
    error_tx: mpsc::UnboundedSender<Error>,
    state_tx: mpsc::UnboundedSender<(State, State)>,
}

impl ChanHandler {
    /// Returns the handler plus the receiving ends of its error and
    /// state-change channels.
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<Error>,
        mpsc::UnboundedReceiver<(State, State)>,
    ) {
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = mpsc::unbounded_channel();
        (Self { error_tx, state_tx }, error_rx, state_rx)
    }
}

impl Handler for ChanHandler {
    fn async_error(&self, error: Error) {
        let _ = self.error_tx.send(error);
    }

    fn state_change(&self, from: State, to: State) {
        let _ = self.state_tx.send((from, to));
    }

    fn current_state(&self) -> Vec<u8> {
        Vec::new()
    }

    fn grant_vote(&self, _candidate_state: &[u8]) -> bool {
        true
    }
}
