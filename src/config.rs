use std::time::Duration;

use crate::error::{Error, Result};

/// Static description of the cluster a node belongs to.
///
/// Immutable after construction and shared read-only by the node. The name
/// namespaces RPC traffic; the size drives quorum arithmetic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub name: String,
    pub size: usize,
}

impl ClusterInfo {
    pub fn new(name: impl Into<String>, size: usize) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Config("cluster name must not be empty".into()));
        }
        if size < 1 {
            return Err(Error::Config("cluster size must be at least 1".into()));
        }
        Ok(Self { name, size })
    }

    /// Minimum number of votes needed to win an election.
    ///
    /// Always `size / 2 + 1`. An even-sized cluster gets no special
    /// treatment; it simply tolerates fewer simultaneous failures.
    pub fn quorum(&self) -> usize {
        self.size / 2 + 1
    }
}

/// Election and heartbeat timing parameters.
///
/// Fixed at node construction, not runtime-mutable. The heartbeat interval
/// must stay well below the minimum election timeout so followers do not
/// time out while a live leader is heartbeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub min_election_timeout: Duration,
    pub max_election_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        let min = Duration::from_millis(500);
        Self {
            min_election_timeout: min,
            // Conventionally 2x the minimum.
            max_election_timeout: 2 * min,
            heartbeat_interval: Duration::from_millis(100),
        }
    }
}

impl Timings {
    pub fn validate(&self) -> Result<()> {
        if self.max_election_timeout <= self.min_election_timeout {
            return Err(Error::Config(
                "max election timeout must exceed min election timeout".into(),
            ));
        }
        if self.heartbeat_interval >= self.min_election_timeout {
            return Err(Error::Config(
                "heartbeat interval must be strictly less than min election timeout".into(),
            ));
        }
        Ok(())
    }
}
