//! Leader election and term management for a cluster of cooperating
//! processes, derived from the Raft consensus protocol.
//!
//! The crate elects and maintains a single leader per term; it does not
//! replicate a log. The transport ([`RpcDriver`]) and the application policy
//! surface ([`Handler`]) are injected, so any concrete network layer and any
//! vote-granting policy can be plugged in. [`MockRpc`] ships as an
//! in-process driver for tests and single-process clusters.

pub mod config;
pub mod error;
pub mod handler;
pub mod mock;
pub mod node;
pub mod persist;
pub mod rpc;
pub mod state;

mod timer;

pub use config::{ClusterInfo, Timings};
pub use error::{Error, Result};
pub use handler::{ChanHandler, Handler};
pub use mock::MockRpc;
pub use node::Node;
pub use rpc::{Heartbeat, HeartbeatResponse, Inbound, RpcDriver, VoteRequest, VoteResponse};
pub use state::State;
