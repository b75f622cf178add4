//! Durability tests: restart recovery, corrupt records, and the
//! safety-over-liveness stall when the term store cannot be written.


use std::sync::Arc;
use std::time::Duration;

use ballot::persist::TermStore;
use ballot::{ClusterInfo, Error, MockRpc, Node, RpcDriver, State, VoteRequest};
use test_harness::{init_tracing, quiescent_timings, test_timings, TestHandler};

fn vote_request(term: u64, candidate: &str) -> VoteRequest {
    VoteRequest {
        term,
        candidate: candidate.to_string(),
        snapshot: Vec::new(),
    }
}

/// A restarted node comes back with the last persisted `(term, voted_for)`
/// pair and will not hand out a second vote for that term.
#[tokio::test]
async fn restart_recovers_term_and_vote() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("term.json");
    let info = ClusterInfo::new("recover", 3).unwrap();

    {
        let rpc = MockRpc::new();
        let node = Node::with_timings(
            info.clone(),
            TestHandler::new(),
            Arc::new(rpc.clone()),
            &path,
            quiescent_timings(),
        )
        .unwrap();

        let granted = rpc
            .request_vote(node.id(), vote_request(7, "candidate-x"))
            .await
            .unwrap();
        assert!(granted.granted);
        node.shutdown().await;
    }

    // What hit the disk is exactly the grant.
    let record = TermStore::open(&path).unwrap().load().unwrap();
    assert_eq!(record.current_term, 7);
    assert_eq!(record.voted_for.as_deref(), Some("candidate-x"));

    // The reincarnation remembers both the term and the vote.
    let rpc = MockRpc::new();
    let node = Node::with_timings(
        info,
        TestHandler::new(),
        Arc::new(rpc.clone()),
        &path,
        quiescent_timings(),
    )
    .unwrap();

    assert_eq!(node.current_term().await, 7);
    assert_eq!(node.state().await, State::Follower);

    let other = rpc
        .request_vote(node.id(), vote_request(7, "candidate-y"))
        .await
        .unwrap();
    assert!(
        !other.granted,
        "The vote granted before the restart must stick"
    );

    let same = rpc
        .request_vote(node.id(), vote_request(7, "candidate-x"))
        .await
        .unwrap();
    assert!(same.granted, "Re-confirming the original grantee is fine");

    node.shutdown().await;
}

/// A fresh path starts at the zero-value record.
#[tokio::test]
async fn fresh_node_starts_at_term_zero() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let rpc = MockRpc::new();
    let node = Node::with_timings(
        ClusterInfo::new("fresh", 3).unwrap(),
        TestHandler::new(),
        Arc::new(rpc),
        dir.path().join("term.json"),
        quiescent_timings(),
    )
    .unwrap();

    assert_eq!(node.current_term().await, 0);
    assert_eq!(node.state().await, State::Follower);
    assert_eq!(node.leader().await, None);
    assert_eq!(node.cluster().name, "fresh");
    assert_eq!(node.cluster().quorum(), 2);

    node.shutdown().await;
}

/// A damaged record is a construction error, not a silent reset.
#[tokio::test]
async fn corrupt_record_fails_construction() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("term.json");
    std::fs::write(&path, b"{\"current_term\": 3, \"voted").unwrap();

    let result = Node::with_timings(
        ClusterInfo::new("corrupt", 3).unwrap(),
        TestHandler::new(),
        Arc::new(MockRpc::new()),
        &path,
        quiescent_timings(),
    );
    assert!(matches!(result, Err(Error::Corrupt(_))));
}

/// An unopenable persistence path is a construction error.
#[tokio::test]
async fn unopenable_path_fails_construction() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let result = Node::with_timings(
        ClusterInfo::new("badpath", 3).unwrap(),
        TestHandler::new(),
        Arc::new(MockRpc::new()),
        dir.path().join("missing").join("term.json"),
        quiescent_timings(),
    );
    assert!(matches!(result, Err(Error::Storage(_))));
}

/// Invalid cluster descriptions and timing parameters fail construction.
#[tokio::test]
async fn invalid_config_fails_construction() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("term.json");

    let result = Node::with_timings(
        ClusterInfo {
            name: String::new(),
            size: 3,
        },
        TestHandler::new(),
        Arc::new(MockRpc::new()),
        &path,
        quiescent_timings(),
    );
    assert!(matches!(result, Err(Error::Config(_))));

    let result = Node::with_timings(
        ClusterInfo {
            name: "c".into(),
            size: 0,
        },
        TestHandler::new(),
        Arc::new(MockRpc::new()),
        &path,
        quiescent_timings(),
    );
    assert!(matches!(result, Err(Error::Config(_))));

    let mut bad = quiescent_timings();
    bad.heartbeat_interval = bad.min_election_timeout;
    let result = Node::with_timings(
        ClusterInfo::new("c", 3).unwrap(),
        TestHandler::new(),
        Arc::new(MockRpc::new()),
        &path,
        bad,
    );
    assert!(matches!(result, Err(Error::Config(_))));
}

/// When the term store stops accepting writes, the node stalls as a
/// follower instead of campaigning with an un-persisted term: safety over
/// liveness.
#[tokio::test]
async fn persist_failure_stalls_candidacy() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("term.json");
    let rpc = MockRpc::new();
    let handler = TestHandler::new();

    let node = Node::with_timings(
        ClusterInfo::new("stall", 3).unwrap(),
        handler.clone(),
        Arc::new(rpc),
        &path,
        test_timings(),
    )
    .unwrap();

    // Wedge the store: the atomic save writes a sibling .tmp file first, so
    // a directory squatting on that name makes every save fail.
    std::fs::create_dir(path.with_extension("tmp")).unwrap();

    // Several election timeouts pass; every candidacy attempt is aborted.
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(node.state().await, State::Follower);
    assert_eq!(node.current_term().await, 0);
    assert!(
        handler.error_count() > 0,
        "Each aborted transition must be reported to the handler"
    );
    assert_eq!(
        handler.transition_count(),
        0,
        "No state change may be announced for an aborted transition"
    );

    node.shutdown().await;
}
