//! Router behaviour against a fake consensus engine.

mod common;

use bytes::Bytes;
use common::FakeReplica;
use hyper::{HeaderMap, Method};
use raftkv_cluster::router::FORWARDED_HEADER;
use raftkv_cluster::{
    AddressMapping, KvCommand, KvError, Role, RouterSettings, WriteKind, WriteOutcome,
    WriteRequest,
};
use std::time::Duration;

fn write_request(kind: WriteKind, body: &str) -> WriteRequest {
    let path = match kind {
        WriteKind::Set => "/set",
        WriteKind::Delete => "/delete",
    };
    WriteRequest {
        kind,
        method: Method::POST,
        path_and_query: path.to_string(),
        headers: HeaderMap::new(),
        body: Bytes::from(body.to_string()),
    }
}

fn leader_replica() -> FakeReplica {
    let replica = FakeReplica::new();
    replica.engine.update(|v| {
        v.role = Role::Leader;
        v.leader = Some("127.0.0.1:5000".to_string());
    });
    replica
}

#[tokio::test]
async fn read_requires_a_key() {
    let replica = FakeReplica::new();
    assert!(matches!(
        replica.router.read(None).await,
        Err(KvError::MissingParameter("key"))
    ));
    assert!(matches!(
        replica.router.read(Some("")).await,
        Err(KvError::MissingParameter("key"))
    ));
}

#[tokio::test]
async fn read_distinguishes_not_found() {
    let replica = leader_replica();
    assert!(matches!(
        replica.router.read(Some("nope")).await,
        Err(KvError::NotFound(_))
    ));

    replica
        .router
        .write(write_request(WriteKind::Set, r#"{"key":"a","value":"1"}"#))
        .await
        .unwrap();
    assert_eq!(replica.router.read(Some("a")).await.unwrap(), "1");
}

#[tokio::test]
async fn leader_commits_set_and_delete() {
    let replica = leader_replica();

    let outcome = replica
        .router
        .write(write_request(WriteKind::Set, r#"{"key":"a","value":"1"}"#))
        .await
        .unwrap();
    assert_eq!(outcome, WriteOutcome::Committed);

    replica
        .router
        .write(write_request(WriteKind::Delete, r#"{"key":"a"}"#))
        .await
        .unwrap();
    assert_eq!(replica.state_machine.get("a").await, None);

    let commits: Vec<KvCommand> = replica
        .engine
        .commits()
        .iter()
        .map(|c| KvCommand::decode(c).unwrap())
        .collect();
    assert_eq!(
        commits,
        vec![KvCommand::set("a", "1"), KvCommand::delete("a")]
    );
}

#[tokio::test]
async fn malformed_bodies_never_reach_the_engine() {
    let replica = leader_replica();

    for (kind, body) in [
        (WriteKind::Set, "not json"),
        (WriteKind::Set, r#"{"key":"a"}"#),
        (WriteKind::Set, r#"{"key":"a","value":1}"#),
        (WriteKind::Set, r#"{"key":"","value":"x"}"#),
        (WriteKind::Delete, r#"{}"#),
    ] {
        let err = replica
            .router
            .write(write_request(kind, body))
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::MalformedBody(_)), "{}: {:?}", body, err);
    }
    assert!(replica.engine.commits().is_empty());
}

#[tokio::test]
async fn commit_timeout_is_reported() {
    let replica = FakeReplica::with_settings(RouterSettings {
        commit_timeout: Duration::from_millis(50),
        ..Default::default()
    });
    replica.engine.update(|v| {
        v.role = Role::Leader;
        v.commit_delay = Duration::from_millis(500);
    });

    let err = replica
        .router
        .write(write_request(WriteKind::Set, r#"{"key":"a","value":"1"}"#))
        .await
        .unwrap_err();
    assert!(matches!(err, KvError::CommitTimeout(_)));
}

#[tokio::test]
async fn commit_failure_is_reported() {
    let replica = leader_replica();
    replica
        .engine
        .update(|v| v.commit_error = Some("leadership lost".to_string()));

    let err = replica
        .router
        .write(write_request(WriteKind::Set, r#"{"key":"a","value":"1"}"#))
        .await
        .unwrap_err();
    assert!(matches!(err, KvError::Commit(_)));
}

#[tokio::test]
async fn follower_without_leader_reports_leader_unknown() {
    let replica = FakeReplica::new();
    replica.engine.update(|v| v.role = Role::Candidate);

    let err = replica
        .router
        .write(write_request(WriteKind::Set, r#"{"key":"a","value":"1"}"#))
        .await
        .unwrap_err();
    assert!(matches!(err, KvError::LeaderUnknown));

    replica.engine.update(|v| v.leader = Some(String::new()));
    let err = replica
        .router
        .write(write_request(WriteKind::Set, r#"{"key":"a","value":"1"}"#))
        .await
        .unwrap_err();
    assert!(matches!(err, KvError::LeaderUnknown));
    assert!(replica.engine.commits().is_empty());
}

#[tokio::test]
async fn forwarded_write_is_never_forwarded_again() {
    let replica = FakeReplica::new();
    replica
        .engine
        .update(|v| v.leader = Some("127.0.0.1:5001".to_string()));

    let mut req = write_request(WriteKind::Set, r#"{"key":"a","value":"1"}"#);
    req.headers.insert(FORWARDED_HEADER, "1".parse().unwrap());

    let err = replica.router.write(req).await.unwrap_err();
    match err {
        KvError::NotLeader { leader } => assert_eq!(leader.as_deref(), Some("127.0.0.1:5001")),
        other => panic!("expected NotLeader, got {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_leader_is_upstream_unavailable() {
    let replica = FakeReplica::with_settings(RouterSettings {
        mapping: AddressMapping::with_offset(0),
        forward_timeout: Duration::from_secs(1),
        ..Default::default()
    });
    // Nothing listens on loopback port 1
    replica
        .engine
        .update(|v| v.leader = Some("127.0.0.1:1".to_string()));

    let err = replica
        .router
        .write(write_request(WriteKind::Set, r#"{"key":"a","value":"1"}"#))
        .await
        .unwrap_err();
    assert!(
        matches!(err, KvError::UpstreamUnavailable { .. }),
        "got {:?}",
        err
    );
}

#[tokio::test]
async fn status_reflects_engine_view() {
    let replica = FakeReplica::new();
    replica.engine.update(|v| {
        v.leader = Some("127.0.0.1:5002".to_string());
        v.term = 7;
    });

    let status = replica.router.status().unwrap();
    assert!(!status.is_leader);
    assert_eq!(status.leader, "127.0.0.1:5002");
    assert_eq!(status.term, 7);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"isLeader": false, "leader": "127.0.0.1:5002", "term": 7})
    );
}

#[tokio::test]
async fn admit_validates_and_delegates() {
    let replica = leader_replica();

    assert!(matches!(
        replica.router.admit(None).await,
        Err(KvError::MissingParameter("peerAddress"))
    ));
    assert!(matches!(
        replica.router.admit(Some("no-port")).await,
        Err(KvError::InvalidParameter { .. })
    ));

    replica.router.admit(Some("127.0.0.1:5003")).await.unwrap();
    assert_eq!(replica.engine.view().voters, vec!["127.0.0.1:5003"]);
}

#[tokio::test]
async fn admit_rejection_is_propagated() {
    let replica = FakeReplica::new();
    let err = replica
        .router
        .admit(Some("127.0.0.1:5003"))
        .await
        .unwrap_err();
    assert!(matches!(err, KvError::Membership(_)));
}

#[tokio::test]
async fn second_bootstrap_fails_and_keeps_membership() {
    let replica = FakeReplica::new();
    let coordinator = replica.router.membership();

    coordinator.bootstrap("127.0.0.1:5000").await.unwrap();
    let err = coordinator.bootstrap("127.0.0.1:5009").await.unwrap_err();
    assert!(matches!(err, KvError::AlreadyBootstrapped(_)));
    assert_eq!(replica.engine.view().voters, vec!["127.0.0.1:5000"]);
}

#[tokio::test]
async fn fatal_replica_refuses_everything() {
    let replica = leader_replica();
    let _ = replica.state_machine.apply_entry(b"corrupt").await;

    assert!(matches!(
        replica.router.read(Some("a")).await,
        Err(KvError::Fatal(_))
    ));
    assert!(matches!(replica.router.status(), Err(KvError::Fatal(_))));
    assert!(matches!(
        replica
            .router
            .write(write_request(WriteKind::Set, r#"{"key":"a","value":"1"}"#))
            .await,
        Err(KvError::Fatal(_))
    ));
    assert!(replica.engine.commits().is_empty());
}
