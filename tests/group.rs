use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use kafka_inspect::{
    client::{
        NewTopic,
        error::ClientError,
        memory::{MemoryCluster, Target},
    },
    error::{EntityKind, Error},
    group::GroupKind,
    lag::{CurrentOffset, Lag, OffsetSample},
    metadata::{GroupDescription, GroupListingEntry, GroupState, TopicPartition},
};
use serde_json::json;

mod test_helpers;
use test_helpers::{
    TEST_TIMEOUT, bootstrap, cluster, group, inspector, maybe_start_logging, random_group_id,
    random_topic_name,
};

/// Topic with two partitions and watermarks `(0, 100)` and `(10, 50)`.
async fn orders(cluster: &Arc<MemoryCluster>) -> (TopicPartition, TopicPartition) {
    let topic_name = random_topic_name();
    inspector(cluster)
        .topics()
        .create(&NewTopic::new(&topic_name, 2, 1))
        .await
        .unwrap();

    let p0 = TopicPartition::new(&topic_name, 0);
    let p1 = TopicPartition::new(&topic_name, 1);
    cluster.set_watermarks(p0.clone(), 0, 100);
    cluster.set_watermarks(p1.clone(), 10, 50);
    (p0, p1)
}

#[tokio::test]
async fn test_list_default_states() {
    maybe_start_logging();

    let cluster = cluster();
    let inspector = inspector(&cluster);

    let stable = random_group_id();
    let empty = random_group_id();
    let dead = random_group_id();
    cluster.add_group(&stable, group(vec![]));
    cluster.add_group(
        &empty,
        GroupDescription {
            state: GroupState::Empty,
            is_simple: true,
            ..group(vec![])
        },
    );
    cluster.add_group(
        &dead,
        GroupDescription {
            state: GroupState::Dead,
            ..group(vec![])
        },
    );
    cluster.add_listing_entry(GroupListingEntry {
        group_id: String::new(),
        is_simple: true,
        state: GroupState::Stable,
    });
    cluster.add_listing_error("coordinator not available on broker 2");

    let groups = inspector.groups().list(&[], &[]).await.unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[&stable].kind, GroupKind::HighLevel);
    assert_eq!(groups[&stable].state, GroupState::Stable);
    assert_eq!(groups[&empty].kind, GroupKind::Simple);
    assert!(!groups.contains_key(&dead));
    assert!(!groups.contains_key(""));

    let groups = inspector
        .groups()
        .list(&[GroupState::Dead], &[])
        .await
        .unwrap();
    assert_eq!(groups.keys().collect::<Vec<_>>(), vec![&dead]);
}

#[tokio::test]
async fn test_list_by_topic() {
    maybe_start_logging();

    let cluster = cluster();
    let inspector = inspector(&cluster);
    let (p0, _) = orders(&cluster).await;

    let consuming = random_group_id();
    let other = random_group_id();
    cluster.add_group(&consuming, group(vec![p0.clone()]));
    cluster.add_group(&other, group(vec![TopicPartition::new("payments", 0)]));

    let groups = inspector
        .groups()
        .list(&[], &[p0.topic.clone()])
        .await
        .unwrap();
    assert_eq!(groups.keys().collect::<Vec<_>>(), vec![&consuming]);

    // a group that cannot be described is skipped, not fatal
    cluster.fail(
        Target::DescribeGroup(consuming.clone()),
        ClientError::Connection("reset by peer".to_owned()),
    );
    let groups = inspector
        .groups()
        .list(&[], &[p0.topic.clone()])
        .await
        .unwrap();
    assert!(groups.is_empty());
}

#[tokio::test]
async fn test_describe_with_lag() {
    maybe_start_logging();

    let cluster = cluster();
    let inspector = inspector(&cluster);
    let (p0, p1) = orders(&cluster).await;

    let group_id = random_group_id();
    cluster.add_group(&group_id, group(vec![p0.clone(), p1.clone()]));
    cluster.commit_offset(&group_id, p0.clone(), 40);

    let reports = inspector
        .groups()
        .describe(&[group_id.clone()], &bootstrap())
        .await
        .unwrap();
    let report = reports[&group_id].as_ref().unwrap();

    assert_eq!(report.members.len(), 1);
    let assignments = &report.members[0].assignments;
    assert_eq!(
        assignments[0].offsets,
        Some(OffsetSample {
            current_offset: CurrentOffset::Committed(40),
            log_end_offset: Some(100),
            lag: Lag::Messages(60),
        })
    );
    assert_eq!(
        assignments[1].offsets,
        Some(OffsetSample {
            current_offset: CurrentOffset::NoCommit,
            log_end_offset: Some(50),
            lag: Lag::Messages(40),
        })
    );

    let json = serde_json::to_value(report).unwrap();
    assert_eq!(json["type"], "high-level");
    assert_eq!(json["members"][0]["assignments"][1]["current_offset"], "-");

    assert_eq!(cluster.open_sessions(), 0);
    assert_eq!(cluster.sessions_opened(), 2);
}

#[tokio::test]
async fn test_describe_releases_sessions_on_failure() {
    maybe_start_logging();

    let cluster = cluster();
    let inspector = inspector(&cluster);
    let (p0, p1) = orders(&cluster).await;

    let group_id = random_group_id();
    cluster.add_group(&group_id, group(vec![p0.clone(), p1.clone()]));
    cluster.fail(
        Target::CommittedOffsets(group_id.clone()),
        ClientError::Connection("reset by peer".to_owned()),
    );

    let reports = inspector
        .groups()
        .describe(&[group_id.clone()], &bootstrap())
        .await
        .unwrap();
    let report = reports[&group_id].as_ref().unwrap();

    assert!(report.members[0].assignments.iter().all(|a| a.offsets.is_none()));
    assert_eq!(
        serde_json::to_value(&report.members[0].assignments[0]).unwrap(),
        json!({
            "topic": p0.topic,
            "partition": 0,
            "current_offset": "-",
            "log_end_offset": "-",
            "lag": "-",
        })
    );

    assert_eq!(cluster.sessions_opened(), 2);
    assert_eq!(cluster.open_sessions(), 0);
}

#[tokio::test]
async fn test_describe_partial_failure() {
    maybe_start_logging();

    let cluster = cluster();
    let inspector = inspector(&cluster);
    let (p0, _) = orders(&cluster).await;

    let group_id = random_group_id();
    cluster.add_group(&group_id, group(vec![p0]));

    let missing = random_group_id();
    let reports = inspector
        .groups()
        .describe(&[group_id.clone(), missing.clone()], &bootstrap())
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert_matches!(&reports[&group_id], Ok(_));
    assert_matches!(
        &reports[&missing],
        Err(Error::NotFound {
            kind: EntityKind::ConsumerGroup,
            ..
        })
    );
}

#[tokio::test]
async fn test_describe_all_listed() {
    maybe_start_logging();

    let cluster = cluster();
    let inspector = inspector(&cluster);

    let a = random_group_id();
    let b = random_group_id();
    cluster.add_group(&a, group(vec![]));
    cluster.add_group(&b, group(vec![]));

    let reports = inspector
        .groups()
        .describe(&[], &bootstrap())
        .await
        .unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.values().all(Result::is_ok));

    // no assigned partitions, no sessions
    assert_eq!(cluster.sessions_opened(), 0);
}

#[tokio::test]
async fn test_lag_watermark_failure() {
    maybe_start_logging();

    let cluster = cluster();
    let inspector = inspector(&cluster);
    let (p0, p1) = orders(&cluster).await;

    let group_id = random_group_id();
    cluster.commit_offset(&group_id, p0.clone(), 100);
    cluster.fail(
        Target::Watermarks(p1.clone()),
        ClientError::Server {
            code: 6,
            message: "not leader for partition".to_owned(),
        },
    );

    let lag = inspector
        .lag()
        .calculate(&bootstrap(), &group_id, &[p0.clone(), p1.clone()])
        .await
        .unwrap();

    let partitions = &lag[&p0.topic];
    assert_eq!(partitions.len(), 1);
    assert_eq!(partitions[&0].lag, Lag::Messages(0));
    assert_eq!(cluster.open_sessions(), 0);

    // a session that cannot be opened fails the whole calculation
    cluster.fail(
        Target::OpenSession(group_id.clone()),
        ClientError::Connection("refused".to_owned()),
    );
    let err = inspector
        .lag()
        .calculate(&bootstrap(), &group_id, &[p0])
        .await
        .unwrap_err();
    assert_matches!(err, Error::Upstream(ClientError::Connection(_)));
    assert_eq!(cluster.sessions_opened(), 1);
    assert_eq!(cluster.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_lag_releases_session_on_every_exit() {
    maybe_start_logging();

    let cluster = cluster();
    let inspector = inspector(&cluster);
    let (p0, p1) = orders(&cluster).await;
    let group_id = random_group_id();
    let partitions = [p0.clone(), p1.clone()];

    inspector
        .lag()
        .calculate(&bootstrap(), &group_id, &partitions)
        .await
        .unwrap();
    assert_eq!(cluster.sessions_opened(), 1);
    assert_eq!(cluster.open_sessions(), 0);

    // committed offsets fail after the session was opened
    cluster.fail_times(
        Target::CommittedOffsets(group_id.clone()),
        ClientError::Connection("reset by peer".to_owned()),
        1,
    );
    let err = inspector
        .lag()
        .calculate(&bootstrap(), &group_id, &partitions)
        .await
        .unwrap_err();
    assert_matches!(err, Error::Upstream(ClientError::Connection(_)));
    assert_eq!(cluster.sessions_opened(), 2);
    assert_eq!(cluster.open_sessions(), 0);

    // the caller gives up while a watermark query is still pending
    cluster.delay(Target::Watermarks(p1), Duration::from_secs(60));
    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        inspector.lag().calculate(&bootstrap(), &group_id, &partitions),
    )
    .await;
    assert!(outcome.is_err());
    assert_eq!(cluster.sessions_opened(), 3);
    assert_eq!(cluster.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_delete() {
    maybe_start_logging();

    let cluster = cluster();
    let inspector = inspector(&cluster);

    let group_id = random_group_id();
    cluster.add_group(&group_id, group(vec![]));

    let err = inspector.groups().delete("").await.unwrap_err();
    assert_matches!(err, Error::InvalidArgument(_));

    inspector.groups().delete(&group_id).await.unwrap();
    assert!(inspector.groups().list(&[], &[]).await.unwrap().is_empty());

    let err = inspector.groups().delete(&group_id).await.unwrap_err();
    assert_matches!(
        err,
        Error::NotFound {
            kind: EntityKind::ConsumerGroup,
            ..
        }
    );

    let slow = random_group_id();
    cluster.add_group(&slow, group(vec![]));
    cluster.delay(Target::DeleteGroup(slow.clone()), TEST_TIMEOUT * 2);
    let err = inspector.groups().delete(&slow).await.unwrap_err();
    assert_matches!(
        err,
        Error::Timeout {
            operation: "delete consumer group",
            ..
        }
    );

    let busy = random_group_id();
    cluster.add_group(&busy, group(vec![]));
    cluster.fail(
        Target::DeleteGroup(busy.clone()),
        ClientError::Server {
            code: 68,
            message: "The group is not empty.".to_owned(),
        },
    );
    let err = inspector.groups().delete(&busy).await.unwrap_err();
    assert_matches!(err, Error::Upstream(ClientError::Server { code: 68, .. }));
    assert!(err.to_string().contains("The group is not empty."));

    // neither failed deletion removed the group
    let groups = inspector.groups().list(&[], &[]).await.unwrap();
    assert!(groups.contains_key(&slow));
    assert!(groups.contains_key(&busy));
}
