use kafka_inspect::{
    Inspector,
    client::{BrokerDescriptor, ConfigResource, memory::MemoryCluster},
    metadata::{GroupDescription, GroupState, MemberDescription, Node, TopicPartition},
};
use parking_lot::Once;
use std::{sync::Arc, time::Duration};

/// Sensible test timeout.
#[allow(dead_code)]
pub const TEST_TIMEOUT: Duration = Duration::from_secs(4);

/// Number of brokers in [`cluster`].
#[allow(dead_code)]
pub const BROKERS: i32 = 3;

/// Generated random topic name for testing.
#[allow(dead_code)]
pub fn random_topic_name() -> String {
    format!("test_topic_{}", uuid::Uuid::new_v4())
}

/// Generated random consumer group ID for testing.
#[allow(dead_code)]
pub fn random_group_id() -> String {
    format!("test_group_{}", uuid::Uuid::new_v4())
}

/// In-memory cluster with [`BROKERS`] brokers, broker 1 acting as controller.
///
/// Every broker carries a small default configuration.
pub fn cluster() -> Arc<MemoryCluster> {
    let cluster = MemoryCluster::new();
    for id in 1..=BROKERS {
        cluster.add_broker(id, format!("broker{id}"), 9092);
        let resource = ConfigResource::broker(id);
        cluster.set_config(resource.clone(), "log.retention.hours", Some("168"));
        cluster.set_config(resource.clone(), "num.partitions", Some("1"));
        cluster.set_config(resource, "log.cleaner.enable", None);
    }
    cluster.set_controller(1);
    Arc::new(cluster)
}

/// [`Inspector`] on top of `cluster` using [`TEST_TIMEOUT`].
pub fn inspector(cluster: &Arc<MemoryCluster>) -> Inspector {
    Inspector::builder(cluster.clone())
        .timeout(TEST_TIMEOUT)
        .build()
        .unwrap()
}

/// Bootstrap address of broker 1.
#[allow(dead_code)]
pub fn bootstrap() -> BrokerDescriptor {
    BrokerDescriptor("broker1:9092".to_owned())
}

/// Stable high-level group whose single member is assigned `assignment`.
#[allow(dead_code)]
pub fn group(assignment: Vec<TopicPartition>) -> GroupDescription {
    GroupDescription {
        is_simple: false,
        state: GroupState::Stable,
        partition_assignor: "range".to_owned(),
        coordinator: Node {
            id: 1,
            host: "broker1".to_owned(),
            port: 9092,
        },
        members: vec![MemberDescription {
            member_id: format!("consumer-{}", uuid::Uuid::new_v4()),
            client_id: "inspect-test".to_owned(),
            host: "/127.0.0.1".to_owned(),
            group_instance_id: None,
            assignment,
        }],
    }
}

static LOG_SETUP: Once = Once::new();

/// Enables debug logging if the `RUST_LOG` environment variable is
/// set. Does nothing if `RUST_LOG` is not set.
pub fn maybe_start_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        start_logging()
    }
}

/// Start logging.
pub fn start_logging() {
    use tracing_log::LogTracer;
    use tracing_subscriber::{FmtSubscriber, filter::EnvFilter};

    LOG_SETUP.call_once(|| {
        LogTracer::init().unwrap();

        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}
