//! The boundary to the cluster.
//!
//! Everything in this crate reaches Kafka through [`ClusterClient`]. Each method
//! is one request for one resource; batching and concurrency are the caller's
//! concern.
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use async_trait::async_trait;

use crate::metadata::{ClusterMetadata, GroupDescription, GroupListing, GroupState, TopicPartition};

pub mod error;
pub mod memory;

use error::Result;

/// Type of a resource whose configuration can be described or altered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Topic,
    Broker,
}

/// A resource whose configuration can be described or altered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigResource {
    pub kind: ResourceKind,

    /// Topic name, or broker ID in decimal.
    pub name: String,
}

impl ConfigResource {
    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Topic,
            name: name.into(),
        }
    }

    pub fn broker(id: i32) -> Self {
        Self {
            kind: ResourceKind::Broker,
            name: id.to_string(),
        }
    }
}

impl Display for ConfigResource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ResourceKind::Topic => write!(f, "topic \"{}\"", self.name),
            ResourceKind::Broker => write!(f, "broker {}", self.name),
        }
    }
}

/// One configuration key as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub name: String,
    pub value: Option<String>,
}

/// Topic creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopic {
    pub name: String,
    pub num_partitions: i32,
    pub replication_factor: i16,
    pub configs: BTreeMap<String, String>,
}

impl NewTopic {
    pub fn new(name: impl Into<String>, num_partitions: i32, replication_factor: i16) -> Self {
        Self {
            name: name.into(),
            num_partitions,
            replication_factor,
            configs: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configs.insert(key.into(), value.into());
        self
    }
}

/// Bootstrap address used to open offset sessions, e.g. `"broker1:9092"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerDescriptor(pub String);

impl Display for BrokerDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Committed offset of a group for one partition.
///
/// Partitions without a commit report [`OFFSET_INVALID`](crate::lag::OFFSET_INVALID).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Low and high watermark of a partition.
///
/// A negative `high` means the cluster reported no watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermarks {
    pub low: i64,
    pub high: i64,
}

/// Access to a Kafka cluster.
///
/// Every call takes the deadline the caller is willing to wait. Implementations
/// report an expired deadline as [`ClientError::Timeout`](error::ClientError::Timeout).
#[async_trait]
pub trait ClusterClient: Send + Sync + std::fmt::Debug {
    /// Fetch a fresh, uncached metadata snapshot.
    async fn metadata(&self, timeout: Duration) -> Result<ClusterMetadata>;

    async fn describe_config(
        &self,
        resource: &ConfigResource,
        timeout: Duration,
    ) -> Result<Vec<ConfigEntry>>;

    /// Replace the configuration of `resource`.
    ///
    /// Keys not present in `entries` revert to their defaults.
    async fn alter_config(
        &self,
        resource: &ConfigResource,
        entries: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<()>;

    async fn create_topic(&self, topic: &NewTopic, timeout: Duration) -> Result<()>;

    async fn delete_topic(&self, name: &str, timeout: Duration) -> Result<()>;

    /// List groups in any of `states`; an empty slice lists all groups.
    async fn list_consumer_groups(
        &self,
        states: &[GroupState],
        timeout: Duration,
    ) -> Result<GroupListing>;

    async fn describe_consumer_group(
        &self,
        group_id: &str,
        timeout: Duration,
    ) -> Result<GroupDescription>;

    async fn delete_consumer_group(&self, group_id: &str, timeout: Duration) -> Result<()>;

    /// Open a read-only session for reading `group_id`'s committed offsets.
    ///
    /// The session must not join the group.
    async fn open_offset_session(
        &self,
        broker: &BrokerDescriptor,
        group_id: &str,
        timeout: Duration,
    ) -> Result<Box<dyn OffsetSession>>;
}

/// Short-lived, group-scoped, read-only connection.
#[async_trait]
pub trait OffsetSession: Send + Sync + std::fmt::Debug {
    async fn committed_offsets(
        &self,
        partitions: &[TopicPartition],
        timeout: Duration,
    ) -> Result<Vec<CommittedOffset>>;

    /// Query watermarks from the cluster, bypassing any local cache.
    async fn watermarks(&self, partition: &TopicPartition, timeout: Duration) -> Result<Watermarks>;

    /// Release the connection. Must be idempotent.
    fn close(&mut self);
}
