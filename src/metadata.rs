//! Cluster-wide Kafka metadata, as handed over by a
//! [`ClusterClient`](crate::client::ClusterClient).
//!
//! These are plain snapshot values. Nothing in the crate mutates them after they
//! were received; analyzers derive new reports from them instead.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Metadata container for the entire cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMetadata {
    /// Brokers, keyed by broker ID.
    pub brokers: BTreeMap<i32, BrokerAddress>,

    /// The ID of the controller broker.
    pub controller_id: Option<i32>,

    /// Topics, keyed by name.
    pub topics: BTreeMap<String, TopicMetadata>,
}

/// Network address of a broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerAddress {
    /// The broker hostname
    pub host: String,

    /// The broker port
    pub port: i32,
}

impl Display for BrokerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Metadata for a certain topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMetadata {
    /// Each partition in the topic, keyed by partition index
    pub partitions: BTreeMap<i32, PartitionMetadata>,
}

/// Metadata for a certain partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMetadata {
    /// The ID of the leader broker
    pub leader: i32,

    /// The set of all nodes that host this partition
    pub replicas: Vec<BrokerRef>,

    /// The set of all nodes that are in sync with the leader for this partition
    pub isrs: Vec<BrokerRef>,
}

/// Canonical reference to a broker.
///
/// Clients report replicas either as a bare broker ID or as a node object that
/// carries an `id`. Both shapes deserialize into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "ReplicaRef", into = "i32")]
pub struct BrokerRef {
    pub id: i32,
}

impl From<i32> for BrokerRef {
    fn from(id: i32) -> Self {
        Self { id }
    }
}

impl From<BrokerRef> for i32 {
    fn from(broker: BrokerRef) -> Self {
        broker.id
    }
}

/// Raw replica reference as found on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReplicaRef {
    Id(i32),
    Node { id: i32 },
}

impl From<ReplicaRef> for BrokerRef {
    fn from(r: ReplicaRef) -> Self {
        match r {
            ReplicaRef::Id(id) | ReplicaRef::Node { id } => Self { id },
        }
    }
}

/// A topic and partition pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl Display for TopicPartition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// A broker with its ID, as used for group coordinators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: i32,
    pub host: String,
    pub port: i32,
}

/// Lifecycle state of a consumer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupState {
    Unknown,
    PreparingRebalance,
    CompletingRebalance,
    Stable,
    Dead,
    Empty,
}

impl GroupState {
    /// States a group listing is restricted to when the caller names none.
    pub const DEFAULT_LISTING: &'static [Self] = &[Self::Stable, Self::Empty];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::PreparingRebalance => "PREPARING_REBALANCE",
            Self::CompletingRebalance => "COMPLETING_REBALANCE",
            Self::Stable => "STABLE",
            Self::Dead => "DEAD",
            Self::Empty => "EMPTY",
        }
    }
}

impl Display for GroupState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "UNKNOWN" => Ok(Self::Unknown),
            "PREPARING_REBALANCE" => Ok(Self::PreparingRebalance),
            "COMPLETING_REBALANCE" => Ok(Self::CompletingRebalance),
            "STABLE" => Ok(Self::Stable),
            "DEAD" => Ok(Self::Dead),
            "EMPTY" => Ok(Self::Empty),
            _ => Err(Error::InvalidArgument(format!(
                "unknown consumer group state \"{s}\""
            ))),
        }
    }
}

/// Result of listing consumer groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupListing {
    /// Groups that were listed successfully.
    pub valid: Vec<GroupListingEntry>,

    /// Errors reported by individual brokers while listing.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupListingEntry {
    pub group_id: String,
    pub is_simple: bool,
    pub state: GroupState,
}

/// Full description of one consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescription {
    pub is_simple: bool,
    pub state: GroupState,
    pub partition_assignor: String,
    pub coordinator: Node,
    pub members: Vec<MemberDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDescription {
    pub member_id: String,
    pub client_id: String,
    pub host: String,

    /// Set for static group membership.
    pub group_instance_id: Option<String>,

    /// May be empty.
    pub assignment: Vec<TopicPartition>,
}
