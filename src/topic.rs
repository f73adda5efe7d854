//! Topic listing, partition health and topic lifecycle.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::{
    client::{ConfigResource, NewTopic},
    config::{ConfigMap, ConfigResolver},
    error::{EntityKind, Error, Result},
    inspector::Context,
    metadata::{BrokerRef, ClusterMetadata, TopicMetadata},
    report::{Report, error_marker, merge_reports, to_value},
    request::with_timeout,
};

/// Key under which a topic's partition information is reported.
pub const INFO_KEY: &str = "info";

/// Replication health of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartitionHealth {
    /// Every replica is in sync.
    Healthy,
    Unhealthy,
}

impl PartitionHealth {
    pub fn classify(replicas: &[BrokerRef], isrs: &[BrokerRef]) -> Self {
        if isrs.len() == replicas.len() {
            Self::Healthy
        } else {
            Self::Unhealthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionReport {
    pub id: i32,
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub isrs: Vec<i32>,
    pub status: PartitionHealth,
}

/// Derived partition information of one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicInfo {
    /// Number of partitions.
    pub partitions: usize,

    /// Replica slots summed over all partitions.
    pub replicas: usize,

    /// Largest replica set of any partition.
    pub replication_factor: usize,

    /// Per-partition records, ordered by partition ID.
    pub availability: Vec<PartitionReport>,
}

impl TopicInfo {
    pub fn from_metadata(topic: &TopicMetadata) -> Self {
        let availability: Vec<_> = topic
            .partitions
            .iter()
            .map(|(id, partition)| PartitionReport {
                id: *id,
                leader: partition.leader,
                replicas: partition.replicas.iter().map(|r| r.id).collect(),
                isrs: partition.isrs.iter().map(|r| r.id).collect(),
                status: PartitionHealth::classify(&partition.replicas, &partition.isrs),
            })
            .collect();

        Self {
            partitions: availability.len(),
            replicas: availability.iter().map(|p| p.replicas.len()).sum(),
            replication_factor: availability
                .iter()
                .map(|p| p.replicas.len())
                .max()
                .unwrap_or_default(),
            availability,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.availability
            .iter()
            .all(|p| p.status == PartitionHealth::Healthy)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicListing {
    pub name: String,
    pub partitions: usize,
}

/// Which views [`TopicAnalyzer::describe`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescribeOptions {
    pub info: bool,
    pub config: bool,

    /// Whether internal topics are included when no names are given.
    pub include_internal: bool,
}

impl Default for DescribeOptions {
    fn default() -> Self {
        Self {
            info: true,
            config: true,
            include_internal: true,
        }
    }
}

/// Topics picked out of a snapshot.
#[derive(Debug, Default)]
pub(crate) struct Selection {
    pub(crate) found: Vec<String>,
    pub(crate) missing: Vec<String>,
}

/// Pick the named topics, or every topic passing `include` if `names` is empty.
pub(crate) fn select_topics<F>(
    snapshot: &ClusterMetadata,
    names: &[String],
    include: F,
) -> Selection
where
    F: Fn(&str) -> bool,
{
    if names.is_empty() {
        return Selection {
            found: snapshot
                .topics
                .keys()
                .filter(|name| include(name.as_str()))
                .cloned()
                .collect(),
            missing: vec![],
        };
    }

    let (found, missing): (Vec<String>, Vec<String>) = names
        .iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .cloned()
        .partition(|name| snapshot.topics.contains_key(name));
    Selection { found, missing }
}

/// Derive [`TopicInfo`] for the topics picked by `names` and `include`.
///
/// Names missing from the snapshot are skipped.
pub fn describe_snapshot<F>(
    snapshot: &ClusterMetadata,
    names: &[String],
    include: F,
) -> BTreeMap<String, TopicInfo>
where
    F: Fn(&str) -> bool,
{
    select_topics(snapshot, names, include)
        .found
        .into_iter()
        .filter_map(|name| {
            let info = TopicInfo::from_metadata(snapshot.topics.get(&name)?);
            Some((name, info))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct TopicAnalyzer {
    ctx: Context,
}

impl TopicAnalyzer {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// List topics with their partition count.
    pub async fn list(&self, include_internal: bool) -> Result<Vec<TopicListing>> {
        let snapshot = self.ctx.snapshot().await?;

        Ok(snapshot
            .topics
            .iter()
            .filter(|(name, _)| include_internal || !self.ctx.settings.is_internal(name))
            .map(|(name, topic)| TopicListing {
                name: name.clone(),
                partitions: topic.partitions.len(),
            })
            .collect())
    }

    /// Partition information of the named topics, or of all topics if `names` is empty.
    pub async fn info(
        &self,
        names: &[String],
        include_internal: bool,
    ) -> Result<BTreeMap<String, TopicInfo>> {
        let snapshot = self.ctx.snapshot().await?;
        Ok(describe_snapshot(&snapshot, names, |name| {
            include_internal || !self.ctx.settings.is_internal(name)
        }))
    }

    /// Describe topics as `{topic: {"info": {...}, "config": {...}}}`.
    ///
    /// Both views come from the same snapshot. Requested topics that do not
    /// exist are reported with an error marker.
    pub async fn describe(&self, names: &[String], options: DescribeOptions) -> Result<Report> {
        if !(options.info || options.config) {
            return Err(Error::InvalidArgument(
                "one of info or config is required to describe topics".to_owned(),
            ));
        }

        let snapshot = self.ctx.snapshot().await?;
        let selection = select_topics(&snapshot, names, |name| {
            options.include_internal || !self.ctx.settings.is_internal(name)
        });

        let mut reports = Vec::with_capacity(3);

        if options.info {
            let info: Report = selection
                .found
                .iter()
                .filter_map(|name| {
                    let info = TopicInfo::from_metadata(snapshot.topics.get(name)?);
                    let mut entry = Report::new();
                    entry.insert(INFO_KEY.to_owned(), to_value(&info));
                    Some((name.clone(), Value::Object(entry)))
                })
                .collect();
            reports.push(info);
        }

        if options.config {
            let resolver = ConfigResolver::new(self.ctx.clone());
            reports.push(resolver.topic_config_report(&selection.found).await);
        }

        let missing: Report = selection
            .missing
            .into_iter()
            .map(|name| {
                let e = Error::NotFound {
                    kind: EntityKind::Topic,
                    name: name.clone(),
                };
                (name, error_marker(&e))
            })
            .collect();
        reports.push(missing);

        Ok(merge_reports(reports))
    }

    /// Create a topic.
    pub async fn create(&self, topic: &NewTopic) -> Result<()> {
        if topic.name.is_empty() {
            return Err(Error::InvalidArgument("topic name must not be empty".to_owned()));
        }
        if topic.num_partitions < 1 {
            return Err(Error::InvalidArgument(format!(
                "topic \"{}\" needs at least one partition",
                topic.name
            )));
        }
        if topic.replication_factor < 1 {
            return Err(Error::InvalidArgument(format!(
                "topic \"{}\" needs a replication factor of at least one",
                topic.name
            )));
        }

        let timeout = self.ctx.timeout();
        with_timeout(
            "create topic",
            timeout,
            self.ctx.client.create_topic(topic, timeout),
        )
        .await?;

        info!(
            topic = topic.name.as_str(),
            partitions = topic.num_partitions,
            replication_factor = topic.replication_factor,
            "created topic",
        );
        Ok(())
    }

    /// Replace a topic's configuration; unspecified keys revert to their defaults.
    pub async fn alter(&self, name: &str, config: &ConfigMap) -> Result<()> {
        ConfigResolver::new(self.ctx.clone())
            .alter(&ConfigResource::topic(name), config)
            .await
    }

    /// Delete a topic.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let timeout = self.ctx.timeout();
        with_timeout(
            "delete topic",
            timeout,
            self.ctx.client.delete_topic(name, timeout),
        )
        .await?;

        info!(topic = name, "deleted topic");
        Ok(())
    }
}
