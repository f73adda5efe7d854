//! Consumer group listing, description and deletion.
use std::collections::{BTreeMap, BTreeSet};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::{
    client::BrokerDescriptor,
    error::{Error, Result},
    inspector::Context,
    lag::{LagCalculator, LagReport, OffsetSample, sample_for},
    metadata::{GroupDescription, GroupState, MemberDescription, Node, TopicPartition},
    report::{PLACEHOLDER, or_placeholder},
    request::{scatter_gather, with_timeout},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupKind {
    Simple,
    HighLevel,
}

impl GroupKind {
    fn from_simple(is_simple: bool) -> Self {
        if is_simple {
            Self::Simple
        } else {
            Self::HighLevel
        }
    }
}

/// A listed consumer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    #[serde(rename = "type")]
    pub kind: GroupKind,
    pub state: GroupState,
}

/// A member's assigned partition together with the group's offsets on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentReport {
    pub topic: String,
    pub partition: i32,

    /// `None` if the offsets could not be read.
    pub offsets: Option<OffsetSample>,
}

impl Serialize for AssignmentReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("AssignmentReport", 5)?;
        s.serialize_field("topic", &self.topic)?;
        s.serialize_field("partition", &self.partition)?;
        match &self.offsets {
            Some(sample) => {
                s.serialize_field("current_offset", &sample.current_offset)?;
                s.serialize_field("log_end_offset", &Placeholder(&sample.log_end_offset))?;
                s.serialize_field("lag", &sample.lag)?;
            }
            None => {
                s.serialize_field("current_offset", PLACEHOLDER)?;
                s.serialize_field("log_end_offset", PLACEHOLDER)?;
                s.serialize_field("lag", PLACEHOLDER)?;
            }
        }
        s.end()
    }
}

/// Serializes an optional value through [`or_placeholder`].
struct Placeholder<'a, T>(&'a Option<T>);

impl<T: Serialize> Serialize for Placeholder<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        or_placeholder(self.0, serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberReport {
    pub member_id: String,
    pub client_id: String,
    pub host: String,

    #[serde(serialize_with = "or_placeholder")]
    pub group_instance_id: Option<String>,

    pub assignments: Vec<AssignmentReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    #[serde(rename = "type")]
    pub kind: GroupKind,
    pub state: GroupState,
    pub partition_assignor: String,
    pub coordinator: Node,
    pub members: Vec<MemberReport>,
}

impl GroupReport {
    /// Fold lag samples into the description's member assignments.
    pub fn assemble(description: GroupDescription, lag: &LagReport) -> Self {
        let members = description
            .members
            .into_iter()
            .map(|member| MemberReport::assemble(member, lag))
            .collect();

        Self {
            kind: GroupKind::from_simple(description.is_simple),
            state: description.state,
            partition_assignor: description.partition_assignor,
            coordinator: description.coordinator,
            members,
        }
    }
}

impl MemberReport {
    fn assemble(member: MemberDescription, lag: &LagReport) -> Self {
        let assignments = member
            .assignment
            .iter()
            .map(|partition| AssignmentReport {
                topic: partition.topic.clone(),
                partition: partition.partition,
                offsets: sample_for(lag, partition).copied(),
            })
            .collect();

        Self {
            member_id: member.member_id,
            client_id: member.client_id,
            host: member.host,
            group_instance_id: member.group_instance_id,
            assignments,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerGroupAnalyzer {
    ctx: Context,
}

impl ConsumerGroupAnalyzer {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// List groups in `states` (default: stable and empty).
    ///
    /// With a non-empty `topics`, only groups that have a member assigned to
    /// one of them are kept. This describes every group matching `states`.
    pub async fn list(
        &self,
        states: &[GroupState],
        topics: &[String],
    ) -> Result<BTreeMap<String, GroupSummary>> {
        let states = if states.is_empty() {
            GroupState::DEFAULT_LISTING
        } else {
            states
        };
        let timeout = self.ctx.timeout();

        let listing = with_timeout(
            "list consumer groups",
            timeout,
            self.ctx.client.list_consumer_groups(states, timeout),
        )
        .await?;

        for e in &listing.errors {
            warn!(e = e.as_str(), "error while listing consumer groups");
        }

        let mut groups: BTreeMap<_, _> = listing
            .valid
            .into_iter()
            .filter(|group| {
                if group.group_id.is_empty() {
                    debug!("skipping consumer group without an ID");
                    return false;
                }
                true
            })
            .map(|group| {
                let summary = GroupSummary {
                    kind: GroupKind::from_simple(group.is_simple),
                    state: group.state,
                };
                (group.group_id, summary)
            })
            .collect();

        if !topics.is_empty() {
            let consuming = self.consuming_from(groups.keys().cloned(), topics).await;
            groups.retain(|group_id, _| consuming.contains(group_id));
        }

        Ok(groups)
    }

    /// Groups among `candidates` with a member assigned to any of `topics`.
    async fn consuming_from(
        &self,
        candidates: impl IntoIterator<Item = String>,
        topics: &[String],
    ) -> BTreeSet<String> {
        let topics: BTreeSet<&str> = topics.iter().map(String::as_str).collect();

        self.describe_raw(candidates)
            .await
            .into_iter()
            .filter_map(|(group_id, outcome)| match outcome {
                Ok(description) => description
                    .members
                    .iter()
                    .flat_map(|m| &m.assignment)
                    .any(|p| topics.contains(p.topic.as_str()))
                    .then_some(group_id),
                Err(e) => {
                    warn!(
                        group_id = group_id.as_str(),
                        e=%e,
                        "cannot describe consumer group, skipping",
                    );
                    None
                }
            })
            .collect()
    }

    async fn describe_raw(
        &self,
        group_ids: impl IntoIterator<Item = String>,
    ) -> BTreeMap<String, Result<GroupDescription>> {
        let timeout = self.ctx.timeout();
        let client = &self.ctx.client;

        scatter_gather(group_ids, self.ctx.settings.concurrency, |group_id| async move {
            with_timeout(
                "describe consumer group",
                timeout,
                client.describe_consumer_group(&group_id, timeout),
            )
            .await
        })
        .await
    }

    /// Describe the given groups, or every listed group if `group_ids` is empty.
    ///
    /// Every group is described independently; the offsets of each assigned
    /// partition are read through `broker`.
    pub async fn describe(
        &self,
        group_ids: &[String],
        broker: &BrokerDescriptor,
    ) -> Result<BTreeMap<String, Result<GroupReport>>> {
        let group_ids: Vec<String> = if group_ids.is_empty() {
            self.list(&[], &[]).await?.into_keys().collect()
        } else {
            group_ids.to_vec()
        };

        Ok(scatter_gather(
            group_ids,
            self.ctx.settings.concurrency,
            |group_id| async move { self.describe_one(&group_id, broker).await },
        )
        .await)
    }

    async fn describe_one(&self, group_id: &str, broker: &BrokerDescriptor) -> Result<GroupReport> {
        let timeout = self.ctx.timeout();
        let description = with_timeout(
            "describe consumer group",
            timeout,
            self.ctx.client.describe_consumer_group(group_id, timeout),
        )
        .await?;

        let assigned: BTreeSet<TopicPartition> = description
            .members
            .iter()
            .flat_map(|m| m.assignment.iter().cloned())
            .collect();

        let lag = self.sample(broker, group_id, assigned).await;
        Ok(GroupReport::assemble(description, &lag))
    }

    /// One lag calculation per assigned partition.
    ///
    /// Failed calculations leave their partition out of the report.
    async fn sample(
        &self,
        broker: &BrokerDescriptor,
        group_id: &str,
        partitions: BTreeSet<TopicPartition>,
    ) -> LagReport {
        let calculator = LagCalculator::new(self.ctx.clone());
        let calculator = &calculator;

        let samples = scatter_gather(
            partitions,
            self.ctx.settings.concurrency,
            |partition| async move {
                calculator
                    .calculate(broker, group_id, std::slice::from_ref(&partition))
                    .await
            },
        )
        .await;

        let mut report = LagReport::new();
        for (partition, outcome) in samples {
            match outcome {
                Ok(partial) => {
                    for (topic, partitions) in partial {
                        report.entry(topic).or_default().extend(partitions);
                    }
                }
                Err(e) => {
                    warn!(group_id, %partition, e=%e, "cannot calculate lag");
                }
            }
        }
        report
    }

    /// Delete a group. The deletion is not verified by reading it back.
    pub async fn delete(&self, group_id: &str) -> Result<()> {
        if group_id.is_empty() {
            return Err(Error::InvalidArgument(
                "consumer group ID must not be empty".to_owned(),
            ));
        }

        let timeout = self.ctx.timeout();
        with_timeout(
            "delete consumer group",
            timeout,
            self.ctx.client.delete_consumer_group(group_id, timeout),
        )
        .await?;

        info!(group_id, "deleted consumer group");
        Ok(())
    }
}
