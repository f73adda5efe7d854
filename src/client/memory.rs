//! An in-process [`ClusterClient`].
//!
//! [`MemoryCluster`] keeps brokers, topics, configs, consumer groups, committed
//! offsets and watermarks in memory. Failures and latency can be injected per
//! request target, which makes it suitable for exercising partial failures and
//! timeouts without a running cluster.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{
    BrokerDescriptor, ClusterClient, CommittedOffset, ConfigEntry, ConfigResource, NewTopic,
    OffsetSession, ResourceKind, Watermarks,
    error::{ClientError, Result},
};
use crate::lag::OFFSET_INVALID;
use crate::metadata::{
    BrokerAddress, BrokerRef, ClusterMetadata, GroupDescription, GroupListing, GroupListingEntry,
    GroupState, PartitionMetadata, TopicMetadata, TopicPartition,
};

/// Kafka error code for an invalid replication factor.
const INVALID_REPLICATION_FACTOR: i16 = 38;

/// Kafka error code for an unknown broker resource.
const RESOURCE_NOT_FOUND: i16 = 91;

/// Request a fault or latency can be attached to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Target {
    Metadata,
    DescribeConfig(ConfigResource),
    AlterConfig(ConfigResource),
    CreateTopic(String),
    DeleteTopic(String),
    ListGroups,
    DescribeGroup(String),
    DeleteGroup(String),
    OpenSession(String),
    CommittedOffsets(String),
    Watermarks(TopicPartition),
}

#[derive(Debug)]
struct Fault {
    error: ClientError,

    /// `None` fails forever.
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    brokers: BTreeMap<i32, BrokerAddress>,
    controller_id: Option<i32>,
    topics: BTreeMap<String, TopicMetadata>,
    configs: BTreeMap<ConfigResource, BTreeMap<String, Option<String>>>,
    groups: BTreeMap<String, GroupDescription>,
    listing_extras: Vec<GroupListingEntry>,
    listing_errors: Vec<String>,
    committed: BTreeMap<(String, TopicPartition), i64>,
    watermarks: BTreeMap<TopicPartition, Watermarks>,
    faults: BTreeMap<Target, Fault>,
    latency: BTreeMap<Target, Duration>,
    metadata_requests: usize,
}

impl State {
    /// Consume one charge of the fault attached to `target`, if any.
    fn check(&mut self, target: &Target) -> Result<()> {
        let Some(fault) = self.faults.get_mut(target) else {
            return Ok(());
        };

        let error = fault.error.clone();
        let exhausted = match &mut fault.remaining {
            None => false,
            Some(n) => {
                *n -= 1;
                *n == 0
            }
        };
        if exhausted {
            self.faults.remove(target);
        }
        debug!(?target, e=%error, "injected fault");
        Err(error)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<State>>,
    open_sessions: Arc<AtomicUsize>,
    sessions_opened: AtomicUsize,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_broker(&self, id: i32, host: impl Into<String>, port: i32) {
        self.state.lock().brokers.insert(
            id,
            BrokerAddress {
                host: host.into(),
                port,
            },
        );
    }

    pub fn set_controller(&self, id: i32) {
        self.state.lock().controller_id = Some(id);
    }

    /// Insert a topic with explicit partition metadata, bypassing placement.
    pub fn insert_topic(&self, name: impl Into<String>, topic: TopicMetadata) {
        let name = name.into();
        let mut state = self.state.lock();
        for id in topic.partitions.keys() {
            state
                .watermarks
                .entry(TopicPartition::new(name.clone(), *id))
                .or_insert(Watermarks { low: 0, high: 0 });
        }
        state
            .configs
            .entry(ConfigResource::topic(name.clone()))
            .or_default();
        state.topics.insert(name, topic);
    }

    /// Replace the in-sync replicas of a partition.
    pub fn set_isr(&self, topic: &str, partition: i32, isrs: &[i32]) -> Result<()> {
        let mut state = self.state.lock();
        let p = state
            .topics
            .get_mut(topic)
            .and_then(|t| t.partitions.get_mut(&partition))
            .ok_or_else(|| ClientError::UnknownTopic(format!("{topic}-{partition}")))?;
        p.isrs = isrs.iter().copied().map(BrokerRef::from).collect();
        Ok(())
    }

    pub fn set_config(
        &self,
        resource: ConfigResource,
        key: impl Into<String>,
        value: Option<&str>,
    ) {
        self.state
            .lock()
            .configs
            .entry(resource)
            .or_default()
            .insert(key.into(), value.map(ToOwned::to_owned));
    }

    pub fn add_group(&self, group_id: impl Into<String>, description: GroupDescription) {
        self.state.lock().groups.insert(group_id.into(), description);
    }

    /// Add a raw listing entry that has no description behind it.
    pub fn add_listing_entry(&self, entry: GroupListingEntry) {
        self.state.lock().listing_extras.push(entry);
    }

    pub fn add_listing_error(&self, error: impl Into<String>) {
        self.state.lock().listing_errors.push(error.into());
    }

    pub fn commit_offset(
        &self,
        group_id: impl Into<String>,
        partition: TopicPartition,
        offset: i64,
    ) {
        self.state
            .lock()
            .committed
            .insert((group_id.into(), partition), offset);
    }

    pub fn set_watermarks(&self, partition: TopicPartition, low: i64, high: i64) {
        self.state
            .lock()
            .watermarks
            .insert(partition, Watermarks { low, high });
    }

    /// Fail every request to `target` with `error`.
    pub fn fail(&self, target: Target, error: ClientError) {
        self.state.lock().faults.insert(
            target,
            Fault {
                error,
                remaining: None,
            },
        );
    }

    /// Fail the next `times` requests to `target` with `error`.
    pub fn fail_times(&self, target: Target, error: ClientError, times: usize) {
        if times == 0 {
            return;
        }
        self.state.lock().faults.insert(
            target,
            Fault {
                error,
                remaining: Some(times),
            },
        );
    }

    /// Delay every request to `target`.
    pub fn delay(&self, target: Target, latency: Duration) {
        self.state.lock().latency.insert(target, latency);
    }

    /// Offset sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Offset sessions opened so far.
    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    /// Metadata requests served so far.
    pub fn metadata_requests(&self) -> usize {
        self.state.lock().metadata_requests
    }

    /// Wait for the latency attached to `target`, then apply its fault.
    async fn enter(&self, target: Target) -> Result<()> {
        enter(&self.state, target).await
    }
}

async fn enter(state: &Mutex<State>, target: Target) -> Result<()> {
    let latency = state.lock().latency.get(&target).copied();
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
    state.lock().check(&target)
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn metadata(&self, _timeout: Duration) -> Result<ClusterMetadata> {
        self.state.lock().metadata_requests += 1;
        self.enter(Target::Metadata).await?;

        let state = self.state.lock();
        Ok(ClusterMetadata {
            brokers: state.brokers.clone(),
            controller_id: state.controller_id,
            topics: state.topics.clone(),
        })
    }

    async fn describe_config(
        &self,
        resource: &ConfigResource,
        _timeout: Duration,
    ) -> Result<Vec<ConfigEntry>> {
        self.enter(Target::DescribeConfig(resource.clone())).await?;

        let state = self.state.lock();
        match resource.kind {
            ResourceKind::Topic if !state.topics.contains_key(&resource.name) => {
                return Err(ClientError::UnknownTopic(resource.name.clone()));
            }
            ResourceKind::Broker
                if !resource
                    .name
                    .parse::<i32>()
                    .is_ok_and(|id| state.brokers.contains_key(&id)) =>
            {
                return Err(ClientError::Server {
                    code: RESOURCE_NOT_FOUND,
                    message: format!("broker {} not found", resource.name),
                });
            }
            _ => {}
        }

        Ok(state
            .configs
            .get(resource)
            .into_iter()
            .flatten()
            .map(|(name, value)| ConfigEntry {
                name: name.clone(),
                value: value.clone(),
            })
            .collect())
    }

    async fn alter_config(
        &self,
        resource: &ConfigResource,
        entries: &BTreeMap<String, String>,
        _timeout: Duration,
    ) -> Result<()> {
        self.enter(Target::AlterConfig(resource.clone())).await?;

        let mut state = self.state.lock();
        if resource.kind == ResourceKind::Topic && !state.topics.contains_key(&resource.name) {
            return Err(ClientError::UnknownTopic(resource.name.clone()));
        }

        let config = entries
            .iter()
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect();
        state.configs.insert(resource.clone(), config);
        Ok(())
    }

    async fn create_topic(&self, topic: &NewTopic, _timeout: Duration) -> Result<()> {
        self.enter(Target::CreateTopic(topic.name.clone())).await?;

        let mut state = self.state.lock();
        if state.topics.contains_key(&topic.name) {
            return Err(ClientError::TopicAlreadyExists(topic.name.clone()));
        }

        let broker_ids: Vec<i32> = state.brokers.keys().copied().collect();
        let replication_factor = usize::try_from(topic.replication_factor).unwrap_or_default();
        if replication_factor == 0 || replication_factor > broker_ids.len() {
            return Err(ClientError::Server {
                code: INVALID_REPLICATION_FACTOR,
                message: format!(
                    "Replication factor: {} larger than available brokers: {}.",
                    topic.replication_factor,
                    broker_ids.len()
                ),
            });
        }

        // round-robin placement, leader first
        let partitions = (0..topic.num_partitions)
            .map(|id| {
                let start = usize::try_from(id).unwrap_or_default();
                let replicas: Vec<BrokerRef> = (0..replication_factor)
                    .map(|i| BrokerRef::from(broker_ids[(start + i) % broker_ids.len()]))
                    .collect();
                let partition = PartitionMetadata {
                    leader: replicas[0].id,
                    isrs: replicas.clone(),
                    replicas,
                };
                (id, partition)
            })
            .collect();

        for id in 0..topic.num_partitions {
            state.watermarks.insert(
                TopicPartition::new(topic.name.clone(), id),
                Watermarks { low: 0, high: 0 },
            );
        }
        state.configs.insert(
            ConfigResource::topic(topic.name.clone()),
            topic
                .configs
                .iter()
                .map(|(k, v)| (k.clone(), Some(v.clone())))
                .collect(),
        );
        state
            .topics
            .insert(topic.name.clone(), TopicMetadata { partitions });
        Ok(())
    }

    async fn delete_topic(&self, name: &str, _timeout: Duration) -> Result<()> {
        self.enter(Target::DeleteTopic(name.to_owned())).await?;

        let mut state = self.state.lock();
        if state.topics.remove(name).is_none() {
            return Err(ClientError::UnknownTopic(name.to_owned()));
        }
        state.configs.remove(&ConfigResource::topic(name));
        state.watermarks.retain(|tp, _| tp.topic != name);
        Ok(())
    }

    async fn list_consumer_groups(
        &self,
        states: &[GroupState],
        _timeout: Duration,
    ) -> Result<GroupListing> {
        self.enter(Target::ListGroups).await?;

        let state = self.state.lock();
        let valid = state
            .groups
            .iter()
            .map(|(group_id, group)| GroupListingEntry {
                group_id: group_id.clone(),
                is_simple: group.is_simple,
                state: group.state,
            })
            .chain(state.listing_extras.iter().cloned())
            .filter(|entry| states.is_empty() || states.contains(&entry.state))
            .collect();

        Ok(GroupListing {
            valid,
            errors: state.listing_errors.clone(),
        })
    }

    async fn describe_consumer_group(
        &self,
        group_id: &str,
        _timeout: Duration,
    ) -> Result<GroupDescription> {
        self.enter(Target::DescribeGroup(group_id.to_owned())).await?;

        self.state
            .lock()
            .groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| ClientError::UnknownGroup(group_id.to_owned()))
    }

    async fn delete_consumer_group(&self, group_id: &str, _timeout: Duration) -> Result<()> {
        self.enter(Target::DeleteGroup(group_id.to_owned())).await?;

        let mut state = self.state.lock();
        if state.groups.remove(group_id).is_none() {
            return Err(ClientError::UnknownGroup(group_id.to_owned()));
        }
        state.committed.retain(|(group, _), _| group != group_id);
        Ok(())
    }

    async fn open_offset_session(
        &self,
        broker: &BrokerDescriptor,
        group_id: &str,
        _timeout: Duration,
    ) -> Result<Box<dyn OffsetSession>> {
        self.enter(Target::OpenSession(group_id.to_owned())).await?;

        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        debug!(%broker, group_id, "opened memory offset session");

        Ok(Box::new(MemorySession {
            group_id: group_id.to_owned(),
            state: Arc::clone(&self.state),
            open_sessions: Arc::clone(&self.open_sessions),
            closed: false,
        }))
    }
}

/// Stays counted as open until [`OffsetSession::close`] is called; dropping it
/// does not release it.
#[derive(Debug)]
struct MemorySession {
    group_id: String,
    state: Arc<Mutex<State>>,
    open_sessions: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl OffsetSession for MemorySession {
    async fn committed_offsets(
        &self,
        partitions: &[TopicPartition],
        _timeout: Duration,
    ) -> Result<Vec<CommittedOffset>> {
        enter(&self.state, Target::CommittedOffsets(self.group_id.clone())).await?;

        let state = self.state.lock();
        Ok(partitions
            .iter()
            .map(|tp| CommittedOffset {
                topic: tp.topic.clone(),
                partition: tp.partition,
                offset: state
                    .committed
                    .get(&(self.group_id.clone(), tp.clone()))
                    .copied()
                    .unwrap_or(OFFSET_INVALID),
            })
            .collect())
    }

    async fn watermarks(
        &self,
        partition: &TopicPartition,
        _timeout: Duration,
    ) -> Result<Watermarks> {
        enter(&self.state, Target::Watermarks(partition.clone())).await?;

        self.state
            .lock()
            .watermarks
            .get(partition)
            .copied()
            .ok_or_else(|| ClientError::UnknownTopic(partition.to_string()))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
