//! Brokers and cluster-wide rollups.
use std::collections::BTreeMap;

use serde::Serialize;

pub use crate::report::merge_reports;

use crate::{
    error::Result,
    group::{ConsumerGroupAnalyzer, GroupSummary},
    inspector::Context,
    metadata::ClusterMetadata,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerRole {
    Controller,
    Worker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerInfo {
    pub id: i32,
    #[serde(rename = "type")]
    pub role: BrokerRole,
    pub endpoint: String,
}

/// Entity counts taken from one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClusterSummary {
    pub brokers: usize,
    pub topics: usize,
    pub partitions: usize,
    pub replicas: usize,
    pub consumer_groups: usize,
}

/// Brokers of `snapshot`, ordered by ID.
pub fn brokers(snapshot: &ClusterMetadata) -> Vec<BrokerInfo> {
    snapshot
        .brokers
        .iter()
        .map(|(id, address)| BrokerInfo {
            id: *id,
            role: if snapshot.controller_id == Some(*id) {
                BrokerRole::Controller
            } else {
                BrokerRole::Worker
            },
            endpoint: address.to_string(),
        })
        .collect()
}

/// Count brokers, topics, partitions, replica slots and groups.
pub fn summarize(
    snapshot: &ClusterMetadata,
    groups: &BTreeMap<String, GroupSummary>,
) -> ClusterSummary {
    let partitions = snapshot.topics.values().flat_map(|t| t.partitions.values());

    ClusterSummary {
        brokers: snapshot.brokers.len(),
        topics: snapshot.topics.len(),
        partitions: partitions.clone().count(),
        replicas: partitions.map(|p| p.replicas.len()).sum(),
        consumer_groups: groups.len(),
    }
}

#[derive(Debug, Clone)]
pub struct ClusterAggregator {
    ctx: Context,
}

impl ClusterAggregator {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Brokers with their role and endpoint.
    pub async fn brokers(&self) -> Result<Vec<BrokerInfo>> {
        let snapshot = self.ctx.snapshot().await?;
        Ok(brokers(&snapshot))
    }

    /// Cluster-wide counts.
    ///
    /// Issues one metadata request and one group listing; all topic, partition
    /// and replica counts come from that single snapshot.
    pub async fn describe(&self) -> Result<ClusterSummary> {
        let snapshot = self.ctx.snapshot().await?;
        let groups = ConsumerGroupAnalyzer::new(self.ctx.clone())
            .list(&[], &[])
            .await?;

        Ok(summarize(&snapshot, &groups))
    }
}
