//! Topic and broker configuration.
use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    client::{ConfigEntry, ConfigResource},
    error::{EntityKind, Error, Result},
    inspector::Context,
    metadata::ClusterMetadata,
    report::{PLACEHOLDER, Report, error_marker, to_value},
    request::{scatter_gather, with_timeout},
    topic::select_topics,
};

/// Configuration of one resource, keyed by config name.
pub type ConfigMap = BTreeMap<String, String>;

/// Key under which a topic's configuration is reported.
pub const CONFIG_KEY: &str = "config";

/// Key under which the cluster defaults are attached next to a topic's configuration.
pub const DEFAULT_KEY: &str = "default";

/// Replace an empty or missing value by [`PLACEHOLDER`].
///
/// Keeps "unset" distinguishable from a value that renders as nothing.
pub fn normalize_value(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_owned(),
        _ => PLACEHOLDER.to_owned(),
    }
}

/// Normalize raw config entries into a [`ConfigMap`].
pub fn normalize(entries: Vec<ConfigEntry>) -> ConfigMap {
    entries
        .into_iter()
        .map(|entry| {
            let value = normalize_value(entry.value.as_deref());
            (entry.name, value)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ConfigResolver {
    ctx: Context,
}

impl ConfigResolver {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Describe the configuration of every resource, one request each.
    ///
    /// A failing resource only fails its own entry.
    pub async fn describe(
        &self,
        resources: &[ConfigResource],
    ) -> BTreeMap<ConfigResource, Result<ConfigMap>> {
        let timeout = self.ctx.timeout();
        let client = &self.ctx.client;

        scatter_gather(
            resources.iter().cloned(),
            self.ctx.settings.concurrency,
            |resource| async move {
                let outcome = with_timeout(
                    "describe config",
                    timeout,
                    client.describe_config(&resource, timeout),
                )
                .await;

                match outcome {
                    Ok(entries) => {
                        debug!(%resource, entries = entries.len(), "described config");
                        Ok(normalize(entries))
                    }
                    Err(e) => {
                        warn!(%resource, e=%e, "cannot describe config");
                        Err(e)
                    }
                }
            },
        )
        .await
    }

    /// Cluster-wide default configuration.
    ///
    /// Read from the broker with the lowest ID in a fresh snapshot.
    pub async fn cluster_defaults(&self) -> Result<ConfigMap> {
        let snapshot = self.ctx.snapshot().await?;
        self.defaults_from(&snapshot).await
    }

    pub(crate) async fn defaults_from(&self, snapshot: &ClusterMetadata) -> Result<ConfigMap> {
        let broker_id = snapshot
            .brokers
            .keys()
            .next()
            .copied()
            .ok_or_else(|| Error::NotFound {
                kind: EntityKind::Broker,
                name: "any".to_owned(),
            })?;

        let resource = ConfigResource::broker(broker_id);
        self.describe(std::slice::from_ref(&resource))
            .await
            .remove(&resource)
            .unwrap_or_else(|| {
                Err(Error::NotFound {
                    kind: EntityKind::Broker,
                    name: resource.name.clone(),
                })
            })
    }

    /// Configuration of the named topics, or of all topics if `names` is empty.
    ///
    /// Produces `{topic: {"config": {...}}}`. With `with_defaults`, the cluster
    /// defaults are attached to each topic under `"default"`.
    pub async fn topic_configs(&self, names: &[String], with_defaults: bool) -> Result<Report> {
        let snapshot = self.ctx.snapshot().await?;
        let selection = select_topics(&snapshot, names, |_| true);

        let mut report = self.topic_config_report(&selection.found).await;
        for name in selection.missing {
            let e = Error::NotFound {
                kind: EntityKind::Topic,
                name: name.clone(),
            };
            report.insert(name, error_marker(&e));
        }

        if with_defaults {
            let defaults = match self.defaults_from(&snapshot).await {
                Ok(defaults) => to_value(&defaults),
                Err(e) => error_marker(&e),
            };
            for name in &selection.found {
                if let Some(Value::Object(entry)) = report.get_mut(name) {
                    entry.insert(DEFAULT_KEY.to_owned(), defaults.clone());
                }
            }
        }

        Ok(report)
    }

    /// `{topic: {"config": {...}}}` for topics known to exist.
    pub(crate) async fn topic_config_report(&self, topics: &[String]) -> Report {
        let resources: Vec<_> = topics.iter().map(ConfigResource::topic).collect();

        self.describe(&resources)
            .await
            .into_iter()
            .map(|(resource, outcome)| {
                let config = match outcome {
                    Ok(config) => to_value(&config),
                    Err(e) => error_marker(&e),
                };
                let mut entry = Report::new();
                entry.insert(CONFIG_KEY.to_owned(), config);
                (resource.name, Value::Object(entry))
            })
            .collect()
    }

    /// Replace the configuration of `resource`.
    pub async fn alter(&self, resource: &ConfigResource, entries: &ConfigMap) -> Result<()> {
        let timeout = self.ctx.timeout();
        with_timeout(
            "alter config",
            timeout,
            self.ctx.client.alter_config(resource, entries, timeout),
        )
        .await?;

        info!(%resource, entries = entries.len(), "altered config");
        Ok(())
    }

    /// Alter several resources; each one succeeds or fails on its own.
    pub async fn alter_many(
        &self,
        changes: &BTreeMap<ConfigResource, ConfigMap>,
    ) -> BTreeMap<ConfigResource, Result<()>> {
        scatter_gather(
            changes.keys().cloned(),
            self.ctx.settings.concurrency,
            |resource| async move { self.alter(&resource, &changes[&resource]).await },
        )
        .await
    }
}
