use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::{
    backoff::{Backoff, BackoffConfig},
    client::ClusterClient,
    cluster::ClusterAggregator,
    config::ConfigResolver,
    error::{Error, Result},
    group::ConsumerGroupAnalyzer,
    lag::LagCalculator,
    metadata::ClusterMetadata,
    request::with_timeout,
    topic::TopicAnalyzer,
};

/// Default deadline for a single cluster request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of per-resource requests in flight during a fan-out.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Topic name prefixes that mark internal topics by default.
pub const DEFAULT_INTERNAL_PREFIXES: [&str; 2] = ["__", "_confluent"];

#[derive(Debug)]
pub(crate) struct Settings {
    pub(crate) timeout: Duration,
    pub(crate) concurrency: usize,
    pub(crate) internal_prefixes: Vec<String>,
    pub(crate) backoff_config: BackoffConfig,
}

impl Settings {
    pub(crate) fn is_internal(&self, topic: &str) -> bool {
        self.internal_prefixes
            .iter()
            .any(|prefix| topic.starts_with(prefix.as_str()))
    }
}

/// Builder for [`Inspector`].
pub struct InspectorBuilder {
    client: Arc<dyn ClusterClient>,
    timeout: Duration,
    concurrency: usize,
    internal_prefixes: Vec<String>,
    backoff_config: BackoffConfig,
}

impl InspectorBuilder {
    /// Create a new [`InspectorBuilder`] on top of `client`
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            internal_prefixes: DEFAULT_INTERNAL_PREFIXES
                .iter()
                .map(|p| (*p).to_owned())
                .collect(),
            backoff_config: Default::default(),
        }
    }

    /// Deadline for every single cluster request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum number of per-resource requests in flight.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Topic name prefixes that mark a topic as internal.
    pub fn internal_topic_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.internal_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Retry policy for metadata snapshot requests that time out.
    pub fn backoff_config(mut self, backoff_config: BackoffConfig) -> Self {
        self.backoff_config = backoff_config;
        self
    }

    /// Build [`Inspector`].
    pub fn build(self) -> Result<Inspector> {
        if self.timeout.is_zero() {
            return Err(Error::InvalidArgument(
                "request timeout must be positive".to_owned(),
            ));
        }
        if self.concurrency == 0 {
            return Err(Error::InvalidArgument(
                "concurrency must be at least 1".to_owned(),
            ));
        }

        Ok(Inspector {
            ctx: Context {
                client: self.client,
                settings: Arc::new(Settings {
                    timeout: self.timeout,
                    concurrency: self.concurrency,
                    internal_prefixes: self.internal_prefixes,
                    backoff_config: self.backoff_config,
                }),
            },
        })
    }
}

impl std::fmt::Debug for InspectorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectorBuilder").finish_non_exhaustive()
    }
}

/// Shared state handed to every analyzer.
#[derive(Debug, Clone)]
pub(crate) struct Context {
    pub(crate) client: Arc<dyn ClusterClient>,
    pub(crate) settings: Arc<Settings>,
}

impl Context {
    pub(crate) fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    /// Fetch a fresh metadata snapshot, retrying on timeouts.
    pub(crate) async fn snapshot(&self) -> Result<ClusterMetadata> {
        let timeout = self.timeout();
        let client = &self.client;

        let metadata = Backoff::new(&self.settings.backoff_config)
            .retry_with_backoff("metadata", || async move {
                match with_timeout("metadata", timeout, client.metadata(timeout)).await {
                    Ok(m) => ControlFlow::Break(Ok(m)),
                    Err(e) if e.is_timeout() => ControlFlow::Continue(e),
                    Err(e) => ControlFlow::Break(Err(e)),
                }
            })
            .await?;

        debug!(
            brokers = metadata.brokers.len(),
            topics = metadata.topics.len(),
            "fetched metadata snapshot"
        );
        Ok(metadata)
    }
}

/// Entry point to all analyzers.
///
/// Cheap to clone; every analyzer shares the client and the settings.
#[derive(Debug, Clone)]
pub struct Inspector {
    ctx: Context,
}

impl Inspector {
    pub fn builder(client: Arc<dyn ClusterClient>) -> InspectorBuilder {
        InspectorBuilder::new(client)
    }

    /// Topic listing, health and lifecycle.
    pub fn topics(&self) -> TopicAnalyzer {
        TopicAnalyzer::new(self.ctx.clone())
    }

    /// Topic and broker configuration.
    pub fn configs(&self) -> ConfigResolver {
        ConfigResolver::new(self.ctx.clone())
    }

    /// Consumer lag.
    pub fn lag(&self) -> LagCalculator {
        LagCalculator::new(self.ctx.clone())
    }

    /// Consumer group listing, description and deletion.
    pub fn groups(&self) -> ConsumerGroupAnalyzer {
        ConsumerGroupAnalyzer::new(self.ctx.clone())
    }

    /// Brokers and cluster-wide rollups.
    pub fn cluster(&self) -> ClusterAggregator {
        ClusterAggregator::new(self.ctx.clone())
    }
}
