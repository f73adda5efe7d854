#![deny(
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    rust_2018_idioms,
    unsafe_code
)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]
//! Operational views over Kafka cluster metadata.
//!
//! The crate turns the raw metadata exposed by a [`ClusterClient`](client::ClusterClient)
//! into derived reports: partition health, consumer lag, merged info/config
//! reports and cluster-wide rollups. Talking to brokers is left to the client
//! implementation; [`MemoryCluster`](client::memory::MemoryCluster) provides an
//! in-process one.
//!
//! ```no_run
//! # async fn run() -> kafka_inspect::error::Result<()> {
//! use std::sync::Arc;
//! use kafka_inspect::{Inspector, client::memory::MemoryCluster, topic::DescribeOptions};
//!
//! let cluster = Arc::new(MemoryCluster::new());
//! let inspector = Inspector::builder(cluster).build()?;
//! let report = inspector
//!     .topics()
//!     .describe(&[], DescribeOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```
mod backoff;
pub mod client;
pub mod cluster;
pub mod config;
pub mod error;
pub mod group;
mod inspector;
pub mod lag;
pub mod metadata;
pub mod report;
mod request;
pub mod topic;

pub use backoff::BackoffConfig;
pub use inspector::{
    DEFAULT_CONCURRENCY, DEFAULT_INTERNAL_PREFIXES, DEFAULT_TIMEOUT, Inspector, InspectorBuilder,
};
