//! Helpers for issuing requests against the [`ClusterClient`](crate::client::ClusterClient).

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use futures::prelude::*;
use tracing::debug;

use crate::client::error::ClientError;
use crate::error::{Error, Result};

/// Await a single client request, enforcing `timeout` locally as well.
///
/// An expired deadline becomes [`Error::Timeout`], whether it was detected here
/// or reported by the client.
pub(crate) async fn with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    request: F,
) -> Result<T>
where
    F: Future<Output = Result<T, ClientError>> + Send,
{
    match tokio::time::timeout(timeout, request).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(Error::from_client(operation, timeout, e)),
        Err(_) => {
            debug!(operation, ?timeout, "request deadline expired");
            Err(Error::Timeout { operation, timeout })
        }
    }
}

/// Scatter one request per key and gather every outcome.
///
/// At most `limit` requests are in flight. Each key gets its own result slot,
/// so a failing key never hides the others, and the output is ordered by key
/// rather than by completion.
pub(crate) async fn scatter_gather<K, T, F, Fut>(
    keys: impl IntoIterator<Item = K>,
    limit: usize,
    f: F,
) -> BTreeMap<K, Result<T>>
where
    K: Ord + Clone,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    stream::iter(keys)
        .map(|key| {
            let request = f(key.clone());
            async move { (key, request.await) }
        })
        .buffer_unordered(limit.max(1))
        .collect()
        .await
}
