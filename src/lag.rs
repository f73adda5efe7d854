//! Consumer lag.
//!
//! Lag is derived from two values owned by the cluster: the offset a group
//! committed for a partition and the partition's watermarks. Both are read at
//! query time through a short-lived [`OffsetSession`] and never cached.
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::ops::Deref;

use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::{
    client::{BrokerDescriptor, OffsetSession, Watermarks},
    error::Result,
    inspector::Context,
    metadata::TopicPartition,
    report::{PLACEHOLDER, or_placeholder},
    request::with_timeout,
};

/// Offset reported for a partition the group never committed to.
pub const OFFSET_INVALID: i64 = -1001;

/// Rendered in place of a lag that cannot be computed.
pub const NO_WATERMARK: &str = "no hwmark";

/// Committed position of a group on a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentOffset {
    Committed(i64),
    NoCommit,
}

impl CurrentOffset {
    /// Interpret a raw committed offset; any negative value means no commit.
    pub fn from_raw(offset: i64) -> Self {
        if offset < 0 {
            Self::NoCommit
        } else {
            Self::Committed(offset)
        }
    }
}

impl Display for CurrentOffset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Committed(offset) => write!(f, "{offset}"),
            Self::NoCommit => f.write_str(PLACEHOLDER),
        }
    }
}

impl Serialize for CurrentOffset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Committed(offset) => serializer.serialize_i64(*offset),
            Self::NoCommit => serializer.serialize_str(PLACEHOLDER),
        }
    }
}

/// Distance between the committed offset and the high watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lag {
    Messages(i64),

    /// The cluster reported no high watermark.
    NoWatermark,
}

impl Display for Lag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Messages(lag) => write!(f, "{lag}"),
            Self::NoWatermark => f.write_str(NO_WATERMARK),
        }
    }
}

/// Always rendered as a string, so the field keeps one type.
impl Serialize for Lag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Offsets and lag of one group on one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OffsetSample {
    pub current_offset: CurrentOffset,

    /// High watermark, unless the cluster reported none.
    #[serde(serialize_with = "or_placeholder")]
    pub log_end_offset: Option<i64>,

    pub lag: Lag,
}

impl OffsetSample {
    /// Derive the sample from a raw committed offset and the watermarks.
    ///
    /// Without a commit the lag is the full backlog `high - low`. This
    /// overstates the real lag when compaction or deletion left gaps in the log.
    pub fn compute(committed: i64, watermarks: Watermarks) -> Self {
        let current_offset = CurrentOffset::from_raw(committed);

        if watermarks.high < 0 {
            return Self {
                current_offset,
                log_end_offset: None,
                lag: Lag::NoWatermark,
            };
        }

        let lag = match current_offset {
            CurrentOffset::NoCommit => watermarks.high - watermarks.low,
            CurrentOffset::Committed(offset) => watermarks.high - offset,
        };

        Self {
            current_offset,
            log_end_offset: Some(watermarks.high),
            lag: Lag::Messages(lag),
        }
    }
}

/// `{topic: {partition: sample}}`.
///
/// Partitions that could not be sampled are absent.
pub type LagReport = BTreeMap<String, BTreeMap<i32, OffsetSample>>;

/// Look up the sample of one partition in a [`LagReport`].
pub fn sample_for<'a>(
    report: &'a LagReport,
    partition: &TopicPartition,
) -> Option<&'a OffsetSample> {
    report.get(&partition.topic)?.get(&partition.partition)
}

/// Closes the session when dropped, whichever way the query ends.
#[derive(Debug)]
struct SessionGuard<'a> {
    session: Box<dyn OffsetSession>,
    group_id: &'a str,
}

impl Deref for SessionGuard<'_> {
    type Target = dyn OffsetSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.session.close();
        debug!(group_id = self.group_id, "closed offset session");
    }
}

#[derive(Debug, Clone)]
pub struct LagCalculator {
    ctx: Context,
}

impl LagCalculator {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Sample offsets and lag of `group_id` on `partitions`.
    ///
    /// Opens a dedicated read-only session for this call only. The group is
    /// never joined.
    pub async fn calculate(
        &self,
        broker: &BrokerDescriptor,
        group_id: &str,
        partitions: &[TopicPartition],
    ) -> Result<LagReport> {
        let timeout = self.ctx.timeout();

        let session = with_timeout(
            "open offset session",
            timeout,
            self.ctx.client.open_offset_session(broker, group_id, timeout),
        )
        .await?;
        let session = SessionGuard { session, group_id };
        debug!(group_id, %broker, "opened offset session");

        let committed = with_timeout(
            "committed offsets",
            timeout,
            session.committed_offsets(partitions, timeout),
        )
        .await?;

        let mut report = LagReport::new();
        for c in committed {
            let partition = TopicPartition::new(c.topic, c.partition);
            let watermarks =
                match with_timeout("watermarks", timeout, session.watermarks(&partition, timeout))
                    .await
                {
                    Ok(w) => w,
                    Err(e) => {
                        warn!(group_id, %partition, e=%e, "cannot sample partition");
                        continue;
                    }
                };

            report
                .entry(partition.topic)
                .or_default()
                .insert(partition.partition, OffsetSample::compute(c.offset, watermarks));
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watermarks(low: i64, high: i64) -> Watermarks {
        Watermarks { low, high }
    }

    #[test]
    fn test_no_commit() {
        let sample = OffsetSample::compute(OFFSET_INVALID, watermarks(10, 100));
        assert_eq!(sample.current_offset, CurrentOffset::NoCommit);
        assert_eq!(sample.current_offset.to_string(), "-");
        assert_eq!(sample.log_end_offset, Some(100));
        assert_eq!(sample.lag, Lag::Messages(90));
        assert_eq!(sample.lag.to_string(), "90");
    }

    #[test]
    fn test_negative_commit_is_no_commit() {
        let sample = OffsetSample::compute(-1, watermarks(10, 100));
        assert_eq!(sample.current_offset, CurrentOffset::NoCommit);
        assert_eq!(sample.lag, Lag::Messages(90));
    }

    #[test]
    fn test_committed() {
        let sample = OffsetSample::compute(40, watermarks(10, 100));
        assert_eq!(sample.current_offset, CurrentOffset::Committed(40));
        assert_eq!(sample.lag, Lag::Messages(60));
        assert_eq!(sample.lag.to_string(), "60");
    }

    #[test]
    fn test_no_watermark() {
        let sample = OffsetSample::compute(40, watermarks(-1, -1));
        assert_eq!(sample.lag, Lag::NoWatermark);
        assert_eq!(sample.lag.to_string(), "no hwmark");
        assert_eq!(sample.log_end_offset, None);

        // the missing watermark wins over the missing commit
        let sample = OffsetSample::compute(OFFSET_INVALID, watermarks(0, -1));
        assert_eq!(sample.current_offset, CurrentOffset::NoCommit);
        assert_eq!(sample.lag, Lag::NoWatermark);
    }

    #[test]
    fn test_serialize() {
        let sample = OffsetSample::compute(OFFSET_INVALID, watermarks(0, -1));
        assert_eq!(
            serde_json::to_value(sample).unwrap(),
            serde_json::json!({
                "current_offset": "-",
                "log_end_offset": "-",
                "lag": "no hwmark",
            })
        );

        let sample = OffsetSample::compute(40, watermarks(10, 100));
        assert_eq!(
            serde_json::to_value(sample).unwrap(),
            serde_json::json!({
                "current_offset": 40,
                "log_end_offset": 100,
                "lag": "60",
            })
        );
    }
}
