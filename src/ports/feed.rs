use crate::ports::BoxFuture;
use crate::types::schedule::{DaySchedule, RegionEntry};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Transient failures are retried by the next scheduled cycle; malformed
    /// payloads are not expected to fix themselves.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryFetch {
    Modified {
        etag: Option<String>,
        regions: Vec<RegionEntry>,
    },
    NotModified,
}

/// Upstream schedule sources. The primary feed covers every region; the
/// secondary feed serves one designated region at queue granularity.
pub trait ScheduleFeed: Send + Sync + 'static {
    fn fetch_primary<'a>(&'a self, etag: Option<&'a str>)
    -> BoxFuture<'a, Result<PrimaryFetch, FetchError>>;

    fn has_secondary(&self) -> bool;

    fn fetch_secondary_queues(&self) -> BoxFuture<'_, Result<Vec<String>, FetchError>>;

    fn fetch_secondary_schedule<'a>(
        &'a self,
        queue_id: &'a str,
    ) -> BoxFuture<'a, Result<DaySchedule, FetchError>>;
}
