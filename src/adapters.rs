use std::time::Duration;

use chrono::{Offset, TimeZone};
use chrono_tz::Tz;
use time::{OffsetDateTime, UtcOffset};

use crate::ports;

mod chart;
mod http_feed;
mod subscribers;
mod webhook;

pub use chart::PngStripRenderer;
pub use http_feed::{FeedEndpoints, HttpScheduleFeed};
pub use subscribers::TomlSubscriberRepository;
pub use webhook::WebhookDispatcher;

/// Where local civil time comes from: a named zone whose offset follows
/// its daylight-saving rules, or a fixed offset override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalZone {
    Named(Tz),
    Fixed(UtcOffset),
}

impl LocalZone {
    pub const DEFAULT: Self = Self::Named(chrono_tz::Europe::Kyiv);

    /// Offset in effect at `instant`.
    pub fn offset_at(&self, instant: OffsetDateTime) -> UtcOffset {
        match self {
            Self::Fixed(offset) => *offset,
            Self::Named(zone) => chrono::DateTime::from_timestamp(instant.unix_timestamp(), 0)
                .map(|utc| zone.offset_from_utc_datetime(&utc.naive_utc()).fix())
                .and_then(|offset| UtcOffset::from_whole_seconds(offset.local_minus_utc()).ok())
                .unwrap_or(UtcOffset::UTC),
        }
    }
}

/// Tokio clock reporting wall-clock time in the configured local zone.
#[derive(Debug, Clone, Copy)]
pub struct TokioTimeProvider {
    zone: LocalZone,
}

impl TokioTimeProvider {
    pub fn new(zone: LocalZone) -> Self {
        Self { zone }
    }
}

impl Default for TokioTimeProvider {
    fn default() -> Self {
        Self::new(LocalZone::Fixed(UtcOffset::UTC))
    }
}

impl ports::TimeProvider for TokioTimeProvider {
    type Sleep<'a>
        = tokio::time::Sleep
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime {
        let utc = OffsetDateTime::now_utc();
        utc.to_offset(self.zone.offset_at(utc))
    }

    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a> {
        tokio::time::sleep(duration)
    }
}
