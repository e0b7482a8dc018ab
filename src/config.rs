use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::adapters::LocalZone;

pub const DEFAULT_DESIGNATED_REGION: &str = "ivano-frankivska-oblast";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub primary_feed_url: String,
    pub secondary_feed_url: Option<String>,
    /// Endpoint listing the queues the secondary feed knows about.
    pub secondary_queues_url: Option<String>,
    pub designated_region: String,
    /// Region table file; ids map to themselves when unset.
    pub regions_path: Option<PathBuf>,
    pub subscribers_path: PathBuf,
    /// Notifications and reminders are disabled without a webhook.
    pub webhook_url: Option<String>,
    pub cache_ttl: Duration,
    pub check_interval: Duration,
    pub reminder_interval: Duration,
    pub request_timeout: Duration,
    /// Zone the upstream grids are published in.
    pub zone: LocalZone,
    pub listen: SocketAddr,
    pub log_level: String,
}

#[cfg(test)]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            primary_feed_url: "http://127.0.0.1:9/schedule".to_string(),
            secondary_feed_url: None,
            secondary_queues_url: None,
            designated_region: DEFAULT_DESIGNATED_REGION.to_string(),
            regions_path: None,
            subscribers_path: "subscribers.toml".into(),
            webhook_url: None,
            cache_ttl: Duration::from_secs(60),
            check_interval: Duration::from_secs(30 * 60),
            reminder_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            zone: LocalZone::DEFAULT,
            listen: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".to_string(),
        }
    }
}
