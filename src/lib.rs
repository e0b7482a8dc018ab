use std::sync::{Arc, Mutex};

use tracing::{info, warn};

pub mod adapters;
pub mod app;
pub mod artifacts;
pub mod config;
pub mod notify;
pub mod ports;
pub mod relevance;
pub mod reminders;
pub mod schedule;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

use adapters::{
    FeedEndpoints, HttpScheduleFeed, PngStripRenderer, TokioTimeProvider, TomlSubscriberRepository,
    WebhookDispatcher,
};
use artifacts::ArtifactCache;
use config::AppConfig;
use notify::{NotificationCoordinator, spawn_every};
use ports::{DispatchError, FetchError, RepositoryError};
use reminders::ReminderEngine;
use schedule::{RegionMap, RegionMapError, ScheduleStore, StoreConfig};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Regions(#[from] RegionMapError),
    #[error("failed to set up schedule feed: {0}")]
    Feed(#[from] FetchError),
    #[error("failed to load subscribers: {0}")]
    Subscribers(#[from] RepositoryError),
    #[error("failed to set up dispatcher: {0}")]
    Dispatcher(#[from] DispatchError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

pub async fn serve(config: AppConfig) -> Result<(), StartupError> {
    let time = TokioTimeProvider::new(config.zone);
    let regions = region_map(&config)?;
    let feed = HttpScheduleFeed::new(feed_endpoints(&config), time.clone())?;
    let store = Arc::new(ScheduleStore::new(
        feed,
        time.clone(),
        regions,
        store_config(&config),
    ));
    let repository = TomlSubscriberRepository::load(&config.subscribers_path)?;
    if repository.migrated() > 0 {
        info!(
            migrated = repository.migrated(),
            path = %repository.path().display(),
            "subscriber records migrated"
        );
    }

    let mut tasks = Vec::new();
    match config.webhook_url.as_deref() {
        Some(url) => {
            let dispatcher = WebhookDispatcher::new(url, config.request_timeout)?;
            let coordinator = Arc::new(NotificationCoordinator::new(
                Arc::clone(&store),
                Arc::new(ArtifactCache::new()),
                repository.clone(),
                dispatcher.clone(),
                PngStripRenderer,
            ));
            tasks.push(spawn_every(
                time.clone(),
                "schedule-check",
                config.check_interval,
                move || {
                    let coordinator = Arc::clone(&coordinator);
                    async move {
                        coordinator.run_cycle().await;
                    }
                },
            ));

            let reminders = Arc::new(ReminderEngine::new(
                Arc::clone(&store),
                repository,
                dispatcher,
            ));
            tasks.push(spawn_every(
                time.clone(),
                "reminders",
                config.reminder_interval,
                move || {
                    let reminders = Arc::clone(&reminders);
                    async move {
                        reminders.run_once().await;
                    }
                },
            ));
        }
        None => {
            warn!("no webhook configured; notifications and reminders are disabled");
            store.refresh().await;
        }
    }

    let state = state::AppState {
        schedule: store,
        tasks: Arc::new(Mutex::new(tasks)),
    };

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .map_err(|source| StartupError::Bind {
            addr: config.listen,
            source,
        })?;
    info!(addr = %config.listen, "listening");
    axum::serve(listener, app::app(state))
        .await
        .map_err(StartupError::Serve)
}

fn region_map(config: &AppConfig) -> Result<RegionMap, RegionMapError> {
    match &config.regions_path {
        Some(path) => RegionMap::load(path),
        None => Ok(RegionMap::default()),
    }
}

fn feed_endpoints(config: &AppConfig) -> FeedEndpoints {
    FeedEndpoints {
        primary: config.primary_feed_url.clone(),
        secondary: config.secondary_feed_url.clone(),
        secondary_queues: config.secondary_queues_url.clone(),
        timeout: config.request_timeout,
    }
}

fn store_config(config: &AppConfig) -> StoreConfig {
    StoreConfig {
        cache_ttl: config.cache_ttl,
        designated_region: Some(config.designated_region.clone()),
    }
}
