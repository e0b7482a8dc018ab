//! Subscriber rows kept in a TOML file.
//!
//! Records carry a `version`. Version 1 rows hold a single scalar
//! `queue = "4.2"` (string or number); version 2 rows hold
//! `queues = [{ id, alias }]`. Version 1 rows are upgraded once when the
//! file is loaded and the file is rewritten in the new shape.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::ports::{BoxFuture, RepositoryError, SubscriberRepository};
use crate::types::subscriber::{
    DisplayMode, QueueSubscription, Subscriber, SubscriberId, parse_queue_list,
};

const CURRENT_VERSION: u32 = 2;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SubscriberFile {
    #[serde(default)]
    subscribers: Vec<SubscriberRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubscriberRecord {
    #[serde(default = "legacy_version")]
    version: u32,
    id: SubscriberId,
    region_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    queue: Option<LegacyQueue>,
    #[serde(default)]
    queues: Vec<QueueRecord>,
    #[serde(default)]
    display_mode: DisplayMode,
    #[serde(default)]
    reminder_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_schedule_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_reminder_event_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum LegacyQueue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl LegacyQueue {
    fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Integer(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueRecord {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
}

fn legacy_version() -> u32 {
    1
}

impl SubscriberRecord {
    /// Returns the subscriber and whether the record was in an older shape.
    fn into_subscriber(self) -> (Subscriber, bool) {
        let migrated = self.version < CURRENT_VERSION || self.queue.is_some();
        let mut queues: Vec<QueueSubscription> = self
            .queues
            .into_iter()
            .map(|queue| match queue.alias {
                Some(alias) if !alias.trim().is_empty() => {
                    QueueSubscription::with_alias(queue.id, alias)
                }
                _ => QueueSubscription::new(queue.id),
            })
            .collect();
        if queues.is_empty()
            && let Some(legacy) = &self.queue
        {
            queues = parse_queue_list(&legacy.as_text());
        }
        if queues.is_empty() {
            warn!(subscriber = self.id, "subscriber record has no queues");
        }

        let subscriber = Subscriber {
            id: self.id,
            region_id: self.region_id,
            queues,
            last_schedule_fingerprint: self.last_schedule_fingerprint,
            display_mode: self.display_mode,
            reminder_minutes: self.reminder_minutes,
            last_reminder_event_id: self.last_reminder_event_id,
        };
        (subscriber, migrated)
    }

    fn from_subscriber(subscriber: &Subscriber) -> Self {
        Self {
            version: CURRENT_VERSION,
            id: subscriber.id,
            region_id: subscriber.region_id.clone(),
            queue: None,
            queues: subscriber
                .queues
                .iter()
                .map(|queue| QueueRecord {
                    id: queue.id.clone(),
                    alias: (queue.alias != queue.id).then(|| queue.alias.clone()),
                })
                .collect(),
            display_mode: subscriber.display_mode,
            reminder_minutes: subscriber.reminder_minutes,
            last_schedule_fingerprint: subscriber.last_schedule_fingerprint.clone(),
            last_reminder_event_id: subscriber.last_reminder_event_id.clone(),
        }
    }
}

/// File-backed repository. Every mutation rewrites the whole file through a
/// temp file and rename, so readers never see a truncated file.
#[derive(Clone)]
pub struct TomlSubscriberRepository {
    path: Arc<PathBuf>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    migrated: usize,
}

impl TomlSubscriberRepository {
    /// Loads `path` (a missing file is an empty repository) and upgrades
    /// older records in place.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        let file = match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str::<SubscriberFile>(&contents)
                .map_err(|err| RepositoryError::Parse(err.to_string()))?,
            Err(err) if err.kind() == ErrorKind::NotFound => SubscriberFile::default(),
            Err(err) => return Err(err.into()),
        };

        let mut migrated = 0;
        let mut subscribers = Vec::with_capacity(file.subscribers.len());
        for record in file.subscribers {
            let (subscriber, upgraded) = record.into_subscriber();
            if upgraded {
                migrated += 1;
            }
            subscribers.retain(|existing: &Subscriber| existing.id != subscriber.id);
            subscribers.push(subscriber);
        }

        if migrated > 0 {
            persist(&path, &subscribers)?;
            info!(path = %path.display(), migrated, "upgraded subscriber records");
        }

        Ok(Self {
            path: Arc::new(path),
            subscribers: Arc::new(Mutex::new(subscribers)),
            migrated,
        })
    }

    /// Number of records upgraded while loading.
    pub fn migrated(&self) -> usize {
        self.migrated
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn mutate<F>(&self, id: SubscriberId, apply: F) -> Result<(), RepositoryError>
    where
        F: FnOnce(&mut Subscriber),
    {
        let mut subscribers = self.subscribers.lock().await;
        let subscriber = subscribers
            .iter_mut()
            .find(|subscriber| subscriber.id == id)
            .ok_or(RepositoryError::NotFound(id))?;
        apply(subscriber);
        persist(&self.path, &subscribers)
    }
}

impl SubscriberRepository for TomlSubscriberRepository {
    fn all_subscribers(&self) -> BoxFuture<'_, Result<Vec<Subscriber>, RepositoryError>> {
        Box::pin(async move { Ok(self.subscribers.lock().await.clone()) })
    }

    fn subscribers_by_region<'a>(
        &'a self,
        region_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Subscriber>, RepositoryError>> {
        Box::pin(async move {
            Ok(self
                .subscribers
                .lock()
                .await
                .iter()
                .filter(|subscriber| subscriber.region_id == region_id)
                .cloned()
                .collect())
        })
    }

    fn distinct_queues_in_region<'a>(
        &'a self,
        region_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, RepositoryError>> {
        Box::pin(async move {
            let mut queues: Vec<String> = self
                .subscribers
                .lock()
                .await
                .iter()
                .filter(|subscriber| subscriber.region_id == region_id)
                .flat_map(|subscriber| subscriber.queues.iter().map(|queue| queue.id.clone()))
                .collect();
            queues.sort();
            queues.dedup();
            Ok(queues)
        })
    }

    fn upsert_subscriber(
        &self,
        subscriber: Subscriber,
    ) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move {
            let mut subscribers = self.subscribers.lock().await;
            match subscribers
                .iter_mut()
                .find(|existing| existing.id == subscriber.id)
            {
                Some(existing) => *existing = subscriber,
                None => subscribers.push(subscriber),
            }
            persist(&self.path, &subscribers)
        })
    }

    fn update_fingerprint<'a>(
        &'a self,
        id: SubscriberId,
        fingerprint: &'a str,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(async move {
            self.mutate(id, |subscriber| {
                subscriber.last_schedule_fingerprint = Some(fingerprint.to_string());
            })
            .await
        })
    }

    fn update_last_reminder_event<'a>(
        &'a self,
        id: SubscriberId,
        event_id: &'a str,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(async move {
            self.mutate(id, |subscriber| {
                subscriber.last_reminder_event_id = Some(event_id.to_string());
            })
            .await
        })
    }

    fn remove_subscriber(&self, id: SubscriberId) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move {
            let mut subscribers = self.subscribers.lock().await;
            let before = subscribers.len();
            subscribers.retain(|subscriber| subscriber.id != id);
            if subscribers.len() == before {
                return Ok(());
            }
            persist(&self.path, &subscribers)
        })
    }
}

fn persist(path: &Path, subscribers: &[Subscriber]) -> Result<(), RepositoryError> {
    let file = SubscriberFile {
        subscribers: subscribers
            .iter()
            .map(SubscriberRecord::from_subscriber)
            .collect(),
    };
    let contents =
        toml::to_string(&file).map_err(|err| RepositoryError::Serialize(err.to_string()))?;
    atomic_write(path, contents.as_bytes())?;
    Ok(())
}

fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("subscribers.toml");
    let pid = std::process::id();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    for attempt in 0..10u32 {
        let temp_path = parent.join(format!(".{file_name}.tmp-{pid}-{nanos}-{attempt}"));
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
        {
            Ok(mut file) => {
                use std::io::Write as _;
                file.write_all(contents)?;
                file.sync_all()?;
                std::fs::rename(&temp_path, path)?;
                return Ok(());
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
    Err(std::io::Error::other("failed to allocate temp file"))
}
