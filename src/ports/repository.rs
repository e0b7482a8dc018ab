use crate::ports::BoxFuture;
use crate::types::subscriber::{Subscriber, SubscriberId};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("subscriber store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid subscriber store: {0}")]
    Parse(String),
    #[error("failed to serialize subscribers: {0}")]
    Serialize(String),
    #[error("subscriber {0} not found")]
    NotFound(SubscriberId),
}

/// Persisted subscriber rows, keyed by subscriber id.
pub trait SubscriberRepository: Clone + Send + Sync + 'static {
    fn all_subscribers(&self) -> BoxFuture<'_, Result<Vec<Subscriber>, RepositoryError>>;

    fn subscribers_by_region<'a>(
        &'a self,
        region_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Subscriber>, RepositoryError>>;

    fn distinct_queues_in_region<'a>(
        &'a self,
        region_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, RepositoryError>>;

    fn upsert_subscriber(&self, subscriber: Subscriber)
    -> BoxFuture<'_, Result<(), RepositoryError>>;

    fn update_fingerprint<'a>(
        &'a self,
        id: SubscriberId,
        fingerprint: &'a str,
    ) -> BoxFuture<'a, Result<(), RepositoryError>>;

    fn update_last_reminder_event<'a>(
        &'a self,
        id: SubscriberId,
        event_id: &'a str,
    ) -> BoxFuture<'a, Result<(), RepositoryError>>;

    fn remove_subscriber(&self, id: SubscriberId) -> BoxFuture<'_, Result<(), RepositoryError>>;
}
