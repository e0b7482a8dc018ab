use crate::ports::BoxFuture;
use crate::ports::render::Artifact;
use crate::types::subscriber::SubscriberId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("recipient is unreachable")]
    Unreachable,
    #[error("dispatch failed: {0}")]
    Failed(String),
}

pub trait Dispatcher: Clone + Send + Sync + 'static {
    fn send_text<'a>(
        &'a self,
        subscriber: SubscriberId,
        text: &'a str,
    ) -> BoxFuture<'a, Result<(), DispatchError>>;

    fn send_images<'a>(
        &'a self,
        subscriber: SubscriberId,
        images: &'a [Artifact],
        caption: &'a str,
    ) -> BoxFuture<'a, Result<(), DispatchError>>;
}
