use std::future::Future;
use std::pin::Pin;

pub mod dispatch;
pub mod feed;
pub mod render;
pub mod repository;
pub mod time;

pub use dispatch::{DispatchError, Dispatcher};
pub use feed::{FetchError, PrimaryFetch, ScheduleFeed};
pub use render::{Artifact, ChartRenderer, ChartRequest, RenderError};
pub use repository::{RepositoryError, SubscriberRepository};
pub use time::TimeProvider;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
