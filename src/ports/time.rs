use std::time::Duration;

use time::{Date, OffsetDateTime};

/// Wall clock and sleeping. `now` is expected in the service's local offset so
/// that `now().date()` is the local calendar day.
pub trait TimeProvider: Clone + Send + Sync + 'static {
    type Sleep<'a>: Future<Output = ()> + Send + 'a
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime;
    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a>;

    fn today(&self) -> Date {
        self.now().date()
    }
}
