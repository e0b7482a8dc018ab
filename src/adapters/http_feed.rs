use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CACHE_CONTROL, ETAG, IF_NONE_MATCH, PRAGMA};

use crate::ports::{BoxFuture, FetchError, PrimaryFetch, ScheduleFeed, TimeProvider};
use crate::schedule::wire;
use crate::types::schedule::DaySchedule;

#[derive(Debug, Clone)]
pub struct FeedEndpoints {
    pub primary: String,
    /// Interval feed for the designated region, queried with `?queue=<id>`.
    pub secondary: Option<String>,
    /// Companion list of currently valid queue codes (`[{"code": ...}]`).
    pub secondary_queues: Option<String>,
    pub timeout: Duration,
}

/// Upstream feeds over HTTP. Every request is bounded by the configured
/// timeout; a timed-out request surfaces as [`FetchError::Timeout`].
#[derive(Clone)]
pub struct HttpScheduleFeed<T> {
    client: reqwest::Client,
    endpoints: FeedEndpoints,
    time: T,
}

impl<T> HttpScheduleFeed<T>
where
    T: TimeProvider,
{
    pub fn new(endpoints: FeedEndpoints, time: T) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(endpoints.timeout)
            .user_agent(concat!("outage-watch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| FetchError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            endpoints,
            time,
        })
    }

    async fn get_bytes(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, FetchError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }
}

impl<T> ScheduleFeed for HttpScheduleFeed<T>
where
    T: TimeProvider,
{
    fn fetch_primary<'a>(
        &'a self,
        etag: Option<&'a str>,
    ) -> BoxFuture<'a, Result<PrimaryFetch, FetchError>> {
        Box::pin(async move {
            let cache_bust = self.time.now().unix_timestamp().to_string();
            let mut request = self
                .client
                .get(&self.endpoints.primary)
                .query(&[("t", cache_bust.as_str())])
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
            if let Some(etag) = etag {
                request = request.header(IF_NONE_MATCH, etag);
            }

            let response = request.send().await.map_err(transport_error)?;
            let status = response.status();
            if status == StatusCode::NOT_MODIFIED {
                return Ok(PrimaryFetch::NotModified);
            }
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            let etag = response
                .headers()
                .get(ETAG)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let bytes = response.bytes().await.map_err(transport_error)?;
            let regions = wire::decode_primary(&bytes)?;
            Ok(PrimaryFetch::Modified { etag, regions })
        })
    }

    fn has_secondary(&self) -> bool {
        self.endpoints.secondary.is_some()
    }

    fn fetch_secondary_queues(&self) -> BoxFuture<'_, Result<Vec<String>, FetchError>> {
        Box::pin(async move {
            let Some(url) = self.endpoints.secondary_queues.as_deref() else {
                return Ok(Vec::new());
            };
            let bytes = self.get_bytes(self.client.get(url)).await?;
            wire::decode_queue_list(&bytes)
        })
    }

    fn fetch_secondary_schedule<'a>(
        &'a self,
        queue_id: &'a str,
    ) -> BoxFuture<'a, Result<DaySchedule, FetchError>> {
        Box::pin(async move {
            let Some(url) = self.endpoints.secondary.as_deref() else {
                return Ok(DaySchedule::new());
            };
            let request = self.client.get(url).query(&[("queue", queue_id)]);
            let bytes = self.get_bytes(request).await?;
            wire::decode_secondary(&bytes, queue_id)
        })
    }
}

fn transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(err.to_string())
    }
}
