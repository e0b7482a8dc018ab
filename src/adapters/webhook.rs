use std::time::Duration;

use base64::{STANDARD, encode_config};
use reqwest::StatusCode;
use serde::Serialize;

use crate::ports::{Artifact, BoxFuture, DispatchError, Dispatcher};
use crate::types::subscriber::SubscriberId;

/// Delivers messages by POSTing JSON to a single webhook that fronts the
/// actual messaging transport.
#[derive(Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct TextPayload<'a> {
    subscriber_id: SubscriberId,
    text: &'a str,
}

#[derive(Serialize)]
struct ImagesPayload<'a> {
    subscriber_id: SubscriberId,
    caption: &'a str,
    images: Vec<ImagePayload<'a>>,
}

#[derive(Serialize)]
struct ImagePayload<'a> {
    name: &'a str,
    content_type: &'a str,
    data: String,
}

impl WebhookDispatcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| DispatchError::Failed(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn post<P: Serialize>(&self, payload: &P) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|err| DispatchError::Failed(err.to_string()))?;
        classify(response.status())
    }
}

/// 403, 404 and 410 mean the transport will never reach this recipient.
fn classify(status: StatusCode) -> Result<(), DispatchError> {
    if status.is_success() {
        Ok(())
    } else if [StatusCode::FORBIDDEN, StatusCode::NOT_FOUND, StatusCode::GONE].contains(&status) {
        Err(DispatchError::Unreachable)
    } else {
        Err(DispatchError::Failed(format!("webhook answered {status}")))
    }
}

impl Dispatcher for WebhookDispatcher {
    fn send_text<'a>(
        &'a self,
        subscriber: SubscriberId,
        text: &'a str,
    ) -> BoxFuture<'a, Result<(), DispatchError>> {
        Box::pin(async move {
            self.post(&TextPayload {
                subscriber_id: subscriber,
                text,
            })
            .await
        })
    }

    fn send_images<'a>(
        &'a self,
        subscriber: SubscriberId,
        images: &'a [Artifact],
        caption: &'a str,
    ) -> BoxFuture<'a, Result<(), DispatchError>> {
        Box::pin(async move {
            let images = images
                .iter()
                .map(|artifact| ImagePayload {
                    name: &artifact.name,
                    content_type: artifact.content_type,
                    data: encode_config(&artifact.bytes, STANDARD),
                })
                .collect();
            self.post(&ImagesPayload {
                subscriber_id: subscriber,
                caption,
                images,
            })
            .await
        })
    }
}
