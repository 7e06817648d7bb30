//! HTTP client for the dubbing service

use async_trait::async_trait;
use dub_common::api::{ErrorEnvelope, StatusView, SubmitRequest, SubmitResponse};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::error::ClientError;
use crate::poller::StatusSource;
use crate::retry::RetrySchedule;

const USER_AGENT: &str = concat!("dub-client/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Typed access to the dubbing service endpoints
///
/// Every call goes through the client's [`RetrySchedule`].
#[derive(Debug, Clone)]
pub struct DubClient {
    base_url: Url,
    http: Client,
    retry: RetrySchedule,
}

impl DubClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidInput(format!("service URL {}: {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::InvalidInput(format!("HTTP client setup: {}", e)))?;

        Ok(Self {
            base_url,
            http,
            retry: RetrySchedule::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetrySchedule) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_schedule(&self) -> &RetrySchedule {
        &self.retry
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidInput(format!("endpoint {}: {}", path, e)))
    }

    /// Submit a job
    ///
    /// The request is validated locally first; an invalid request is never sent.
    pub async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, ClientError> {
        let request = request.validate()?;
        let url = self.endpoint("dub/submit")?;
        debug!("POST {}", url);

        let (http, url, request) = (&self.http, &url, &request);
        let response: SubmitResponse = self
            .retry
            .run("submit", move || async move {
                let response = http.post(url.clone()).json(request).send().await?;
                expect_json(response, None).await
            })
            .await?;

        info!(session_id = %response.session_id, "Job submitted");
        Ok(response)
    }

    /// Current status of a session
    pub async fn status(&self, session_id: Uuid) -> Result<StatusView, ClientError> {
        self.retry
            .run("status", move || self.status_once(session_id))
            .await
    }

    /// Single status request, outside the retry schedule
    pub async fn status_once(&self, session_id: Uuid) -> Result<StatusView, ClientError> {
        let url = self.endpoint(&format!("dub/status/{}", session_id))?;
        let response = self.http.get(url).send().await?;
        expect_json(response, Some(session_id)).await
    }

    /// Download the final video to `destination`
    ///
    /// Streams the body to disk chunk by chunk and returns the number of bytes
    /// written. A partial file is removed on failure.
    pub async fn download_result(
        &self,
        session_id: Uuid,
        destination: &Path,
    ) -> Result<u64, ClientError> {
        let url = self.endpoint(&format!("dub/result/{}", session_id))?;
        let (http, url) = (&self.http, &url);
        let written = self
            .retry
            .run("result", move || async move {
                let response = http.get(url.clone()).send().await?;
                let response = expect_success(response, Some(session_id)).await?;
                let result = write_body(response, destination).await;
                if result.is_err() {
                    tokio::fs::remove_file(destination).await.ok();
                }
                result
            })
            .await?;

        info!(session_id = %session_id, bytes = written, "Downloaded {}", destination.display());
        Ok(written)
    }

    /// Ask the service to cancel a running session
    pub async fn cancel(&self, session_id: Uuid) -> Result<(), ClientError> {
        let url = self.endpoint(&format!("dub/cancel/{}", session_id))?;
        let (http, url) = (&self.http, &url);
        self.retry
            .run("cancel", move || async move {
                let response = http.post(url.clone()).send().await?;
                expect_success(response, Some(session_id)).await.map(|_| ())
            })
            .await
    }
}

#[async_trait]
impl StatusSource for DubClient {
    /// The poller counts and spaces failed fetches itself
    async fn fetch_status(&self, session_id: Uuid) -> Result<StatusView, ClientError> {
        self.status_once(session_id).await
    }
}

async fn write_body(mut response: Response, destination: &Path) -> Result<u64, ClientError> {
    let mut file = tokio::fs::File::create(destination).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

async fn expect_json<T: DeserializeOwned>(
    response: Response,
    session_id: Option<Uuid>,
) -> Result<T, ClientError> {
    let response = expect_success(response, session_id).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

/// Pass 2xx responses through; turn anything else into a [`ClientError`]
async fn expect_success(
    response: Response,
    session_id: Option<Uuid>,
) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let envelope = serde_json::from_str::<ErrorEnvelope>(&text).ok();

    match (status, session_id, envelope.as_ref().map(|e| e.error.code.as_str())) {
        (StatusCode::NOT_FOUND, Some(id), _) => return Err(ClientError::NotFound(id)),
        (StatusCode::CONFLICT, Some(id), Some("NOT_READY")) => {
            return Err(ClientError::NotReady(id))
        }
        _ => {}
    }

    Err(match envelope {
        Some(envelope) => ClientError::Rejected {
            status: status.as_u16(),
            code: envelope.error.code,
            message: envelope.error.message,
            kind: envelope.error.kind,
        },
        None => ClientError::Rejected {
            status: status.as_u16(),
            code: status
                .canonical_reason()
                .unwrap_or("HTTP_ERROR")
                .to_uppercase()
                .replace(' ', "_"),
            message: excerpt(&text),
            kind: None,
        },
    })
}

fn excerpt(text: &str) -> String {
    const LIMIT: usize = 500;
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
