//! Shared HTTP plumbing for the speech and translation services

use dub_common::Failure;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

const USER_AGENT: &str = concat!("dub-pipeline/", env!("CARGO_PKG_VERSION"));

/// Longest response body excerpt kept in failure details
const BODY_EXCERPT: usize = 1000;

/// Build the client shared by all HTTP-backed stages
pub fn build_client(timeout: Duration) -> dub_common::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| dub_common::Error::Config(format!("HTTP client setup failed: {}", e)))
}

/// Map a transport-level reqwest error
pub fn send_failure(err: reqwest::Error) -> Failure {
    if err.is_timeout() {
        Failure::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        Failure::Connection(err.to_string())
    } else if err.is_decode() || err.is_body() {
        Failure::Other(format!("malformed response: {}", err))
    } else {
        Failure::Other(err.to_string())
    }
}

/// Pass a 2xx response through, turn anything else into a [`Failure`]
pub async fn check_status(response: Response) -> Result<Response, Failure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(BODY_EXCERPT).collect();
    Err(status_failure(status, body))
}

fn status_failure(status: StatusCode, body: String) -> Failure {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Failure::Auth(format!("HTTP {}: {}", status.as_u16(), body))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            Failure::RateLimited(format!("HTTP {}: {}", status.as_u16(), body))
        }
        _ => Failure::Http {
            status: status.as_u16(),
            body,
        },
    }
}
