//! Request plumbing shared by the REST clients.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::{PlatformError, PlatformResult};
use crate::models::Deletion;

/// HTTP connect timeout for platform API calls.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// HTTP total timeout for platform API calls. Job logs can be large.
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Error bodies are cut to this many characters.
const ERROR_BODY_LIMIT: usize = 800;

#[derive(Clone)]
pub(super) struct ApiHttp {
    pub(super) http: reqwest::Client,
    base: String,
    platform: &'static str,
}

impl ApiHttp {
    pub(super) fn new(
        platform: &'static str,
        base: &str,
        headers: HeaderMap,
    ) -> PlatformResult<Self> {
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Client {
                platform,
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            platform,
        })
    }

    pub(super) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Send and return the raw response, whatever its status.
    pub(super) async fn send_raw(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> PlatformResult<Response> {
        request.send().await.map_err(|source| PlatformError::Transport {
            platform: self.platform,
            operation: operation.to_string(),
            source,
        })
    }

    /// Turn a non-success response into [`PlatformError::Status`].
    pub(super) async fn status_error(&self, operation: &str, response: Response) -> PlatformError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        PlatformError::Status {
            platform: self.platform,
            operation: operation.to_string(),
            status,
            body: truncate_for_error(&body, ERROR_BODY_LIMIT),
        }
    }

    /// Send and require a success status.
    pub(super) async fn send(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> PlatformResult<Response> {
        let response = self.send_raw(operation, request).await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(self.status_error(operation, response).await)
        }
    }

    pub(super) async fn decode<T: DeserializeOwned>(
        &self,
        operation: &str,
        response: Response,
    ) -> PlatformResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|source| PlatformError::Decode {
                platform: self.platform,
                operation: operation.to_string(),
                source,
            })
    }

    pub(super) async fn json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> PlatformResult<T> {
        let response = self.send(operation, request).await?;
        self.decode(operation, response).await
    }

    /// Like [`Self::json`], but a 404 yields `None`.
    pub(super) async fn optional_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> PlatformResult<Option<T>> {
        let response = self.send_raw(operation, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.status_error(operation, response).await);
        }
        self.decode(operation, response).await.map(Some)
    }

    pub(super) async fn bytes(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> PlatformResult<Vec<u8>> {
        let response = self.send(operation, request).await?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|source| PlatformError::Decode {
                platform: self.platform,
                operation: operation.to_string(),
                source,
            })
    }

    /// Send a call whose body is irrelevant.
    pub(super) async fn empty(&self, operation: &str, request: RequestBuilder) -> PlatformResult<()> {
        self.send(operation, request).await.map(|_| ())
    }

    /// Send a delete; 404 maps to [`Deletion::NotFound`].
    pub(super) async fn delete(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> PlatformResult<Deletion> {
        let response = self.send_raw(operation, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Deletion::NotFound);
        }
        if !response.status().is_success() {
            return Err(self.status_error(operation, response).await);
        }
        Ok(Deletion::Deleted)
    }
}

/// Cut `text` to at most `limit` characters, marking the cut.
pub(super) fn truncate_for_error(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}

/// Percent-encode a single path segment or query value.
pub(super) fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
