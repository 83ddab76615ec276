//! The successful outcome of a dispatch.
//!
//! The dispatcher does not interpret bodies. A [`Response`] keeps the status,
//! headers and resolved URL of the final attempt together with either the
//! buffered body or, for streamed calls, the body still on the wire.

use crate::{Error, Result};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

#[derive(Debug)]
enum Body {
    Buffered(Vec<u8>),
    Streaming(reqwest::Response),
}

/// A successful (status `100..300`) HTTP response.
///
/// # Examples
///
/// ```no_run
/// use opcall::{CallArgs, Client};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example(client: Client) -> Result<(), opcall::Error> {
/// let response = client.dispatch("get_user", CallArgs::new().arg("id", 123)).await?;
///
/// println!("Status: {}", response.status);
/// println!("Request took {:?} over {} attempts", response.latency, response.attempts);
///
/// let user: User = response.json().await?;
/// println!("User: {}", user.name);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Response {
    /// The HTTP status code of the final attempt.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The URL the request was sent to, after path-variable substitution.
    pub url: Url,

    /// The total latency of the call, including all retry attempts and backoff.
    pub latency: Duration,

    /// The number of attempts made to complete this call.
    ///
    /// This will be `1` for calls that succeeded on the first try.
    pub attempts: usize,

    body: Body,
}

impl Response {
    pub(crate) fn buffered(
        response: reqwest::Response,
        body: Vec<u8>,
        url: Url,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            url,
            latency,
            attempts,
            body: Body::Buffered(body),
        }
    }

    pub(crate) fn streaming(
        response: reqwest::Response,
        url: Url,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            url,
            latency,
            attempts,
            body: Body::Streaming(response),
        }
    }

    /// Returns `true` if the call required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns `true` if the body is still being streamed from the server.
    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Body::Streaming(_))
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Returns the next chunk of the body, or `None` once it is exhausted.
    ///
    /// A buffered body is returned whole as a single chunk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if reading a streamed body fails.
    pub async fn chunk(&mut self) -> Result<Option<Vec<u8>>> {
        match &mut self.body {
            Body::Buffered(body) if body.is_empty() => Ok(None),
            Body::Buffered(body) => Ok(Some(std::mem::take(body))),
            Body::Streaming(response) => Ok(response.chunk().await?.map(|c| c.to_vec())),
        }
    }

    /// Returns the full body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if reading a streamed body fails.
    pub async fn bytes(self) -> Result<Vec<u8>> {
        match self.body {
            Body::Buffered(body) => Ok(body),
            Body::Streaming(response) => Ok(response.bytes().await?.to_vec()),
        }
    }

    /// Returns the body decoded as UTF-8, replacing invalid sequences.
    pub async fn text(self) -> Result<String> {
        let body = self.bytes().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] with the raw body if it does not
    /// match `T`.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let status = self.status;
        let raw_body = self.text().await?;

        serde_json::from_str::<T>(&raw_body).map_err(|e| {
            tracing::error!(
                error = %e,
                raw_response = %raw_body,
                "Failed to deserialize response"
            );
            Error::DeserializationFailed {
                raw_response: raw_body,
                serde_error: e.to_string(),
                status,
            }
        })
    }
}
