//! Error types for operation dispatch.
//!
//! Every failure carries structured data (the offending names, the resolved URL,
//! the status code) so callers can match on it instead of parsing messages.

use http::StatusCode;
use std::collections::BTreeSet;
use std::fmt;

/// The main error type for dispatching REST operations.
///
/// Errors fall into three families:
///
/// * contract violations ([`Error::UnconfiguredOperation`], [`Error::MissingPathVariable`],
///   [`Error::MissingRequiredParam`], [`Error::UnexpectedParam`],
///   [`Error::MissingRequiredHeader`], [`Error::UnexpectedHeader`]) are detected before
///   any network I/O and never retried;
/// * [`Error::Transport`] is a network failure that outlived the retry budget;
/// * [`Error::PermissionDenied`], [`Error::NotFound`] and [`Error::ServerError`] are
///   the terminal HTTP outcomes of the last attempt.
///
/// # Examples
///
/// ```no_run
/// use opcall::{CallArgs, Client, Error};
///
/// # async fn example(client: Client) {
/// match client.dispatch("get_user", CallArgs::new().arg("id", 7)).await {
///     Ok(response) => println!("status {}", response.status),
///     Err(Error::MissingRequiredParam { missing, .. }) => {
///         eprintln!("forgot: {:?}", missing);
///     }
///     Err(Error::NotFound { url }) => eprintln!("{} not found", url),
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The operation name is not registered (or the registry is empty).
    #[error("No definition for operation {operation}")]
    UnconfiguredOperation {
        /// The requested operation name
        operation: String,
    },

    /// One or more declared path variables were not supplied.
    #[error("Path variables missing for {operation}: {}", Names(.missing))]
    MissingPathVariable {
        /// The operation being dispatched
        operation: String,
        /// The path variables that were not supplied
        missing: BTreeSet<String>,
    },

    /// One or more required query parameters were not supplied.
    #[error("Required parameters missing for {operation}: {}", Names(.missing))]
    MissingRequiredParam {
        /// The operation being dispatched
        operation: String,
        /// The required parameters that were not supplied
        missing: BTreeSet<String>,
    },

    /// Query parameters outside the allowed set were supplied.
    #[error("Extra parameters given for {operation}: {}", Names(.unexpected))]
    UnexpectedParam {
        /// The operation being dispatched
        operation: String,
        /// The parameters that are not allowed
        unexpected: BTreeSet<String>,
    },

    /// One or more required headers were not supplied.
    #[error("Required headers missing for {operation}: {}", Names(.missing))]
    MissingRequiredHeader {
        /// The operation being dispatched
        operation: String,
        /// The required headers that were not supplied (lower case)
        missing: BTreeSet<String>,
    },

    /// Headers outside the allowed set were supplied.
    #[error("Extra headers given for {operation}: {}", Names(.unexpected))]
    UnexpectedHeader {
        /// The operation being dispatched
        operation: String,
        /// The headers that are not allowed (lower case)
        unexpected: BTreeSet<String>,
    },

    /// A network-level failure persisted through the whole retry budget.
    ///
    /// Wraps the `reqwest::Error` of the last attempt.
    #[error("HTTP error after {attempts} attempts: {source}")]
    Transport {
        /// The number of attempts made
        attempts: usize,
        /// The transport error of the last attempt
        #[source]
        source: reqwest::Error,
    },

    /// The server answered 403.
    #[error("Permission denied: {url}")]
    PermissionDenied {
        /// The resolved request URL
        url: String,
    },

    /// The server answered 404.
    #[error("{url} not found")]
    NotFound {
        /// The resolved request URL
        url: String,
    },

    /// The server answered with any other status >= 400.
    #[error("Operation error from server (status {status}) at {url}")]
    ServerError {
        /// The HTTP status code of the last attempt
        status: StatusCode,
        /// The resolved request URL
        url: String,
        /// The raw response body, empty for streamed responses
        raw_response: String,
    },

    /// An operation spec failed registration-time validation.
    #[error("Invalid operation {operation}: {reason}")]
    InvalidOperation {
        /// The operation name
        operation: String,
        /// What is wrong with the spec
        reason: String,
    },

    /// Invalid configuration was provided.
    ///
    /// Covers invalid header names or values and HTTP client construction failures.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The URL produced by path-variable substitution does not parse.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Failed to deserialize the response body into the expected type.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// Reading a response body failed after a successful dispatch.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A registry document is not valid JSON for the expected shape.
    #[error("Invalid registry document: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` for errors raised by argument validation, before any network call.
    ///
    /// # Examples
    ///
    /// ```
    /// use opcall::Error;
    ///
    /// let err = Error::UnconfiguredOperation { operation: "nope".to_string() };
    /// assert!(err.is_contract_violation());
    ///
    /// let err = Error::NotFound { url: "https://example.com/x".to_string() };
    /// assert!(!err.is_contract_violation());
    /// ```
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::UnconfiguredOperation { .. }
                | Error::MissingPathVariable { .. }
                | Error::MissingRequiredParam { .. }
                | Error::UnexpectedParam { .. }
                | Error::MissingRequiredHeader { .. }
                | Error::UnexpectedHeader { .. }
        )
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::PermissionDenied { .. } => Some(StatusCode::FORBIDDEN),
            Error::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            Error::ServerError { status, .. } => Some(*status),
            Error::DeserializationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::ServerError { raw_response, .. } => Some(raw_response),
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

/// Renders a name set as `{a, b}`.
struct Names<'a>(&'a BTreeSet<String>);

impl fmt::Display for Names<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, name) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
        }
        f.write_str("}")
    }
}

/// A specialized `Result` type for operation dispatch.
pub type Result<T> = std::result::Result<T, Error>;
