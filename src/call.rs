//! Call arguments and their validation against an [`OperationSpec`].

use crate::{operation::OperationSpec, Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use url::Url;

/// The arguments of one dispatch.
///
/// Arguments named after a path variable of the operation are substituted into
/// its URL; every other argument is sent as a query parameter.
///
/// # Examples
///
/// ```
/// use opcall::CallArgs;
///
/// let args = CallArgs::new()
///     .arg("location", "38.9697,-77.385")
///     .arg("start_date", 1_600_000_000)
///     .arg("key", "secret")
///     .header("Accept", "application/json");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    args: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body: Option<Vec<u8>>,
    stream: bool,
}

impl CallArgs {
    /// Creates an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a path variable or query parameter.
    pub fn arg(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.args.insert(name.into(), value.to_string());
        self
    }

    /// Adds multiple path variables or query parameters.
    pub fn args<I, K, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Display,
    {
        self.args
            .extend(args.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }

    /// Adds a request header. Names are case-insensitive.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets the request body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Leaves the response body on the wire instead of buffering it.
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// A validated call, ready to be executed (possibly several times).
#[derive(Debug, Clone)]
pub struct PreparedCall {
    /// The HTTP method.
    pub method: Method,
    /// The URL with path variables substituted.
    pub url: Url,
    /// Every argument that is not a path variable.
    pub query: Vec<(String, String)>,
    /// Caller-supplied headers.
    pub headers: HeaderMap,
    /// The request body.
    pub body: Option<Vec<u8>>,
    /// Whether the response body is streamed.
    pub stream: bool,
}

impl PreparedCall {
    /// Validates `args` against `spec` and resolves the request.
    ///
    /// Checks run in a fixed order and the first failure wins: path variables,
    /// required params, unexpected params, required headers, unexpected headers.
    ///
    /// # Errors
    ///
    /// Returns the contract-violation variant of [`Error`] naming the offending
    /// set, [`Error::ConfigurationError`] for header names or values that are not
    /// valid HTTP, or [`Error::InvalidUrl`] if the resolved URL does not parse.
    pub fn new(operation: &str, spec: &OperationSpec, args: CallArgs) -> Result<Self> {
        let CallArgs {
            args,
            headers,
            body,
            stream,
        } = args;

        let supplied: BTreeSet<String> = args.keys().cloned().collect();

        let missing: BTreeSet<String> = spec.path_vars.difference(&supplied).cloned().collect();
        if !missing.is_empty() {
            return Err(Error::MissingPathVariable {
                operation: operation.to_string(),
                missing,
            });
        }

        let resolved = spec.resolve_url(&args);

        let params: BTreeSet<String> = supplied.difference(&spec.path_vars).cloned().collect();

        let missing: BTreeSet<String> = spec.required_params.difference(&params).cloned().collect();
        if !missing.is_empty() {
            return Err(Error::MissingRequiredParam {
                operation: operation.to_string(),
                missing,
            });
        }

        let unexpected: BTreeSet<String> =
            params.difference(&spec.allowed_params).cloned().collect();
        if !unexpected.is_empty() {
            return Err(Error::UnexpectedParam {
                operation: operation.to_string(),
                unexpected,
            });
        }

        let header_names: BTreeSet<String> = headers.keys().cloned().collect();

        let missing: BTreeSet<String> = spec
            .required_headers
            .difference(&header_names)
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingRequiredHeader {
                operation: operation.to_string(),
                missing,
            });
        }

        let unexpected: BTreeSet<String> = header_names
            .difference(&spec.allowed_headers)
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            return Err(Error::UnexpectedHeader {
                operation: operation.to_string(),
                unexpected,
            });
        }

        let query = args
            .into_iter()
            .filter(|(name, _)| params.contains(name))
            .collect();

        let mut header_map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let name = HeaderName::try_from(name.as_str()).map_err(|e| {
                Error::ConfigurationError(format!("Invalid header name: {}", e))
            })?;
            let value = HeaderValue::try_from(value).map_err(|e| {
                Error::ConfigurationError(format!("Invalid header value: {}", e))
            })?;
            header_map.insert(name, value);
        }

        Ok(Self {
            method: spec.method.into(),
            url: Url::parse(&resolved)?,
            query,
            headers: header_map,
            body,
            stream,
        })
    }
}
