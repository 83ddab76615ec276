//! The operation dispatcher.
//!
//! The [`Client`] type owns an [`OperationRegistry`], a per-thread session pool
//! and a retry policy template. Use [`ClientBuilder`] to configure and create
//! clients.

use crate::{
    call::{CallArgs, PreparedCall},
    operation::{OperationRegistry, OperationSpec},
    retry::{Attempt, ExponentialRetryPolicy, RetryDecision, RetryPolicy},
    session::{Auth, SessionConfig, SessionPool},
    Error, Response, Result,
};
use http::StatusCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

type PolicyFactory = Arc<dyn Fn() -> Box<dyn RetryPolicy> + Send + Sync>;

/// A REST client that dispatches registered operations with retries.
///
/// The client is cheap to clone and designed to be reused. Each thread that
/// dispatches through it gets its own lazily-created connection pool.
///
/// # Examples
///
/// ```no_run
/// use opcall::{CallArgs, Client, HttpMethod, OperationSpec};
/// use opcall::retry::ExponentialRetryPolicy;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), opcall::Error> {
/// let client = Client::builder()
///     .operation(
///         "get_user",
///         OperationSpec::new(HttpMethod::Get, "https://api.example.com/users/{id}")
///             .path_vars(["id"])
///             .allowed_params(["fields"]),
///     )
///     .timeout(Duration::from_secs(30))
///     .retry_policy(ExponentialRetryPolicy::new(3, Duration::from_millis(200), 2))
///     .build()?;
///
/// let response = client
///     .dispatch("get_user", CallArgs::new().arg("id", 123).arg("fields", "name"))
///     .await?;
/// println!("{}", response.text().await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    registry: OperationRegistry,
    sessions: SessionPool,
    retry_policy: PolicyFactory,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("operations", &self.inner.registry.names())
            .field("session", self.inner.sessions.config())
            .finish()
    }
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Returns the operations this client can dispatch.
    pub fn registry(&self) -> &OperationRegistry {
        &self.inner.registry
    }

    /// Number of per-thread sessions this client has created so far.
    pub fn sessions_created(&self) -> usize {
        self.inner.sessions.sessions_created()
    }

    /// Dispatches `operation` with a fresh copy of the client's retry policy.
    ///
    /// See [`Client::dispatch_with_policy`] for the full contract.
    pub async fn dispatch(&self, operation: &str, args: CallArgs) -> Result<Response> {
        let mut policy = (self.inner.retry_policy)();
        self.dispatch_with_policy(operation, args, &mut *policy).await
    }

    /// Dispatches `operation` under a caller-supplied retry policy.
    ///
    /// Arguments are validated against the operation's spec before any network
    /// I/O, so malformed calls never consume the retry budget. Attempts are then
    /// made one after another until one succeeds (status `100..300`) or `policy`
    /// says to stop; the policy's backoff delays suspend only the calling task.
    ///
    /// Passing the same policy to several calls shares its backoff state between
    /// them.
    ///
    /// # Errors
    ///
    /// * contract violations ([`Error::UnconfiguredOperation`],
    ///   [`Error::MissingPathVariable`], [`Error::MissingRequiredParam`],
    ///   [`Error::UnexpectedParam`], [`Error::MissingRequiredHeader`],
    ///   [`Error::UnexpectedHeader`]) before any attempt;
    /// * [`Error::Transport`] if the last attempt failed below HTTP;
    /// * [`Error::PermissionDenied`] (403), [`Error::NotFound`] (404) or
    ///   [`Error::ServerError`] (other >= 400) for the last attempt's status.
    pub async fn dispatch_with_policy(
        &self,
        operation: &str,
        args: CallArgs,
        policy: &mut dyn RetryPolicy,
    ) -> Result<Response> {
        let spec = self.resolve(operation)?;
        let call = PreparedCall::new(operation, spec, args)?;
        let session = self.inner.sessions.session()?;

        let start_time = Instant::now();
        let mut retry_count = 0;

        let outcome = loop {
            tracing::debug!(
                operation = operation,
                method = %call.method,
                url = %call.url,
                attempt = retry_count + 1,
                "Executing HTTP request"
            );

            let outcome = self.inner.sessions.execute(&session, &call).await;

            let attempt = match &outcome {
                Ok(raw) => Attempt::Response(raw.response.status()),
                Err(e) => Attempt::Transport(e),
            };
            if matches!(attempt, Attempt::Response(status) if is_successful(status)) {
                break outcome;
            }

            tracing::warn!(
                operation = operation,
                outcome = %DisplayAttempt(&attempt),
                retry_count = retry_count,
                "Request attempt failed"
            );

            match policy.should_retry(&attempt, retry_count) {
                RetryDecision::Stop => break outcome,
                RetryDecision::RetryAfter(delay) => {
                    tracing::info!(
                        operation = operation,
                        delay_ms = delay.as_millis(),
                        retry_count = retry_count,
                        "Retrying request after delay"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
            }
        };

        let attempts = retry_count + 1;
        let latency = start_time.elapsed();

        let raw = match outcome {
            Ok(raw) => raw,
            Err(source) => {
                tracing::error!(
                    operation = operation,
                    error = %source,
                    attempts = attempts,
                    "Transport failure persisted through retries"
                );
                return Err(Error::Transport { attempts, source });
            }
        };

        let status = raw.response.status();
        tracing::info!(
            operation = operation,
            status = status.as_u16(),
            latency_ms = latency.as_millis(),
            attempts = attempts,
            "Received HTTP response"
        );

        let url = call.url;
        match status.as_u16() {
            403 => {
                tracing::error!(operation = operation, url = %url, "Permission denied");
                Err(Error::PermissionDenied { url: url.into() })
            }
            404 => {
                tracing::error!(operation = operation, url = %url, "Not found");
                Err(Error::NotFound { url: url.into() })
            }
            code if code >= 400 => {
                let raw_response = raw
                    .body
                    .map(|body| String::from_utf8_lossy(&body).into_owned())
                    .unwrap_or_default();
                tracing::error!(
                    operation = operation,
                    status = code,
                    response = %raw_response,
                    "Operation error from server"
                );
                Err(Error::ServerError {
                    status,
                    url: url.into(),
                    raw_response,
                })
            }
            _ => Ok(match raw.body {
                Some(body) => Response::buffered(raw.response, body, url, latency, attempts),
                None => Response::streaming(raw.response, url, latency, attempts),
            }),
        }
    }

    fn resolve(&self, operation: &str) -> Result<&OperationSpec> {
        if self.inner.registry.is_empty() {
            tracing::error!(operation = operation, "Client has no operations defined");
        }
        self.inner.registry.resolve(operation)
    }
}

fn is_successful(status: StatusCode) -> bool {
    (100..300).contains(&status.as_u16())
}

struct DisplayAttempt<'a, 'b>(&'a Attempt<'b>);

impl std::fmt::Display for DisplayAttempt<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Attempt::Response(status) => write!(f, "status {}", status.as_u16()),
            Attempt::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```
/// use opcall::{ClientBuilder, HttpMethod, OperationSpec};
/// use opcall::retry::NoRetryPolicy;
/// use std::time::Duration;
///
/// let client = ClientBuilder::new()
///     .operation(
///         "health",
///         OperationSpec::new(HttpMethod::Get, "https://api.example.com/health"),
///     )
///     .timeout(Duration::from_secs(5))
///     .user_agent("my-app/1.0")
///     .bearer_auth("token")
///     .retry_policy(NoRetryPolicy)
///     .build()
///     .unwrap();
///
/// assert_eq!(client.registry().names(), vec!["health"]);
/// ```
pub struct ClientBuilder {
    registry: Option<OperationRegistry>,
    operations: Vec<(String, OperationSpec)>,
    session: SessionConfig,
    retry_policy: PolicyFactory,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    ///
    /// Defaults: 60s timeout, a browser-like user agent, 1024 pooled connections
    /// per host, no auth, and [`ExponentialRetryPolicy::default`].
    pub fn new() -> Self {
        Self {
            registry: None,
            operations: Vec::new(),
            session: SessionConfig::default(),
            retry_policy: Arc::new(|| {
                Box::new(ExponentialRetryPolicy::default()) as Box<dyn RetryPolicy>
            }),
        }
    }

    /// Uses a prebuilt registry. Operations added with
    /// [`ClientBuilder::operation`] are merged into it.
    pub fn registry(mut self, registry: OperationRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Registers one operation.
    pub fn operation(mut self, name: impl Into<String>, spec: OperationSpec) -> Self {
        self.operations.push((name.into(), spec));
        self
    }

    /// Sets the fixed per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.session.timeout = timeout;
        self
    }

    /// Sets the default `User-Agent` header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.session.user_agent = user_agent.into();
        self
    }

    /// Sets the number of pooled connections kept per host and thread.
    pub fn max_pool_connections(mut self, max: usize) -> Self {
        self.session.max_pool_connections = max;
        self
    }

    /// Authenticates every request with HTTP basic auth.
    ///
    /// A call that passes its own `authorization` header sends that instead.
    pub fn basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.session.auth = Some(Auth::Basic {
            username: username.into(),
            password,
        });
        self
    }

    /// Authenticates every request with a bearer token, unless the call passes
    /// its own `authorization` header.
    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.session.auth = Some(Auth::Bearer(token.into()));
        self
    }

    /// Sets the retry policy template. Each dispatch starts from a fresh clone.
    pub fn retry_policy<P>(mut self, policy: P) -> Self
    where
        P: RetryPolicy + Clone + Sync + 'static,
    {
        self.retry_policy = Arc::new(move || Box::new(policy.clone()) as Box<dyn RetryPolicy>);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if an operation fails validation or is
    /// registered twice.
    pub fn build(self) -> Result<Client> {
        let registry = match self.registry {
            Some(registry) if self.operations.is_empty() => registry,
            prebuilt => {
                let mut builder = OperationRegistry::builder();
                if let Some(registry) = prebuilt {
                    for name in registry.names() {
                        if let Some(spec) = registry.get(name) {
                            builder = builder.operation(name, spec.clone());
                        }
                    }
                }
                self.operations
                    .into_iter()
                    .fold(builder, |builder, (name, spec)| builder.operation(name, spec))
                    .build()?
            }
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                registry,
                sessions: SessionPool::new(self.session),
                retry_policy: self.retry_policy,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpMethod;

    fn client() -> Client {
        Client::builder()
            .operation(
                "get_time",
                OperationSpec::new(HttpMethod::Get, "http://127.0.0.1:9/t/{location}")
                    .path_vars(["location"])
                    .allowed_params(["key"])
                    .required_params(["key"]),
            )
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_operation_fails_before_io() {
        let result = client().dispatch("get_forecast", CallArgs::new()).await;
        match result {
            Err(Error::UnconfiguredOperation { operation }) => {
                assert_eq!(operation, "get_forecast")
            }
            other => panic!("Expected UnconfiguredOperation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_registry_is_unconfigured() {
        let client = Client::builder().build().unwrap();
        assert!(client.registry().is_empty());
        assert!(matches!(
            client.dispatch("anything", CallArgs::new()).await,
            Err(Error::UnconfiguredOperation { .. })
        ));
    }

    #[tokio::test]
    async fn test_contract_violation_creates_no_session() {
        let client = client();
        let result = client
            .dispatch("get_time", CallArgs::new().arg("key", "k"))
            .await;
        assert!(matches!(result, Err(Error::MissingPathVariable { .. })));
        assert_eq!(client.sessions_created(), 0);
    }

    #[test]
    fn test_builder_merges_registry_and_operations() {
        let registry = OperationRegistry::builder()
            .operation("a", OperationSpec::new(HttpMethod::Get, "https://h/a"))
            .build()
            .unwrap();
        let client = Client::builder()
            .registry(registry)
            .operation("b", OperationSpec::new(HttpMethod::Post, "https://h/b"))
            .build()
            .unwrap();
        assert_eq!(client.registry().names(), vec!["a", "b"]);
    }

    #[test]
    fn test_builder_rejects_invalid_operation() {
        let result = Client::builder()
            .operation(
                "bad",
                OperationSpec::new(HttpMethod::Get, "https://h/{id}"),
            )
            .build();
        assert!(matches!(result, Err(Error::InvalidOperation { .. })));
    }

    #[test]
    fn test_success_range() {
        assert!(is_successful(StatusCode::OK));
        assert!(is_successful(StatusCode::CONTINUE));
        assert!(is_successful(StatusCode::NO_CONTENT));
        assert!(!is_successful(StatusCode::MOVED_PERMANENTLY));
        assert!(!is_successful(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
