//! Thread-scoped HTTP sessions.
//!
//! Each `SessionPool` lazily creates one `reqwest::Client` per thread the first
//! time that thread dispatches through it, and hands the same client back on
//! every later call from that thread. The cache belongs to the pool, so every
//! session it created is released when the pool (and thus the owning client) is
//! dropped. Entries of threads that exit earlier stay until then.

use crate::{call::PreparedCall, Error, Result};
use http::header::{AUTHORIZATION, CONTENT_LENGTH};
use http::{HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::ThreadId;
use std::time::Duration;

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_11_5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/50.0.2661.102 Safari/537.36";

/// Connection pool bound applied when none is configured.
pub const DEFAULT_MAX_POOL_CONNECTIONS: usize = 1024;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

/// Credentials attached to every request.
#[derive(Clone)]
pub(crate) enum Auth {
    /// HTTP basic authentication.
    Basic {
        /// The user name
        username: String,
        /// The password, if any
        password: Option<String>,
    },
    /// `Authorization: Bearer <token>`.
    Bearer(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Auth::Bearer(_) => f.debug_tuple("Bearer").field(&"<redacted>").finish(),
        }
    }
}

/// Settings shared by every session of a pool.
#[derive(Debug, Clone)]
pub(crate) struct SessionConfig {
    /// Per-request timeout, covering connect, send and body download.
    pub(crate) timeout: Duration,
    /// Default `User-Agent`, overridable per call.
    pub(crate) user_agent: String,
    /// Idle connections kept per host.
    pub(crate) max_pool_connections: usize,
    /// Credentials, skipped on calls that carry their own `Authorization`.
    pub(crate) auth: Option<Auth>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_pool_connections: DEFAULT_MAX_POOL_CONNECTIONS,
            auth: None,
        }
    }
}

/// A raw attempt result: the response head plus the body when buffered.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub(crate) response: reqwest::Response,
    pub(crate) body: Option<Vec<u8>>,
}

/// Per-thread session cache for one client.
#[derive(Debug)]
pub(crate) struct SessionPool {
    id: u64,
    config: SessionConfig,
    sessions: Mutex<HashMap<ThreadId, Arc<reqwest::Client>>>,
}

impl SessionPool {
    pub(crate) fn new(config: SessionConfig) -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of sessions this pool has created so far, one per thread that used it.
    pub(crate) fn sessions_created(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns this thread's session, creating it on first use.
    pub(crate) fn session(&self) -> Result<Arc<reqwest::Client>> {
        let thread = std::thread::current().id();
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(session) = sessions.get(&thread) {
            return Ok(Arc::clone(session));
        }

        let session = reqwest::Client::builder()
            .user_agent(self.config.user_agent.as_str())
            .pool_max_idle_per_host(self.config.max_pool_connections)
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| Error::ConfigurationError(format!("Failed to build HTTP client: {}", e)))?;
        let session = Arc::new(session);

        tracing::debug!(pool = self.id, thread = ?thread, "Created HTTP session");

        sessions.insert(thread, Arc::clone(&session));
        Ok(session)
    }

    /// Executes one attempt of `call` on `session`.
    ///
    /// Unless the call streams, the body is downloaded here, so a failed download
    /// is a failed attempt.
    pub(crate) async fn execute(
        &self,
        session: &reqwest::Client,
        call: &PreparedCall,
    ) -> std::result::Result<RawResponse, reqwest::Error> {
        let mut request = session
            .request(call.method.clone(), call.url.clone())
            .headers(request_headers(call));

        if !call.query.is_empty() {
            request = request.query(&call.query);
        }

        if let Some(body) = &call.body {
            request = request.body(body.clone());
        }

        let auth = self
            .config
            .auth
            .as_ref()
            .filter(|_| !call.headers.contains_key(AUTHORIZATION));
        request = match auth {
            Some(Auth::Basic { username, password }) => {
                request.basic_auth(username, password.as_ref())
            }
            Some(Auth::Bearer(token)) => request.bearer_auth(token),
            None => request,
        };

        let mut response = request.send().await?;
        let body = if call.stream {
            None
        } else {
            // Read through `chunk` so the response head stays available.
            let mut body = Vec::new();
            while let Some(chunk) = response.chunk().await? {
                body.extend_from_slice(&chunk);
            }
            Some(body)
        };

        Ok(RawResponse { response, body })
    }
}

/// Default `Content-Length` (0 without a body) overlaid with the caller's headers.
fn request_headers(call: &PreparedCall) -> HeaderMap {
    let body_len = call.body.as_ref().map_or(0, Vec::len);

    let mut headers = HeaderMap::with_capacity(call.headers.len() + 1);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body_len));
    for (name, value) in &call.headers {
        headers.insert(name.clone(), value.clone());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallArgs, HttpMethod, OperationSpec};

    fn prepare(args: CallArgs) -> PreparedCall {
        let spec = OperationSpec::new(HttpMethod::Get, "https://api.example.com/items")
            .allowed_headers(["content-length", "x-request-id"]);
        PreparedCall::new("get_items", &spec, args).unwrap()
    }

    #[test]
    fn test_bodyless_call_sends_zero_content_length() {
        let headers = request_headers(&prepare(CallArgs::new().header("X-Request-Id", "abc")));
        assert_eq!(headers.get(CONTENT_LENGTH).unwrap(), "0");
        assert_eq!(headers.get("x-request-id").unwrap(), "abc");
    }

    #[test]
    fn test_caller_content_length_overrides_default() {
        let headers = request_headers(&prepare(CallArgs::new().header("Content-Length", "7")));
        assert_eq!(headers.get_all(CONTENT_LENGTH).iter().count(), 1);
        assert_eq!(headers.get(CONTENT_LENGTH).unwrap(), "7");

        let headers = request_headers(&prepare(
            CallArgs::new().header("Content-Length", "3").body("payload"),
        ));
        assert_eq!(headers.get(CONTENT_LENGTH).unwrap(), "3");
    }

    #[test]
    fn test_one_session_per_thread() {
        let pool = std::sync::Arc::new(SessionPool::new(SessionConfig::default()));

        pool.session().unwrap();
        pool.session().unwrap();
        assert_eq!(pool.sessions_created(), 1);

        let other = pool.clone();
        std::thread::spawn(move || {
            other.session().unwrap();
            other.session().unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(pool.sessions_created(), 2);

        pool.session().unwrap();
        assert_eq!(pool.sessions_created(), 2);
    }

    #[test]
    fn test_pools_do_not_share_sessions() {
        let first = SessionPool::new(SessionConfig::default());
        let second = SessionPool::new(SessionConfig::default());
        first.session().unwrap();
        second.session().unwrap();
        assert_eq!(first.sessions_created(), 1);
        assert_eq!(second.sessions_created(), 1);
    }

    #[test]
    fn test_sessions_released_with_pool() {
        let mut released = Vec::new();
        for _ in 0..50 {
            let pool = SessionPool::new(SessionConfig::default());
            released.push(Arc::downgrade(&pool.session().unwrap()));
            drop(pool);
        }
        assert!(released.iter().all(|session| session.upgrade().is_none()));
    }

    #[test]
    fn test_other_threads_sessions_released_with_pool() {
        let pool = Arc::new(SessionPool::new(SessionConfig::default()));
        let worker = Arc::clone(&pool);
        let session = std::thread::spawn(move || Arc::downgrade(&worker.session().unwrap()))
            .join()
            .unwrap();

        assert!(session.upgrade().is_some());
        drop(pool);
        assert!(session.upgrade().is_none());
    }

    #[test]
    fn test_auth_debug_redacts_secrets() {
        let auth = Auth::Basic {
            username: "ada".to_string(),
            password: Some("hunter2".to_string()),
        };
        let rendered = format!("{:?}", auth);
        assert!(rendered.contains("ada"));
        assert!(!rendered.contains("hunter2"));
        assert!(!format!("{:?}", Auth::Bearer("tok".to_string())).contains("tok"));
    }
}
