//! # opcall - declarative REST operations with retries
//!
//! opcall dispatches named REST operations. Each operation is declared once as
//! an [`OperationSpec`]: a URL template, an HTTP method, and the contract its
//! arguments must satisfy (path variables, required/allowed query parameters,
//! required/allowed headers). A dispatch validates the arguments before any
//! network I/O, sends the request through a per-thread connection pool, and
//! retries transient failures under a [`RetryPolicy`] with exponential backoff.
//!
//! ## Quick Start
//!
//! ```no_run
//! use opcall::{CallArgs, Client, HttpMethod, OperationSpec};
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), opcall::Error> {
//!     let client = Client::builder()
//!         .operation(
//!             "get_user",
//!             OperationSpec::new(HttpMethod::Get, "https://api.example.com/users/{id}")
//!                 .path_vars(["id"])
//!                 .allowed_params(["key", "fields"])
//!                 .required_params(["key"]),
//!         )
//!         .timeout(Duration::from_secs(30))
//!         .build()?;
//!
//!     let response = client
//!         .dispatch("get_user", CallArgs::new().arg("id", 123).arg("key", "secret"))
//!         .await?;
//!     println!("Request took {:?} over {} attempts", response.latency, response.attempts);
//!
//!     let user: User = response.json().await?;
//!     println!("User {}: {}", user.id, user.name);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Contract violations are reported before any request is sent and name the
//! offending arguments:
//!
//! ```no_run
//! use opcall::{CallArgs, Client, Error};
//!
//! # async fn example(client: Client) {
//! match client.dispatch("get_user", CallArgs::new().arg("key", "secret")).await {
//!     Err(Error::MissingPathVariable { missing, .. }) => {
//!         eprintln!("missing path variables: {:?}", missing);
//!     }
//!     Err(Error::Transport { attempts, source }) => {
//!         eprintln!("gave up after {} attempts: {}", attempts, source);
//!     }
//!     Err(e) => eprintln!("{}", e),
//!     Ok(response) => println!("{}", response.status),
//! }
//! # }
//! ```
//!
//! ## Retry Policies
//!
//! By default every dispatch starts a fresh [`retry::ExponentialRetryPolicy`]
//! (4 retries, 1s initial backoff, factor 4). Statuses 401, 408, 429, 104 and
//! 5xx other than 501/505 are retried, as are transport failures.
//!
//! ```
//! use opcall::Client;
//! use opcall::retry::ExponentialRetryPolicy;
//! use std::time::Duration;
//!
//! let client = Client::builder()
//!     .retry_policy(
//!         ExponentialRetryPolicy::new(5, Duration::from_millis(100), 2).with_jitter(true),
//!     )
//!     .build()
//!     .unwrap();
//! ```

mod call;
mod client;
mod error;
mod operation;
mod response;
pub mod retry;
pub mod session;
pub mod weather;

pub use call::{CallArgs, PreparedCall};
pub use client::{Client, ClientBuilder};
pub use error::{Error, Result};
pub use operation::{HttpMethod, OperationRegistry, OperationSpec, RegistryBuilder};
pub use response::Response;
pub use retry::{RetryDecision, RetryPolicy};
