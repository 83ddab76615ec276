//! Example demonstrating retry policies.
//!
//! This example shows how to:
//! - Tune the exponential policy
//! - Fail fast with the no-retry policy
//! - Implement a domain-specific policy
//! - Share backoff state across calls
//!
//! Run with: `cargo run --example custom_retry`

use opcall::retry::{Attempt, ExponentialRetryPolicy, NoRetryPolicy};
use opcall::{CallArgs, Client, Error, HttpMethod, OperationSpec, RetryDecision, RetryPolicy};
use std::time::Duration;

/// Retries only rate-limited calls, at a fixed pace, a bounded number of times.
#[derive(Clone)]
struct PatientOnRateLimit {
    max_retries: usize,
    delay: Duration,
}

impl RetryPolicy for PatientOnRateLimit {
    fn should_retry(&mut self, attempt: &Attempt<'_>, retry_count: usize) -> RetryDecision {
        match attempt {
            Attempt::Response(status) if status.as_u16() == 429 && retry_count < self.max_retries => {
                RetryDecision::RetryAfter(self.delay)
            }
            _ => RetryDecision::Stop,
        }
    }
}

fn build(policy: impl RetryPolicy + Clone + Sync + 'static) -> Result<Client, Error> {
    Client::builder()
        .operation(
            "status",
            OperationSpec::new(HttpMethod::Get, "https://httpbin.org/status/{code}")
                .path_vars(["code"]),
        )
        .retry_policy(policy)
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("opcall=info,custom_retry=info")
        .init();

    println!("=== Example 1: Tuned exponential backoff ===");
    // 200ms, 400ms, 800ms
    let client = build(
        ExponentialRetryPolicy::new(3, Duration::from_millis(200), 2).with_jitter(true),
    )?;
    match client.dispatch("status", CallArgs::new().arg("code", 503)).await {
        Ok(response) => println!("Success! Attempts: {}", response.attempts),
        Err(e) => println!("Failed: {}", e),
    }
    println!();

    println!("=== Example 2: Fail fast ===");
    let client = build(NoRetryPolicy)?;
    match client.dispatch("status", CallArgs::new().arg("code", 500)).await {
        Ok(response) => println!("Success! Attempts: {}", response.attempts),
        Err(e) => println!("Failed immediately: {}", e),
    }
    println!();

    println!("=== Example 3: Rate limits only ===");
    let client = build(PatientOnRateLimit {
        max_retries: 2,
        delay: Duration::from_millis(500),
    })?;
    match client.dispatch("status", CallArgs::new().arg("code", 429)).await {
        Ok(response) => println!("Success! Attempts: {}", response.attempts),
        Err(e) => println!("Gave up: {}", e),
    }
    println!();

    println!("=== Example 4: One backoff budget for a batch ===");
    let mut shared = ExponentialRetryPolicy::new(4, Duration::from_millis(100), 2);
    for code in [502, 504] {
        let result = client
            .dispatch_with_policy("status", CallArgs::new().arg("code", code), &mut shared)
            .await;
        println!(
            "{} -> {:?}, next backoff {:?}",
            code,
            result.map(|r| r.status),
            shared.backoff_interval()
        );
    }

    Ok(())
}
