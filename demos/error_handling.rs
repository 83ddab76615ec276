//! Example demonstrating error handling.
//!
//! This example shows how to:
//! - Catch contract violations before anything is sent
//! - Handle terminal HTTP outcomes
//! - Deal with deserialization failures
//!
//! Run with: `cargo run --example error_handling`

use opcall::retry::NoRetryPolicy;
use opcall::{CallArgs, Client, Error, OperationRegistry};
use serde::Deserialize;

const OPERATIONS: &str = r#"{
    "get_post": {
        "url": "https://jsonplaceholder.typicode.com/posts/{id}",
        "method": "GET",
        "path_vars": ["id"],
        "allowed_params": ["_fields"],
        "allowed_headers": ["Accept"]
    }
}"#;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    id: u32,
    title: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("opcall=info")
        .init();

    let client = Client::builder()
        .registry(OperationRegistry::from_json(OPERATIONS)?)
        .retry_policy(NoRetryPolicy)
        .build()?;

    println!("=== Example 1: Contract violations ===");
    for args in [
        CallArgs::new(),
        CallArgs::new().arg("id", 1).arg("page", 2),
        CallArgs::new().arg("id", 1).header("X-Debug", "1"),
    ] {
        match client.dispatch("get_post", args).await {
            Err(e) if e.is_contract_violation() => println!("Rejected before sending: {}", e),
            Err(e) => println!("Other error: {}", e),
            Ok(response) => println!("Unexpected success: {}", response.status),
        }
    }
    println!();

    println!("=== Example 2: Terminal HTTP outcomes ===");
    match client.dispatch("get_post", CallArgs::new().arg("id", 999_999)).await {
        Ok(response) => println!("Success: {}", response.status),
        Err(Error::NotFound { url }) => println!("Nothing at {}", url),
        Err(Error::PermissionDenied { url }) => println!("Not allowed to read {}", url),
        Err(Error::ServerError {
            status,
            raw_response,
            ..
        }) => println!("Server said {}: {}", status, raw_response),
        Err(e) => println!("Other error: {}", e),
    }
    println!();

    println!("=== Example 3: Deserialization errors ===");
    #[derive(Deserialize)]
    #[allow(dead_code)]
    struct WrongSchema {
        nonexistent_field: String,
    }

    let response = client.dispatch("get_post", CallArgs::new().arg("id", 1)).await?;
    match response.json::<WrongSchema>().await {
        Ok(_) => println!("Unexpected success"),
        Err(Error::DeserializationFailed {
            raw_response,
            serde_error,
            status,
        }) => {
            println!("Status {} but the body did not match: {}", status, serde_error);
            println!("Raw body: {}", raw_response);
        }
        Err(e) => println!("Other error: {}", e),
    }

    let post: Post = client
        .dispatch("get_post", CallArgs::new().arg("id", 1))
        .await?
        .json()
        .await?;
    println!("Fetched: {:?}", post);

    Ok(())
}
