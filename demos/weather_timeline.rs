//! Example fetching weather for a location over a window of time.
//!
//! This example shows how to:
//! - Build the weather timeline client
//! - Fetch a whole window in one call, or hour by hour
//! - Read fields out of the JSON answer
//!
//! Run with: `WEATHER_API_KEY=... cargo run --example weather_timeline`

use opcall::weather::WeatherApi;
use opcall::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("opcall=debug,weather_timeline=info")
        .init();

    let api_key = std::env::var("WEATHER_API_KEY").unwrap_or_else(|_| "demo".to_string());
    let api = WeatherApi::new(api_key)?;

    let location = "38.9697,-77.385";
    let start = 1_600_000_000;
    let end = start + 3 * 3600;

    println!("=== Whole window ===");
    let window = api
        .get_weather_timeline(location, start, Some(end), false)
        .await?;
    for day in window["days"].as_array().into_iter().flatten() {
        println!("{}: avg {} ({:?})", day["datetime"], day["temp"], day["preciptype"]);
    }
    println!();

    println!("=== Hour by hour ===");
    let hourly = api
        .get_weather_timeline(location, start, Some(end), true)
        .await?;
    for reading in hourly.as_array().into_iter().flatten() {
        println!("current temp: {}", reading["currentConditions"]["temp"]);
    }

    Ok(())
}
