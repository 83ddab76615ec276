//! Visual Crossing weather timeline client.
//!
//! A thin consumer of [`Client`]: it registers the two timeline operations and
//! maps its domain methods onto [`Client::dispatch`].

use crate::{CallArgs, Client, ClientBuilder, HttpMethod, OperationSpec, Result};
use serde_json::Value;
use std::time::Duration;

/// Timeline endpoint of the Visual Crossing web services.
pub const DEFAULT_BASE_URL: &str =
    "https://weather.visualcrossing.com/VisualCrossingWebServices/rest/services/timeline";

const HOUR_SECS: usize = 3600;

/// Weather lookups by location and epoch timestamp.
///
/// # Examples
///
/// ```no_run
/// use opcall::weather::WeatherApi;
///
/// # async fn example() -> Result<(), opcall::Error> {
/// let api = WeatherApi::new("MY_API_KEY")?;
/// let day = api
///     .get_weather_timeline("38.9697,-77.385", 1_600_000_000, None, false)
///     .await?;
/// println!("{}", day["currentConditions"]["temp"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct WeatherApi {
    client: Client,
    api_key: String,
}

impl WeatherApi {
    /// Creates a client for the public endpoint with a 5 second timeout.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Creates a client for a different timeline endpoint.
    pub fn with_base_url(api_key: impl Into<String>, base_url: &str) -> Result<Self> {
        Self::from_builder(
            api_key,
            base_url,
            Client::builder().timeout(Duration::from_secs(5)),
        )
    }

    /// Registers the timeline operations on `builder` and builds the client.
    ///
    /// Use this to pick a different retry policy or timeout.
    pub fn from_builder(
        api_key: impl Into<String>,
        base_url: &str,
        builder: ClientBuilder,
    ) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/');
        let client = builder
            .operation(
                "get_timeline",
                OperationSpec::new(
                    HttpMethod::Get,
                    format!("{}/{{location}}/{{start_date}}/{{end_date}}", base_url),
                )
                .path_vars(["location", "start_date", "end_date"])
                .allowed_params(["key", "include"])
                .required_params(["key"]),
            )
            .operation(
                "get_time",
                OperationSpec::new(
                    HttpMethod::Get,
                    format!("{}/{{location}}/{{start_date}}", base_url),
                )
                .path_vars(["location", "start_date"])
                .allowed_params(["key", "include"])
                .required_params(["key"]),
            )
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }

    /// Returns the underlying dispatcher.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Fetches weather for `location` over a window of time.
    ///
    /// `location` is a ZIP code or a `lat,lon` pair; dates are epoch seconds.
    ///
    /// * With `end_date` and `hourly == false`, one call covers the whole window.
    /// * With `end_date` and `hourly == true`, one call is made per hour from
    ///   `start_date` to `end_date` inclusive and the answers are returned as a
    ///   JSON array in order.
    /// * Without `end_date`, a single point in time is fetched and `hourly` is
    ///   ignored.
    pub async fn get_weather_timeline(
        &self,
        location: &str,
        start_date: i64,
        end_date: Option<i64>,
        hourly: bool,
    ) -> Result<Value> {
        match end_date {
            Some(end_date) if !hourly => {
                let args = self
                    .args(location, start_date)
                    .arg("end_date", end_date);
                self.client.dispatch("get_timeline", args).await?.json().await
            }
            Some(end_date) => {
                let mut readings = Vec::new();
                for ts in hour_bins(start_date, end_date) {
                    readings.push(self.get_time(location, ts).await?);
                }
                Ok(Value::Array(readings))
            }
            None => self.get_time(location, start_date).await,
        }
    }

    async fn get_time(&self, location: &str, start_date: i64) -> Result<Value> {
        self.client
            .dispatch("get_time", self.args(location, start_date))
            .await?
            .json()
            .await
    }

    fn args(&self, location: &str, start_date: i64) -> CallArgs {
        CallArgs::new()
            .arg("location", location)
            .arg("start_date", start_date)
            .arg("key", &self.api_key)
            .arg("include", "current")
    }
}

/// Hour-spaced timestamps from `start` through `end` inclusive.
///
/// # Examples
///
/// ```
/// use opcall::weather::hour_bins;
///
/// assert_eq!(hour_bins(0, 7200).collect::<Vec<_>>(), vec![0, 3600, 7200]);
/// assert_eq!(hour_bins(0, 3599).collect::<Vec<_>>(), vec![0]);
/// assert_eq!(hour_bins(10, 0).count(), 0);
/// ```
pub fn hour_bins(start: i64, end: i64) -> impl Iterator<Item = i64> {
    (start..=end).step_by(HOUR_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operations_registered() {
        let api = WeatherApi::with_base_url("k", "https://weather.example.com/timeline/").unwrap();
        let registry = api.client().registry();
        assert_eq!(registry.names(), vec!["get_time", "get_timeline"]);
        assert_eq!(
            registry.get("get_time").unwrap().url,
            "https://weather.example.com/timeline/{location}/{start_date}"
        );
        assert!(registry
            .get("get_timeline")
            .unwrap()
            .required_params
            .contains("key"));
    }

    #[test]
    fn test_hour_bins_include_end() {
        let bins: Vec<_> = hour_bins(1_600_000_000, 1_600_010_800).collect();
        assert_eq!(bins.len(), 4);
        assert_eq!(bins.last(), Some(&1_600_010_800));
    }
}
