use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

use crate::config::PorssariConfig;
use crate::error::{AppError, Result};
use crate::retry::{retry, RetryPolicy};
use crate::schedule::Schedule;

/// Client label reported to porssari.fi
pub const CLIENT_LABEL: &str = "controlmyspa-porssari-1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of hourly control schedules
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Fetch and parse the current schedule, retrying transient failures
    async fn fetch(&self) -> Result<Schedule>;
}

#[derive(Clone)]
pub struct PorssariClient {
    http: reqwest::Client,
    url: String,
    device_mac: String,
    retry: RetryPolicy,
}

impl PorssariClient {
    pub fn new(config: &PorssariConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            url: config.url.clone(),
            device_mac: config.device_mac.clone(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_once(&self) -> Result<Schedule> {
        let response = self
            .http
            .get(&self.url)
            .query(&[
                ("device_mac", self.device_mac.as_str()),
                ("client", CLIENT_LABEL),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body = response.text().await?;
        Schedule::parse(&body, Utc::now()).inspect_err(|e| {
            tracing::debug!(error = %e, body = %body, "porssari returned an unusable body");
        })
    }
}

#[async_trait]
impl ScheduleSource for PorssariClient {
    async fn fetch(&self) -> Result<Schedule> {
        retry(&self.retry, "porssari fetch", || self.fetch_once()).await
    }
}
