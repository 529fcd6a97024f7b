//! Client for the Balboa ControlMySpa cloud API.
//!
//! Every logical operation logs in from scratch: fetch the identity endpoint
//! description, exchange the credentials for a bearer token, look up the spa
//! owned by the user, then read or write. Token lifetime is the API's business.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

use crate::config::DeviceConfig;
use crate::error::{AppError, Result};
use crate::retry::{retry, RetryPolicy};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Temperatures reported by the spa, in the spa's display unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaState {
    pub desired_temp: f64,
    pub current_temp: f64,
}

/// Remote spa controller
#[async_trait]
pub trait SpaDevice: Send + Sync {
    async fn read_state(&self) -> Result<SpaState>;
    async fn write_setpoint(&self, temp: f64) -> Result<()>;

    /// Single read attempt for callers that must answer quickly
    async fn read_state_once(&self) -> Result<SpaState> {
        self.read_state().await
    }
}

#[derive(Debug, Deserialize)]
struct IdmResponse {
    #[serde(rename = "_links")]
    links: IdmLinks,
    #[serde(rename = "mobileClientId")]
    client_id: String,
    #[serde(rename = "mobileClientSecret")]
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct IdmLinks {
    #[serde(rename = "tokenEndpoint")]
    token_endpoint: Link,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SpaInfo {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "currentState")]
    current_state: CurrentState,
}

#[derive(Debug, Deserialize)]
struct CurrentState {
    #[serde(rename = "desiredTemp", deserialize_with = "flexible_f64")]
    desired_temp: f64,
    #[serde(rename = "currentTemp", deserialize_with = "flexible_f64")]
    current_temp: f64,
    #[serde(default)]
    celsius: bool,
}

struct Session {
    token: String,
    spa: SpaInfo,
}

#[derive(Clone)]
pub struct ControlMySpaClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    retry: RetryPolicy,
}

impl ControlMySpaClient {
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);

        if let Some(path) = &config.ca_cert {
            let pem = std::fs::read(path)?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
            tracing::info!(path = %path.display(), "trusting extra CA certificate for device API");
        }

        Ok(Self {
            http: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn login(&self) -> Result<Session> {
        let idm_url = format!("{}/idm/tokenEndpoint", self.base_url);
        let response = self.http.get(&idm_url).send().await?;
        let idm: IdmResponse = check_status(response, &idm_url)?.json().await?;

        let token_url = idm.links.token_endpoint.href;
        let response = self
            .http
            .post(&token_url)
            .basic_auth(&idm.client_id, Some(&idm.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
                ("scope", "openid user_name"),
            ])
            .send()
            .await?;
        let token: TokenResponse = check_status(response, &token_url)?.json().await?;

        let spa_url = format!("{}/mobile/spas/search/findByUsername", self.base_url);
        let response = self
            .http
            .get(&spa_url)
            .query(&[("username", self.username.as_str())])
            .bearer_auth(&token.access_token)
            .send()
            .await?;
        let spa: SpaInfo = check_status(response, &spa_url)?.json().await?;

        Ok(Session {
            token: token.access_token,
            spa,
        })
    }

    async fn read_once(&self) -> Result<SpaState> {
        let session = self.login().await?;
        let state = &session.spa.current_state;
        let (desired_temp, current_temp) = if state.celsius {
            (
                fahrenheit_to_celsius(state.desired_temp),
                fahrenheit_to_celsius(state.current_temp),
            )
        } else {
            (state.desired_temp, state.current_temp)
        };

        Ok(SpaState {
            desired_temp,
            current_temp,
        })
    }

    async fn write_once(&self, temp: f64) -> Result<()> {
        let session = self.login().await?;
        let value = if session.spa.current_state.celsius {
            celsius_to_fahrenheit(temp)
        } else {
            temp
        };

        let url = format!(
            "{}/mobile/control/{}/setDesiredTemp",
            self.base_url, session.spa.id
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&session.token)
            .json(&serde_json::json!({ "desiredTemp": value }))
            .send()
            .await?;
        check_status(response, &url)?;

        Ok(())
    }
}

#[async_trait]
impl SpaDevice for ControlMySpaClient {
    async fn read_state(&self) -> Result<SpaState> {
        let state = retry(&self.retry, "controlmyspa read", || self.read_once()).await?;
        tracing::info!(
            current_temp = state.current_temp,
            desired_temp = state.desired_temp,
            "read spa state"
        );
        Ok(state)
    }

    async fn read_state_once(&self) -> Result<SpaState> {
        self.read_once().await
    }

    async fn write_setpoint(&self, temp: f64) -> Result<()> {
        retry(&self.retry, "controlmyspa write", || self.write_once(temp)).await?;
        tracing::info!(desired_temp = temp, "set desired temp");
        Ok(())
    }
}

fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status.as_u16() {
        400 | 401 | 403 => Err(AppError::Auth(format!("{} rejected the request: {}", url, status))),
        code => Err(AppError::Status {
            status: code,
            url: url.to_string(),
        }),
    }
}

/// Fahrenheit to Celsius, rounded to the half degree the spa panel displays
pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    ((f - 32.0) * 5.0 / 9.0 * 2.0).round() / 2.0
}

/// Celsius to Fahrenheit with one decimal, the precision the API accepts
pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    ((c * 9.0 / 5.0 + 32.0) * 10.0).round() / 10.0
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

fn flexible_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("expected a temperature, got '{}'", s))),
    }
}
