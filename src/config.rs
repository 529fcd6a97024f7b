use chrono_tz::Tz;
use std::env;
use std::path::PathBuf;

use crate::error::{AppError, Result};

pub const DEFAULT_PORSSARI_URL: &str = "https://api.porssari.fi/getcontrols.php";
pub const DEFAULT_CONTROLMYSPA_URL: &str = "https://iot.controlmyspa.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub device: DeviceConfig,
    pub porssari: PorssariConfig,
    pub control: ControlConfig,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Clone)]
pub struct DeviceConfig {
    pub username: String,
    pub password: String,
    pub base_url: String,
    /// Extra PEM certificate to trust for the device API (intermediate CA)
    pub ca_cert: Option<PathBuf>,
}

// Keep the password out of logs.
impl std::fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("username", &self.username)
            .field("password", &"***")
            .field("base_url", &self.base_url)
            .field("ca_cert", &self.ca_cert)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PorssariConfig {
    pub url: String,
    pub device_mac: String,
}

#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub temp_low: f64,
    pub temp_high: f64,
    /// Fixed setpoint that bypasses the schedule. `None` when TEMP_OVERRIDE is 0 or unset.
    pub temp_override: Option<f64>,
    pub timezone: Tz,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub sentry_url: Option<String>,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| AppError::Config(format!("{} must be set", key)))
        };

        let temp_low = parse_temperature("TEMP_LOW", &required("TEMP_LOW")?)?;
        let temp_high = parse_temperature("TEMP_HIGH", &required("TEMP_HIGH")?)?;
        let temp_override = match get("TEMP_OVERRIDE") {
            Some(raw) => Some(parse_temperature("TEMP_OVERRIDE", &raw)?).filter(|t| *t != 0.0),
            None => None,
        };

        let timezone = match get("TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| AppError::Config(format!("TIMEZONE '{}' is not a valid zone", name)))?,
            None => chrono_tz::Europe::Helsinki,
        };

        let port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| AppError::Config(format!("PORT '{}' is not a valid port", raw)))?,
            None => 8080,
        };

        let config = Config {
            device: DeviceConfig {
                username: required("CONTROLMYSPA_USER")?,
                password: required("CONTROLMYSPA_PASS")?,
                base_url: get("CONTROLMYSPA_URL")
                    .unwrap_or_else(|| DEFAULT_CONTROLMYSPA_URL.to_string()),
                ca_cert: get("CONTROLMYSPA_CA_CERT").map(PathBuf::from),
            },
            porssari: PorssariConfig {
                url: get("PORSSARI_URL").unwrap_or_else(|| DEFAULT_PORSSARI_URL.to_string()),
                device_mac: required("PORSSARI_MAC")?,
            },
            control: ControlConfig {
                temp_low,
                temp_high,
                temp_override,
                timezone,
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port,
            },
            telemetry: TelemetryConfig {
                sentry_url: get("SENTRY_URL"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.control.temp_low > self.control.temp_high {
            return Err(AppError::Config(format!(
                "TEMP_LOW ({}) must not be above TEMP_HIGH ({})",
                self.control.temp_low, self.control.temp_high
            )));
        }

        let setpoints = [
            ("TEMP_LOW", Some(self.control.temp_low)),
            ("TEMP_HIGH", Some(self.control.temp_high)),
            ("TEMP_OVERRIDE", self.control.temp_override),
        ];
        for (key, value) in setpoints {
            if let Some(value) = value.filter(|v| !on_setpoint_grid(*v)) {
                return Err(AppError::Config(format!(
                    "{} ({}) must be a whole or half degree, the spa cannot hold other setpoints",
                    key, value
                )));
            }
        }

        if self.server.port == 0 {
            return Err(AppError::Config("PORT cannot be 0".to_string()));
        }

        Ok(())
    }

    pub fn api_bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Celsius spas only report whole and half degrees, so anything else would read
/// back as a different temperature than was written
pub fn on_setpoint_grid(value: f64) -> bool {
    (value * 2.0).fract() == 0.0
}

fn parse_temperature(key: &str, raw: &str) -> Result<f64> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| AppError::Config(format!("{} '{}' is not a number", key, raw)))?;
    if !value.is_finite() {
        return Err(AppError::Config(format!("{} must be finite", key)));
    }
    Ok(value)
}
