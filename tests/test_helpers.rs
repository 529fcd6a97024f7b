#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use controlmyspa_porssari::config::ControlConfig;
use controlmyspa_porssari::controlmyspa::{
    celsius_to_fahrenheit, fahrenheit_to_celsius, SpaDevice, SpaState,
};
use controlmyspa_porssari::porssari::ScheduleSource;
use controlmyspa_porssari::retry::RetryPolicy;
use controlmyspa_porssari::schedule::Schedule;
use controlmyspa_porssari::{AppError, AppState, Result};

pub const LOW: f64 = 30.0;
pub const HIGH: f64 = 37.0;

/// Schedule published at 21:26 covering the night, high from 21 to 06
pub const ACROSS_MIDNIGHT: &str = r#"{
    "Metadata": {
        "Mac": "A1B2C3D4E5F6",
        "Channels": "1",
        "Fetch_url": "https://api.porssari.fi/getcontrols.php",
        "Date": "2023-12-16",
        "Time": "21:26:00",
        "Timestamp": "1702754760",
        "Timestamp_offset": "7200",
        "Hours_count": 24
    },
    "Channel1": {
        "21": "1", "22": "1", "23": "1", "0": "0", "1": "1", "2": "1",
        "3": "1", "4": "1", "5": "1", "6": "1", "7": "0", "8": "0",
        "9": "0", "10": "0", "11": "0", "12": "0", "13": "0", "14": "0",
        "15": "0", "16": "0", "17": "0", "18": "0", "19": "0", "20": "0"
    }
}"#;

pub fn control_config(temp_override: Option<f64>) -> ControlConfig {
    ControlConfig {
        temp_low: LOW,
        temp_high: HIGH,
        temp_override,
        timezone: chrono_tz::Europe::Helsinki,
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        base: Duration::from_millis(1),
        cap: Duration::from_millis(5),
    }
}

pub fn schedule() -> Schedule {
    Schedule::parse(ACROSS_MIDNIGHT, Utc::now()).expect("fixture schedule parses")
}

/// UTC instant at `hour`:05 Helsinki time on 2023-12-16
pub fn at_local_hour(hour: u32) -> DateTime<Utc> {
    chrono_tz::Europe::Helsinki
        .with_ymd_and_hms(2023, 12, 16, hour, 5, 0)
        .single()
        .expect("unambiguous local time")
        .with_timezone(&Utc)
}

/// In-memory spa that behaves like the real one: a write changes what the next read returns
pub struct FakeSpa {
    pub state: Mutex<SpaState>,
    pub reads: AtomicUsize,
    pub single_reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl FakeSpa {
    pub fn new(desired_temp: f64, current_temp: f64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SpaState {
                desired_temp,
                current_temp,
            }),
            reads: AtomicUsize::new(0),
            single_reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        })
    }

    pub fn desired(&self) -> f64 {
        self.state.lock().unwrap().desired_temp
    }

    /// Someone turned the knob on the spa panel
    pub fn set_manually(&self, temp: f64) {
        self.state.lock().unwrap().desired_temp = temp;
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn single_reads(&self) -> usize {
        self.single_reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpaDevice for FakeSpa {
    async fn read_state_once(&self) -> Result<SpaState> {
        self.single_reads.fetch_add(1, Ordering::SeqCst);
        self.read_state().await
    }

    async fn read_state(&self) -> Result<SpaState> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Parse("spa offline".into()));
        }
        Ok(*self.state.lock().unwrap())
    }

    async fn write_setpoint(&self, temp: f64) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Parse("spa offline".into()));
        }
        self.state.lock().unwrap().desired_temp = temp;
        Ok(())
    }
}

/// Spa configured for Celsius: the cloud stores Fahrenheit and reports it back
/// rounded to the half degree, like the real API
pub struct CelsiusSpa {
    pub desired_f: Mutex<f64>,
    pub current_f: f64,
    pub writes: AtomicUsize,
}

impl CelsiusSpa {
    pub fn new(desired_c: f64, current_c: f64) -> Arc<Self> {
        Arc::new(Self {
            desired_f: Mutex::new(celsius_to_fahrenheit(desired_c)),
            current_f: celsius_to_fahrenheit(current_c),
            writes: AtomicUsize::new(0),
        })
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpaDevice for CelsiusSpa {
    async fn read_state(&self) -> Result<SpaState> {
        Ok(SpaState {
            desired_temp: fahrenheit_to_celsius(*self.desired_f.lock().unwrap()),
            current_temp: fahrenheit_to_celsius(self.current_f),
        })
    }

    async fn write_setpoint(&self, temp: f64) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.desired_f.lock().unwrap() = celsius_to_fahrenheit(temp);
        Ok(())
    }
}

/// Schedule source answering from a script; fails once the script runs out
pub struct FakeSource {
    responses: Mutex<VecDeque<Result<Schedule>>>,
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(responses: Vec<Result<Schedule>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScheduleSource for FakeSource {
    async fn fetch(&self) -> Result<Schedule> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Parse("porssari unavailable".into())))
    }
}

pub fn app_state(spa: Arc<FakeSpa>, temp_override: Option<f64>) -> AppState {
    AppState::new(spa, control_config(temp_override))
}

/// Bind a local port for a fake upstream API
pub async fn bind_local() -> (tokio::net::TcpListener, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local port");
    let base = format!("http://{}", listener.local_addr().unwrap());
    (listener, base)
}

pub fn serve(listener: tokio::net::TcpListener, router: Router) {
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("fake server");
    });
}
