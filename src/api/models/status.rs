use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::config::ControlConfig;
use crate::control::{local_hour, target_temperature};
use crate::controlmyspa::SpaState;
use crate::history::{HistoryEntry, TickAction};
use crate::schedule::{Command, Schedule, CONTROL_CHANNEL};

#[derive(Debug, Clone, PartialEq)]
pub struct HourRow {
    pub hour: u32,
    pub command: Command,
    /// Whether the provider sent this hour or it defaulted to low
    pub scheduled: bool,
    pub target: f64,
    pub current: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleView {
    pub date: Option<String>,
    pub time: Option<String>,
    pub fetched_at: DateTime<Tz>,
    /// 24 rows starting from the current hour
    pub hours: Vec<HourRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub at: DateTime<Tz>,
    pub hour: u32,
    pub command: Option<Command>,
    pub target: Option<f64>,
    pub observed: Option<f64>,
    pub action: String,
    pub detail: Option<String>,
}

/// Everything the status page shows
#[derive(Debug, Clone, PartialEq)]
pub struct StatusView {
    pub now: DateTime<Tz>,
    pub current_hour: u32,
    pub spa: Option<SpaState>,
    pub override_until: Option<DateTime<Tz>>,
    pub temp_low: f64,
    pub temp_high: f64,
    pub temp_override: Option<f64>,
    pub schedule: Option<ScheduleView>,
    pub history: Vec<HistoryRow>,
}

impl StatusView {
    pub fn build(
        now: DateTime<Utc>,
        control: &ControlConfig,
        schedule: Option<&Schedule>,
        spa: Option<SpaState>,
        override_until: Option<DateTime<Utc>>,
        history: &[HistoryEntry],
    ) -> Self {
        let tz = control.timezone;
        let current_hour = local_hour(now, tz);

        let schedule = schedule.map(|schedule| {
            let channel = schedule.channels.get(CONTROL_CHANNEL);
            let hours = (0..24)
                .map(|offset| (current_hour + offset) % 24)
                .map(|hour| {
                    let command = schedule.command(CONTROL_CHANNEL, hour);
                    HourRow {
                        hour,
                        command,
                        scheduled: channel
                            .is_some_and(|hours| hours.contains_key(&(hour as u8))),
                        target: target_temperature(command, control),
                        current: hour == current_hour,
                    }
                })
                .collect();

            ScheduleView {
                date: schedule.metadata.date.clone(),
                time: schedule.metadata.time.clone(),
                fetched_at: schedule.fetched_at.with_timezone(&tz),
                hours,
            }
        });

        let history = history
            .iter()
            .map(|entry| HistoryRow {
                at: entry.at.with_timezone(&tz),
                hour: entry.hour,
                command: entry.command,
                target: entry.target,
                observed: entry.observed,
                action: entry.action.label().to_string(),
                detail: match &entry.action {
                    TickAction::Failed(reason) => Some(reason.clone()),
                    _ => None,
                },
            })
            .collect();

        Self {
            now: now.with_timezone(&tz),
            current_hour,
            spa,
            override_until: override_until.map(|until| until.with_timezone(&tz)),
            temp_low: control.temp_low,
            temp_high: control.temp_high,
            temp_override: control.temp_override,
            schedule,
            history,
        }
    }
}
