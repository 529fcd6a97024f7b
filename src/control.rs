//! The control tick: pick the setpoint for the current hour and push it to the spa.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::config::ControlConfig;
use crate::controlmyspa::SpaState;
use crate::history::{HistoryEntry, TickAction};
use crate::override_window::same_temp;
use crate::schedule::{Command, CONTROL_CHANNEL};
use crate::state::AppState;

/// Hour of day (0-23) in the controller's time zone
pub fn local_hour(now: DateTime<Utc>, timezone: Tz) -> u32 {
    now.with_timezone(&timezone).hour()
}

/// Setpoint for a schedule command. A configured override wins over the schedule.
pub fn target_temperature(command: Command, control: &ControlConfig) -> f64 {
    match (control.temp_override, command) {
        (Some(temp), _) => temp,
        (None, Command::Low) => control.temp_low,
        (None, Command::High) => control.temp_high,
    }
}

#[derive(Clone)]
pub struct ControlLoop {
    state: AppState,
}

impl ControlLoop {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn run_tick(&self) -> TickAction {
        self.run_tick_at(Utc::now()).await
    }

    /// One control pass. Never fails: device errors are logged and recorded, and
    /// the next tick tries again.
    pub async fn run_tick_at(&self, now: DateTime<Utc>) -> TickAction {
        let control = &self.state.control;
        let hour = local_hour(now, control.timezone);

        let Some(schedule) = self.state.current_schedule().await else {
            tracing::error!("no porssari config present, not controlling");
            return self
                .record(now, hour, None, None, None, TickAction::NoSchedule)
                .await;
        };

        let command = schedule.command(CONTROL_CHANNEL, hour);
        let target = target_temperature(command, control);
        tracing::debug!(
            hour,
            command = command.as_str(),
            target,
            override_active = control.temp_override.is_some(),
            "selected target temperature"
        );

        let spa = match self.state.device.read_state().await {
            Ok(spa) => spa,
            Err(e) => {
                tracing::error!(error = %e, "could not read spa state, skipping tick");
                let action = TickAction::Failed(e.to_string());
                return self
                    .record(now, hour, Some(command), Some(target), None, action)
                    .await;
            }
        };
        self.state.status.set(spa).await;

        if control.temp_override.is_none() {
            let decision = self.state.override_window.write().await.evaluate(
                spa.desired_temp,
                control.temp_low,
                control.temp_high,
                now,
            );
            if decision.suppresses_control() {
                return self
                    .record(
                        now,
                        hour,
                        Some(command),
                        Some(target),
                        Some(spa.desired_temp),
                        TickAction::ManualOverride,
                    )
                    .await;
            }
        }

        let action = if same_temp(spa.desired_temp, target) {
            tracing::debug!(target, "spa already at target temperature");
            TickAction::AlreadyAtTarget
        } else {
            match self.state.device.write_setpoint(target).await {
                Ok(()) => {
                    self.state
                        .status
                        .set(SpaState {
                            desired_temp: target,
                            current_temp: spa.current_temp,
                        })
                        .await;
                    TickAction::Written
                }
                Err(e) => {
                    tracing::error!(error = %e, target, "could not set spa temperature");
                    TickAction::Failed(e.to_string())
                }
            }
        };

        self.record(
            now,
            hour,
            Some(command),
            Some(target),
            Some(spa.desired_temp),
            action,
        )
        .await
    }

    async fn record(
        &self,
        at: DateTime<Utc>,
        hour: u32,
        command: Option<Command>,
        target: Option<f64>,
        observed: Option<f64>,
        action: TickAction,
    ) -> TickAction {
        self.state.history.write().await.push(HistoryEntry {
            at,
            hour,
            command,
            target,
            observed,
            action: action.clone(),
        });
        action
    }
}
