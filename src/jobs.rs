use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::control::ControlLoop;
use crate::porssari::ScheduleSource;
use crate::scheduler::{FollowUp, Job, Scheduler, Trigger};
use crate::schedule::CONTROL_CHANNEL;
use crate::state::AppState;

pub const CONTROL_JOB: &str = "control";
pub const REFRESH_JOB: &str = "update_porssari";

pub const CONTROL_PERIOD: Duration = Duration::from_secs(15 * 60);
pub const REFRESH_PERIOD: Duration = Duration::from_secs(15 * 60);
/// Retry delay while no schedule has ever been fetched
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Fetches a new schedule. The last good one stays in use while porssari.fi is
/// unreachable.
pub struct RefreshJob {
    state: AppState,
    source: Arc<dyn ScheduleSource>,
}

impl RefreshJob {
    pub fn new(state: AppState, source: Arc<dyn ScheduleSource>) -> Self {
        Self { state, source }
    }
}

#[async_trait]
impl Job for RefreshJob {
    async fn run(&self) -> Vec<FollowUp> {
        match self.source.fetch().await {
            Ok(schedule) => {
                tracing::info!(
                    date = ?schedule.metadata.date,
                    time = ?schedule.metadata.time,
                    hours = schedule.hour_count(CONTROL_CHANNEL),
                    "got porssari config"
                );
                self.state.replace_schedule(schedule).await;
                // Apply the new schedule right away instead of at the next quarter hour
                vec![FollowUp::now(CONTROL_JOB)]
            }
            Err(e) => {
                tracing::error!(error = %e, "porssari fetch failed");
                if self.state.has_schedule().await {
                    Vec::new()
                } else {
                    tracing::warn!(
                        delay_secs = INITIAL_RETRY_DELAY.as_secs(),
                        "no porssari config yet, retrying soon"
                    );
                    vec![FollowUp::after(REFRESH_JOB, INITIAL_RETRY_DELAY)]
                }
            }
        }
    }
}

pub struct ControlJob {
    control: ControlLoop,
}

impl ControlJob {
    pub fn new(control: ControlLoop) -> Self {
        Self { control }
    }
}

#[async_trait]
impl Job for ControlJob {
    async fn run(&self) -> Vec<FollowUp> {
        let action = self.control.run_tick().await;
        tracing::info!(action = action.label(), "control tick finished");
        Vec::new()
    }
}

/// Register the control loop on quarter hours and the schedule refresh on a
/// rolling interval that starts immediately
pub fn schedule_jobs(scheduler: &Scheduler, state: AppState, source: Arc<dyn ScheduleSource>) {
    let control = ControlLoop::new(state.clone());
    scheduler.add_job(
        CONTROL_JOB,
        Trigger::Aligned(CONTROL_PERIOD),
        Arc::new(ControlJob::new(control)),
    );
    scheduler.add_job(
        REFRESH_JOB,
        Trigger::Interval(REFRESH_PERIOD),
        Arc::new(RefreshJob::new(state, source)),
    );
}
