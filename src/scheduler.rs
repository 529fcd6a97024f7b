//! Recurring job runner
//!
//! Jobs are registered by name with a trigger. Each job runs at most once at a
//! time: a firing that finds the previous run still going is skipped, not
//! queued, and a trigger that falls behind fires once rather than catching up.
//! A finished run can ask for one-off follow-up firings of any registered job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

/// One-off firing requested by a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    pub job: String,
    pub delay: Duration,
}

impl FollowUp {
    pub fn now(job: &str) -> Self {
        Self::after(job, Duration::ZERO)
    }

    pub fn after(job: &str, delay: Duration) -> Self {
        Self {
            job: job.to_string(),
            delay,
        }
    }
}

#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self) -> Vec<FollowUp>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Wall-clock boundaries, e.g. every quarter hour on :00, :15, :30, :45
    Aligned(Duration),
    /// Every period from registration, first firing immediately
    Interval(Duration),
}

pub enum Firing {
    Started(JoinHandle<()>),
    /// Previous run still in progress
    Skipped,
    Unknown,
}

struct JobEntry {
    job: Arc<dyn Job>,
    running: Arc<AtomicBool>,
}

/// Wall-clock source for aligned triggers
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct Inner {
    jobs: RwLock<HashMap<String, JobEntry>>,
    triggers: Mutex<Vec<JoinHandle<()>>>,
    clock: Clock,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the running flag however the run ends
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: RwLock::new(HashMap::new()),
                triggers: Mutex::new(Vec::new()),
                clock,
            }),
        }
    }

    /// Register a job that only runs when fired explicitly or as a follow-up
    pub fn register(&self, name: &str, job: Arc<dyn Job>) {
        let entry = JobEntry {
            job,
            running: Arc::new(AtomicBool::new(false)),
        };
        self.inner
            .jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), entry);
    }

    /// Register a job and start its trigger. Must be called inside a tokio runtime.
    pub fn add_job(&self, name: &str, trigger: Trigger, job: Arc<dyn Job>) {
        self.register(name, job);

        let scheduler = self.clone();
        let name = name.to_string();
        tracing::info!(job = %name, ?trigger, "scheduling job");

        let handle = match trigger {
            Trigger::Interval(period) => tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    scheduler.fire(&name);
                }
            }),
            Trigger::Aligned(period) => tokio::spawn(async move {
                let mut last: Option<DateTime<Utc>> = None;
                loop {
                    let now = (scheduler.inner.clock)();
                    let from = last.map_or(now, |l| l.max(now));
                    let next = next_boundary(from, period);
                    let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                    tracing::debug!(job = %name, next = %next, "waiting for next run");
                    sleep(wait).await;
                    last = Some(next);
                    scheduler.fire(&name);
                }
            }),
        };

        self.inner
            .triggers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Start a run of `name` now unless one is already in progress
    pub fn fire(&self, name: &str) -> Firing {
        let (job, running) = {
            let jobs = self.inner.jobs.read().unwrap_or_else(PoisonError::into_inner);
            match jobs.get(name) {
                Some(entry) => (entry.job.clone(), entry.running.clone()),
                None => {
                    tracing::warn!(job = %name, "fired unknown job");
                    return Firing::Unknown;
                }
            }
        };

        if running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(job = %name, "previous run still in progress, skipping");
            return Firing::Skipped;
        }

        let scheduler = self.clone();
        let name = name.to_string();
        Firing::Started(tokio::spawn(async move {
            let follow_ups = {
                let _guard = RunningGuard(running);
                tracing::debug!(job = %name, "job started");
                job.run().await
            };
            tracing::debug!(job = %name, "job finished");

            for follow_up in follow_ups {
                scheduler.run_once(&follow_up.job, follow_up.delay);
            }
        }))
    }

    /// Fire `name` once after `delay`
    pub fn run_once(&self, name: &str, delay: Duration) -> JoinHandle<()> {
        tracing::info!(job = %name, delay_secs = delay.as_secs(), "scheduling one-off run");
        let scheduler = self.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            scheduler.fire(&name);
        })
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.inner
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .is_some_and(|e| e.running.load(Ordering::Acquire))
    }

    /// Stop all triggers. Runs already in progress finish on their own.
    pub fn shutdown(&self) {
        let mut triggers = self
            .inner
            .triggers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for handle in triggers.drain(..) {
            handle.abort();
        }
        tracing::info!("scheduler stopped");
    }
}

/// First multiple of `period` since the Unix epoch strictly after `after`
pub fn next_boundary(after: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let period_secs = period.as_secs().max(1) as i64;
    let next = (after.timestamp().div_euclid(period_secs) + 1) * period_secs;
    DateTime::from_timestamp(next, 0).unwrap_or(after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const QUARTER: Duration = Duration::from_secs(15 * 60);

    #[test]
    fn test_next_boundary_quarter_hours() {
        let at = |h, m, s| Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap();

        assert_eq!(next_boundary(at(10, 0, 1), QUARTER), at(10, 15, 0));
        assert_eq!(next_boundary(at(10, 14, 59), QUARTER), at(10, 15, 0));
        assert_eq!(next_boundary(at(10, 15, 0), QUARTER), at(10, 30, 0));
        assert_eq!(next_boundary(at(10, 50, 0), QUARTER), at(11, 0, 0));
        assert_eq!(
            next_boundary(at(23, 59, 30), QUARTER),
            Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_poisoned_registry_still_accepts_jobs() {
        struct Noop;

        #[async_trait]
        impl Job for Noop {
            async fn run(&self) -> Vec<FollowUp> {
                Vec::new()
            }
        }

        let scheduler = Scheduler::new();
        let inner = scheduler.inner.clone();
        let _ = std::thread::spawn(move || {
            let _jobs = inner.jobs.write().unwrap();
            panic!("poison the job registry");
        })
        .join();
        assert!(scheduler.inner.jobs.is_poisoned());

        scheduler.register("noop", Arc::new(Noop));
        let Firing::Started(handle) = scheduler.fire("noop") else {
            panic!("registered job should start");
        };
        handle.await.unwrap();
        assert!(!scheduler.is_running("noop"));
    }

    #[test]
    fn test_follow_up_constructors() {
        assert_eq!(FollowUp::now("control").delay, Duration::ZERO);
        assert_eq!(
            FollowUp::after("update_porssari", Duration::from_secs(60)),
            FollowUp {
                job: "update_porssari".into(),
                delay: Duration::from_secs(60)
            }
        );
    }
}
