use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::config::ControlConfig;
use crate::controlmyspa::{SpaDevice, SpaState};
use crate::history::History;
use crate::override_window::OverrideWindow;
use crate::schedule::Schedule;

/// How long a device reading is served from cache
pub const STATUS_TTL: Duration = Duration::from_secs(15 * 60);

/// Last device reading with expiry. Written by the control loop and by the
/// status page on a miss; last write wins.
#[derive(Clone)]
pub struct StatusCache {
    inner: Arc<RwLock<Option<(SpaState, Instant)>>>,
    ttl: Duration,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            ttl,
        }
    }

    pub async fn get(&self) -> Option<SpaState> {
        let guard = self.inner.read().await;
        guard
            .as_ref()
            .filter(|(_, stored_at)| stored_at.elapsed() < self.ttl)
            .map(|(state, _)| *state)
    }

    pub async fn set(&self, state: SpaState) {
        *self.inner.write().await = Some((state, Instant::now()));
    }
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new(STATUS_TTL)
    }
}

/// Everything shared between the scheduler jobs and the status page
#[derive(Clone)]
pub struct AppState {
    pub schedule: Arc<RwLock<Option<Arc<Schedule>>>>,
    pub override_window: Arc<RwLock<OverrideWindow>>,
    pub status: StatusCache,
    pub history: Arc<RwLock<History>>,
    pub device: Arc<dyn SpaDevice>,
    pub control: ControlConfig,
}

impl AppState {
    pub fn new(device: Arc<dyn SpaDevice>, control: ControlConfig) -> Self {
        Self {
            schedule: Arc::new(RwLock::new(None)),
            override_window: Arc::new(RwLock::new(OverrideWindow::default())),
            status: StatusCache::default(),
            history: Arc::new(RwLock::new(History::default())),
            device,
            control,
        }
    }

    pub async fn current_schedule(&self) -> Option<Arc<Schedule>> {
        self.schedule.read().await.clone()
    }

    pub async fn has_schedule(&self) -> bool {
        self.schedule.read().await.is_some()
    }

    /// Swap in a freshly fetched schedule as a whole
    pub async fn replace_schedule(&self, schedule: Schedule) {
        *self.schedule.write().await = Some(Arc::new(schedule));
    }

    /// Cached device reading, or a single fresh attempt on a miss. `None` when
    /// the device cannot be reached.
    pub async fn spa_status(&self) -> Option<SpaState> {
        if let Some(state) = self.status.get().await {
            return Some(state);
        }

        match self.device.read_state_once().await {
            Ok(state) => {
                self.status.set(state).await;
                Some(state)
            }
            Err(e) => {
                tracing::warn!(error = %e, "spa status unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_status_cache_expires() {
        let cache = StatusCache::new(Duration::from_secs(60));
        assert_eq!(cache.get().await, None);

        let state = SpaState {
            desired_temp: 37.0,
            current_temp: 36.5,
        };
        cache.set(state).await;
        assert_eq!(cache.get().await, Some(state));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get().await, Some(state));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get().await, None);
    }
}
