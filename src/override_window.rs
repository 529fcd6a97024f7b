//! Manual override detection.
//!
//! When someone changes the setpoint from the spa panel or the vendor app, the
//! desired temperature stops matching either automatic setpoint. Automatic
//! control then backs off for [`OVERRIDE_QUARANTINE_HOURS`] before taking over again.

use chrono::{DateTime, Duration, Utc};

pub const OVERRIDE_QUARANTINE_HOURS: i64 = 12;

/// Temperatures closer than this are the same setpoint
const TEMP_EPSILON: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideWindow {
    until: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideDecision {
    /// Desired temperature is one of ours, control normally
    Proceed,
    /// First tick seeing a manual setpoint, window armed
    Armed,
    /// Window still running, leave the spa alone
    Suppressed,
    /// Window ran out while the manual setpoint persisted, control resumes
    Expired,
}

impl OverrideDecision {
    pub fn suppresses_control(&self) -> bool {
        matches!(self, OverrideDecision::Armed | OverrideDecision::Suppressed)
    }
}

impl Default for OverrideWindow {
    fn default() -> Self {
        Self {
            until: DateTime::<Utc>::default(),
        }
    }
}

impl OverrideWindow {
    /// Epoch zero means never armed
    pub fn is_armed(&self) -> bool {
        self.until != DateTime::<Utc>::default()
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.is_armed() && self.until > now
    }

    pub fn until(&self) -> Option<DateTime<Utc>> {
        self.is_armed().then_some(self.until)
    }

    /// Evaluate one tick's device reading against the automatic setpoints
    pub fn evaluate(
        &mut self,
        desired_temp: f64,
        low: f64,
        high: f64,
        now: DateTime<Utc>,
    ) -> OverrideDecision {
        if same_temp(desired_temp, low) || same_temp(desired_temp, high) {
            if self.is_armed() && self.until <= now {
                *self = Self::default();
            }
            return OverrideDecision::Proceed;
        }

        if !self.is_armed() {
            self.until = now + Duration::hours(OVERRIDE_QUARANTINE_HOURS);
            tracing::info!(
                desired_temp,
                until = %self.until,
                "manual override detected, pausing automatic control"
            );
            OverrideDecision::Armed
        } else if self.until > now {
            tracing::debug!(desired_temp, until = %self.until, "manual override active");
            OverrideDecision::Suppressed
        } else {
            tracing::info!(
                desired_temp,
                expired = %self.until,
                "manual override expired, resuming automatic control"
            );
            *self = Self::default();
            OverrideDecision::Expired
        }
    }
}

pub fn same_temp(a: f64, b: f64) -> bool {
    (a - b).abs() < TEMP_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const LOW: f64 = 30.0;
    const HIGH: f64 = 37.0;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap()
    }

    #[test]
    fn test_known_setpoints_proceed() {
        let mut window = OverrideWindow::default();
        assert_eq!(window.evaluate(LOW, LOW, HIGH, t0()), OverrideDecision::Proceed);
        assert_eq!(window.evaluate(37.0, LOW, HIGH, t0()), OverrideDecision::Proceed);
        assert!(!window.is_armed());
        assert_eq!(window.until(), None);
    }

    #[test]
    fn test_full_lifecycle() {
        let mut window = OverrideWindow::default();

        // Detecting tick arms the window and is itself suppressed
        let decision = window.evaluate(35.0, LOW, HIGH, t0());
        assert_eq!(decision, OverrideDecision::Armed);
        assert!(decision.suppresses_control());
        assert_eq!(window.until(), Some(t0() + Duration::hours(12)));

        // Any tick before expiry stays suppressed, even with a new manual value
        for minutes in [15, 60 * 6, 60 * 12 - 15] {
            let now = t0() + Duration::minutes(minutes);
            let decision = window.evaluate(36.0, LOW, HIGH, now);
            assert_eq!(decision, OverrideDecision::Suppressed);
            assert_eq!(window.until(), Some(t0() + Duration::hours(12)));
        }

        // First tick after expiry resets and lets control run
        let after = t0() + Duration::hours(12) + Duration::minutes(15);
        let decision = window.evaluate(36.0, LOW, HIGH, after);
        assert_eq!(decision, OverrideDecision::Expired);
        assert!(!decision.suppresses_control());
        assert!(!window.is_armed());

        // Mismatch on a later tick arms it again
        let later = after + Duration::minutes(15);
        assert_eq!(window.evaluate(36.0, LOW, HIGH, later), OverrideDecision::Armed);
        assert_eq!(window.until(), Some(later + Duration::hours(12)));
    }

    #[test]
    fn test_returning_to_automatic_setpoint_does_not_clear_window() {
        let mut window = OverrideWindow::default();
        window.evaluate(35.0, LOW, HIGH, t0());

        let now = t0() + Duration::hours(1);
        assert_eq!(window.evaluate(HIGH, LOW, HIGH, now), OverrideDecision::Proceed);
        assert!(window.is_active(now));
    }

    #[test]
    fn test_expired_window_cleared_when_setpoint_matches() {
        let mut window = OverrideWindow::default();
        window.evaluate(35.0, LOW, HIGH, t0());

        let after = t0() + Duration::hours(13);
        assert_eq!(window.evaluate(LOW, LOW, HIGH, after), OverrideDecision::Proceed);
        assert!(!window.is_armed());

        // A fresh manual change afterwards gets its own full window
        assert_eq!(window.evaluate(34.0, LOW, HIGH, after), OverrideDecision::Armed);
    }
}
