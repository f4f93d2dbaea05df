use std::time::Duration;

use super::RunSummary;

pub const MIN_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const MAX_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);

/// Decides how long to wait before the next automatic ingestion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalPolicy {
    pub default: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl IntervalPolicy {
    pub fn new(default: Duration) -> Self {
        Self {
            default: default.clamp(MIN_INTERVAL, MAX_INTERVAL),
            min: MIN_INTERVAL,
            max: MAX_INTERVAL,
        }
    }

    pub fn next_interval(&self, current: Duration, summary: &RunSummary) -> Duration {
        if summary.total == 0 {
            return current.clamp(self.min, self.max);
        }

        let rate = summary.success_rate;
        let next = if rate < 0.5 {
            current.mul_f64(2.0)
        } else if rate < 0.8 {
            current.mul_f64(1.5)
        } else if rate >= 0.95 {
            current.mul_f64(0.75).max(self.default)
        } else {
            current
        };

        let floor = Duration::from_millis(summary.duration_ms.saturating_mul(2));
        next.max(floor).clamp(self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn summary(total: usize, succeeded: usize, duration_ms: u64) -> RunSummary {
        let now = Utc::now();
        RunSummary {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            duration_ms,
            total,
            succeeded,
            failed: total - succeeded,
            success_rate: if total == 0 {
                0.0
            } else {
                succeeded as f64 / total as f64
            },
            errors: Vec::new(),
        }
    }

    const fn minutes(n: u64) -> Duration {
        Duration::from_secs(n * 60)
    }

    #[test]
    fn low_success_rate_doubles_the_interval() {
        let policy = IntervalPolicy::new(minutes(30));
        assert_eq!(policy.next_interval(minutes(30), &summary(10, 4, 1000)), minutes(60));
    }

    #[test]
    fn middling_success_rate_backs_off_gently() {
        let policy = IntervalPolicy::new(minutes(30));
        assert_eq!(policy.next_interval(minutes(30), &summary(10, 7, 1000)), minutes(45));
    }

    #[test]
    fn healthy_run_recovers_toward_default() {
        let policy = IntervalPolicy::new(minutes(30));
        assert_eq!(policy.next_interval(minutes(80), &summary(20, 20, 1000)), minutes(60));
        assert_eq!(policy.next_interval(minutes(32), &summary(20, 20, 1000)), minutes(30));
        assert_eq!(policy.next_interval(minutes(30), &summary(20, 19, 1000)), minutes(30));
    }

    #[test]
    fn acceptable_run_keeps_the_interval() {
        let policy = IntervalPolicy::new(minutes(30));
        assert_eq!(policy.next_interval(minutes(40), &summary(10, 9, 1000)), minutes(40));
    }

    #[test]
    fn interval_stays_within_bounds() {
        let policy = IntervalPolicy::new(minutes(30));
        assert_eq!(policy.next_interval(minutes(100), &summary(10, 0, 1000)), MAX_INTERVAL);

        let eager = IntervalPolicy::new(Duration::from_secs(60));
        assert_eq!(eager.default, MIN_INTERVAL);
        assert_eq!(eager.next_interval(minutes(5), &summary(10, 10, 10)), MIN_INTERVAL);
    }

    #[test]
    fn slow_passes_push_the_next_run_out() {
        let policy = IntervalPolicy::new(minutes(30));
        let next = policy.next_interval(minutes(30), &summary(10, 9, 20 * 60 * 1000));
        assert_eq!(next, minutes(40));
    }

    #[test]
    fn empty_pass_leaves_interval_alone() {
        let policy = IntervalPolicy::new(minutes(30));
        assert_eq!(policy.next_interval(minutes(45), &summary(0, 0, 5)), minutes(45));
    }
}
