use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::{watch, RwLock},
    task::JoinHandle,
};
use tracing::{info, warn};

use super::{schedule::IntervalPolicy, IngestError, RunSummary, WeatherService};

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub scheduled: bool,
    pub running: bool,
    pub current_interval_secs: u64,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run: Option<RunSummary>,
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    interval: Duration,
    next_run_at: Option<DateTime<Utc>>,
}

struct Timer {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the one timer that drives recurring ingestion passes.
pub struct WeatherScheduler {
    service: Arc<WeatherService>,
    policy: IntervalPolicy,
    initial_delay: Duration,
    timer: Mutex<Option<Timer>>,
    timing: Arc<RwLock<Timing>>,
}

impl std::fmt::Debug for WeatherScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherScheduler")
            .field("policy", &self.policy)
            .field("initial_delay", &self.initial_delay)
            .finish_non_exhaustive()
    }
}

impl WeatherScheduler {
    pub fn new(service: Arc<WeatherService>, policy: IntervalPolicy, initial_delay: Duration) -> Self {
        Self {
            service,
            policy,
            initial_delay,
            timer: Mutex::new(None),
            timing: Arc::new(RwLock::new(Timing {
                interval: policy.default,
                next_run_at: None,
            })),
        }
    }

    /// Starts the recurring job. Returns `false` if it was already scheduled.
    pub fn start(&self) -> bool {
        let mut timer = self.timer.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if timer.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            warn!("weather scheduler already running, ignoring start");
            return false;
        }

        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(drive(
            Arc::clone(&self.service),
            self.policy,
            self.initial_delay,
            Arc::clone(&self.timing),
            stop_rx,
        ));
        *timer = Some(Timer { stop, handle });

        info!(
            "weather scheduler started, first pass in {:?}",
            self.initial_delay
        );
        true
    }

    /// Cancels the pending timer. A pass already in progress runs to completion.
    pub fn stop(&self) -> bool {
        let timer = self
            .timer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();

        match timer {
            Some(timer) if !timer.handle.is_finished() => {
                // the receiver may already be gone if the task just exited
                let _ = timer.stop.send(true);
                info!("weather scheduler stopped");
                true
            }
            _ => false,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub async fn status(&self) -> SchedulerStatus {
        let scheduled = self.is_scheduled();
        let timing = *self.timing.read().await;

        SchedulerStatus {
            scheduled,
            running: self.service.is_running(),
            current_interval_secs: timing.interval.as_secs(),
            next_run_at: if scheduled { timing.next_run_at } else { None },
            last_run: self.service.last_run().await,
        }
    }
}

async fn drive(
    service: Arc<WeatherService>,
    policy: IntervalPolicy,
    initial_delay: Duration,
    timing: Arc<RwLock<Timing>>,
    mut stop: watch::Receiver<bool>,
) {
    let mut delay = initial_delay;

    loop {
        {
            let mut timing = timing.write().await;
            timing.next_run_at = chrono::Duration::from_std(delay)
                .ok()
                .map(|delay| Utc::now() + delay);
        }

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = stop.changed() => break,
        }

        let current = timing.read().await.interval;
        let next = match service.run_cycle().await {
            Ok(summary) => policy.next_interval(current, &summary),
            Err(IngestError::AlreadyRunning) => {
                info!("skipping scheduled pass, a manual pass is in progress");
                current
            }
            Err(err) => {
                warn!("weather ingestion pass failed: {err}");
                current
            }
        };

        if next != current {
            info!("next weather pass interval adjusted from {current:?} to {next:?}");
        }
        timing.write().await.interval = next;
        delay = next;
    }

    timing.write().await.next_run_at = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        weather::{client::WeatherClient, WeatherCaches},
    };

    fn scheduler(initial_delay: Duration) -> WeatherScheduler {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some(String::from("postgres://localhost/test")),
            "JWT_SECRET" => Some(String::from("secret")),
            _ => None,
        })
        .unwrap();
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let service = WeatherService::new(
            pool,
            WeatherClient::new(&config.weather).unwrap(),
            &config.weather,
            WeatherCaches::new(Duration::from_secs(60)),
        );
        WeatherScheduler::new(
            Arc::new(service),
            IntervalPolicy::new(config.weather.default_interval),
            initial_delay,
        )
    }

    #[tokio::test]
    async fn starting_twice_is_a_no_op() {
        let scheduler = scheduler(Duration::from_secs(3600));
        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert!(scheduler.is_scheduled());
        assert!(scheduler.stop());
    }

    #[tokio::test]
    async fn stop_clears_the_pending_timer() {
        let scheduler = scheduler(Duration::from_secs(3600));
        assert!(!scheduler.stop());

        scheduler.start();
        tokio::task::yield_now().await;
        assert!(scheduler.status().await.next_run_at.is_some());

        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert!(!scheduler.is_scheduled());

        // and it can be started again afterwards
        assert!(scheduler.start());
        scheduler.stop();
    }

    #[tokio::test]
    async fn status_reports_the_default_interval_before_any_pass() {
        let scheduler = scheduler(Duration::from_secs(3600));
        let status = scheduler.status().await;
        assert!(!status.scheduled);
        assert!(!status.running);
        assert_eq!(status.current_interval_secs, 30 * 60);
        assert!(status.last_run.is_none());
    }
}
