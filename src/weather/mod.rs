//! Weather and air-quality ingestion.
//!
//! [`WeatherService`] pulls both providers for every province that has
//! coordinates, a few provinces at a time, and stores whatever arrived.
//! [`scheduler::WeatherScheduler`] repeats that pass on an interval that
//! stretches when providers struggle and recovers when they are healthy.

use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use metrics::{histogram, increment_counter};
use moka::future::Cache;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::WeatherConfig,
    entities::{AqiData, ProvinceCoordinates, WeatherData},
};

pub mod batch;
pub mod client;
pub mod retention;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod score;
pub mod store;

use client::{AqiReading, WeatherClient, WeatherReading};
use retry::RetryPolicy;
use score::ScoreBreakdown;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("an ingestion pass is already running")]
    AlreadyRunning,
    #[error("province {0} not found or has no coordinates")]
    UnknownProvince(i32),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// What happened to one province during a pass.
#[derive(Debug, Clone, Serialize)]
pub struct ProvinceOutcome {
    pub province_id: i32,
    pub province_name: String,
    pub weather_saved: bool,
    pub aqi_saved: bool,
    pub score: Option<ScoreBreakdown>,
    pub errors: Vec<String>,
}

impl ProvinceOutcome {
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvinceError {
    pub province_id: i32,
    pub province_name: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub errors: Vec<ProvinceError>,
}

impl RunSummary {
    fn from_outcomes(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        outcomes: &[ProvinceOutcome],
    ) -> Self {
        let total = outcomes.len();
        let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
        let errors = outcomes
            .iter()
            .filter(|o| !o.succeeded())
            .map(|o| ProvinceError {
                province_id: o.province_id,
                province_name: o.province_name.clone(),
                errors: o.errors.clone(),
            })
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let success_rate = if total == 0 {
            0.0
        } else {
            succeeded as f64 / total as f64
        };

        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            total,
            succeeded,
            failed: total - succeeded,
            success_rate,
            errors,
        }
    }
}

/// Read caches the ingestion job refreshes after each pass.
#[derive(Debug, Clone)]
pub struct WeatherCaches {
    pub latest_weather: Cache<(), Vec<WeatherData>>,
    pub latest_aqi: Cache<(), Vec<AqiData>>,
}

impl WeatherCaches {
    pub fn new(ttl: Duration) -> Self {
        Self {
            latest_weather: Cache::builder().time_to_live(ttl).build(),
            latest_aqi: Cache::builder().time_to_live(ttl).build(),
        }
    }

    pub fn invalidate(&self) {
        self.latest_weather.invalidate_all();
        self.latest_aqi.invalidate_all();
    }
}

pub struct WeatherService {
    pool: PgPool,
    client: WeatherClient,
    retry: RetryPolicy,
    batch_size: usize,
    batch_delay: Duration,
    caches: WeatherCaches,
    running: AtomicBool,
    last_run: RwLock<Option<RunSummary>>,
}

impl std::fmt::Debug for WeatherService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherService")
            .field("batch_size", &self.batch_size)
            .field("batch_delay", &self.batch_delay)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

/// Clears the running flag however the pass ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl WeatherService {
    pub fn new(
        pool: PgPool,
        client: WeatherClient,
        config: &WeatherConfig,
        caches: WeatherCaches,
    ) -> Self {
        Self {
            pool,
            client,
            retry: RetryPolicy::default(),
            batch_size: config.batch_size.max(1),
            batch_delay: config.batch_delay,
            caches,
            running: AtomicBool::new(false),
            last_run: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn last_run(&self) -> Option<RunSummary> {
        self.last_run.read().await.clone()
    }

    fn claim_flag(&self) -> Result<(), IngestError> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| IngestError::AlreadyRunning)
    }

    fn try_start(&self) -> Result<RunningGuard<'_>, IngestError> {
        self.claim_flag()?;
        Ok(RunningGuard(&self.running))
    }

    /// One full pass over every province with coordinates.
    pub async fn run_cycle(&self) -> Result<RunSummary, IngestError> {
        let _guard = self.try_start()?;
        self.run_pass().await
    }

    /// Claims the running flag now for a pass started later with
    /// [`ClaimedRun::run`].
    pub fn claim_run(self: &Arc<Self>) -> Result<ClaimedRun, IngestError> {
        self.claim_flag()?;
        Ok(ClaimedRun(Arc::clone(self)))
    }

    async fn run_pass(&self) -> Result<RunSummary, IngestError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();

        let provinces = store::provinces_with_coordinates(&self.pool).await?;
        info!(%run_id, "starting weather ingestion for {} provinces", provinces.len());

        let outcomes = batch::process_in_batches(
            &provinces,
            self.batch_size,
            self.batch_delay,
            |province| self.ingest_province(province),
        )
        .await;

        let summary = RunSummary::from_outcomes(run_id, started_at, clock.elapsed(), &outcomes);

        for failure in &summary.errors {
            warn!(
                %run_id,
                "province {} ({}) failed: {}",
                failure.province_name,
                failure.province_id,
                failure.errors.join("; ")
            );
        }
        info!(
            %run_id,
            "weather ingestion finished: {}/{} provinces in {}ms ({:.0}% success)",
            summary.succeeded,
            summary.total,
            summary.duration_ms,
            summary.success_rate * 100.0
        );

        increment_counter!("weatherplaces_ingest_runs");
        histogram!("weatherplaces_ingest_duration", clock.elapsed());

        self.caches.invalidate();
        *self.last_run.write().await = Some(summary.clone());

        Ok(summary)
    }

    /// Fetches and stores a single province outside the regular schedule.
    pub async fn refresh_province(&self, province_id: i32) -> Result<ProvinceOutcome, IngestError> {
        let province = store::province_with_coordinates(province_id, &self.pool)
            .await?
            .ok_or(IngestError::UnknownProvince(province_id))?;

        let outcome = self.ingest_province(&province).await;
        self.caches.invalidate();
        Ok(outcome)
    }

    async fn ingest_province(&self, province: &ProvinceCoordinates) -> ProvinceOutcome {
        let (lat, lon) = (province.latitude, province.longitude);
        let weather_label = format!("weather for {}", province.name);
        let aqi_label = format!("aqi for {}", province.name);

        let (weather, aqi) = tokio::join!(
            self.retry
                .run(&weather_label, || self.client.current_weather(lat, lon)),
            self.retry.run(&aqi_label, || self.client.air_quality(lat, lon)),
        );

        let fetched = Fetched::collect(weather, aqi);
        let saved = if fetched.has_readings() {
            Some(
                store::save_observations(
                    &self.pool,
                    province.id,
                    fetched.weather.as_ref(),
                    fetched.aqi.as_ref(),
                )
                .await,
            )
        } else {
            None
        };

        let outcome = fetched.into_outcome(province, saved);
        let result = if outcome.succeeded() { "success" } else { "failure" };
        increment_counter!("weatherplaces_ingest_province", "result" => result);

        outcome
    }
}

/// An ingestion pass claimed ahead of time, so it can run on another task.
/// Dropping it without running releases the claim.
#[derive(Debug)]
pub struct ClaimedRun(Arc<WeatherService>);

impl ClaimedRun {
    pub async fn run(self) -> Result<RunSummary, IngestError> {
        self.0.run_pass().await
    }
}

impl Drop for ClaimedRun {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
    }
}

/// Readings that arrived for one province, plus why the others did not.
#[derive(Debug)]
struct Fetched {
    weather: Option<WeatherReading>,
    aqi: Option<AqiReading>,
    errors: Vec<String>,
}

impl Fetched {
    fn collect<E: Display>(
        weather: Result<WeatherReading, E>,
        aqi: Result<AqiReading, E>,
    ) -> Self {
        let mut errors = Vec::new();
        let weather = weather
            .map_err(|err| errors.push(format!("weather: {err}")))
            .ok();
        let aqi = aqi.map_err(|err| errors.push(format!("aqi: {err}"))).ok();
        Self {
            weather,
            aqi,
            errors,
        }
    }

    const fn has_readings(&self) -> bool {
        self.weather.is_some() || self.aqi.is_some()
    }

    /// `saved` is `None` when nothing arrived and no save was attempted.
    fn into_outcome<E: Display>(
        self,
        province: &ProvinceCoordinates,
        saved: Option<Result<Option<ScoreBreakdown>, E>>,
    ) -> ProvinceOutcome {
        let mut errors = self.errors;
        let (weather_saved, aqi_saved, score) = match saved {
            Some(Ok(score)) => (self.weather.is_some(), self.aqi.is_some(), score),
            Some(Err(err)) => {
                errors.push(format!("save: {err}"));
                (false, false, None)
            }
            None => (false, false, None),
        };

        ProvinceOutcome {
            province_id: province.id,
            province_name: province.name.clone(),
            weather_saved,
            aqi_saved,
            score,
            errors,
        }
    }
}
