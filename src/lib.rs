#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(clippy::missing_const_for_fn)]
#![deny(clippy::nursery)]
#![deny(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

use std::sync::Arc;

use color_eyre::eyre::WrapErr;
use entities::Province;
use moka::future::Cache;
use sqlx::postgres::PgPoolOptions;
pub use sqlx::PgPool;
use tracing::info;

use crate::{
    auth::JwtKeys,
    config::Config,
    storage::ImageStorage,
    weather::{
        client::WeatherClient, schedule::IntervalPolicy, scheduler::WeatherScheduler,
        WeatherCaches, WeatherService,
    },
};

pub mod auth;
pub mod config;
pub mod entities;
pub mod error;
pub mod extract;
pub mod response;
pub mod routes;
pub mod storage;
pub mod util;
pub mod weather;

#[derive(Debug, Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt: JwtKeys,
    // The province list changes rarely and is read on every page load.
    pub province_cache: Cache<(), Vec<Province>>,
    pub weather_caches: WeatherCaches,
    pub weather: Arc<WeatherService>,
    pub scheduler: Arc<WeatherScheduler>,
    // None when Cloudinary is not configured.
    pub storage: Option<Arc<ImageStorage>>,
}

impl AppState {
    /// Wires every service around an existing pool. Nothing here touches the database.
    pub fn with_pool(config: Config, pool: PgPool) -> color_eyre::Result<Self> {
        let weather_caches = WeatherCaches::new(config.cache_ttl);
        let client = WeatherClient::new(&config.weather).wrap_err("failed to build weather client")?;
        let weather = Arc::new(WeatherService::new(
            pool.clone(),
            client,
            &config.weather,
            weather_caches.clone(),
        ));
        let scheduler = Arc::new(WeatherScheduler::new(
            Arc::clone(&weather),
            IntervalPolicy::new(config.weather.default_interval),
            config.weather.initial_delay,
        ));

        let storage = match config.cloudinary.clone() {
            Some(cloudinary) => Some(Arc::new(
                ImageStorage::new(cloudinary).wrap_err("failed to build image storage client")?,
            )),
            None => None,
        };

        Ok(Self {
            jwt: JwtKeys::new(&config.jwt_secret, config.jwt_expires_hours),
            province_cache: Cache::builder().time_to_live(config.cache_ttl).build(),
            pool,
            weather_caches,
            weather,
            scheduler,
            storage,
            config: Arc::new(config),
        })
    }

    /// Connects to the database, applies migrations when enabled and builds the state.
    pub async fn connect(config: Config) -> color_eyre::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await
            .wrap_err("failed to connect to the database")?;

        if config.run_migrations {
            sqlx::migrate!()
                .run(&pool)
                .await
                .wrap_err("failed to run migrations")?;
            info!("database migrations applied");
        }

        Self::with_pool(config, pool)
    }
}
