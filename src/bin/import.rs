use std::{path::PathBuf, time::Instant};

use color_eyre::eyre::WrapErr;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use weatherplaces::config::Config;

#[derive(Debug, Deserialize)]
struct ProvinceSeed {
    name: String,
    name_local: Option<String>,
    region: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    description: Option<String>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    run().await
}

async fn run() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    std::env::set_var(
        "RUST_LOG",
        std::env::var("RUST_LOG").unwrap_or_else(|_| String::from("info")),
    );

    // initialize tracing
    tracing_subscriber::fmt::init();

    let input = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("assets/provinces.json"), PathBuf::from);
    let raw = std::fs::read_to_string(&input)
        .wrap_err_with(|| format!("failed to read {}", input.display()))?;
    let provinces: Vec<ProvinceSeed> = serde_json::from_str(&raw)?;

    info!("Loaded {} provinces from {}", provinces.len(), input.display());

    let config = Config::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    if config.run_migrations {
        sqlx::migrate!().run(&pool).await?;
    }

    let start = Instant::now();
    let mut tx = pool.begin().await?;
    let mut inserted = 0_u64;

    // upsert by name so the import can be re-run after editing the file
    for province in provinces {
        let (created,): (bool,) = sqlx::query_as(
            "INSERT INTO provinces (name, name_local, region, latitude, longitude, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO UPDATE SET
                name_local = EXCLUDED.name_local,
                region = EXCLUDED.region,
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                description = COALESCE(EXCLUDED.description, provinces.description),
                updated_at = NOW()
            RETURNING (xmax = 0)",
        )
        .bind(&province.name)
        .bind(province.name_local)
        .bind(province.region)
        .bind(province.latitude)
        .bind(province.longitude)
        .bind(province.description)
        .fetch_one(&mut tx)
        .await?;

        if created {
            inserted += 1;
        }
    }

    tx.commit().await?;

    let elapsed = start.elapsed();
    info!("Done in {elapsed:?}, {inserted} new provinces");

    Ok(())
}
