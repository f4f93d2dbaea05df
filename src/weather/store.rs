use chrono::{Duration, Utc};
use sqlx::PgPool;

use super::{
    client::{AqiReading, WeatherReading},
    score::{self, ScoreBreakdown},
};
use crate::entities::ProvinceCoordinates;

pub async fn provinces_with_coordinates(
    db: &PgPool,
) -> Result<Vec<ProvinceCoordinates>, sqlx::Error> {
    sqlx::query_as::<_, ProvinceCoordinates>(
        "SELECT id, name, latitude, longitude FROM provinces
        WHERE latitude IS NOT NULL AND longitude IS NOT NULL
        ORDER BY id ASC",
    )
    .fetch_all(db)
    .await
}

pub async fn province_with_coordinates(
    id: i32,
    db: &PgPool,
) -> Result<Option<ProvinceCoordinates>, sqlx::Error> {
    sqlx::query_as::<_, ProvinceCoordinates>(
        "SELECT id, name, latitude, longitude FROM provinces
        WHERE id = $1 AND latitude IS NOT NULL AND longitude IS NOT NULL",
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

/// Writes one province's observations and refreshed score in a single transaction.
///
/// A missing AQI reading falls back to the most recent stored one when scoring.
pub async fn save_observations(
    db: &PgPool,
    province_id: i32,
    weather: Option<&WeatherReading>,
    aqi: Option<&AqiReading>,
) -> Result<Option<ScoreBreakdown>, sqlx::Error> {
    let mut tx = db.begin().await?;

    if let Some(weather) = weather {
        sqlx::query(
            "INSERT INTO weather_data (
                province_id, temperature, feels_like, humidity, pressure, wind_speed,
                clouds, rain_1h, condition, description, icon, observed_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(province_id)
        .bind(weather.temperature)
        .bind(weather.feels_like)
        .bind(weather.humidity)
        .bind(weather.pressure)
        .bind(weather.wind_speed)
        .bind(weather.clouds)
        .bind(weather.rain_1h)
        .bind(&weather.condition)
        .bind(&weather.description)
        .bind(&weather.icon)
        .bind(weather.observed_at)
        .execute(&mut tx)
        .await?;
    }

    if let Some(aqi) = aqi {
        sqlx::query(
            "INSERT INTO aqi_data (province_id, aqi, main_pollutant, observed_at)
            VALUES ($1,$2,$3,$4)",
        )
        .bind(province_id)
        .bind(aqi.aqi)
        .bind(&aqi.main_pollutant)
        .bind(aqi.observed_at)
        .execute(&mut tx)
        .await?;
    }

    let mut breakdown = None;
    if let Some(weather) = weather {
        let stored_aqi = match aqi {
            Some(_) => None,
            None => {
                sqlx::query_as::<_, (i32, String, chrono::DateTime<Utc>)>(
                    "SELECT aqi, main_pollutant, observed_at FROM aqi_data
                    WHERE province_id = $1 ORDER BY observed_at DESC LIMIT 1",
                )
                .bind(province_id)
                .fetch_optional(&mut tx)
                .await?
                .map(|(aqi, main_pollutant, observed_at)| AqiReading {
                    aqi,
                    main_pollutant,
                    observed_at,
                })
            }
        };

        let result = score::compute(weather, aqi.or(stored_aqi.as_ref()));

        sqlx::query(
            "INSERT INTO weather_scores (
                province_id, score, temperature_score, humidity_score, rain_score,
                wind_score, aqi_score, rating, computed_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,NOW())
            ON CONFLICT (province_id) DO UPDATE SET
                score = EXCLUDED.score,
                temperature_score = EXCLUDED.temperature_score,
                humidity_score = EXCLUDED.humidity_score,
                rain_score = EXCLUDED.rain_score,
                wind_score = EXCLUDED.wind_score,
                aqi_score = EXCLUDED.aqi_score,
                rating = EXCLUDED.rating,
                computed_at = EXCLUDED.computed_at",
        )
        .bind(province_id)
        .bind(result.score)
        .bind(result.temperature_score)
        .bind(result.humidity_score)
        .bind(result.rain_score)
        .bind(result.wind_score)
        .bind(result.aqi_score)
        .bind(result.rating)
        .execute(&mut tx)
        .await?;

        breakdown = Some(result);
    }

    tx.commit().await?;

    Ok(breakdown)
}

/// Removes observations older than `days`. Returns (weather rows, aqi rows) deleted.
pub async fn prune_observations(db: &PgPool, days: i64) -> Result<(u64, u64), sqlx::Error> {
    let cutoff = Utc::now() - Duration::days(days);

    let weather = sqlx::query("DELETE FROM weather_data WHERE observed_at < $1")
        .bind(cutoff)
        .execute(db)
        .await?
        .rows_affected();

    let aqi = sqlx::query("DELETE FROM aqi_data WHERE observed_at < $1")
        .bind(cutoff)
        .execute(db)
        .await?
        .rows_affected();

    Ok((weather, aqi))
}
