use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Province {
    pub id: i32,
    pub name: String,
    pub name_local: Option<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A province the ingestion job can fetch observations for.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProvinceCoordinates {
    pub id: i32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Place {
    pub id: i32,
    pub province_id: i32,
    pub province_name: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image_url: Option<String>,
    pub created_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Post {
    pub id: i32,
    pub user_id: i32,
    pub author: String,
    pub place_id: Option<i32>,
    pub place_name: Option<String>,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WeatherData {
    pub id: i64,
    pub province_id: i32,
    pub province_name: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: i32,
    pub pressure: i32,
    pub wind_speed: f64,
    pub clouds: i32,
    pub rain_1h: f64,
    pub condition: String,
    pub description: String,
    pub icon: String,
    pub observed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AqiData {
    pub id: i64,
    pub province_id: i32,
    pub province_name: String,
    pub aqi: i32,
    pub main_pollutant: String,
    pub observed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WeatherScore {
    pub province_id: i32,
    pub province_name: String,
    pub score: f64,
    pub temperature_score: f64,
    pub humidity_score: f64,
    pub rain_score: f64,
    pub wind_score: f64,
    pub aqi_score: Option<f64>,
    pub rating: String,
    pub computed_at: DateTime<Utc>,
}
