use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use super::retry::Transient;
use crate::config::WeatherConfig;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("provider reported failure: {0}")]
    Provider(String),
    #[error("{0} API key is not configured")]
    NotConfigured(&'static str),
}

impl Transient for FetchError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Decode(_) | Self::Provider(_) | Self::NotConfigured(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherReading {
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
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AqiReading {
    pub aqi: i32,
    pub main_pollutant: String,
    pub observed_at: DateTime<Utc>,
}

/// Talks to OpenWeatherMap (weather) and IQAir AirVisual (air quality).
#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: Client,
    openweather_base_url: String,
    openweather_api_key: String,
    airvisual_base_url: String,
    airvisual_api_key: String,
}

impl WeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            openweather_base_url: config.openweather_base_url.trim_end_matches('/').to_string(),
            openweather_api_key: config.openweather_api_key.clone(),
            airvisual_base_url: config.airvisual_base_url.trim_end_matches('/').to_string(),
            airvisual_api_key: config.airvisual_api_key.clone(),
        })
    }

    pub async fn current_weather(&self, lat: f64, lon: f64) -> Result<WeatherReading, FetchError> {
        if self.openweather_api_key.is_empty() {
            return Err(FetchError::NotConfigured("OpenWeatherMap"));
        }

        let url = format!("{}/weather", self.openweather_base_url);
        let request = self.http.get(url).query(&[
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("appid", self.openweather_api_key.clone()),
            ("units", String::from("metric")),
        ]);

        let response: openweather::CurrentWeather = send_json(request).await?;
        response.try_into()
    }

    pub async fn air_quality(&self, lat: f64, lon: f64) -> Result<AqiReading, FetchError> {
        if self.airvisual_api_key.is_empty() {
            return Err(FetchError::NotConfigured("AirVisual"));
        }

        let url = format!("{}/nearest_city", self.airvisual_base_url);
        let request = self.http.get(url).query(&[
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("key", self.airvisual_api_key.clone()),
        ]);

        let response: airvisual::NearestCity = send_json(request).await?;
        response.try_into()
    }
}

async fn send_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, FetchError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let body = body.chars().take(200).collect();
        return Err(FetchError::Status { status, body });
    }

    serde_json::from_str(&body).map_err(|err| FetchError::Decode(err.to_string()))
}

fn timestamp(seconds: i64) -> Result<DateTime<Utc>, FetchError> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| FetchError::Decode(format!("invalid timestamp {seconds}")))
}

/// OpenWeatherMap current weather payload.
mod openweather {
    use super::{timestamp, FetchError, WeatherReading};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct CurrentWeather {
        pub weather: Vec<Condition>,
        pub main: Main,
        pub wind: Option<Wind>,
        pub clouds: Option<Clouds>,
        pub rain: Option<Rain>,
        pub dt: i64,
    }

    #[derive(Debug, Deserialize)]
    pub struct Condition {
        pub main: String,
        pub description: String,
        pub icon: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct Main {
        pub temp: f64,
        pub feels_like: f64,
        pub humidity: i32,
        pub pressure: i32,
    }

    #[derive(Debug, Deserialize)]
    pub struct Wind {
        pub speed: f64,
    }

    #[derive(Debug, Deserialize)]
    pub struct Clouds {
        pub all: i32,
    }

    #[derive(Debug, Deserialize)]
    pub struct Rain {
        #[serde(rename = "1h")]
        pub one_hour: Option<f64>,
    }

    impl TryFrom<CurrentWeather> for WeatherReading {
        type Error = FetchError;

        fn try_from(value: CurrentWeather) -> Result<Self, Self::Error> {
            let condition = value
                .weather
                .into_iter()
                .next()
                .ok_or_else(|| FetchError::Decode(String::from("missing weather condition")))?;

            Ok(Self {
                temperature: value.main.temp,
                feels_like: value.main.feels_like,
                humidity: value.main.humidity,
                pressure: value.main.pressure,
                wind_speed: value.wind.map_or(0.0, |wind| wind.speed),
                clouds: value.clouds.map_or(0, |clouds| clouds.all),
                rain_1h: value.rain.and_then(|rain| rain.one_hour).unwrap_or(0.0),
                condition: condition.main,
                description: condition.description,
                icon: condition.icon,
                observed_at: timestamp(value.dt)?,
            })
        }
    }
}

/// AirVisual `nearest_city` payload.
mod airvisual {
    use super::{AqiReading, FetchError};
    use chrono::{DateTime, Utc};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct NearestCity {
        pub status: String,
        pub data: Option<serde_json::Value>,
    }

    #[derive(Debug, Deserialize)]
    struct Data {
        current: Current,
    }

    #[derive(Debug, Deserialize)]
    struct Current {
        pollution: Pollution,
    }

    #[derive(Debug, Deserialize)]
    struct Pollution {
        ts: DateTime<Utc>,
        aqius: i32,
        mainus: String,
    }

    impl TryFrom<NearestCity> for AqiReading {
        type Error = FetchError;

        fn try_from(value: NearestCity) -> Result<Self, Self::Error> {
            // on failure `data` is an object like {"message": "call_limit_reached"}
            if value.status != "success" {
                let reason = value
                    .data
                    .as_ref()
                    .and_then(|data| data.get("message"))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or(&value.status)
                    .to_string();
                return Err(FetchError::Provider(reason));
            }

            let data: Data = value
                .data
                .map(serde_json::from_value)
                .transpose()
                .map_err(|err| FetchError::Decode(err.to_string()))?
                .ok_or_else(|| FetchError::Decode(String::from("missing data")))?;

            Ok(Self {
                aqi: data.current.pollution.aqius,
                main_pollutant: data.current.pollution.mainus,
                observed_at: data.current.pollution.ts,
            })
        }
    }
}
