use std::{net::SocketAddr, ops::RangeInclusive, str::FromStr, time::Duration};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable `{0}`")]
    Missing(&'static str),
    #[error("invalid value `{value}` for `{key}`")]
    Invalid { key: &'static str, value: String },
}

/// Ten years, far inside what `chrono::Duration::hours` accepts.
const MAX_JWT_EXPIRES_HOURS: i64 = 24 * 365 * 10;
const MAX_RETENTION_DAYS: i64 = 365 * 10;

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub openweather_api_key: String,
    pub openweather_base_url: String,
    pub airvisual_api_key: String,
    pub airvisual_base_url: String,
    pub http_timeout: Duration,
    pub scheduler_enabled: bool,
    pub initial_delay: Duration,
    pub default_interval: Duration,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub retention_days: i64,
    pub retention_cron: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub run_migrations: bool,
    pub jwt_secret: String,
    pub jwt_expires_hours: i64,
    pub cache_ttl: Duration,
    pub upload_max_bytes: usize,
    pub weather: WeatherConfig,
    pub cloudinary: Option<CloudinaryConfig>,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let cloudinary = match (
            env.optional("CLOUDINARY_CLOUD_NAME"),
            env.optional("CLOUDINARY_API_KEY"),
            env.optional("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
                folder: env
                    .optional("CLOUDINARY_FOLDER")
                    .unwrap_or_else(|| String::from("weatherplaces")),
            }),
            _ => None,
        };

        Ok(Self {
            host: env
                .optional("HOST")
                .unwrap_or_else(|| String::from("0.0.0.0")),
            port: env.parse_or("PORT", 3000)?,
            database_url: env.required("DATABASE_URL")?,
            database_max_connections: env.parse_or("DATABASE_MAX_CONNECTIONS", 30)?,
            run_migrations: env.parse_or("RUN_MIGRATIONS", true)?,
            jwt_secret: env.required("JWT_SECRET")?,
            jwt_expires_hours: env.parse_within("JWT_EXPIRES_HOURS", 24 * 7, 1..=MAX_JWT_EXPIRES_HOURS)?,
            cache_ttl: Duration::from_secs(env.parse_or("CACHE_TTL_SECS", 300)?),
            upload_max_bytes: env.parse_or("UPLOAD_MAX_BYTES", 5 * 1024 * 1024)?,
            weather: WeatherConfig {
                openweather_api_key: env.optional("OPENWEATHER_API_KEY").unwrap_or_default(),
                openweather_base_url: env.optional("OPENWEATHER_BASE_URL").unwrap_or_else(|| {
                    String::from("https://api.openweathermap.org/data/2.5")
                }),
                airvisual_api_key: env.optional("AIRVISUAL_API_KEY").unwrap_or_default(),
                airvisual_base_url: env
                    .optional("AIRVISUAL_BASE_URL")
                    .unwrap_or_else(|| String::from("https://api.airvisual.com/v2")),
                http_timeout: Duration::from_secs(env.parse_or("HTTP_TIMEOUT_SECS", 10)?),
                scheduler_enabled: env.parse_or("WEATHER_SCHEDULER_ENABLED", true)?,
                initial_delay: Duration::from_secs(env.parse_or("WEATHER_INITIAL_DELAY_SECS", 10)?),
                default_interval: Duration::from_secs(
                    env.parse_or("WEATHER_DEFAULT_INTERVAL_SECS", 30 * 60)?,
                ),
                batch_size: env.parse_or("WEATHER_BATCH_SIZE", 5)?,
                batch_delay: Duration::from_millis(env.parse_or("WEATHER_BATCH_DELAY_MS", 2000)?),
                retention_days: env.parse_within(
                    "WEATHER_RETENTION_DAYS",
                    30,
                    1..=MAX_RETENTION_DAYS,
                )?,
                retention_cron: env
                    .optional("WEATHER_RETENTION_CRON")
                    .unwrap_or_else(|| String::from("0 0 3 * * *")),
            },
            cloudinary,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid {
            key: "HOST",
            value: raw,
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn parse_or<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
            None => Ok(default),
        }
    }

    fn parse_within<T>(
        &self,
        key: &'static str,
        default: T,
        range: RangeInclusive<T>,
    ) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + ToString,
    {
        let value = self.parse_or(key, default)?;
        if range.contains(&value) {
            Ok(value)
        } else {
            Err(ConfigError::Invalid {
                key,
                value: value.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_required_values_are_set() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/weather"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.weather.batch_size, 5);
        assert_eq!(config.weather.default_interval, Duration::from_secs(1800));
        assert_eq!(config.weather.batch_delay, Duration::from_millis(2000));
        assert!(config.weather.scheduler_enabled);
        assert!(config.cloudinary.is_none());
        assert_eq!(config.socket_addr().unwrap().port(), 3000);
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = Config::from_lookup(lookup(&[("JWT_SECRET", "secret")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/weather"),
            ("JWT_SECRET", "  "),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("JWT_SECRET"));
    }

    #[test]
    fn unparsable_numbers_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/weather"),
            ("JWT_SECRET", "secret"),
            ("WEATHER_BATCH_SIZE", "five"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "WEATHER_BATCH_SIZE",
                value: String::from("five")
            }
        );
    }

    #[test]
    fn durations_outside_chrono_range_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/weather"),
            ("JWT_SECRET", "secret"),
            ("JWT_EXPIRES_HOURS", "9223372036854775807"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "JWT_EXPIRES_HOURS",
                value: String::from("9223372036854775807")
            }
        );

        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/weather"),
            ("JWT_SECRET", "secret"),
            ("WEATHER_RETENTION_DAYS", "0"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "WEATHER_RETENTION_DAYS",
                value: String::from("0")
            }
        );

        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/weather"),
            ("JWT_SECRET", "secret"),
            ("WEATHER_RETENTION_DAYS", "3650"),
        ]))
        .unwrap();
        assert_eq!(config.weather.retention_days, 3650);
        assert_eq!(config.jwt_expires_hours, 168);
    }

    #[test]
    fn cloudinary_needs_all_three_credentials() {
        let partial = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/weather"),
            ("JWT_SECRET", "secret"),
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_API_KEY", "key"),
        ]))
        .unwrap();
        assert!(partial.cloudinary.is_none());

        let full = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/weather"),
            ("JWT_SECRET", "secret"),
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_API_KEY", "key"),
            ("CLOUDINARY_API_SECRET", "shh"),
        ]))
        .unwrap();
        let cloudinary = full.cloudinary.unwrap();
        assert_eq!(cloudinary.folder, "weatherplaces");
    }
}
