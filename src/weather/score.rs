use serde::Serialize;

use super::client::{AqiReading, WeatherReading};

const TEMPERATURE_WEIGHT: f64 = 0.30;
const HUMIDITY_WEIGHT: f64 = 0.15;
const RAIN_WEIGHT: f64 = 0.20;
const WIND_WEIGHT: f64 = 0.10;
const AQI_WEIGHT: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub score: f64,
    pub temperature_score: f64,
    pub humidity_score: f64,
    pub rain_score: f64,
    pub wind_score: f64,
    pub aqi_score: Option<f64>,
    pub rating: &'static str,
}

/// How pleasant a province is to visit right now, 0 to 100.
pub fn compute(weather: &WeatherReading, aqi: Option<&AqiReading>) -> ScoreBreakdown {
    let temperature_score = temperature_score(weather.temperature);
    let humidity_score = humidity_score(weather.humidity);
    let rain_score = rain_score(weather.rain_1h, &weather.condition);
    let wind_score = wind_score(weather.wind_speed);
    let aqi_score = aqi.map(|reading| aqi_score(reading.aqi));

    let mut weighted = temperature_score * TEMPERATURE_WEIGHT
        + humidity_score * HUMIDITY_WEIGHT
        + rain_score * RAIN_WEIGHT
        + wind_score * WIND_WEIGHT;
    let mut weights = TEMPERATURE_WEIGHT + HUMIDITY_WEIGHT + RAIN_WEIGHT + WIND_WEIGHT;
    if let Some(aqi_score) = aqi_score {
        weighted += aqi_score * AQI_WEIGHT;
        weights += AQI_WEIGHT;
    }

    let score = round1(weighted / weights);

    ScoreBreakdown {
        score,
        temperature_score,
        humidity_score,
        rain_score,
        wind_score,
        aqi_score,
        rating: rating(score),
    }
}

fn temperature_score(celsius: f64) -> f64 {
    let off = if celsius < 22.0 {
        22.0 - celsius
    } else if celsius > 28.0 {
        celsius - 28.0
    } else {
        0.0
    };
    round1((100.0 - off * 8.0).max(0.0))
}

fn humidity_score(humidity: i32) -> f64 {
    let off = if humidity < 40 {
        40 - humidity
    } else if humidity > 60 {
        humidity - 60
    } else {
        0
    };
    (100.0 - f64::from(off) * 2.0).max(0.0)
}

fn rain_score(rain_1h: f64, condition: &str) -> f64 {
    if condition.eq_ignore_ascii_case("thunderstorm") {
        return 0.0;
    }
    round1((100.0 - rain_1h.max(0.0) * 20.0).max(0.0))
}

fn wind_score(speed: f64) -> f64 {
    round1((100.0 - (speed - 5.0).max(0.0) * 10.0).max(0.0))
}

fn aqi_score(aqi: i32) -> f64 {
    match aqi {
        i32::MIN..=50 => 100.0,
        51..=100 => 80.0,
        101..=150 => 55.0,
        151..=200 => 30.0,
        201..=300 => 10.0,
        _ => 0.0,
    }
}

pub fn rating(score: f64) -> &'static str {
    if score >= 80.0 {
        "excellent"
    } else if score >= 60.0 {
        "good"
    } else if score >= 40.0 {
        "fair"
    } else if score >= 20.0 {
        "poor"
    } else {
        "bad"
    }
}

/// US EPA category for an AQI value.
pub const fn aqi_category(aqi: i32) -> &'static str {
    match aqi {
        i32::MIN..=50 => "Good",
        51..=100 => "Moderate",
        101..=150 => "Unhealthy for Sensitive Groups",
        151..=200 => "Unhealthy",
        201..=300 => "Very Unhealthy",
        _ => "Hazardous",
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn weather(temperature: f64, humidity: i32, rain_1h: f64, wind_speed: f64) -> WeatherReading {
        WeatherReading {
            temperature,
            feels_like: temperature,
            humidity,
            pressure: 1010,
            wind_speed,
            clouds: 20,
            rain_1h,
            condition: String::from("Clouds"),
            description: String::from("few clouds"),
            icon: String::from("02d"),
            observed_at: Utc::now(),
        }
    }

    fn aqi(value: i32) -> AqiReading {
        AqiReading {
            aqi: value,
            main_pollutant: String::from("p2"),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn ideal_conditions_score_full_marks() {
        let result = compute(&weather(25.0, 50, 0.0, 3.0), Some(&aqi(20)));
        assert!((result.score - 100.0).abs() < f64::EPSILON);
        assert_eq!(result.rating, "excellent");
    }

    #[test]
    fn hot_humid_polluted_day_scores_low() {
        let result = compute(&weather(36.0, 85, 2.0, 9.0), Some(&aqi(180)));
        assert!((result.temperature_score - 36.0).abs() < 1e-9);
        assert!((result.humidity_score - 50.0).abs() < 1e-9);
        assert!((result.rain_score - 60.0).abs() < 1e-9);
        assert!((result.wind_score - 60.0).abs() < 1e-9);
        assert_eq!(result.aqi_score, Some(30.0));
        // (36*.3 + 50*.15 + 60*.2 + 60*.1 + 30*.25) = 43.8
        assert!((result.score - 43.8).abs() < 1e-9);
        assert_eq!(result.rating, "fair");
    }

    #[test]
    fn missing_aqi_renormalises_weights() {
        let result = compute(&weather(25.0, 50, 0.0, 3.0), None);
        assert_eq!(result.aqi_score, None);
        assert!((result.score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn thunderstorms_zero_the_rain_component() {
        let mut reading = weather(25.0, 50, 0.0, 3.0);
        reading.condition = String::from("Thunderstorm");
        assert!(compute(&reading, None).rain_score.abs() < f64::EPSILON);
    }

    #[test]
    fn aqi_categories_follow_epa_breakpoints() {
        assert_eq!(aqi_category(50), "Good");
        assert_eq!(aqi_category(51), "Moderate");
        assert_eq!(aqi_category(150), "Unhealthy for Sensitive Groups");
        assert_eq!(aqi_category(301), "Hazardous");
    }
}
