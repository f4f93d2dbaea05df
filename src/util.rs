use sqlx::PgPool;

use crate::entities::{Place, Post, Province, User};

pub const PLACE_SELECT: &str = "SELECT p.id, p.province_id, pr.name AS province_name, p.name, p.description,
    p.category, p.latitude, p.longitude, p.image_url, p.created_by, p.created_at, p.updated_at
    FROM places p JOIN provinces pr ON pr.id = p.province_id";

pub const POST_SELECT: &str = "SELECT po.id, po.user_id, u.username AS author, po.place_id,
    pl.name AS place_name, po.title, po.content, po.image_url, po.created_at, po.updated_at
    FROM posts po JOIN users u ON u.id = po.user_id LEFT JOIN places pl ON pl.id = po.place_id";

pub const WEATHER_SELECT: &str = "SELECT w.id, w.province_id, pr.name AS province_name, w.temperature,
    w.feels_like, w.humidity, w.pressure, w.wind_speed, w.clouds, w.rain_1h, w.condition,
    w.description, w.icon, w.observed_at, w.created_at
    FROM weather_data w JOIN provinces pr ON pr.id = w.province_id";

pub const AQI_SELECT: &str = "SELECT a.id, a.province_id, pr.name AS province_name, a.aqi,
    a.main_pollutant, a.observed_at, a.created_at
    FROM aqi_data a JOIN provinces pr ON pr.id = a.province_id";

pub const SCORE_SELECT: &str = "SELECT s.province_id, pr.name AS province_name, s.score,
    s.temperature_score, s.humidity_score, s.rain_score, s.wind_score, s.aqi_score, s.rating,
    s.computed_at
    FROM weather_scores s JOIN provinces pr ON pr.id = s.province_id";

/// Page/limit pair for list endpoints. Pages start at 1, limit is capped at 100
/// and the page is capped so the offset always fits in an `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: i64,
    pub limit: i64,
}

impl Paging {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;
    pub const MAX_PAGE: i64 = i64::MAX / Self::MAX_LIMIT;

    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, Self::MAX_PAGE),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    pub const fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

pub async fn fetch_province(id: i32, db: &PgPool) -> Result<Option<Province>, sqlx::Error> {
    sqlx::query_as::<_, Province>("SELECT * FROM provinces WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn fetch_place(id: i32, db: &PgPool) -> Result<Option<Place>, sqlx::Error> {
    sqlx::query_as::<_, Place>(&format!("{PLACE_SELECT} WHERE p.id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn fetch_post(id: i32, db: &PgPool) -> Result<Option<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(&format!("{POST_SELECT} WHERE po.id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn fetch_user(id: i32, db: &PgPool) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Wraps a user supplied search term for a case-insensitive `LIKE`.
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_defaults_and_bounds() {
        assert_eq!(Paging::new(None, None), Paging { page: 1, limit: 20 });
        assert_eq!(Paging::new(Some(0), Some(1000)), Paging { page: 1, limit: 100 });
        assert_eq!(Paging::new(Some(3), Some(10)).offset(), 20);
    }

    #[test]
    fn huge_pages_do_not_overflow_the_offset() {
        let paging = Paging::new(Some(i64::MAX), Some(Paging::MAX_LIMIT));
        assert_eq!(paging.page, Paging::MAX_PAGE);
        assert!(paging.offset() > 0);

        let paging = Paging::new(Some(i64::MAX), Some(20));
        assert!(paging.offset() > 0);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" chiang "), "%chiang%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
