use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    TypedHeader,
};
use chrono::{Duration, Utc};
use color_eyre::eyre::eyre;
use headers::{authorization::Bearer, Authorization};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{entities::User, error::AppError, AppState};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: i32,
    pub username: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies the bearer tokens handed out at login.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys").field("ttl", &self.ttl).finish()
    }
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding, &Validation::default()).map(|data| data.claims)
    }
}

/// The caller behind a valid `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
    pub username: String,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(String::from("Admin access required")))
        }
    }

    /// Owners may touch their own rows, admins may touch everything.
    pub fn require_owner_or_admin(&self, owner_id: Option<i32>) -> Result<(), AppError> {
        if self.is_admin() || owner_id == Some(self.id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(String::from(
                "You do not have permission to modify this resource",
            )))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized(String::from("Missing bearer token")))?;

        let claims = state.jwt.verify(bearer.token())?;

        Ok(Self {
            id: claims.sub,
            username: claims.username,
            role: claims.role,
        })
    }
}

pub async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| eyre!("failed to hash password: {err}"))
    })
    .await
    .map_err(|err| AppError::Internal(eyre!("password hashing task failed: {err}")))?
    .map_err(AppError::Internal)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || {
        let parsed =
            PasswordHash::new(&hash).map_err(|err| eyre!("invalid stored password hash: {err}"))?;
        Ok::<_, color_eyre::Report>(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
        )
    })
    .await
    .map_err(|err| AppError::Internal(eyre!("password verification task failed: {err}")))?
    .map_err(AppError::Internal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str) -> User {
        User {
            id: 7,
            username: String::from("somchai"),
            email: String::from("somchai@example.com"),
            password_hash: String::new(),
            display_name: None,
            avatar_url: None,
            role: role.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn issued_tokens_verify() {
        let keys = JwtKeys::new("secret", 1);
        let token = keys.issue(&user(ROLE_ADMIN)).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.role, ROLE_ADMIN);
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let token = JwtKeys::new("secret", 1).issue(&user(ROLE_USER)).unwrap();
        assert!(JwtKeys::new("other", 1).verify(&token).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let keys = JwtKeys::new("secret", -2);
        let token = keys.issue(&user(ROLE_USER)).unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn ownership_rules() {
        let member = AuthUser {
            id: 3,
            username: String::from("member"),
            role: String::from(ROLE_USER),
        };
        assert!(member.require_owner_or_admin(Some(3)).is_ok());
        assert!(member.require_owner_or_admin(Some(4)).is_err());
        assert!(member.require_owner_or_admin(None).is_err());
        assert!(member.require_admin().is_err());

        let admin = AuthUser {
            role: String::from(ROLE_ADMIN),
            ..member
        };
        assert!(admin.require_owner_or_admin(Some(4)).is_ok());
    }

    #[tokio::test]
    async fn passwords_round_trip_through_argon2() {
        let hash = hash_password(String::from("correct horse")).await.unwrap();
        assert!(verify_password(String::from("correct horse"), hash.clone())
            .await
            .unwrap());
        assert!(!verify_password(String::from("wrong"), hash).await.unwrap());
    }
}
