//! Admin tokens: issuing at login and the JWT middleware guarding admin routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use config_loader::ServiceConfig;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use wards::{RecordId, Role, User, UserDirectory};

use crate::{AppError, AppState};

pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 72;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: String,   // user id
    pub login: String, // email or phone used to sign in
    pub role: Role,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unsupported JWT algorithm {0} (expected HS256, HS384 or HS512)")]
    UnsupportedAlgorithm(String),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: Algorithm,
    pub ttl: Duration,
}

impl JwtConfig {
    pub fn new(secret: String, algorithm: Algorithm) -> Self {
        Self {
            secret,
            algorithm,
            ttl: Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn from_service_config(config: &ServiceConfig) -> Result<Self, AuthError> {
        let algorithm = parse_algorithm(&config.jwt_algorithm)?;
        let hours = i64::try_from(config.jwt_ttl_hours).unwrap_or(DEFAULT_TOKEN_TTL_HOURS);
        Ok(Self::new(config.jwt_secret.clone(), algorithm).with_ttl(Duration::hours(hours)))
    }

    /// Sign a token for `user`, valid for `ttl` from now.
    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            login: user.login.clone(),
            role: user.role,
            exp: timestamp(now + self.ttl),
            iat: timestamp(now),
        };
        let key = EncodingKey::from_secret(self.secret.as_bytes());
        Ok(encode(&Header::new(self.algorithm), &claims, &key)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;

        let decoding_key = DecodingKey::from_secret(self.secret.as_bytes());
        Ok(decode::<Claims>(token, &decoding_key, &validation)?.claims)
    }
}

fn timestamp(at: chrono::DateTime<Utc>) -> usize {
    usize::try_from(at.timestamp()).unwrap_or_default()
}

pub fn parse_algorithm(raw: &str) -> Result<Algorithm, AuthError> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        _ => Err(AuthError::UnsupportedAlgorithm(raw.to_string())),
    }
}

/// Rejects requests without a valid bearer token (401), whose subject no
/// longer exists (401), or whose subject is not currently an administrator
/// (403). The stored role wins over the token's, so a demotion takes effect
/// before the token expires.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let token = match bearer_token(&request) {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    let claims = match state.jwt_config.verify(&token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("JWT validation failed: {}", e);
            return AppError::unauthorized(format!("Invalid token: {}", e)).into_response();
        }
    };

    if !claims.role.is_administrator() {
        warn!(
            event = "auth.forbidden",
            sub = %claims.sub,
            role = %claims.role,
            "Non-administrator token used on admin route"
        );
        return AppError::forbidden("Administrator role required").into_response();
    }

    let Ok(user_id) = RecordId::parse(&claims.sub) else {
        warn!("JWT subject is not a user id: {}", claims.sub);
        return AppError::unauthorized("Invalid token subject").into_response();
    };
    let user = match state.io("users.find", state.store.find_user(user_id)).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!(event = "auth.unknown_subject", sub = %user_id, "Token subject no longer exists");
            return AppError::unauthorized("Account no longer exists").into_response();
        }
        Err(e) => return e.into_response(),
    };
    if !user.role.is_administrator() {
        warn!(
            event = "auth.forbidden",
            sub = %user_id,
            role = %user.role,
            "Token outlived the administrator role"
        );
        return AppError::forbidden("Administrator role required").into_response();
    }

    debug!("JWT token validated for subject: {}", claims.sub);
    next.run(request).await
}

fn bearer_token(request: &Request) -> Result<String, AppError> {
    let Some(header_value) = request.headers().get("Authorization") else {
        debug!("No Authorization header present - returning 401");
        return Err(AppError::unauthorized("Missing Authorization header"));
    };

    let auth_str = header_value.to_str().map_err(|e| {
        warn!("Failed to parse Authorization header: {}", e);
        AppError::unauthorized("Invalid Authorization header")
    })?;

    auth_str
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .ok_or_else(|| {
            warn!("Authorization header not in Bearer format");
            AppError::unauthorized("Authorization header must use Bearer scheme")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> User {
        User {
            id: RecordId::new(),
            name: "Aigerim".to_string(),
            login: "aigerim@example.edu".to_string(),
            key_id: "00".repeat(16),
            role: Role::Administrator,
            permitted_rooms: vec!["*".to_string()],
            password_hash: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_issue_then_verify() {
        let config = JwtConfig::new("test-secret".to_string(), Algorithm::HS256);
        let user = admin();

        let claims = config.verify(&config.issue(&user).unwrap()).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.login, user.login);
        assert_eq!(claims.role, Role::Administrator);
        assert_eq!(claims.exp - claims.iat, 72 * 3600);
    }

    #[test]
    fn test_verify_invalid_secret() {
        let issuer = JwtConfig::new("test-secret".to_string(), Algorithm::HS256);
        let verifier = JwtConfig::new("wrong-secret".to_string(), Algorithm::HS256);

        let token = issuer.issue(&admin()).unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_expired_token() {
        let secret = "test-secret";
        let config = JwtConfig::new(secret.to_string(), Algorithm::HS256);

        let expired_claims = Claims {
            sub: RecordId::new().to_string(),
            login: "old@example.edu".to_string(),
            role: Role::Administrator,
            exp: timestamp(Utc::now() - Duration::hours(2)),
            iat: timestamp(Utc::now() - Duration::hours(74)),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &expired_claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        let err = config.verify(&token).unwrap_err();
        assert!(err.to_string().to_lowercase().contains("expired"));
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!(parse_algorithm("hs512").unwrap(), Algorithm::HS512);
        assert!(matches!(
            parse_algorithm("RS256"),
            Err(AuthError::UnsupportedAlgorithm(_))
        ));
    }
}
