//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs issued by the external identity provider and signed
//! with the shared `JWT_SECRET`. The `sub` claim is the owner id that scopes
//! every row this service reads or writes.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Owner id
    pub sub: String,
    /// Expiration (Unix timestamp seconds)
    pub exp: usize,
}

/// The authenticated account that owns the household data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl Owner {
    pub fn id(&self) -> &str {
        &self.0
    }
}

pub fn verify_token(token: &str, config: &Config) -> Result<Owner, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    match &config.jwt_audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }

    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        debug!("JWT validation failed: {e}");
        AppError::Unauthorized
    })?;

    if data.claims.sub.trim().is_empty() {
        return Err(AppError::Unauthorized);
    }
    Ok(Owner(data.claims.sub))
}

#[async_trait]
impl FromRequestParts<AppState> for Owner {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;

        verify_token(token, &state.config)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{config, mint_token, SECRET};
    use super::*;

    #[test]
    fn test_valid_token_yields_owner() {
        let token = mint_token("user_abc", SECRET, chrono::Duration::hours(1));
        let owner = verify_token(&token, &config()).unwrap();
        assert_eq!(owner.id(), "user_abc");
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = mint_token(
            "user_abc",
            "another-secret-that-is-also-long-enough",
            chrono::Duration::hours(1),
        );
        assert!(matches!(
            verify_token(&token, &config()),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let token = mint_token("user_abc", SECRET, chrono::Duration::hours(-2));
        assert!(matches!(
            verify_token(&token, &config()),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(matches!(
            verify_token("not-a-jwt", &config()),
            Err(AppError::Unauthorized)
        ));
    }
}
