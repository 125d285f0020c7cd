//! JWT validation hook for protected routes.
//!
//! Every core route is currently public; routes that become
//! tenant-private are wrapped with [`require_jwt`] via
//! [`crate::protect`]. Tokens are HS256, signed with the daemon secret.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ApiState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
}

/// Validate a `Bearer` token against the shared secret.
pub fn authorize(secret: &str, authorization: Option<&str>) -> Result<Claims, String> {
    let header = authorization.ok_or("missing authorization header")?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or("authorization header is not a bearer token")?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| format!("invalid token: {e}"))?;

    Ok(data.claims)
}

/// Middleware guarding protected routes.
pub async fn require_jwt(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match authorize(&state.config.secret, authorization) {
        Ok(claims) => {
            debug!(sub = %claims.sub, "authorized request");
            next.run(request).await
        }
        Err(reason) => (StatusCode::UNAUTHORIZED, reason).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;

    fn token(secret: &str, exp: u64) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &Claims {
                sub: "operator".to_string(),
                exp,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> u64 {
        4_102_444_800 // 2100-01-01
    }

    #[test]
    fn test_authorize_accepts_valid_token() {
        let t = token("secret", far_future());
        let claims = authorize("secret", Some(&format!("Bearer {t}"))).unwrap();
        assert_eq!(claims.sub, "operator");
    }

    #[test]
    fn test_authorize_rejects_wrong_secret() {
        let t = token("other-secret", far_future());
        assert!(authorize("secret", Some(&format!("Bearer {t}"))).is_err());
    }

    #[test]
    fn test_authorize_rejects_missing_header() {
        assert!(authorize("secret", None).is_err());
    }

    #[test]
    fn test_authorize_rejects_non_bearer() {
        assert!(authorize("secret", Some("Basic abc")).is_err());
    }
}
