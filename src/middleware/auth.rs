// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT authentication middleware for the JSON API.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;

/// Audience Supabase puts on tokens of signed-in users.
pub const AUTHENTICATED_AUDIENCE: &str = "authenticated";

/// Access token claims.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub aud: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
}

/// Authenticated user extracted from the access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Middleware that requires a valid access token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    // Explicit header first, then the session cookie
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);
    let cookie = state
        .session_store(jar)
        .stored_session()
        .map(|session| session.access_token);

    for token in bearer.into_iter().chain(cookie) {
        match verify_access_token(&token, &state.config.supabase_jwt_secret) {
            Ok(auth_user) => {
                request.extensions_mut().insert(auth_user);
                return next.run(request).await;
            }
            Err(status) => {
                tracing::debug!(status = %status, "Rejected access token");
            }
        }
    }

    AppError::Unauthorized.into_response()
}

/// Verify an HS256 access token and extract the user.
pub fn verify_access_token(token: &str, secret: &[u8]) -> Result<AuthUser, StatusCode> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[AUTHENTICATED_AUDIENCE]);

    let token_data =
        decode::<Claims>(token, &key, &validation).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let id = Uuid::parse_str(&token_data.claims.sub).map_err(|_| StatusCode::UNAUTHORIZED)?;

    Ok(AuthUser {
        id,
        email: token_data.claims.email,
    })
}

/// Sign an access token the way the auth service does. Used by tests and
/// local tooling.
pub fn create_access_token(
    user_id: Uuid,
    email: Option<&str>,
    secret: &[u8],
    ttl_secs: i64,
) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now().timestamp();

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.map(str::to_string),
        aud: AUTHENTICATED_AUDIENCE.to_string(),
        iat: now as usize,
        exp: (now + ttl_secs).max(0) as usize,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )?)
}
