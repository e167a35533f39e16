// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supabase Auth (GoTrue) API client.
//!
//! Handles:
//! - PKCE authorization code exchange
//! - Session refresh
//! - User lookup for an access token
//! - Session revocation
//! - Building the provider authorize URL

use crate::config::Config;
use crate::models::{Session, User};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Structured GoTrue error codes meaning the refresh token can never succeed.
const INVALID_REFRESH_TOKEN_CODES: &[&str] =
    &["refresh_token_not_found", "refresh_token_already_used"];

/// Message fragments for services that do not send `error_code`.
const INVALID_REFRESH_TOKEN_MESSAGES: &[&str] = &["refresh_token_not_found", "Invalid Refresh Token"];

/// Auth service errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// The service answered with an error body.
    #[error("{message} (HTTP {status})")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Timed out or could not connect.
    #[error("Auth service unavailable: {0}")]
    Unavailable(String),

    /// No PKCE verifier was stored for this browser.
    #[error("PKCE code verifier not found in storage")]
    MissingVerifier,

    /// An operation needed a session and there was none.
    #[error("Auth session missing")]
    MissingSession,

    /// The stored session could not be written.
    #[error("Session storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Machine-readable error code, when there is one.
    pub fn code(&self) -> Option<&str> {
        match self {
            AuthError::Api { code, .. } => code.as_deref(),
            AuthError::Unavailable(_) => Some("service_unavailable"),
            AuthError::MissingVerifier => Some("pkce_code_verifier_not_found"),
            AuthError::MissingSession => Some("session_missing"),
            AuthError::Storage(_) => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, AuthError::Unavailable(_))
    }

    /// Whether the refresh token is missing, revoked or already used.
    ///
    /// Checks the structured `error_code` first. The message match is kept
    /// for services that only report the condition in free text.
    pub fn is_invalid_refresh_token(&self) -> bool {
        if let Some(code) = self.code() {
            if INVALID_REFRESH_TOKEN_CODES.contains(&code) {
                return true;
            }
        }

        match self {
            AuthError::Api { message, .. } => INVALID_REFRESH_TOKEN_MESSAGES
                .iter()
                .any(|needle| message.contains(needle)),
            _ => false,
        }
    }
}

/// Parameters for the provider authorize redirect.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub provider: String,
    pub redirect_to: String,
    pub code_challenge: String,
    /// Extra parameters forwarded to the identity provider.
    pub query_params: Vec<(String, String)>,
}

/// Remote auth service operations. Stateless: session persistence is the
/// job of [`crate::services::CookieSessionStore`].
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange a PKCE authorization code and its verifier for a session.
    async fn exchange_code(&self, auth_code: &str, code_verifier: &str)
        -> Result<Session, AuthError>;

    /// Issue a new session from a refresh token.
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError>;

    /// Fetch the user an access token belongs to.
    async fn get_user(&self, access_token: &str) -> Result<User, AuthError>;

    /// Revoke the session behind an access token.
    async fn logout(&self, access_token: &str) -> Result<(), AuthError>;

    /// URL that starts the provider sign-in.
    fn authorize_url(&self, request: &AuthorizeRequest) -> Result<String, AuthError>;
}

/// GoTrue HTTP client.
#[derive(Clone)]
pub struct GoTrueClient {
    http: reqwest::Client,
    auth_url: String,
    anon_key: String,
}

impl GoTrueClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed building auth HTTP client")?;

        Ok(Self {
            http,
            auth_url: format!("{}/auth/v1", config.supabase_url),
            anon_key: config.supabase_anon_key.clone(),
        })
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<Session, AuthError> {
        let response = self
            .http
            .post(format!("{}/token", self.auth_url))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let session: Session = check_response_json(response).await?;
        Ok(session.with_computed_expiry(Utc::now().timestamp()))
    }
}

#[async_trait]
impl AuthApi for GoTrueClient {
    async fn exchange_code(
        &self,
        auth_code: &str,
        code_verifier: &str,
    ) -> Result<Session, AuthError> {
        self.token_grant(
            "pkce",
            serde_json::json!({
                "auth_code": auth_code,
                "code_verifier": code_verifier,
            }),
        )
        .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        self.token_grant(
            "refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn get_user(&self, access_token: &str) -> Result<User, AuthError> {
        let response = self
            .http
            .get(format!("{}/user", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        check_response_json(response).await
    }

    async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .http
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        // Already-revoked or expired sessions count as signed out
        if status.is_success() || status == StatusCode::UNAUTHORIZED || status == StatusCode::NOT_FOUND {
            return Ok(());
        }

        Err(api_error(response).await)
    }

    fn authorize_url(&self, request: &AuthorizeRequest) -> Result<String, AuthError> {
        let mut params: Vec<(&str, &str)> = vec![
            ("provider", request.provider.as_str()),
            ("redirect_to", request.redirect_to.as_str()),
            ("code_challenge", request.code_challenge.as_str()),
            ("code_challenge_method", "s256"),
        ];
        params.extend(
            request
                .query_params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );

        url::Url::parse_with_params(&format!("{}/authorize", self.auth_url), &params)
            .map(|u| u.to_string())
            .map_err(|e| AuthError::Storage(format!("Invalid authorize URL: {}", e)))
    }
}

fn transport_error(e: reqwest::Error) -> AuthError {
    if e.is_timeout() || e.is_connect() {
        AuthError::Unavailable(e.to_string())
    } else {
        AuthError::Api {
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            code: None,
            message: e.to_string(),
        }
    }
}

/// Check response status and parse JSON body.
async fn check_response_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AuthError> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let status = response.status().as_u16();
    response.json().await.map_err(|e| AuthError::Api {
        status,
        code: None,
        message: format!("JSON parse error: {}", e),
    })
}

async fn api_error(response: reqwest::Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    parse_error_body(status, &body)
}

/// Map a GoTrue error body to an [`AuthError`].
///
/// Newer servers send `{"code": 400, "error_code": "...", "msg": "..."}`,
/// older ones `{"error": "...", "error_description": "..."}`.
fn parse_error_body(status: StatusCode, body: &str) -> AuthError {
    let json: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    let field = |name: &str| json.get(name).and_then(|v| v.as_str()).map(str::to_string);

    let code = field("error_code").or_else(|| field("code")).or_else(|| field("error"));
    let message = field("msg")
        .or_else(|| field("message"))
        .or_else(|| field("error_description"))
        .or_else(|| field("error"))
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body.to_string()
            }
        });

    AuthError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_body_new_format() {
        let err = parse_error_body(
            StatusCode::BAD_REQUEST,
            r#"{"code":400,"error_code":"refresh_token_not_found","msg":"Invalid Refresh Token: Refresh Token Not Found"}"#,
        );
        assert_eq!(err.code(), Some("refresh_token_not_found"));
        assert!(err.is_invalid_refresh_token());
    }

    #[test]
    fn test_parse_error_body_legacy_format() {
        let err = parse_error_body(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid Refresh Token: Already Used"}"#,
        );
        assert_eq!(err.code(), Some("invalid_grant"));
        // Only the message identifies the condition here
        assert!(err.is_invalid_refresh_token());
    }

    #[test]
    fn test_parse_error_body_not_json() {
        let err = parse_error_body(StatusCode::BAD_GATEWAY, "");
        match err {
            AuthError::Api { status, code, message } => {
                assert_eq!(status, 502);
                assert!(code.is_none());
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_other_errors_are_not_refresh_failures() {
        let err = parse_error_body(
            StatusCode::BAD_REQUEST,
            r#"{"code":400,"error_code":"flow_state_not_found","msg":"invalid flow state, no valid flow state found"}"#,
        );
        assert!(!err.is_invalid_refresh_token());
        assert!(!AuthError::Unavailable("timeout".to_string()).is_invalid_refresh_token());
        assert!(AuthError::Unavailable("timeout".to_string()).is_unavailable());
    }

    #[test]
    fn test_authorize_url() {
        let client = GoTrueClient::new(&Config::test_default()).unwrap();
        let url = client
            .authorize_url(&AuthorizeRequest {
                provider: "google".to_string(),
                redirect_to: "http://localhost:3000/auth/callback".to_string(),
                code_challenge: "abc".to_string(),
                query_params: vec![
                    ("access_type".to_string(), "offline".to_string()),
                    ("prompt".to_string(), "consent".to_string()),
                ],
            })
            .unwrap();

        let parsed = url::Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/auth/v1/authorize");
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("provider".to_string(), "google".to_string())));
        assert!(pairs.contains(&(
            "redirect_to".to_string(),
            "http://localhost:3000/auth/callback".to_string()
        )));
        assert!(pairs.contains(&("code_challenge_method".to_string(), "s256".to_string())));
        assert!(pairs.contains(&("access_type".to_string(), "offline".to_string())));
        assert!(pairs.contains(&("prompt".to_string(), "consent".to_string())));
    }
}
