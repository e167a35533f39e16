// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth callback resolution.
//!
//! Both callback entry points (the redirect query and the URL fragment
//! posted back by the browser) are turned into an [`AuthDelivery`] and
//! resolved by the same function, so the profile-completeness branch exists
//! only once.

use crate::db::{ProfileError, ProfileStore};
use crate::models::TokenPair;
use crate::services::gotrue::AuthError;
use crate::services::session_store::CookieSessionStore;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use uuid::Uuid;

/// Query parameters on the provider redirect.
#[derive(Debug, Default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse a raw query string. Repeated keys keep their first value.
    pub fn parse(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }
}

/// How the callback reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// `GET /auth/callback` query string
    Query,
    /// URL fragment posted to `/auth/callback-client`
    Fragment,
}

impl Channel {
    /// Error reported when resolution fails unexpectedly.
    pub fn catch_all(self) -> AuthErrorCode {
        match self {
            Channel::Query => AuthErrorCode::UnexpectedError,
            Channel::Fragment => AuthErrorCode::ClientProcessingFailed,
        }
    }
}

/// What the identity provider delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthDelivery {
    ProviderError {
        code: String,
        description: Option<String>,
    },
    AuthorizationCode(String),
    ImplicitTokens {
        tokens: TokenPair,
        expires_at: Option<i64>,
    },
    Absent,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl AuthDelivery {
    /// `error` wins over `code`; empty values count as absent.
    pub fn from_query(params: &CallbackParams) -> Self {
        if let Some(code) = non_empty(params.error.as_deref()) {
            return AuthDelivery::ProviderError {
                code: code.to_string(),
                description: params.error_description.clone(),
            };
        }

        match non_empty(params.code.as_deref()) {
            Some(code) => AuthDelivery::AuthorizationCode(code.to_string()),
            None => AuthDelivery::Absent,
        }
    }

    /// Parse an implicit-flow fragment (`#access_token=...&refresh_token=...`).
    pub fn from_fragment(fragment: &str) -> Self {
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment);

        let mut access_token = None;
        let mut refresh_token = None;
        let mut expires_at = None;
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            match key.as_ref() {
                "access_token" => access_token = Some(value.into_owned()),
                "refresh_token" => refresh_token = Some(value.into_owned()),
                "expires_at" => expires_at = value.parse().ok(),
                _ => {}
            }
        }

        match (
            access_token.filter(|t| !t.is_empty()),
            refresh_token.filter(|t| !t.is_empty()),
        ) {
            (Some(access_token), Some(refresh_token)) => AuthDelivery::ImplicitTokens {
                tokens: TokenPair {
                    access_token,
                    refresh_token,
                },
                expires_at,
            },
            _ => AuthDelivery::Absent,
        }
    }
}

/// Error codes carried in `?error=` to the error page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorCode {
    NoCode,
    ExchangeFailed,
    UserFetchFailed,
    NoUser,
    UnexpectedError,
    MissingTokens,
    SessionSetupFailed,
    ClientProcessingFailed,
    ServiceUnavailable,
    SigninFailed,
    /// Passed through verbatim from the identity provider.
    Provider(String),
}

const GENERIC_MESSAGE: &str = "There was an error signing you in. Please try again.";

impl AuthErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            AuthErrorCode::NoCode => "no_code",
            AuthErrorCode::ExchangeFailed => "exchange_failed",
            AuthErrorCode::UserFetchFailed => "user_fetch_failed",
            AuthErrorCode::NoUser => "no_user",
            AuthErrorCode::UnexpectedError => "unexpected_error",
            AuthErrorCode::MissingTokens => "missing_tokens",
            AuthErrorCode::SessionSetupFailed => "session_setup_failed",
            AuthErrorCode::ClientProcessingFailed => "client_processing_failed",
            AuthErrorCode::ServiceUnavailable => "service_unavailable",
            AuthErrorCode::SigninFailed => "signin_failed",
            AuthErrorCode::Provider(code) => code,
        }
    }

    pub fn parse(code: &str) -> Self {
        match code {
            "no_code" => AuthErrorCode::NoCode,
            "exchange_failed" => AuthErrorCode::ExchangeFailed,
            "user_fetch_failed" => AuthErrorCode::UserFetchFailed,
            "no_user" => AuthErrorCode::NoUser,
            "unexpected_error" => AuthErrorCode::UnexpectedError,
            "missing_tokens" => AuthErrorCode::MissingTokens,
            "session_setup_failed" => AuthErrorCode::SessionSetupFailed,
            "client_processing_failed" => AuthErrorCode::ClientProcessingFailed,
            "service_unavailable" => AuthErrorCode::ServiceUnavailable,
            "signin_failed" => AuthErrorCode::SigninFailed,
            other => AuthErrorCode::Provider(other.to_string()),
        }
    }

    /// Message shown on the error page.
    pub fn message(&self) -> &'static str {
        match self {
            AuthErrorCode::NoCode => {
                "No authorization code received from Google. This might be a temporary issue."
            }
            AuthErrorCode::ExchangeFailed => {
                "Failed to exchange authorization code for session. Please try again."
            }
            AuthErrorCode::UserFetchFailed => {
                "Unable to fetch user information after authentication."
            }
            AuthErrorCode::NoUser => "Authentication succeeded but no user data was found.",
            AuthErrorCode::UnexpectedError => "An unexpected error occurred during authentication.",
            AuthErrorCode::MissingTokens => "OAuth tokens were not found in the callback URL.",
            AuthErrorCode::SessionSetupFailed => {
                "Failed to establish authentication session with the provided tokens."
            }
            AuthErrorCode::ClientProcessingFailed => {
                "An error occurred while processing the authentication callback."
            }
            AuthErrorCode::ServiceUnavailable => {
                "The authentication service is temporarily unavailable. Please try again shortly."
            }
            AuthErrorCode::SigninFailed => "Unable to start sign-in with Google. Please try again.",
            AuthErrorCode::Provider(_) => GENERIC_MESSAGE,
        }
    }

    /// Message for an optional `?error=` value.
    pub fn message_for(code: Option<&str>) -> &'static str {
        code.map(|c| AuthErrorCode::parse(c).message())
            .unwrap_or(GENERIC_MESSAGE)
    }
}

/// Where a callback sends the browser next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    Setup,
    Dashboard,
    ClientCallback,
    Error(AuthErrorCode),
}

impl RedirectOutcome {
    pub fn path(&self) -> String {
        match self {
            RedirectOutcome::Setup => "/setup".to_string(),
            RedirectOutcome::Dashboard => "/".to_string(),
            RedirectOutcome::ClientCallback => "/auth/callback-client".to_string(),
            RedirectOutcome::Error(code) => format!(
                "/auth/auth-code-error?error={}",
                urlencoding::encode(code.as_str())
            ),
        }
    }

    /// Absolute redirect target under `origin`.
    pub fn url(&self, origin: &str) -> String {
        format!("{}{}", origin.trim_end_matches('/'), self.path())
    }
}

/// Resolve a delivery to exactly one redirect.
///
/// Panics during resolution become the channel's catch-all error.
pub async fn resolve(
    delivery: AuthDelivery,
    channel: Channel,
    store: &CookieSessionStore,
    profiles: &dyn ProfileStore,
) -> RedirectOutcome {
    match AssertUnwindSafe(decide(delivery, channel, store, profiles))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::error!(channel = ?channel, "Auth callback processing panicked");
            RedirectOutcome::Error(channel.catch_all())
        }
    }
}

async fn decide(
    delivery: AuthDelivery,
    channel: Channel,
    store: &CookieSessionStore,
    profiles: &dyn ProfileStore,
) -> RedirectOutcome {
    match delivery {
        AuthDelivery::ProviderError { code, description } => {
            tracing::warn!(
                error = %code,
                description = description.as_deref().unwrap_or(""),
                "Identity provider returned an error"
            );
            RedirectOutcome::Error(AuthErrorCode::parse(&code))
        }

        AuthDelivery::Absent => match channel {
            Channel::Query => {
                tracing::debug!("No code in callback, handing off to fragment handler");
                RedirectOutcome::ClientCallback
            }
            Channel::Fragment => {
                tracing::warn!("Callback fragment is missing tokens");
                RedirectOutcome::Error(AuthErrorCode::MissingTokens)
            }
        },

        AuthDelivery::AuthorizationCode(code) => {
            if let Err(e) = store.exchange_code(&code).await {
                tracing::error!(error = %e, "Code exchange failed");
                return RedirectOutcome::Error(failure_code(&e, AuthErrorCode::ExchangeFailed));
            }

            match store.get_user().await {
                Ok(Some(user)) => {
                    tracing::info!(user_id = %user.id, "Code exchange succeeded");
                    profile_destination(profiles, user.id).await
                }
                // Only if the stored session vanished between exchange and lookup
                Ok(None) => {
                    tracing::error!("Session established but no user returned");
                    RedirectOutcome::Error(AuthErrorCode::NoUser)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to fetch user after code exchange");
                    RedirectOutcome::Error(failure_code(&e, AuthErrorCode::UserFetchFailed))
                }
            }
        }

        AuthDelivery::ImplicitTokens { tokens, expires_at } => {
            tracing::debug!(expires_at = ?expires_at, "Setting session from fragment tokens");

            match store.set_session(&tokens).await {
                Ok(session) => match session.user {
                    Some(user) => {
                        tracing::info!(user_id = %user.id, "Session set from fragment tokens");
                        profile_destination(profiles, user.id).await
                    }
                    None => RedirectOutcome::Dashboard,
                },
                Err(e) => {
                    tracing::error!(error = %e, "Failed to set session from fragment tokens");
                    RedirectOutcome::Error(failure_code(&e, AuthErrorCode::SessionSetupFailed))
                }
            }
        }
    }
}

fn failure_code(err: &AuthError, fallback: AuthErrorCode) -> AuthErrorCode {
    if err.is_unavailable() {
        AuthErrorCode::ServiceUnavailable
    } else {
        fallback
    }
}

/// `/` for a completed setup, `/setup` for everything else.
///
/// Store errors other than NotFound are logged and also send the user to
/// setup, on both channels.
pub async fn profile_destination(profiles: &dyn ProfileStore, user_id: Uuid) -> RedirectOutcome {
    match profiles.get(user_id).await {
        Ok(profile) if profile.is_setup_complete() => RedirectOutcome::Dashboard,
        Ok(_) => RedirectOutcome::Setup,
        Err(ProfileError::NotFound) => {
            tracing::debug!(user_id = %user_id, "No profile yet, sending to setup");
            RedirectOutcome::Setup
        }
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Profile lookup failed, sending to setup");
            RedirectOutcome::Setup
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(code: Option<&str>, error: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(str::to_string),
            error: error.map(str::to_string),
            error_description: None,
        }
    }

    #[test]
    fn test_parse_keeps_first_of_repeated_keys() {
        let params = CallbackParams::parse("error=access_denied&error=other&code=a&code=b");
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.code.as_deref(), Some("a"));

        let params = CallbackParams::parse("error_description=User+denied%21&state=xyz");
        assert_eq!(params.error_description.as_deref(), Some("User denied!"));
        assert!(params.code.is_none());
        assert!(params.error.is_none());
    }

    #[test]
    fn test_from_query_error_takes_precedence() {
        assert_eq!(
            AuthDelivery::from_query(&params(Some("abc"), Some("access_denied"))),
            AuthDelivery::ProviderError {
                code: "access_denied".to_string(),
                description: None
            }
        );
        assert_eq!(
            AuthDelivery::from_query(&params(Some("abc"), None)),
            AuthDelivery::AuthorizationCode("abc".to_string())
        );
        assert_eq!(
            AuthDelivery::from_query(&params(Some(""), Some(""))),
            AuthDelivery::Absent
        );
        assert_eq!(AuthDelivery::from_query(&params(None, None)), AuthDelivery::Absent);
    }

    #[test]
    fn test_from_fragment() {
        match AuthDelivery::from_fragment("#access_token=A&refresh_token=B&expires_at=123") {
            AuthDelivery::ImplicitTokens { tokens, expires_at } => {
                assert_eq!(tokens.access_token, "A");
                assert_eq!(tokens.refresh_token, "B");
                assert_eq!(expires_at, Some(123));
            }
            other => panic!("unexpected delivery: {other:?}"),
        }

        // Percent-encoded values and a missing '#' are fine
        match AuthDelivery::from_fragment("access_token=a%2Bb&refresh_token=c&expires_at=soon") {
            AuthDelivery::ImplicitTokens { tokens, expires_at } => {
                assert_eq!(tokens.access_token, "a+b");
                assert_eq!(expires_at, None);
            }
            other => panic!("unexpected delivery: {other:?}"),
        }

        assert_eq!(
            AuthDelivery::from_fragment("#access_token=A&expires_at=123"),
            AuthDelivery::Absent
        );
        assert_eq!(
            AuthDelivery::from_fragment("#access_token=A&refresh_token="),
            AuthDelivery::Absent
        );
        assert_eq!(AuthDelivery::from_fragment(""), AuthDelivery::Absent);
    }

    #[test]
    fn test_error_codes_roundtrip_through_parse() {
        for code in [
            "no_code",
            "exchange_failed",
            "user_fetch_failed",
            "no_user",
            "unexpected_error",
            "missing_tokens",
            "session_setup_failed",
            "client_processing_failed",
            "service_unavailable",
            "signin_failed",
        ] {
            let parsed = AuthErrorCode::parse(code);
            assert!(!matches!(parsed, AuthErrorCode::Provider(_)), "{code}");
            assert_eq!(parsed.as_str(), code);
            assert_ne!(parsed.message(), GENERIC_MESSAGE);
        }

        assert_eq!(AuthErrorCode::message_for(Some("access_denied")), GENERIC_MESSAGE);
        assert_eq!(AuthErrorCode::message_for(None), GENERIC_MESSAGE);
    }

    #[test]
    fn test_outcome_urls() {
        let origin = "http://localhost:3000";
        assert_eq!(RedirectOutcome::Setup.url(origin), "http://localhost:3000/setup");
        assert_eq!(RedirectOutcome::Dashboard.url(origin), "http://localhost:3000/");
        assert_eq!(
            RedirectOutcome::ClientCallback.url(origin),
            "http://localhost:3000/auth/callback-client"
        );
        assert_eq!(
            RedirectOutcome::Error(AuthErrorCode::Provider("bad code&x=1".to_string())).url(origin),
            "http://localhost:3000/auth/auth-code-error?error=bad%20code%26x%3D1"
        );
    }
}
