// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session model and auth change events.

use super::User;
use serde::{Deserialize, Serialize};

/// Token bundle issued by the auth service after a successful sign-in.
///
/// The application only ever holds a cached copy (in cookies).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry (Unix timestamp)
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub user: Option<User>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Whether the access token expires within `margin_secs` of `now`.
    ///
    /// A session without a known expiry is treated as still valid.
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at
            .map(|expires_at| expires_at <= now + margin_secs)
            .unwrap_or(false)
    }

    /// Fill in `expires_at` from `expires_in` when the service omitted it.
    pub fn with_computed_expiry(mut self, now: i64) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = self.expires_in.map(|secs| now + secs);
        }
        self
    }
}

/// Explicit token pair, as delivered by the implicit flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Kind of session change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChangeEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// Notification published by the session store on every change.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub event: AuthChangeEvent,
    /// The session current after the change (None after sign-out)
    pub session: Option<Session>,
}
