// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authenticated user model as returned by Supabase Auth.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a signed-in user.
///
/// Sourced from the identity provider through the auth service; the
/// application never edits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Stable user identifier (also the profile primary key)
    pub id: Uuid,
    /// Email address (may be None if not shared)
    #[serde(default)]
    pub email: Option<String>,
    /// Provider-supplied profile fields
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// Provider-supplied metadata. Google fills `full_name` and `avatar_url`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl User {
    /// First word of the full name, if any.
    pub fn first_name(&self) -> Option<&str> {
        self.user_metadata
            .full_name
            .as_deref()
            .and_then(|name| name.split_whitespace().next())
    }
}
