// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile record store (Supabase PostgREST, or in memory).

pub mod memory;
pub mod postgrest;

pub use memory::MemoryProfileStore;
pub use postgrest::PostgrestProfileStore;

use crate::error::AppError;
use crate::models::Profile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Table names as constants.
pub mod tables {
    pub const PROFILES: &str = "profiles";
}

/// Record store keyed by user ID.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch a profile. A missing row is `ProfileError::NotFound`.
    async fn get(&self, id: Uuid) -> Result<Profile, ProfileError>;

    /// Insert the profile, or overwrite every column of an existing row.
    async fn upsert(&self, profile: &Profile) -> Result<Profile, ProfileError>;

    /// Set `current_balance` and `updated_at` on an existing row.
    async fn update_current_balance(
        &self,
        id: Uuid,
        current_balance: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<Profile, ProfileError>;
}

/// Profile store errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProfileError {
    /// No row for this user. Expected before setup, not a fault.
    #[error("Profile not found")]
    NotFound,

    #[error("Profile store error (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Timed out or could not connect.
    #[error("Profile store unavailable: {0}")]
    Unavailable(String),
}

impl From<ProfileError> for AppError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::NotFound => AppError::NotFound("Profile".to_string()),
            other => AppError::Database(other.to_string()),
        }
    }
}
