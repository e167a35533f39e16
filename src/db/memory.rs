// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory profile store, for tests and running without a database.

use super::{ProfileError, ProfileStore};
use crate::models::Profile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Profile store backed by a shared concurrent map.
#[derive(Clone, Default)]
pub struct MemoryProfileStore {
    profiles: Arc<DashMap<Uuid, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a profile directly.
    pub fn insert(&self, profile: Profile) {
        self.profiles.insert(profile.id, profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, id: Uuid) -> Result<Profile, ProfileError> {
        self.profiles
            .get(&id)
            .map(|p| p.clone())
            .ok_or(ProfileError::NotFound)
    }

    async fn upsert(&self, profile: &Profile) -> Result<Profile, ProfileError> {
        self.profiles.insert(profile.id, profile.clone());
        Ok(profile.clone())
    }

    async fn update_current_balance(
        &self,
        id: Uuid,
        current_balance: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<Profile, ProfileError> {
        let mut entry = self.profiles.get_mut(&id).ok_or(ProfileError::NotFound)?;
        entry.current_balance = current_balance;
        entry.updated_at = updated_at;
        Ok(entry.clone())
    }
}
