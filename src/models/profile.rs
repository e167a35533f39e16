// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Balance profile stored in the `profiles` table.

use super::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use uuid::Uuid;

/// One row per user who has completed setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Profile {
    /// Same as the auth user ID
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub starting_balance: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_balance: f64,
    /// Set once the starting balance form has been submitted
    #[serde(default, deserialize_with = "null_as_default")]
    pub starting_balance_set: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Build the row written by the setup form.
    ///
    /// Both balances start at the submitted amount.
    pub fn from_setup(user: &User, starting_balance: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.user_metadata.full_name.clone(),
            avatar_url: user.user_metadata.avatar_url.clone(),
            starting_balance,
            current_balance: starting_balance,
            starting_balance_set: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_setup_complete(&self) -> bool {
        self.starting_balance_set
    }
}

/// Format an amount with two decimals, e.g. `1234.5` -> `"1234.50"`.
pub fn format_amount(amount: f64) -> String {
    format!("{:.2}", amount)
}

/// Parse a user-entered amount. Rejects anything that is not a finite number.
pub fn parse_amount(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// PostgREST sends `null` for unset columns; treat it like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
