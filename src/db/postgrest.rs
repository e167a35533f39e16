// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supabase PostgREST client for the `profiles` table.
//!
//! Requests are made with the service role key; callers are responsible for
//! only passing the ID of the signed-in user.

use super::{tables, ProfileError, ProfileStore};
use crate::config::Config;
use crate::models::Profile;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::ACCEPT, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
/// Ask PostgREST for a single JSON object instead of an array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
/// PostgREST error code for "JSON object requested, multiple (or no) rows returned".
const NO_ROWS_CODE: &str = "PGRST116";

/// PostgREST profile store.
#[derive(Clone)]
pub struct PostgrestProfileStore {
    http: reqwest::Client,
    rest_url: String,
    anon_key: String,
    service_role_key: String,
}

/// PostgREST error body.
#[derive(Debug, Default, Deserialize)]
struct PostgrestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl PostgrestProfileStore {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed building PostgREST HTTP client")?;

        Ok(Self {
            http,
            rest_url: format!("{}/rest/v1", config.supabase_url),
            anon_key: config.supabase_anon_key.clone(),
            service_role_key: config.supabase_service_role_key.clone(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/{}", self.rest_url, tables::PROFILES)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.service_role_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ProfileError> {
        let response = request.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body: PostgrestErrorBody = response.json().await.unwrap_or_default();

        if status == StatusCode::NOT_ACCEPTABLE && body.code.as_deref() == Some(NO_ROWS_CODE) {
            return Err(ProfileError::NotFound);
        }

        Err(ProfileError::Api {
            status: status.as_u16(),
            code: body.code,
            message: body
                .message
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string()),
        })
    }
}

#[async_trait]
impl ProfileStore for PostgrestProfileStore {
    async fn get(&self, id: Uuid) -> Result<Profile, ProfileError> {
        let response = self
            .send(
                self.request(Method::GET, &self.table_url())
                    .header(ACCEPT, SINGLE_OBJECT)
                    .query(&[("id", format!("eq.{}", id)), ("select", "*".to_string())]),
            )
            .await?;

        response.json().await.map_err(decode_error)
    }

    async fn upsert(&self, profile: &Profile) -> Result<Profile, ProfileError> {
        let response = self
            .send(
                self.request(Method::POST, &self.table_url())
                    .header(ACCEPT, SINGLE_OBJECT)
                    .header("Prefer", "resolution=merge-duplicates,return=representation")
                    .json(profile),
            )
            .await?;

        tracing::info!(user_id = %profile.id, "Profile upserted");
        response.json().await.map_err(decode_error)
    }

    async fn update_current_balance(
        &self,
        id: Uuid,
        current_balance: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<Profile, ProfileError> {
        let body = serde_json::json!({
            "current_balance": current_balance,
            "updated_at": updated_at,
        });

        let response = self
            .send(
                self.request(Method::PATCH, &self.table_url())
                    .header("Prefer", "return=representation")
                    .query(&[("id", format!("eq.{}", id))])
                    .json(&body),
            )
            .await?;

        // PATCH returns the updated rows; none means the profile does not exist
        let rows: Vec<Profile> = response.json().await.map_err(decode_error)?;
        rows.into_iter().next().ok_or(ProfileError::NotFound)
    }
}

fn transport_error(e: reqwest::Error) -> ProfileError {
    if e.is_timeout() || e.is_connect() {
        ProfileError::Unavailable(e.to_string())
    } else {
        ProfileError::Api {
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            code: None,
            message: e.to_string(),
        }
    }
}

fn decode_error(e: reqwest::Error) -> ProfileError {
    ProfileError::Api {
        status: 200,
        code: None,
        message: format!("JSON parse error: {}", e),
    }
}
