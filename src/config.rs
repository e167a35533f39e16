// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Supabase keys are read once at startup and kept in memory.

use std::env;

/// Default public origin for local development.
const DEFAULT_SITE_URL: &str = "http://localhost:3000";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Supabase project URL, e.g. `https://abcdefgh.supabase.co`
    pub supabase_url: String,
    /// Supabase anon (public) key, sent as `apikey` on every request
    pub supabase_anon_key: String,
    /// Public origin of this deployment, used for every redirect target
    pub site_url: String,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// Service role key used for profile reads and writes
    pub supabase_service_role_key: String,
    /// JWT secret used to verify access tokens on `/api/*` (raw bytes)
    pub supabase_jwt_secret: Vec<u8>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let supabase_url = env::var("SUPABASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?;

        if url::Url::parse(&supabase_url).is_err() {
            return Err(ConfigError::Invalid("SUPABASE_URL", supabase_url));
        }

        let site_url = env::var("SITE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_SITE_URL.to_string());

        if url::Url::parse(&site_url).is_err() {
            return Err(ConfigError::Invalid("SITE_URL", site_url));
        }

        Ok(Self {
            supabase_url,
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_ANON_KEY"))?,
            site_url,
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),

            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))?,
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .map_err(|_| ConfigError::Missing("SUPABASE_JWT_SECRET"))?
                .into_bytes(),
        })
    }

    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            supabase_url: "https://testproject.supabase.co".to_string(),
            supabase_anon_key: "test_anon_key".to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            port: 3000,
            supabase_service_role_key: "test_service_role_key".to_string(),
            supabase_jwt_secret: b"test_jwt_secret_32_bytes_minimum!".to_vec(),
        }
    }

    /// Supabase project reference: the first label of the project host.
    ///
    /// Used to namespace auth cookies (`sb-<ref>-auth-token`).
    pub fn project_ref(&self) -> String {
        url::Url::parse(&self.supabase_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .and_then(|host| host.split('.').next().map(|s| s.to_string()))
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| "local".to_string())
    }

    /// Cookies carry `Secure` only when the site is served over https.
    pub fn secure_cookies(&self) -> bool {
        self.site_url.starts_with("https://")
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid URL in {0}: {1}")]
    Invalid(&'static str, String),
}
