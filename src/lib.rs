// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Balance Tracker: personal balance tracking behind Google sign-in
//!
//! This crate serves the web application: the OAuth callback handlers that
//! bootstrap a Supabase session, the setup/dashboard/profile pages, and a
//! small authenticated JSON API.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use axum_extra::extract::cookie::CookieJar;
use config::Config;
use db::ProfileStore;
use services::{AuthApi, CookieSessionStore};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub auth_api: Arc<dyn AuthApi>,
    pub profiles: Arc<dyn ProfileStore>,
}

impl AppState {
    /// Session store over this request's cookies.
    pub fn session_store(&self, jar: CookieJar) -> CookieSessionStore {
        CookieSessionStore::new(self.auth_api.clone(), jar, &self.config)
    }
}
