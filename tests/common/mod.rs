// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::{header, Response};
use balance_tracker::config::Config;
use balance_tracker::db::{MemoryProfileStore, ProfileError, ProfileStore};
use balance_tracker::models::{Profile, Session, User, UserMetadata};
use balance_tracker::routes::create_router;
use balance_tracker::services::session_store::encode_session;
use balance_tracker::services::{AuthApi, AuthError, AuthorizeRequest};
use balance_tracker::AppState;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Session cookie name for `Config::test_default()`.
pub const SESSION_COOKIE: &str = "sb-testproject-auth-token";
pub const VERIFIER_COOKIE: &str = "sb-testproject-auth-token-code-verifier";

pub fn test_user() -> User {
    User {
        id: Uuid::parse_str("6f1c2a4e-8f55-4c3e-9d59-2f4b8e0d1a77").unwrap(),
        email: Some("ada@example.com".to_string()),
        user_metadata: UserMetadata {
            full_name: Some("Ada Lovelace".to_string()),
            avatar_url: None,
        },
    }
}

/// A session that stays valid for an hour.
pub fn test_session(user: &User) -> Session {
    Session {
        access_token: "access-token".to_string(),
        refresh_token: "refresh-token".to_string(),
        expires_at: Some(Utc::now().timestamp() + 3600),
        expires_in: Some(3600),
        token_type: "bearer".to_string(),
        user: Some(user.clone()),
    }
}

/// A session whose access token has already expired.
pub fn expired_session(user: &User) -> Session {
    Session {
        expires_at: Some(Utc::now().timestamp() - 60),
        ..test_session(user)
    }
}

pub fn test_profile(user: &User, current_balance: f64, setup_done: bool) -> Profile {
    let created: DateTime<Utc> = "2026-03-05T10:00:00Z".parse().unwrap();
    Profile {
        id: user.id,
        email: user.email.clone(),
        full_name: user.user_metadata.full_name.clone(),
        avatar_url: None,
        starting_balance: 1000.0,
        current_balance,
        starting_balance_set: setup_done,
        created_at: created,
        updated_at: created,
    }
}

pub fn api_error(status: u16, code: Option<&str>, message: &str) -> AuthError {
    AuthError::Api {
        status,
        code: code.map(str::to_string),
        message: message.to_string(),
    }
}

// ─── Fake Auth Service ───────────────────────────────────────

/// Scriptable auth service that records every call.
pub struct FakeAuthApi {
    exchange: Mutex<Result<Session, AuthError>>,
    refresh: Mutex<Result<Session, AuthError>>,
    user: Mutex<Result<User, AuthError>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    /// Arguments of each `exchange_code` call: (code, verifier)
    pub exchanges: Mutex<Vec<(String, String)>>,
}

impl FakeAuthApi {
    /// Accepts everything and signs in `user`.
    pub fn new(user: User) -> Self {
        let session = test_session(&user);
        Self {
            exchange: Mutex::new(Ok(session.clone())),
            refresh: Mutex::new(Ok(Session {
                access_token: "refreshed-access-token".to_string(),
                refresh_token: "refreshed-refresh-token".to_string(),
                ..session
            })),
            user: Mutex::new(Ok(user)),
            calls: Mutex::new(HashMap::new()),
            exchanges: Mutex::new(Vec::new()),
        }
    }

    pub fn with_exchange(self, result: Result<Session, AuthError>) -> Self {
        *self.exchange.lock().unwrap() = result;
        self
    }

    pub fn with_refresh(self, result: Result<Session, AuthError>) -> Self {
        *self.refresh.lock().unwrap() = result;
        self
    }

    pub fn with_user(self, result: Result<User, AuthError>) -> Self {
        *self.user.lock().unwrap() = result;
        self
    }

    pub fn set_user(&self, result: Result<User, AuthError>) {
        *self.user.lock().unwrap() = result;
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    fn record(&self, name: &'static str) {
        *self.calls.lock().unwrap().entry(name).or_default() += 1;
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> Result<Session, AuthError> {
        self.record("exchange_code");
        self.exchanges
            .lock()
            .unwrap()
            .push((auth_code.to_string(), code_verifier.to_string()));
        self.exchange.lock().unwrap().clone()
    }

    async fn refresh_session(&self, _refresh_token: &str) -> Result<Session, AuthError> {
        self.record("refresh_session");
        self.refresh.lock().unwrap().clone()
    }

    async fn get_user(&self, _access_token: &str) -> Result<User, AuthError> {
        self.record("get_user");
        self.user.lock().unwrap().clone()
    }

    async fn logout(&self, _access_token: &str) -> Result<(), AuthError> {
        self.record("logout");
        Ok(())
    }

    fn authorize_url(&self, request: &AuthorizeRequest) -> Result<String, AuthError> {
        self.record("authorize_url");
        let mut params = vec![
            ("provider".to_string(), request.provider.clone()),
            ("redirect_to".to_string(), request.redirect_to.clone()),
            ("code_challenge".to_string(), request.code_challenge.clone()),
            ("code_challenge_method".to_string(), "s256".to_string()),
        ];
        params.extend(request.query_params.iter().cloned());

        url::Url::parse_with_params("https://testproject.supabase.co/auth/v1/authorize", &params)
            .map(|u| u.to_string())
            .map_err(|e| AuthError::Storage(e.to_string()))
    }
}

/// Auth service that panics when asked to refresh; everything else
/// delegates to an accepting `FakeAuthApi`.
pub struct PanickingRefreshAuthApi(pub FakeAuthApi);

#[async_trait]
impl AuthApi for PanickingRefreshAuthApi {
    async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> Result<Session, AuthError> {
        self.0.exchange_code(auth_code, code_verifier).await
    }

    async fn refresh_session(&self, _refresh_token: &str) -> Result<Session, AuthError> {
        panic!("refresh exploded");
    }

    async fn get_user(&self, access_token: &str) -> Result<User, AuthError> {
        self.0.get_user(access_token).await
    }

    async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        self.0.logout(access_token).await
    }

    fn authorize_url(&self, request: &AuthorizeRequest) -> Result<String, AuthError> {
        self.0.authorize_url(request)
    }
}

// ─── Fake Profile Stores ─────────────────────────────────────

/// Profile store whose every call fails.
pub struct FailingProfileStore(pub ProfileError);

#[async_trait]
impl ProfileStore for FailingProfileStore {
    async fn get(&self, _id: Uuid) -> Result<Profile, ProfileError> {
        Err(self.0.clone())
    }

    async fn upsert(&self, _profile: &Profile) -> Result<Profile, ProfileError> {
        Err(self.0.clone())
    }

    async fn update_current_balance(
        &self,
        _id: Uuid,
        _current_balance: f64,
        _updated_at: DateTime<Utc>,
    ) -> Result<Profile, ProfileError> {
        Err(self.0.clone())
    }
}

/// Profile store that panics on lookup.
pub struct PanickingProfileStore;

#[async_trait]
impl ProfileStore for PanickingProfileStore {
    async fn get(&self, _id: Uuid) -> Result<Profile, ProfileError> {
        panic!("profile store exploded");
    }

    async fn upsert(&self, _profile: &Profile) -> Result<Profile, ProfileError> {
        panic!("profile store exploded");
    }

    async fn update_current_balance(
        &self,
        _id: Uuid,
        _current_balance: f64,
        _updated_at: DateTime<Utc>,
    ) -> Result<Profile, ProfileError> {
        panic!("profile store exploded");
    }
}

// ─── App and Request Helpers ─────────────────────────────────

/// Create a test app over the given fakes.
/// Returns the router and the shared state.
pub fn create_test_app(
    auth_api: Arc<dyn AuthApi>,
    profiles: Arc<dyn ProfileStore>,
) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState {
        config: Config::test_default(),
        auth_api,
        profiles,
    });

    (create_router(state.clone()), state)
}

/// Test app with an accepting auth service and an in-memory profile store.
pub fn create_default_app() -> (axum::Router, Arc<FakeAuthApi>, MemoryProfileStore) {
    let auth = Arc::new(FakeAuthApi::new(test_user()));
    let profiles = MemoryProfileStore::new();
    let (app, _) = create_test_app(auth.clone(), Arc::new(profiles.clone()));
    (app, auth, profiles)
}

/// `Cookie` header value carrying a stored session.
pub fn session_cookie(session: &Session) -> String {
    format!("{}={}", SESSION_COOKIE, encode_session(session).unwrap())
}

/// `Location` header of a redirect response.
pub fn location<B>(response: &Response<B>) -> String {
    assert!(
        response.status().is_redirection(),
        "expected a redirect, got {}",
        response.status()
    );
    let values: Vec<_> = response.headers().get_all(header::LOCATION).iter().collect();
    assert_eq!(values.len(), 1, "expected exactly one Location header");
    values[0].to_str().unwrap().to_string()
}

/// All `Set-Cookie` header values.
pub fn set_cookies<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Whether the response sets `name` to a non-empty value.
pub fn sets_cookie<B>(response: &Response<B>, name: &str) -> bool {
    set_cookies(response).iter().any(|c| {
        c.starts_with(&format!("{}=", name)) && !c.starts_with(&format!("{}=;", name))
    })
}

/// Whether the response removes cookie `name`.
pub fn removes_cookie<B>(response: &Response<B>, name: &str) -> bool {
    set_cookies(response)
        .iter()
        .any(|c| c.starts_with(&format!("{}=;", name)) && c.contains("Max-Age=0"))
}

pub async fn body_string(response: Response<axum::body::Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
