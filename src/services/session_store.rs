// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cookie-backed session store.
//!
//! One `CookieSessionStore` is built per request from the request's cookie
//! jar. It calls the auth service and persists the resulting session in
//! cookies, the same layout Supabase's SSR helpers use:
//! - `sb-<ref>-auth-token`: `base64-` + base64url(session JSON), split into
//!   `.0`, `.1`, ... chunks when it would not fit in one cookie
//! - `sb-<ref>-auth-token-code-verifier`: PKCE verifier between the
//!   authorize redirect and the callback
//!
//! Every change is published on a broadcast channel (see
//! [`CookieSessionStore::on_session_change`]).

use crate::config::Config;
use crate::models::{AuthChangeEvent, Session, SessionEvent, TokenPair, User};
use crate::services::gotrue::{AuthApi, AuthError, AuthorizeRequest};
use crate::services::pkce;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Maximum cookie value length before splitting into chunks.
pub const CHUNK_SIZE: usize = 3180;
const BASE64_PREFIX: &str = "base64-";
const SESSION_MAX_AGE_DAYS: i64 = 400;
const VERIFIER_MAX_AGE_MINUTES: i64 = 10;
/// Refresh sessions that expire within this many seconds.
const EXPIRY_MARGIN_SECS: i64 = 10;
const EVENT_CAPACITY: usize = 16;

/// OAuth sign-in options.
#[derive(Debug, Clone)]
pub struct OAuthSignIn {
    pub provider: String,
    /// Where the auth service sends the browser after the provider
    pub redirect_to: String,
    pub query_params: Vec<(String, String)>,
}

/// Per-request session store.
pub struct CookieSessionStore {
    api: Arc<dyn AuthApi>,
    jar: Mutex<CookieJar>,
    cookie_name: String,
    secure: bool,
    events: broadcast::Sender<SessionEvent>,
}

impl CookieSessionStore {
    pub fn new(api: Arc<dyn AuthApi>, jar: CookieJar, config: &Config) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            jar: Mutex::new(jar),
            cookie_name: format!("sb-{}-auth-token", config.project_ref()),
            secure: config.secure_cookies(),
            events,
        }
    }

    /// Name of the session cookie (or prefix of its chunks).
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn verifier_cookie_name(&self) -> String {
        format!("{}-code-verifier", self.cookie_name)
    }

    /// Cookie jar with every change made so far, to attach to the response.
    pub fn cookie_jar(&self) -> CookieJar {
        self.lock_jar().clone()
    }

    /// Session as stored in cookies, without refreshing it.
    pub fn stored_session(&self) -> Option<Session> {
        self.load_session()
    }

    /// Subscribe to session changes. Dropping the receiver unsubscribes.
    pub fn on_session_change(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // ─── Session Operations ──────────────────────────────────────

    /// Exchange a PKCE authorization code for a session and persist it.
    pub async fn exchange_code(&self, code: &str) -> Result<Session, AuthError> {
        let verifier_name = self.verifier_cookie_name();
        let verifier = self
            .lock_jar()
            .get(&verifier_name)
            .map(|c| c.value().to_string())
            .ok_or(AuthError::MissingVerifier)?;

        let session = self.api.exchange_code(code, &verifier).await?;

        self.save_session(&session)?;
        self.remove_cookie(verifier_name);
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));

        Ok(session)
    }

    /// Adopt an explicit token pair (implicit flow) and persist the session.
    ///
    /// An expired access token is refreshed first; otherwise the user is
    /// looked up with it, which also proves the token is accepted.
    pub async fn set_session(&self, tokens: &TokenPair) -> Result<Session, AuthError> {
        if tokens.access_token.is_empty() || tokens.refresh_token.is_empty() {
            return Err(AuthError::MissingSession);
        }

        let now = Utc::now().timestamp();
        let expires_at = access_token_expiry(&tokens.access_token);

        let session = match expires_at {
            Some(exp) if exp <= now + EXPIRY_MARGIN_SECS => {
                tracing::info!("Supplied access token expired, refreshing");
                self.api.refresh_session(&tokens.refresh_token).await?
            }
            _ => {
                let user = self.api.get_user(&tokens.access_token).await?;
                Session {
                    access_token: tokens.access_token.clone(),
                    refresh_token: tokens.refresh_token.clone(),
                    expires_at,
                    expires_in: expires_at.map(|exp| exp - now),
                    token_type: "bearer".to_string(),
                    user: Some(user),
                }
            }
        };

        self.save_session(&session)?;
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));

        Ok(session)
    }

    /// Current session, refreshed first if it is about to expire.
    pub async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.load_session() else {
            return Ok(None);
        };

        let now = Utc::now().timestamp();
        if !session.expires_within(now, EXPIRY_MARGIN_SECS) {
            return Ok(Some(session));
        }

        tracing::debug!("Stored session expired, refreshing");
        let mut refreshed = self
            .api
            .refresh_session(&session.refresh_token)
            .await?
            .with_computed_expiry(now);
        if refreshed.user.is_none() {
            refreshed.user = session.user;
        }

        self.save_session(&refreshed)?;
        self.emit(AuthChangeEvent::TokenRefreshed, Some(refreshed.clone()));

        Ok(Some(refreshed))
    }

    /// Fetch the signed-in user from the auth service.
    ///
    /// Returns `Ok(None)` without a session. If the user differs from the
    /// cached copy, the session is updated and `USER_UPDATED` published.
    pub async fn get_user(&self) -> Result<Option<User>, AuthError> {
        let Some(mut session) = self.get_session().await? else {
            return Ok(None);
        };

        let user = self.api.get_user(&session.access_token).await?;

        if session.user.as_ref() != Some(&user) {
            session.user = Some(user.clone());
            self.save_session(&session)?;
            self.emit(AuthChangeEvent::UserUpdated, Some(session));
        }

        Ok(Some(user))
    }

    /// Revoke the session remotely (best effort) and clear it locally.
    pub async fn sign_out(&self) {
        if let Some(session) = self.load_session() {
            if let Err(e) = self.api.logout(&session.access_token).await {
                tracing::warn!(error = %e, "Remote sign-out failed, clearing local session anyway");
            }
        }

        self.remove_session_cookies();
        self.remove_cookie(self.verifier_cookie_name());
        self.emit(AuthChangeEvent::SignedOut, None);
    }

    /// Start an OAuth sign-in: store a fresh PKCE verifier and return the
    /// authorize URL to redirect the browser to.
    pub fn sign_in_with_oauth(&self, options: &OAuthSignIn) -> Result<String, AuthError> {
        let verifier = pkce::generate_verifier()
            .map_err(|_| AuthError::Storage("Failed to generate PKCE verifier".to_string()))?;

        let url = self.api.authorize_url(&AuthorizeRequest {
            provider: options.provider.clone(),
            redirect_to: options.redirect_to.clone(),
            code_challenge: pkce::challenge(&verifier),
            query_params: options.query_params.clone(),
        })?;

        let cookie = Cookie::build((self.verifier_cookie_name(), verifier))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(time::Duration::minutes(VERIFIER_MAX_AGE_MINUTES))
            .build();
        self.update_jar(|jar| jar.add(cookie));

        Ok(url)
    }

    // ─── Cookie Persistence ──────────────────────────────────────

    fn lock_jar(&self) -> std::sync::MutexGuard<'_, CookieJar> {
        // A panic while holding the lock cannot leave the jar half-written
        self.jar.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update_jar(&self, f: impl FnOnce(CookieJar) -> CookieJar) {
        let mut jar = self.lock_jar();
        let current = std::mem::take(&mut *jar);
        *jar = f(current);
    }

    fn remove_cookie(&self, name: String) {
        self.update_jar(|jar| jar.remove(Cookie::build((name, "")).path("/")));
    }

    /// Names of the session chunks present in the jar, in order.
    fn existing_chunk_names(&self) -> Vec<String> {
        let jar = self.lock_jar();
        let names = (0..)
            .map(|i| format!("{}.{}", self.cookie_name, i))
            .take_while(|name| jar.get(name).is_some())
            .collect();
        names
    }

    /// Stored session, or None if absent. Undecodable cookies are removed.
    fn load_session(&self) -> Option<Session> {
        let raw = {
            let jar = self.lock_jar();
            let whole = jar.get(&self.cookie_name).map(|c| c.value().to_string());
            let chunks: Vec<String> = (0..)
                .map(|i| format!("{}.{}", self.cookie_name, i))
                .map_while(|name| jar.get(&name).map(|c| c.value().to_string()))
                .collect();
            whole.or_else(|| (!chunks.is_empty()).then(|| chunks.concat()))
        }?;

        match decode_session(&raw) {
            Some(session) => Some(session),
            None => {
                tracing::warn!("Discarding undecodable session cookie");
                self.remove_session_cookies();
                None
            }
        }
    }

    fn save_session(&self, session: &Session) -> Result<(), AuthError> {
        let value = encode_session(session)?;
        let chunks = chunk_value(&value);
        let stale_chunks = self.existing_chunk_names();

        self.update_jar(|mut jar| {
            if chunks.len() == 1 {
                for name in stale_chunks {
                    jar = jar.remove(Cookie::build((name, "")).path("/"));
                }
                jar.add(self.session_cookie(self.cookie_name.clone(), value))
            } else {
                jar = jar.remove(Cookie::build((self.cookie_name.clone(), "")).path("/"));
                for name in stale_chunks.iter().skip(chunks.len()) {
                    jar = jar.remove(Cookie::build((name.clone(), "")).path("/"));
                }
                for (i, chunk) in chunks.into_iter().enumerate() {
                    jar = jar.add(self.session_cookie(format!("{}.{}", self.cookie_name, i), chunk));
                }
                jar
            }
        });

        Ok(())
    }

    fn remove_session_cookies(&self) {
        let chunk_names = self.existing_chunk_names();
        self.remove_cookie(self.cookie_name.clone());
        for name in chunk_names {
            self.remove_cookie(name);
        }
    }

    fn session_cookie(&self, name: String, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(time::Duration::days(SESSION_MAX_AGE_DAYS))
            .build()
    }

    fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        tracing::debug!(event = ?event, "Session change");
        // No subscribers is fine
        let _ = self.events.send(SessionEvent { event, session });
    }
}

/// Serialize a session into a cookie value.
pub fn encode_session(session: &Session) -> Result<String, AuthError> {
    let json = serde_json::to_vec(session)
        .map_err(|e| AuthError::Storage(format!("Failed to serialize session: {}", e)))?;
    Ok(format!("{}{}", BASE64_PREFIX, URL_SAFE_NO_PAD.encode(json)))
}

/// Parse a cookie value written by [`encode_session`].
///
/// Values without the `base64-` prefix are read as plain JSON.
pub fn decode_session(raw: &str) -> Option<Session> {
    match raw.strip_prefix(BASE64_PREFIX) {
        Some(encoded) => {
            let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
            serde_json::from_slice(&bytes).ok()
        }
        None => serde_json::from_str(raw).ok(),
    }
}

/// Split a cookie value into `CHUNK_SIZE` pieces (a single piece if it fits).
pub fn chunk_value(value: &str) -> Vec<String> {
    if value.len() <= CHUNK_SIZE {
        return vec![value.to_string()];
    }
    value
        .as_bytes()
        .chunks(CHUNK_SIZE)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// `exp` claim of an access token, read without verifying the signature.
///
/// Used only to decide whether to refresh; the auth service still validates
/// the token on every call.
fn access_token_expiry(token: &str) -> Option<i64> {
    let header = decode_header(token).ok()?;
    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims.exp)
}
