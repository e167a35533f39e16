// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Page-lifetime auth state.
//!
//! A `SessionContext` owns the `{loading, session, user}` state for one page
//! render. Starting it subscribes to session changes and fetches the current
//! session; dropping it cancels both and releases the subscription.

use crate::models::{AuthChangeEvent, Session, SessionEvent, User};
use crate::services::gotrue::AuthError;
use crate::services::session_store::{CookieSessionStore, OAuthSignIn};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Auth state as seen by pages.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub loading: bool,
    pub session: Option<Session>,
    pub user: Option<User>,
}

impl AuthState {
    fn loading() -> Self {
        Self {
            loading: true,
            session: None,
            user: None,
        }
    }

    fn signed_out() -> Self {
        Self {
            loading: false,
            session: None,
            user: None,
        }
    }

    fn settled(session: Option<Session>) -> Self {
        let user = session.as_ref().and_then(|s| s.user.clone());
        Self {
            loading: false,
            session,
            user,
        }
    }

    /// The signed-in user once loading has finished.
    pub fn user(&self) -> Option<&User> {
        if self.loading {
            return None;
        }
        self.user.as_ref()
    }
}

/// Explicitly owned auth state with a scoped session-change subscription.
pub struct SessionContext {
    store: Arc<CookieSessionStore>,
    state: watch::Receiver<AuthState>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionContext {
    /// Subscribe to session changes, then fetch the current session.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(store: Arc<CookieSessionStore>) -> Self {
        let (tx, rx) = watch::channel(AuthState::loading());
        let tx = Arc::new(tx);

        // Subscribe before the first fetch so no change is missed
        let mut events = store.on_session_change();
        let listener = {
            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => apply_event(&tx, event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Session listener lagged behind");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        };

        let initial = {
            let store = store.clone();
            tokio::spawn(async move {
                let state = match AssertUnwindSafe(initial_state(&store))
                    .catch_unwind()
                    .await
                {
                    Ok(state) => state,
                    Err(_) => {
                        tracing::error!("Session initialization panicked");
                        AuthState::signed_out()
                    }
                };
                tx.send_replace(state);
            })
        };

        Self {
            store,
            state: rx,
            tasks: vec![listener, initial],
        }
    }

    /// Current state; may still be loading.
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Wait until loading has finished and return the settled state.
    pub async fn ready(&self) -> AuthState {
        let mut rx = self.state.clone();
        let settled = match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            Err(_) => AuthState::signed_out(),
        };
        settled
    }

    /// Receiver for every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.clone()
    }

    pub fn store(&self) -> &Arc<CookieSessionStore> {
        &self.store
    }

    /// Sign out any existing session, then return the Google authorize URL.
    ///
    /// Local state is left to the `SIGNED_OUT` event; the caller navigates
    /// away to the returned URL.
    pub async fn sign_in_with_google(&self, origin: &str) -> Result<String, AuthError> {
        // Let the initial fetch settle so a late refresh cannot resurrect
        // the session we are about to clear
        self.ready().await;
        self.store.sign_out().await;

        self.store.sign_in_with_oauth(&OAuthSignIn {
            provider: "google".to_string(),
            redirect_to: format!("{}/auth/callback", origin),
            query_params: vec![
                ("access_type".to_string(), "offline".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ],
        })
    }

    /// Sign out; the state follows through the `SIGNED_OUT` event.
    pub async fn sign_out(&self) {
        self.ready().await;
        self.store.sign_out().await;
    }

    /// Tear down explicitly. Same as dropping.
    pub fn shutdown(self) {}
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn initial_state(store: &CookieSessionStore) -> AuthState {
    match store.get_session().await {
        Ok(session) => AuthState::settled(session),
        Err(err) if err.is_invalid_refresh_token() => {
            tracing::warn!(error = %err, "Stale refresh token, clearing session");
            store.sign_out().await;
            AuthState::signed_out()
        }
        Err(err) => {
            tracing::error!(error = %err, "Session initialization failed");
            AuthState::signed_out()
        }
    }
}

fn apply_event(state: &watch::Sender<AuthState>, event: SessionEvent) {
    tracing::debug!(
        event = ?event.event,
        user_id = ?event.session.as_ref().and_then(|s| s.user.as_ref()).map(|u| u.id),
        "Auth state change"
    );

    state.send_modify(|current| {
        *current = match event.event {
            AuthChangeEvent::SignedOut => AuthState::signed_out(),
            AuthChangeEvent::SignedIn | AuthChangeEvent::TokenRefreshed => {
                AuthState::settled(event.session)
            }
            AuthChangeEvent::UserUpdated => AuthState {
                loading: false,
                session: current.session.clone(),
                user: event.session.and_then(|s| s.user),
            },
        };
    });
}
