// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session context lifecycle tests.

use axum::http::{header, HeaderMap, HeaderValue};
use axum_extra::extract::cookie::CookieJar;
use balance_tracker::config::Config;
use balance_tracker::models::{Session, User};
use balance_tracker::services::{pkce, AuthError, CookieSessionStore, SessionContext};
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::*;

fn jar_with(session: Option<&Session>) -> CookieJar {
    let mut headers = HeaderMap::new();
    if let Some(session) = session {
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&session_cookie(session)).unwrap(),
        );
    }
    CookieJar::from_headers(&headers)
}

fn store_with(api: Arc<FakeAuthApi>, session: Option<&Session>) -> Arc<CookieSessionStore> {
    Arc::new(CookieSessionStore::new(
        api,
        jar_with(session),
        &Config::test_default(),
    ))
}

async fn settled(ctx: &SessionContext) -> balance_tracker::services::AuthState {
    tokio::time::timeout(Duration::from_secs(5), ctx.ready())
        .await
        .expect("context never settled")
}

#[tokio::test]
async fn test_invalid_refresh_token_signs_out() {
    let user = test_user();
    // Message-only error: no structured code to go on
    let api = Arc::new(FakeAuthApi::new(user.clone()).with_refresh(Err(api_error(
        400,
        None,
        "Invalid Refresh Token: Refresh Token Not Found",
    ))));
    let store = store_with(api.clone(), Some(&expired_session(&user)));

    let ctx = SessionContext::start(store.clone());
    let state = settled(&ctx).await;

    assert!(!state.loading);
    assert!(state.session.is_none());
    assert!(state.user.is_none());
    assert_eq!(api.calls("refresh_session"), 1);
    assert_eq!(api.calls("logout"), 1);
    assert!(store.cookie_jar().get(SESSION_COOKIE).is_none());
}

#[tokio::test]
async fn test_structured_refresh_error_code_signs_out() {
    let user = test_user();
    let api = Arc::new(FakeAuthApi::new(user.clone()).with_refresh(Err(api_error(
        400,
        Some("refresh_token_already_used"),
        "Token has been revoked",
    ))));
    let store = store_with(api.clone(), Some(&expired_session(&user)));

    let ctx = SessionContext::start(store);
    let state = settled(&ctx).await;

    assert!(state.user.is_none());
    assert_eq!(api.calls("logout"), 1);
}

#[tokio::test]
async fn test_other_session_error_fails_safe() {
    let user = test_user();
    let api = Arc::new(
        FakeAuthApi::new(user.clone())
            .with_refresh(Err(AuthError::Unavailable("connection refused".to_string()))),
    );
    let store = store_with(api.clone(), Some(&expired_session(&user)));

    let ctx = SessionContext::start(store);
    let state = settled(&ctx).await;

    assert!(!state.loading);
    assert!(state.session.is_none());
    assert!(state.user.is_none());
    // Not a refresh-token problem, so no forced sign-out
    assert_eq!(api.calls("logout"), 0);
}

#[tokio::test]
async fn test_panic_during_initial_fetch_settles_signed_out() {
    let user = test_user();
    let api = Arc::new(PanickingRefreshAuthApi(FakeAuthApi::new(user.clone())));
    let store = Arc::new(CookieSessionStore::new(
        api,
        jar_with(Some(&expired_session(&user))),
        &Config::test_default(),
    ));

    let ctx = SessionContext::start(store);
    let state = settled(&ctx).await;

    assert!(!state.loading);
    assert!(state.session.is_none());
    assert!(state.user.is_none());
}

#[tokio::test]
async fn test_valid_session_is_adopted() {
    let user = test_user();
    let api = Arc::new(FakeAuthApi::new(user.clone()));
    let session = test_session(&user);
    let store = store_with(api.clone(), Some(&session));

    let ctx = SessionContext::start(store);
    let state = settled(&ctx).await;

    assert_eq!(state.session.as_ref(), Some(&session));
    assert_eq!(state.user(), Some(&user));
    assert_eq!(api.calls("refresh_session"), 0);
}

#[tokio::test]
async fn test_expired_session_is_refreshed() {
    let user = test_user();
    let api = Arc::new(FakeAuthApi::new(user.clone()));
    let store = store_with(api.clone(), Some(&expired_session(&user)));

    let ctx = SessionContext::start(store.clone());
    let state = settled(&ctx).await;

    assert_eq!(
        state.session.as_ref().map(|s| s.access_token.as_str()),
        Some("refreshed-access-token")
    );
    assert_eq!(state.user(), Some(&user));
    assert!(store.cookie_jar().get(SESSION_COOKIE).is_some());
}

#[tokio::test]
async fn test_no_session_is_signed_out() {
    let api = Arc::new(FakeAuthApi::new(test_user()));
    let ctx = SessionContext::start(store_with(api.clone(), None));

    let state = settled(&ctx).await;
    assert!(state.user().is_none());
    assert_eq!(api.calls("get_user"), 0);
}

#[tokio::test]
async fn test_user_updated_event_replaces_user() {
    let user = test_user();
    let api = Arc::new(FakeAuthApi::new(user.clone()));
    let store = store_with(api.clone(), Some(&test_session(&user)));

    let ctx = SessionContext::start(store.clone());
    settled(&ctx).await;
    let mut changes = ctx.subscribe();
    let _ = changes.borrow_and_update();

    let renamed = User {
        email: Some("countess@example.com".to_string()),
        ..user.clone()
    };
    api.set_user(Ok(renamed.clone()));
    store.get_user().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), changes.changed())
        .await
        .expect("no state change")
        .unwrap();

    let state = ctx.state();
    assert_eq!(state.user(), Some(&renamed));
    // Session is kept as it was
    assert_eq!(
        state.session.as_ref().map(|s| s.access_token.as_str()),
        Some("access-token")
    );
}

#[tokio::test]
async fn test_sign_out_updates_state_through_event() {
    let user = test_user();
    let api = Arc::new(FakeAuthApi::new(user.clone()));
    let store = store_with(api.clone(), Some(&test_session(&user)));

    let ctx = SessionContext::start(store.clone());
    assert!(settled(&ctx).await.user().is_some());

    let mut changes = ctx.subscribe();
    let _ = changes.borrow_and_update();
    ctx.sign_out().await;

    tokio::time::timeout(Duration::from_secs(5), changes.wait_for(|s| s.user.is_none()))
        .await
        .expect("never signed out")
        .unwrap();

    assert_eq!(api.calls("logout"), 1);
    assert!(store.cookie_jar().get(SESSION_COOKIE).is_none());
}

#[tokio::test]
async fn test_sign_in_with_google() {
    let user = test_user();
    let api = Arc::new(FakeAuthApi::new(user.clone()));
    let store = store_with(api.clone(), Some(&test_session(&user)));

    let ctx = SessionContext::start(store.clone());
    let url = ctx
        .sign_in_with_google("http://localhost:3000")
        .await
        .unwrap();

    // Stale session is cleared before starting over
    assert_eq!(api.calls("logout"), 1);
    assert!(store.cookie_jar().get(SESSION_COOKIE).is_none());

    let verifier = store
        .cookie_jar()
        .get(VERIFIER_COOKIE)
        .map(|c| c.value().to_string())
        .expect("verifier cookie");

    let parsed = url::Url::parse(&url).unwrap();
    let params: std::collections::HashMap<String, String> =
        parsed.query_pairs().into_owned().collect();
    assert_eq!(params["provider"], "google");
    assert_eq!(params["redirect_to"], "http://localhost:3000/auth/callback");
    assert_eq!(params["access_type"], "offline");
    assert_eq!(params["prompt"], "consent");
    assert_eq!(params["code_challenge"], pkce::challenge(&verifier));
}

#[tokio::test]
async fn test_user_hidden_until_settled() {
    let user = test_user();
    let api = Arc::new(FakeAuthApi::new(user.clone()));
    let store = store_with(api, Some(&test_session(&user)));

    let ctx = SessionContext::start(store);
    let snapshot = ctx.state();
    if snapshot.loading {
        assert!(snapshot.user().is_none());
    }

    assert!(settled(&ctx).await.user().is_some());
    ctx.shutdown();
}
