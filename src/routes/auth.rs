// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google sign-in and OAuth callback routes.

use askama::Template;
use axum::{
    extract::{rejection::FormRejection, Form, Query, RawQuery, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::Result;
use crate::routes::settle_session;
use crate::services::callback::{
    resolve, AuthDelivery, AuthErrorCode, CallbackParams, Channel, RedirectOutcome,
};
use crate::services::{pkce, SessionContext};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/callback", get(oauth_callback))
        .route(
            "/auth/callback-client",
            get(callback_client_page).post(callback_client_submit),
        )
        .route("/auth/auth-code-error", get(auth_code_error))
        .route("/auth/login", get(login_page))
        .route("/auth/login/google", get(login_google))
        .route("/auth/logout", post(logout))
        .route("/auth/clear", post(clear_auth_data))
}

const NONCE_BYTES: usize = 16;

fn presence<T>(value: &Option<T>) -> &'static str {
    if value.is_some() {
        "present"
    } else {
        "missing"
    }
}

// ─── Callbacks ───────────────────────────────────────────────

/// Provider redirect target. Always answers with exactly one redirect.
async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    RawQuery(query): RawQuery,
) -> (CookieJar, Redirect) {
    let store = state.session_store(jar);
    let params = CallbackParams::parse(query.as_deref().unwrap_or(""));

    tracing::info!(
        code = presence(&params.code),
        error = params.error.as_deref().unwrap_or(""),
        "OAuth callback received"
    );
    let outcome = resolve(
        AuthDelivery::from_query(&params),
        Channel::Query,
        &store,
        state.profiles.as_ref(),
    )
    .await;

    tracing::info!(redirect = %outcome.path(), "OAuth callback resolved");
    (
        store.cookie_jar(),
        Redirect::temporary(&outcome.url(&state.config.site_url)),
    )
}

#[derive(Template)]
#[template(path = "callback_client.html")]
struct CallbackClientTemplate {
    nonce: String,
}

/// Page that posts the URL fragment back, since browsers never send it.
async fn callback_client_page() -> Response {
    let nonce = match pkce::random_string(NONCE_BYTES) {
        Ok(nonce) => nonce,
        Err(_) => {
            tracing::error!("Failed to generate script nonce");
            return Redirect::to(&RedirectOutcome::Error(Channel::Fragment.catch_all()).path())
                .into_response();
        }
    };

    let csp = format!(
        "default-src 'none'; script-src 'nonce-{nonce}'; style-src 'unsafe-inline'; form-action 'self'; frame-ancestors 'none'"
    );

    match (CallbackClientTemplate { nonce }).render() {
        Ok(html) => ([(header::CONTENT_SECURITY_POLICY, csp)], Html(html)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render callback page");
            Redirect::to(&RedirectOutcome::Error(Channel::Fragment.catch_all()).path())
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct FragmentForm {
    #[serde(default)]
    fragment: String,
}

async fn callback_client_submit(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    form: std::result::Result<Form<FragmentForm>, FormRejection>,
) -> (CookieJar, Redirect) {
    let store = state.session_store(jar);

    let outcome = match form {
        Ok(Form(form)) => {
            resolve(
                AuthDelivery::from_fragment(&form.fragment),
                Channel::Fragment,
                &store,
                state.profiles.as_ref(),
            )
            .await
        }
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Malformed fragment submission");
            RedirectOutcome::Error(Channel::Fragment.catch_all())
        }
    };

    tracing::info!(redirect = %outcome.path(), "Fragment callback resolved");
    (
        store.cookie_jar(),
        Redirect::to(&outcome.url(&state.config.site_url)),
    )
}

// ─── Error Page ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ErrorPageParams {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Template)]
#[template(path = "auth_code_error.html")]
struct AuthCodeErrorTemplate {
    message: &'static str,
    code: Option<String>,
}

async fn auth_code_error(Query(params): Query<ErrorPageParams>) -> Result<Html<String>> {
    let code = params.error.filter(|c| !c.is_empty());
    let template = AuthCodeErrorTemplate {
        message: AuthErrorCode::message_for(code.as_deref()),
        code,
    };
    Ok(Html(template.render()?))
}

/// Sign out, drop every cookie the browser sent, and ask it to clear storage.
async fn clear_auth_data(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let names: Vec<String> = jar.iter().map(|c| c.name().to_string()).collect();

    let store = Arc::new(state.session_store(jar));
    let auth = SessionContext::start(store.clone());
    auth.sign_out().await;
    drop(auth);

    let mut jar = store.cookie_jar();
    for name in names {
        jar = jar.remove(Cookie::build((name, "")).path("/"));
    }

    tracing::info!("Cleared auth data");
    (
        jar,
        [("Clear-Site-Data", "\"cookies\", \"storage\"")],
        Redirect::to("/auth/login"),
    )
}

// ─── Sign-in / Sign-out ──────────────────────────────────────

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate;

async fn login_page(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<Response> {
    let (store, auth) = settle_session(&state, jar).await;
    let jar = store.cookie_jar();

    if auth.user().is_some() {
        return Ok((jar, Redirect::to("/")).into_response());
    }

    Ok((jar, Html(LoginTemplate.render()?)).into_response())
}

/// Start Google sign-in: clear any old session, then redirect to the provider.
async fn login_google(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let store = Arc::new(state.session_store(jar));
    let auth = SessionContext::start(store.clone());
    let result = auth.sign_in_with_google(&state.config.site_url).await;
    drop(auth);

    match result {
        Ok(url) => {
            tracing::info!("Starting Google sign-in");
            (store.cookie_jar(), Redirect::to(&url)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to start Google sign-in");
            let outcome = RedirectOutcome::Error(AuthErrorCode::SigninFailed);
            (store.cookie_jar(), Redirect::to(&outcome.path())).into_response()
        }
    }
}

async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let store = Arc::new(state.session_store(jar));
    let auth = SessionContext::start(store.clone());
    auth.sign_out().await;
    drop(auth);

    (store.cookie_jar(), Redirect::to("/auth/login"))
}
