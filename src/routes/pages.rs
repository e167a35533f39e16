// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Server-rendered pages: dashboard, balance setup and profile.
//!
//! Every page settles a session context first and only then looks at the
//! user; signed-out visitors are sent to the sign-in page.

use askama::Template;
use axum::{
    extract::{Form, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use validator::{Validate, ValidationError};

use crate::db::ProfileError;
use crate::error::Result;
use crate::models::profile::{format_amount, parse_amount};
use crate::models::{Profile, User};
use crate::routes::settle_session;
use crate::time_utils::format_display_date;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(dashboard))
        .route("/setup", get(setup_page).post(setup_submit))
        .route("/profile", get(profile_page).post(profile_submit))
}

const LOGIN_PATH: &str = "/auth/login";
const INVALID_NUMBER: &str = "Please enter a valid number";
const NOT_PROVIDED: &str = "Not provided";

fn page(jar: CookieJar, template: &impl Template) -> Result<Response> {
    Ok((jar, Html(template.render()?)).into_response())
}

fn to_login(jar: CookieJar) -> Result<Response> {
    Ok((jar, Redirect::to(LOGIN_PATH)).into_response())
}

fn validate_amount(value: &str) -> std::result::Result<(), ValidationError> {
    match parse_amount(value) {
        Some(_) => Ok(()),
        None => Err(ValidationError::new("invalid_amount")),
    }
}

// ─── Dashboard ───────────────────────────────────────────────

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    display_name: String,
    balance: String,
}

async fn dashboard(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<Response> {
    let (store, auth) = settle_session(&state, jar).await;
    let jar = store.cookie_jar();
    let Some(user) = auth.user() else {
        return to_login(jar);
    };

    let balance = match state.profiles.get(user.id).await {
        Ok(profile) => profile.current_balance,
        Err(ProfileError::NotFound) => 0.0,
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Failed to load balance");
            0.0
        }
    };

    let display_name = user
        .user_metadata
        .full_name
        .clone()
        .or_else(|| user.email.clone())
        .unwrap_or_default();

    page(
        jar,
        &DashboardTemplate {
            display_name,
            balance: format_amount(balance),
        },
    )
}

// ─── Setup ───────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "setup.html")]
struct SetupTemplate {
    first_name: String,
    starting_balance: String,
    error: Option<&'static str>,
}

impl SetupTemplate {
    fn new(user: &User, starting_balance: String, error: Option<&'static str>) -> Self {
        Self {
            first_name: user.first_name().unwrap_or("there").to_string(),
            starting_balance,
            error,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
struct SetupForm {
    #[serde(default)]
    #[validate(custom(function = "validate_amount"))]
    starting_balance: String,
}

async fn setup_page(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<Response> {
    let (store, auth) = settle_session(&state, jar).await;
    let jar = store.cookie_jar();
    let Some(user) = auth.user() else {
        return to_login(jar);
    };

    page(jar, &SetupTemplate::new(user, String::new(), None))
}

async fn setup_submit(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<SetupForm>,
) -> Result<Response> {
    let (store, auth) = settle_session(&state, jar).await;
    let jar = store.cookie_jar();
    let Some(user) = auth.user() else {
        return to_login(jar);
    };

    let amount = match form.validate().ok().and_then(|_| parse_amount(&form.starting_balance)) {
        Some(amount) => amount,
        None => {
            return page(
                jar,
                &SetupTemplate::new(user, form.starting_balance, Some(INVALID_NUMBER)),
            )
        }
    };

    let profile = Profile::from_setup(user, amount, Utc::now());
    match state.profiles.upsert(&profile).await {
        Ok(_) => {
            tracing::info!(user_id = %user.id, "Starting balance saved");
            Ok((jar, Redirect::to("/")).into_response())
        }
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Failed to save profile");
            page(
                jar,
                &SetupTemplate::new(
                    user,
                    form.starting_balance,
                    Some("Failed to save profile. Please try again."),
                ),
            )
        }
    }
}

// ─── Profile ─────────────────────────────────────────────────

struct ProfileView {
    name: String,
    email: String,
    member_since: String,
    starting_balance: String,
    current_balance: String,
}

impl ProfileView {
    fn new(profile: &Profile, user: &User) -> Self {
        Self {
            name: profile
                .full_name
                .clone()
                .unwrap_or_else(|| NOT_PROVIDED.to_string()),
            email: profile
                .email
                .clone()
                .or_else(|| user.email.clone())
                .unwrap_or_else(|| NOT_PROVIDED.to_string()),
            member_since: format_display_date(profile.created_at),
            starting_balance: format_amount(profile.starting_balance),
            current_balance: format_amount(profile.current_balance),
        }
    }
}

#[derive(Template)]
#[template(path = "profile.html")]
struct ProfileTemplate {
    profile: Option<ProfileView>,
    current_balance_input: String,
    error: Option<&'static str>,
    success: Option<&'static str>,
}

impl ProfileTemplate {
    fn unavailable() -> Self {
        Self {
            profile: None,
            current_balance_input: String::new(),
            error: None,
            success: None,
        }
    }

    fn show(profile: &Profile, user: &User) -> Self {
        Self {
            profile: Some(ProfileView::new(profile, user)),
            current_balance_input: format_amount(profile.current_balance),
            error: None,
            success: None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
struct BalanceForm {
    #[serde(default)]
    #[validate(custom(function = "validate_amount"))]
    current_balance: String,
}

async fn profile_page(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<Response> {
    let (store, auth) = settle_session(&state, jar).await;
    let jar = store.cookie_jar();
    let Some(user) = auth.user() else {
        return to_login(jar);
    };

    match state.profiles.get(user.id).await {
        Ok(profile) => page(jar, &ProfileTemplate::show(&profile, user)),
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Unable to load profile");
            page(jar, &ProfileTemplate::unavailable())
        }
    }
}

async fn profile_submit(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<BalanceForm>,
) -> Result<Response> {
    let (store, auth) = settle_session(&state, jar).await;
    let jar = store.cookie_jar();
    let Some(user) = auth.user() else {
        return to_login(jar);
    };

    let profile = match state.profiles.get(user.id).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Unable to load profile");
            return page(jar, &ProfileTemplate::unavailable());
        }
    };

    let Some(amount) = form
        .validate()
        .ok()
        .and_then(|_| parse_amount(&form.current_balance))
    else {
        return page(
            jar,
            &ProfileTemplate {
                current_balance_input: form.current_balance,
                error: Some(INVALID_NUMBER),
                ..ProfileTemplate::show(&profile, user)
            },
        );
    };

    match state
        .profiles
        .update_current_balance(user.id, amount, Utc::now())
        .await
    {
        Ok(updated) => {
            tracing::info!(user_id = %user.id, "Current balance updated");
            page(
                jar,
                &ProfileTemplate {
                    success: Some("Balance updated successfully!"),
                    ..ProfileTemplate::show(&updated, user)
                },
            )
        }
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Failed to update balance");
            page(
                jar,
                &ProfileTemplate {
                    current_balance_input: form.current_balance,
                    error: Some("Failed to update balance. Please try again."),
                    ..ProfileTemplate::show(&profile, user)
                },
            )
        }
    }
}
