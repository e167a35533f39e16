// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod callback;
pub mod gotrue;
pub mod pkce;
pub mod session_context;
pub mod session_store;

pub use callback::{AuthDelivery, AuthErrorCode, CallbackParams, Channel, RedirectOutcome};
pub use gotrue::{AuthApi, AuthError, AuthorizeRequest, GoTrueClient};
pub use session_context::{AuthState, SessionContext};
pub use session_store::{CookieSessionStore, OAuthSignIn};
