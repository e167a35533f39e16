// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (authentication, security, route gating).

pub mod auth;
pub mod gate;
pub mod security;

pub use auth::require_auth;
