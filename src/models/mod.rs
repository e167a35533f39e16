// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod profile;
pub mod session;
pub mod user;

pub use profile::Profile;
pub use session::{AuthChangeEvent, Session, SessionEvent, TokenPair};
pub use user::{User, UserMetadata};
