// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Route classification middleware.
//!
//! Pages enforce sign-in themselves through their session context, so this
//! layer only classifies and never blocks.

use axum::{extract::Request, middleware::Next, response::Response};

/// Path prefixes that need no session at all.
const PUBLIC_PREFIXES: &[&str] = &["/auth", "/api", "/_next", "/favicon.ico", "/public"];

/// Whether a path is public. `/` is public; `/setup` and `/profile` are
/// checked by the pages.
pub fn is_public_path(path: &str) -> bool {
    path == "/" || PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

pub async fn gate(req: Request, next: Next) -> Response {
    let path = req.uri().path();
    tracing::trace!(
        path = %path,
        public = is_public_path(path),
        "Route gate"
    );
    next.run(req).await
}
