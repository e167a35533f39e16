// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! PKCE verifier/challenge generation and random tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

/// Random bytes behind a code verifier (43 base64url characters).
const VERIFIER_BYTES: usize = 32;

/// Random base64url string from `len` bytes of system randomness.
pub fn random_string(len: usize) -> Result<String, ring::error::Unspecified> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// New PKCE code verifier.
pub fn generate_verifier() -> Result<String, ring::error::Unspecified> {
    random_string(VERIFIER_BYTES)
}

/// S256 code challenge for a verifier.
pub fn challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
