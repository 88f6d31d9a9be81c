// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access token record and JWT expiry decoding.
//!
//! The bearer string is opaque to the client. Only the `exp` claim of the
//! payload segment is read, and no signature verification is done here; the
//! backend that issued the token is the authority on it.

use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Deserializer};

/// Claims read from the token payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiration timestamp (Unix seconds). Fractional values are floored.
    #[serde(deserialize_with = "deserialize_exp")]
    pub exp: i64,
    /// Subject, if the backend includes one
    #[serde(default)]
    pub sub: Option<String>,
}

/// Accept any finite JSON number for `exp`.
fn deserialize_exp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let exp = f64::deserialize(deserializer)?;
    if !exp.is_finite() || exp < i64::MIN as f64 || exp > i64::MAX as f64 {
        return Err(serde::de::Error::custom("exp out of range"));
    }
    Ok(exp.floor() as i64)
}

/// A bearer token together with the expiry taken from its own payload.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    expiry: i64,
    subject: Option<String>,
}

impl AccessToken {
    /// Build a record from a raw token. Returns `None` when the token is
    /// empty or its expiry cannot be decoded.
    pub fn parse(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        let claims = decode_claims(token)?;
        Some(Self {
            token: token.to_string(),
            expiry: claims.exp,
            subject: claims.sub,
        })
    }

    /// The raw bearer string.
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Expiry as Unix seconds.
    pub fn expiry(&self) -> i64 {
        self.expiry
    }

    /// `sub` claim, used in log fields.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// `Authorization` header value for this token.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// True when the token expires within `threshold` of `now`, or already has.
    pub fn expires_within(&self, threshold: Duration, now: i64) -> bool {
        let threshold = i64::try_from(threshold.as_secs()).unwrap_or(i64::MAX);
        self.expiry.saturating_sub(now) <= threshold
    }

    /// [`Self::expires_within`] against the wall clock.
    pub fn expires_soon(&self, threshold: Duration) -> bool {
        self.expires_within(threshold, now_unix())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expiry", &self.expiry)
            .field("subject", &self.subject)
            .finish()
    }
}

/// Decode the payload claims of a three-segment JWT.
pub fn decode_claims(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() || payload.is_empty() {
        return None;
    }

    // Some issuers pad base64url segments; accept both forms.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| URL_SAFE.decode(payload))
        .ok()?;

    serde_json::from_slice::<Claims>(&bytes).ok()
}

/// Read the `exp` claim of a token. Malformed tokens yield `None`.
pub fn decode_expiry(token: &str) -> Option<i64> {
    decode_claims(token).map(|claims| claims.exp)
}

/// Current Unix time in seconds.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
