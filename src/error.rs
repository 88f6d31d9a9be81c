// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client error taxonomy.

use reqwest::StatusCode;

/// Errors surfaced by the Modovisa client.
///
/// Callers that drive a UI are expected to branch on
/// [`ClientError::is_unauthorized`] and send the user to the login page.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The refresh call did not return a usable token.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// No valid token could be ensured, or the post-401 refresh failed.
    #[error("Not authorized: no valid access token could be obtained")]
    Unauthorized,

    /// Network-level failure from the HTTP transport.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// Non-success status where a helper required 2xx.
    #[error("API returned {0}")]
    Status(StatusCode),

    /// Backend error body (`{ "error": "..." }`).
    #[error("API returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    /// Response body did not have the expected shape.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Path could not be resolved against the base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Environment configuration could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether the caller should treat this as "log in again".
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }

    /// Status code carried by the error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status(status) | ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status(),
            ClientError::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }
}
