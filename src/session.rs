// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session endpoints: login, profile probe, logout.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::auth::AccessToken;
use crate::client::{ApiClient, RequestOptions};
use crate::error::ClientError;

const LOGIN_PATH: &str = "api/login";
const ME_PATH: &str = "api/me";
const LOGOUT_PATH: &str = "api/logout";

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    redirect: Option<String>,
    #[serde(default)]
    twofa_required: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[serde(default)]
    user: Option<Value>,
    #[serde(default)]
    token: Option<String>,
}

/// Result of a credential login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Session established. `redirect` is where the backend wants the user sent.
    Authenticated { redirect: Option<String> },
    /// A second factor must be submitted before a token is issued.
    TwoFactorRequired { redirect: Option<String> },
}

/// Profile returned by `GET /api/me`. The user object is owned by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub user: Value,
}

impl ApiClient {
    /// `POST /api/login`. A returned token is stored; the session cookie lands
    /// in the client's cookie jar.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, ClientError> {
        let url = self.url(LOGIN_PATH)?;
        let response = self
            .http()
            .post(url)
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|b| b.error)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("login failed").to_string());
            warn!(status = %status, "Login rejected");
            return Err(ClientError::Api { status, message });
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("login: {e}")))?;

        if body.twofa_required {
            info!("Login requires two-factor verification");
            return Ok(LoginOutcome::TwoFactorRequired {
                redirect: body.redirect,
            });
        }

        if let Some(raw) = body.token {
            let token = AccessToken::parse(raw).ok_or_else(|| {
                ClientError::InvalidResponse("login token has no decodable exp".to_string())
            })?;
            info!(
                expires_at = token.expiry(),
                sub = token.subject().unwrap_or("-"),
                "Logged in"
            );
            self.store().set(token).await;
        } else {
            info!("Logged in without bearer token; relying on refresh");
        }

        Ok(LoginOutcome::Authenticated {
            redirect: body.redirect,
        })
    }

    /// `GET /api/me` through [`ApiClient::secure_fetch`]. If the backend
    /// supplies a newer token it replaces the stored one.
    pub async fn me(&self) -> Result<Profile, ClientError> {
        let response = self.secure_fetch(ME_PATH, RequestOptions::get()).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }

        let body: MeResponse = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("me: {e}")))?;

        if let Some(token) = body.token.and_then(AccessToken::parse) {
            self.store().set(token).await;
        }

        let user = body
            .user
            .filter(|u| !u.is_null())
            .ok_or_else(|| ClientError::InvalidResponse("me: response has no user".to_string()))?;
        Ok(Profile { user })
    }

    /// `POST /api/logout`. The store is cleared even when the call fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let url = self.url(LOGOUT_PATH)?;
        let result = self.http().post(url).send().await;
        self.store().clear().await;

        match result {
            Ok(response) => {
                if !response.status().is_success() {
                    warn!(status = %response.status(), "Logout returned non-success status");
                }
                info!("Logged out");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Logout request failed; local session cleared");
                Err(ClientError::Transport(e))
            }
        }
    }
}
