// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Single-flight access token refresh.
//!
//! ## Behaviour
//!
//! - At most one refresh request is in flight per coordinator. Callers that
//!   arrive while one is pending await the same result.
//! - The refresh runs as a detached task: it completes, updates the store
//!   and clears the in-flight slot even if every waiting caller is dropped.
//! - The store is only written on success.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::store::TokenStore;
use super::token::AccessToken;
use crate::error::ClientError;

/// Pending refresh shared by every waiting caller.
type PendingRefresh = Shared<BoxFuture<'static, Result<AccessToken, String>>>;

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Exchanges the session cookie for a new access token.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    refresh_url: Url,
    store: TokenStore,
    in_flight: Mutex<Option<PendingRefresh>>,
}

/// Clears the in-flight slot when the refresh task ends, including on panic.
struct InFlightGuard(Arc<Inner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl RefreshCoordinator {
    /// `http` must carry the session cookie jar used at login.
    pub fn new(http: reqwest::Client, refresh_url: Url, store: TokenStore) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                refresh_url,
                store,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Build the refresh endpoint URL: `{base}/api/refresh-token?aud={audience}`.
    pub fn endpoint(base_url: &Url, audience: &str) -> Result<Url, ClientError> {
        let mut url = base_url
            .join("api/refresh-token")
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("aud", audience);
        Ok(url)
    }

    /// Whether a refresh request is currently pending.
    pub fn is_refreshing(&self) -> bool {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Refresh the access token, joining an in-flight refresh if there is one.
    pub async fn refresh(&self) -> Result<AccessToken, ClientError> {
        let pending = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Joining in-flight token refresh");
                    pending.clone()
                }
                None => {
                    let pending = self.start_refresh();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await.map_err(ClientError::RefreshFailed)
    }

    /// Spawn the refresh task. Must be called with the in-flight slot locked.
    fn start_refresh(&self) -> PendingRefresh {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _guard = InFlightGuard(Arc::clone(&inner));
            let result = inner.fetch_token().await;
            match &result {
                Ok(token) => {
                    inner.store.set(token.clone()).await;
                    info!(
                        expires_at = token.expiry(),
                        sub = token.subject().unwrap_or("-"),
                        "Access token refreshed"
                    );
                }
                Err(e) => warn!(error = %e, "Access token refresh failed"),
            }
            result
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(format!("refresh task did not complete: {e}")))
        }
        .boxed()
        .shared()
    }
}

impl Inner {
    async fn fetch_token(&self) -> Result<AccessToken, String> {
        debug!(url = %self.refresh_url, "Requesting access token refresh");

        let response = self
            .http
            .post(self.refresh_url.clone())
            .send()
            .await
            .map_err(|e| format!("refresh request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status} from refresh endpoint"));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid refresh response: {e}"))?;

        let raw = body
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| "refresh response did not include token".to_string())?;

        AccessToken::parse(raw).ok_or_else(|| "refreshed token has no decodable exp".to_string())
    }
}
