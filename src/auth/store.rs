// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory holder for the current access token.

use std::sync::Arc;

use tokio::sync::RwLock;

use super::token::AccessToken;

/// Shared, cloneable token holder.
///
/// Each [`crate::ApiClient`] owns one; clones share the same slot. No
/// validation happens here.
#[derive(Clone, Default)]
pub struct TokenStore {
    current: Arc<RwLock<Option<AccessToken>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token, if any.
    pub async fn get(&self) -> Option<AccessToken> {
        self.current.read().await.clone()
    }

    /// Replace the current token.
    pub async fn set(&self, token: AccessToken) {
        *self.current.write().await = Some(token);
    }

    /// Drop the current token (logout).
    pub async fn clear(&self) {
        *self.current.write().await = None;
    }
}
