// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Client-side bearer token management for the Modovisa API.
//!
//! ## Token Lifecycle
//!
//! 1. `login` (or a `me` probe) stores a backend-issued JWT
//! 2. Requests attach `Authorization: Bearer <token>`
//! 3. When the token is within the refresh threshold of its `exp`, or a
//!    request comes back `401`, the session cookie is exchanged for a new
//!    token via `POST /api/refresh-token`
//! 4. `logout` clears the store
//!
//! ## Guarantees
//!
//! - At most one refresh request is in flight at a time
//! - A request is retried at most once after a `401`
//! - Tokens are never verified client-side; only `exp` is read

pub mod refresh;
pub mod store;
pub mod timer;
pub mod token;

pub use refresh::RefreshCoordinator;
pub use store::TokenStore;
pub use timer::{ProactiveRefresher, RefreshTimerHandle};
pub use token::{decode_expiry, AccessToken, Claims};
