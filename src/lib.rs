// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Modovisa Client - authenticated access to the Modovisa analytics API
//!
//! This crate manages bearer tokens for calls to the Modovisa backend: it
//! attaches the current token, refreshes it before it expires, and retries a
//! request once after a `401`.
//!
//! ## Modules
//!
//! - `auth` - Token record, store, single-flight refresh, proactive refresher
//! - `client` - `ApiClient::secure_fetch` and request options
//! - `session` - Login, profile probe, logout
//! - `config` - Base URL, thresholds and timeouts (env overridable)
//! - `telemetry` - Tracing subscriber setup

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod telemetry;

pub use auth::{AccessToken, RefreshTimerHandle, TokenStore};
pub use client::{ApiClient, RequestOptions};
pub use config::ClientConfig;
pub use error::ClientError;
pub use session::{LoginOutcome, Profile};
