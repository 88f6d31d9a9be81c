// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Proactive Token Refresher
//!
//! Background task that refreshes the access token shortly before it
//! expires, so that user-initiated requests rarely discover an expired token
//! themselves.
//!
//! ## Strategy
//!
//! Every `interval` (default 60 s) the refresher:
//! 1. Reads the stored token. With no token there is no session to keep
//!    alive and the tick is skipped.
//! 2. If the token expires within `threshold`, calls the refresh
//!    coordinator. A refresh already started by a request is joined rather
//!    than duplicated.
//! 3. Logs and swallows failures; the next tick tries again.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`. [`RefreshTimerHandle`] cancels
//! the loop on `stop()` or on drop, so a handle scoped to a component never
//! leaves a duplicate timer behind.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::refresh::RefreshCoordinator;
use super::store::TokenStore;

/// Periodic expiry check over a token store.
pub struct ProactiveRefresher {
    store: TokenStore,
    refresher: RefreshCoordinator,
    interval: Duration,
    threshold: Duration,
}

impl ProactiveRefresher {
    pub fn new(
        store: TokenStore,
        refresher: RefreshCoordinator,
        interval: Duration,
        threshold: Duration,
    ) -> Self {
        Self {
            store,
            refresher,
            interval,
            threshold,
        }
    }

    /// Spawn the loop and return a handle that stops it.
    pub fn spawn(self) -> RefreshTimerHandle {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run(shutdown.clone()));
        RefreshTimerHandle {
            shutdown,
            task: Some(task),
        }
    }

    /// Run until the cancellation token is triggered.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            threshold_secs = self.threshold.as_secs(),
            "Proactive token refresher starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Proactive token refresher shutting down");
                    return;
                }
            }

            self.tick().await;
        }
    }

    /// One expiry check. Returns whether a refresh was attempted.
    pub async fn tick(&self) -> bool {
        let Some(token) = self.store.get().await else {
            debug!("Proactive refresh: no token stored, skipping");
            return false;
        };

        if !token.expires_soon(self.threshold) {
            return false;
        }

        debug!(expires_at = token.expiry(), "Proactive refresh: token expiring soon");
        if let Err(e) = self.refresher.refresh().await {
            warn!(error = %e, "Proactive refresh failed");
        }
        true
    }
}

/// Owner of a running [`ProactiveRefresher`]. Dropping it stops the loop.
pub struct RefreshTimerHandle {
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RefreshTimerHandle {
    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Proactive token refresher task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for RefreshTimerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
