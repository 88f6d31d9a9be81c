// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `modovisa-probe [PATH]` - log in (when credentials are set) and issue one
//! authenticated GET against the Modovisa API.

use std::{env, process::ExitCode};

use modovisa_client::{telemetry, ApiClient, ClientConfig, ClientError, LoginOutcome, RequestOptions};
use tracing::{error, info};

const EMAIL_ENV: &str = "MODOVISA_EMAIL";
const PASSWORD_ENV: &str = "MODOVISA_PASSWORD";
const DEFAULT_PATH: &str = "/api/me";

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_unauthorized() => {
            error!("Not authorized; log in again");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = %e, "Probe failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), ClientError> {
    let config = ClientConfig::from_env()?;
    info!(base_url = %config.base_url, "Modovisa probe starting");
    let client = ApiClient::new(config)?;

    if let (Ok(email), Ok(password)) = (env::var(EMAIL_ENV), env::var(PASSWORD_ENV)) {
        match client.login(&email, &password).await? {
            LoginOutcome::Authenticated { redirect } => {
                info!(redirect = ?redirect, "Logged in");
            }
            LoginOutcome::TwoFactorRequired { .. } => {
                error!("Account requires two-factor verification; probe cannot continue");
                return Err(ClientError::Unauthorized);
            }
        }
    }

    let timer = client.start_proactive_refresh();

    let path = env::args().nth(1).unwrap_or_else(|| DEFAULT_PATH.to_string());
    let response = client.secure_fetch(&path, RequestOptions::get()).await;
    timer.stop().await;

    let response = response?;
    let status = response.status();
    let body = response.text().await?;
    println!("{status}");
    println!("{body}");
    Ok(())
}
