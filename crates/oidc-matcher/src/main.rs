//! Diagnostic entry point.
//!
//! `oidc-matcher <token>` checks a token against itself as the stored
//! credential using allow-lists from the environment.
//!
//! Exit codes: 0 match, 1 rejected, 2 usage or configuration error.

use anyhow::Context;
use common::secret::CredentialKey;
use oidc_matcher::{Config, TokenMatcher};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oidc_matcher=info,oidc=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(true) => {
            info!("Token matched");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            info!("Token rejected");
            ExitCode::from(1)
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run() -> anyhow::Result<bool> {
    let token = std::env::args()
        .nth(1)
        .context("usage: oidc-matcher <token>")?;

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(?config, "Configuration loaded successfully");

    let matcher = TokenMatcher::from_config(&config);
    let stored = CredentialKey::from(token.as_str());

    Ok(matcher.matches(&token, &stored, &config.policy()).await?)
}
