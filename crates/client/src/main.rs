//! `greetcard` -- create a paid greeting card and follow it to completion.
//!
//! Uses the local HMAC signer, so it only works against backends that
//! accept development payment headers.
//!
//! # Environment variables
//!
//! Besides the `GREETCARD_*` settings read by `ClientConfig::from_env`:
//!
//! | Variable           | Required | Default | Description                              |
//! |--------------------|----------|---------|------------------------------------------|
//! | `TRACK_JOB_ID`     | no       | --      | Track an existing job instead of creating one |
//! | `THEME_TEXT`       | create   | --      | Card theme, 3-500 characters              |
//! | `RESOURCE_ID`      | create   | --      | Target resource the card is created for   |
//! | `IS_PUBLIC`        | no       | `true`  | List the finished card publicly           |
//! | `QUOTED_PRICE_USD` | no       | --      | Known price; otherwise read from metadata |
//! | `WALLET_ADDRESS`   | create   | --      | Payer identity                            |
//! | `WALLET_SECRET`    | create   | --      | HMAC signing secret                       |
//! | `GRANTS_FILE`      | no       | --      | JSON file for ancillary access grants     |
//! | `GENERATE_BANNER`  | no       | `false` | Request the banner image after completion |

use std::sync::Arc;

use greetcard_client::access::{AccessGrantStore, FileAccessGrantStore, MemoryAccessGrantStore};
use greetcard_client::config::ClientConfig;
use greetcard_client::events::TrackerEvent;
use greetcard_client::flow::{await_outcome, CardFlow};
use greetcard_client::signer::HmacWalletSigner;
use greetcard_core::request::{CreationRequest, Visibility};

use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "greetcard_client=info,greetcard_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let signer = HmacWalletSigner::new(
        std::env::var("WALLET_ADDRESS").unwrap_or_default(),
        std::env::var("WALLET_SECRET").unwrap_or_default(),
    );
    let grants: Arc<dyn AccessGrantStore> = match std::env::var("GRANTS_FILE") {
        Ok(path) if !path.trim().is_empty() => Arc::new(FileAccessGrantStore::new(path)),
        _ => Arc::new(MemoryAccessGrantStore::new()),
    };

    let mut flow = CardFlow::new(&config, Arc::new(signer), grants).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build HTTP client");
        std::process::exit(1);
    });

    tracing::info!(
        api_url = %config.api_url,
        poll_interval_secs = config.poll_interval.as_secs(),
        "Starting greetcard",
    );

    // Subscribe before submitting so a fast-path completion is not missed.
    let mut outcome_rx = flow.subscribe();
    tokio::spawn(log_events(flow.subscribe()));

    let job_id = match std::env::var("TRACK_JOB_ID") {
        Ok(id) if !id.trim().is_empty() => {
            if let Err(e) = flow.track_existing(id.trim()) {
                tracing::error!(error = %e, "Cannot track job");
                std::process::exit(1);
            }
            id.trim().to_string()
        }
        _ => {
            let request = request_from_env().unwrap_or_else(|reason| {
                tracing::error!(%reason, "Invalid card request");
                std::process::exit(1);
            });
            match flow.create(request).await {
                Ok(handle) => handle.id().to_string(),
                Err(e) => {
                    tracing::error!(error = %e, "Card creation failed");
                    std::process::exit(1);
                }
            }
        }
    };

    let outcome = tokio::select! {
        outcome = await_outcome(&mut outcome_rx, &job_id) => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(job_id = %job_id, "Interrupted, stopping");
            None
        }
    };

    let mut exit_code = 0;
    match outcome {
        Some(Ok(result)) => {
            if let Some(preview) = &result.preview_text {
                println!("{preview}");
            }
            if env_flag("GENERATE_BANNER", false) {
                match flow.generate_banner().await {
                    Ok(url) => println!("Banner: {url}"),
                    Err(e) => {
                        tracing::error!(error = %e, "Banner generation failed");
                        exit_code = 1;
                    }
                }
            }
        }
        Some(Err(e)) => {
            tracing::error!(error = %e, "Card did not complete");
            exit_code = 1;
        }
        None => {}
    }

    flow.close();
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn request_from_env() -> Result<CreationRequest, String> {
    let theme = std::env::var("THEME_TEXT").map_err(|_| "THEME_TEXT is required".to_string())?;
    let resource =
        std::env::var("RESOURCE_ID").map_err(|_| "RESOURCE_ID is required".to_string())?;
    let visibility = if env_flag("IS_PUBLIC", true) {
        Visibility::Public
    } else {
        Visibility::Private
    };
    let quoted = match std::env::var("QUOTED_PRICE_USD") {
        Ok(raw) => Some(
            raw.trim()
                .parse::<f64>()
                .map_err(|e| format!("QUOTED_PRICE_USD: {e}"))?,
        ),
        Err(_) => None,
    };
    Ok(CreationRequest::new(theme, visibility, resource, quoted))
}

fn env_flag(var: &str, default: bool) -> bool {
    match std::env::var(var) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

async fn log_events(mut rx: broadcast::Receiver<TrackerEvent>) {
    loop {
        match rx.recv().await {
            Ok(TrackerEvent::StatusChanged { job_id, status }) => {
                tracing::info!(%job_id, %status, "Status changed");
            }
            Ok(TrackerEvent::Progress { job_id, stages }) => {
                for stage in &stages {
                    tracing::info!(
                        %job_id,
                        stage = %stage.name,
                        depth = stage.depth,
                        status = ?stage.status,
                        "Progress",
                    );
                }
            }
            Ok(TrackerEvent::Completed { job_id, result }) => {
                tracing::info!(%job_id, word_count = result.word_count, "Card ready");
            }
            Ok(TrackerEvent::Failed { job_id, reason }) => {
                tracing::error!(%job_id, %reason, "Card failed");
            }
            Ok(TrackerEvent::Reset) => tracing::debug!("Tracker reset"),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
