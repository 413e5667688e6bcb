// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! HTTP host for weft's streaming server renderer.
//! Serves the demo pages over axum; settings come from saved prefs plus flags.

mod demo;
mod http;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use weft_app_core::config::ConfigService;
use weft_app_core::prefs::{Environment, ServerPrefs, SERVER_PREFS_KEY};
use weft_config_fs::FsConfigStore;
use weft_proto::KeyedProtector;

use crate::http::{router, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about = "weft streaming render host")]
struct Args {
    /// Listen address; overrides saved prefs (e.g. 127.0.0.1:8088)
    #[arg(long)]
    listen: Option<SocketAddr>,
    /// Hosting environment: development, staging or production
    #[arg(long)]
    environment: Option<Environment>,
    /// Render every page as one document, without streaming
    #[arg(long)]
    prevent_streaming: bool,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info,tower_http=debug")]
    log_filter: String,
    /// Do not write default prefs when none are saved
    #[arg(long)]
    no_persist: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_filter))
        .context("parse log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut prefs = load_prefs(!args.no_persist);
    if let Some(environment) = args.environment {
        prefs.environment = environment;
    }
    prefs.prevent_streaming |= args.prevent_streaming;

    let listen = match args.listen {
        Some(addr) => addr,
        None => prefs
            .listen
            .parse()
            .with_context(|| format!("invalid listen address '{}' in prefs", prefs.listen))?,
    };

    // Reference protector under a per-process key; descriptors die with the process.
    warn!("sealing server descriptors with the reference protector; not for production");
    let state = Arc::new(AppState::from_prefs(
        &prefs,
        Arc::new(KeyedProtector::ephemeral()),
    ));
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("bind {listen}"))?;
    info!(
        addr = %listener.local_addr()?,
        environment = ?prefs.environment,
        prevent_streaming = prefs.prevent_streaming,
        "weft server listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;
    Ok(())
}

/// Saved prefs, falling back to defaults when the store is unusable.
fn load_prefs(persist: bool) -> ServerPrefs {
    let store = match FsConfigStore::new() {
        Ok(store) => store,
        Err(err) => {
            warn!(%err, "config dir unavailable; using default prefs");
            return ServerPrefs::default();
        }
    };
    let base = store.base().display().to_string();
    let service = ConfigService::new(store);
    let loaded = if persist {
        service.load_or_init(SERVER_PREFS_KEY).map(|(prefs, wrote)| {
            if wrote {
                info!(dir = %base, "wrote default server prefs");
            }
            prefs
        })
    } else {
        service
            .load(SERVER_PREFS_KEY)
            .map(Option::unwrap_or_default)
    };
    loaded.unwrap_or_else(|err| {
        warn!(%err, dir = %base, "could not load server prefs; using defaults");
        ServerPrefs::default()
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
