//! Alt-Svc gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                      GATEWAY                         │
//!   TCP / TLS ────┼─▶ tcp.rs ──┐                                         │
//!                 │            ├─▶ classifier ─▶ dispatcher ─▶ app       │
//!   QUIC ─────────┼─▶ http3.rs ┘                    │                    │
//!                 │                                 ▼                    │
//!                 │                       policy + emitter (Alt-Svc)     │
//!                 │                                 ▲                    │
//!                 │   coordinator ──publishes──▶ endpoint registry       │
//!                 │        ▲                                             │
//!                 │   config watcher / SIGHUP / admin API                │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use altsvc_gateway::admin::{self, AdminState};
use altsvc_gateway::config::{load_config, ConfigWatcher};
use altsvc_gateway::http::server::load_tls;
use altsvc_gateway::http::{default_app, GatewayServer};
use altsvc_gateway::lifecycle::{check_startup, signals, Shutdown};
use altsvc_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "altsvc-gateway", version)]
#[command(about = "Serve one application over HTTP/1.1, HTTP/2 and HTTP/3", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), path = ?args.config, "altsvc-gateway starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                address = %config.observability.metrics_address,
                error = %e,
                "Invalid metrics address, metrics disabled"
            ),
        }
    }

    let tls = load_tls(&config)?;
    let server = GatewayServer::new(config.clone(), default_app(), tls);
    let failures = server.start().await;
    check_startup(&server.coordinator().snapshot(), failures)?;

    let shutdown = Shutdown::new();
    signals::spawn_shutdown_listener(shutdown.clone());

    let (watcher, updates) = ConfigWatcher::new(&args.config, config.clone());
    let _file_watcher = match watcher.run() {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %e, "Config file watching unavailable, SIGHUP still reloads");
            None
        }
    };
    signals::spawn_reload_listener(&shutdown, move || watcher.reload());

    if config.admin.enabled {
        let addr = config.admin.bind_address.parse()?;
        let state = AdminState::new(
            std::sync::Arc::clone(server.coordinator()),
            std::sync::Arc::clone(server.dispatcher()),
            &config.admin.api_key,
        );
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(addr, state, shutdown).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    server.run(updates, shutdown).await?;
    Ok(())
}
