//! Gateway server setup.
//!
//! # Responsibilities
//! - Wrap the application router with tracing, timeout and body limits
//! - Own the registry, dispatcher and listener coordinator
//! - Bind every configured endpoint at startup
//! - Apply reloaded configuration until shutdown, then drain

use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tokio::sync::mpsc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::altsvc::AltSvcPolicy;
use crate::config::GatewayConfig;
use crate::http::dispatch::Dispatcher;
use crate::lifecycle::Shutdown;
use crate::listeners::{BindError, Coordinator, CoordinatorSettings, EndpointRegistry};
use crate::net::{TlsError, TlsMaterial};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("shutdown channel closed unexpectedly")]
    ShutdownClosed,
}

/// The multi-protocol gateway.
pub struct GatewayServer {
    config: GatewayConfig,
    dispatcher: Arc<Dispatcher>,
    coordinator: Arc<Coordinator>,
}

impl GatewayServer {
    /// Build a server around `app`.
    ///
    /// `tls` is the certificate material for TLS and QUIC endpoints, usually
    /// from [`load_tls`]. Without it those endpoints fail to bind.
    pub fn new(config: GatewayConfig, app: Router, tls: Option<TlsMaterial>) -> Self {
        let app = Self::build_router(&config, app);
        let registry = Arc::new(EndpointRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            app,
            registry,
            AltSvcPolicy::from_config(&config.alt_svc),
        ));
        let settings = CoordinatorSettings {
            tls,
            limits: config.limits.clone(),
            timeouts: config.timeouts.clone(),
        };
        let coordinator = Arc::new(Coordinator::new(Arc::clone(&dispatcher), settings));

        Self {
            config,
            dispatcher,
            coordinator,
        }
    }

    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, app: Router) -> Router {
        app.layer(RequestBodyLimitLayer::new(config.limits.max_body_size))
            .layer(TimeoutLayer::new(config.timeouts.request()))
            .layer(TraceLayer::new_for_http())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Bind every configured listener. Failures are returned, not fatal.
    pub async fn start(&self) -> Vec<BindError> {
        let mut failures = Vec::new();
        for listener in &self.config.listeners {
            match self.coordinator.add(listener).await {
                Ok(view) => tracing::info!(
                    endpoint = %view.name,
                    transport = %view.transport,
                    address = %view.local_addr,
                    "Endpoint bound"
                ),
                Err(e) => failures.push(e),
            }
        }
        failures
    }

    /// Apply configuration updates until shutdown, then drain every endpoint.
    pub async fn run(
        mut self,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: Shutdown,
    ) -> Result<(), ServerError> {
        let mut shutdown_rx = shutdown.subscribe();
        let mut updates_open = true;

        loop {
            tokio::select! {
                received = shutdown_rx.recv() => {
                    if let Err(tokio::sync::broadcast::error::RecvError::Closed) = received {
                        self.coordinator.shutdown().await;
                        return Err(ServerError::ShutdownClosed);
                    }
                    break;
                }
                update = config_updates.recv(), if updates_open => match update {
                    Some(next) => self.apply(next).await,
                    None => updates_open = false,
                },
            }
        }

        tracing::info!("Shutting down, draining endpoints");
        self.coordinator.shutdown().await;
        tracing::info!("Gateway stopped");
        Ok(())
    }

    /// Apply one reloaded configuration.
    pub async fn apply(&mut self, next: GatewayConfig) {
        tracing::info!("Applying reloaded configuration");
        self.dispatcher.set_policy(AltSvcPolicy::from_config(&next.alt_svc));

        if next.limits.max_body_size != self.config.limits.max_body_size
            || next.timeouts.request_secs != self.config.timeouts.request_secs
        {
            tracing::warn!("Request body limit and request timeout changes take effect after restart");
        }

        if next.tls != self.config.tls {
            match load_tls(&next) {
                Ok(tls) => self.coordinator.update_settings(CoordinatorSettings {
                    tls,
                    limits: next.limits.clone(),
                    timeouts: next.timeouts.clone(),
                }),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to reload TLS material. Keeping current listeners.");
                    return;
                }
            }
        } else {
            let current = self.coordinator.settings();
            self.coordinator.update_settings(CoordinatorSettings {
                tls: current.tls.clone(),
                limits: next.limits.clone(),
                timeouts: next.timeouts.clone(),
            });
        }

        let report = self.coordinator.reconcile(&next.listeners).await;
        tracing::info!(
            added = ?report.added,
            drained = ?report.drained,
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            "Listeners reconciled"
        );
        self.config = next;
    }
}

/// Load TLS material named by `config.tls`, if any.
pub fn load_tls(config: &GatewayConfig) -> Result<Option<TlsMaterial>, TlsError> {
    config.tls.as_ref().map(TlsMaterial::load).transpose()
}
