//! Multi-listener coordinator.
//!
//! # Responsibilities
//! - Bind endpoints from configuration and publish their state
//! - Drain endpoints: unpublish first, stop accepting, let connections finish
//! - Reconcile the running set against a reloaded configuration
//!
//! # Ordering
//! An endpoint is published `Bound` only after its socket is bound, and is
//! published `Draining` before its accept loop is told to stop. Together
//! these keep advertisements pointed at sockets that are accepting.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::{LimitsConfig, ListenerConfig, TimeoutConfig};
use crate::http::dispatch::Dispatcher;
use crate::http::{http3, tcp};
use crate::listeners::endpoint::{EndpointId, EndpointState, EndpointView, TransportKind};
use crate::listeners::registry::{EndpointRegistry, EndpointSet};
use crate::net::listener::{Listener, ListenerError};
use crate::net::quic::{self, QuicLimits};
use crate::net::{ConnectionTracker, TlsError, TlsMaterial};

/// Why an endpoint could not be brought up.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("listener `{name}`: invalid bind address `{address}`")]
    InvalidAddress { name: String, address: String },
    #[error("listener `{0}` is already running")]
    AlreadyRunning(String),
    #[error("listener `{0}` needs TLS material but none is configured")]
    MissingTls(String),
    #[error("listener `{name}`: {source}")]
    Tls {
        name: String,
        #[source]
        source: TlsError,
    },
    #[error("listener `{name}` failed to bind {address}: {source}")]
    Io {
        name: String,
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl BindError {
    pub fn listener_name(&self) -> &str {
        match self {
            Self::InvalidAddress { name, .. } | Self::Tls { name, .. } | Self::Io { name, .. } => name,
            Self::AlreadyRunning(name) | Self::MissingTls(name) => name,
        }
    }
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("no running endpoint named `{0}`")]
    UnknownEndpoint(String),
}

/// Settings that apply to endpoints bound from now on.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorSettings {
    pub tls: Option<TlsMaterial>,
    pub limits: LimitsConfig,
    pub timeouts: TimeoutConfig,
}

/// What one endpoint's serve loop needs.
#[derive(Clone)]
pub(crate) struct EndpointContext {
    pub name: Arc<str>,
    pub local_addr: SocketAddr,
    pub dispatcher: Arc<Dispatcher>,
    pub tracker: ConnectionTracker,
    pub timeouts: TimeoutConfig,
    pub max_body_size: usize,
}

/// Resolve once the endpoint is told to stop.
///
/// The `watch::Ref` from `wait_for` is dropped here, so callers can select on
/// this next to arms that await.
pub(crate) async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

/// Progress of one drain.
#[derive(Debug)]
pub struct DrainHandle {
    name: String,
    released: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl DrainHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves once the endpoint's socket has been closed.
    pub async fn released(&mut self) {
        let _ = self.released.wait_for(|released| *released).await;
    }

    /// Resolves once in-flight connections are done and the endpoint is gone.
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            tracing::error!(endpoint = %self.name, error = %e, "Endpoint task failed");
        }
    }
}

/// Outcome of applying a listener configuration.
#[derive(Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub drained: Vec<String>,
    pub unchanged: Vec<String>,
    #[serde(skip)]
    pub failed: Vec<BindError>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

struct RunningEndpoint {
    id: EndpointId,
    config: ListenerConfig,
    stop: watch::Sender<bool>,
    released: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

/// Owns every endpoint of the service.
pub struct Coordinator {
    registry: Arc<EndpointRegistry>,
    dispatcher: Arc<Dispatcher>,
    settings: ArcSwap<CoordinatorSettings>,
    running: Mutex<HashMap<String, RunningEndpoint>>,
}

impl Coordinator {
    pub fn new(dispatcher: Arc<Dispatcher>, settings: CoordinatorSettings) -> Self {
        Self {
            registry: Arc::clone(dispatcher.registry()),
            dispatcher,
            settings: ArcSwap::from_pointee(settings),
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn snapshot(&self) -> Arc<EndpointSet> {
        self.registry.snapshot()
    }

    pub fn settings(&self) -> Arc<CoordinatorSettings> {
        self.settings.load_full()
    }

    /// Replace settings used for subsequently bound endpoints.
    pub fn update_settings(&self, settings: CoordinatorSettings) {
        self.settings.store(Arc::new(settings));
    }

    /// Bind one endpoint and start serving it.
    pub async fn add(&self, config: &ListenerConfig) -> Result<EndpointView, BindError> {
        let mut running = self.running.lock().await;
        if running.contains_key(&config.name) {
            return Err(BindError::AlreadyRunning(config.name.clone()));
        }

        let addr: SocketAddr = config.bind_address.parse().map_err(|_| BindError::InvalidAddress {
            name: config.name.clone(),
            address: config.bind_address.clone(),
        })?;

        let name: Arc<str> = Arc::from(config.name.as_str());
        let view = EndpointView {
            id: EndpointId::new(),
            name: Arc::clone(&name),
            transport: config.transport,
            family: config.transport.family(),
            local_addr: addr,
            versions: config.transport.versions(config.http2),
            state: EndpointState::Binding,
        };
        let id = view.id;
        self.registry.insert(view);
        tracing::info!(endpoint = %name, transport = %config.transport, address = %addr, "Binding endpoint");

        let settings = self.settings.load_full();
        let bound = match bind(config, addr, &settings).await {
            Ok(bound) => bound,
            Err(e) => {
                self.registry.remove(id);
                return Err(e);
            }
        };
        let local_addr = bound.local_addr();
        self.registry.transition(id, EndpointState::Bound, Some(local_addr));

        let context = EndpointContext {
            name: Arc::clone(&name),
            local_addr,
            dispatcher: Arc::clone(&self.dispatcher),
            tracker: ConnectionTracker::new(),
            timeouts: settings.timeouts.clone(),
            max_body_size: settings.limits.max_body_size,
        };
        let (stop_tx, stop_rx) = watch::channel(false);
        let (released_tx, released_rx) = watch::channel(false);
        let registry = Arc::clone(&self.registry);
        let task = tokio::spawn(run_endpoint(bound, context, stop_rx, released_tx, registry, id));

        running.insert(
            config.name.clone(),
            RunningEndpoint {
                id,
                config: config.clone(),
                stop: stop_tx,
                released: released_rx,
                task,
            },
        );

        Ok(EndpointView {
            id,
            name,
            transport: config.transport,
            family: config.transport.family(),
            local_addr,
            versions: config.transport.versions(config.http2),
            state: EndpointState::Bound,
        })
    }

    /// Stop advertising and accepting on `name`; existing connections finish.
    pub async fn drain(&self, name: &str) -> Result<DrainHandle, CoordinatorError> {
        let endpoint = self
            .running
            .lock()
            .await
            .remove(name)
            .ok_or_else(|| CoordinatorError::UnknownEndpoint(name.to_string()))?;
        Ok(self.begin_drain(name.to_string(), endpoint))
    }

    fn begin_drain(&self, name: String, endpoint: RunningEndpoint) -> DrainHandle {
        self.registry.transition(endpoint.id, EndpointState::Draining, None);
        let _ = endpoint.stop.send(true);
        tracing::info!(endpoint = %name, "Draining endpoint");
        DrainHandle {
            name,
            released: endpoint.released,
            task: endpoint.task,
        }
    }

    /// Make the running set match `desired`.
    ///
    /// Removed or changed endpoints are drained first; their sockets are
    /// released before replacements bind so a changed endpoint can keep its port.
    pub async fn reconcile(&self, desired: &[ListenerConfig]) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let stale: Vec<(String, RunningEndpoint)> = {
            let mut running = self.running.lock().await;
            let names: Vec<String> = running
                .iter()
                .filter(|(name, endpoint)| !desired.iter().any(|d| &d.name == *name && *d == endpoint.config))
                .map(|(name, _)| name.clone())
                .collect();
            names
                .into_iter()
                .filter_map(|name| running.remove(&name).map(|endpoint| (name, endpoint)))
                .collect()
        };

        let mut handles = Vec::with_capacity(stale.len());
        for (name, endpoint) in stale {
            report.drained.push(name.clone());
            handles.push(self.begin_drain(name, endpoint));
        }
        for handle in &mut handles {
            handle.released().await;
        }

        for config in desired {
            let already_running = self.running.lock().await.contains_key(&config.name);
            if already_running {
                report.unchanged.push(config.name.clone());
                continue;
            }
            match self.add(config).await {
                Ok(_) => report.added.push(config.name.clone()),
                Err(e) => {
                    tracing::error!(error = %e, "Endpoint failed to bind during reconcile");
                    report.failed.push(e);
                }
            }
        }

        for handle in handles {
            tokio::spawn(handle.finished());
        }

        report
    }

    /// Drain every endpoint and wait for all of them to finish.
    pub async fn shutdown(&self) {
        let all: Vec<(String, RunningEndpoint)> = self.running.lock().await.drain().collect();
        let handles: Vec<DrainHandle> = all
            .into_iter()
            .map(|(name, endpoint)| self.begin_drain(name, endpoint))
            .collect();
        for handle in handles {
            handle.finished().await;
        }
        tracing::info!("All endpoints drained");
    }
}

enum BoundSocket {
    Tcp {
        listener: Listener,
        tls: Option<Arc<rustls::ServerConfig>>,
        local_addr: SocketAddr,
    },
    Quic {
        endpoint: quinn::Endpoint,
        local_addr: SocketAddr,
    },
}

impl BoundSocket {
    fn local_addr(&self) -> SocketAddr {
        match self {
            Self::Tcp { local_addr, .. } | Self::Quic { local_addr, .. } => *local_addr,
        }
    }
}

async fn bind(
    config: &ListenerConfig,
    addr: SocketAddr,
    settings: &CoordinatorSettings,
) -> Result<BoundSocket, BindError> {
    let io_error = |source: std::io::Error| BindError::Io {
        name: config.name.clone(),
        address: addr,
        source,
    };
    let tls_error = |source: TlsError| BindError::Tls {
        name: config.name.clone(),
        source,
    };
    let material = || {
        settings
            .tls
            .as_ref()
            .ok_or_else(|| BindError::MissingTls(config.name.clone()))
    };

    match config.transport {
        TransportKind::Tcp | TransportKind::Tls => {
            let tls = if config.transport == TransportKind::Tls {
                Some(material()?.tcp_server_config(config.http2).map_err(tls_error)?)
            } else {
                None
            };
            let listener = Listener::bind(addr, settings.limits.max_connections)
                .await
                .map_err(|e| match e {
                    ListenerError::Bind(source) | ListenerError::Accept(source) => io_error(source),
                    ListenerError::Closed => io_error(std::io::Error::other("listener closed")),
                })?;
            let local_addr = listener.local_addr().map_err(io_error)?;
            Ok(BoundSocket::Tcp {
                listener,
                tls,
                local_addr,
            })
        }
        TransportKind::Quic => {
            let server_config = material()?.quic_server_config().map_err(tls_error)?;
            let limits = QuicLimits {
                idle_timeout: settings.timeouts.request(),
                ..QuicLimits::default()
            };
            let endpoint = quic::bind_endpoint(addr, server_config, limits).map_err(io_error)?;
            let local_addr = endpoint.local_addr().map_err(io_error)?;
            Ok(BoundSocket::Quic { endpoint, local_addr })
        }
    }
}

async fn run_endpoint(
    bound: BoundSocket,
    context: EndpointContext,
    stop: watch::Receiver<bool>,
    released: watch::Sender<bool>,
    registry: Arc<EndpointRegistry>,
    id: EndpointId,
) {
    let tracker = context.tracker.clone();
    let drain_timeout = context.timeouts.drain();
    let name = Arc::clone(&context.name);

    match bound {
        BoundSocket::Tcp { listener, tls, .. } => tcp::serve(listener, tls, context, stop).await,
        BoundSocket::Quic { endpoint, .. } => http3::serve(endpoint, context, stop).await,
    }
    let _ = released.send(true);
    tracing::debug!(endpoint = %name, "Endpoint socket released");

    if !tracker.wait_idle_for(drain_timeout).await {
        tracing::warn!(
            endpoint = %name,
            remaining = tracker.active_count(),
            "Drain timeout reached, abandoning connections"
        );
    }
    registry.remove(id);
    tracing::info!(endpoint = %name, "Endpoint unbound");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::altsvc::AltSvcPolicy;
    use crate::http::app::default_app;

    fn coordinator() -> Coordinator {
        let dispatcher = Dispatcher::new(default_app(), Arc::new(EndpointRegistry::new()), AltSvcPolicy::default());
        Coordinator::new(Arc::new(dispatcher), CoordinatorSettings::default())
    }

    fn tcp(name: &str) -> ListenerConfig {
        ListenerConfig::new(name, TransportKind::Tcp, "127.0.0.1:0")
    }

    #[tokio::test]
    async fn add_publishes_bound_address() {
        let coordinator = coordinator();
        let view = coordinator.add(&tcp("web")).await.unwrap();
        assert_eq!(view.state, EndpointState::Bound);
        assert_ne!(view.local_addr.port(), 0);

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.get("web").unwrap().local_addr, view.local_addr);

        assert!(matches!(
            coordinator.add(&tcp("web")).await,
            Err(BindError::AlreadyRunning(_))
        ));
        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn bind_failure_leaves_others_running() {
        let coordinator = coordinator();
        let web = coordinator.add(&tcp("web")).await.unwrap();

        let clash = ListenerConfig::new("clash", TransportKind::Tcp, web.local_addr.to_string());
        assert!(matches!(coordinator.add(&clash).await, Err(BindError::Io { .. })));

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("clash").is_none());
        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn quic_without_tls_is_rejected() {
        let coordinator = coordinator();
        let quic = ListenerConfig::new("h3", TransportKind::Quic, "127.0.0.1:0");
        assert!(matches!(coordinator.add(&quic).await, Err(BindError::MissingTls(_))));
        assert!(coordinator.snapshot().is_empty());
    }

    #[tokio::test]
    async fn drain_unpublishes_then_releases() {
        let coordinator = coordinator();
        let view = coordinator.add(&tcp("web")).await.unwrap();

        let mut handle = coordinator.drain("web").await.unwrap();
        assert_eq!(coordinator.snapshot().get("web").unwrap().state, EndpointState::Draining);

        handle.released().await;
        assert!(tokio::net::TcpStream::connect(view.local_addr).await.is_err());

        handle.finished().await;
        assert!(coordinator.snapshot().get("web").is_none());

        assert!(matches!(
            coordinator.drain("web").await,
            Err(CoordinatorError::UnknownEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn reconcile_adds_drains_and_keeps() {
        let coordinator = coordinator();
        coordinator.add(&tcp("keep")).await.unwrap();
        coordinator.add(&tcp("gone")).await.unwrap();

        let report = coordinator.reconcile(&[tcp("keep"), tcp("new")]).await;
        assert_eq!(report.added, vec!["new".to_string()]);
        assert_eq!(report.drained, vec!["gone".to_string()]);
        assert_eq!(report.unchanged, vec!["keep".to_string()]);
        assert!(report.is_clean());

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.get("new").unwrap().state, EndpointState::Bound);
        assert_eq!(snapshot.get("keep").unwrap().state, EndpointState::Bound);
        coordinator.shutdown().await;
        assert!(coordinator.snapshot().is_empty());
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn endpoint_task_is_send() {
        let settings = CoordinatorSettings::default();
        let bound = bind(&tcp("web"), "127.0.0.1:0".parse().unwrap(), &settings).await.unwrap();
        let context = EndpointContext {
            name: Arc::from("web"),
            local_addr: bound.local_addr(),
            dispatcher: Arc::new(Dispatcher::new(
                default_app(),
                Arc::new(EndpointRegistry::new()),
                AltSvcPolicy::default(),
            )),
            tracker: ConnectionTracker::new(),
            timeouts: settings.timeouts.clone(),
            max_body_size: settings.limits.max_body_size,
        };
        let (stop_tx, stop_rx) = watch::channel(false);
        let (released_tx, mut released_rx) = watch::channel(false);
        let task = run_endpoint(bound, context, stop_rx, released_tx, Arc::new(EndpointRegistry::new()), EndpointId::new());
        assert_send(&task);

        let task = tokio::spawn(task);
        stop_tx.send(true).unwrap();
        released_rx.wait_for(|released| *released).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stop_requested_returns_after_stop() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { stop_requested(&mut rx).await });
        tx.send(true).unwrap();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn changed_endpoint_rebinds_on_same_port() {
        let coordinator = coordinator();
        let before = coordinator.add(&tcp("web")).await.unwrap();

        let mut changed = ListenerConfig::new("web", TransportKind::Tcp, before.local_addr.to_string());
        changed.http2 = false;
        let report = coordinator.reconcile(&[changed]).await;
        assert_eq!(report.drained, vec!["web".to_string()]);
        assert_eq!(report.added, vec!["web".to_string()]);

        let after = coordinator.snapshot();
        let bound: Vec<_> = after.iter().filter(|v| v.state == EndpointState::Bound).collect();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].local_addr, before.local_addr);
        // Lookup by name finds the replacement even while the old one drains.
        let current = after.get("web").unwrap();
        assert_eq!(current.state, EndpointState::Bound);
        assert_ne!(current.id, before.id);
        coordinator.shutdown().await;
    }
}
