//! Simulator runtime.
//!
//! [`ServerHandle`] owns the full lifecycle: metrics recorder, event bus,
//! charger registry, HTTP control API and graceful shutdown. The CLI binary
//! is a thin wrapper around it; embedders and tests can inject their own
//! [`TransportConnector`].

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{error, info, warn};

use crate::application::{create_event_bus, ChargerRegistry, SessionSettings, SharedChargerRegistry, SharedEventBus};
use crate::config::{AppConfig, LoggingConfig};
use crate::infrastructure::{TransportConnector, WsConnector};
use crate::interfaces::http::{create_api_router, RouterDeps};
use crate::support::shutdown::{ShutdownCoordinator, ShutdownSignal};

// ── Options ────────────────────────────────────────────────────────

pub struct ServerOptions {
    pub config: AppConfig,
    /// Chargers created (and powered on) right after startup.
    pub chargers: Vec<String>,
    /// Transport override; `None` dials `central_system.url` over WebSocket.
    pub connector: Option<Arc<dyn TransportConnector>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            chargers: Vec::new(),
            connector: None,
        }
    }
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running simulator.
///
/// ```rust,no_run
/// use ocpp_sim::server::{ServerHandle, ServerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(ServerOptions::default()).await?;
///     handle.install_signal_handler();
///     handle.shutdown_signal().wait().await;
///     handle.wait().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    pub registry: SharedChargerRegistry,
    pub event_bus: SharedEventBus,
    pub config: AppConfig,
    /// Address the HTTP API is bound to (resolved when port 0 was requested).
    pub local_addr: SocketAddr,

    shutdown: ShutdownCoordinator,
    api_task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub async fn start(opts: ServerOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let config = opts.config;
        info!("Starting OCPP charger simulator...");

        let prometheus = prometheus_handle();

        let event_bus = create_event_bus();
        let connector: Arc<dyn TransportConnector> = match opts.connector {
            Some(connector) => connector,
            None => Arc::new(WsConnector::from_config(&config.central_system)),
        };
        let registry = ChargerRegistry::shared(
            connector,
            SessionSettings::from_config(&config),
            event_bus.clone(),
        );
        info!(
            central_system = %config.central_system.url,
            heartbeat_ms = config.simulation.heartbeat_interval_ms,
            meter_sample_ms = config.simulation.meter_sample_interval_ms,
            "Charger registry ready"
        );

        let shutdown = ShutdownCoordinator::new(config.server.shutdown_timeout);
        let shutdown_signal = shutdown.signal();

        let router = create_api_router(RouterDeps {
            registry: registry.clone(),
            event_bus: event_bus.clone(),
            default_id_tag: config.simulation.default_id_tag.clone(),
            prometheus,
            shutdown: shutdown_signal.clone(),
        });

        let listener = tokio::net::TcpListener::bind(config.server.address()).await?;
        let local_addr = listener.local_addr()?;
        info!("HTTP API listening on http://{}", local_addr);
        info!("Swagger UI available at http://{}/docs/", local_addr);

        let api_shutdown = shutdown_signal.clone();
        let api_server = axum::serve(listener, router).with_graceful_shutdown(async move {
            api_shutdown.wait().await;
            info!("HTTP API received shutdown signal");
        });
        let api_task = tokio::spawn(async move {
            if let Err(e) = api_server.await {
                error!("HTTP API server error: {}", e);
            }
        });

        for id in &opts.chargers {
            match registry.create(id).await {
                Ok(summary) => info!(charger_id = %id, state = %summary.state, "Charger pre-created"),
                Err(e) => warn!(charger_id = %id, error = %e, "Failed to pre-create charger"),
            }
        }

        Ok(Self {
            registry,
            event_bus,
            config,
            local_addr,
            shutdown,
            api_task,
        })
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for shutdown to be triggered, then stop the API and power off
    /// every charger within the configured timeout.
    pub async fn wait(self) {
        let registry = self.registry.clone();
        let completed = self
            .shutdown
            .shutdown_with_cleanup(|| async move {
                registry.shutdown_all().await;
            })
            .await;
        if !completed {
            warn!("Some chargers did not power off before the shutdown timeout");
        }

        match self.api_task.await {
            Ok(()) => info!("HTTP API stopped"),
            Err(e) => error!("HTTP API task panicked: {}", e),
        }
        info!("👋 Simulator shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        self.trigger_shutdown();
        self.wait().await;
    }

    pub fn is_running(&self) -> bool {
        !self.api_task.is_finished()
    }
}

/// The global recorder can only be installed once per process; restarts in
/// the same process reuse it.
fn prometheus_handle() -> Option<PrometheusHandle> {
    static PROM_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

    PROM_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                info!("📊 Prometheus metrics recorder installed");
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "Prometheus recorder unavailable, /metrics disabled");
                None
            }
        })
        .clone()
}

/// Initialize tracing. `RUST_LOG` takes precedence over `logging.level`.
///
/// Call once at process startup, before [`ServerHandle::start`].
pub fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    let result = match config.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("tracing already initialized: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::domain::ConnectionState;
    use crate::infrastructure::{LoopbackConnector, LoopbackPeer};

    fn options(chargers: &[&str]) -> (ServerOptions, UnboundedReceiver<LoopbackPeer>) {
        let (connector, peers) = LoopbackConnector::new();
        let mut config = AppConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.shutdown_timeout = 2;
        (
            ServerOptions {
                config,
                chargers: chargers.iter().map(|c| c.to_string()).collect(),
                connector: Some(Arc::new(connector)),
            },
            peers,
        )
    }

    #[tokio::test]
    async fn pre_created_chargers_are_powered_on() {
        let (opts, mut peers) = options(&["CP1", "CP2"]);
        let handle = ServerHandle::start(opts).await.unwrap();
        assert_ne!(handle.local_addr.port(), 0);
        assert!(handle.is_running());

        let mut seen = vec![
            peers.recv().await.unwrap().charger_id().to_string(),
            peers.recv().await.unwrap().charger_id().to_string(),
        ];
        seen.sort();
        assert_eq!(seen, ["CP1", "CP2"]);

        for summary in handle.registry.list().await {
            assert_ne!(summary.state, ConnectionState::Disconnected);
        }
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_powers_off_every_charger() {
        let (opts, mut peers) = options(&["CP1"]);
        let handle = ServerHandle::start(opts).await.unwrap();
        let registry = handle.registry.clone();
        let mut peer = peers.recv().await.unwrap();

        handle.shutdown().await;

        assert_eq!(registry.count(), 0);
        peer.drain();
        assert!(peer.is_closed());
    }
}
