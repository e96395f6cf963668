//! API Router with Swagger UI

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::FromRef,
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::common::ApiResponse;
use super::modules::chargers::{self, ActionResponse, ChargerDto, ChargersState};
use super::modules::health::{self, HealthResponse, HealthState};
use super::modules::metrics::{http_metrics_middleware, prometheus_metrics, MetricsState};
use crate::application::{SharedChargerRegistry, SharedEventBus};
use crate::interfaces::ws::{create_notification_state, ws_notifications_handler, NotificationState};
use crate::support::shutdown::ShutdownSignal;

/// Everything the router needs from the runtime.
pub struct RouterDeps {
    pub registry: SharedChargerRegistry,
    pub event_bus: SharedEventBus,
    pub default_id_tag: String,
    /// `/metrics` is only mounted when a recorder is installed.
    pub prometheus: Option<PrometheusHandle>,
    pub shutdown: ShutdownSignal,
}

/// Unified state; each handler extracts its own slice via `FromRef`.
#[derive(Clone)]
pub struct AppState {
    chargers: ChargersState,
    health: HealthState,
    notifications: NotificationState,
}

impl FromRef<AppState> for ChargersState {
    fn from_ref(s: &AppState) -> Self {
        s.chargers.clone()
    }
}

impl FromRef<AppState> for HealthState {
    fn from_ref(s: &AppState) -> Self {
        s.health.clone()
    }
}

impl FromRef<AppState> for NotificationState {
    fn from_ref(s: &AppState) -> Self {
        s.notifications.clone()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        chargers::list_chargers,
        chargers::get_charger,
        chargers::create_charger,
        chargers::delete_charger,
        chargers::set_power,
        chargers::start_transaction,
        chargers::stop_transaction,
        chargers::start_charger,
    ),
    components(
        schemas(
            ApiResponse<ChargerDto>,
            ApiResponse<Vec<ChargerDto>>,
            ApiResponse<ActionResponse>,
            ChargerDto,
            ActionResponse,
            chargers::CreateChargerRequest,
            chargers::PowerRequest,
            chargers::StartTransactionRequest,
            HealthResponse,
        )
    ),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Chargers", description = "Simulated OCPP 1.6 charge points: lifecycle, power and transactions"),
    ),
    info(
        title = "OCPP Charger Simulator API",
        version = "0.1.0",
        description = "Control API for a fleet of simulated OCPP 1.6 charge points. \
                       Fleet events stream over WebSocket at /ws/events.",
        license(name = "MIT")
    )
)]
pub struct ApiDoc;

pub fn create_api_router(deps: RouterDeps) -> Router {
    let state = AppState {
        chargers: ChargersState {
            registry: deps.registry.clone(),
            default_id_tag: Arc::from(deps.default_id_tag),
        },
        health: HealthState {
            registry: deps.registry,
            started_at: Arc::new(Instant::now()),
        },
        notifications: create_notification_state(deps.event_bus, deps.shutdown),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/chargers",
            get(chargers::list_chargers).post(chargers::create_charger),
        )
        .route(
            "/chargers/{id}",
            get(chargers::get_charger).delete(chargers::delete_charger),
        )
        .route("/chargers/{id}/power", post(chargers::set_power))
        .route("/chargers/{id}/start", post(chargers::start_transaction))
        .route("/chargers/{id}/stop", post(chargers::stop_transaction))
        .route("/start-charger/{id}", get(chargers::start_charger))
        .route("/ws/events", get(ws_notifications_handler))
        .route_layer(middleware::from_fn(http_metrics_middleware))
        .with_state(state);

    if let Some(handle) = deps.prometheus {
        router = router.merge(
            Router::new()
                .route("/metrics", get(prometheus_metrics))
                .with_state(MetricsState { handle }),
        );
    }

    router
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
