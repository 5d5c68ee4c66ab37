use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use vaultkeep_core::{config::VaultkeepConfig, Settings};
use vaultkeep_protocol::actions::WS_PATH;
use vaultkeep_scheduler::SchedulerEngine;

use crate::ws::{feed::StatusFeed, hub::HubHandle};

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: VaultkeepConfig,
    pub settings: Arc<Settings>,
    pub engine: SchedulerEngine,
    pub hub: HubHandle,
    /// Status events from the scheduler, one subscription per session.
    pub feed: StatusFeed,
}

impl AppState {
    pub fn new(
        config: VaultkeepConfig,
        settings: Arc<Settings>,
        engine: SchedulerEngine,
        hub: HubHandle,
        feed: StatusFeed,
    ) -> Self {
        Self {
            config,
            settings,
            engine,
            hub,
            feed,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_ui = ServeDir::new(&state.config.gateway.public_dir);

    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(WS_PATH, get(crate::ws::session::ws_handler))
        .route(
            "/api/schedules/{id}/{action}",
            get(crate::http::schedules::schedule_action),
        )
        .route(
            "/api/config",
            get(crate::http::config::get_config).post(crate::http::config::save_config),
        )
        .route("/api/jobs", get(crate::http::jobs::list_jobs))
        .route("/api/jobs/running", get(crate::http::jobs::running_jobs))
        .route(
            "/api/path/autocomplete",
            get(crate::http::autocomplete::autocomplete),
        )
        .fallback_service(static_ui)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
