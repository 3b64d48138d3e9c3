//! HTTP server implementation using Axum.

use crate::error::{ApiError, ApiResult};
use crate::routes;
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use devrel_core::DevRelConfig;
use devrel_platform::PlatformDb;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
pub struct AppState {
    pub db: Arc<Mutex<PlatformDb>>,
    pub config: DevRelConfig,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(db: PlatformDb, config: DevRelConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            config,
            start_time: std::time::Instant::now(),
        }
    }

    /// Lock the store for one synchronous service call.
    pub fn db(&self) -> ApiResult<MutexGuard<'_, PlatformDb>> {
        self.db.lock().map_err(|_| ApiError::internal("database mutex poisoned"))
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new();
    }
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION])
        .allow_credentials(true)
}

async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

async fn not_found() -> ApiError {
    ApiError::not_found("route not found")
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    use routes::{activities, analytics, campaigns, developers, plugins, session, settings, tokens};

    let cors = cors_layer(&state.config.server.cors_origins);
    Router::new()
        .route("/api/health", get(routes::health_check))
        // Session
        .route("/api/auth/login", post(session::login))
        .route("/api/auth/logout", post(session::logout))
        .route("/api/auth/me", get(session::me))
        // Campaigns
        .route("/api/campaigns", get(campaigns::list).post(campaigns::create))
        .route(
            "/api/campaigns/{id}",
            get(campaigns::get_one)
                .put(campaigns::update)
                .patch(campaigns::update)
                .delete(campaigns::delete),
        )
        .route(
            "/api/campaigns/{id}/budget",
            get(campaigns::list_budget).post(campaigns::add_budget),
        )
        .route(
            "/api/campaigns/{id}/budget/{entry_id}",
            delete(campaigns::delete_budget),
        )
        // Developers & activities
        .route("/api/developers", get(developers::list).post(developers::create))
        .route(
            "/api/developers/{id}",
            get(developers::get_one)
                .put(developers::update)
                .patch(developers::update)
                .delete(developers::delete),
        )
        .route("/api/developers/{id}/activities", get(developers::activities))
        .route("/api/activities", get(activities::list).post(activities::record))
        .route("/api/activities/{id}", delete(activities::delete))
        .route(
            "/api/activity-types",
            get(activities::list_types).post(activities::create_type),
        )
        .route(
            "/api/activity-types/{id}",
            get(activities::get_type)
                .put(activities::update_type)
                .patch(activities::update_type)
                .delete(activities::delete_type),
        )
        // Analytics
        .route("/api/funnel", get(analytics::funnel))
        .route("/api/overview", get(analytics::overview))
        // Plugins
        .route("/api/plugins", get(plugins::list).post(plugins::create))
        .route(
            "/api/plugins/{id}",
            get(plugins::get_one)
                .put(plugins::update)
                .patch(plugins::update)
                .delete(plugins::delete),
        )
        .route("/api/plugins/{id}/events", get(plugins::list_events).post(plugins::ingest))
        .route("/api/plugins/{id}/events/stats", get(plugins::event_stats))
        .route("/api/plugins/{id}/events/reprocess", post(plugins::reprocess_failed))
        .route("/api/plugins/{id}/events/{event_id}", get(plugins::get_event))
        .route("/api/plugins/{id}/events/{event_id}/result", post(plugins::report_result))
        .route("/api/plugins/{id}/events/{event_id}/reprocess", post(plugins::reprocess_event))
        .route("/api/plugins/{id}/runs", get(plugins::list_runs).post(plugins::trigger_run))
        .route(
            "/api/plugins/{id}/runs/{run_id}",
            get(plugins::get_run).patch(plugins::update_run),
        )
        // Tokens
        .route("/api/tokens", get(tokens::list).post(tokens::create))
        .route("/api/tokens/{id}", get(tokens::get_one).delete(tokens::revoke))
        // Settings
        .route("/api/settings", get(settings::get).put(settings::update).patch(settings::update))
        .route("/api/settings/users", get(settings::users))
        .route("/api/audit-log", get(settings::audit_log))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Start the HTTP server.
pub async fn start(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 DevRel API listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
