//! HTTP API router.
//!
//! Returns a composable `Router`; every route is nested under `/api/`.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/patients",
            get(endpoints::patients::list).post(endpoints::patients::create),
        )
        .route("/patients/draft", post(endpoints::patients::draft))
        .route("/patients/:id", get(endpoints::patients::detail))
        .route("/patients/:id/history", put(endpoints::patients::update_history))
        .route(
            "/patients/:id/history/append",
            post(endpoints::patients::append_history),
        )
        .route(
            "/cases",
            get(endpoints::cases::list).post(endpoints::cases::open),
        )
        .route("/cases/:id", get(endpoints::cases::detail))
        .route("/cases/:id/progress", put(endpoints::cases::update_progress))
        .route(
            "/cases/:id/progress/append",
            post(endpoints::cases::append_progress),
        )
        .route("/cases/:id/close", post(endpoints::cases::close))
        .route("/cases/:id/report", post(endpoints::cases::report))
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
