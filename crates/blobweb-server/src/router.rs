use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handler::{self, AppState};

/// Build the axum router.
///
/// The RPC routes are only mounted once something has been registered.
pub fn build_router(state: AppState, cors: bool) -> Router {
    let mut router = Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler));

    if state.dispatcher.registry().route_active() {
        router = router
            .route("/rpcs", post(handler::rpc_handler))
            .route("/api/rpcs", post(handler::rpc_handler));
        info!(rpcs = state.dispatcher.registry().len(), "mounted RPC routes");
    }
    if cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
        .layer(DefaultBodyLimit::max(state.max_request_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
