use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::routes;
use crate::state::AppState;

pub fn axum_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::index::handler))
        .nest("/users", routes::users::router(Arc::clone(&state)))
        .nest("/v1/events", routes::events::router(Arc::clone(&state)))
        .nest(
            "/v1/enrollments",
            routes::enrollments::router(Arc::clone(&state)),
        )
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
}
