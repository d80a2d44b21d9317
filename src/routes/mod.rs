pub mod api;
pub mod auth_middleware;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::docs::ApiDoc;
use crate::state::AppState;
use crate::websocket::relay_handler;

pub use api::create_api_routes;
pub use auth_middleware::AuthUser;

/// Full application router: relay endpoints, REST API and Swagger UI.
pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/relay/:club_id", get(relay_handler))
        .route("/api/ws/:club_id", get(relay_handler))
        // Mount API routes
        .nest("/api", create_api_routes(state.clone()))
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
