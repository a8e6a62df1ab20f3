//! Axum router construction.
//!
//! [`build`] assembles the complete application router: CORS, optional
//! Swagger UI / OpenAPI spec, health, and the `/v1` translate + task routes.

mod health;
mod tasks;
mod translate;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::cors::cors_layer;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(info(title = "inkstream-server", description = "inkstream-server API", version = "0.1.0"))]
struct ApiDoc;

fn api_docs() -> utoipa::openapi::OpenApi {
    let mut spec = ApiDoc::openapi();
    spec.merge(health::HealthApi::openapi());
    spec.merge(translate::TranslateApi::openapi());
    spec.merge(tasks::TasksApi::openapi());
    spec
}

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state);

    let v1 = Router::new().merge(translate::router()).merge(tasks::router());

    let mut app = Router::new().merge(health::router()).nest("/v1", v1);

    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api_docs()));
    }

    app.layer(TraceLayer::new_for_http()).layer(cors).with_state(state)
}
