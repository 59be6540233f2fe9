use crate::state::AppState;
use crate::{api, logging, middleware as mw};
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "statmon API",
        description = "Metric collection and query endpoints",
    ),
    paths(
        api::update_batch,
        api::update_one,
        api::update_path,
        api::value_query,
        api::value_path,
        api::values_dump,
        api::ping,
    ),
    tags(
        (name = "Update", description = "Metric submission"),
        (name = "Value", description = "Metric queries"),
        (name = "Health", description = "Liveness")
    )
)]
struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn build_http_app(state: AppState) -> Router {
    // Only the batch body is ever encrypted; the decrypt layer sits on
    // that one route.
    let batch_routes = Router::new()
        .route("/updates/", post(api::update_batch))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            mw::rsa_decrypt,
        ));

    let update_routes = Router::new()
        .route("/update/", post(api::update_one))
        .route("/update/{kind}/{id}/{value}", post(api::update_path))
        .merge(batch_routes)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            mw::trusted_subnet,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/value/", post(api::value_query))
        .route("/value/{kind}/{id}", get(api::value_path))
        .route("/values/", get(api::values_dump))
        .route("/ping", get(api::ping))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(update_routes)
        .with_state(state)
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging))
}
