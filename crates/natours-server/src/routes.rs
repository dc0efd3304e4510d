use crate::controller::TourController;
use crate::envelope::Reply;
use crate::metrics;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use natours_core::{nest_query_pairs, TourError};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub tours: Arc<TourController>,
}

/// Full application router: tour routes at `/tours` and `/api/v1/tours`,
/// plus health and metrics.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .merge(tour_routes())
        .nest("/api/v1", tour_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

fn tour_routes() -> Router<AppState> {
    Router::new()
        .route("/tours", get(list_tours).post(create_tour))
        .route(
            "/tours/:id",
            get(get_tour).patch(update_tour).delete(delete_tour),
        )
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_text() -> impl IntoResponse {
    (StatusCode::OK, metrics::render())
}

async fn list_tours(
    State(app): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Reply {
    match query {
        Ok(Query(pairs)) => app.tours.list(nest_query_pairs(pairs)).await,
        Err(rej) => Reply::fail(TourError::MalformedFilter(rej.body_text())),
    }
}

async fn get_tour(State(app): State<AppState>, Path(id): Path<String>) -> Reply {
    app.tours.get_one(&id).await
}

async fn create_tour(
    State(app): State<AppState>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> Reply {
    app.tours.create(body_value(body)).await
}

async fn update_tour(
    State(app): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> Reply {
    app.tours.update(&id, body_value(body)).await
}

async fn delete_tour(State(app): State<AppState>, Path(id): Path<String>) -> Reply {
    app.tours.delete(&id).await
}

fn body_value(body: Result<Json<JsonValue>, JsonRejection>) -> natours_core::Result<JsonValue> {
    body.map(|Json(v)| v)
        .map_err(|rej| TourError::InvalidBody(rej.body_text()))
}
