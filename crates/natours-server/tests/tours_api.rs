use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use natours_server::app_with_store;
use natours_core::{Result as TourResult, Tour, TourError, TourInput, TourQuery};
use natours_storage::{FileStore, InMemoryStore, TourStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn memory_app() -> Router {
    app_with_store(Arc::new(InMemoryStore::new()))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn tour(name: &str, duration: u32, price: u32, difficulty: &str, created: &str) -> Value {
    json!({
        "name": name,
        "duration": duration,
        "maxGroupSize": 10,
        "difficulty": difficulty,
        "price": price,
        "summary": "A tour worth taking",
        "imageCover": "cover.jpg",
        "createdAt": created
    })
}

async fn seed(app: &Router) -> Vec<String> {
    let mut ids = Vec::new();
    for body in [
        tour("The Forest Hiker", 5, 397, "easy", "2024-01-01T00:00:00Z"),
        tour("The Sea Explorer", 7, 497, "medium", "2024-02-01T00:00:00Z"),
        tour("The Snow Adventurer", 4, 997, "difficult", "2024-03-01T00:00:00Z"),
        tour("The Park Camper", 10, 1497, "easy", "2024-04-01T00:00:00Z"),
    ] {
        let (status, v) = call(app, Method::POST, "/tours", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{v}");
        ids.push(v["data"]["tour"]["id"].as_str().unwrap().to_string());
    }
    ids
}

fn names(v: &Value) -> Vec<String> {
    v["data"]["tours"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn list_without_query_is_newest_first() {
    let app = memory_app();
    seed(&app).await;
    let (status, v) = call(&app, Method::GET, "/tours", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "success");
    assert_eq!(v["results"], 4);
    assert_eq!(
        names(&v),
        [
            "The Park Camper",
            "The Snow Adventurer",
            "The Sea Explorer",
            "The Forest Hiker"
        ]
    );
    assert!(v["data"]["tours"][0].get("createdAt").is_none());
}

#[tokio::test]
async fn list_with_operators_and_sort() {
    let app = memory_app();
    seed(&app).await;
    let (status, v) = call(
        &app,
        Method::GET,
        "/tours?duration%5Bgte%5D=5&difficulty=easy&sort=-price,name",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&v), ["The Park Camper", "The Forest Hiker"]);

    let (_, v) = call(&app, Method::GET, "/api/v1/tours?price%5Blt%5D=1000&sort=price", None).await;
    assert_eq!(
        names(&v),
        ["The Forest Hiker", "The Sea Explorer", "The Snow Adventurer"]
    );
}

#[tokio::test]
async fn list_pages_and_projects() {
    let app = memory_app();
    seed(&app).await;
    let (_, v) = call(
        &app,
        Method::GET,
        "/tours?sort=price&limit=2&page=2&fields=name,price",
        None,
    )
    .await;
    assert_eq!(v["results"], 2);
    assert_eq!(names(&v), ["The Snow Adventurer", "The Park Camper"]);
    let first = v["data"]["tours"][0].as_object().unwrap();
    assert_eq!(first.len(), 3);
    assert!(first.contains_key("id"));
}

#[tokio::test]
async fn malformed_filter_is_a_fail_envelope() {
    let app = memory_app();
    seed(&app).await;
    for uri in [
        "/tours?duration%5Bgte%5D=long",
        "/tours?difficulty=easy&difficulty=medium",
        "/tours?duration%5Bapprox%5D=5",
        "/tours?limit=-1",
    ] {
        let (status, v) = call(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(v["status"], "fail");
        assert_eq!(v["kind"], "malformed_filter", "{uri}");
    }
}

#[tokio::test]
async fn crud_round_trip() {
    let app = memory_app();
    let body = json!({
        "name": "The Wine Taster",
        "duration": 5,
        "maxGroupSize": 8,
        "difficulty": "easy",
        "price": 1997,
        "priceDiscount": 200,
        "summary": "Exquisite wines",
        "description": "A slow tour through the vineyards",
        "imageCover": "tour-4-cover.jpg",
        "images": ["tour-4-1.jpg"],
        "startDates": ["2021-02-12T10:00:00Z"]
    });
    let (status, created) = call(&app, Method::POST, "/tours", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["tour"]["id"].as_str().unwrap().to_string();

    let (status, got) = call(&app, Method::GET, &format!("/tours/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let got = &got["data"]["tour"];
    for (k, v) in body.as_object().unwrap() {
        assert_eq!(&got[k], v, "field {k}");
    }
    assert_eq!(got["ratingAverage"], 4.5);

    let (_, naive) = call(
        &app,
        Method::POST,
        "/tours",
        Some(json!({
            "name": "The City Wanderer",
            "duration": 9,
            "maxGroupSize": 20,
            "difficulty": "easy",
            "price": 1197,
            "summary": "Living the life of Wanderlust in the US",
            "imageCover": "tour-6-cover.jpg",
            "startDates": ["2021-03-11", "2021-05-02,10:00", "2021-06-19T09:00:00+02:00"]
        })),
    )
    .await;
    assert_eq!(
        naive["data"]["tour"]["startDates"],
        json!([
            "2021-03-11T00:00:00Z",
            "2021-05-02T10:00:00Z",
            "2021-06-19T07:00:00Z"
        ])
    );

    let (status, updated) = call(
        &app,
        Method::PATCH,
        &format!("/tours/{id}"),
        Some(json!({"price": 1500, "difficulty": "medium"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["tour"]["price"], 1500);
    assert_eq!(updated["data"]["tour"]["difficulty"], "medium");
    assert_eq!(updated["data"]["tour"]["name"], "The Wine Taster");

    let (status, rejected) = call(
        &app,
        Method::PATCH,
        &format!("/tours/{id}"),
        Some(json!({"difficulty": "brutal"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(rejected["kind"], "validation");

    let (status, deleted) = call(&app, Method::DELETE, &format!("/tours/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted, json!({"status": "success", "data": null}));

    let (status, again) = call(&app, Method::DELETE, &format!("/tours/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again, deleted);

    let (status, missing) = call(&app, Method::GET, &format!("/tours/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(missing["kind"], "not_found");
    assert_eq!(missing["data"], Value::Null);
}

#[tokio::test]
async fn create_failures() {
    let app = memory_app();
    let mut body = tour("The Forest Hiker", 5, 397, "easy", "2024-01-01T00:00:00Z");
    body.as_object_mut().unwrap().remove("price");
    let (status, v) = call(&app, Method::POST, "/tours", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["status"], "fail");
    assert!(v["message"]
        .as_str()
        .unwrap()
        .contains("price: A tour must have a price"));

    let (_, v) = call(&app, Method::GET, "/tours", None).await;
    assert_eq!(v["results"], 0);

    let ok = tour("The Forest Hiker", 5, 397, "easy", "2024-01-01T00:00:00Z");
    call(&app, Method::POST, "/tours", Some(ok.clone())).await;
    let (status, v) = call(&app, Method::POST, "/tours", Some(ok)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(v["kind"], "duplicate");

    let req = Request::builder()
        .method(Method::POST)
        .uri("/tours")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v: Value = serde_json::from_slice(&to_bytes(resp.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(v["kind"], "validation");
}

#[tokio::test]
async fn malformed_id_is_rejected() {
    let app = memory_app();
    let (status, v) = call(&app, Method::GET, "/tours/42", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["kind"], "validation");
    let (status, _) = call(&app, Method::DELETE, "/tours/42", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_and_metrics() {
    let app = memory_app();
    seed(&app).await;
    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
    assert!(text.contains("tour_ops_total"));
}

#[tokio::test]
async fn file_store_keeps_tours_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let ids = {
        let app = app_with_store(Arc::new(FileStore::open(dir.path()).unwrap()));
        seed(&app).await
    };
    let app = app_with_store(Arc::new(FileStore::open(dir.path()).unwrap()));
    let (_, v) = call(&app, Method::GET, "/tours", None).await;
    assert_eq!(v["results"], 4);
    let (status, v) = call(&app, Method::GET, &format!("/tours/{}", ids[0]), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["data"]["tour"]["name"], "The Forest Hiker");
}

/// Reads succeed with nothing stored; every write fails as a broken journal would.
struct UnavailableStore;

fn journal_down() -> TourError {
    TourError::StoreUnavailable("journal write failed: Bad file descriptor".into())
}

#[async_trait::async_trait]
impl TourStore for UnavailableStore {
    async fn find(&self, _query: &TourQuery) -> TourResult<Vec<Tour>> {
        Ok(Vec::new())
    }
    async fn find_by_id(&self, _id: &str) -> TourResult<Option<Tour>> {
        Ok(None)
    }
    async fn create(&self, _input: TourInput) -> TourResult<Tour> {
        Err(journal_down())
    }
    async fn create_many(&self, _inputs: Vec<TourInput>) -> TourResult<Vec<Tour>> {
        Err(journal_down())
    }
    async fn update_by_id(&self, _id: &str, _patch: TourInput) -> TourResult<Option<Tour>> {
        Err(journal_down())
    }
    async fn delete_by_id(&self, _id: &str) -> TourResult<Option<Tour>> {
        Err(journal_down())
    }
    async fn delete_all(&self) -> TourResult<u64> {
        Err(journal_down())
    }
    async fn count(&self) -> TourResult<usize> {
        Ok(0)
    }
    fn backend(&self) -> &'static str {
        "unavailable"
    }
}

#[tokio::test]
async fn store_write_failure_is_service_unavailable() {
    let app = app_with_store(Arc::new(UnavailableStore));
    let body = tour("The Forest Hiker", 5, 397, "easy", "2024-01-01T00:00:00Z");
    let (status, v) = call(&app, Method::POST, "/tours", Some(body)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(v["status"], "fail");
    assert_eq!(v["kind"], "store_unavailable");
    assert_eq!(v["data"], Value::Null);

    let id = natours_core::new_tour_id();
    let (status, v) = call(&app, Method::DELETE, &format!("/tours/{id}"), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(v["kind"], "store_unavailable");
}
