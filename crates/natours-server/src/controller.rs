//! Tour operations behind the HTTP routes.
//!
//! Each operation talks to the store, then folds the outcome into a [`Reply`].
//! Store errors never escape: they become fail envelopes.

use crate::envelope::Reply;
use crate::metrics::{TOUR_OPS_TOTAL, TOUR_OP_SECONDS};
use axum::http::StatusCode;
use natours_core::{parse_tour_id, RawQuery, Result, TourError, TourInput, TourQuery};
use natours_storage::TourStore;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct TourController {
    store: Arc<dyn TourStore>,
}

impl TourController {
    pub fn new(store: Arc<dyn TourStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TourStore> {
        &self.store
    }

    pub async fn list(&self, raw: RawQuery) -> Reply {
        let _timer = TOUR_OP_SECONDS.with_label_values(&["list"]).start_timer();
        finish("list", self.try_list(raw).await)
    }

    pub async fn get_one(&self, id: &str) -> Reply {
        let _timer = TOUR_OP_SECONDS.with_label_values(&["get"]).start_timer();
        finish("get", self.try_get_one(id).await)
    }

    pub async fn create(&self, body: Result<JsonValue>) -> Reply {
        let _timer = TOUR_OP_SECONDS.with_label_values(&["create"]).start_timer();
        finish("create", self.try_create(body).await)
    }

    pub async fn update(&self, id: &str, body: Result<JsonValue>) -> Reply {
        let _timer = TOUR_OP_SECONDS.with_label_values(&["update"]).start_timer();
        finish("update", self.try_update(id, body).await)
    }

    pub async fn delete(&self, id: &str) -> Reply {
        let _timer = TOUR_OP_SECONDS.with_label_values(&["delete"]).start_timer();
        finish("delete", self.try_delete(id).await)
    }

    async fn try_list(&self, raw: RawQuery) -> Result<Reply> {
        let query = TourQuery::translate(&raw)?;
        debug!(filter = ?query.filter, sort = ?query.sort, page = ?query.page, "list tours");
        let tours = self.store.find(&query).await?;
        let docs: Vec<JsonValue> = tours
            .iter()
            .map(|t| query.projection.apply(t.to_document()))
            .collect();
        Ok(Reply::success(StatusCode::OK, json!({ "tours": docs })).with_results(docs.len()))
    }

    async fn try_get_one(&self, id: &str) -> Result<Reply> {
        let id = parse_tour_id(id)?;
        let tour = self.store.find_by_id(&id).await?.ok_or(TourError::NotFound)?;
        Ok(Reply::success(StatusCode::OK, json!({ "tour": public(tour.to_document()) })))
    }

    async fn try_create(&self, body: Result<JsonValue>) -> Result<Reply> {
        let input = TourInput::from_json(body?)?;
        let tour = self.store.create(input).await?;
        debug!(id = %tour.id, name = %tour.name, "tour created");
        Ok(Reply::success(
            StatusCode::CREATED,
            json!({ "tour": public(tour.to_document()) }),
        ))
    }

    async fn try_update(&self, id: &str, body: Result<JsonValue>) -> Result<Reply> {
        let id = parse_tour_id(id)?;
        let patch = TourInput::from_json(body?)?;
        let tour = self
            .store
            .update_by_id(&id, patch)
            .await?
            .ok_or(TourError::NotFound)?;
        Ok(Reply::success(StatusCode::OK, json!({ "tour": public(tour.to_document()) })))
    }

    async fn try_delete(&self, id: &str) -> Result<Reply> {
        let id = parse_tour_id(id)?;
        let removed = self.store.delete_by_id(&id).await?;
        debug!(%id, existed = removed.is_some(), "tour deleted");
        Ok(Reply::success(StatusCode::OK, JsonValue::Null))
    }
}

fn public(doc: JsonValue) -> JsonValue {
    natours_core::Projection::Default.apply(doc)
}

fn finish(op: &str, outcome: Result<Reply>) -> Reply {
    match outcome {
        Ok(reply) => {
            TOUR_OPS_TOTAL.with_label_values(&[op, "success"]).inc();
            reply
        }
        Err(err) => {
            TOUR_OPS_TOTAL.with_label_values(&[op, "fail"]).inc();
            warn!(op, kind = ?err.kind(), error = %err, "tour operation failed");
            Reply::fail(err)
        }
    }
}
