use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use natours_core::{ErrorKind, TourError};
use serde::Serialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Fail,
}

/// Body shape shared by every tour endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    pub data: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

/// HTTP status plus envelope.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Envelope,
}

impl Reply {
    pub fn success(status: StatusCode, data: JsonValue) -> Self {
        Self {
            status,
            body: Envelope {
                status: Status::Success,
                results: None,
                data,
                message: None,
                kind: None,
            },
        }
    }

    pub fn with_results(mut self, n: usize) -> Self {
        self.body.results = Some(n);
        self
    }

    pub fn fail(err: TourError) -> Self {
        let kind = err.kind();
        Self {
            status: status_for(kind),
            body: Envelope {
                status: Status::Fail,
                results: None,
                data: JsonValue::Null,
                message: Some(err.to_string()),
                kind: Some(kind),
            },
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::MalformedFilter => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Duplicate => StatusCode::CONFLICT,
        ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
