use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Coarse classification used by transports to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    MalformedFilter,
    NotFound,
    Duplicate,
    StoreUnavailable,
    Internal,
}

/// Per-field validation failures, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    pub fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(TourError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tour validation failed: ")?;
        for (i, (field, msg)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field, msg)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum TourError {
    #[error("{0}")]
    Validation(ValidationErrors),
    #[error("invalid id: {0}")]
    InvalidId(String),
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("malformed filter: {0}")]
    MalformedFilter(String),
    #[error("no tour found with that id")]
    NotFound,
    #[error("duplicate key: a tour named {0:?} already exists")]
    Duplicate(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl TourError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TourError::Validation(_) | TourError::InvalidId(_) | TourError::InvalidBody(_) => {
                ErrorKind::Validation
            }
            TourError::MalformedFilter(_) => ErrorKind::MalformedFilter,
            TourError::NotFound => ErrorKind::NotFound,
            TourError::Duplicate(_) => ErrorKind::Duplicate,
            TourError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            TourError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Single-field validation failure.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let mut errs = ValidationErrors::default();
        errs.add(field, message);
        TourError::Validation(errs)
    }
}

pub type Result<T> = std::result::Result<T, TourError>;
