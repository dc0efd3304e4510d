use crate::{FileStore, InMemoryStore, TourStore};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_DATABASE: &str = "memory://";

/// Where tours live, parsed from a connection string:
/// `memory://`, `file://<dir>`, or a bare directory path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("unsupported database scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("empty database path")]
    EmptyPath,
    #[error("cannot open store at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FromStr for StoreLocation {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "memory" || s == "memory://" {
            return Ok(StoreLocation::Memory);
        }
        if let Some(path) = s.strip_prefix("file://") {
            if path.is_empty() {
                return Err(ConnectError::EmptyPath);
            }
            return Ok(StoreLocation::File(PathBuf::from(path)));
        }
        if let Some((scheme, _)) = s.split_once("://") {
            return Err(ConnectError::UnsupportedScheme(scheme.to_string()));
        }
        Ok(StoreLocation::File(PathBuf::from(s)))
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::Memory => f.write_str(DEFAULT_DATABASE),
            StoreLocation::File(p) => write!(f, "file://{}", p.display()),
        }
    }
}

impl StoreLocation {
    /// Opens the store once; the handle is shared by every caller.
    pub fn open(&self) -> Result<Arc<dyn TourStore>, ConnectError> {
        let store: Arc<dyn TourStore> = match self {
            StoreLocation::Memory => Arc::new(InMemoryStore::new()),
            StoreLocation::File(dir) => {
                Arc::new(FileStore::open(dir).map_err(|source| ConnectError::Open {
                    path: dir.clone(),
                    source,
                })?)
            }
        };
        info!(location = %self, backend = store.backend(), "store connected");
        Ok(store)
    }
}
