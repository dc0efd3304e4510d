pub mod config;
pub mod controller;
pub mod envelope;
pub mod metrics;
pub mod routes;

pub use config::{Config, ConfigError};
pub use controller::TourController;
pub use envelope::{Envelope, Reply, Status};
pub use routes::{app, AppState};

use natours_storage::TourStore;
use std::sync::Arc;

/// Router wired to an already opened store.
pub fn app_with_store(store: Arc<dyn TourStore>) -> axum::Router {
    app(AppState {
        tours: Arc::new(TourController::new(store)),
    })
}
