pub mod errors;
pub mod model;
pub mod query;

pub use errors::*;
pub use model::*;
pub use query::*;
