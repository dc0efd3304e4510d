pub mod connect;
pub mod eval;
pub mod journal;
pub mod mem;
pub mod persistent;
pub mod traits;

pub use connect::{ConnectError, StoreLocation, DEFAULT_DATABASE};
pub use mem::InMemoryStore;
pub use persistent::FileStore;
pub use traits::*;
