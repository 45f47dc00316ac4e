pub mod api;
pub mod app;
pub mod cache;
pub mod chain;
pub mod config;
pub mod error;
pub mod refresh;
pub mod resolver;
pub mod sentiment;
pub mod testing; // Mock chain for unit and integration tests
pub mod trading;
pub mod types;
pub mod utils;

pub use app::Services;
pub use error::{DividendError, Result};
pub use types::{ChainReference, DividendRecord, RefreshStatus};
