pub mod config;
pub mod error;
pub mod types;

pub use config::{ReachConfig, Settings};
pub use error::{FetchError, FetchResult};
