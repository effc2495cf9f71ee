pub mod ads;
pub mod controller;
pub mod core;
pub mod fetch;
pub mod page;
pub mod scraping;

// --- Primary core exports ---
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::{FetchError, ReachConfig, Settings};

pub use controller::Controller;
pub use fetch::{DetailFetcher, GraphqlClient};
pub use page::{cdp::CdpAdPage, snapshot::SnapshotPage, AdPage};
pub use scraping::browser_manager;
