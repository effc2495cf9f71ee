//! The page surface the scanner, fetch loop and detail fetcher work against.
//!
//! * [`cdp::CdpAdPage`] drives a live Chromium tab over CDP.
//! * [`snapshot::SnapshotPage`] wraps static HTML parsed with `scraper`; it backs
//!   `--html` offline runs and the test suite.

pub mod cdp;
pub mod snapshot;

use crate::types::{Badge, BadgeKind, ContainerNode, ElementHandle, PageEvent, SessionCredentials};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Attribute marking an appended badge. Its presence is the idempotence test.
pub const BADGE_MARKER_ATTR: &str = "data-reach-scout-badge";
/// Attribute carrying the stable handle assigned to each scanned container.
pub const HANDLE_ATTR: &str = "data-reach-scout-handle";

#[async_trait]
pub trait AdPage: Send + Sync {
    /// Every element matching `div.<class_name>`, in document order.
    async fn query_containers(&self, class_name: &str) -> Result<Vec<ContainerNode>>;

    /// The document's serialized markup (`document.documentElement.innerHTML`).
    async fn raw_markup(&self) -> Result<String>;

    async fn session(&self) -> Result<SessionCredentials>;

    async fn has_badge(&self, element: &ElementHandle) -> Result<bool>;

    async fn append_badge(&self, element: &ElementHandle, badge: &Badge) -> Result<()>;

    /// Subscribe to mutation and trigger events. Each call yields a fresh receiver.
    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<PageEvent>>;

    /// Insert the on-page "fetch all" trigger button.
    async fn install_trigger(&self, label: &str) -> Result<()>;
}

/// Inline CSS for a badge of the given kind.
pub fn badge_style(kind: BadgeKind) -> &'static str {
    match kind {
        BadgeKind::Success => {
            "position:absolute;top:10px;right:10px;background:#ff5722;color:#fff;padding:5px 10px;border-radius:5px;z-index:1000;font-size:12px;font-weight:bold;"
        }
        BadgeKind::Fallback => {
            "position:absolute;top:10px;right:10px;background:#9e9e9e;color:#fff;padding:5px 10px;border-radius:5px;z-index:1000;font-size:12px;font-weight:bold;"
        }
    }
}

pub const TRIGGER_STYLE: &str = "position:fixed;top:20px;right:20px;z-index:9999;padding:10px 20px;background:#00c853;color:#fff;border:none;border-radius:5px;cursor:pointer;";
