use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-advertisement identifier shown as `Library ID: …` on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryId(String);

impl LibraryId {
    /// Returns `None` for a blank identifier.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, non-owning reference to an ad container on the live page.
/// The page may drop the element at any time; handles are not revalidated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementHandle(pub String);

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One ad tracked by the registry. Created on first sighting, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdEntry {
    pub library_id: LibraryId,
    pub element: ElementHandle,
}

/// Raw scan material for an element matching the container selector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerNode {
    pub handle: String,
    #[serde(default)]
    pub class_list: Vec<String>,
    /// `textContent` of every descendant `<span>`, document order.
    #[serde(default)]
    pub span_texts: Vec<String>,
}

/// Explicit authenticated-session material forwarded with every detail query.
#[derive(Debug, Clone, Default)]
pub struct SessionCredentials {
    /// Pre-rendered `Cookie:` header value from the browser jar.
    pub cookie_header: Option<String>,
    /// Page URL sent as `Referer`.
    pub referer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeKind {
    Success,
    Fallback,
}

/// Visual marker appended to an ad container on its terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub kind: BadgeKind,
    pub text: String,
}

/// Events raised by the page surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// A batch of child-list mutations under `document.body`.
    Mutated,
    /// The on-page trigger button was clicked.
    TriggerPressed,
}

/// Terminal result of a detail lookup for one Library ID.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetailOutcome {
    Reach {
        value: serde_json::Value,
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
        last_error: String,
    },
    NoToken,
}

impl DetailOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            DetailOutcome::Reach { attempts, .. } | DetailOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
            DetailOutcome::NoToken => 0,
        }
    }
}

/// One finished lookup, collected for the end-of-run report.
#[derive(Debug, Clone, Serialize)]
pub struct ReachRecord {
    pub library_id: LibraryId,
    pub outcome: DetailOutcome,
    pub finished_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Elements that passed the single-class fingerprint.
    pub candidates: usize,
    /// Library IDs appended to the registry by this pass.
    pub added: usize,
}

impl ScanReport {
    pub fn found_new(&self) -> bool {
        self.added > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoopReport {
    /// Another loop held the process flag; this trigger was dropped.
    AlreadyRunning,
    Finished {
        fetched: usize,
        skipped: usize,
        rescheduled: bool,
    },
}

/// JSON document printed by `--once`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub url: Option<String>,
    pub tracked: usize,
    pub records: Vec<ReachRecord>,
}
