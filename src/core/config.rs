use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ReachConfig — file-based config loader (reach-scout.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const DEFAULT_START_URL: &str = "https://www.facebook.com/ads/library/?active_status=all&ad_type=all&country=ALL&media_type=all";
pub const DEFAULT_ENDPOINT: &str = "https://www.facebook.com/api/graphql/";
/// Persisted query id of `AdLibraryAdDetailsV2Query`.
pub const DEFAULT_DOC_ID: &str = "9050728085032276";
pub const DEFAULT_CONTAINER_CLASS: &str = "xh8yej3";
pub const DEFAULT_ID_LABEL: &str = "Library ID:";

pub const ENV_CONFIG_PATH: &str = "REACH_SCOUT_CONFIG";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

/// Top-level config loaded from `reach-scout.json`. Every field is optional;
/// see the `resolve_*` helpers for the env-var and default fallbacks.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct ReachConfig {
    /// Ad Library page opened at startup.
    pub start_url: Option<String>,
    /// GraphQL endpoint receiving the detail query.
    pub endpoint: Option<String>,
    pub doc_id: Option<String>,
    /// `country` variable sent with every detail query. Default: `ALL`.
    pub country: Option<String>,
    /// Total attempts per Library ID (first try included). Default: 3.
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    /// Randomized pause before each lookup is drawn from `[pacing_min_ms, pacing_max_ms)`.
    pub pacing_min_ms: Option<u64>,
    pub pacing_max_ms: Option<u64>,
    /// Wait after a mutation batch before the fetch loop starts.
    pub settle_delay_ms: Option<u64>,
    /// Wait before a follow-up loop when entries were added mid-run.
    pub recheck_delay_ms: Option<u64>,
    pub container_class: Option<String>,
    pub id_label: Option<String>,
    pub headless: Option<bool>,
    pub http_timeout_secs: Option<u64>,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    let v = env_string(key)?.to_ascii_lowercase();
    match v.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_blank(v: &Option<String>) -> Option<String> {
    v.as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl ReachConfig {
    /// Start URL: JSON field → `REACH_SCOUT_URL` → Ad Library (country=ALL).
    pub fn resolve_start_url(&self) -> String {
        non_blank(&self.start_url)
            .or_else(|| env_string("REACH_SCOUT_URL"))
            .unwrap_or_else(|| DEFAULT_START_URL.to_string())
    }

    /// Endpoint: JSON field → `REACH_SCOUT_ENDPOINT` → public GraphQL endpoint.
    pub fn resolve_endpoint(&self) -> String {
        non_blank(&self.endpoint)
            .or_else(|| env_string("REACH_SCOUT_ENDPOINT"))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    pub fn resolve_doc_id(&self) -> String {
        non_blank(&self.doc_id)
            .or_else(|| env_string("REACH_SCOUT_DOC_ID"))
            .unwrap_or_else(|| DEFAULT_DOC_ID.to_string())
    }

    pub fn resolve_country(&self) -> String {
        non_blank(&self.country)
            .or_else(|| env_string("REACH_SCOUT_COUNTRY"))
            .unwrap_or_else(|| "ALL".to_string())
    }

    /// Retry budget: JSON field → `REACH_SCOUT_MAX_RETRIES` → 3. Never below 1.
    pub fn resolve_max_retries(&self) -> u32 {
        self.max_retries
            .or_else(|| env_parse("REACH_SCOUT_MAX_RETRIES"))
            .unwrap_or(3)
            .max(1)
    }

    pub fn resolve_retry_delay(&self) -> Duration {
        let ms = self
            .retry_delay_ms
            .or_else(|| env_parse("REACH_SCOUT_RETRY_DELAY_MS"))
            .unwrap_or(2000);
        Duration::from_millis(ms)
    }

    /// Pacing window `(min, max)`. A reversed window is swapped.
    pub fn resolve_pacing(&self) -> (Duration, Duration) {
        let min = self
            .pacing_min_ms
            .or_else(|| env_parse("REACH_SCOUT_PACING_MIN_MS"))
            .unwrap_or(1000);
        let max = self
            .pacing_max_ms
            .or_else(|| env_parse("REACH_SCOUT_PACING_MAX_MS"))
            .unwrap_or(3000);
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        (Duration::from_millis(lo), Duration::from_millis(hi))
    }

    pub fn resolve_settle_delay(&self) -> Duration {
        let ms = self
            .settle_delay_ms
            .or_else(|| env_parse("REACH_SCOUT_SETTLE_DELAY_MS"))
            .unwrap_or(1000);
        Duration::from_millis(ms)
    }

    pub fn resolve_recheck_delay(&self) -> Duration {
        let ms = self
            .recheck_delay_ms
            .or_else(|| env_parse("REACH_SCOUT_RECHECK_DELAY_MS"))
            .unwrap_or(1000);
        Duration::from_millis(ms)
    }

    pub fn resolve_container_class(&self) -> String {
        non_blank(&self.container_class).unwrap_or_else(|| DEFAULT_CONTAINER_CLASS.to_string())
    }

    pub fn resolve_id_label(&self) -> String {
        non_blank(&self.id_label).unwrap_or_else(|| DEFAULT_ID_LABEL.to_string())
    }

    pub fn resolve_headless(&self) -> bool {
        self.headless
            .or_else(|| env_flag("REACH_SCOUT_HEADLESS"))
            .unwrap_or(true)
    }

    pub fn resolve_http_timeout(&self) -> Duration {
        let secs = self
            .http_timeout_secs
            .or_else(|| env_parse("HTTP_TIMEOUT_SECS"))
            .unwrap_or(30);
        Duration::from_secs(secs)
    }

    /// Flatten every field into a [`Settings`] value.
    pub fn settings(&self) -> Settings {
        let (pacing_min, pacing_max) = self.resolve_pacing();
        Settings {
            endpoint: self.resolve_endpoint(),
            doc_id: self.resolve_doc_id(),
            country: self.resolve_country(),
            max_retries: self.resolve_max_retries(),
            retry_delay: self.resolve_retry_delay(),
            pacing_min,
            pacing_max,
            settle_delay: self.resolve_settle_delay(),
            recheck_delay: self.resolve_recheck_delay(),
            container_class: self.resolve_container_class(),
            id_label: self.resolve_id_label(),
        }
    }
}

/// Resolved runtime knobs shared by the scanner, fetch loop and detail fetcher.
#[derive(Clone, Debug)]
pub struct Settings {
    pub endpoint: String,
    pub doc_id: String,
    pub country: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub pacing_min: Duration,
    pub pacing_max: Duration,
    pub settle_delay: Duration,
    pub recheck_delay: Duration,
    pub container_class: String,
    pub id_label: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            doc_id: DEFAULT_DOC_ID.to_string(),
            country: "ALL".to_string(),
            max_retries: 3,
            retry_delay: Duration::from_millis(2000),
            pacing_min: Duration::from_millis(1000),
            pacing_max: Duration::from_millis(3000),
            settle_delay: Duration::from_millis(1000),
            recheck_delay: Duration::from_millis(1000),
            container_class: DEFAULT_CONTAINER_CLASS.to_string(),
            id_label: DEFAULT_ID_LABEL.to_string(),
        }
    }
}

/// Load `reach-scout.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `explicit` path (the `--config` flag), then `REACH_SCOUT_CONFIG`
/// 2. `./reach-scout.json`
/// 3. `../reach-scout.json`
///
/// Missing file → `ReachConfig::default()` (silent, all env-var fallbacks apply).
/// Parse error → log a warning, return `ReachConfig::default()`.
pub fn load_reach_config(explicit: Option<&Path>) -> ReachConfig {
    let mut candidates: Vec<PathBuf> = vec![
        PathBuf::from("reach-scout.json"),
        PathBuf::from("../reach-scout.json"),
    ];
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }
    if let Some(p) = explicit {
        candidates.insert(0, p.to_path_buf());
    }

    for path in &candidates {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        return match parse_reach_config(&contents) {
            Ok(cfg) => {
                tracing::info!("reach-scout.json loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    "reach-scout.json parse error at {}: {} — using defaults",
                    path.display(),
                    e
                );
                ReachConfig::default()
            }
        };
    }

    ReachConfig::default()
}

pub fn parse_reach_config(contents: &str) -> Result<ReachConfig, serde_json::Error> {
    serde_json::from_str(contents)
}

/// Optional override for the Chromium-family browser executable.
///
/// Only returns a value when `CHROME_EXECUTABLE` is set to an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}
