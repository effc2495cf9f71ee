use regex::Regex;
use std::sync::OnceLock;

static LSD_PATTERN: OnceLock<Regex> = OnceLock::new();

fn lsd_pattern() -> &'static Regex {
    LSD_PATTERN.get_or_init(|| {
        Regex::new(r#""LSD",\[\],\{"token":"([^"]+)""#).expect("valid LSD token pattern")
    })
}

/// Pull the LSD session token out of the page's embedded bootstrap markup.
pub fn extract_lsd_token(markup: &str) -> Option<String> {
    lsd_pattern()
        .captures(markup)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
