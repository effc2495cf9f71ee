use crate::types::{Badge, BadgeKind};
use serde_json::Value;

pub const FALLBACK_TEXT: &str = "Non-EU / Unknown";

/// Render a reach value the way it reads on the page: strings unquoted,
/// numbers and everything else in their JSON form.
pub fn display_reach(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn success(value: &Value) -> Badge {
    Badge {
        kind: BadgeKind::Success,
        text: format!("EU Reach: {}", display_reach(value)),
    }
}

pub fn fallback() -> Badge {
    Badge {
        kind: BadgeKind::Fallback,
        text: FALLBACK_TEXT.to_string(),
    }
}
