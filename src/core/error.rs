use thiserror::Error;

/// Failure of a single detail lookup attempt.
///
/// [`FetchError::MissingToken`] and [`FetchError::Page`] come from reading the
/// token and end the lookup before any request. The rest share one retry
/// budget and collapse into the same fallback badge once it is spent.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no LSD token found in page markup")]
    MissingToken,

    #[error("request failed: {status} {reason}")]
    HttpStatus { status: u16, reason: String },

    #[error("EU Total Reach not available in response")]
    ReachMissing,

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("page error: {0}")]
    Page(String),
}

impl FetchError {
    /// Short stable label for logs and the run report.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::MissingToken => "missing_token",
            FetchError::HttpStatus { .. } => "http_status",
            FetchError::ReachMissing => "reach_missing",
            FetchError::Transport(_) => "transport",
            FetchError::Decode(_) => "decode",
            FetchError::Page(_) => "page",
        }
    }
}

impl From<anyhow::Error> for FetchError {
    fn from(e: anyhow::Error) -> Self {
        FetchError::Page(e.to_string())
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
