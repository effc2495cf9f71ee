//! `AdLibraryAdDetailsV2Query` request building and response decoding.

use crate::core::config::Settings;
use crate::core::error::{FetchError, FetchResult};
use crate::types::{LibraryId, SessionCredentials};
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, REFERER};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

pub const FRIENDLY_NAME: &str = "AdLibraryAdDetailsV2Query";
/// JSON pointer of the EU Total Reach metric inside the response.
pub const REACH_POINTER: &str = "/data/ad_library_main/ad_details/aaa_info/eu_total_reach";
/// Anti-JSON-hijacking prefix some endpoints prepend when `__a=1`.
const HIJACK_PREFIX: &str = "for (;;);";

#[derive(Debug, Clone, Serialize)]
pub struct DetailVariables {
    #[serde(rename = "adArchiveID")]
    pub ad_archive_id: String,
    #[serde(rename = "pageID")]
    pub page_id: Option<String>,
    pub country: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub source: Option<String>,
    #[serde(rename = "isAdNonPolitical")]
    pub is_ad_non_political: bool,
    #[serde(rename = "isAdNotAAAEligible")]
    pub is_ad_not_aaa_eligible: bool,
    #[serde(rename = "__relay_internal__pv__AdLibraryFinservGraphQLGKrelayprovider")]
    pub finserv_provider: bool,
}

impl DetailVariables {
    /// Defaults for one lookup; `sessionID` is fresh per request.
    pub fn new(library_id: &LibraryId, country: &str) -> Self {
        Self {
            ad_archive_id: library_id.as_str().to_string(),
            page_id: None,
            country: country.to_string(),
            session_id: uuid::Uuid::new_v4().to_string(),
            source: None,
            is_ad_non_political: true,
            is_ad_not_aaa_eligible: false,
            finserv_provider: true,
        }
    }
}

/// Form-encoded body for the detail query.
pub fn form_body(doc_id: &str, lsd_token: &str, variables: &DetailVariables) -> FetchResult<String> {
    let variables = serde_json::to_string(variables)?;
    Ok(url::form_urlencoded::Serializer::new(String::new())
        .append_pair("av", "0")
        .append_pair("__user", "0")
        .append_pair("__a", "1")
        .append_pair("__comet_req", "1")
        .append_pair("fb_api_caller_class", "RelayModern")
        .append_pair("fb_api_req_friendly_name", FRIENDLY_NAME)
        .append_pair("lsd", lsd_token)
        .append_pair("doc_id", doc_id)
        .append_pair("variables", &variables)
        .finish())
}

/// Decode a response body, tolerating the hijack prefix and trailing
/// streamed payload lines.
pub fn parse_body(text: &str) -> FetchResult<Value> {
    let trimmed = text.trim_start();
    let trimmed = trimmed.strip_prefix(HIJACK_PREFIX).unwrap_or(trimmed);
    match serde_json::from_str(trimmed) {
        Ok(v) => Ok(v),
        Err(e) => {
            let first = trimmed.lines().next().unwrap_or_default();
            if first.len() < trimmed.len() {
                serde_json::from_str(first).map_err(FetchError::from)
            } else {
                Err(e.into())
            }
        }
    }
}

/// The reach metric, if present and non-null.
pub fn extract_reach(body: &Value) -> Option<Value> {
    body.pointer(REACH_POINTER)
        .filter(|v| !v.is_null())
        .cloned()
}

/// Single-attempt client for the detail endpoint.
#[derive(Clone)]
pub struct GraphqlClient {
    http: reqwest::Client,
    endpoint: String,
    doc_id: String,
    country: String,
}

impl GraphqlClient {
    pub fn new(http: reqwest::Client, settings: &Settings) -> Self {
        Self {
            http,
            endpoint: settings.endpoint.clone(),
            doc_id: settings.doc_id.clone(),
            country: settings.country.clone(),
        }
    }

    /// One POST. Non-2xx, undecodable bodies and an absent metric are all errors.
    pub async fn query_reach(
        &self,
        library_id: &LibraryId,
        lsd_token: &str,
        session: &SessionCredentials,
    ) -> FetchResult<Value> {
        let variables = DetailVariables::new(library_id, &self.country);
        let body = form_body(&self.doc_id, lsd_token, &variables)?;

        let mut req = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, "*/*")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("x-fb-friendly-name", FRIENDLY_NAME)
            .header("x-fb-lsd", lsd_token)
            .body(body);
        if let Some(referer) = session.referer.as_deref() {
            req = req.header(REFERER, referer);
        }
        if let Some(cookies) = session.cookie_header.as_deref() {
            req = req.header(COOKIE, cookies);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let text = response.text().await?;
        let data = parse_body(&text)?;
        match extract_reach(&data) {
            Some(reach) => Ok(reach),
            None => {
                warn!("Library ID {} | EU Total Reach not available", library_id);
                debug!("Full response: {}", data);
                Err(FetchError::ReachMissing)
            }
        }
    }
}
