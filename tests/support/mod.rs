//! Shared fixtures: a local GraphQL mock and Ad Library markup builders.
#![allow(dead_code)]

use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Router};
use reach_scout::{DetailFetcher, GraphqlClient, Settings};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TOKEN: &str = "AVqTestLsd_42";

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Clone, Copy, Debug)]
pub enum Mode {
    /// 200 with `eu_total_reach = adArchiveID * 10`.
    Reach,
    /// Always this status, empty body.
    Status(u16),
    /// 200 with the `aaa_info` object but no reach field.
    NoField,
}

#[derive(Clone, Debug)]
pub struct SeenRequest {
    pub headers: HeaderMap,
    pub form: Vec<(String, String)>,
}

impl SeenRequest {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn variables(&self) -> Value {
        serde_json::from_str(self.field("variables").unwrap_or("null")).unwrap_or(Value::Null)
    }
}

#[derive(Clone)]
pub struct MockGraphql {
    mode: Mode,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockGraphql {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

async fn graphql(
    State(mock): State<MockGraphql>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    mock.calls.fetch_add(1, Ordering::SeqCst);
    let now = mock.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    mock.max_in_flight.fetch_max(now, Ordering::SeqCst);

    let form: Vec<(String, String)> = url::form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect();
    let seen = SeenRequest { headers, form };
    let ad_id: u64 = seen.variables()["adArchiveID"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    mock.seen.lock().unwrap().push(seen);

    if !mock.delay.is_zero() {
        tokio::time::sleep(mock.delay).await;
    }
    mock.in_flight.fetch_sub(1, Ordering::SeqCst);

    match mock.mode {
        Mode::Reach => (
            StatusCode::OK,
            json!({"data": {"ad_library_main": {"ad_details": {"aaa_info": {"eu_total_reach": ad_id * 10}}}}})
                .to_string(),
        ),
        Mode::NoField => (
            StatusCode::OK,
            json!({"data": {"ad_library_main": {"ad_details": {"aaa_info": {}}}}}).to_string(),
        ),
        Mode::Status(code) => (
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            String::new(),
        ),
    }
}

/// Serve the mock on an ephemeral port; returns the endpoint URL.
pub async fn spawn_mock(mode: Mode, delay: Duration) -> (MockGraphql, String) {
    let mock = MockGraphql {
        mode,
        delay,
        calls: Arc::new(AtomicUsize::new(0)),
        in_flight: Arc::new(AtomicUsize::new(0)),
        max_in_flight: Arc::new(AtomicUsize::new(0)),
        seen: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/api/graphql/", post(graphql))
        .with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (mock, format!("http://{}/api/graphql/", addr))
}

/// Millisecond-scale delays so loops finish quickly.
pub fn fast_settings(endpoint: &str) -> Settings {
    Settings {
        endpoint: endpoint.to_string(),
        max_retries: 3,
        retry_delay: Duration::from_millis(5),
        pacing_min: Duration::from_millis(0),
        pacing_max: Duration::from_millis(3),
        settle_delay: Duration::from_millis(10),
        recheck_delay: Duration::from_millis(10),
        ..Settings::default()
    }
}

pub fn fetcher(settings: &Settings) -> DetailFetcher {
    let http = reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    DetailFetcher::new(GraphqlClient::new(http, settings), settings)
}

/// A card as the Ad Library renders it: one class, the ID in a nested span.
pub fn ad_card(id: &str) -> String {
    format!(
        r#"<div class="xh8yej3"><div class="x1"><span>Active</span><span class="x8t9es0">Library ID: {}</span></div></div>"#,
        id
    )
}

pub fn ad_card_with_badge(id: &str) -> String {
    format!(
        r#"<div class="xh8yej3"><span>Library ID: {}</span><div data-reach-scout-badge="true">EU Reach: 1</div></div>"#,
        id
    )
}

pub fn page_html(cards: &[String], with_token: bool) -> String {
    let script = if with_token {
        format!(
            r#"<script>requireLazy(["ServerJS"],function(){{["LSD",[],{{"token":"{}"}},323]}})</script>"#,
            TOKEN
        )
    } else {
        String::new()
    };
    format!(
        "<html><head>{}</head><body><div class=\"xh8yej3 wrapper\">{}</div></body></html>",
        script,
        cards.concat()
    )
}

/// Poll `cond` every 10 ms for up to 5 s.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
