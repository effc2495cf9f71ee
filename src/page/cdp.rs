//! Live page surface over a Chromium tab (`chromiumoxide`).
//!
//! DOM reads and writes go through `Runtime.evaluate`. Change events flow back
//! through a single `Runtime.addBinding` function: the injected
//! `MutationObserver` calls it with `"mutated"`, the trigger button with
//! `"trigger"`.

use super::{badge_style, AdPage, BADGE_MARKER_ATTR, HANDLE_ATTR, TRIGGER_STYLE};
use crate::types::{Badge, ContainerNode, ElementHandle, PageEvent, SessionCredentials};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const BINDING_NAME: &str = "reachScoutEvent";

/// Quote a string as a JS (and CSS) string literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn observer_script() -> String {
    format!(
        r#"(() => {{
    if (window.__reachScoutObserver || !document.body) return false;
    window.__reachScoutObserver = new MutationObserver(() => {{
        if (typeof window.{binding} === 'function') window.{binding}('mutated');
    }});
    window.__reachScoutObserver.observe(document.body, {{ childList: true, subtree: true }});
    return true;
}})()"#,
        binding = BINDING_NAME
    )
}

/// Re-arms the observer after every navigation once `<body>` exists.
fn bootstrap_script() -> String {
    format!(
        "document.addEventListener('DOMContentLoaded', () => {{ {} }});",
        observer_script()
    )
}

fn query_script(class_name: &str) -> String {
    format!(
        r#"(() => {{
    let next = window.__reachScoutNextHandle || 0;
    const out = [];
    document.querySelectorAll('div.' + CSS.escape({cls})).forEach(div => {{
        let h = div.getAttribute('{attr}');
        if (!h) {{
            h = 'cdp-' + (next++);
            div.setAttribute('{attr}', h);
        }}
        out.push({{
            handle: h,
            class_list: Array.from(div.classList),
            span_texts: Array.from(div.querySelectorAll('span')).map(s => s.textContent || ''),
        }});
    }});
    window.__reachScoutNextHandle = next;
    return out;
}})()"#,
        cls = js_str(class_name),
        attr = HANDLE_ATTR
    )
}

fn element_expr(element: &ElementHandle) -> String {
    format!(
        "document.querySelector('[{}=' + {} + ']')",
        HANDLE_ATTR,
        js_str(&js_str(&element.0))
    )
}

fn has_badge_script(element: &ElementHandle) -> String {
    format!(
        "(() => {{ const el = {}; return !!(el && el.querySelector('[{}]')); }})()",
        element_expr(element),
        BADGE_MARKER_ATTR
    )
}

fn append_badge_script(element: &ElementHandle, badge: &Badge) -> String {
    format!(
        r#"(() => {{
    const el = {el};
    if (!el) return false;
    const badge = document.createElement('div');
    badge.innerText = {text};
    badge.style.cssText = {style};
    badge.setAttribute('{marker}', 'true');
    el.style.position = 'relative';
    el.appendChild(badge);
    return true;
}})()"#,
        el = element_expr(element),
        text = js_str(&badge.text),
        style = js_str(badge_style(badge.kind)),
        marker = BADGE_MARKER_ATTR
    )
}

fn trigger_script(label: &str) -> String {
    format!(
        r#"(() => {{
    if (document.querySelector('[data-reach-scout-trigger]')) return false;
    const btn = document.createElement('button');
    btn.innerText = {label};
    btn.style.cssText = {style};
    btn.setAttribute('data-reach-scout-trigger', 'true');
    btn.onclick = () => {{
        if (typeof window.{binding} === 'function') window.{binding}('trigger');
    }};
    document.body.appendChild(btn);
    return true;
}})()"#,
        label = js_str(label),
        style = js_str(TRIGGER_STYLE),
        binding = BINDING_NAME
    )
}

fn event_for_payload(payload: &str) -> Option<PageEvent> {
    match payload {
        "mutated" => Some(PageEvent::Mutated),
        "trigger" => Some(PageEvent::TriggerPressed),
        _ => None,
    }
}

fn cookie_header<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> Option<String> {
    let joined = pairs
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

#[derive(Clone)]
pub struct CdpAdPage {
    page: Page,
}

impl CdpAdPage {
    /// Register the event binding and arm the mutation observer on `page`.
    pub async fn attach(page: Page) -> Result<Self> {
        page.execute(AddBindingParams::new(BINDING_NAME))
            .await
            .map_err(|e| anyhow!("Failed to add page binding: {}", e))?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            bootstrap_script(),
        ))
        .await
        .map_err(|e| anyhow!("Failed to register observer bootstrap: {}", e))?;

        let armed: bool = page
            .evaluate(observer_script())
            .await
            .map_err(|e| anyhow!("Failed to arm mutation observer: {}", e))?
            .into_value()
            .unwrap_or(false);
        debug!("mutation observer armed on attach: {}", armed);

        Ok(Self { page })
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| anyhow!("CDP evaluate failed: {}", e))?
            .into_value::<T>()
            .context("unexpected evaluate result shape")
    }
}

#[async_trait]
impl AdPage for CdpAdPage {
    async fn query_containers(&self, class_name: &str) -> Result<Vec<ContainerNode>> {
        self.eval(query_script(class_name)).await
    }

    async fn raw_markup(&self) -> Result<String> {
        self.eval("document.documentElement.innerHTML".to_string())
            .await
    }

    async fn session(&self) -> Result<SessionCredentials> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| anyhow!("Failed to read cookies: {}", e))?;
        let referer = self
            .page
            .url()
            .await
            .map_err(|e| anyhow!("Failed to read page url: {}", e))?;
        Ok(SessionCredentials {
            cookie_header: cookie_header(
                cookies.iter().map(|c| (c.name.as_str(), c.value.as_str())),
            ),
            referer,
        })
    }

    async fn has_badge(&self, element: &ElementHandle) -> Result<bool> {
        self.eval(has_badge_script(element)).await
    }

    async fn append_badge(&self, element: &ElementHandle, badge: &Badge) -> Result<()> {
        let attached: bool = self.eval(append_badge_script(element, badge)).await?;
        if attached {
            Ok(())
        } else {
            Err(anyhow!("element {} is no longer attached", element))
        }
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<PageEvent>> {
        let mut events = self
            .page
            .event_listener::<EventBindingCalled>()
            .await
            .map_err(|e| anyhow!("Failed to listen for binding calls: {}", e))?;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(call) = events.next().await {
                if call.name != BINDING_NAME {
                    continue;
                }
                let Some(event) = event_for_payload(&call.payload) else {
                    warn!("ignoring unknown binding payload: {}", call.payload);
                    continue;
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
            debug!("binding event stream closed");
        });

        Ok(rx)
    }

    async fn install_trigger(&self, label: &str) -> Result<()> {
        let inserted: bool = self.eval(trigger_script(label)).await?;
        debug!("trigger button inserted: {}", inserted);
        Ok(())
    }
}
