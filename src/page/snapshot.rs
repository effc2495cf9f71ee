//! In-memory page surface over static HTML.
//!
//! Containers are addressed by their index among `div.<class>` matches, so a
//! handle stays valid as long as later markup only appends containers.
//! Badges are kept beside the markup rather than spliced into it.

use super::{AdPage, BADGE_MARKER_ATTR};
use crate::types::{Badge, ContainerNode, ElementHandle, PageEvent, SessionCredentials};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

pub struct SnapshotPage {
    html: Mutex<String>,
    url: Option<String>,
    cookie_header: Option<String>,
    badges: Mutex<HashMap<ElementHandle, Vec<Badge>>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PageEvent>>>,
    trigger_label: Mutex<Option<String>>,
    /// Container class of the latest query, used to resolve markup badges.
    container_class: Mutex<String>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn container_selector(class_name: &str) -> Result<Selector> {
    Selector::parse(&format!("div.{}", class_name))
        .map_err(|e| anyhow!("invalid container class '{}': {:?}", class_name, e))
}

fn handle_for(index: usize) -> String {
    format!("snap-{}", index)
}

fn parse_handle(handle: &ElementHandle) -> Option<usize> {
    handle.0.strip_prefix("snap-")?.parse().ok()
}

fn collect_containers(html: &str, class_name: &str) -> Result<Vec<ContainerNode>> {
    let document = Html::parse_document(html);
    let container_sel = container_selector(class_name)?;
    let span_sel = Selector::parse("span").map_err(|e| anyhow!("span selector: {:?}", e))?;

    Ok(document
        .select(&container_sel)
        .enumerate()
        .map(|(i, el)| ContainerNode {
            handle: handle_for(i),
            class_list: el.value().classes().map(|c| c.to_string()).collect(),
            span_texts: el
                .select(&span_sel)
                .map(|s| s.text().collect::<String>())
                .collect(),
        })
        .collect())
}

/// Whether the markup already carries a badge inside the container at `index`.
fn markup_has_badge(html: &str, class_name: &str, index: usize) -> bool {
    let document = Html::parse_document(html);
    let (Ok(container_sel), Ok(marker_sel)) = (
        container_selector(class_name),
        Selector::parse(&format!("[{}]", BADGE_MARKER_ATTR)),
    ) else {
        return false;
    };
    document
        .select(&container_sel)
        .nth(index)
        .map(|el| el.select(&marker_sel).next().is_some())
        .unwrap_or(false)
}

impl SnapshotPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: Mutex::new(html.into()),
            url: None,
            cookie_header: None,
            badges: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            trigger_label: Mutex::new(None),
            container_class: Mutex::new(crate::core::config::DEFAULT_CONTAINER_CLASS.to_string()),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_cookie_header(mut self, cookies: impl Into<String>) -> Self {
        self.cookie_header = Some(cookies.into());
        self
    }

    /// Swap the markup and notify subscribers of one mutation batch.
    pub fn replace_html(&self, html: impl Into<String>) {
        *lock(&self.html) = html.into();
        self.emit(PageEvent::Mutated);
    }

    /// Simulate a click on the trigger button.
    pub fn press_trigger(&self) {
        self.emit(PageEvent::TriggerPressed);
    }

    /// Drop every subscriber so watch loops observe end-of-stream.
    pub fn close(&self) {
        lock(&self.subscribers).clear();
    }

    pub fn badges_for(&self, element: &ElementHandle) -> Vec<Badge> {
        lock(&self.badges).get(element).cloned().unwrap_or_default()
    }

    pub fn badge_count(&self) -> usize {
        lock(&self.badges).values().map(Vec::len).sum()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    pub fn trigger_label(&self) -> Option<String> {
        lock(&self.trigger_label).clone()
    }

    fn emit(&self, event: PageEvent) {
        lock(&self.subscribers).retain(|tx| tx.send(event).is_ok());
    }
}

#[async_trait]
impl AdPage for SnapshotPage {
    async fn query_containers(&self, class_name: &str) -> Result<Vec<ContainerNode>> {
        *lock(&self.container_class) = class_name.to_string();
        let html = lock(&self.html).clone();
        collect_containers(&html, class_name)
    }

    async fn raw_markup(&self) -> Result<String> {
        Ok(lock(&self.html).clone())
    }

    async fn session(&self) -> Result<SessionCredentials> {
        Ok(SessionCredentials {
            cookie_header: self.cookie_header.clone(),
            referer: self.url.clone(),
        })
    }

    async fn has_badge(&self, element: &ElementHandle) -> Result<bool> {
        if lock(&self.badges)
            .get(element)
            .is_some_and(|b| !b.is_empty())
        {
            return Ok(true);
        }
        let Some(index) = parse_handle(element) else {
            return Ok(false);
        };
        let html = lock(&self.html).clone();
        let class_name = lock(&self.container_class).clone();
        Ok(markup_has_badge(&html, &class_name, index))
    }

    async fn append_badge(&self, element: &ElementHandle, badge: &Badge) -> Result<()> {
        lock(&self.badges)
            .entry(element.clone())
            .or_default()
            .push(badge.clone());
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<PageEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(tx);
        Ok(rx)
    }

    async fn install_trigger(&self, label: &str) -> Result<()> {
        *lock(&self.trigger_label) = Some(label.to_string());
        Ok(())
    }
}
