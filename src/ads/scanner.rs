use super::AdRegistry;
use crate::page::AdPage;
use crate::types::{ContainerNode, ElementHandle, LibraryId, ScanReport};
use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Ad cards carry exactly one class; wrappers sharing it carry more.
pub fn is_ad_container(node: &ContainerNode) -> bool {
    node.class_list.len() == 1
}

/// Library ID from the first span containing `label`: the text between the
/// first and second `:` separators, trimmed.
pub fn parse_library_id(node: &ContainerNode, label: &str) -> Option<LibraryId> {
    let text = node.span_texts.iter().find(|t| t.contains(label))?;
    let value = text.trim().split(':').nth(1)?;
    LibraryId::new(value)
}

/// One scan pass: fingerprint, extract, deduplicate into `registry`.
///
/// Containers without the label are skipped silently.
pub async fn scan(
    page: &dyn AdPage,
    registry: &Mutex<AdRegistry>,
    container_class: &str,
    id_label: &str,
) -> Result<ScanReport> {
    let nodes = page.query_containers(container_class).await?;
    let ads: Vec<&ContainerNode> = nodes.iter().filter(|n| is_ad_container(n)).collect();

    let mut report = ScanReport {
        candidates: ads.len(),
        added: 0,
    };

    let mut registry = registry.lock().await;
    for node in ads {
        let Some(library_id) = parse_library_id(node, id_label) else {
            continue;
        };
        if registry.insert(library_id.clone(), ElementHandle(node.handle.clone())) {
            debug!("tracking Library ID {}", library_id);
            report.added += 1;
        }
    }

    info!(
        "Ads found: {} ({} new, {} tracked)",
        report.candidates,
        report.added,
        registry.len()
    );
    Ok(report)
}
