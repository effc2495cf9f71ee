use super::graphql::GraphqlClient;
use crate::ads::{badge, token};
use crate::core::config::Settings;
use crate::core::error::{FetchError, FetchResult};
use crate::page::AdPage;
use crate::types::{AdEntry, Badge, DetailOutcome};
use std::time::Duration;
use tracing::{error, info, warn};

/// Page-wide anti-forgery token, read fresh for every lookup.
async fn lsd_token(page: &dyn AdPage) -> FetchResult<String> {
    let markup = page.raw_markup().await?;
    token::extract_lsd_token(&markup).ok_or(FetchError::MissingToken)
}

/// Looks up one Library ID with a fixed retry budget and renders its badge.
#[derive(Clone)]
pub struct DetailFetcher {
    client: GraphqlClient,
    max_retries: u32,
    retry_delay: Duration,
}

impl DetailFetcher {
    pub fn new(client: GraphqlClient, settings: &Settings) -> Self {
        Self {
            client,
            max_retries: settings.max_retries.max(1),
            retry_delay: settings.retry_delay,
        }
    }

    /// Run the lookup to a terminal outcome.
    ///
    /// No token → no request, no badge. Otherwise exactly one badge is appended:
    /// the reach value, or the fallback once `max_retries` attempts have failed.
    pub async fn fetch(&self, page: &dyn AdPage, entry: &AdEntry) -> DetailOutcome {
        let library_id = &entry.library_id;

        let lsd_token = match lsd_token(page).await {
            Ok(t) => t,
            Err(e) => {
                error!("Library ID {}: {}. Cannot proceed.", library_id, e);
                return DetailOutcome::NoToken;
            }
        };

        let session = match page.session().await {
            Ok(s) => s,
            Err(e) => {
                warn!("No session credentials available ({}); sending token only", e);
                Default::default()
            }
        };

        let mut attempts = 0u32;
        let mut last_error = FetchError::ReachMissing;
        while attempts < self.max_retries {
            attempts += 1;
            match self
                .client
                .query_reach(library_id, &lsd_token, &session)
                .await
            {
                Ok(value) => {
                    info!(
                        "Library ID {} | EU Total Reach: {}",
                        library_id,
                        badge::display_reach(&value)
                    );
                    self.render(page, entry, &badge::success(&value)).await;
                    return DetailOutcome::Reach { value, attempts };
                }
                Err(e) => {
                    warn!(
                        "Library ID {} attempt {}/{} failed ({}): {}",
                        library_id,
                        attempts,
                        self.max_retries,
                        e.kind(),
                        e
                    );
                    last_error = e;
                    if attempts < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        error!(
            "Library ID {} | giving up after {} attempts (last: {})",
            library_id, attempts, last_error
        );
        self.render(page, entry, &badge::fallback()).await;
        DetailOutcome::Exhausted {
            attempts,
            last_error: last_error.to_string(),
        }
    }

    async fn render(&self, page: &dyn AdPage, entry: &AdEntry, badge: &Badge) {
        if let Err(e) = page.append_badge(&entry.element, badge).await {
            warn!(
                "Could not attach badge for Library ID {}: {}",
                entry.library_id, e
            );
        }
    }
}
