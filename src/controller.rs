//! The context object tying the scanner, change watcher, fetch loop and
//! detail fetcher together.
//!
//! Shared state is limited to the ad registry, the finished-lookup records and
//! the process flag. A trigger that arrives while a loop holds the flag is
//! dropped; the post-loop re-check picks up anything it would have covered.

use crate::ads::{self, AdRegistry};
use crate::core::config::Settings;
use crate::fetch::pacing::pacing_delay;
use crate::fetch::DetailFetcher;
use crate::page::AdPage;
use crate::types::{AdEntry, DetailOutcome, LibraryId, LoopReport, PageEvent, ReachRecord, RunReport, ScanReport};
use anyhow::Result;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const TRIGGER_LABEL: &str = "Fetch All Ad Details";

pub struct Controller {
    page: Arc<dyn AdPage>,
    fetcher: DetailFetcher,
    settings: Settings,
    registry: Mutex<AdRegistry>,
    records: Mutex<Vec<ReachRecord>>,
    processing: AtomicBool,
}

/// Clears the process flag on drop so a panicking lookup cannot wedge the loop.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Controller {
    pub fn new(page: Arc<dyn AdPage>, fetcher: DetailFetcher, settings: Settings) -> Arc<Self> {
        Arc::new(Self {
            page,
            fetcher,
            settings,
            registry: Mutex::new(AdRegistry::new()),
            records: Mutex::new(Vec::new()),
            processing: AtomicBool::new(false),
        })
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    pub async fn scan(&self) -> Result<ScanReport> {
        ads::scan(
            self.page.as_ref(),
            &self.registry,
            &self.settings.container_class,
            &self.settings.id_label,
        )
        .await
    }

    /// Scan, then schedule a loop after the settle delay if anything new
    /// turned up and no loop holds the flag. Startup and every mutation batch
    /// go through here.
    pub async fn scan_and_schedule(self: &Arc<Self>) -> Result<ScanReport> {
        let report = self.scan().await?;
        if report.found_new() && !self.is_processing() {
            self.schedule_fetch_loop(self.settings.settle_delay);
        }
        Ok(report)
    }

    pub async fn tracked(&self) -> Vec<AdEntry> {
        self.registry.lock().await.snapshot()
    }

    pub async fn records(&self) -> Vec<ReachRecord> {
        self.records.lock().await.clone()
    }

    async fn is_settled(&self, library_id: &LibraryId) -> bool {
        self.records
            .lock()
            .await
            .iter()
            .any(|r| &r.library_id == library_id)
    }

    /// Let token-less lookups run again, e.g. after the user logs in.
    pub async fn forget_tokenless(&self) {
        self.records
            .lock()
            .await
            .retain(|r| r.outcome != DetailOutcome::NoToken);
    }

    /// Entries with neither a badge nor a finished lookup.
    pub async fn pending_count(&self) -> usize {
        let mut pending = 0;
        for entry in self.tracked().await {
            if self.is_settled(&entry.library_id).await {
                continue;
            }
            match self.page.has_badge(&entry.element).await {
                Ok(false) => pending += 1,
                Ok(true) => {}
                Err(e) => debug!("badge probe failed for {}: {}", entry.library_id, e),
            }
        }
        pending
    }

    /// One sequential pass over the registry. At most one instance runs at a time.
    pub async fn run_fetch_loop(self: &Arc<Self>) -> LoopReport {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("fetch loop already running; trigger dropped");
            return LoopReport::AlreadyRunning;
        }
        let guard = ProcessingGuard(&self.processing);

        let (fetched, skipped) = self.fetch_pass().await;
        drop(guard);

        let pending = self.pending_count().await;
        let rescheduled = pending > 0;
        if rescheduled {
            info!(
                "{} ads still without a badge; re-running in {:?}",
                pending, self.settings.recheck_delay
            );
            self.schedule_fetch_loop(self.settings.recheck_delay);
        }

        info!(
            "Fetch loop finished: {} fetched, {} skipped",
            fetched, skipped
        );
        LoopReport::Finished {
            fetched,
            skipped,
            rescheduled,
        }
    }

    /// Run the fetch loop after `delay` on a background task.
    pub fn schedule_fetch_loop(self: &Arc<Self>, delay: Duration) -> JoinHandle<LoopReport> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            this.run_fetch_loop().await
        })
    }

    async fn fetch_pass(&self) -> (usize, usize) {
        let mut fetched = 0;
        let mut skipped = 0;

        for entry in self.tracked().await {
            if self.is_settled(&entry.library_id).await {
                skipped += 1;
                continue;
            }
            match self.page.has_badge(&entry.element).await {
                Ok(true) => {
                    debug!("Library ID {} already annotated", entry.library_id);
                    skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("badge probe failed for {}: {}", entry.library_id, e);
                    skipped += 1;
                    continue;
                }
            }

            let pause = pacing_delay(self.settings.pacing_min, self.settings.pacing_max);
            tokio::time::sleep(pause).await;

            let outcome = self.fetcher.fetch(self.page.as_ref(), &entry).await;
            self.records.lock().await.push(ReachRecord {
                library_id: entry.library_id.clone(),
                outcome,
                finished_at: Utc::now().to_rfc3339(),
            });
            fetched += 1;
        }

        (fetched, skipped)
    }

    /// React to page events until the page's event stream closes.
    ///
    /// Every mutation batch re-runs the scanner; new items schedule a loop after
    /// the settle delay unless one is already running.
    pub async fn watch(self: Arc<Self>) -> Result<()> {
        let mut events = self.page.subscribe().await?;
        while let Some(event) = events.recv().await {
            match event {
                PageEvent::Mutated => {
                    if let Err(e) = self.scan_and_schedule().await {
                        warn!("re-scan failed: {}", e);
                    }
                }
                PageEvent::TriggerPressed => {
                    info!("Trigger pressed: fetching all ad details");
                    self.forget_tokenless().await;
                    self.schedule_fetch_loop(Duration::ZERO);
                }
            }
        }
        debug!("page event stream closed; watcher stopped");
        Ok(())
    }

    /// Initial scan, then passes until nothing is pending. No background tasks.
    pub async fn run_once(self: &Arc<Self>) -> Result<RunReport> {
        self.scan().await?;
        loop {
            if self
                .processing
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                tokio::time::sleep(self.settings.recheck_delay).await;
                continue;
            }
            let guard = ProcessingGuard(&self.processing);
            let (fetched, _) = self.fetch_pass().await;
            drop(guard);

            self.scan().await?;
            if fetched == 0 || self.pending_count().await == 0 {
                break;
            }
        }

        let url = self.page.session().await.ok().and_then(|s| s.referer);
        Ok(RunReport {
            url,
            tracked: self.registry.lock().await.len(),
            records: self.records().await,
        })
    }
}
