//! Native browser management using `chromiumoxide`.
//!
//! This module is the single place that:
//! * finds a usable browser executable (Brave → Chrome → Chromium, cross-platform),
//! * builds the launch config (stealth flags, headless or headful),
//! * keeps one long-lived browser in a [`BrowserPool`] and hands out tabs,
//! * waits for the Ad Library page to settle before the first scan.

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

// ── Realistic User-Agent pool ────────────────────────────────────────────────

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Edge 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Returns a randomly-chosen Chromium desktop User-Agent string.
///
/// Only Chromium UAs: the same string is sent by the tab and by the GraphQL
/// client, and must match the engine actually rendering the page.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

/// Injected before any page script runs.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', {get: () => undefined});
Object.defineProperty(navigator, 'languages', {get: () => ['en-US', 'en']});
if (!window.chrome) { window.chrome = { runtime: {} }; }
"#;

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = crate::core::config::chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "brave-browser",
            "brave",
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/brave-browser",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Launch config ────────────────────────────────────────────────────────────

/// Build a `BrowserConfig` with stealth defaults.
///
/// `--disable-blink-features=AutomationControlled` hides the
/// `navigator.webdriver` flag. `headless = false` opens a visible window so
/// the badges can be watched as they land.
pub fn build_browser_config(
    exe: &str,
    user_agent: &str,
    headless: bool,
    width: u32,
    height: u32,
) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", user_agent));

    if !headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Browser Pool ─────────────────────────────────────────────────────────────

/// A shared, long-lived browser instance handing out tabs.
///
/// The browser is lazy-started on the first `acquire()` and restarted
/// transparently if it has crashed.
pub struct BrowserPool {
    exe: String,
    user_agent: String,
    headless: bool,
    inner: Mutex<Option<Browser>>,
}

impl BrowserPool {
    pub fn new(exe: impl Into<String>, user_agent: impl Into<String>, headless: bool) -> Arc<Self> {
        Arc::new(Self {
            exe: exe.into(),
            user_agent: user_agent.into(),
            headless,
            inner: Mutex::new(None),
        })
    }

    /// Pool over the auto-discovered executable; `None` when no browser is installed.
    pub fn new_auto(user_agent: &str, headless: bool) -> Option<Arc<Self>> {
        find_chrome_executable().map(|exe| Self::new(exe, user_agent, headless))
    }

    /// Acquire a fresh tab. Close the returned `Page` when done; the browser stays alive.
    pub async fn acquire(&self) -> Result<Page> {
        let mut guard = self.inner.lock().await;

        let alive = match guard.as_mut() {
            Some(b) => b.new_page("about:blank").await.is_ok(),
            None => false,
        };

        if !alive {
            if let Some(mut old) = guard.take() {
                warn!("🔄 Browser pool: instance dead, restarting...");
                let _ = old.close().await;
            }
            info!("🚀 Browser pool: launching new instance ({})", self.exe);
            let config =
                build_browser_config(&self.exe, &self.user_agent, self.headless, 1920, 1080)?;
            let (new_browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| anyhow!("Pool: failed to launch ({}): {}", self.exe, e))?;
            tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        warn!("Pool CDP handler error: {}", e);
                    }
                }
            });
            *guard = Some(new_browser);
        }

        let browser = guard
            .as_mut()
            .ok_or_else(|| anyhow!("Pool: browser missing after launch"))?;
        browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Pool: failed to open tab: {}", e))
    }

    /// Gracefully close the pooled browser instance.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(mut b) = guard.take() {
            let _ = b.close().await;
            info!("🛑 Browser pool shut down");
        }
    }
}

impl Drop for BrowserPool {
    fn drop(&mut self) {
        // Drop cannot await; close on the runtime if one is still around.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        if let Ok(mut guard) = self.inner.try_lock() {
            if let Some(mut browser) = guard.take() {
                handle.spawn(async move {
                    let _ = browser.close().await;
                });
            }
        }
    }
}

/// Open `url` in a fresh pooled tab with the stealth script armed, and wait for
/// the ad grid to stop growing.
pub async fn open_page(pool: &BrowserPool, url: &str, container_class: &str) -> Result<Page> {
    let page = pool.acquire().await?;
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
        .await
        .map_err(|e| anyhow!("Failed to inject stealth script: {}", e))?;

    info!("🌐 Navigating to: {}", url);
    page.goto(url)
        .await
        .map_err(|e| anyhow!("Failed to navigate: {}", e))?;

    wait_until_stable(&page, container_class, 1500, 15000).await?;
    Ok(page)
}

// ── Settling ─────────────────────────────────────────────────────────────────

/// Tracks a polled counter and reports when it has held still for `quiet`.
/// Readings taken before the document finished loading never count as quiet.
#[derive(Debug)]
struct Quiescence {
    quiet: Duration,
    last: Option<u64>,
    since: Instant,
}

impl Quiescence {
    fn new(quiet: Duration, now: Instant) -> Self {
        Self {
            quiet,
            last: None,
            since: now,
        }
    }

    fn observe(&mut self, ready: bool, count: u64, now: Instant) -> bool {
        if !ready || self.last != Some(count) {
            self.last = Some(count);
            self.since = now;
            return false;
        }
        now.duration_since(self.since) >= self.quiet
    }
}

fn container_count_script(container_class: &str) -> String {
    format!(
        "document.readyState === 'complete' ? document.querySelectorAll({}).length : -1",
        serde_json::Value::String(format!("div.{}", container_class))
    )
}

/// Poll until `document.readyState` is complete and the number of ad
/// containers has not changed for `quiet_ms`, or `timeout_ms` has elapsed.
pub async fn wait_until_stable(
    page: &Page,
    container_class: &str,
    quiet_ms: u64,
    timeout_ms: u64,
) -> Result<()> {
    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    let script = container_count_script(container_class);
    let mut settle = Quiescence::new(Duration::from_millis(quiet_ms), start);

    while start.elapsed() < timeout {
        let reading: i64 = page
            .evaluate(script.as_str())
            .await
            .ok()
            .and_then(|v| v.into_value::<i64>().ok())
            .unwrap_or(-1);
        let ready = reading >= 0;
        let count = reading.max(0) as u64;

        if settle.observe(ready, count, Instant::now()) {
            info!(
                "Page settled after {}ms with {} ad containers",
                start.elapsed().as_millis(),
                count
            );
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    info!("Page still changing after {}ms; continuing", timeout_ms);
    Ok(())
}

/// Jump to the bottom of the feed until it stops growing, at most `max_steps`
/// times. Each batch of lazily loaded cards reaches the watcher as a mutation.
pub async fn auto_scroll(page: &Page, max_steps: u64) -> Result<()> {
    const SCROLL_TO_END: &str = "(() => { \
        const h = Math.max(document.body.scrollHeight, document.documentElement.scrollHeight); \
        window.scrollTo(0, h); return h; })()";

    let mut flat_steps = 0;
    let mut last_height = 0u64;
    for step in 0..max_steps {
        let height = match page.evaluate(SCROLL_TO_END).await {
            Ok(v) => v.into_value::<u64>().unwrap_or(last_height),
            Err(e) => {
                warn!("auto_scroll: step {} failed: {}", step, e);
                break;
            }
        };
        if height > last_height {
            last_height = height;
            flat_steps = 0;
        } else {
            flat_steps += 1;
            if flat_steps >= 2 {
                debug!("auto_scroll: feed stopped growing at {}px", height);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(1200)).await;
    }
    Ok(())
}
