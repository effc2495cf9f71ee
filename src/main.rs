use anyhow::{anyhow, Context};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use reach_scout::controller::{Controller, TRIGGER_LABEL};
use reach_scout::core::config::load_reach_config;
use reach_scout::scraping::browser_manager::{self, BrowserPool};
use reach_scout::{AdPage, CdpAdPage, DetailFetcher, GraphqlClient, SnapshotPage};

#[derive(Debug, Default)]
struct CliArgs {
    url: Option<String>,
    html: Option<PathBuf>,
    config: Option<PathBuf>,
    once: bool,
    headful: bool,
    scroll: bool,
}

fn flag_value(args: &[String], i: &mut usize, name: &str) -> Option<String> {
    let a = &args[*i];
    if a == name {
        let v = args.get(*i + 1).cloned()?;
        *i += 1;
        return Some(v);
    }
    a.strip_prefix(&format!("{}=", name)).map(str::to_string)
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut out = CliArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--once" => out.once = true,
            "--headful" => out.headful = true,
            "--scroll" => out.scroll = true,
            _ => {
                if let Some(v) = flag_value(&args, &mut i, "--url") {
                    out.url = Some(v);
                } else if let Some(v) = flag_value(&args, &mut i, "--html") {
                    out.html = Some(PathBuf::from(v));
                } else if let Some(v) = flag_value(&args, &mut i, "--config") {
                    out.config = Some(PathBuf::from(v));
                } else {
                    warn!("ignoring unknown argument: {}", args[i]);
                }
            }
        }
        i += 1;
    }
    out
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stdout carries the JSON report.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    let config = load_reach_config(args.config.as_deref());
    let settings = config.settings();
    let url = args.url.clone().unwrap_or_else(|| config.resolve_start_url());

    let user_agent = browser_manager::random_user_agent();
    let http_client = reqwest::Client::builder()
        .timeout(config.resolve_http_timeout())
        .connect_timeout(Duration::from_secs(10))
        .user_agent(user_agent)
        .build()?;
    let fetcher = DetailFetcher::new(GraphqlClient::new(http_client, &settings), &settings);

    // Offline: a saved page, same pipeline, report on stdout.
    if let Some(path) = args.html.as_ref() {
        let html = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        info!("Loaded snapshot {} ({} bytes)", path.display(), html.len());
        let page: Arc<dyn AdPage> = Arc::new(SnapshotPage::new(html).with_url(url));
        let controller = Controller::new(page, fetcher, settings);
        let report = controller.run_once().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let headless = !args.headful && config.resolve_headless();
    let pool = BrowserPool::new_auto(user_agent, headless).ok_or_else(|| {
        anyhow!("No browser found. Install Brave, Chrome, or Chromium, or set CHROME_EXECUTABLE.")
    })?;

    let tab = browser_manager::open_page(&pool, &url, &settings.container_class).await?;
    let ad_page = CdpAdPage::attach(tab.clone()).await?;
    ad_page.install_trigger(TRIGGER_LABEL).await?;
    let controller = Controller::new(Arc::new(ad_page), fetcher, settings);

    if args.once {
        if args.scroll {
            browser_manager::auto_scroll(&tab, 20).await.ok();
        }
        let report = controller.run_once().await;
        pool.shutdown().await;
        println!("{}", serde_json::to_string_pretty(&report?)?);
        return Ok(());
    }

    let watcher = tokio::spawn(controller.clone().watch());
    let first = controller.scan_and_schedule().await?;
    info!(
        "Initial scan: {} ads, {} tracked. The on-page button re-runs the fetch.",
        first.candidates, first.added
    );
    if args.scroll {
        browser_manager::auto_scroll(&tab, 20).await.ok();
    }

    shutdown_signal().await;
    info!("Shutting down");
    watcher.abort();
    pool.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
