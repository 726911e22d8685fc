use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use her_core::cdp::CdpDriver;
use her_core::config::HerOptions;
use her_core::embed::HashEmbedder;
use her_core::orchestrator::Orchestrator;
use her_core::promotion::PromotionStore;
use her_core::rerank::HeuristicReranker;
use her_core::{browser, dom, pipeline, serialize};

#[derive(Parser)]
#[command(name = "her-core")]
#[command(about = "Hybrid Element Retriever: resolve a natural-language step to a verified DOM locator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a snapshot of an HTML file, URL, or stdin
    Snapshot {
        /// HTML file path, URL (http/https), or '-' for stdin
        input: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Chrome debugging port (for URL mode)
        #[arg(short, long, default_value_t = 9222)]
        port: u16,

        /// Launch a new headless Chrome instead of connecting
        #[arg(short, long)]
        launch: bool,
    },

    /// Resolve a natural-language element description against a live page
    Resolve {
        /// URL to navigate to before resolving
        url: String,

        /// Description of the element to find, e.g. "the Apple filter checkbox"
        step: String,

        /// Chrome debugging port to connect to
        #[arg(short, long, default_value_t = 9222)]
        port: u16,

        /// Launch a new headless Chrome instead of connecting
        #[arg(short, long)]
        launch: bool,

        /// Path to a JSON file of `HerOptions` overrides
        #[arg(long)]
        options: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Snapshot {
            input,
            format,
            port,
            launch,
        } => {
            info!(input = %input, format = %format, "snapshot command");
            if is_url(&input) {
                let rt = tokio::runtime::Runtime::new()?;
                rt.block_on(run_browser_snapshot(&input, &format, port, launch))
            } else {
                run_file_snapshot(&input, &format)
            }
        }
        Commands::Resolve { url, step, port, launch, options } => {
            info!(url = %url, step = %step, "resolve command");
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_resolve(&url, &step, port, launch, options.as_deref()))
        }
    }
}

async fn run_resolve(url: &str, step: &str, port: u16, launch: bool, options_path: Option<&str>) -> Result<()> {
    let browser = if launch { browser::launch().await? } else { browser::connect(port).await? };
    let page = browser.new_page(url).await?;
    page.wait_for_navigation().await.ok();
    let driver = CdpDriver::new(page);

    let options = match options_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            HerOptions::from_json(value).map_err(|e| anyhow::anyhow!(e.to_string()))?
        }
        None => HerOptions::default(),
    };

    let store = PromotionStore::open(&options.cache_dir, options.promotion_half_life_sec, options.promotion_ttl_sec)?;
    let orchestrator = Orchestrator::new(HashEmbedder::new(256), HeuristicReranker, store, options);

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64();
    let result = orchestrator.resolve(step, &driver, None, now).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

async fn run_browser_snapshot(url: &str, format: &str, port: u16, launch: bool) -> Result<()> {
    let browser = if launch {
        browser::launch().await?
    } else {
        browser::connect(port).await?
    };

    let (html, final_url) = browser::fetch_page(&browser, url).await?;
    debug!(html_len = html.len(), final_url = %final_url, "fetched page");
    let snapshot = pipeline::process(&html, &final_url);
    info!(nodes = snapshot.nodes.len(), "snapshot complete");
    print_output(&snapshot, format)
}

fn run_file_snapshot(input: &str, format: &str) -> Result<()> {
    let html = if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(input)?
    };

    let url = if input == "-" { "" } else { input };
    let snapshot = pipeline::process(&html, url);
    print_output(&snapshot, format)
}

fn print_output(snapshot: &dom::PageSnapshot, format: &str) -> Result<()> {
    let output = match format {
        "json" => serde_json::to_string_pretty(snapshot)?,
        _ => serialize::to_compact_text(snapshot),
    };
    println!("{output}");
    Ok(())
}
