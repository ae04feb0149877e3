mod crawl;
mod detail;
mod listing;
mod record;
mod session;
mod settings;
mod sink;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use session::http::HttpFetcher;
use session::{DocumentSession, RenderSession};
use settings::Settings;

#[derive(Parser)]
#[command(name = "talk_scraper", about = "Talk metadata scraper: listing pages → talk pages → CSV")]
struct Cli {
    /// Config file (default: talk_scraper.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk listing pages until one fails to load, writing one CSV row per talk
    Crawl {
        /// Output CSV path
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// First listing page to request
        #[arg(short = 'p', long)]
        start_page: Option<u32>,
    },
    /// Extract a single talk page and print its fields as JSON
    Detail {
        /// Talk page URL
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    let fetcher = HttpFetcher::new(&settings.http)?;
    let mut session = DocumentSession::new(fetcher);

    match cli.command {
        Commands::Crawl { output, start_page } => {
            if let Some(output) = output {
                settings.output = output;
            }
            if let Some(start_page) = start_page {
                settings.start_page = start_page;
            }

            info!(
                output = %settings.output.display(),
                start = %settings.listing_url(settings.start_page),
                "Starting crawl"
            );
            let sink = sink::CsvSink::create(&settings.output)?;

            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg} · {pos} talks ({per_sec})")?,
            );
            pb.enable_steady_tick(Duration::from_millis(120));

            let mut crawler = crawl::Crawler::new(session, sink, &settings).with_progress(pb);
            let stats = crawler.run().await?;
            println!(
                "Done: {} talks written to {} ({} skipped, {} of {} listing pages parsed).",
                stats.records,
                settings.output.display(),
                stats.skipped,
                stats.pages_parsed,
                stats.pages_attempted,
            );
        }
        Commands::Detail { url } => {
            session
                .load(&url)
                .await
                .with_context(|| format!("Failed to load {}", url))?;
            let extractor = detail::DetailExtractor::new(
                settings.selectors.detail.clone(),
                settings.timing.transcript(),
            );
            let fields = extractor.extract(&mut session, &url).await;
            println!("{}", serde_json::to_string_pretty(&fields)?);
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    Ok(())
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
