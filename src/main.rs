mod config;
mod crawler;
mod extractor;
mod metrics;
mod parser;
mod snapshot;
mod transformer;
mod utils;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::{PipelineConfig, StageContext};
use crate::crawler::client::HttpClient;
use crate::crawler::progress::ProgressMap;
use crate::crawler::CrawlSummary;
use crate::snapshot::SnapshotError;

#[derive(Parser)]
#[command(name = "site_pipeline", about = "Crawl websites and report on their content sections")]
struct Cli {
    /// Optional TOML config file (PIPELINE_* env vars override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Data directory (overrides data_dir from config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch homepages, components, case studies and internal pages
    Crawl,
    /// Pull section text out of the raw HTML
    Extract,
    /// Turn extracted text into standardized records
    Transform,
    /// Compute metrics over the standardized records
    Aggregate,
    /// Crawl + extract + transform + aggregate, one stage after another
    Run,
    /// Show per-site crawl progress
    Status {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
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

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let ctx = StageContext::new(config, std::io::stderr().is_terminal());

    let result = match cli.command {
        Commands::Crawl => {
            let summary = crawl(&ctx).await?;
            print_crawl(&summary);
            Ok(())
        }
        Commands::Extract => {
            let extracted = extractor::run(&ctx)?;
            print_extract(&extracted);
            Ok(())
        }
        Commands::Transform => {
            let standardized = transformer::run(&ctx)?;
            print_transform(&standardized);
            Ok(())
        }
        Commands::Aggregate => {
            let report = metrics::run(&ctx)?;
            print_metrics(&report);
            Ok(())
        }
        Commands::Run => {
            let t_crawl = Instant::now();
            println!("Pipeline: crawling {} sites...", ctx.config.sites.len());
            let summary = crawl(&ctx).await?;
            print_crawl(&summary);
            println!("Crawled in {}", format_duration(t_crawl.elapsed()));
            if summary.interrupted {
                println!("Interrupted; later stages skipped.");
                return Ok(());
            }

            let extracted = extractor::run(&ctx)?;
            print_extract(&extracted);
            let standardized = transformer::run(&ctx)?;
            print_transform(&standardized);
            let report = metrics::run(&ctx)?;
            print_metrics(&report);
            Ok(())
        }
        Commands::Status { limit } => status(&ctx, limit),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn crawl(ctx: &StageContext) -> anyhow::Result<CrawlSummary> {
    let client = HttpClient::new(ctx.request_timeout(), &ctx.config.user_agent)?;
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    crawler::run(ctx, client, shutdown).await
}

fn print_crawl(s: &CrawlSummary) {
    println!(
        "Crawled {}/{} sites ({} failed, {} already done): {} pages, {} components.",
        s.completed, s.total_sites, s.failed, s.skipped, s.pages, s.components
    );
}

fn print_extract(e: &extractor::ExtractionSnapshot) {
    let s = &e.summary;
    println!(
        "Extracted {} domains ({} ok, {} errors).",
        s.total_domains, s.successful_extractions, s.failed_extractions
    );
}

fn print_transform(t: &transformer::StandardizedSnapshot) {
    let s = &t.summary;
    println!(
        "Standardized {} records from {} domains ({} rejected).",
        s.total_records, s.total_domains, s.validation_errors
    );
}

fn print_metrics(r: &metrics::MetricsReport) {
    let cs = &r.case_study_analysis;
    let corpus = &r.additional_metrics;
    println!(
        "{} websites | {}/{} with case studies ({}%) | fill rate {}%",
        corpus.unique_websites,
        cs.websites_with_case_studies,
        cs.total_websites,
        cs.case_study_percentage,
        corpus.content_fill_rate
    );
    if r.validation_passed {
        println!("Validation passed.");
    } else {
        println!("Validation FAILED:");
        for e in &r.validation_errors {
            println!("  - {}", e);
        }
    }
    let failed: Vec<&str> = r
        .quality_checks
        .iter()
        .filter(|c| !c.passed)
        .map(|c| c.name.as_str())
        .collect();
    if !failed.is_empty() {
        println!("Quality checks below threshold: {}", failed.join(", "));
    }
}

fn status(ctx: &StageContext, limit: usize) -> anyhow::Result<()> {
    let progress: ProgressMap = match snapshot::load(&ctx.paths.metadata) {
        Ok(progress) => progress,
        Err(SnapshotError::Missing(_)) => {
            println!("No crawl progress yet. Run 'crawl' first.");
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to read crawl progress"),
    };
    if progress.is_empty() {
        println!("No sites crawled.");
        return Ok(());
    }

    println!(
        "{:>3} | {:<32} | {:<11} | {:>5} | {:>5} | {:<19} | {:<24}",
        "#", "Site", "Status", "Pages", "Comps", "Crawled", "Error"
    );
    println!("{}", "-".repeat(116));

    for (i, (url, p)) in progress.iter().take(limit).enumerate() {
        let crawled: String = p.crawl_time.chars().take(19).collect();
        println!(
            "{:>3} | {:<32} | {:<11} | {:>5} | {:>5} | {:<19} | {:<24}",
            i + 1,
            truncate(url, 32),
            p.status.as_str(),
            p.pages.len(),
            p.components.len(),
            crawled,
            truncate(p.error.as_deref().unwrap_or("-"), 24)
        );
    }

    let completed = progress.values().filter(|p| p.is_completed()).count();
    let pages: usize = progress.values().map(|p| p.pages.len()).sum();
    println!(
        "\n{} sites | {} completed | {} pages stored",
        progress.len(),
        completed,
        pages
    );
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
