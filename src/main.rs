use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rental_scout::config::{CrawlerSettings, Settings};
use rental_scout::crawl::{Aggregator, PacedFetcher, RunOutput};
use rental_scout::dedup::dedup_file;
use rental_scout::models::WorkUnit;
use rental_scout::occupancy::OccupancyWindow;
use rental_scout::scrapers::naver::count_shared_addresses;
use rental_scout::scrapers::rooms::records_per_region;
use rental_scout::scrapers::types::AreaTable;
use rental_scout::scrapers::{
    BrowserLogin, Credentials, NaverSite, RoomSearchSite, ScheduleSite, SessionToken, Site,
};
use rental_scout::table::{cell_text, read_table, CsvSink};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rental-scout")]
#[command(author, version, about = "Rental listing crawlers")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file overriding the built-in delays, retries and cadence
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for checkpoint and final CSV files
    #[arg(short, long, global = true, default_value = ".")]
    output: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the map listing API page by page
    Naver {
        /// First page to fetch (1-based)
        #[arg(long, default_value_t = 1)]
        start_page: u32,
    },

    /// Search the room platform area by area
    Rooms {
        /// Region and area keyword table
        #[arg(long, default_value = "config/areas.toml")]
        areas: PathBuf,

        /// Skip areas before this position
        #[arg(long, default_value_t = 0)]
        start_index: usize,
    },

    /// Estimate four-week occupancy for rooms from an earlier crawl
    Occupancy {
        /// Room CSV with a `rid` column
        #[arg(short, long)]
        input: PathBuf,

        /// Skip rows before this position
        #[arg(long, default_value_t = 0)]
        start_index: usize,

        #[arg(long, env = "EMAIL")]
        email: Option<String>,

        #[arg(long, env = "PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Existing SESSION cookie; skips the browser login
        #[arg(long, env = "ROOMS_SESSION", hide_env_values = true)]
        session: Option<String>,
    },

    /// Drop rows whose key repeats an earlier row
    Dedup {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        out: PathBuf,

        #[arg(long, default_value = "rid")]
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    match cli.command {
        Command::Naver { start_page } => run_naver(&settings.naver, &cli.output, start_page).await,
        Command::Rooms { areas, start_index } => {
            run_rooms(&settings.rooms, &cli.output, &areas, start_index).await
        }
        Command::Occupancy {
            input,
            start_index,
            email,
            password,
            session,
        } => {
            let session = match session {
                Some(value) => SessionToken::new(value),
                None => login(email, password).await?,
            };
            run_occupancy(&settings.occupancy, &cli.output, &input, start_index, session).await
        }
        Command::Dedup { input, out, key } => {
            let report = dedup_file(&input, &out, &key)
                .with_context(|| format!("Failed to deduplicate {}", input.display()))?;
            println!("{} rows in, {} duplicates removed, {} rows written to {}",
                report.rows_in, report.removed(), report.rows_out, out.display());
            Ok(())
        }
    }
}

/// Token that fires on Ctrl-C
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 interrupt received, finishing up");
            trigger.cancel();
        }
    });
    token
}

async fn crawl<S: Site>(
    site: S,
    settings: &CrawlerSettings,
    output: &Path,
    prefix: &str,
    units: impl IntoIterator<Item = WorkUnit>,
    start_index: usize,
) -> Result<(RunOutput, S)> {
    let fetcher = PacedFetcher::new(site, settings.retry.clone());
    let sink = CsvSink::new(output, prefix);
    let mut aggregator =
        Aggregator::new(fetcher, sink, settings.run.clone()).with_cancellation(interrupt_token());
    let out = aggregator.run(units, start_index).await?;
    print_summary(&out);
    Ok((out, aggregator.into_site()))
}

async fn run_naver(settings: &CrawlerSettings, output: &Path, start_page: u32) -> Result<()> {
    info!("🏠 Map listing crawler");
    let site = NaverSite::new(settings.timeout())?;
    let start_page = start_page.max(1);
    let units = (start_page..).map(WorkUnit::page);

    let (out, _) = crawl(site, settings, output, "naver_properties", units, 0).await?;

    println!("   Shared-address listings: {}", count_shared_addresses(&out.records));
    for (i, record) in out.records.iter().take(3).enumerate() {
        let field = |key: &str| record.get(key).map(cell_text).unwrap_or_default();
        println!("{}. {} ({} / {})", i + 1, field("매물제목"), field("보증금"), field("월세"));
        println!("   {}", field("주소"));
    }
    Ok(())
}

async fn run_rooms(
    settings: &CrawlerSettings,
    output: &Path,
    areas: &Path,
    start_index: usize,
) -> Result<()> {
    info!("🏠 Room search crawler");
    let table = AreaTable::load(areas)
        .with_context(|| format!("Failed to load area table {}", areas.display()))?;
    info!(
        regions = table.regions.len(),
        areas = table.area_count(),
        "Loaded area table"
    );

    let site = RoomSearchSite::new(
        table.subdivisions.clone(),
        settings.retry.clone(),
        settings.timeout(),
    )?;
    let (out, _) = crawl(site, settings, output, "33m2_rooms", table.units(), start_index).await?;

    println!("   Rooms per region:");
    for (region, count) in records_per_region(&out.records) {
        println!("     {}: {}", region, count);
    }
    Ok(())
}

async fn login(email: Option<String>, password: Option<String>) -> Result<SessionToken> {
    let (Some(email), Some(password)) = (email, password) else {
        bail!("EMAIL and PASSWORD (or ROOMS_SESSION) are required for the occupancy analyzer");
    };
    let credentials = Credentials { email, password };

    tokio::task::spawn_blocking(move || BrowserLogin::new()?.login(&credentials))
        .await
        .context("Login task panicked")?
        .context("Login failed")
}

/// One unit per input row; rows without a `rid` keep their position but are skipped.
fn listing_units(rows: Vec<rental_scout::models::Record>) -> Vec<WorkUnit> {
    rows.into_iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let rid = row.get("rid").map(cell_text).unwrap_or_default();
            if rid.trim().is_empty() {
                warn!(row = index, "row has no rid, skipped");
                return None;
            }
            Some(WorkUnit::listing(index, rid.trim(), row))
        })
        .collect()
}

async fn run_occupancy(
    settings: &CrawlerSettings,
    output: &Path,
    input: &Path,
    start_index: usize,
    session: SessionToken,
) -> Result<()> {
    info!("🎯 Four-week occupancy analyzer");
    let table = read_table(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let total = table.rows.len();
    let units = listing_units(table.rows);
    info!(input = %input.display(), rooms = total, "Loaded rooms");

    let window = OccupancyWindow::today();
    info!(
        start = %window.start,
        end = %window.end,
        months = window.months.len(),
        "Analysis window"
    );

    let site = ScheduleSite::new(session, window, settings.inner_delay, settings.timeout())?;
    let (out, site) = crawl(site, settings, output, "33m2_occupancy", units, start_index).await?;

    let (requests, failed) = site.request_stats();
    info!(
        requests,
        failed,
        success_rate = format!("{:.1}%", site.request_success_rate()),
        "Schedule requests"
    );
    println!(
        "   Schedule requests: {} sent, {} failed ({:.1}% success)",
        requests,
        failed,
        site.request_success_rate()
    );

    let rates: Vec<f64> = out
        .records
        .iter()
        .filter_map(|r| r.get("occupancy_rate_percent").and_then(|v| v.as_f64()))
        .collect();
    if !rates.is_empty() {
        let mean = rates.iter().sum::<f64>() / rates.len() as f64;
        println!("   Average occupancy: {:.2}% over {} rooms", mean, rates.len());
    }
    Ok(())
}

fn print_summary(out: &RunOutput) {
    let summary = &out.summary;
    println!();
    println!("✅ {} records, {} columns", summary.records, summary.columns);
    println!(
        "   Units: {} attempted, {} succeeded, {} recovered on retry",
        summary.units_attempted, summary.units_succeeded, summary.recovered
    );
    println!(
        "   Elapsed: {:.1} min ({:.1} records/min, {:.1}% success)",
        summary.elapsed.as_secs_f64() / 60.0,
        summary.records_per_minute(),
        summary.success_rate()
    );
    if !summary.unresolved.is_empty() {
        let ids: Vec<_> = summary.unresolved.iter().map(|u| u.id.as_str()).collect();
        println!("   Unresolved: {}", ids.join(", "));
    }
    if summary.interrupted {
        println!("   Run was interrupted; rerun with a start offset to continue");
    }
    println!("💾 {}", summary.final_path.display());
}
