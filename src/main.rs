//! Wiring & DI. Entry point: parse the command line, bootstrap adapters, inject
//! into services, print results. No business logic here.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tg_cache::adapters::persistence::ocr_cache::{OCR_CACHE_FILE, OcrEntry};
use tg_cache::adapters::persistence::{
    AnchorsJson, FsArchiveStore, FsReportStore, FsSnapshotStore, OcrCache,
};
use tg_cache::adapters::telegram::{GrammersGateway, session};
use tg_cache::adapters::ui::{render_border, render_messages, render_validation};
use tg_cache::domain::{DateFilter, ValidationReport};
use tg_cache::ports::ChatGateway;
use tg_cache::shared::clock::LocalClock;
use tg_cache::shared::config::AppConfig;
use tg_cache::shared::credentials::Credentials;
use tg_cache::usecases::anchor_service::DEFAULT_ANCHOR_RETENTION_DAYS;
use tg_cache::usecases::archive_service::DEFAULT_ARCHIVE_RETENTION_DAYS;
use tg_cache::usecases::boundary_service::DEFAULT_EXPANSION_STEPS;
use tg_cache::usecases::cache_service::DEFAULT_KEEP_LATEST;
use tg_cache::usecases::content_verifier::VerifyOptions;
use tg_cache::usecases::fetch_service::{BATCH_SIZE, FetchRequest};
use tg_cache::usecases::filter_service::{FilterQuery, export_summary};
use tg_cache::usecases::{
    AnchorService, ArchiveService, BorderValidator, BoundaryService, CacheService,
    ContentVerifier, FetchService, FilterService, GapPolicy, GapValidator,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tg-cache", version)]
#[command(about = "Cache Telegram channel history as JSON snapshots and validate it against the live API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one batch of history into a new snapshot
    Fetch {
        channel: String,
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
        /// Start below this message id (0 = newest)
        #[arg(long, default_value_t = 0)]
        offset_id: i32,
        #[arg(long)]
        suffix: Option<String>,
        /// Fetch the newest messages instead of starting from the previous day's anchor
        #[arg(long)]
        no_anchor: bool,
    },
    /// Page through history in batches of 100
    FetchLarge {
        channel: String,
        #[arg(short, long, default_value_t = 1000)]
        limit: usize,
    },
    /// Scan back until the window of a date selector is covered
    FetchWindow {
        channel: String,
        /// today, yesterday, last:N, YYYY-MM-DD or all
        filter: DateFilter,
        #[arg(long, default_value_t = BATCH_SIZE)]
        batch: usize,
    },
    /// Show cached messages for a date selector
    Filter {
        channel: String,
        #[arg(default_value = "today")]
        filter: DateFilter,
        /// Case-insensitive regex over message text
        #[arg(short, long)]
        pattern: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
        /// Never refetch when the date border is incomplete
        #[arg(long)]
        no_auto_fetch: bool,
    },
    /// Export cached messages for a date selector as JSON
    Export {
        channel: String,
        #[arg(default_value = "today")]
        filter: DateFilter,
        /// Full messages instead of a summary
        #[arg(long)]
        full: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check the cached window edges against the live channel
    Boundary {
        channel: String,
        #[arg(default_value = "today")]
        filter: DateFilter,
        /// Fetch past the edges when fresher messages exist
        #[arg(long)]
        expand: bool,
        #[arg(long, default_value_t = DEFAULT_EXPANSION_STEPS)]
        steps: usize,
    },
    /// Find and triple-verify the first message of a date
    Border {
        channel: String,
        date: NaiveDate,
        /// Compare with the first cached message of the date
        #[arg(long)]
        verify_cache: bool,
        /// Download and hash the media of the first message
        #[arg(long)]
        media: bool,
    },
    /// Gap, daily boundary and continuity checks of the newest snapshot
    Gaps {
        channel: String,
        /// Defaults to today
        date: Option<NaiveDate>,
    },
    /// Re-fetch a sample of cached messages and compare the content
    Verify {
        channel: String,
        /// Snapshot to verify instead of the newest one
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        sample_size: Option<usize>,
        #[arg(long)]
        no_media: bool,
        #[arg(long)]
        require_views: bool,
        /// Write a corrected copy when verification fails
        #[arg(long)]
        auto_correct: bool,
    },
    /// Temporal anchors
    Anchor {
        #[command(subcommand)]
        action: AnchorCommand,
    },
    /// Daily archive
    Daily {
        #[command(subcommand)]
        action: DailyCommand,
    },
    /// Snapshot maintenance and the OCR cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand)]
enum AnchorCommand {
    Set {
        channel: String,
        message_id: i64,
        /// HH:MM:SS
        timestamp: String,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Get {
        channel: String,
        date: NaiveDate,
    },
    /// Fetch offset derived from the previous day's anchor
    Offset {
        channel: String,
        date: Option<NaiveDate>,
    },
    List {
        channel: Option<String>,
    },
    Validate {
        channel: String,
        date: NaiveDate,
    },
    Cleanup {
        #[arg(long, default_value_t = DEFAULT_ANCHOR_RETENTION_DAYS)]
        days: i64,
    },
    Stats,
}

#[derive(Subcommand)]
enum DailyCommand {
    Archive {
        channel: String,
        date: Option<NaiveDate>,
    },
    Restore {
        channel: String,
        date: NaiveDate,
    },
    Get {
        channel: String,
        date: NaiveDate,
    },
    List {
        channel: Option<String>,
    },
    Cleanup {
        #[arg(long, default_value_t = DEFAULT_ARCHIVE_RETENTION_DAYS)]
        days: i64,
    },
    Stats,
}

#[derive(Subcommand)]
enum CacheCommand {
    Info,
    Clean {
        channel: Option<String>,
        #[arg(long, default_value_t = DEFAULT_KEEP_LATEST)]
        keep: usize,
    },
    /// Whether the newest snapshot is within the TTL of a selector
    Check {
        channel: String,
        #[arg(default_value = "today")]
        filter: DateFilter,
    },
    /// Store recognised text for a media message
    OcrSet {
        channel: String,
        message_id: i32,
        text: String,
    },
}

/// Local stores and services shared by every command.
struct App {
    cfg: AppConfig,
    clock: LocalClock,
    snapshots: Arc<FsSnapshotStore>,
    archive: Arc<FsArchiveStore>,
    reports: Arc<FsReportStore>,
    anchors: Arc<AnchorService>,
}

impl App {
    async fn bootstrap(cfg: AppConfig) -> anyhow::Result<Self> {
        let clock = LocalClock::system(cfg.tz_offset()?);
        let data_dir = cfg.data_dir_or_default();
        info!(path = %data_dir.display(), "data directory");

        let anchors_store = AnchorsJson::new(data_dir.join("anchors.json"));
        anchors_store.load().await?;
        let anchors = Arc::new(AnchorService::new(Arc::new(anchors_store), clock.clone()));

        Ok(Self {
            snapshots: Arc::new(FsSnapshotStore::new(&data_dir)),
            archive: Arc::new(FsArchiveStore::new(data_dir.join("daily"))),
            reports: Arc::new(FsReportStore::new(cfg.verification_dir_or_default())),
            anchors,
            clock,
            cfg,
        })
    }

    /// Connect to Telegram with the stored session.
    async fn gateway(&self) -> anyhow::Result<Arc<dyn ChatGateway>> {
        let creds = Credentials::load(&self.cfg.credentials_path_or_default()).await?;
        let client = session::connect(&creds).await?;
        Ok(Arc::new(GrammersGateway::new(
            client,
            self.clock.offset(),
            self.cfg.export_delay_ms,
        )))
    }

    fn fetcher(&self, gateway: Arc<dyn ChatGateway>) -> FetchService {
        FetchService::new(
            gateway,
            self.snapshots.clone(),
            self.anchors.clone(),
            self.clock.clone(),
            Duration::from_millis(self.cfg.export_delay_ms_or_default()),
        )
    }

    fn filter_service(&self) -> FilterService {
        FilterService::new(self.snapshots.clone(), self.clock.clone())
    }

    fn archive_service(&self) -> ArchiveService {
        ArchiveService::new(self.snapshots.clone(), self.archive.clone(), self.clock.clone())
    }

    fn gap_policy(&self) -> GapPolicy {
        GapPolicy {
            deletion_threshold: self.cfg.deletion_threshold_or_default(),
            max_gap_size: self.cfg.max_gap_size_or_default(),
            min_sequence_length: self.cfg.min_sequence_length_or_default(),
        }
    }

    async fn ocr_cache(&self) -> OcrCache {
        OcrCache::load(self.cfg.data_dir_or_default().join(OCR_CACHE_FILE)).await
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print the common report; true when it passed.
fn report(title: &str, report: ValidationReport) -> bool {
    print!("{}", render_validation(title, &report));
    report.passed()
}

fn exit_code(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = AppConfig::load().context("load configuration")?;
    let app = App::bootstrap(cfg).await?;

    let ok = match cli.command {
        Commands::Fetch {
            channel,
            limit,
            offset_id,
            suffix,
            no_anchor,
        } => {
            let fetcher = app.fetcher(app.gateway().await?);
            let req = FetchRequest {
                channel,
                limit,
                offset_id,
                suffix,
                use_anchor: !no_anchor,
            };
            let out = fetcher.fetch_and_cache(&req).await?;
            println!(
                "✅ Cached {} messages to {}",
                out.snapshot.messages.len(),
                out.path.display()
            );
            if let Some(anchor) = out.anchor_updated {
                println!("⚓ Anchor set: message {} at {}", anchor.message_id, anchor.timestamp);
            }
            true
        }
        Commands::FetchLarge { channel, limit } => {
            let out = app
                .fetcher(app.gateway().await?)
                .fetch_large(&channel, limit)
                .await?;
            println!(
                "✅ Cached {} messages to {}",
                out.snapshot.messages.len(),
                out.path.display()
            );
            true
        }
        Commands::FetchWindow {
            channel,
            filter,
            batch,
        } => {
            let out = app
                .fetcher(app.gateway().await?)
                .fetch_window(&channel, &filter, batch)
                .await?;
            println!(
                "✅ Cached {} messages for {} to {}",
                out.snapshot.messages.len(),
                filter,
                out.path.display()
            );
            true
        }
        Commands::Filter {
            channel,
            filter,
            pattern,
            limit,
            no_auto_fetch,
        } => run_filter(&app, &channel, filter, pattern, limit, no_auto_fetch).await?,
        Commands::Export {
            channel,
            filter,
            full,
            output,
        } => {
            let service = app.filter_service();
            let result = service.filter(&channel, &FilterQuery::new(filter)).await?;
            let json = if full {
                serde_json::to_string_pretty(&service.export_full(&channel, &filter, result.messages))?
            } else {
                serde_json::to_string_pretty(&export_summary(&result.messages))?
            };
            match output {
                Some(path) => {
                    tokio::fs::write(&path, json)
                        .await
                        .with_context(|| format!("write {}", path.display()))?;
                    println!("✅ Exported to {}", path.display());
                }
                None => println!("{}", json),
            }
            true
        }
        Commands::Boundary {
            channel,
            filter,
            expand,
            steps,
        } => run_boundary(&app, &channel, filter, expand, steps).await?,
        Commands::Border {
            channel,
            date,
            verify_cache,
            media,
        } => {
            let mut validator =
                BorderValidator::new(app.gateway().await?, app.reports.clone(), app.clock.clone());
            if media {
                validator = validator.with_media_dir(app.cfg.media_dir_or_default());
            }
            if verify_cache {
                let (_, snapshot) = app.filter_service().load_latest(&channel).await?;
                let (comparison, live) = validator.compare(&snapshot, date).await?;
                let live_ok = report("First message", ValidationReport::from(&live));
                let cached_ok = report("Cached border", ValidationReport::from(&comparison));
                live_ok && cached_ok
            } else {
                let (first, path) = validator.find_first_message_of_date(&channel, date).await?;
                if let Some(m) = &first.first_message {
                    println!("[{}] #{} {}", m.date_msk, m.id, m.text_preview(100));
                }
                println!("Report: {}", path.display());
                report("First message", ValidationReport::from(&first))
            }
        }
        Commands::Gaps { channel, date } => {
            let (_, snapshot) = app.filter_service().load_latest(&channel).await?;
            let date = date.unwrap_or_else(|| app.clock.today());
            let validator = GapValidator::new(app.gap_policy(), app.anchors.clone(), app.archive.clone());
            let completeness = validator.comprehensive(&channel, &snapshot.messages, date).await?;
            println!(
                "Score: {}/100 ({})",
                completeness.score, completeness.confidence_level
            );
            report("Completeness", ValidationReport::from(&completeness))
        }
        Commands::Verify {
            channel,
            file,
            sample_size,
            no_media,
            require_views,
            auto_correct,
        } => {
            let path = match file {
                Some(path) => path,
                None => app.filter_service().load_latest(&channel).await?.0,
            };
            let opts = VerifyOptions {
                sample_size: sample_size.unwrap_or_else(|| app.cfg.sample_size_or_default()),
                verify_media: !no_media,
                require_views_match: require_views,
            };
            run_verify(&app, &path, &opts, auto_correct).await?
        }
        Commands::Anchor { action } => run_anchor(&app, action).await?,
        Commands::Daily { action } => run_daily(&app, action).await?,
        Commands::Cache { action } => run_cache(&app, action).await?,
    };

    Ok(exit_code(ok))
}

async fn run_filter(
    app: &App,
    channel: &str,
    filter: DateFilter,
    pattern: Option<String>,
    limit: Option<usize>,
    no_auto_fetch: bool,
) -> anyhow::Result<bool> {
    let mut service = app.filter_service();
    if !no_auto_fetch && filter.target_date(app.clock.today()).is_some() {
        match app.gateway().await {
            Ok(gateway) => {
                service = service.with_auto_fetch(
                    Arc::new(app.fetcher(gateway)),
                    app.cfg.border_max_retries_or_default(),
                );
            }
            Err(e) => warn!(error = %e, "telegram unavailable, border auto-fetch disabled"),
        }
    }

    let query = FilterQuery {
        filter,
        pattern,
        limit,
    };
    let result = service.filter(channel, &query).await?;
    info!(
        cache = %result.cache_file.display(),
        cached = result.total_cached,
        refetches = result.refetches,
        "filter complete"
    );

    let ocr = app.ocr_cache().await;
    print!("{}", render_messages(&result.messages, channel, Some(&ocr)));
    println!("{}", render_border(&result.border));
    Ok(true)
}

async fn run_boundary(
    app: &App,
    channel: &str,
    filter: DateFilter,
    expand: bool,
    steps: usize,
) -> anyhow::Result<bool> {
    let service = BoundaryService::new(app.gateway().await?, app.snapshots.clone(), app.clock.clone());
    let (boundary, path, _) = service.validate(channel, &filter).await?;
    let passed = report("Boundary", ValidationReport::from(&boundary));

    match (boundary.freshness.expansion, expand) {
        (Some(direction), true) => {
            let out = service.expand(&path, direction, steps).await?;
            println!(
                "🔄 Expanded {} to {} messages: {}",
                direction,
                out.snapshot.messages.len(),
                out.path.display()
            );
            Ok(true)
        }
        (Some(direction), false) => {
            println!("🔄 Newer or older messages exist ({}); rerun with --expand", direction);
            Ok(false)
        }
        (None, _) => Ok(passed),
    }
}

async fn run_verify(
    app: &App,
    path: &Path,
    opts: &VerifyOptions,
    auto_correct: bool,
) -> anyhow::Result<bool> {
    let verifier = ContentVerifier::new(
        app.gateway().await?,
        app.snapshots.clone(),
        app.reports.clone(),
        app.clock.clone(),
    );
    let (content, report_path) = verifier.verify_cache_file(path, opts).await?;
    println!(
        "Verified {}/{} sampled messages ({:.0}%)",
        content.verified_count,
        content.sample_size,
        content.verification_rate * 100.0
    );
    println!("Report: {}", report_path.display());
    let passed = report("Content", ValidationReport::from(&content));

    if auto_correct && !passed {
        if let Some(outcome) = verifier.auto_correct(path, &content).await? {
            println!(
                "🔧 Applied {} corrections: {}",
                outcome.corrections_applied,
                outcome.path.display()
            );
        }
    }
    Ok(passed)
}

async fn run_anchor(app: &App, action: AnchorCommand) -> anyhow::Result<bool> {
    let anchors = &app.anchors;
    match action {
        AnchorCommand::Set {
            channel,
            message_id,
            timestamp,
            date,
        } => {
            let date = date.unwrap_or_else(|| app.clock.today());
            let anchor = anchors.set_anchor(&channel, message_id, &timestamp, date).await?;
            print_json(&anchor)?;
        }
        AnchorCommand::Get { channel, date } => match anchors.get_anchor(&channel, date).await? {
            Some(anchor) => print_json(&anchor)?,
            None => {
                println!("No anchor for {} on {}", channel, date);
                return Ok(false);
            }
        },
        AnchorCommand::Offset { channel, date } => {
            let date = date.unwrap_or_else(|| app.clock.today());
            print_json(&anchors.calculate_fetch_offset(&channel, date).await?)?;
        }
        AnchorCommand::List { channel } => print_json(&anchors.list(channel.as_deref()).await?)?,
        AnchorCommand::Validate { channel, date } => {
            let validation = anchors.validate(&channel, date).await?;
            print_json(&validation)?;
            return Ok(validation.valid);
        }
        AnchorCommand::Cleanup { days } => {
            let removed = anchors.cleanup(days).await?;
            println!("Removed {} anchors older than {} days", removed, days);
        }
        AnchorCommand::Stats => print_json(&anchors.stats().await?)?,
    }
    Ok(true)
}

async fn run_daily(app: &App, action: DailyCommand) -> anyhow::Result<bool> {
    let service = app.archive_service();
    match action {
        DailyCommand::Archive { channel, date } => {
            let path = service.archive_latest(&channel, date).await?;
            println!("✅ Archived to {}", path.display());
        }
        DailyCommand::Restore { channel, date } => {
            let path = service.restore(&channel, date).await?;
            println!("✅ Restored to {}", path.display());
        }
        DailyCommand::Get { channel, date } => match service.get(&channel, date).await? {
            Some(snapshot) => print_json(&snapshot)?,
            None => {
                println!("No daily cache for {} on {}", channel, date);
                return Ok(false);
            }
        },
        DailyCommand::List { channel } => {
            for entry in service.list(channel.as_deref()).await? {
                println!("{}  {}  {} bytes", entry.date, entry.channel, entry.size);
            }
        }
        DailyCommand::Cleanup { days } => {
            let removed = service.cleanup(days).await?;
            println!("Removed {} daily directories older than {} days", removed, days);
        }
        DailyCommand::Stats => print_json(&service.stats().await?)?,
    }
    Ok(true)
}

async fn run_cache(app: &App, action: CacheCommand) -> anyhow::Result<bool> {
    let service = CacheService::new(app.snapshots.clone(), app.clock.clone());
    match action {
        CacheCommand::Info => print_json(&service.info().await?)?,
        CacheCommand::Clean { channel, keep } => {
            let removed = service.clean(channel.as_deref(), keep).await?;
            for path in &removed {
                println!("🗑️ {}", path.display());
            }
            println!("Removed {} snapshots", removed.len());
        }
        CacheCommand::Check { channel, filter } => {
            let check = service.check(&channel, &filter).await?;
            print_json(&check)?;
            return Ok(check.valid);
        }
        CacheCommand::OcrSet {
            channel,
            message_id,
            text,
        } => {
            let mut ocr = app.ocr_cache().await;
            let entry = OcrEntry {
                text,
                content_hash: None,
                updated_at: Some(app.clock.now()),
            };
            ocr.upsert_entry(&channel, message_id, entry);
            if ocr.save().await? {
                println!("✅ OCR text stored for {} #{}", channel, message_id);
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Commands {
        Cli::try_parse_from(args).unwrap().command
    }

    #[test]
    fn test_fetch_uses_anchor_by_default() {
        match parse(&["tg-cache", "fetch", "@aiclub"]) {
            Commands::Fetch { no_anchor, limit, .. } => {
                assert!(!no_anchor);
                assert_eq!(limit, 100);
            }
            _ => panic!("expected fetch"),
        }
        match parse(&["tg-cache", "fetch", "@aiclub", "--no-anchor"]) {
            Commands::Fetch { no_anchor, .. } => assert!(no_anchor),
            _ => panic!("expected fetch"),
        }
    }
}
