//! shortsurvey - short-video viewing survey
//!
//! Records participant interactions and produces per-pair measurement
//! results. Also exposes the admin operations: table export, clear with
//! backup, bulk import and the platform comment crawl.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use shortsurvey_core::types::{CommentPage, EventKind, Feed};
use shortsurvey_core::{
    AdminTable, Config, CrawlJob, CrawlSnapshot, CrawlStatus, Database, MetricsTable, Sheet,
    StartOutcome,
};

#[derive(Parser)]
#[command(name = "shortsurvey")]
#[command(about = "Short-video engagement survey: event log and measurement results")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Check credentials and log a login event; prints the new session id
    Login {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        password: String,
    },

    /// Append one interaction event and apply its toggle
    LogEvent {
        #[arg(short, long)]
        user: String,
        /// Video URL (use N/A for events without a video)
        #[arg(short, long)]
        video: String,
        /// Event kind, e.g. watch_start, like, like_cancel
        #[arg(short, long)]
        kind: String,
        #[arg(short, long, default_value = "")]
        session: String,
    },

    /// Show the active videos with the user's activity state
    Feed {
        #[arg(short, long)]
        user: String,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show one page of comment threads for a video
    Comments {
        #[arg(short, long)]
        video: String,
        /// Page number, starting at 1
        #[arg(short, long, default_value_t = 1)]
        page: usize,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Post a comment (or a reply with --parent) as a participant
    Comment {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        video: String,
        #[arg(short, long)]
        text: String,
        /// Comment id being replied to
        #[arg(long)]
        parent: Option<String>,
    },

    /// Compute measurement results
    Metrics {
        /// Keep rows whose user id contains this text
        #[arg(short, long)]
        user: Option<String>,
        /// Keep rows whose video id contains this text
        #[arg(short, long)]
        video: Option<String>,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Export a table (or measurement_results) as a JSON sheet
    Export {
        table: String,
        #[arg(short, long)]
        user: Option<String>,
        #[arg(short, long)]
        video: Option<String>,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Back up a table, then delete all of its rows
    Clear { table: String },

    /// Replace users or videos with the rows of a JSON sheet
    Import { table: String, file: PathBuf },

    /// Crawl platform comments for every active video
    Crawl,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        shortsurvey_core::logging::init(&config.logging).context("failed to initialize logging")?;

    // Open database
    let db_path = Config::database_path();
    tracing::debug!(path = %db_path.display(), "Opening database");
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    match cli.command {
        Command::Login { user, password } => match db.record_login(&user, &password)? {
            Some(session_id) => println!("{}", session_id),
            None => bail!("invalid user id or password"),
        },

        Command::LogEvent {
            user,
            video,
            kind,
            session,
        } => {
            let kind: EventKind = kind.parse()?;
            let event = db
                .record_event(&user, &video, kind, &session)
                .context("failed to record event")?;
            println!("Logged {} for {} on {}", event.kind, event.user_id, event.video_id);
        }

        Command::Feed { user, format } => {
            let feed = db.feed(&user)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&feed)?),
                OutputFormat::Text => print_feed(&feed),
            }
        }

        Command::Comments {
            video,
            page,
            format,
        } => {
            let comments = db.comment_page(&video, page, config.comments.page_size)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&comments)?),
                OutputFormat::Text => print_comment_page(&comments, page),
            }
        }

        Command::Comment {
            user,
            video,
            text,
            parent,
        } => {
            let comment = db.add_comment(
                &user,
                &video,
                &text,
                parent.as_deref(),
                &config.comments.avatar_base_url,
            )?;
            println!("{}", comment.comment_id);
        }

        Command::Metrics {
            user,
            video,
            format,
        } => {
            let table = db
                .compute_metrics(user.as_deref(), video.as_deref())
                .context("failed to compute measurement results")?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&table)?),
                OutputFormat::Text => print_metrics(&table),
            }
        }

        Command::Export {
            table,
            user,
            video,
            output,
        } => {
            let table: AdminTable = table.parse()?;
            let sheet = db.export_table(table, user.as_deref(), video.as_deref())?;
            match output {
                Some(path) => {
                    sheet
                        .save(&path)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Exported {} rows to {}", sheet.rows.len(), path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&sheet)?),
            }
        }

        Command::Clear { table } => {
            let table: AdminTable = table.parse()?;
            let backup_dir = config.export.backup_dir();
            match db.clear_table(table, &backup_dir)? {
                Some(path) => println!("Cleared {}; backup written to {}", table, path.display()),
                None => println!("{} is already empty", table),
            }
        }

        Command::Import { table, file } => {
            let table: AdminTable = table.parse()?;
            let sheet = Sheet::load(&file)
                .with_context(|| format!("failed to read sheet {}", file.display()))?;
            let count = db.import_sheet(table, &sheet)?;
            println!("Imported {} rows into {}", count, table);
        }

        Command::Crawl => run_crawl(db, &config)?,
    }

    Ok(())
}

/// Run a crawl in the foreground, showing its progress line on a spinner.
fn run_crawl(db: Database, config: &Config) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let job = CrawlJob::new(Arc::new(db), Arc::new(CrawlStatus::new()));

    let status = runtime.block_on(wait_for_crawl(&job, config))?;
    if status.progress.starts_with("error:") {
        bail!("crawl failed: {}", status.progress);
    }
    println!("{}", status.progress);
    Ok(())
}

async fn wait_for_crawl(job: &CrawlJob, config: &Config) -> Result<CrawlSnapshot> {
    let handle = match job.start(config.crawler.clone()) {
        StartOutcome::Started(handle) => handle,
        StartOutcome::AlreadyRunning => bail!("a crawl is already running"),
    };

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("invalid progress template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    while !handle.is_finished() {
        pb.set_message(job.status().progress);
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    handle.await.context("crawl task failed")?;
    pb.finish_and_clear();

    Ok(job.status())
}

fn print_feed(feed: &Feed) {
    if feed.items.is_empty() {
        println!("No active videos.");
        return;
    }

    for item in &feed.items {
        let marker = if feed.last_watched.as_deref() == Some(item.video.url.as_str()) {
            "*"
        } else {
            " "
        };
        let a = &item.activity;
        println!(
            "{} {:>4}  {:<14} comments={:<4} like={} dislike={} share={} subscribe={}  {}",
            marker,
            item.video.seq,
            item.platform_id,
            item.comment_count,
            a.like,
            a.dislike,
            a.share,
            a.subscribe,
            item.video.channel_name.as_deref().unwrap_or("-"),
        );
    }
}

fn print_comment_page(page: &CommentPage, number: usize) {
    if page.comments.is_empty() {
        println!("No comments on page {}.", number.max(1));
        return;
    }

    for thread in &page.comments {
        let c = &thread.comment;
        println!("[{}] {} ({} likes): {}", c.published_at, c.author, c.like_count, c.text);
        for reply in &thread.replies {
            println!("    [{}] {}: {}", reply.published_at, reply.author, reply.text);
        }
    }
    if page.has_next_page {
        println!("-- more on page {} --", number.max(1) + 1);
    }
}

fn print_metrics(table: &MetricsTable) {
    println!("{}", table.columns.join("\t"));
    for row in &table.rows {
        let cells: Vec<String> = row.cells().iter().map(|c| c.to_string()).collect();
        println!("{}", cells.join("\t"));
    }
    println!("({} rows)", table.rows.len());
}
