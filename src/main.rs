use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::{Args, Parser, Subcommand};
use std::fmt::Display;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;

use feeda::config::Config;
use feeda::feed::build_client;
use feeda::storage::{Database, DatabaseError, Entry, EntryFilter, FeedStats, ReadStatus};
use feeda::sync::{SyncOptions, Syncer};
use feeda::util::parse_ids;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Parser, Debug)]
#[command(name = "feeda", version, about = "Aggregate RSS and Atom feeds into a local database")]
struct Cli {
    /// Database file [default: ~/.feeda/db.sqlite]
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Config file [default: ~/.config/feeda/config.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add RSS/Atom feeds by URL
    Add {
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,
    },
    /// Fetch new entries for the given feeds, or all feeds
    Sync {
        #[arg(value_name = "FEED_ID")]
        ids: Vec<String>,
    },
    /// List entries, oldest first
    List(ListArgs),
    /// List all feeds with their entry counts
    #[command(name = "listFeeds")]
    ListFeeds,
    /// Delete entries
    Delete {
        #[arg(required = true, value_name = "ENTRY_ID")]
        ids: Vec<String>,
    },
    /// Delete feeds together with their entries
    #[command(name = "deleteFeed")]
    DeleteFeed {
        #[arg(required = true, value_name = "FEED_ID")]
        ids: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct ListArgs {
    /// List only unread entries
    #[arg(short, long)]
    unread: bool,

    /// Mark the listed entries as read
    #[arg(short = 'r', long = "setAsRead")]
    set_as_read: bool,

    /// Maximum number of entries, 0 for all [default: 10]
    #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(i64).range(0..))]
    limit: Option<i64>,

    /// Skip this many entries
    #[arg(long, value_name = "N", default_value_t = 0, value_parser = clap::value_parser!(i64).range(0..))]
    offset: i64,

    /// Only entries of this feed
    #[arg(short, long, value_name = "FEED_ID", value_parser = clap::value_parser!(i64).range(1..))]
    feed: Option<i64>,

    /// Print only the entry URLs
    #[arg(short = 'o', long = "onlyURL")]
    only_url: bool,
}

/// Get the home directory from `$HOME`
fn home_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home))
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = match path {
        Some(path) => path,
        None => match home_dir() {
            Ok(home) => home.join(".config").join("feeda").join("config.toml"),
            Err(_) => return Ok(Config::default()),
        },
    };
    Config::load(&path).with_context(|| format!("Failed to load config from {}", path.display()))
}

/// `--db`, then `db_path` from the config file, then `~/.feeda/db.sqlite`.
fn resolve_db_path(flag: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    if let Some(path) = flag.or_else(|| config.db_path.clone()) {
        return Ok(path);
    }

    let data_dir = home_dir()?.join(".feeda");
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        tracing::info!(path = %data_dir.display(), "Created data directory");

        // User-only access to the database directory
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(&data_dir, std::fs::Permissions::from_mode(0o700))
            {
                tracing::warn!(
                    path = %data_dir.display(),
                    error = %e,
                    "Failed to set data directory permissions to 0700"
                );
            }
        }
    }
    Ok(data_dir.join("db.sqlite"))
}

async fn open_database(path: &std::path::Path) -> Result<Database> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => anyhow::bail!(
            "Database {} is locked by another feeda process. Try again when it has finished.",
            path.display()
        ),
        Err(e) => Err(e).with_context(|| format!("Failed to open database {}", path.display())),
    }
}

fn syncer(db: Database, config: &Config) -> Result<Syncer> {
    let client = build_client(&config.user_agent, config.fetch_timeout())
        .context("Failed to create HTTP client")?;
    Ok(Syncer::new(db, client, SyncOptions::from(config)))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr so stdout stays clean for piping (`list --onlyURL`)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = load_config(cli.config)?;
    let db_path = resolve_db_path(cli.db, &config)?;
    let db = open_database(&db_path).await?;

    match cli.command {
        Command::Add { urls } => add(db, &config, &urls).await,
        Command::Sync { ids } => sync(db, &config, &ids).await,
        Command::List(args) => list(&db, &config, &args).await,
        Command::ListFeeds => list_feeds(&db).await,
        Command::Delete { ids } => {
            let ids = parse_ids(&ids)?;
            let deleted = db
                .delete_entries(&ids)
                .await
                .context("Failed to delete entries")?;
            tracing::info!(requested = ids.len(), deleted = deleted, "Deleted entries");
            Ok(ExitCode::SUCCESS)
        }
        Command::DeleteFeed { ids } => {
            let ids = parse_ids(&ids)?;
            let deleted = db
                .delete_feeds(&ids)
                .await
                .context("Failed to delete feeds")?;
            tracing::info!(requested = ids.len(), deleted = deleted, "Deleted feeds");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn add(db: Database, config: &Config, urls: &[String]) -> Result<ExitCode> {
    let report = syncer(db, config)?.add_feeds(urls).await?;

    let mut failed = false;
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(feed_type) => println!("{} ({})", outcome.url, feed_type),
            Err(e) => {
                failed = true;
                eprintln!("Could not add {}: {}", outcome.url, e);
            }
        }
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn sync(db: Database, config: &Config, ids: &[String]) -> Result<ExitCode> {
    let ids = parse_ids(ids)?;
    let syncer = syncer(db, config)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling sync");
            let _ = cancel_tx.send(true);
        }
    });

    let report = syncer
        .sync_with_cancel(&ids, cancel_rx)
        .await
        .context("Sync failed")?;

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(added) => println!("{}. {} items added", outcome.feed_id, added),
            Err(e) => eprintln!("{}. {} failed: {}", outcome.feed_id, outcome.url, e),
        }
    }

    Ok(if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn list(db: &Database, config: &Config, args: &ListArgs) -> Result<ExitCode> {
    let limit = args.limit.unwrap_or(config.list_limit);
    let filter = EntryFilter {
        feed_id: args.feed,
        read_status: args.unread.then_some(ReadStatus::Unread),
        limit: (limit > 0).then_some(limit),
        offset: (args.offset > 0).then_some(args.offset),
    };

    let entries = db
        .list_entries(&filter)
        .await
        .context("Failed to list entries")?;

    let mut out = std::io::stdout().lock();
    for entry in &entries {
        if args.only_url {
            writeln!(out, "{}", entry.url)?;
        } else {
            write_entry(&mut out, entry, &Local)?;
        }
    }
    out.flush()?;

    if args.set_as_read {
        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        let marked = db
            .set_entries_read_now(&ids)
            .await
            .context("Failed to mark entries as read")?;
        tracing::debug!(marked = marked, "Marked listed entries as read");
    }

    Ok(ExitCode::SUCCESS)
}

async fn list_feeds(db: &Database) -> Result<ExitCode> {
    let stats = db.feed_stats().await.context("Failed to list feeds")?;

    let mut out = std::io::stdout().lock();
    for feed in &stats {
        writeln!(out, "{}", feed_line(feed, &Local))?;
    }
    out.flush()?;

    Ok(ExitCode::SUCCESS)
}

fn format_timestamp<Tz>(secs: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    match tz.timestamp_opt(secs, 0).single() {
        Some(dt) => dt.format(DATE_FORMAT).to_string(),
        None => secs.to_string(),
    }
}

fn write_entry<W, Tz>(out: &mut W, entry: &Entry, tz: &Tz) -> std::io::Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    writeln!(out, "{}. {}", entry.id, entry.title)?;
    writeln!(out, "{}", entry.url)?;
    writeln!(out, "Published: {}", format_timestamp(entry.published_at, tz))?;
    match entry.read_at {
        Some(read_at) => writeln!(out, "Read: {}", format_timestamp(read_at, tz))?,
        None => writeln!(out, "Unread")?,
    }
    writeln!(out, "{}", entry.description)?;
    writeln!(out)
}

fn feed_line<Tz>(stats: &FeedStats, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut attrs = Vec::with_capacity(3);
    if let Some(synced_at) = stats.feed.synced_at {
        attrs.push(format!("Synced: {}", format_timestamp(synced_at, tz)));
    }
    attrs.push(format!("Total: {}", stats.total));
    attrs.push(format!("Unread: {}", stats.unread));

    format!("{}. {} ({})", stats.feed.id, stats.feed.url, attrs.join(", "))
}
