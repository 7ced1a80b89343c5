//! MP-Archiver main entry point
//!
//! This is the command-line interface for archiving WeChat public account articles.

use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use mp_archiver::api::{MpClient, WechatApi};
use mp_archiver::config::{load_config_with_hash, validate_crawl_config, Config};
use mp_archiver::crawler::{
    parse_account_list, shared_storage, BatchCoordinator, BatchProgress, LoggingObserver,
};
use mp_archiver::output::export_articles_csv;
use mp_archiver::session::{CredentialStore, SessionManager, StaticLogin};
use mp_archiver::state::Outcome;
use mp_archiver::storage::{ArticleQuery, SqliteStorage, Storage, PLATFORM_WECHAT};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// MP-Archiver: a polite archiver for WeChat public accounts
///
/// Walks the article history of public accounts through an authenticated
/// session, shares one rate limit across all accounts, and stores every
/// article once.
#[derive(Parser, Debug)]
#[command(name = "mp-archiver")]
#[command(version = "1.0.0")]
#[command(about = "A polite archiver for WeChat public account articles", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage the stored session credential
    #[command(subcommand)]
    Session(SessionCommand),

    /// Search public accounts by name
    Search {
        name: String,
    },

    /// Archive one or more accounts
    Crawl {
        #[arg(required = true)]
        accounts: Vec<String>,

        #[command(flatten)]
        overrides: CrawlOverrides,
    },

    /// Archive every account listed in a file
    Batch {
        /// File with account names separated by newlines, commas, semicolons or `|`
        file: PathBuf,

        #[command(flatten)]
        overrides: CrawlOverrides,
    },

    /// Query archived articles
    Articles {
        /// Only articles of this account
        #[arg(long)]
        account: Option<String>,

        /// Match title, content or summary (repeatable, any match)
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,

        /// Earliest publish date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Latest publish date (YYYY-MM-DD), inclusive
        #[arg(long)]
        until: Option<NaiveDate>,

        #[arg(long, default_value_t = 20)]
        limit: u32,

        #[arg(long, default_value_t = 0)]
        offset: u32,

        /// Write the matching articles to a CSV file instead of listing them
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Show statistics from the database
    Stats,
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Store a token and cookie string produced by a browser login
    Import {
        #[arg(long)]
        token: String,

        /// Cookie header, `name=value; name2=value2`
        #[arg(long)]
        cookies: String,

        /// Replace a stored credential that is still valid
        #[arg(long)]
        force: bool,
    },

    /// Show whether the stored credential is usable
    Status {
        /// Also ask the platform whether it accepts the credential
        #[arg(long)]
        remote: bool,
    },

    /// Remove the stored credential
    Clear,
}

#[derive(Args, Debug, Default)]
struct CrawlOverrides {
    /// Maximum pages per account
    #[arg(long)]
    pages: Option<u32>,

    /// Only articles from the last N days (0 for no limit)
    #[arg(long)]
    days: Option<u32>,

    /// Also fetch article bodies
    #[arg(long)]
    content: bool,

    /// Accounts walked in parallel
    #[arg(long)]
    concurrency: Option<usize>,

    /// Also write the crawled accounts' articles to a CSV file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

impl CrawlOverrides {
    fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(pages) = self.pages {
            config.crawl.max_pages = pages;
        }
        if let Some(days) = self.days {
            config.crawl.days = days;
        }
        if self.content {
            config.crawl.include_content = true;
        }
        if let Some(concurrency) = self.concurrency {
            config.crawl.concurrency = concurrency;
        }
        validate_crawl_config(&config.crawl)?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let (config, config_hash) = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::debug!("Configuration hash: {}", hash);
            (config, hash)
        }
        None => (Config::default(), "default".to_string()),
    };

    match cli.command {
        Command::Session(command) => handle_session(&config, command).await,
        Command::Search { name } => handle_search(&config, &name).await,
        Command::Crawl {
            accounts,
            overrides,
        } => handle_crawl(config, config_hash, accounts, &overrides).await,
        Command::Batch { file, overrides } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let accounts = parse_account_list(&text);
            if accounts.is_empty() {
                bail!("no account names found in {}", file.display());
            }
            handle_crawl(config, config_hash, accounts, &overrides).await
        }
        Command::Articles {
            account,
            keywords,
            since,
            until,
            limit,
            offset,
            output,
        } => {
            let query = ArticleQuery {
                account_id: None,
                platform: None,
                since: since.and_then(|d| d.and_hms_opt(0, 0, 0)).map(|t| Utc.from_utc_datetime(&t)),
                until: until
                    .and_then(|d| d.and_hms_opt(23, 59, 59))
                    .map(|t| Utc.from_utc_datetime(&t)),
                keywords,
                limit,
                offset,
            };
            handle_articles(&config, account.as_deref(), query, output.as_deref())
        }
        Command::Stats => handle_stats(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("mp_archiver=info,warn"),
            1 => EnvFilter::new("mp_archiver=debug,info"),
            2 => EnvFilter::new("mp_archiver=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn credential_store(config: &Config) -> CredentialStore {
    CredentialStore::new(&config.session.credential_path, config.session.ttl())
}

fn open_database(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = Path::new(&config.output.database_path);
    SqliteStorage::new(path).with_context(|| format!("failed to open {}", path.display()))
}

/// Handles `session import|status|clear`
async fn handle_session(config: &Config, command: SessionCommand) -> anyhow::Result<()> {
    let store = credential_store(config);

    match command {
        SessionCommand::Import {
            token,
            cookies,
            force,
        } => {
            if force {
                store.clear()?;
            }
            let login = StaticLogin::new(token, cookies).with_user_agent(config.api.user_agent.clone());
            let manager = SessionManager::new(store, login);
            let credential = manager.ensure_session().await?;
            println!(
                "✓ Session stored at {} (issued {})",
                manager.store().path().display(),
                credential.issued_at.to_rfc3339()
            );
        }
        SessionCommand::Status { remote } => {
            let Some(credential) = store.load()? else {
                println!("No session stored at {}", store.path().display());
                return Ok(());
            };

            let age = credential.age(Utc::now());
            println!("Issued:  {}", credential.issued_at.to_rfc3339());
            println!("Age:     {}h (ttl {}h)", age.num_hours(), store.ttl().num_hours());
            println!("Cookies: {}", credential.cookies.len());
            println!(
                "Local:   {}",
                if store.is_valid(&credential) { "valid" } else { "expired" }
            );

            if remote {
                let client = MpClient::new(&config.api)?;
                let accepted = client.probe_session(&credential).await?;
                println!("Remote:  {}", if accepted { "accepted" } else { "rejected" });
            }
        }
        SessionCommand::Clear => {
            store.clear()?;
            println!("✓ Session cleared");
        }
    }

    Ok(())
}

/// Handles `search`: one authenticated search call
async fn handle_search(config: &Config, name: &str) -> anyhow::Result<()> {
    let credential = credential_store(config)
        .load_valid()
        .context("run `mp-archiver session import` first")?;
    let client = MpClient::new(&config.api)?;

    let candidates = client.search_accounts(&credential, name).await?;
    if candidates.is_empty() {
        println!("No accounts match '{}'", name);
        return Ok(());
    }

    for candidate in candidates {
        println!("{}  {}", candidate.external_id, candidate.nickname);
        if !candidate.alias.is_empty() {
            println!("    alias: {}", candidate.alias);
        }
        if !candidate.signature.is_empty() {
            println!("    {}", candidate.signature);
        }
    }
    Ok(())
}

/// Handles `crawl` and `batch`
async fn handle_crawl(
    mut config: Config,
    config_hash: String,
    accounts: Vec<String>,
    overrides: &CrawlOverrides,
) -> anyhow::Result<()> {
    overrides.apply(&mut config)?;

    let credential = credential_store(&config)
        .load_valid()
        .context("run `mp-archiver session import` first")?;
    let api = Arc::new(MpClient::new(&config.api)?);
    let storage = shared_storage(open_database(&config)?);

    tracing::info!(
        "Archiving {} accounts (max {} pages, {} days, content: {})",
        accounts.len(),
        config.crawl.max_pages,
        config.crawl.days,
        config.crawl.include_content
    );

    let coordinator = BatchCoordinator::new(api, storage, credential, &config)
        .with_observer(Arc::new(LoggingObserver))
        .with_config_hash(config_hash);

    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after in-flight requests");
            token.cancel();
        }
    });

    let progress = coordinator.run(&accounts, config.crawl.concurrency).await?;
    print_batch_summary(&progress);

    if let Some(path) = &overrides.output {
        let since = coordinator.settings().cutoff(Utc::now());
        export_crawled(&config, &accounts, since, path)?;
    }
    Ok(())
}

/// Exports every stored article of the given accounts inside the date window
fn export_crawled(
    config: &Config,
    accounts: &[String],
    since: Option<DateTime<Utc>>,
    path: &Path,
) -> anyhow::Result<()> {
    let storage = open_database(config)?;

    let mut articles = Vec::new();
    for name in accounts {
        let Some(account) = storage.get_account(PLATFORM_WECHAT, name)? else {
            continue;
        };
        let query = ArticleQuery {
            account_id: Some(account.id),
            since,
            limit: u32::MAX,
            ..ArticleQuery::default()
        };
        articles.extend(storage.query_articles(&query)?);
    }

    if articles.is_empty() {
        println!("Nothing to export");
        return Ok(());
    }
    let written = export_articles_csv(path, &articles, &account_names(&storage)?)
        .with_context(|| format!("failed to export to {}", path.display()))?;
    println!("Exported {} articles to {}", written, path.display());
    Ok(())
}

fn account_names(storage: &SqliteStorage) -> anyhow::Result<HashMap<i64, String>> {
    Ok(storage
        .list_accounts(None)?
        .into_iter()
        .map(|a| (a.id, a.name))
        .collect())
}

fn print_batch_summary(progress: &BatchProgress) {
    println!("\n=== {} ===", progress.batch_id);

    let mut names: Vec<&String> = progress.per_account_status.keys().collect();
    names.sort();
    for name in names {
        let status = &progress.per_account_status[name];
        let report = &status.report;
        match status.error_message() {
            Some(error) => println!("  ✗ {}: {}", name, error),
            None => println!(
                "  ✓ {}: {} new, {} known, {} pages ({})",
                name,
                report.articles_stored,
                report.articles_skipped,
                report.pages_fetched,
                report
                    .stop_reason
                    .map(|r| r.to_string())
                    .unwrap_or_default()
            ),
        }
        for failure in &report.content_failures {
            println!("      partial: {} ({})", failure.url, failure.reason);
        }
    }

    println!(
        "\n{}/{} accounts succeeded, {} articles stored",
        progress.accounts_with(Outcome::Success).len(),
        progress.total_accounts,
        progress.total_articles_stored()
    );
}

/// Handles `articles`: lists stored articles, newest first
fn handle_articles(
    config: &Config,
    account: Option<&str>,
    mut query: ArticleQuery,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let storage = open_database(config)?;

    if let Some(name) = account {
        let Some(record) = storage.get_account(PLATFORM_WECHAT, name)? else {
            bail!("account '{}' has not been archived", name);
        };
        query.account_id = Some(record.id);
    }

    let names = account_names(&storage)?;

    let articles = storage.query_articles(&query)?;
    if articles.is_empty() {
        println!("No articles found");
        return Ok(());
    }

    if let Some(path) = output {
        let written = export_articles_csv(path, &articles, &names)
            .with_context(|| format!("failed to export to {}", path.display()))?;
        println!("Exported {} articles to {}", written, path.display());
        return Ok(());
    }

    for article in articles {
        let account = names.get(&article.account_id).map(String::as_str).unwrap_or("?");
        println!(
            "{}  [{}] {}",
            article.publish_time.format("%Y-%m-%d %H:%M"),
            account,
            article.title
        );
        println!("    {}", article.url);
        if let Some(summary) = &article.summary {
            println!("    {}", summary);
        }
    }
    Ok(())
}

/// Handles `stats`: shows what the database holds
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);
    let storage = open_database(config)?;

    println!("Articles: {}", storage.count_articles(None)?);
    for platform in storage.list_platforms()? {
        println!("\n{}:", platform);
        for account in storage.list_accounts(Some(&platform))? {
            println!(
                "  {:<30} {:>6} articles",
                account.name,
                storage.count_articles(Some(account.id))?
            );
        }
    }

    if let Some(run) = storage.get_latest_run()? {
        println!(
            "\nLast run #{} ({}) started {}",
            run.id,
            run.status.to_db_string(),
            run.started_at
        );
        for outcome in storage.get_run_outcomes(run.id)? {
            println!(
                "  {:<30} {:<8} {:>4} new{}",
                outcome.account,
                outcome.outcome.to_db_string(),
                outcome.articles_stored,
                outcome
                    .error
                    .map(|e| format!("  {}", e))
                    .unwrap_or_default()
            );
        }
    }

    Ok(())
}
