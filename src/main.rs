use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use newsdesk::config::Config;
use newsdesk::content::{ContentEnricher, Enrichment, SkipReason};
use newsdesk::notify::{ConsoleNotifier, Notification, Notifier};
use newsdesk::storage::{Article, SaveOutcome, StoreHandle};
use newsdesk::util::{strip_control_chars, truncate_to_width};

/// Column budget for titles in `list` and `search` output
const TITLE_WIDTH: usize = 60;

const NOTIFY_SAVED: i32 = 1;
const NOTIFY_ENRICHED: i32 = 2;

/// Get the config directory path (~/.config/newsdesk/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsdesk"))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

#[derive(Parser, Debug)]
#[command(name = "newsdesk", about = "Saved news articles with full-text enrichment")]
struct Args {
    /// Config file (default: ~/.config/newsdesk/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file (overrides database_path from the config file)
    #[arg(long, global = true, value_name = "FILE", conflicts_with = "in_memory")]
    db: Option<PathBuf>,

    /// Use a throwaway in-memory database
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save an article, replacing any saved article with the same URL
    Save {
        #[arg(long)]
        url: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        image_url: Option<String>,
        /// Publication time, RFC 3339 (e.g. 2024-05-01T08:00:00Z)
        #[arg(long, value_parser = parse_timestamp)]
        published_at: Option<DateTime<Utc>>,
    },
    /// List saved articles in the order they were saved
    List,
    /// Search saved article titles and descriptions
    Search { query: String },
    /// Delete the saved article with this URL
    Delete { url: String },
    /// Fetch full text for saved articles with short bodies
    Enrich {
        /// Requests per batch (default from config)
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Show store and enrichment status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    tracing::debug!(config = ?config, "Effective configuration");

    let db_path = if args.in_memory {
        ":memory:".to_string()
    } else {
        let path = args
            .db
            .clone()
            .or_else(|| config.database_path.clone())
            .unwrap_or_else(|| config_dir.join("saved_articles.db"));
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
        path.to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?
            .to_string()
    };

    // Composition root: one store handle and one enricher for the process
    let store = StoreHandle::new(db_path);
    let client = reqwest::Client::builder()
        .user_agent(concat!("newsdesk/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let enricher = ContentEnricher::new(
        client,
        config.resolve_api_key(),
        config.enrichment_settings(),
    );
    let notifier = config.notifications.then_some(ConsoleNotifier);

    match args.command {
        Command::Save {
            url,
            title,
            description,
            content,
            image_url,
            published_at,
        } => {
            let article = Article {
                title,
                description,
                content,
                url,
                image_url,
                published_at,
            };
            save(&store, notifier.as_ref(), &article).await
        }
        Command::List => list(&store).await,
        Command::Search { query } => search(&store, &query).await,
        Command::Delete { url } => delete(&store, &url).await,
        Command::Enrich { batch_size } => {
            enrich(&store, &enricher, notifier.as_ref(), batch_size).await
        }
        Command::Status => status(&store, &enricher).await,
    }
}

async fn save(store: &StoreHandle, notifier: Option<&impl Notifier>, article: &Article) -> Result<()> {
    url::Url::parse(&article.url).with_context(|| format!("Not a valid URL: '{}'", article.url))?;

    let db = store.get().await?;
    let outcome = db.insert(article).await.context("Failed to save article")?;
    match outcome {
        SaveOutcome::Inserted(id) => println!("Inserted #{id}: {}", article.url),
        SaveOutcome::Updated(id) => println!("Updated #{id}: {}", article.url),
    }

    notify(notifier, &Notification::new(NOTIFY_SAVED, "Article saved", article.title.clone()));
    Ok(())
}

async fn list(store: &StoreHandle) -> Result<()> {
    let articles = store.get().await?.list_all().await?;
    if articles.is_empty() {
        println!("No saved articles.");
        return Ok(());
    }
    print_articles(&articles);
    Ok(())
}

async fn search(store: &StoreHandle, query: &str) -> Result<()> {
    let articles = store.get().await?.search(query).await?;
    if articles.is_empty() {
        println!("No saved articles match '{query}'.");
        return Ok(());
    }
    print_articles(&articles);
    Ok(())
}

async fn delete(store: &StoreHandle, url: &str) -> Result<()> {
    let removed = store.get().await?.delete(url).await?;
    if removed == 0 {
        println!("No saved article with URL {url}");
    } else {
        println!("Deleted {url}");
    }
    Ok(())
}

async fn enrich(
    store: &StoreHandle,
    enricher: &ContentEnricher,
    notifier: Option<&impl Notifier>,
    batch_size: Option<usize>,
) -> Result<()> {
    if !enricher.is_configured() {
        eprintln!(
            "No scrape API key configured (set {} or scrape_api_key); articles will be left unchanged.",
            newsdesk::content::API_KEY_ENV
        );
    }

    let db = store.get().await?;
    let articles = db.list_all().await?;
    let batch_size = batch_size.unwrap_or(enricher.settings().batch_size);
    let results = enricher.extract_batch_with_size(&articles, batch_size).await;

    let mut enriched = 0;
    let mut failed = 0;
    for result in results {
        match result {
            Enrichment::Enriched(article) => {
                enriched += db.update(&article).await?;
            }
            Enrichment::Unchanged {
                reason: SkipReason::Failed(_),
                ..
            } => failed += 1,
            Enrichment::Unchanged { .. } => {}
        }
    }

    let summary = format!(
        "{enriched} of {} articles enriched, {failed} failed",
        articles.len()
    );
    println!("{summary}");
    notify(notifier, &Notification::new(NOTIFY_ENRICHED, "Enrichment finished", summary));
    Ok(())
}

async fn status(store: &StoreHandle, enricher: &ContentEnricher) -> Result<()> {
    let db = store.get().await?;
    println!("Database:        {}", store.path());
    println!("Schema version:  {}", db.schema_version().await?);
    println!("Saved articles:  {}", db.count().await?);
    println!(
        "Enrichment:      {}",
        if enricher.is_configured() {
            "configured"
        } else {
            "not configured"
        }
    );
    Ok(())
}

fn print_articles(articles: &[Article]) {
    for article in articles {
        let date = article
            .published_at
            .map(|ts| ts.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "----------".to_string());
        let title = strip_control_chars(&article.title);
        println!(
            "{date}  {:<width$}  {}",
            truncate_to_width(&title, TITLE_WIDTH),
            article.url,
            width = TITLE_WIDTH
        );
    }
}

/// Notification failures never fail the command.
fn notify(notifier: Option<&impl Notifier>, notification: &Notification) {
    if let Some(notifier) = notifier {
        if let Err(e) = notifier.show(notification) {
            tracing::warn!(id = notification.id, error = %e, "Failed to show notification");
        }
    }
}
