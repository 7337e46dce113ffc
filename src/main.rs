mod db;
mod error;
mod extract;
mod fetch;
mod normalize;
mod records;
mod session;
mod settings;
mod traversal;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rusqlite::Connection;

use fetch::HttpFetcher;
use session::{PhaseStats, Session};
use settings::Settings;

#[derive(Parser)]
#[command(name = "grid_blog_crawl", about = "Incremental blog crawler: articles, authors, relations")]
struct Cli {
    /// SQLite database path (overrides GRID_DATABASE_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl new articles, then the authors they reference
    Crawl {
        /// Only run the article crawl
        #[arg(long, conflicts_with = "authors_only")]
        articles_only: bool,
        /// Only scrape authors already referenced by stored relations
        #[arg(long)]
        authors_only: bool,
    },
    /// List stored articles, newest first
    Articles {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// List stored authors
    Authors,
    /// Newest articles, popular tags and author counter comparison
    Report {
        /// Emit JSON instead of tables
        #[arg(long)]
        json: bool,
    },
    /// Dump articles, authors, relations and author counters as JSON
    Export,
    /// Show storage statistics
    Stats,
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .init();
}

fn open_db(path: &Path) -> anyhow::Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = db::connect(path).with_context(|| format!("Failed to open {}", path.display()))?;
    db::init_schema(&conn)?;
    Ok(conn)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(db) = cli.db {
        settings.database_path = db;
    }
    init_tracing(&settings.log_level);

    let t0 = Instant::now();
    let conn = open_db(&settings.database_path)?;

    let result = match cli.command {
        Commands::Crawl {
            articles_only,
            authors_only,
        } => {
            let fetcher = HttpFetcher::new(&settings)?;
            let session = Session::new(fetcher, settings.root_url.clone(), settings.concurrency);
            if articles_only {
                let stats = session.run_articles(&conn).await?;
                print_phase("Articles", &stats);
            } else if authors_only {
                let stats = session.run_authors(&conn).await?;
                print_phase("Authors", &stats);
            } else {
                let report = session.run(&conn).await?;
                print_phase("Articles", &report.articles);
                print_phase("Authors", &report.authors);
            }
            Ok(())
        }
        Commands::Articles { limit } => {
            let rows = db::fetch_articles(&conn, Some(limit))?;
            if rows.is_empty() {
                println!("No articles yet. Run 'crawl' first.");
                return Ok(());
            }
            println!("{:<10} | {:<50} | {:<30}", "Date", "Title", "Tags");
            println!("{}", "-".repeat(96));
            for a in &rows {
                let tags = a
                    .tags
                    .as_deref()
                    .map(|t| normalize::split_tags(t).join(", "))
                    .unwrap_or_default();
                println!(
                    "{:<10} | {:<50} | {:<30}",
                    a.pub_date,
                    truncate(&a.title, 50),
                    truncate(&tags, 30)
                );
            }
            println!("\n{} articles", rows.len());
            Ok(())
        }
        Commands::Authors => {
            let rows = db::fetch_authors(&conn)?;
            if rows.is_empty() {
                println!("No authors yet.");
                return Ok(());
            }
            println!("{:<28} | {:<32} | {:>5}", "Name", "Job title", "Posts");
            println!("{}", "-".repeat(71));
            for a in &rows {
                println!(
                    "{:<28} | {:<32} | {:>5}",
                    truncate(&a.name, 28),
                    truncate(a.job_title.as_deref().unwrap_or("-"), 32),
                    a.articles_count
                );
            }
            Ok(())
        }
        Commands::Report { json } => print_report(&conn, json),
        Commands::Export => {
            let dump = serde_json::json!({
                "articles": db::fetch_articles(&conn, None)?,
                "authors": db::fetch_authors(&conn)?,
                "relations": db::fetch_relations(&conn)?,
                "counters": db::counter_comparison(&conn)?,
            });
            println!("{}", serde_json::to_string_pretty(&dump)?);
            Ok(())
        }
        Commands::Stats => {
            let s = db::get_stats(&conn)?;
            println!("Articles:        {}", s.articles);
            println!("Authors:         {}", s.authors);
            println!("Relations:       {}", s.relations);
            println!("Pending authors: {}", s.pending_authors);
            match s.resume_date {
                Some(d) => println!("Resume after:    {}", d),
                None => println!("Resume after:    - (empty store)"),
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_phase(label: &str, s: &PhaseStats) {
    println!(
        "{}: {} pages ({} fetch errors, {} skipped records) -> {} articles, {} relations, {} authors",
        label, s.pages, s.fetch_errors, s.record_errors, s.articles, s.relations, s.authors
    );
    if s.counters_bumped > 0 {
        println!("  {} author counters incremented", s.counters_bumped);
    }
    if s.constraint_violations > 0 {
        println!(
            "  WARNING: {} records were already stored (see log)",
            s.constraint_violations
        );
    }
}

fn print_report(conn: &Connection, json: bool) -> anyhow::Result<()> {
    let newest = db::newest_articles(conn, 5)?;
    let tags = db::top_tags(conn, 7)?;
    let authors = db::top_authors(conn, 5)?;

    if json {
        let report = serde_json::json!({
            "newest_articles": newest,
            "top_tags": tags
                .iter()
                .map(|(tag, count)| serde_json::json!({ "tag": tag, "count": count }))
                .collect::<Vec<_>>(),
            "top_authors": authors,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("--- Newest articles ---");
    for a in &newest {
        println!("{} | {}", a.pub_date, a.title);
        println!("    by {} | {}", a.authors, a.tags.join(", "));
        println!("    {}", a.url);
    }

    println!("\n--- Popular tags ---");
    for (tag, count) in &tags {
        println!("{:>4}  {}", count, tag);
    }

    println!("\n--- Top authors: author page vs. relation table ---");
    println!("{:<28} | {:>11} | {:>9} | {:>5}", "Name", "Author page", "Relations", "Diff");
    println!("{}", "-".repeat(63));
    for a in &authors {
        println!(
            "{:<28} | {:>11} | {:>9} | {:>+5}",
            truncate(&a.name, 28),
            a.articles_count,
            a.relation_count,
            a.divergence()
        );
    }
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
