use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::db;
use crate::fetch::Fetcher;
use crate::records::Record;
use crate::traversal::{ArticleCrawl, AuthorCrawl, Crawl, Frontier, Page, Request};

/// Counters for one crawl phase.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PhaseStats {
    pub pages: usize,
    pub fetch_errors: usize,
    pub record_errors: usize,
    pub articles: usize,
    pub relations: usize,
    pub counters_bumped: usize,
    pub authors: usize,
    pub constraint_violations: usize,
}

#[derive(Debug, Default)]
pub struct SessionReport {
    pub articles: PhaseStats,
    pub authors: PhaseStats,
}

pub struct Session<F> {
    fetcher: Arc<F>,
    root_url: String,
    concurrency: usize,
}

impl<F: Fetcher> Session<F> {
    pub fn new(fetcher: F, root_url: impl Into<String>, concurrency: usize) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            root_url: root_url.into(),
            concurrency: concurrency.max(1),
        }
    }

    /// Article crawl to completion, then the author crawl.
    pub async fn run(&self, conn: &Connection) -> Result<SessionReport> {
        let articles = self.run_articles(conn).await?;
        // Every phase-1 insert is committed once run_articles returns, so the
        // worklist below sees all relations it produced.
        let authors = self.run_authors(conn).await?;
        Ok(SessionReport { articles, authors })
    }

    pub async fn run_articles(&self, conn: &Connection) -> Result<PhaseStats> {
        let cutoff = db::resume_date(conn).context("Failed to read resume date")?;
        let mut crawl = ArticleCrawl::new(self.root_url.clone(), cutoff);
        let stats = self.run_phase(conn, &mut crawl).await?;
        info!(
            "Index cards: {} seen, {} already ingested",
            crawl.cards_seen, crawl.cards_pruned
        );
        Ok(stats)
    }

    pub async fn run_authors(&self, conn: &Connection) -> Result<PhaseStats> {
        let worklist = db::author_worklist(conn).context("Failed to compute author worklist")?;
        let mut crawl = AuthorCrawl::new(worklist);
        self.run_phase(conn, &mut crawl).await
    }

    /// Fetches run concurrently; page handling and persistence happen here,
    /// one page at a time, in completion order.
    async fn run_phase<C: Crawl>(&self, conn: &Connection, crawl: &mut C) -> Result<PhaseStats> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut frontier = Frontier::default();
        let mut tasks = JoinSet::new();
        let mut stats = PhaseStats::default();

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}: {pos} pages ({per_sec})")?,
        );
        pb.set_message(crawl.name());

        for request in crawl.on_session_start() {
            if frontier.admit(&request) {
                self.dispatch(&mut tasks, &semaphore, request);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let (request, fetched) = joined.context("Fetch task panicked")?;
            pb.inc(1);
            stats.pages += 1;

            let body = match fetched {
                Ok(body) => body,
                Err(e) => {
                    warn!("Skipping {}: {:#}", request.url, e);
                    stats.fetch_errors += 1;
                    continue;
                }
            };

            let page = Page {
                url: request.url,
                kind: request.kind,
                body,
            };
            let step = crawl.on_page_fetched(&page);
            stats.record_errors += step.errors.len();

            for record in &step.records {
                persist(conn, record, &mut stats)?;
            }
            for next in step.requests {
                if frontier.admit(&next) {
                    self.dispatch(&mut tasks, &semaphore, next);
                }
            }
        }

        pb.finish_and_clear();
        info!(
            "{} crawl done: {} pages ({} fetch errors, {} record errors, {} constraint violations)",
            crawl.name(),
            stats.pages,
            stats.fetch_errors,
            stats.record_errors,
            stats.constraint_violations
        );
        Ok(stats)
    }

    fn dispatch(
        &self,
        tasks: &mut JoinSet<(Request, Result<String>)>,
        semaphore: &Arc<Semaphore>,
        request: Request,
    ) {
        let fetcher = Arc::clone(&self.fetcher);
        let semaphore = Arc::clone(semaphore);
        tasks.spawn(async move {
            let fetched = match semaphore.acquire_owned().await {
                Ok(_permit) => fetcher.fetch(&request.url).await,
                Err(e) => Err(e.into()),
            };
            (request, fetched)
        });
    }
}

/// Write one record. Duplicate keys are reported and counted, any other
/// storage failure ends the session.
fn persist(conn: &Connection, record: &Record, stats: &mut PhaseStats) -> Result<()> {
    let (key, outcome) = match record {
        Record::Article(a) => (
            &a.url,
            db::insert_article(conn, a).map(|()| stats.articles += 1),
        ),
        Record::Relations(batch) => (
            &batch.article_url,
            db::insert_relations_and_reconcile(conn, batch).map(|bumped| {
                stats.relations += batch.author_urls.len();
                stats.counters_bumped += bumped;
            }),
        ),
        Record::Author(a) => (&a.url, db::insert_author(conn, a).map(|()| stats.authors += 1)),
    };
    match outcome {
        Ok(()) => Ok(()),
        Err(e) if e.is_constraint_violation() => {
            error!("Record {} already stored, cutoff let it through: {}", key, e);
            stats.constraint_violations += 1;
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to store {}", key)),
    }
}
