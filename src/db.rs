use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::StoreError;
use crate::normalize::split_tags;
use crate::records::{Article, Author, AuthorArticleRelation, RelationBatch};

pub type Result<T> = std::result::Result<T, StoreError>;

pub fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

// Dates are ISO text, so MAX() and ORDER BY follow calendar order.
// author_article.author_url has no foreign key: relations arrive before the
// author page is crawled.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS articles (
            url       TEXT PRIMARY KEY,
            title     TEXT NOT NULL,
            pub_date  TEXT NOT NULL,
            text      TEXT NOT NULL,
            tags      TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_articles_pub_date ON articles(pub_date);

        CREATE TABLE IF NOT EXISTS authors (
            url            TEXT PRIMARY KEY,
            name           TEXT NOT NULL,
            job_title      TEXT,
            linkedin_url   TEXT,
            articles_count INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS author_article (
            author_url  TEXT NOT NULL,
            article_url TEXT NOT NULL,
            PRIMARY KEY (author_url, article_url)
        );
        CREATE INDEX IF NOT EXISTS idx_author_article_article ON author_article(article_url);
        ",
    )?;
    Ok(())
}

// ── Session bootstrap ──

/// Newest stored publication date; `None` on an empty store.
pub fn resume_date(conn: &Connection) -> Result<Option<NaiveDate>> {
    let date: Option<NaiveDate> =
        conn.query_row("SELECT MAX(pub_date) FROM articles", [], |r| r.get(0))?;
    Ok(date)
}

/// Authors referenced by a relation but not scraped yet.
pub fn author_worklist(conn: &Connection) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT r.author_url
         FROM author_article r
         WHERE r.author_url NOT IN (SELECT url FROM authors)",
    )?;
    let urls = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<BTreeSet<String>, _>>()?;
    Ok(urls)
}

// ── Inserts ──

pub fn insert_article(conn: &Connection, a: &Article) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO articles (url, title, pub_date, text, tags) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![a.url, a.title, a.pub_date, a.text, a.tags],
    )?;
    tx.commit()?;
    Ok(())
}

/// Bump the stored counter of every already-known author, then record each
/// relation. Returns how many counters were bumped. One transaction per batch.
pub fn insert_relations_and_reconcile(conn: &Connection, batch: &RelationBatch) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut bumped = 0;
    {
        let mut bump = tx.prepare(
            "UPDATE authors SET articles_count = articles_count + 1 WHERE url = ?1",
        )?;
        let mut insert = tx.prepare(
            "INSERT INTO author_article (author_url, article_url) VALUES (?1, ?2)",
        )?;
        for author_url in &batch.author_urls {
            bumped += bump.execute(params![author_url])?;
            insert.execute(params![author_url, batch.article_url])?;
        }
    }
    tx.commit()?;
    Ok(bumped)
}

pub fn insert_author(conn: &Connection, a: &Author) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO authors (url, name, job_title, linkedin_url, articles_count)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![a.url, a.name, a.job_title, a.linkedin_url, a.articles_count],
    )?;
    tx.commit()?;
    Ok(())
}

// ── Reporting ──

pub fn fetch_articles(conn: &Connection, limit: Option<usize>) -> Result<Vec<Article>> {
    let sql = format!(
        "SELECT url, title, pub_date, text, tags FROM articles ORDER BY pub_date DESC, url{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Article {
                url: row.get(0)?,
                title: row.get(1)?,
                pub_date: row.get(2)?,
                text: row.get(3)?,
                tags: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn fetch_authors(conn: &Connection) -> Result<Vec<Author>> {
    let mut stmt = conn.prepare(
        "SELECT url, name, job_title, linkedin_url, articles_count FROM authors ORDER BY name, url",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Author {
                url: row.get(0)?,
                name: row.get(1)?,
                job_title: row.get(2)?,
                linkedin_url: row.get(3)?,
                articles_count: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn fetch_relations(conn: &Connection) -> Result<Vec<AuthorArticleRelation>> {
    let mut stmt = conn.prepare(
        "SELECT author_url, article_url FROM author_article ORDER BY author_url, article_url",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(AuthorArticleRelation {
                author_url: row.get(0)?,
                article_url: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Author-page count next to the relation-table count, per known author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterRow {
    pub author_url: String,
    pub name: String,
    pub articles_count: i64,
    pub relation_count: i64,
}

impl CounterRow {
    pub fn divergence(&self) -> i64 {
        self.articles_count - self.relation_count
    }
}

const COUNTER_SQL: &str = "
    SELECT r.author_url, a.name, a.articles_count, COUNT(r.article_url)
    FROM author_article r
    JOIN authors a ON a.url = r.author_url
    GROUP BY r.author_url";

fn query_counters(conn: &Connection, sql: &str) -> Result<Vec<CounterRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CounterRow {
                author_url: row.get(0)?,
                name: row.get(1)?,
                articles_count: row.get(2)?,
                relation_count: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn counter_comparison(conn: &Connection) -> Result<Vec<CounterRow>> {
    query_counters(conn, &format!("{COUNTER_SQL} ORDER BY r.author_url"))
}

pub fn top_authors(conn: &Connection, limit: usize) -> Result<Vec<CounterRow>> {
    query_counters(
        conn,
        &format!("{COUNTER_SQL} ORDER BY a.articles_count DESC, a.name LIMIT {limit}"),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleSummary {
    pub url: String,
    pub title: String,
    pub pub_date: NaiveDate,
    pub tags: Vec<String>,
    pub authors: String,
}

/// Newest articles that have at least one scraped author.
pub fn newest_articles(conn: &Connection, limit: usize) -> Result<Vec<ArticleSummary>> {
    let mut stmt = conn.prepare(
        "SELECT ar.url, ar.title, ar.pub_date, ar.tags, GROUP_CONCAT(au.name, ', ')
         FROM articles ar
         JOIN author_article r ON r.article_url = ar.url
         JOIN authors au ON au.url = r.author_url
         GROUP BY ar.url
         ORDER BY ar.pub_date DESC, ar.url
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            let tags: Option<String> = row.get(3)?;
            Ok(ArticleSummary {
                url: row.get(0)?,
                title: row.get(1)?,
                pub_date: row.get(2)?,
                tags: tags.as_deref().map(split_tags).unwrap_or_default(),
                authors: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Most used tags, most frequent first; ties by tag name.
pub fn top_tags(conn: &Connection, limit: usize) -> Result<Vec<(String, usize)>> {
    let mut stmt = conn.prepare("SELECT tags FROM articles WHERE tags IS NOT NULL")?;
    let stored = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut counts: HashMap<String, usize> = HashMap::new();
    for tag in stored.iter().flat_map(|s| split_tags(s)) {
        *counts.entry(tag).or_default() += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    Ok(ranked)
}

// ── Stats ──

pub struct Stats {
    pub articles: usize,
    pub authors: usize,
    pub relations: usize,
    pub pending_authors: usize,
    pub resume_date: Option<NaiveDate>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let articles: usize = conn.query_row("SELECT COUNT(*) FROM articles", [], |r| r.get(0))?;
    let authors: usize = conn.query_row("SELECT COUNT(*) FROM authors", [], |r| r.get(0))?;
    let relations: usize =
        conn.query_row("SELECT COUNT(*) FROM author_article", [], |r| r.get(0))?;
    Ok(Stats {
        articles,
        authors,
        relations,
        pending_authors: author_worklist(conn)?.len(),
        resume_date: resume_date(conn)?,
    })
}

#[cfg(test)]
pub(crate) fn open_memory() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    conn
}
