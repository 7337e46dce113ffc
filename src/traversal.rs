//! Page-kind state machine for the two crawls.
//!
//! Article crawl: `Home -> Index -> Detail`. Author crawl: `Author` only, seeded
//! from the worklist. Each crawl turns a fetched page into follow-up requests
//! and records; fetching and persistence live in [`crate::session`].

use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;
use scraper::Html;
use tracing::{debug, info, warn};

use crate::error::RecordError;
use crate::extract::{self, Card};
use crate::normalize::{extract_date, relative_to_absolute_url};
use crate::records::{assemble_article, assemble_author, assemble_relations, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Home,
    Index,
    Detail,
    Author,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub kind: PageKind,
}

impl Request {
    pub fn new(url: impl Into<String>, kind: PageKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }
}

/// A successfully fetched page.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub kind: PageKind,
    pub body: String,
}

/// Everything one page produced.
#[derive(Debug, Default)]
pub struct Step {
    pub requests: Vec<Request>,
    pub records: Vec<Record>,
    pub errors: Vec<RecordError>,
}

pub trait Crawl {
    fn name(&self) -> &'static str;
    fn on_session_start(&mut self) -> Vec<Request>;
    fn on_page_fetched(&mut self, page: &Page) -> Step;
}

/// Whether an index card still needs its detail page.
///
/// Without a cutoff every card passes and its date is never parsed. With one,
/// only cards strictly newer than the cutoff pass.
pub fn admit_card(cutoff: Option<NaiveDate>, card: &Card) -> Result<bool, RecordError> {
    match cutoff {
        None => Ok(true),
        Some(last) => Ok(extract_date(&card.date_text)? > last),
    }
}

pub struct ArticleCrawl {
    root_url: String,
    cutoff: Option<NaiveDate>,
    pub cards_seen: usize,
    pub cards_pruned: usize,
}

impl ArticleCrawl {
    /// `cutoff` is the newest stored `pub_date`, read once before the session.
    pub fn new(root_url: impl Into<String>, cutoff: Option<NaiveDate>) -> Self {
        Self {
            root_url: root_url.into(),
            cutoff,
            cards_seen: 0,
            cards_pruned: 0,
        }
    }

    fn absolute(&self, href: &str) -> String {
        relative_to_absolute_url(&self.root_url, href)
    }

    fn home(&self, page: &Html) -> Step {
        let requests: Vec<Request> = extract::view_all_links(page)
            .iter()
            .map(|href| Request::new(self.absolute(href), PageKind::Index))
            .collect();
        info!("Home page lists {} index pages", requests.len());
        Step {
            requests,
            ..Default::default()
        }
    }

    fn index(&mut self, url: &str, page: &Html) -> Step {
        let mut step = Step::default();
        // cards are not assumed to be date-ordered; each one is judged alone
        for card in extract::index_cards(page) {
            self.cards_seen += 1;
            match admit_card(self.cutoff, &card) {
                Ok(true) => step
                    .requests
                    .push(Request::new(self.absolute(&card.href), PageKind::Detail)),
                Ok(false) => self.cards_pruned += 1,
                Err(e) => {
                    warn!("Skipping card {} on {}: {}", card.href, url, e);
                    step.errors.push(e);
                }
            }
        }
        debug!("Index {} -> {} detail pages", url, step.requests.len());
        step
    }

    fn detail(&self, url: &str, page: &Html) -> Step {
        let bag = extract::detail_bag(url, page);
        match assemble_article(&bag) {
            Ok(article) => Step {
                records: vec![
                    Record::Article(article),
                    Record::Relations(assemble_relations(&bag, &self.root_url)),
                ],
                ..Default::default()
            },
            Err(e) => {
                warn!("Dropping article {}: {}", url, e);
                Step {
                    errors: vec![e],
                    ..Default::default()
                }
            }
        }
    }
}

impl Crawl for ArticleCrawl {
    fn name(&self) -> &'static str {
        "articles"
    }

    fn on_session_start(&mut self) -> Vec<Request> {
        match self.cutoff {
            Some(d) => info!("Resuming article crawl after {}", d),
            None => info!("Empty store, crawling every article"),
        }
        vec![Request::new(self.root_url.clone(), PageKind::Home)]
    }

    fn on_page_fetched(&mut self, page: &Page) -> Step {
        let html = Html::parse_document(&page.body);
        match page.kind {
            PageKind::Home => self.home(&html),
            PageKind::Index => self.index(&page.url, &html),
            PageKind::Detail => self.detail(&page.url, &html),
            PageKind::Author => {
                warn!("Article crawl got an author page: {}", page.url);
                Step::default()
            }
        }
    }
}

pub struct AuthorCrawl {
    worklist: BTreeSet<String>,
}

impl AuthorCrawl {
    /// `worklist` must be computed after the article crawl has committed.
    pub fn new(worklist: BTreeSet<String>) -> Self {
        Self { worklist }
    }
}

impl Crawl for AuthorCrawl {
    fn name(&self) -> &'static str {
        "authors"
    }

    fn on_session_start(&mut self) -> Vec<Request> {
        info!("{} authors to scrape", self.worklist.len());
        std::mem::take(&mut self.worklist)
            .into_iter()
            .map(|url| Request::new(url, PageKind::Author))
            .collect()
    }

    fn on_page_fetched(&mut self, page: &Page) -> Step {
        if page.kind != PageKind::Author {
            warn!("Author crawl got a non-author page: {}", page.url);
            return Step::default();
        }
        let bag = extract::author_bag(&page.url, &Html::parse_document(&page.body));
        match assemble_author(&bag) {
            Ok(author) => Step {
                records: vec![Record::Author(author)],
                ..Default::default()
            },
            Err(e) => {
                warn!("Dropping author {}: {}", page.url, e);
                Step {
                    errors: vec![e],
                    ..Default::default()
                }
            }
        }
    }
}

/// URLs already scheduled this session. A page is requested at most once.
#[derive(Debug, Default)]
pub struct Frontier {
    seen: HashSet<String>,
}

impl Frontier {
    pub fn admit(&mut self, request: &Request) -> bool {
        self.seen.insert(request.url.clone())
    }
}
