use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::RecordError;
use crate::normalize::{
    extract_date, first_non_empty, join_and_normalise, join_tags, normalise,
    relative_to_absolute_url, take_first,
};

/// Raw fragments pulled from one page, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldBag {
    pub url: String,
    fields: BTreeMap<&'static str, Vec<String>>,
}

impl FieldBag {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn extend<I, S>(&mut self, field: &'static str, fragments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields
            .entry(field)
            .or_default()
            .extend(fragments.into_iter().map(Into::into));
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub pub_date: NaiveDate,
    pub text: String,
    pub tags: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub url: String,
    pub name: String,
    pub job_title: Option<String>,
    pub linkedin_url: Option<String>,
    pub articles_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct AuthorArticleRelation {
    pub author_url: String,
    pub article_url: String,
}

/// All authors credited on one article page. May be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationBatch {
    pub article_url: String,
    pub author_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Article(Article),
    Relations(RelationBatch),
    Author(Author),
}

pub mod field {
    pub const TITLE: &str = "title";
    pub const PUB_DATE: &str = "pub_date";
    pub const TEXT: &str = "text";
    pub const TAGS: &str = "tags";
    pub const AUTHORS: &str = "authors";
    pub const NAME: &str = "name";
    pub const JOB_TITLE: &str = "job_title";
    pub const LINKEDIN_URL: &str = "linkedin_url";
    pub const ARTICLE_LINKS: &str = "article_links";
}

pub fn assemble_article(bag: &FieldBag) -> Result<Article, RecordError> {
    if bag.url.is_empty() {
        return Err(RecordError::EmptyField("url"));
    }
    let title = normalise(take_first(field::TITLE, bag.get(field::TITLE))?);
    let pub_date = extract_date(take_first(field::PUB_DATE, bag.get(field::PUB_DATE))?)?;

    let text_fragments = bag.get(field::TEXT);
    let text = join_and_normalise(text_fragments);
    if text.is_empty() {
        return Err(RecordError::EmptyField(field::TEXT));
    }

    Ok(Article {
        url: bag.url.clone(),
        title,
        pub_date,
        text,
        tags: join_tags(bag.get(field::TAGS)),
    })
}

/// Turn a detail page's author hrefs into absolute author URLs.
pub fn assemble_relations(bag: &FieldBag, root_url: &str) -> RelationBatch {
    let mut author_urls: Vec<String> = Vec::new();
    for href in bag.get(field::AUTHORS) {
        let href = href.trim();
        if href.is_empty() {
            continue;
        }
        let url = relative_to_absolute_url(root_url, href);
        // same author linked twice on one page (byline + footer card)
        if !author_urls.contains(&url) {
            author_urls.push(url);
        }
    }
    RelationBatch {
        article_url: bag.url.clone(),
        author_urls,
    }
}

pub fn assemble_author(bag: &FieldBag) -> Result<Author, RecordError> {
    if bag.url.is_empty() {
        return Err(RecordError::EmptyField("url"));
    }
    let name = normalise(take_first(field::NAME, bag.get(field::NAME))?);
    Ok(Author {
        url: bag.url.clone(),
        name,
        job_title: first_non_empty(bag.get(field::JOB_TITLE)).map(normalise),
        linkedin_url: first_non_empty(bag.get(field::LINKEDIN_URL)).map(normalise),
        articles_count: bag.get(field::ARTICLE_LINKS).len() as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "https://blog.example.com";

    fn detail_bag() -> FieldBag {
        let mut bag = FieldBag::new("https://blog.example.com/post/a/");
        bag.extend(field::TITLE, ["  Tiered ranking  "]);
        bag.extend(field::PUB_DATE, ["Jan 10, 2023 •"]);
        bag.extend(field::TEXT, ["  Intro ", "\n", "body text "]);
        bag.extend(field::TAGS, ["Search", "E-commerce"]);
        bag.extend(field::AUTHORS, ["/author/jane/", "/author/bob/"]);
        bag
    }

    #[test]
    fn article_from_bag() {
        let a = assemble_article(&detail_bag()).unwrap();
        assert_eq!(a.title, "Tiered ranking");
        assert_eq!(a.pub_date, NaiveDate::from_ymd_opt(2023, 1, 10).unwrap());
        assert_eq!(a.text, "Introbody text");
        assert_eq!(a.tags.as_deref(), Some("Search:::E-commerce"));
    }

    #[test]
    fn assembly_is_deterministic() {
        let bag = detail_bag();
        assert_eq!(assemble_article(&bag), assemble_article(&bag));
        assert_eq!(assemble_relations(&bag, ROOT), assemble_relations(&bag, ROOT));
    }

    #[test]
    fn article_without_tags_is_fine() {
        let mut bag = FieldBag::new("https://blog.example.com/post/b/");
        bag.extend(field::TITLE, ["T"]);
        bag.extend(field::PUB_DATE, ["Mar 3, 2022 •"]);
        bag.extend(field::TEXT, ["x"]);
        assert_eq!(assemble_article(&bag).unwrap().tags, None);
    }

    #[test]
    fn bad_date_is_a_format_error() {
        let mut bag = detail_bag();
        bag.fields.insert(field::PUB_DATE, vec!["2023-01-10".into()]);
        assert!(matches!(
            assemble_article(&bag),
            Err(RecordError::Format { field: "pub_date", .. })
        ));
    }

    #[test]
    fn missing_required_fields() {
        let mut bag = detail_bag();
        bag.fields.remove(field::TITLE);
        assert_eq!(assemble_article(&bag), Err(RecordError::EmptyField("title")));

        let mut bag = detail_bag();
        bag.fields.insert(field::TEXT, vec![" ".into(), "\n".into()]);
        assert_eq!(assemble_article(&bag), Err(RecordError::EmptyField("text")));
    }

    #[test]
    fn relations_are_absolute_and_deduplicated() {
        let mut bag = detail_bag();
        bag.extend(field::AUTHORS, ["/author/jane/"]);
        let batch = assemble_relations(&bag, ROOT);
        assert_eq!(
            batch.author_urls,
            vec![
                "https://blog.example.com/author/jane/".to_string(),
                "https://blog.example.com/author/bob/".to_string(),
            ]
        );
        assert_eq!(batch.article_url, "https://blog.example.com/post/a/");
    }

    #[test]
    fn no_authors_means_empty_batch() {
        let bag = FieldBag::new("https://blog.example.com/post/c/");
        assert!(assemble_relations(&bag, ROOT).author_urls.is_empty());
    }

    #[test]
    fn author_counts_article_links() {
        let mut bag = FieldBag::new("https://blog.example.com/author/jane/");
        bag.extend(field::NAME, [" Jane Doe "]);
        bag.extend(field::JOB_TITLE, ["CTO"]);
        bag.extend(field::ARTICLE_LINKS, ["/p/1", "/p/2", "/p/3"]);
        let a = assemble_author(&bag).unwrap();
        assert_eq!(a.name, "Jane Doe");
        assert_eq!(a.job_title.as_deref(), Some("CTO"));
        assert_eq!(a.linkedin_url, None);
        assert_eq!(a.articles_count, 3);

        let empty = FieldBag::new("https://blog.example.com/author/x/");
        assert_eq!(assemble_author(&empty), Err(RecordError::EmptyField("name")));
    }
}
