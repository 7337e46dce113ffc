//! Raw fragment extraction for each page kind of the blog.
//!
//! Nothing here interprets values; fragments go into a [`FieldBag`] or a
//! [`Card`] exactly as they appear in the markup.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::records::{field, FieldBag};

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

// home
static VIEW_ALL: LazyLock<Selector> = LazyLock::new(|| sel(".card.viewall"));

// index
static REGULAR_CARD: LazyLock<Selector> = LazyLock::new(|| sel("a.card.cardtocheck"));
static FEATURED_CARD: LazyLock<Selector> = LazyLock::new(|| sel(".card.featured"));
static CARD_DATE: LazyLock<Selector> = LazyLock::new(|| sel("span.name"));

// detail
static TITLE: LazyLock<Selector> = LazyLock::new(|| sel("#woe #hero h2"));
static PUB_DATE: LazyLock<Selector> = LazyLock::new(|| sel("#woe #hero .authwrp .sdate"));
static BODY: LazyLock<Selector> = LazyLock::new(|| sel("#woe .postbody"));
static TAGS: LazyLock<Selector> = LazyLock::new(|| sel("head meta[property='article:tag']"));
static AUTHOR_LINK: LazyLock<Selector> = LazyLock::new(|| sel(".goauthor"));

// author
static AUTHOR_CARD: LazyLock<Selector> = LazyLock::new(|| sel(".authorcard.popup"));
static AUTHOR_NAME: LazyLock<Selector> = LazyLock::new(|| sel("h3"));
static JOB_TITLE: LazyLock<Selector> = LazyLock::new(|| sel(".jobtitle"));
static LINKEDIN: LazyLock<Selector> = LazyLock::new(|| sel(".linkedin"));
static AUTHOR_POSTS: LazyLock<Selector> = LazyLock::new(|| sel(".postsrow > .row > a"));

/// One article teaser on an index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub href: String,
    pub date_text: String,
}

/// Text nodes that are direct children of `el`.
fn own_text<'a>(el: ElementRef<'a>) -> impl Iterator<Item = &'a str> + 'a {
    el.children().filter_map(|n| n.value().as_text()).map(|t| &**t)
}

fn texts<'a>(root: ElementRef<'a>, selector: &Selector) -> Vec<String> {
    root.select(selector)
        .flat_map(own_text)
        .map(str::to_string)
        .collect()
}

/// Document-ordered text below each match, excluding the match's own text nodes.
fn nested_texts<'a>(root: ElementRef<'a>, selector: &Selector) -> Vec<String> {
    let mut out = Vec::new();
    for container in root.select(selector) {
        for node in container.descendants() {
            if node.parent().map(|p| p.id()) == Some(container.id()) {
                continue;
            }
            if let Some(text) = node.value().as_text() {
                out.push((**text).to_owned());
            }
        }
    }
    out
}

fn attrs<'a>(root: ElementRef<'a>, selector: &Selector, name: &str) -> Vec<String> {
    root.select(selector)
        .filter_map(|el| el.value().attr(name))
        .map(str::to_string)
        .collect()
}

pub fn view_all_links(page: &Html) -> Vec<String> {
    attrs(page.root_element(), &VIEW_ALL, "href")
}

/// Regular cards first, then featured ones. Cards without an href are dropped.
pub fn index_cards(page: &Html) -> Vec<Card> {
    let root = page.root_element();
    root.select(&REGULAR_CARD)
        .chain(root.select(&FEATURED_CARD))
        .filter_map(|card| {
            let href = card.value().attr("href")?.to_string();
            let date_text = texts(card, &CARD_DATE).concat();
            Some(Card { href, date_text })
        })
        .collect()
}

pub fn detail_bag(url: &str, page: &Html) -> FieldBag {
    let root = page.root_element();
    let mut bag = FieldBag::new(url);
    bag.extend(field::TITLE, texts(root, &TITLE));
    bag.extend(field::PUB_DATE, texts(root, &PUB_DATE));
    bag.extend(field::TEXT, nested_texts(root, &BODY));
    bag.extend(field::TAGS, attrs(root, &TAGS, "content"));
    bag.extend(field::AUTHORS, attrs(root, &AUTHOR_LINK, "href"));
    bag
}

pub fn author_bag(url: &str, page: &Html) -> FieldBag {
    let mut bag = FieldBag::new(url);
    for card in page.select(&AUTHOR_CARD) {
        bag.extend(field::NAME, texts(card, &AUTHOR_NAME));
        bag.extend(field::JOB_TITLE, texts(card, &JOB_TITLE));
        bag.extend(field::LINKEDIN_URL, attrs(card, &LINKEDIN, "href"));
        bag.extend(field::ARTICLE_LINKS, attrs(card, &AUTHOR_POSTS, "href"));
    }
    bag
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_view_all_links() {
        let page = Html::parse_document(&fixtures::home(&["/ml/", "/search/"]));
        assert_eq!(view_all_links(&page), vec!["/ml/", "/search/"]);
    }

    #[test]
    fn index_collects_regular_then_featured() {
        let page = Html::parse_document(&fixtures::index(&[
            ("/f1/", "Jan 02, 2023 •", true),
            ("/r1/", "Jan 01, 2023 •", false),
        ]));
        let cards = index_cards(&page);
        assert_eq!(
            cards,
            vec![
                Card { href: "/r1/".into(), date_text: "Jan 01, 2023 •".into() },
                Card { href: "/f1/".into(), date_text: "Jan 02, 2023 •".into() },
            ]
        );
    }

    #[test]
    fn detail_fragments() {
        let html = fixtures::detail("Title", "Jan 10, 2023 •", &["/author/a/"], &["ML", "AI"]);
        let bag = detail_bag("https://x/post/", &Html::parse_document(&html));
        assert_eq!(bag.get(field::TITLE), ["Title"]);
        assert_eq!(bag.get(field::PUB_DATE), ["Jan 10, 2023 •"]);
        assert_eq!(bag.get(field::TAGS), ["ML", "AI"]);
        assert_eq!(bag.get(field::AUTHORS), ["/author/a/"]);
        let text: String = bag.get(field::TEXT).iter().map(|t| t.trim()).collect();
        assert_eq!(text, "First paragraph.Secondboldend.");
    }

    #[test]
    fn author_fragments() {
        let html = fixtures::author("Jane", Some("CTO"), 4);
        let bag = author_bag("https://x/author/jane/", &Html::parse_document(&html));
        assert_eq!(bag.get(field::NAME), ["Jane"]);
        assert_eq!(bag.get(field::JOB_TITLE), ["CTO"]);
        assert_eq!(bag.get(field::LINKEDIN_URL), ["https://linkedin.com/in/x"]);
        assert_eq!(bag.get(field::ARTICLE_LINKS).len(), 4);
    }

    #[test]
    fn page_without_author_card_is_empty() {
        let bag = author_bag("https://x/a/", &Html::parse_document("<html></html>"));
        assert!(bag.get(field::NAME).is_empty());
    }
}
