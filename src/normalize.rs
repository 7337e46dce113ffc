//! Field normalizers: element-wise transforms and the reductions that turn a
//! list of raw fragments into one field value.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::RecordError;

/// Upper bound, in characters, for stored free text.
pub const MAX_TEXT_LEN: usize = 160;

/// Separator between tags in the stored `tags` column. Tags may contain commas.
pub const TAG_DELIMITER: &str = ":::";

// "Jan 5, 2023 •"
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z][a-z]{2})\s+(\d{1,2}),\s+(\d{4})\s+•$").unwrap());

/// Parse the blog's display date, e.g. `"Jan 05, 2023 •"`.
pub fn extract_date(raw: &str) -> Result<NaiveDate, RecordError> {
    let format_err = || RecordError::Format {
        field: "pub_date",
        raw: raw.to_string(),
    };
    let caps = DATE_RE.captures(raw.trim()).ok_or_else(format_err)?;
    let canonical = format!("{} {} {}", &caps[1], &caps[2], &caps[3]);
    NaiveDate::parse_from_str(&canonical, "%b %d %Y").map_err(|_| format_err())
}

/// Callers must pass a site-relative path.
pub fn relative_to_absolute_url(root_url: &str, relative: &str) -> String {
    format!("{}{}", root_url, relative)
}

pub fn shorten(s: &str) -> String {
    s.chars().take(MAX_TEXT_LEN).collect()
}

pub fn normalise(s: &str) -> String {
    s.trim().to_string()
}

/// Body text arrives as many markup fragments; strip each, glue, then cap.
pub fn join_and_normalise<S: AsRef<str>>(fragments: &[S]) -> String {
    let joined: String = fragments.iter().map(|f| f.as_ref().trim()).collect();
    shorten(&joined)
}

pub fn first_non_empty<S: AsRef<str>>(fragments: &[S]) -> Option<&str> {
    fragments
        .iter()
        .map(AsRef::as_ref)
        .find(|f| !f.is_empty())
}

/// Reduction for required single-valued fields.
pub fn take_first<'a, S: AsRef<str>>(
    field: &'static str,
    fragments: &'a [S],
) -> Result<&'a str, RecordError> {
    first_non_empty(fragments).ok_or(RecordError::EmptyField(field))
}

pub fn join_tags<S: AsRef<str>>(tags: &[S]) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    let joined = tags
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(TAG_DELIMITER);
    Some(joined).filter(|t| !t.is_empty())
}

pub fn split_tags(stored: &str) -> Vec<String> {
    stored
        .trim()
        .split(TAG_DELIMITER)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_round_trip() {
        let mut d = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
        while d < end {
            let shown = d.format("%b %d, %Y •").to_string();
            assert_eq!(extract_date(&shown), Ok(d), "{shown}");
            d = d.succ_opt().unwrap();
        }
    }

    #[test]
    fn date_tolerates_surrounding_whitespace_and_single_digit_day() {
        let d = NaiveDate::from_ymd_opt(2023, 1, 5).unwrap();
        assert_eq!(extract_date("\n  Jan 5, 2023 •  "), Ok(d));
    }

    #[test]
    fn date_rejects_deviations() {
        for raw in [
            "",
            "Jan 05, 2023",
            "January 05, 2023 •",
            "jan 05, 2023 •",
            "JAN 05, 2023 •",
            "2023-01-05",
            "Jan 05 2023 •",
            "Jan 32, 2023 •",
            "Feb 29, 2023 •",
            "Foo 01, 2023 •",
            "Jan 05, 2023 • 5 min read",
        ] {
            assert!(
                matches!(extract_date(raw), Err(RecordError::Format { field: "pub_date", .. })),
                "{raw:?} should not parse"
            );
        }
    }

    #[test]
    fn shorten_caps_at_160_chars() {
        let long = "ab".repeat(200);
        let out = shorten(&long);
        assert_eq!(out.chars().count(), MAX_TEXT_LEN);
        assert!(long.starts_with(&out));

        // counts characters, not bytes
        let wide = "é".repeat(170);
        assert_eq!(shorten(&wide).chars().count(), MAX_TEXT_LEN);

        assert_eq!(shorten("short"), "short");
    }

    #[test]
    fn join_and_normalise_strips_each_fragment() {
        let frags = ["  Hello ", "\n", " world", "!\t"];
        assert_eq!(join_and_normalise(&frags), "Helloworld!");

        let many = vec!["0123456789"; 30];
        assert_eq!(join_and_normalise(&many).len(), MAX_TEXT_LEN);
    }

    #[test]
    fn take_first_skips_empty_and_reports_field() {
        assert_eq!(take_first("title", &["", "A", "B"]), Ok("A"));
        let none: [&str; 0] = [];
        assert_eq!(
            take_first("title", &none),
            Err(RecordError::EmptyField("title"))
        );
        assert_eq!(take_first("name", &[""]), Err(RecordError::EmptyField("name")));
    }

    #[test]
    fn tags_join_and_split() {
        let tags = ["Data Science", "Search, Relevance"];
        let stored = join_tags(&tags).unwrap();
        assert_eq!(stored, "Data Science:::Search, Relevance");
        assert_eq!(split_tags(&stored), tags);

        let none: [&str; 0] = [];
        assert_eq!(join_tags(&none), None);
    }

    #[test]
    fn absolute_url_is_plain_prefix() {
        assert_eq!(
            relative_to_absolute_url("https://blog.example.com", "/author/jane/"),
            "https://blog.example.com/author/jane/"
        );
    }
}
