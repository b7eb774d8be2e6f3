//! Easy key generation, the inverse of [`key::parse_key`](crate::key::parse_key).
//!
//! Builds `doe:2006article` (default) or `DoeArticle2006` (alternate) from an
//! item's first creator, title, and date. Hosts use this to implement the
//! easy-key export translator.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::host::ItemSummary;

/// Translator id of the easy-key exporter.
pub const EASY_KEY_TRANSLATOR: &str = "9d774afe-a51d-4055-a6c7-23bc96d19fe7";

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]{4}").unwrap());
static WORD_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+|\p{P}").unwrap());
static MARKUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").unwrap());

const STOPWORDS: &[&str] = &[
    "the", "an", "a", "at", "in", "on", "el", "los", "la", "las", "de", "dem", "den", "der",
    "des", "die",
];

/// Key style produced by [`easy_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStyle {
    /// `doe:2006article`
    Default,
    /// `DoeArticle2006`
    Alternate,
}

/// First four-digit run in the date, or empty.
pub fn determine_year(date: Option<&str>) -> String {
    date.and_then(|d| YEAR_RE.find(d))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Last word of the first creator's last name, or `Anonymous`.
pub fn determine_author(summary: &ItemSummary) -> String {
    summary
        .creators
        .first()
        .map(|c| c.last_name.as_str())
        .filter(|name| !name.is_empty())
        .and_then(|name| {
            WORD_SPLIT_RE
                .split(name)
                .filter(|w| !w.is_empty())
                .last()
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Anonymous".to_string())
}

/// First significant lowercase title word, or `unknown`.
pub fn determine_title_word(title: Option<&str>) -> String {
    let Some(title) = title else {
        return "unknown".to_string();
    };
    let clean = MARKUP_RE.replace_all(title, " ").to_lowercase();
    WORD_SPLIT_RE
        .split(&clean)
        .find(|word| {
            word.chars().count() > 1 && !STOPWORDS.contains(word) && !DIGITS_RE.is_match(word)
        })
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Generates the easy key for an item.
pub fn easy_key(summary: &ItemSummary, style: KeyStyle) -> String {
    let year = determine_year(summary.date.as_deref());
    let author = determine_author(summary);
    let title_word = determine_title_word(summary.title.as_deref());
    match style {
        KeyStyle::Default => format!("{}:{}{}", author.to_lowercase(), year, title_word),
        KeyStyle::Alternate => format!("{}{}{}", capitalize(&author), capitalize(&title_word), year),
    }
}

/// Export text for a batch of items: `@key` entries separated by spaces.
pub fn export_easy_keys<'a>(summaries: impl IntoIterator<Item = &'a ItemSummary>) -> String {
    summaries
        .into_iter()
        .map(|s| format!("@{}", easy_key(s, KeyStyle::Default)))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Creator;

    fn summary(last: &str, title: &str, date: &str) -> ItemSummary {
        ItemSummary {
            creators: vec![Creator::new(last, "John")],
            title: Some(title.to_string()),
            date: Some(date.to_string()),
        }
    }

    #[test]
    fn test_default_key() {
        let s = summary("Doe", "Article", "2006");
        assert_eq!(easy_key(&s, KeyStyle::Default), "doe:2006article");
    }

    #[test]
    fn test_alternate_key() {
        let s = summary("Doe", "First Book", "2005-03-01");
        assert_eq!(easy_key(&s, KeyStyle::Alternate), "DoeFirst2005");
    }

    #[test]
    fn test_stopwords_and_numbers_skipped() {
        let s = summary("Doe", "The 100 Years of a War", "2001");
        assert_eq!(easy_key(&s, KeyStyle::Default), "doe:2001years");
    }

    #[test]
    fn test_markup_stripped() {
        let s = summary("Doe", "<i>Why</i> it matters", "2007");
        assert_eq!(easy_key(&s, KeyStyle::Default), "doe:2007why");
    }

    #[test]
    fn test_accents_preserved() {
        let s = summary("Hüáéèñ", "Acćénts", "2015");
        assert_eq!(easy_key(&s, KeyStyle::Default), "hüáéèñ:2015acćénts");
    }

    #[test]
    fn test_compound_last_name_uses_last_word() {
        let s = summary("van der Berg", "Dikes", "1999");
        assert_eq!(determine_author(&s), "Berg");
    }

    #[test]
    fn test_missing_fields() {
        let s = ItemSummary::default();
        assert_eq!(easy_key(&s, KeyStyle::Default), "anonymous:unknown");
    }

    #[test]
    fn test_export_joins_with_spaces() {
        let a = summary("Doe", "Article", "2006");
        let b = summary("Roe", "Book", "2010");
        assert_eq!(export_easy_keys([&a, &b]), "@doe:2006article @roe:2010book");
    }
}
