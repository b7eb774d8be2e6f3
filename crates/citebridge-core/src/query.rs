//! Search queries handed to [`Host::search`](crate::host::Host::search).
//!
//! A [`SearchQuery`] is a flat list of [`Condition`]s joined with a single
//! [`JoinMode`], optionally restricted to one library. Hosts translate it into
//! whatever their store understands; the constructors here encode the
//! searches the resolver needs.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::Error;
use crate::key::ParsedKey;

/// Searchable item fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    /// Any creator's first or last name.
    Creator,
    Title,
    /// Compared against the year when the value is four digits, else the full date.
    Date,
    Tag,
    Note,
    CitationKey,
    /// Pseudo-field spanning several fields, see [`QuickSearchMode`].
    QuickSearch(QuickSearchMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Is,
    Contains,
}

/// Scope of a quick search word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QuickSearchMode {
    /// Title, creators, and year.
    #[default]
    TitleCreatorYear,
    /// Every metadata field.
    Fields,
    /// Every metadata field plus notes.
    Everything,
}

impl FromStr for QuickSearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "titleCreatorYear" => Ok(QuickSearchMode::TitleCreatorYear),
            "fields" => Ok(QuickSearchMode::Fields),
            "everything" => Ok(QuickSearchMode::Everything),
            other => Err(Error::InvalidRequest(format!(
                "Unknown search method: {}. Use titleCreatorYear, fields, or everything.",
                other
            ))),
        }
    }
}

impl fmt::Display for QuickSearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuickSearchMode::TitleCreatorYear => "titleCreatorYear",
            QuickSearchMode::Fields => "fields",
            QuickSearchMode::Everything => "everything",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Condition {
    pub field: Field,
    pub operator: Operator,
    pub value: String,
}

impl Condition {
    pub fn contains(field: Field, value: impl Into<String>) -> Self {
        Self {
            field,
            operator: Operator::Contains,
            value: value.into(),
        }
    }

    pub fn is(field: Field, value: impl Into<String>) -> Self {
        Self {
            field,
            operator: Operator::Is,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinMode {
    /// Every condition must hold.
    #[default]
    All,
    /// At least one condition must hold.
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SearchQuery {
    pub join: JoinMode,
    pub conditions: Vec<Condition>,
    /// Restrict to one library; `None` searches every library.
    pub library_id: Option<i64>,
}

impl SearchQuery {
    pub fn new(join: JoinMode) -> Self {
        Self {
            join,
            ..Default::default()
        }
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn in_library(mut self, library_id: Option<i64>) -> Self {
        self.library_id = library_id;
        self
    }

    /// Fuzzy search for a parsed citation key.
    ///
    /// One `contains` constraint per creator name component, then title
    /// (`contains`) and date (`is`) when present. All must hold.
    pub fn for_parsed_key(parsed: &ParsedKey) -> Self {
        let mut query = SearchQuery::new(JoinMode::All);
        for name in parsed.creator_names() {
            query = query.with(Condition::contains(Field::Creator, name));
        }
        if let Some(title) = &parsed.title {
            query = query.with(Condition::contains(Field::Title, title.as_str()));
        }
        if let Some(date) = &parsed.date {
            query = query.with(Condition::is(Field::Date, date.as_str()));
        }
        query
    }

    /// Items pinned to a key by an `@<key>` tag or an `@<key>` mention in a note.
    pub fn pinned_key(key: &str) -> Self {
        let marker = format!("@{}", key);
        SearchQuery::new(JoinMode::Any)
            .with(Condition::is(Field::Tag, marker.as_str()))
            .with(Condition::contains(Field::Note, marker))
    }

    /// Quick search: each word of `text` (split on `+` or whitespace) must
    /// appear in the fields covered by `mode`.
    pub fn quick(text: &str, mode: QuickSearchMode) -> Self {
        text.split(|c: char| c == '+' || c.is_whitespace())
            .filter(|word| !word.is_empty())
            .fold(SearchQuery::new(JoinMode::All), |query, word| {
                query.with(Condition::contains(Field::QuickSearch(mode), word))
            })
    }

    /// Exact citation-key lookup within one library.
    pub fn citation_key(citekey: &str, library_id: i64) -> Self {
        SearchQuery::new(JoinMode::All)
            .with(Condition::is(Field::CitationKey, citekey))
            .in_library(Some(library_id))
    }

    /// Candidate citation keys containing `fragment` within one library.
    ///
    /// Callers filter the results down to true prefix matches.
    pub fn citation_key_containing(fragment: &str, library_id: i64) -> Self {
        SearchQuery::new(JoinMode::All)
            .with(Condition::contains(Field::CitationKey, fragment))
            .in_library(Some(library_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::parse_key;

    #[test]
    fn test_parsed_key_conditions() {
        let parsed = parse_key("DoeBook2005").unwrap();
        let query = SearchQuery::for_parsed_key(&parsed);
        assert_eq!(query.join, JoinMode::All);
        assert_eq!(
            query.conditions,
            vec![
                Condition::contains(Field::Creator, "Doe"),
                Condition::contains(Field::Title, "Book"),
                Condition::is(Field::Date, "2005"),
            ]
        );
    }

    #[test]
    fn test_multi_creator_conditions_are_conjunctive() {
        let parsed = parse_key("roe_doe:2015hyphens").unwrap();
        let query = SearchQuery::for_parsed_key(&parsed);
        assert_eq!(query.join, JoinMode::All);
        let creators: Vec<_> = query
            .conditions
            .iter()
            .filter(|c| c.field == Field::Creator)
            .collect();
        assert_eq!(creators.len(), 2);
        assert_eq!(creators[0], &Condition::contains(Field::Creator, "roe"));
        assert_eq!(creators[1], &Condition::contains(Field::Creator, "doe"));
    }

    #[test]
    fn test_creator_only_has_single_condition() {
        let parsed = parse_key("Creator").unwrap();
        let query = SearchQuery::for_parsed_key(&parsed);
        assert_eq!(query.conditions.len(), 1);
    }

    #[test]
    fn test_pinned_key_is_any() {
        let query = SearchQuery::pinned_key("DoeBook2005");
        assert_eq!(query.join, JoinMode::Any);
        assert_eq!(query.conditions[0], Condition::is(Field::Tag, "@DoeBook2005"));
        assert_eq!(
            query.conditions[1],
            Condition::contains(Field::Note, "@DoeBook2005")
        );
    }

    #[test]
    fn test_quick_search_splits_on_plus_and_space() {
        let query = SearchQuery::quick("doe+first  book", QuickSearchMode::TitleCreatorYear);
        let words: Vec<_> = query.conditions.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(words, vec!["doe", "first", "book"]);
    }

    #[test]
    fn test_quick_search_mode_parse() {
        assert_eq!(
            "everything".parse::<QuickSearchMode>().unwrap(),
            QuickSearchMode::Everything
        );
        assert!("bogus".parse::<QuickSearchMode>().is_err());
        assert_eq!(QuickSearchMode::default().to_string(), "titleCreatorYear");
    }
}
