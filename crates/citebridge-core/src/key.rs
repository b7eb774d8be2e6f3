//! Citation key parsing.
//!
//! Two surface grammars are accepted:
//!
//! | Grammar | Example | Shape |
//! |---------|---------|-------|
//! | primary | `DoeTitle2000` | `<Creator><Title><yyyy>` |
//! | alternate | `doe:2000title` | `<creator>:<yyyy><title>` |
//!
//! Both are anchored at the start of the key only. Trailing text the grammar
//! cannot consume is ignored, so a partial key such as `doe:20` still parses
//! to `{ creator: "doe" }`; completion depends on this.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static PRIMARY_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\p{Lu}\p{Ll}+)(\p{Lu}\p{Ll}+)?([0-9]{4})?").unwrap());

static ALTERNATE_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\p{Ll}+(?:[_-]\p{Ll}+)*):?([0-9]{4})?(\p{Ll}+)?").unwrap()
});

/// Structured search criteria extracted from a citation key.
///
/// `None` fields leave that part of the search unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedKey {
    pub creator: String,
    pub title: Option<String>,
    pub date: Option<String>,
}

impl ParsedKey {
    /// Creator name components, split on `_`.
    ///
    /// `roe_doe` yields `["roe", "doe"]`; each component is searched as an
    /// independent "contains" constraint. Hyphens stay inside a component.
    pub fn creator_names(&self) -> impl Iterator<Item = &str> {
        self.creator.split('_').filter(|name| !name.is_empty())
    }
}

/// Parses a citation key, trying the primary grammar first.
///
/// Returns `None` when neither grammar matches.
pub fn parse_key(key: &str) -> Option<ParsedKey> {
    if let Some(caps) = PRIMARY_KEY_RE.captures(key) {
        return Some(ParsedKey {
            creator: caps[1].to_string(),
            title: caps.get(2).map(|m| m.as_str().to_string()),
            date: caps.get(3).map(|m| m.as_str().to_string()),
        });
    }

    let caps = ALTERNATE_KEY_RE.captures(key)?;
    Some(ParsedKey {
        creator: caps[1].to_string(),
        title: caps.get(3).map(|m| m.as_str().to_string()),
        date: caps.get(2).map(|m| m.as_str().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(creator: &str, title: Option<&str>, date: Option<&str>) -> ParsedKey {
        ParsedKey {
            creator: creator.to_string(),
            title: title.map(str::to_string),
            date: date.map(str::to_string),
        }
    }

    #[test]
    fn test_primary_full() {
        assert_eq!(
            parse_key("FooBar2016"),
            Some(parsed("Foo", Some("Bar"), Some("2016")))
        );
        assert_eq!(
            parse_key("DoeBook2005"),
            Some(parsed("Doe", Some("Book"), Some("2005")))
        );
    }

    #[test]
    fn test_primary_creator_only() {
        assert_eq!(parse_key("Creator"), Some(parsed("Creator", None, None)));
    }

    #[test]
    fn test_primary_creator_and_year() {
        assert_eq!(parse_key("Doe2005"), Some(parsed("Doe", None, Some("2005"))));
    }

    #[test]
    fn test_primary_unicode() {
        assert_eq!(
            parse_key("HüningRelatie2012"),
            Some(parsed("Hüning", Some("Relatie"), Some("2012")))
        );
    }

    #[test]
    fn test_alternate_full() {
        assert_eq!(
            parse_key("foo:2016bar"),
            Some(parsed("foo", Some("bar"), Some("2016")))
        );
    }

    #[test]
    fn test_alternate_multi_part_creator() {
        let key = parse_key("roe_doe:2015hyphens").unwrap();
        assert_eq!(key.creator, "roe_doe");
        assert_eq!(key.creator_names().collect::<Vec<_>>(), vec!["roe", "doe"]);
        assert_eq!(key.title.as_deref(), Some("hyphens"));
        assert_eq!(key.date.as_deref(), Some("2015"));
    }

    #[test]
    fn test_alternate_hyphenated_creator_is_one_component() {
        let key = parse_key("roe-doe:2015hyphens").unwrap();
        assert_eq!(key.creator_names().collect::<Vec<_>>(), vec!["roe-doe"]);
    }

    #[test]
    fn test_alternate_unicode() {
        assert_eq!(
            parse_key("hüáéèñ:2015acćénts"),
            Some(parsed("hüáéèñ", Some("acćénts"), Some("2015")))
        );
    }

    #[test]
    fn test_alternate_partial_keys() {
        assert_eq!(parse_key("doe"), Some(parsed("doe", None, None)));
        assert_eq!(parse_key("doe:"), Some(parsed("doe", None, None)));
        assert_eq!(parse_key("doe:20"), Some(parsed("doe", None, None)));
        assert_eq!(parse_key("doe:2006"), Some(parsed("doe", None, Some("2006"))));
        assert_eq!(
            parse_key("doe:2006art"),
            Some(parsed("doe", Some("art"), Some("2006")))
        );
    }

    #[test]
    fn test_malformed() {
        assert_eq!(parse_key("XXX"), None);
        assert_eq!(parse_key("123"), None);
        assert_eq!(parse_key(""), None);
        assert_eq!(parse_key(":2006doe"), None);
    }
}
