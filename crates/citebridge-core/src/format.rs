//! Response formats and the [`Reply`] they produce.
//!
//! Every endpoint ends in [`format_items`] or in one of the [`Reply`]
//! constructors. Errors become replies in exactly one place,
//! [`Reply::from_error`].

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::host::{Host, Item, BIBTEX_TRANSLATOR};
use crate::keygen::{determine_year, EASY_KEY_TRANSLATOR};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

/// Prefix applied to style ids that are not already URLs.
pub const STYLE_URL_PREFIX: &str = "http://www.zotero.org/styles/";

static TRANSLATOR_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}$")
        .unwrap()
});

/// Output format selected by the `format` query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Format {
    /// `["<lib>_<key>", ...]`
    Key,
    /// `[{key, html, text}, ...]` rendered in the requested style.
    Bibliography,
    /// CSL-JSON.
    Json,
    EasyKey,
    /// Citation keys from the host's citation-key field.
    CitationKey,
    BibTex,
    /// Raw output of the translator with this id.
    Translator(String),
    /// `[{key, paths}, ...]` for regular items.
    Paths,
    /// `[{key, quickBib}, ...]` for regular items.
    QuickBib,
}

impl Format {
    /// Parses a wire name; `None` selects [`Format::Json`].
    pub fn parse(name: Option<&str>) -> Result<Self> {
        let Some(name) = name else {
            return Ok(Format::Json);
        };
        match name {
            "key" => Ok(Format::Key),
            "bibliography" => Ok(Format::Bibliography),
            "json" => Ok(Format::Json),
            "easykey" => Ok(Format::EasyKey),
            "citekey" | "betterbibtexkey" => Ok(Format::CitationKey),
            "bibtex" => Ok(Format::BibTex),
            "paths" => Ok(Format::Paths),
            "quickBib" => Ok(Format::QuickBib),
            id if TRANSLATOR_ID_RE.is_match(id) => Ok(Format::Translator(id.to_string())),
            other => Err(Error::InvalidRequest(format!("Unknown format: {}", other))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Key => f.write_str("key"),
            Format::Bibliography => f.write_str("bibliography"),
            Format::Json => f.write_str("json"),
            Format::EasyKey => f.write_str("easykey"),
            Format::CitationKey => f.write_str("citekey"),
            Format::BibTex => f.write_str("bibtex"),
            Format::Translator(id) => f.write_str(id),
            Format::Paths => f.write_str("paths"),
            Format::QuickBib => f.write_str("quickBib"),
        }
    }
}

/// A finished HTTP reply, independent of any server framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    /// `200` with `value` as two-space indented JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let body = serde_json::to_string_pretty(value).map_err(anyhow::Error::from)?;
        Ok(Self {
            status: 200,
            content_type: JSON_CONTENT_TYPE,
            body,
        })
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: TEXT_CONTENT_TYPE,
            body: body.into(),
        }
    }

    /// `400` with the message for client errors; `500` with the message and
    /// its cause chain otherwise.
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::Host(inner) => {
                let mut body = inner.to_string();
                for cause in inner.chain().skip(1) {
                    body.push_str("\ncaused by: ");
                    body.push_str(&cause.to_string());
                }
                Self::text(500, body)
            }
            client => Self::text(400, client.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Full style URL for a style parameter.
///
/// Missing or empty values select `default_style`. Values that are not
/// already `http(s)` URLs get [`STYLE_URL_PREFIX`].
pub fn normalize_style_id(style: Option<&str>, default_style: &str) -> String {
    let style = style.filter(|s| !s.is_empty()).unwrap_or(default_style);
    if style.starts_with("http://") || style.starts_with("https://") {
        style.to_string()
    } else {
        format!("{}{}", STYLE_URL_PREFIX, style)
    }
}

#[derive(Serialize)]
struct BibliographyRecord {
    key: String,
    html: String,
    text: String,
}

#[derive(Serialize)]
struct PathsRecord {
    key: String,
    paths: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuickBibRecord {
    key: String,
    quick_bib: String,
}

/// Renders `items` as `format`.
///
/// `style_id` must already be normalized; it is only read by
/// [`Format::Bibliography`].
pub async fn format_items(
    host: &dyn Host,
    items: &[Item],
    format: &Format,
    style_id: &str,
    locale: Option<&str>,
) -> Result<Reply> {
    match format {
        Format::Key => {
            let keys: Vec<String> = items.iter().map(Item::library_key).collect();
            Reply::json(&keys)
        }
        Format::Bibliography => {
            let entries = host.render_bibliography(items, style_id, locale).await?;
            if entries.len() != items.len() {
                return Err(Error::Host(anyhow::anyhow!(
                    "host rendered {} bibliography entries for {} items",
                    entries.len(),
                    items.len()
                )));
            }
            let records: Vec<BibliographyRecord> = items
                .iter()
                .zip(entries)
                .map(|(item, entry)| BibliographyRecord {
                    key: item.library_key(),
                    html: entry.html,
                    text: entry.text.replace(['\r', '\n'], ""),
                })
                .collect();
            Reply::json(&records)
        }
        Format::Json => Reply::json(&host.csl_json(items).await?),
        Format::EasyKey => {
            if items.is_empty() {
                return Reply::json(&Vec::<String>::new());
            }
            let raw = host.export(items, EASY_KEY_TRANSLATOR).await?;
            let keys: Vec<String> = raw
                .split_whitespace()
                .map(|key| key.replace(['[', ']', '@'], ""))
                .collect();
            Reply::json(&keys)
        }
        Format::CitationKey => {
            if !host.supports_citation_keys() {
                return Err(Error::Unsupported(
                    "citation keys are not available in this library".to_string(),
                ));
            }
            let mut keys = Vec::with_capacity(items.len());
            for item in items {
                if let Some(citekey) = host.citation_key(item).await? {
                    keys.push(citekey);
                }
            }
            Reply::json(&keys)
        }
        Format::BibTex => Ok(Reply::text(200, host.export(items, BIBTEX_TRANSLATOR).await?)),
        Format::Translator(id) => Ok(Reply::text(200, host.export(items, id).await?)),
        Format::Paths => {
            let mut records = Vec::new();
            for item in items.iter().filter(|i| i.is_regular()) {
                records.push(PathsRecord {
                    key: item.library_key(),
                    paths: host.attachment_paths(item).await?,
                });
            }
            Reply::json(&records)
        }
        Format::QuickBib => {
            let mut records = Vec::new();
            for item in items.iter().filter(|i| i.is_regular()) {
                let summary = host.summary(item).await?;
                let mut creators = summary
                    .creators
                    .first()
                    .map(|c| format!("{}, {}", c.last_name, c.first_name))
                    .unwrap_or_default();
                if summary.creators.len() > 1 {
                    creators.push_str(", et al.");
                }
                records.push(QuickBibRecord {
                    key: item.library_key(),
                    quick_bib: format!(
                        "{} - {} - {}",
                        creators,
                        determine_year(summary.date.as_deref()),
                        summary.title.unwrap_or_default()
                    ),
                });
            }
            Reply::json(&records)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::{MemoryHost, NewItem};

    const CHICAGO: &str = "http://www.zotero.org/styles/chicago-note-bibliography";

    #[test]
    fn test_parse_formats() {
        assert_eq!(Format::parse(None).unwrap(), Format::Json);
        assert_eq!(Format::parse(Some("betterbibtexkey")).unwrap(), Format::CitationKey);
        assert_eq!(Format::parse(Some("quickBib")).unwrap(), Format::QuickBib);
        assert_eq!(
            Format::parse(Some("248bebf1-46ab-4067-9f93-ec3d2960d0cd")).unwrap(),
            Format::Translator("248bebf1-46ab-4067-9f93-ec3d2960d0cd".to_string())
        );
        let err = Format::parse(Some("yaml")).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_normalize_style_id() {
        assert_eq!(normalize_style_id(None, "chicago-note-bibliography"), CHICAGO);
        assert_eq!(normalize_style_id(Some(""), "chicago-note-bibliography"), CHICAGO);
        assert_eq!(
            normalize_style_id(Some("apa"), "chicago-note-bibliography"),
            "http://www.zotero.org/styles/apa"
        );
        assert_eq!(
            normalize_style_id(Some("https://example.org/styles/x"), "apa"),
            "https://example.org/styles/x"
        );
    }

    #[test]
    fn test_error_replies() {
        let reply = Reply::from_error(&Error::NotFound("1_X not found".into()));
        assert_eq!(reply.status, 400);
        assert_eq!(reply.content_type, TEXT_CONTENT_TYPE);
        assert_eq!(reply.body, "1_X not found");

        let inner = anyhow::anyhow!("disk I/O error").context("query failed");
        let reply = Reply::from_error(&Error::Host(inner));
        assert_eq!(reply.status, 500);
        assert_eq!(reply.body, "query failed\ncaused by: disk I/O error");
    }

    #[tokio::test]
    async fn test_key_format() {
        let host = MemoryHost::new(1);
        let item = host.add(NewItem::regular(1).key("ZBZQ4KMP"));
        let reply = format_items(&host, &[item], &Format::Key, CHICAGO, None)
            .await
            .unwrap();
        assert_eq!(reply.content_type, JSON_CONTENT_TYPE);
        assert_eq!(reply.body, "[\n  \"1_ZBZQ4KMP\"\n]");
    }

    #[tokio::test]
    async fn test_easykey_format() {
        let host = MemoryHost::new(1);
        let item = host.add(NewItem::regular(1).creator("Doe", "John").title("Article").date("2006"));
        let reply = format_items(&host, &[item], &Format::EasyKey, CHICAGO, None)
            .await
            .unwrap();
        let keys: Vec<String> = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(keys, vec!["doe:2006article"]);
    }

    #[tokio::test]
    async fn test_empty_easykey_short_circuits() {
        let host = MemoryHost::new(1);
        let reply = format_items(&host, &[], &Format::EasyKey, CHICAGO, None)
            .await
            .unwrap();
        assert_eq!(reply.body, "[]");
    }

    #[tokio::test]
    async fn test_bibliography_strips_newlines() {
        let host = MemoryHost::new(1);
        let item = host.add(NewItem::regular(1).creator("Doe", "John").title("Article").date("2006"));
        let reply = format_items(&host, &[item], &Format::Bibliography, CHICAGO, None)
            .await
            .unwrap();
        let records: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(records[0]["key"], "1_MEM00001");
        assert_eq!(records[0]["text"], "Doe, John. 2006. Article.");
        assert!(records[0]["html"].as_str().unwrap().contains("csl-entry"));
    }

    #[tokio::test]
    async fn test_quick_bib_skips_notes() {
        let host = MemoryHost::new(1);
        let article = host.add(
            NewItem::regular(1)
                .creator("Doe", "John")
                .creator("Roe", "Jane")
                .title("Article")
                .date("2006-03-01"),
        );
        let note = host.add(NewItem::note(None, 1, "loose note"));
        let reply = format_items(&host, &[article, note], &Format::QuickBib, CHICAGO, None)
            .await
            .unwrap();
        let records: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(records.as_array().unwrap().len(), 1);
        assert_eq!(records[0]["quickBib"], "Doe, John, et al. - 2006 - Article");
    }

    #[tokio::test]
    async fn test_bibtex_is_plain_text() {
        let host = MemoryHost::new(1);
        let item = host.add(NewItem::regular(1).creator("Doe", "John").title("Article").date("2006"));
        let reply = format_items(&host, &[item], &Format::BibTex, CHICAGO, None)
            .await
            .unwrap();
        assert_eq!(reply.content_type, TEXT_CONTENT_TYPE);
        assert!(reply.body.starts_with("@misc{doe_article_2006,"));
    }

    #[tokio::test]
    async fn test_citation_keys_unsupported() {
        let host = MemoryHost::new(1).without_citation_keys();
        let item = host.add(NewItem::regular(1));
        let err = format_items(&host, &[item], &Format::CitationKey, CHICAGO, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
