//! Plain author-date rendering and BibTeX export for hosts without a
//! citation processor.
//!
//! This is not CSL: every style renders the same `Last, First. Year. Title.`
//! shape. Hosts backed by a real processor ignore this module.

use quick_xml::escape::escape;
use serde_json::{json, Map, Value};

use super::{BibliographyEntry, Item, ItemId, ItemSummary, RenderedDocument, BIBTEX_TRANSLATOR};
use crate::error::{Error, Result};
use crate::keygen::{self, determine_author, determine_title_word, determine_year, EASY_KEY_TRANSLATOR};

/// `Doe, John`, `Doe, John, and Jane Roe`, or `Doe, John, et al.`
pub fn creator_list(summary: &ItemSummary) -> Option<String> {
    let first = summary.creators.first()?;
    let lead = if first.first_name.is_empty() {
        first.last_name.clone()
    } else {
        format!("{}, {}", first.last_name, first.first_name)
    };
    Some(match summary.creators.len() {
        1 => lead,
        2 => {
            let second = &summary.creators[1];
            format!("{}, and {} {}", lead, second.first_name, second.last_name)
                .trim_end()
                .to_string()
        }
        _ => format!("{}, et al.", lead),
    })
}

pub fn bibliography_entry(summary: &ItemSummary) -> BibliographyEntry {
    let mut parts = Vec::new();
    if let Some(creators) = creator_list(summary) {
        parts.push(creators.trim_end_matches('.').to_string());
    }
    let year = determine_year(summary.date.as_deref());
    if !year.is_empty() {
        parts.push(year);
    }
    if let Some(title) = summary.title.as_deref().filter(|t| !t.is_empty()) {
        parts.push(title.trim_end_matches('.').to_string());
    }
    let text = if parts.is_empty() {
        String::new()
    } else {
        format!("{}.", parts.join(". "))
    };
    let html = format!(
        "<div class=\"csl-bib-body\">\n  <div class=\"csl-entry\">{}</div>\n</div>",
        escape(text.as_str())
    );
    BibliographyEntry { html, text }
}

/// `(Doe 2005, 33; Roe 2010)` for the items of one citation cluster.
pub fn citation_cluster(cites: &[(ItemSummary, Map<String, Value>)]) -> String {
    let rendered: Vec<String> = cites
        .iter()
        .map(|(summary, options)| {
            let author = summary
                .creators
                .first()
                .map(|c| c.last_name.clone())
                .unwrap_or_else(|| summary.title.clone().unwrap_or_default());
            let mut cite = author;
            let year = determine_year(summary.date.as_deref());
            if !year.is_empty() {
                cite.push(' ');
                cite.push_str(&year);
            }
            if let Some(locator) = options.get("locator").and_then(Value::as_str) {
                cite.push_str(", ");
                cite.push_str(locator);
            }
            cite
        })
        .collect();
    format!("({})", rendered.join("; "))
}

/// CSL-JSON for an item: the stored CSL fields overlaid with the item's
/// `id` (its citation key when present), title, and authors.
pub fn csl_item(item: &Item, summary: &ItemSummary, citation_key: Option<&str>, csl: &Value) -> Value {
    let mut map = match csl {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    let id = citation_key.map_or_else(|| item.library_key(), str::to_string);
    map.insert("id".to_string(), json!(id));
    if let Some(title) = &summary.title {
        map.insert("title".to_string(), json!(title));
    }
    let authors: Vec<Value> = summary
        .creators
        .iter()
        .map(|c| json!({ "family": c.last_name, "given": c.first_name }))
        .collect();
    if !authors.is_empty() {
        map.insert("author".to_string(), Value::Array(authors));
    }
    Value::Object(map)
}

/// One cited item: host id, summary, and the per-cite options.
pub type Cite = (ItemId, ItemSummary, Map<String, Value>);

/// Clusters for each group plus a bibliography of every distinct cited item,
/// in first-cited order. The bibliography is `[{entry_count}, [html, ...]]`.
pub fn render_document(groups: Vec<Vec<Cite>>) -> RenderedDocument {
    let mut seen: Vec<ItemId> = Vec::new();
    let mut entries = Vec::new();
    let mut clusters = Vec::with_capacity(groups.len());
    for group in groups {
        let mut cites = Vec::with_capacity(group.len());
        for (id, summary, options) in group {
            if !seen.contains(&id) {
                seen.push(id);
                entries.push(bibliography_entry(&summary).html);
            }
            cites.push((summary, options));
        }
        clusters.push(citation_cluster(&cites));
    }
    RenderedDocument {
        bibliography: json!([{ "entry_count": entries.len() }, entries]),
        citation_clusters: clusters,
    }
}

/// Runs one of the two built-in translators.
pub fn export(records: &[(ItemSummary, Value)], translator_id: &str) -> Result<String> {
    match translator_id {
        EASY_KEY_TRANSLATOR => Ok(keygen::export_easy_keys(records.iter().map(|(s, _)| s))),
        BIBTEX_TRANSLATOR => Ok(records
            .iter()
            .map(|(s, csl)| bibtex_entry(s, csl))
            .collect::<Vec<_>>()
            .join("\n\n")),
        other => Err(Error::Unsupported(format!(
            "translator {} is not installed",
            other
        ))),
    }
}

/// Cite key used in BibTeX output: `doe_article_2006`.
pub fn bibtex_key(summary: &ItemSummary) -> String {
    let mut parts = vec![determine_author(summary).to_lowercase()];
    parts.push(determine_title_word(summary.title.as_deref()));
    let year = determine_year(summary.date.as_deref());
    if !year.is_empty() {
        parts.push(year);
    }
    parts.join("_")
}

fn bibtex_type(csl_type: &str) -> &'static str {
    match csl_type {
        "article-journal" | "article-magazine" | "article-newspaper" => "article",
        "book" => "book",
        "chapter" => "incollection",
        "paper-conference" => "inproceedings",
        "thesis" => "phdthesis",
        "report" => "techreport",
        _ => "misc",
    }
}

/// One BibTeX entry built from an item's summary and CSL-JSON.
pub fn bibtex_entry(summary: &ItemSummary, csl: &Value) -> String {
    let csl_str = |name: &str| -> Option<String> {
        match csl.get(name)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };
    let entry_type = bibtex_type(csl.get("type").and_then(Value::as_str).unwrap_or(""));

    let mut fields: Vec<(&str, String)> = Vec::new();
    if let Some(title) = &summary.title {
        fields.push(("title", title.clone()));
    }
    if let Some(container) = csl_str("container-title") {
        let name = match entry_type {
            "article" => "journal",
            _ => "booktitle",
        };
        fields.push((name, container));
    }
    if let Some(volume) = csl_str("volume") {
        fields.push(("volume", volume));
    }
    if !summary.creators.is_empty() {
        let authors: Vec<String> = summary
            .creators
            .iter()
            .map(|c| {
                if c.first_name.is_empty() {
                    c.last_name.clone()
                } else {
                    format!("{}, {}", c.last_name, c.first_name)
                }
            })
            .collect();
        fields.push(("author", authors.join(" and ")));
    }
    if let Some(publisher) = csl_str("publisher") {
        fields.push(("publisher", publisher));
    }
    if let Some(place) = csl_str("publisher-place") {
        fields.push(("address", place));
    }
    let year = determine_year(summary.date.as_deref());
    if !year.is_empty() {
        fields.push(("year", year));
    }
    if let Some(pages) = csl_str("page") {
        fields.push(("pages", pages.replace('-', "--")));
    }

    let body: Vec<String> = fields
        .iter()
        .map(|(name, value)| format!("\t{} = {{{}}}", name, value))
        .collect();
    format!("@{}{{{},\n{}\n}}", entry_type, bibtex_key(summary), body.join(",\n"))
}
