//! In-memory [`Host`] implementation for tests and embedders.
//!
//! Items live in a `Vec` behind `std::sync::RwLock`. Search evaluates each
//! [`Condition`] against every record, case-insensitively. Rendering and
//! export go through [`plain`](super::plain).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::plain;
use super::{
    BibliographyEntry, CitationGroup, Creator, Host, Item, ItemId, ItemKind, ItemSummary,
    RenderedDocument, StyleInfo,
};
use crate::error::{Error, Result};
use crate::keygen;
use crate::query::{Condition, Field, JoinMode, Operator, QuickSearchMode, SearchQuery};

/// Description of an item to add to a [`MemoryHost`].
#[derive(Debug, Clone)]
pub struct NewItem {
    library_id: i64,
    key: Option<String>,
    kind: ItemKind,
    parent_key: Option<String>,
    summary: ItemSummary,
    tags: Vec<String>,
    note: Option<String>,
    citation_key: Option<String>,
    path: Option<String>,
    csl: Value,
}

impl NewItem {
    fn with_kind(library_id: i64, kind: ItemKind) -> Self {
        Self {
            library_id,
            key: None,
            kind,
            parent_key: None,
            summary: ItemSummary::default(),
            tags: Vec::new(),
            note: None,
            citation_key: None,
            path: None,
            csl: json!({}),
        }
    }

    pub fn regular(library_id: i64) -> Self {
        Self::with_kind(library_id, ItemKind::Regular)
    }

    /// A note; `parent` makes it a child note.
    pub fn note(parent: Option<&Item>, library_id: i64, text: &str) -> Self {
        let mut item = Self::with_kind(library_id, ItemKind::Note);
        item.parent_key = parent.map(|p| p.key.clone());
        item.note = Some(text.to_string());
        item
    }

    pub fn attachment(parent: &Item, path: &str) -> Self {
        let mut item = Self::with_kind(parent.library_id, ItemKind::Attachment);
        item.parent_key = Some(parent.key.clone());
        item.path = Some(path.to_string());
        item
    }

    pub fn key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn creator(mut self, last: &str, first: &str) -> Self {
        self.summary.creators.push(Creator::new(last, first));
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.summary.title = Some(title.to_string());
        self
    }

    pub fn date(mut self, date: &str) -> Self {
        self.summary.date = Some(date.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn citation_key(mut self, citekey: &str) -> Self {
        self.citation_key = Some(citekey.to_string());
        self
    }

    /// Extra CSL-JSON fields merged into the item's CSL output.
    pub fn csl(mut self, csl: Value) -> Self {
        self.csl = csl;
        self
    }
}

struct Record {
    item: Item,
    summary: ItemSummary,
    tags: Vec<String>,
    note: Option<String>,
    citation_key: Option<String>,
    path: Option<String>,
    csl: Value,
}

impl Record {
    fn year(&self) -> String {
        keygen::determine_year(self.summary.date.as_deref())
    }

    fn creator_contains(&self, needle: &str) -> bool {
        self.summary.creators.iter().any(|c| {
            format!("{} {}", c.first_name, c.last_name)
                .to_lowercase()
                .contains(needle)
        })
    }

    fn title_contains(&self, needle: &str) -> bool {
        self.summary
            .title
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(needle))
    }

    fn note_contains(&self, needle: &str) -> bool {
        self.note
            .as_deref()
            .is_some_and(|n| n.to_lowercase().contains(needle))
    }

    fn fields_contain(&self, needle: &str) -> bool {
        self.citation_key
            .as_deref()
            .is_some_and(|k| k.to_lowercase().contains(needle))
            || self.csl.to_string().to_lowercase().contains(needle)
    }

    fn matches(&self, condition: &Condition) -> bool {
        let value = condition.value.to_lowercase();
        match (condition.field, condition.operator) {
            (Field::Creator, _) => self.creator_contains(&value),
            (Field::Title, Operator::Contains) => self.title_contains(&value),
            (Field::Title, Operator::Is) => self
                .summary
                .title
                .as_deref()
                .is_some_and(|t| t.to_lowercase() == value),
            (Field::Date, _) => {
                if value.len() == 4 && value.chars().all(|c| c.is_ascii_digit()) {
                    self.year() == value
                } else {
                    self.summary.date.as_deref() == Some(condition.value.as_str())
                }
            }
            (Field::Tag, Operator::Is) => self.tags.iter().any(|t| t == &condition.value),
            (Field::Tag, Operator::Contains) => {
                self.tags.iter().any(|t| t.to_lowercase().contains(&value))
            }
            (Field::Note, _) => self.note_contains(&value),
            (Field::CitationKey, Operator::Is) => {
                self.citation_key.as_deref() == Some(condition.value.as_str())
            }
            (Field::CitationKey, Operator::Contains) => self
                .citation_key
                .as_deref()
                .is_some_and(|k| k.contains(condition.value.as_str())),
            (Field::QuickSearch(mode), _) => {
                let basic = self.title_contains(&value)
                    || self.creator_contains(&value)
                    || self.year().contains(&value);
                match mode {
                    QuickSearchMode::TitleCreatorYear => basic,
                    QuickSearchMode::Fields => basic || self.fields_contain(&value),
                    QuickSearchMode::Everything => {
                        basic || self.fields_contain(&value) || self.note_contains(&value)
                    }
                }
            }
        }
    }
}

struct State {
    records: Vec<Record>,
    collections: HashMap<String, Vec<ItemId>>,
    selection: Vec<ItemId>,
}

/// In-memory reference library.
pub struct MemoryHost {
    user_library_id: i64,
    citation_keys: bool,
    styles: Vec<StyleInfo>,
    locales: Vec<String>,
    state: RwLock<State>,
    searches: AtomicUsize,
}

impl MemoryHost {
    /// An empty library with a `chicago-note-bibliography` style and `en-US`.
    pub fn new(user_library_id: i64) -> Self {
        Self {
            user_library_id,
            citation_keys: true,
            styles: vec![StyleInfo {
                id: "http://www.zotero.org/styles/chicago-note-bibliography".to_string(),
                title: "Chicago Manual of Style (note)".to_string(),
            }],
            locales: vec!["en-US".to_string()],
            state: RwLock::new(State {
                records: Vec::new(),
                collections: HashMap::new(),
                selection: Vec::new(),
            }),
            searches: AtomicUsize::new(0),
        }
    }

    /// Disables the citation-key field, as on a host without that integration.
    pub fn without_citation_keys(mut self) -> Self {
        self.citation_keys = false;
        self
    }

    pub fn with_style(mut self, id: &str, title: &str) -> Self {
        self.styles.push(StyleInfo {
            id: id.to_string(),
            title: title.to_string(),
        });
        self
    }

    /// Adds an item and returns its identity.
    pub fn add(&self, new: NewItem) -> Item {
        let mut state = self.state.write().unwrap();
        let id = state.records.len() as ItemId + 1;
        let key = new.key.unwrap_or_else(|| format!("MEM{:05}", id));
        let item = Item {
            id,
            library_id: new.library_id,
            key,
            kind: new.kind,
            parent_key: new.parent_key,
        };
        state.records.push(Record {
            item: item.clone(),
            summary: new.summary,
            tags: new.tags,
            note: new.note,
            citation_key: new.citation_key,
            path: new.path,
            csl: new.csl,
        });
        item
    }

    pub fn add_to_collection(&self, name: &str, item: &Item) {
        let mut state = self.state.write().unwrap();
        state
            .collections
            .entry(name.to_string())
            .or_default()
            .push(item.id);
    }

    /// Number of [`Host::search`] calls served so far.
    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    fn with_record<T>(&self, item: &Item, f: impl FnOnce(&Record) -> T) -> Result<T> {
        let state = self.state.read().unwrap();
        state
            .records
            .iter()
            .find(|r| r.item.id == item.id)
            .map(f)
            .ok_or_else(|| Error::Host(anyhow::anyhow!("item {} does not exist", item.id)))
    }

    fn check_style(&self, style_id: &str) -> Result<()> {
        if self.styles.iter().any(|s| s.id == style_id) {
            Ok(())
        } else {
            Err(Error::StyleNotInstalled(style_id.to_string()))
        }
    }
}

#[async_trait]
impl Host for MemoryHost {
    fn version(&self) -> String {
        format!("memory {}", env!("CARGO_PKG_VERSION"))
    }

    fn user_library_id(&self) -> i64 {
        self.user_library_id
    }

    fn supports_citation_keys(&self) -> bool {
        self.citation_keys
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ItemId>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().unwrap();
        Ok(state
            .records
            .iter()
            .filter(|r| query.library_id.map_or(true, |lib| r.item.library_id == lib))
            .filter(|r| match query.join {
                JoinMode::All => query.conditions.iter().all(|c| r.matches(c)),
                JoinMode::Any => query.conditions.iter().any(|c| r.matches(c)),
            })
            .map(|r| r.item.id)
            .collect())
    }

    async fn item(&self, id: ItemId) -> Result<Option<Item>> {
        let state = self.state.read().unwrap();
        Ok(state
            .records
            .iter()
            .find(|r| r.item.id == id)
            .map(|r| r.item.clone()))
    }

    async fn item_by_key(&self, library_id: i64, key: &str) -> Result<Option<Item>> {
        let state = self.state.read().unwrap();
        Ok(state
            .records
            .iter()
            .find(|r| r.item.library_id == library_id && r.item.key == key)
            .map(|r| r.item.clone()))
    }

    async fn all_items(&self, library_id: i64) -> Result<Vec<Item>> {
        let state = self.state.read().unwrap();
        Ok(state
            .records
            .iter()
            .filter(|r| r.item.library_id == library_id && r.item.is_regular())
            .map(|r| r.item.clone())
            .collect())
    }

    async fn collection_items(&self, name: &str) -> Result<Vec<Item>> {
        let state = self.state.read().unwrap();
        let Some(ids) = state.collections.get(name) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| state.records.iter().find(|r| r.item.id == *id))
            .map(|r| r.item.clone())
            .collect())
    }

    async fn selected_items(&self) -> Result<Vec<Item>> {
        let state = self.state.read().unwrap();
        Ok(state
            .selection
            .iter()
            .filter_map(|id| state.records.iter().find(|r| r.item.id == *id))
            .map(|r| r.item.clone())
            .collect())
    }

    async fn select_item(&self, item: &Item) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.selection = vec![item.id];
        Ok(())
    }

    async fn summary(&self, item: &Item) -> Result<ItemSummary> {
        self.with_record(item, |r| r.summary.clone())
    }

    async fn citation_key(&self, item: &Item) -> Result<Option<String>> {
        self.with_record(item, |r| r.citation_key.clone())
    }

    async fn csl_json(&self, items: &[Item]) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.with_record(item, |r| {
                plain::csl_item(item, &r.summary, r.citation_key.as_deref(), &r.csl)
            })?);
        }
        Ok(out)
    }

    async fn attachment_paths(&self, item: &Item) -> Result<Vec<String>> {
        let state = self.state.read().unwrap();
        Ok(state
            .records
            .iter()
            .filter(|r| {
                r.item.kind == ItemKind::Attachment
                    && r.item.library_id == item.library_id
                    && r.item.parent_key.as_deref() == Some(item.key.as_str())
            })
            .filter_map(|r| r.path.clone())
            .collect())
    }

    async fn styles(&self) -> Result<Vec<StyleInfo>> {
        Ok(self.styles.clone())
    }

    async fn locales(&self) -> Result<Vec<String>> {
        Ok(self.locales.clone())
    }

    async fn render_bibliography(
        &self,
        items: &[Item],
        style_id: &str,
        _locale: Option<&str>,
    ) -> Result<Vec<BibliographyEntry>> {
        self.check_style(style_id)?;
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            entries.push(self.with_record(item, |r| plain::bibliography_entry(&r.summary))?);
        }
        Ok(entries)
    }

    async fn render_citations(
        &self,
        groups: &[CitationGroup],
        style_id: &str,
        _locale: Option<&str>,
    ) -> Result<RenderedDocument> {
        self.check_style(style_id)?;
        let mut cites = Vec::with_capacity(groups.len());
        for group in groups {
            let mut cluster = Vec::with_capacity(group.citation_items.len());
            for cite in &group.citation_items {
                let summary = self.with_record(&cite.item, |r| r.summary.clone())?;
                cluster.push((cite.item.id, summary, cite.options.clone()));
            }
            cites.push(cluster);
        }
        Ok(plain::render_document(cites))
    }

    async fn export(&self, items: &[Item], translator_id: &str) -> Result<String> {
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            records.push(self.with_record(item, |r| (r.summary.clone(), r.csl.clone()))?);
        }
        plain::export(&records, translator_id)
    }
}
