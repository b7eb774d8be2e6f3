//! The host abstraction.
//!
//! citebridge owns no storage, search index, or citation processor. Every
//! data access goes through a [`Host`]: the application binds a SQLite
//! library, tests bind [`memory::MemoryHost`], and an embedder can bind a
//! live reference manager.
//!
//! The core treats an [`Item`] as an identity: it never reads bibliographic
//! fields except through [`Host::summary`] (for the quick-bibliography string
//! and key generation) and passes items back to the host for rendering and
//! export.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`search`](Host::search) | Run a [`SearchQuery`], returning item ids |
//! | [`item`](Host::item) / [`item_by_key`](Host::item_by_key) | Identity lookups |
//! | [`summary`](Host::summary) | Creators, title, date |
//! | [`csl_json`](Host::csl_json) | CSL-JSON for items |
//! | [`render_bibliography`](Host::render_bibliography) | Per-item bibliography entries |
//! | [`render_citations`](Host::render_citations) | Citation clusters plus bibliography |
//! | [`export`](Host::export) | Translator output |

pub mod memory;
pub mod plain;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::query::SearchQuery;

/// Translator id of the BibTeX exporter.
pub const BIBTEX_TRANSLATOR: &str = "9cb70025-a888-4a29-a210-93ec52da40d4";

/// Host-internal item identifier.
pub type ItemId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    /// A bibliographic record.
    Regular,
    Note,
    Attachment,
}

/// Identity of a bibliographic record owned by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub library_id: i64,
    /// Item key, unique within its library.
    pub key: String,
    pub kind: ItemKind,
    /// Key of the parent item for child notes and attachments.
    pub parent_key: Option<String>,
}

impl Item {
    /// Wire identifier: `<libraryId>_<itemKey>`.
    pub fn library_key(&self) -> String {
        format!("{}_{}", self.library_id, self.key)
    }

    pub fn is_regular(&self) -> bool {
        self.kind == ItemKind::Regular
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Creator {
    pub last_name: String,
    pub first_name: String,
}

impl Creator {
    pub fn new(last_name: impl Into<String>, first_name: impl Into<String>) -> Self {
        Self {
            last_name: last_name.into(),
            first_name: first_name.into(),
        }
    }
}

/// The few bibliographic fields the core is allowed to see.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ItemSummary {
    pub creators: Vec<Creator>,
    pub title: Option<String>,
    pub date: Option<String>,
}

/// One rendered bibliography entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BibliographyEntry {
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleInfo {
    pub id: String,
    pub title: String,
}

/// A resolved citation inside a [`CitationGroup`].
///
/// `options` carries the request's other per-item fields (`locator`,
/// `prefix`, ...) through to the host unchanged.
#[derive(Debug, Clone)]
pub struct CitationItem {
    pub item: Item,
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct CitationGroup {
    pub citation_items: Vec<CitationItem>,
    pub properties: Value,
}

/// Output of [`Host::render_citations`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedDocument {
    pub bibliography: Value,
    pub citation_clusters: Vec<String>,
}

/// Operations citebridge needs from a reference library.
///
/// Methods return [`crate::Result`] so a host can report client errors
/// (an unknown translator, a style that is not installed) as well as
/// failures of its own, which it wraps in [`Error::Host`](crate::Error::Host).
#[async_trait]
pub trait Host: Send + Sync {
    /// Host name and version, reported by the `version` endpoint.
    fn version(&self) -> String;

    /// Id of the user's personal library.
    fn user_library_id(&self) -> i64;

    /// Whether items carry a citation-key field.
    fn supports_citation_keys(&self) -> bool {
        false
    }

    /// Ids of items matching `query`, in host order.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ItemId>>;

    async fn item(&self, id: ItemId) -> Result<Option<Item>>;

    async fn item_by_key(&self, library_id: i64, key: &str) -> Result<Option<Item>>;

    /// Top-level items of a library.
    async fn all_items(&self, library_id: i64) -> Result<Vec<Item>>;

    /// Items of the first collection named `name`, searching nested
    /// collections too. Unknown names yield an empty list.
    async fn collection_items(&self, name: &str) -> Result<Vec<Item>>;

    async fn selected_items(&self) -> Result<Vec<Item>>;

    async fn select_item(&self, item: &Item) -> Result<()>;

    async fn summary(&self, item: &Item) -> Result<ItemSummary>;

    async fn citation_key(&self, item: &Item) -> Result<Option<String>>;

    async fn csl_json(&self, items: &[Item]) -> Result<Vec<Value>>;

    /// Filesystem paths of an item's attachments.
    async fn attachment_paths(&self, item: &Item) -> Result<Vec<String>>;

    async fn styles(&self) -> Result<Vec<StyleInfo>>;

    async fn locales(&self) -> Result<Vec<String>>;

    /// One entry per item, in input order.
    async fn render_bibliography(
        &self,
        items: &[Item],
        style_id: &str,
        locale: Option<&str>,
    ) -> Result<Vec<BibliographyEntry>>;

    async fn render_citations(
        &self,
        groups: &[CitationGroup],
        style_id: &str,
        locale: Option<&str>,
    ) -> Result<RenderedDocument>;

    /// Runs the translator `translator_id` over `items`.
    async fn export(&self, items: &[Item], translator_id: &str) -> Result<String>;
}
