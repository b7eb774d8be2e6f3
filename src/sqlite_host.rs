//! [`Host`] backed by the SQLite library database.
//!
//! Search conditions compile to SQL fragments over the folded columns
//! written by [`import`](crate::import). Rendering and export use the plain
//! renderer from [`citebridge_core::host::plain`]; styles and locales come
//! from the `[citation]` config section.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use citebridge_core::format::normalize_style_id;
use citebridge_core::host::{
    plain, BibliographyEntry, CitationGroup, Creator, Host, Item, ItemId, ItemKind, ItemSummary,
    RenderedDocument, StyleInfo,
};
use citebridge_core::query::{Condition, Field, JoinMode, Operator, QuickSearchMode, SearchQuery};
use citebridge_core::{Error, Result};

use crate::config::Config;
use crate::db;
use crate::migrate;

/// Lowercases text for the `*_folded` columns and for query values.
pub fn fold(s: &str) -> String {
    s.to_lowercase()
}

pub(crate) fn kind_name(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Regular => "regular",
        ItemKind::Note => "note",
        ItemKind::Attachment => "attachment",
    }
}

fn parse_kind(name: &str) -> ItemKind {
    match name {
        "note" => ItemKind::Note,
        "attachment" => ItemKind::Attachment,
        _ => ItemKind::Regular,
    }
}

const ITEM_COLUMNS: &str = "items.id, items.library_id, items.key, items.kind, items.parent_key";

fn row_to_item(row: &SqliteRow) -> Item {
    Item {
        id: row.get("id"),
        library_id: row.get("library_id"),
        key: row.get("key"),
        kind: parse_kind(row.get::<String, _>("kind").as_str()),
        parent_key: row.get("parent_key"),
    }
}

/// A SQL boolean expression with its positional bind values.
struct Fragment {
    sql: String,
    binds: Vec<String>,
}

impl Fragment {
    fn new(sql: impl Into<String>, binds: Vec<String>) -> Self {
        Self {
            sql: sql.into(),
            binds,
        }
    }

    fn or(parts: Vec<Fragment>) -> Self {
        let sql = parts
            .iter()
            .map(|p| p.sql.as_str())
            .collect::<Vec<_>>()
            .join(" OR ");
        let binds = parts.into_iter().flat_map(|p| p.binds).collect();
        Self::new(format!("({})", sql), binds)
    }
}

const CREATOR_CONTAINS: &str = "EXISTS (SELECT 1 FROM creators c \
     WHERE c.item_id = items.id AND instr(c.name_folded, ?) > 0)";

fn condition_sql(condition: &Condition) -> Fragment {
    let folded = fold(&condition.value);
    let raw = condition.value.clone();
    match (condition.field, condition.operator) {
        (Field::Creator, _) => Fragment::new(CREATOR_CONTAINS, vec![folded]),
        (Field::Title, Operator::Contains) => {
            Fragment::new("instr(items.title_folded, ?) > 0", vec![folded])
        }
        (Field::Title, Operator::Is) => Fragment::new("items.title_folded = ?", vec![folded]),
        (Field::Date, _) => {
            if raw.len() == 4 && raw.chars().all(|c| c.is_ascii_digit()) {
                Fragment::new("items.year = ?", vec![raw])
            } else {
                Fragment::new("items.date = ?", vec![raw])
            }
        }
        (Field::Tag, Operator::Is) => Fragment::new(
            "EXISTS (SELECT 1 FROM tags t WHERE t.item_id = items.id AND t.tag = ?)",
            vec![raw],
        ),
        (Field::Tag, Operator::Contains) => Fragment::new(
            "EXISTS (SELECT 1 FROM tags t WHERE t.item_id = items.id AND instr(t.tag_folded, ?) > 0)",
            vec![folded],
        ),
        (Field::Note, _) => Fragment::new("instr(items.note_folded, ?) > 0", vec![folded]),
        (Field::CitationKey, Operator::Is) => {
            Fragment::new("items.citation_key = ?", vec![raw])
        }
        (Field::CitationKey, Operator::Contains) => {
            Fragment::new("instr(items.citation_key, ?) > 0", vec![raw])
        }
        (Field::QuickSearch(mode), _) => {
            let mut parts = vec![
                Fragment::new("instr(items.title_folded, ?) > 0", vec![folded.clone()]),
                Fragment::new(CREATOR_CONTAINS, vec![folded.clone()]),
                Fragment::new("instr(items.year, ?) > 0", vec![folded.clone()]),
            ];
            if matches!(mode, QuickSearchMode::Fields | QuickSearchMode::Everything) {
                parts.push(Fragment::new(
                    "instr(items.fields_folded, ?) > 0",
                    vec![folded.clone()],
                ));
            }
            if mode == QuickSearchMode::Everything {
                parts.push(Fragment::new("instr(items.note_folded, ?) > 0", vec![folded]));
            }
            Fragment::or(parts)
        }
    }
}

/// `SELECT id FROM items WHERE ...` for a query, with its bind values.
fn search_sql(query: &SearchQuery) -> (String, Vec<String>) {
    let fragments: Vec<Fragment> = query.conditions.iter().map(condition_sql).collect();
    let joined = if fragments.is_empty() {
        match query.join {
            JoinMode::All => "1".to_string(),
            JoinMode::Any => "0".to_string(),
        }
    } else {
        let separator = match query.join {
            JoinMode::All => " AND ",
            JoinMode::Any => " OR ",
        };
        fragments
            .iter()
            .map(|f| f.sql.as_str())
            .collect::<Vec<_>>()
            .join(separator)
    };
    let mut binds: Vec<String> = fragments.into_iter().flat_map(|f| f.binds).collect();

    let mut sql = format!("SELECT items.id FROM items WHERE ({})", joined);
    if let Some(library_id) = query.library_id {
        sql.push_str(" AND items.library_id = ?");
        binds.push(library_id.to_string());
    }
    sql.push_str(" ORDER BY items.id");
    (sql, binds)
}

/// Reference library stored in SQLite.
pub struct SqliteHost {
    pool: SqlitePool,
    user_library_id: i64,
    citation_keys: bool,
    styles: Vec<StyleInfo>,
    locales: Vec<String>,
}

impl SqliteHost {
    /// Connects to the configured database and makes sure the schema exists.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool, config.library.user_library_id).await?;
        Ok(Self::new(pool, config))
    }

    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        let styles = config
            .citation
            .styles
            .iter()
            .map(|name| StyleInfo {
                id: normalize_style_id(Some(name), name),
                title: name.clone(),
            })
            .collect();
        Self {
            pool,
            user_library_id: config.library.user_library_id,
            citation_keys: config.library.citation_keys,
            styles,
            locales: config.citation.locales.clone(),
        }
    }

    async fn items_where(&self, clause: &str, binds: &[i64]) -> Result<Vec<Item>> {
        let sql = format!("SELECT {} FROM items {}", ITEM_COLUMNS, clause);
        let mut query = sqlx::query(&sql);
        for bind in binds {
            query = query.bind(*bind);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("Failed to load items")?;
        Ok(rows.iter().map(row_to_item).collect())
    }

    async fn stored_csl(&self, item: &Item) -> Result<Value> {
        let raw: String = sqlx::query_scalar("SELECT csl_json FROM items WHERE id = ?")
            .bind(item.id)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to load CSL for item {}", item.library_key()))?;
        let csl = serde_json::from_str(&raw)
            .with_context(|| format!("Stored CSL for item {} is invalid", item.library_key()))?;
        Ok(csl)
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
impl Host for SqliteHost {
    fn version(&self) -> String {
        format!("citebridge-sqlite {}", env!("CARGO_PKG_VERSION"))
    }

    fn user_library_id(&self) -> i64 {
        self.user_library_id
    }

    fn supports_citation_keys(&self) -> bool {
        self.citation_keys
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ItemId>> {
        let (sql, binds) = search_sql(query);
        debug!(sql = %sql, binds = ?binds, "library search");
        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }
        let ids = q.fetch_all(&self.pool).await.context("Library search failed")?;
        Ok(ids)
    }

    async fn item(&self, id: ItemId) -> Result<Option<Item>> {
        Ok(self
            .items_where("WHERE items.id = ?", &[id])
            .await?
            .into_iter()
            .next())
    }

    async fn item_by_key(&self, library_id: i64, key: &str) -> Result<Option<Item>> {
        let sql = format!(
            "SELECT {} FROM items WHERE items.library_id = ? AND items.key = ?",
            ITEM_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(library_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up item by key")?;
        Ok(row.as_ref().map(row_to_item))
    }

    async fn all_items(&self, library_id: i64) -> Result<Vec<Item>> {
        self.items_where(
            "WHERE items.library_id = ? AND items.kind = 'regular' ORDER BY items.id",
            &[library_id],
        )
        .await
    }

    async fn collection_items(&self, name: &str) -> Result<Vec<Item>> {
        let collection_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM collections WHERE name = ? ORDER BY id LIMIT 1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to look up collection")?;
        let Some(collection_id) = collection_id else {
            return Ok(Vec::new());
        };
        self.items_where(
            "JOIN collection_items ci ON ci.item_id = items.id \
             WHERE ci.collection_id = ? ORDER BY items.id",
            &[collection_id],
        )
        .await
    }

    async fn selected_items(&self) -> Result<Vec<Item>> {
        self.items_where(
            "JOIN selection s ON s.item_id = items.id ORDER BY s.position",
            &[],
        )
        .await
    }

    async fn select_item(&self, item: &Item) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        sqlx::query("DELETE FROM selection")
            .execute(&mut *tx)
            .await
            .context("Failed to clear selection")?;
        sqlx::query("INSERT INTO selection (position, item_id) VALUES (0, ?)")
            .bind(item.id)
            .execute(&mut *tx)
            .await
            .context("Failed to record selection")?;
        tx.commit().await.context("Failed to commit selection")?;
        Ok(())
    }

    async fn summary(&self, item: &Item) -> Result<ItemSummary> {
        let row = sqlx::query("SELECT title, date FROM items WHERE id = ?")
            .bind(item.id)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to load item {}", item.library_key()))?;
        let creators = sqlx::query(
            "SELECT last_name, first_name FROM creators WHERE item_id = ? ORDER BY position",
        )
        .bind(item.id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load creators")?
        .iter()
        .map(|r| Creator::new(r.get::<String, _>("last_name"), r.get::<String, _>("first_name")))
        .collect();
        Ok(ItemSummary {
            creators,
            title: row.get("title"),
            date: row.get("date"),
        })
    }

    async fn citation_key(&self, item: &Item) -> Result<Option<String>> {
        let citekey: Option<String> =
            sqlx::query_scalar("SELECT citation_key FROM items WHERE id = ?")
                .bind(item.id)
                .fetch_one(&self.pool)
                .await
                .context("Failed to load citation key")?;
        Ok(citekey)
    }

    async fn csl_json(&self, items: &[Item]) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let summary = self.summary(item).await?;
            let citekey = self.citation_key(item).await?;
            let csl = self.stored_csl(item).await?;
            out.push(plain::csl_item(item, &summary, citekey.as_deref(), &csl));
        }
        Ok(out)
    }

    async fn attachment_paths(&self, item: &Item) -> Result<Vec<String>> {
        let paths: Vec<String> = sqlx::query_scalar(
            "SELECT path FROM items WHERE library_id = ? AND parent_key = ? \
             AND kind = 'attachment' AND path IS NOT NULL ORDER BY id",
        )
        .bind(item.library_id)
        .bind(&item.key)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load attachments")?;
        Ok(paths)
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
            entries.push(plain::bibliography_entry(&self.summary(item).await?));
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
                let summary = self.summary(&cite.item).await?;
                cluster.push((cite.item.id, summary, cite.options.clone()));
            }
            cites.push(cluster);
        }
        Ok(plain::render_document(cites))
    }

    async fn export(&self, items: &[Item], translator_id: &str) -> Result<String> {
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            records.push((self.summary(item).await?, self.stored_csl(item).await?));
        }
        plain::export(&records, translator_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citebridge_core::key::parse_key;

    #[test]
    fn test_parsed_key_sql() {
        let parsed = parse_key("roe_doe:2015hyphens").unwrap();
        let (sql, binds) = search_sql(&SearchQuery::for_parsed_key(&parsed));
        assert_eq!(sql.matches("c.name_folded").count(), 2);
        assert!(sql.contains(" AND items.year = ?"));
        assert_eq!(binds, vec!["roe", "doe", "hyphens", "2015"]);
    }

    #[test]
    fn test_pinned_key_sql_uses_or() {
        let (sql, binds) = search_sql(&SearchQuery::pinned_key("DoeBook2005"));
        assert!(sql.contains(" OR instr(items.note_folded, ?) > 0"));
        assert_eq!(binds, vec!["@DoeBook2005", "@doebook2005"]);
    }

    #[test]
    fn test_library_filter_bind_comes_last() {
        let (sql, binds) = search_sql(&SearchQuery::citation_key("DoeArticle2006", 3));
        assert!(sql.ends_with("AND items.library_id = ? ORDER BY items.id"));
        assert_eq!(binds, vec!["DoeArticle2006", "3"]);
    }

    #[test]
    fn test_quick_search_fields_mode() {
        let (sql, binds) = search_sql(&SearchQuery::quick("Doe", QuickSearchMode::Fields));
        assert!(sql.contains("fields_folded"));
        assert!(!sql.contains("note_folded"));
        assert_eq!(binds.len(), 4);
        assert!(binds.iter().all(|b| b == "doe"));
    }

    #[test]
    fn test_empty_any_matches_nothing() {
        let (sql, _) = search_sql(&SearchQuery::new(JoinMode::Any));
        assert!(sql.contains("WHERE (0)"));
    }
}
