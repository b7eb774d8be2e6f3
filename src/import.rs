//! CSL-JSON import.
//!
//! Loads a CSL-JSON array into a library. Besides the standard CSL fields,
//! each entry may carry three extras that are stripped from the stored CSL:
//!
//! - `tags`: tag strings, e.g. `"@DoeBook2005"` to pin a citation key
//! - `notes`: child note texts
//! - `attachments`: file paths, stored as child attachment items
//!
//! Creators come from `author`, then `editor`. Dates come from
//! `issued.date-parts`, falling back to `issued.raw` and `issued.literal`.

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use uuid::Uuid;

use citebridge_core::host::{Creator, ItemKind};
use citebridge_core::keygen::determine_year;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_host::{fold, kind_name};

/// Characters allowed in item keys.
const KEY_ALPHABET: &[u8] = b"23456789ABCDEFGHIJKLMNPQRSTUVWXYZ";
const EXTRA_FIELDS: &[&str] = &["tags", "notes", "attachments"];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub items: usize,
    pub notes: usize,
    pub attachments: usize,
}

/// An 8-character item key derived from a random v4 UUID.
pub fn new_item_key() -> String {
    Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(8)
        .map(|b| KEY_ALPHABET[*b as usize % KEY_ALPHABET.len()] as char)
        .collect()
}

fn creators(entry: &Map<String, Value>) -> Vec<Creator> {
    ["author", "editor"]
        .iter()
        .filter_map(|field| entry.get(*field).and_then(Value::as_array))
        .flatten()
        .filter_map(|name| {
            let str_field = |f: &str| name.get(f).and_then(Value::as_str).unwrap_or("");
            let last = match str_field("family") {
                "" => str_field("literal"),
                family => family,
            };
            if last.is_empty() {
                None
            } else {
                Some(Creator::new(last, str_field("given")))
            }
        })
        .collect()
}

/// `YYYY[-MM[-DD]]` from `issued`.
fn issued_date(entry: &Map<String, Value>) -> Option<String> {
    let issued = entry.get("issued")?;
    if let Some(parts) = issued
        .get("date-parts")
        .and_then(|p| p.get(0))
        .and_then(Value::as_array)
    {
        let parts: Vec<String> = parts
            .iter()
            .filter_map(|p| match p {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .enumerate()
            .map(|(i, n)| if i == 0 { format!("{:04}", n) } else { format!("{:02}", n) })
            .collect();
        if !parts.is_empty() {
            return Some(parts.join("-"));
        }
    }
    ["raw", "literal"]
        .iter()
        .find_map(|f| issued.get(*f).and_then(Value::as_str))
        .map(str::to_string)
}

fn string_list(entry: &Map<String, Value>, field: &str) -> Vec<String> {
    entry
        .get(field)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Every string leaf of a CSL value, space-joined and folded.
fn folded_fields(value: &Value) -> String {
    fn collect<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
        match value {
            Value::String(s) => out.push(s),
            Value::Array(values) => values.iter().for_each(|v| collect(v, out)),
            Value::Object(map) => map.values().for_each(|v| collect(v, out)),
            _ => {}
        }
    }
    let mut out = Vec::new();
    collect(value, &mut out);
    fold(&out.join(" "))
}

struct NewRow<'a> {
    library_id: i64,
    kind: ItemKind,
    parent_key: Option<&'a str>,
    title: Option<&'a str>,
    date: Option<&'a str>,
    citation_key: Option<&'a str>,
    note: Option<&'a str>,
    path: Option<&'a str>,
    csl: Option<&'a Value>,
}

impl<'a> NewRow<'a> {
    fn child(library_id: i64, kind: ItemKind, parent_key: &'a str) -> Self {
        Self {
            library_id,
            kind,
            parent_key: Some(parent_key),
            title: None,
            date: None,
            citation_key: None,
            note: None,
            path: None,
            csl: None,
        }
    }
}

/// Attempts at drawing an item key not yet used in the library.
const KEY_ATTEMPTS: usize = 16;

/// Draws keys from `generate` until one is free in `library_id`.
async fn unused_item_key(
    tx: &mut Transaction<'_, Sqlite>,
    library_id: i64,
    mut generate: impl FnMut() -> String,
) -> Result<String> {
    for _ in 0..KEY_ATTEMPTS {
        let key = generate();
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM items WHERE library_id = ? AND key = ?)")
                .bind(library_id)
                .bind(&key)
                .fetch_one(&mut **tx)
                .await?;
        if !taken {
            return Ok(key);
        }
    }
    bail!(
        "no free item key in library {} after {} attempts",
        library_id,
        KEY_ATTEMPTS
    )
}

async fn insert_item(tx: &mut Transaction<'_, Sqlite>, row: NewRow<'_>) -> Result<(i64, String)> {
    let key = unused_item_key(tx, row.library_id, new_item_key).await?;
    let csl = row.csl.cloned().unwrap_or_else(|| Value::Object(Map::new()));
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO items (library_id, key, kind, parent_key, title, title_folded, date, year,
                           citation_key, note, note_folded, path, csl_json, fields_folded, date_added)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(row.library_id)
    .bind(&key)
    .bind(kind_name(row.kind))
    .bind(row.parent_key)
    .bind(row.title)
    .bind(fold(row.title.unwrap_or("")))
    .bind(row.date)
    .bind(determine_year(row.date))
    .bind(row.citation_key)
    .bind(row.note)
    .bind(fold(row.note.unwrap_or("")))
    .bind(row.path)
    .bind(csl.to_string())
    .bind(folded_fields(&csl))
    .bind(chrono::Utc::now().timestamp())
    .fetch_one(&mut **tx)
    .await?;
    Ok((id, key))
}

async fn ensure_library(tx: &mut Transaction<'_, Sqlite>, library_id: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO libraries (id, name) VALUES (?, ?)")
        .bind(library_id)
        .bind(format!("Library {}", library_id))
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn ensure_collection(
    tx: &mut Transaction<'_, Sqlite>,
    library_id: i64,
    name: &str,
) -> Result<i64> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM collections WHERE library_id = ? AND name = ?")
            .bind(library_id)
            .bind(name)
            .fetch_optional(&mut **tx)
            .await?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let id = sqlx::query_scalar("INSERT INTO collections (library_id, name) VALUES (?, ?) RETURNING id")
        .bind(library_id)
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;
    Ok(id)
}

/// Imports the CSL-JSON array at `path` into `library_id` (the personal
/// library when `None`), optionally adding every item to `collection`.
pub async fn import_csl_json(
    config: &Config,
    path: &Path,
    library_id: Option<i64>,
    collection: Option<&str>,
) -> Result<ImportSummary> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    let entries: Vec<Value> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a CSL-JSON array", path.display()))?;

    let library_id = library_id.unwrap_or(config.library.user_library_id);
    if library_id < 1 {
        bail!("library id must be >= 1");
    }

    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool, config.library.user_library_id).await?;

    let mut tx = pool.begin().await?;
    ensure_library(&mut tx, library_id).await?;
    let collection_id = match collection {
        Some(name) => Some(ensure_collection(&mut tx, library_id, name).await?),
        None => None,
    };

    let mut summary = ImportSummary::default();
    for (index, entry) in entries.iter().enumerate() {
        let Some(fields) = entry.as_object() else {
            bail!("entry {} is not a JSON object", index);
        };

        let mut csl = fields.clone();
        for extra in EXTRA_FIELDS {
            csl.remove(*extra);
        }
        let csl = Value::Object(csl);
        let date = issued_date(fields);

        let (item_id, item_key) = insert_item(
            &mut tx,
            NewRow {
                library_id,
                kind: ItemKind::Regular,
                parent_key: None,
                title: fields.get("title").and_then(Value::as_str),
                date: date.as_deref(),
                citation_key: fields.get("citation-key").and_then(Value::as_str),
                note: fields.get("note").and_then(Value::as_str),
                path: None,
                csl: Some(&csl),
            },
        )
        .await
        .with_context(|| format!("Failed to import entry {}", index))?;

        for (position, creator) in creators(fields).iter().enumerate() {
            let full_name = format!("{} {}", creator.first_name, creator.last_name);
            sqlx::query(
                "INSERT INTO creators (item_id, position, last_name, first_name, name_folded) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(item_id)
            .bind(position as i64)
            .bind(&creator.last_name)
            .bind(&creator.first_name)
            .bind(fold(full_name.trim()))
            .execute(&mut *tx)
            .await?;
        }

        for tag in string_list(fields, "tags") {
            sqlx::query("INSERT OR IGNORE INTO tags (item_id, tag, tag_folded) VALUES (?, ?, ?)")
                .bind(item_id)
                .bind(&tag)
                .bind(fold(&tag))
                .execute(&mut *tx)
                .await?;
        }

        for note in string_list(fields, "notes") {
            let mut row = NewRow::child(library_id, ItemKind::Note, &item_key);
            row.note = Some(&note);
            insert_item(&mut tx, row).await?;
            summary.notes += 1;
        }

        for attachment in string_list(fields, "attachments") {
            let mut row = NewRow::child(library_id, ItemKind::Attachment, &item_key);
            row.path = Some(&attachment);
            insert_item(&mut tx, row).await?;
            summary.attachments += 1;
        }

        if let Some(collection_id) = collection_id {
            sqlx::query(
                "INSERT OR IGNORE INTO collection_items (collection_id, item_id) VALUES (?, ?)",
            )
            .bind(collection_id)
            .bind(item_id)
            .execute(&mut *tx)
            .await?;
        }

        summary.items += 1;
    }

    tx.commit().await?;
    pool.close().await;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_key_shape() {
        let key = new_item_key();
        assert_eq!(key.len(), 8);
        assert!(key.bytes().all(|b| KEY_ALPHABET.contains(&b)));
    }

    #[tokio::test]
    async fn test_item_key_collision_draws_again() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = Config::with_db_path(tmp.path().join("library.sqlite"));
        let pool = db::connect(&config).await.unwrap();
        migrate::apply_schema(&pool, 1).await.unwrap();
        let mut tx = pool.begin().await.unwrap();
        ensure_library(&mut tx, 1).await.unwrap();

        let (_, taken) = insert_item(
            &mut tx,
            NewRow::child(1, ItemKind::Attachment, "PARENT22"),
        )
        .await
        .unwrap();

        let mut draws = vec!["ZZZZZZZZ".to_string(), taken.clone()];
        let key = unused_item_key(&mut tx, 1, || draws.pop().unwrap())
            .await
            .unwrap();
        assert_eq!(key, "ZZZZZZZZ");

        // The same key is free in another library.
        let key = unused_item_key(&mut tx, 2, || taken.clone()).await.unwrap();
        assert_eq!(key, taken);

        let err = unused_item_key(&mut tx, 1, || taken.clone())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no free item key"));
    }

    #[test]
    fn test_creators_from_author_and_editor() {
        let entry = json!({
            "author": [{ "family": "Doe", "given": "John" }],
            "editor": [{ "literal": "World Health Organization" }, { "given": "Nobody" }]
        });
        let creators = creators(entry.as_object().unwrap());
        assert_eq!(
            creators,
            vec![
                Creator::new("Doe", "John"),
                Creator::new("World Health Organization", "")
            ]
        );
    }

    #[test]
    fn test_issued_date_variants() {
        let parts = json!({ "issued": { "date-parts": [[2006, 3, 1]] } });
        assert_eq!(issued_date(parts.as_object().unwrap()).as_deref(), Some("2006-03-01"));
        let year = json!({ "issued": { "date-parts": [["2005"]] } });
        assert_eq!(issued_date(year.as_object().unwrap()).as_deref(), Some("2005"));
        let raw = json!({ "issued": { "raw": "Spring 2012" } });
        assert_eq!(issued_date(raw.as_object().unwrap()).as_deref(), Some("Spring 2012"));
        assert_eq!(issued_date(json!({}).as_object().unwrap()), None);
    }

    #[test]
    fn test_folded_fields_collects_nested_strings() {
        let csl = json!({ "publisher": "Cambridge UP", "author": [{ "family": "Doe" }], "volume": 6 });
        let folded = folded_fields(&csl);
        assert!(folded.contains("cambridge up"));
        assert!(folded.contains("doe"));
    }
}
