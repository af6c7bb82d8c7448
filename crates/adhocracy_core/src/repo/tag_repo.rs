//! Per-item tag registry.
//!
//! # Invariants
//! - Only items own a tag namespace; tagging anything else is `NotFound`.
//! - `(item, name)` binds to exactly one version; rebinding is idempotent.

use crate::db::ensure_table;
use crate::error::{CoreError, CoreResult};
use crate::model::resource::ResourcePath;
use rusqlite::{params, Connection, OptionalExtension};

/// Tag pointing at the most recent version of an item.
pub const LAST_TAG: &str = "LAST";

/// Tag registry contract.
pub trait TagRegistry {
    fn set_tag(&self, item: &ResourcePath, name: &str, version: &ResourcePath) -> CoreResult<()>;
    fn get_tag(&self, item: &ResourcePath, name: &str) -> CoreResult<Option<ResourcePath>>;
    /// All tags of `item` sorted by name.
    fn list_tags(&self, item: &ResourcePath) -> CoreResult<Vec<(String, ResourcePath)>>;
}

/// SQLite-backed tag registry.
pub struct SqliteTagRegistry<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTagRegistry<'conn> {
    pub fn try_new(conn: &'conn Connection) -> CoreResult<Self> {
        ensure_table(conn, "item_tags")?;
        Ok(Self { conn })
    }

    fn has_tag_namespace(&self, item: &ResourcePath) -> CoreResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM resources WHERE path = ?1 AND kind = 'item');",
            [item.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

impl TagRegistry for SqliteTagRegistry<'_> {
    fn set_tag(&self, item: &ResourcePath, name: &str, version: &ResourcePath) -> CoreResult<()> {
        if !self.has_tag_namespace(item)? {
            return Err(CoreError::not_found("tag namespace", item));
        }
        if name.trim().is_empty() {
            return Err(CoreError::validation("tag", "tag name cannot be empty"));
        }
        self.conn.execute(
            "INSERT INTO item_tags (item_path, name, version_path)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(item_path, name) DO UPDATE SET version_path = excluded.version_path;",
            params![item.as_str(), name, version.as_str()],
        )?;
        Ok(())
    }

    fn get_tag(&self, item: &ResourcePath, name: &str) -> CoreResult<Option<ResourcePath>> {
        let text: Option<String> = self
            .conn
            .query_row(
                "SELECT version_path FROM item_tags WHERE item_path = ?1 AND name = ?2;",
                params![item.as_str(), name],
                |row| row.get(0),
            )
            .optional()?;
        text.map(|value| parse_version_path(&value)).transpose()
    }

    fn list_tags(&self, item: &ResourcePath) -> CoreResult<Vec<(String, ResourcePath)>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT name, version_path FROM item_tags WHERE item_path = ?1 ORDER BY name ASC;",
        )?;
        let mut rows = stmt.query([item.as_str()])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let version: String = row.get(1)?;
            tags.push((name, parse_version_path(&version)?));
        }
        Ok(tags)
    }
}

fn parse_version_path(value: &str) -> CoreResult<ResourcePath> {
    ResourcePath::parse(value).map_err(|_| {
        CoreError::InvalidData(format!("invalid path `{value}` in item_tags.version_path"))
    })
}
