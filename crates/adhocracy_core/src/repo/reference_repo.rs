//! Reference graph over `sheet_references`.
//!
//! # Responsibility
//! - Write forward edges declared by reference-holding sheet fields.
//! - Answer "who points at X" through the target index.
//!
//! # Invariants
//! - Back references come back in insertion order (`id ASC`).
//! - One field never holds the same target twice.
//! - A field can only be written when the registry declares it; its
//!   reference type is taken from that declaration.

use crate::db::ensure_table;
use crate::error::{CoreError, CoreResult};
use crate::model::reference::Reference;
use crate::model::resource::ResourcePath;
use crate::registry::ContentRegistry;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

/// Reference graph contract.
pub trait ReferenceGraph {
    /// Replaces the targets of `source.sheet.field`, keeping the given order.
    fn set_references(
        &self,
        source: &ResourcePath,
        sheet: &str,
        field: &str,
        targets: &[ResourcePath],
    ) -> CoreResult<()>;

    /// Appends one edge; no-op when the edge already exists.
    fn add_reference(&self, reference: &Reference) -> CoreResult<()>;

    /// Targets of `source.sheet.field` in field order.
    fn get_references(
        &self,
        source: &ResourcePath,
        sheet: &str,
        field: &str,
    ) -> CoreResult<Vec<ResourcePath>>;

    /// All `(sheet, field)` pairs written on `source`, with their targets.
    fn get_sheet_references(
        &self,
        source: &ResourcePath,
    ) -> CoreResult<Vec<(String, String, Vec<ResourcePath>)>>;

    /// Edges targeting `node` whose reference type is-or-extends `base_type`.
    fn get_back_references(
        &self,
        node: &ResourcePath,
        base_type: &str,
    ) -> CoreResult<Vec<Reference>>;

    /// Rewrites `source.sheet.field: old -> new` in place, keeping position.
    ///
    /// Returns the number of rewritten edges (0 or 1).
    fn replace_target(
        &self,
        source: &ResourcePath,
        sheet: &str,
        field: &str,
        old: &ResourcePath,
        new: &ResourcePath,
    ) -> CoreResult<usize>;
}

/// SQLite-backed reference graph.
pub struct SqliteReferenceGraph<'conn> {
    conn: &'conn Connection,
    registry: &'conn ContentRegistry,
}

impl<'conn> SqliteReferenceGraph<'conn> {
    pub fn try_new(conn: &'conn Connection, registry: &'conn ContentRegistry) -> CoreResult<Self> {
        ensure_table(conn, "sheet_references")?;
        Ok(Self { conn, registry })
    }

    fn reftype_of(&self, sheet: &str, field: &str) -> CoreResult<&'conn str> {
        let registry: &'conn ContentRegistry = self.registry;
        registry
            .reference_field(sheet, field)
            .map(|declared| declared.reftype.as_str())
            .ok_or_else(|| {
                CoreError::validation(
                    field,
                    format!("`{sheet}.{field}` is not a registered reference field"),
                )
            })
    }

    fn next_position(&self, source: &ResourcePath, sheet: &str, field: &str) -> CoreResult<i64> {
        let next = self.conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0)
             FROM sheet_references
             WHERE source_path = ?1 AND sheet = ?2 AND field = ?3;",
            params![source.as_str(), sheet, field],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(next)
    }
}

impl ReferenceGraph for SqliteReferenceGraph<'_> {
    fn set_references(
        &self,
        source: &ResourcePath,
        sheet: &str,
        field: &str,
        targets: &[ResourcePath],
    ) -> CoreResult<()> {
        let reftype = self.reftype_of(sheet, field)?;
        self.conn.execute(
            "DELETE FROM sheet_references
             WHERE source_path = ?1 AND sheet = ?2 AND field = ?3;",
            params![source.as_str(), sheet, field],
        )?;

        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO sheet_references (
                source_path,
                sheet,
                field,
                reftype,
                target_path,
                position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        )?;
        let mut written: Vec<&ResourcePath> = Vec::with_capacity(targets.len());
        for target in targets {
            if written.contains(&target) {
                continue;
            }
            stmt.execute(params![
                source.as_str(),
                sheet,
                field,
                reftype,
                target.as_str(),
                written.len() as i64,
            ])?;
            written.push(target);
        }
        Ok(())
    }

    fn add_reference(&self, reference: &Reference) -> CoreResult<()> {
        let reftype = self.reftype_of(&reference.sheet, &reference.field)?;
        let existing = self.get_references(&reference.source, &reference.sheet, &reference.field)?;
        if existing.contains(&reference.target) {
            return Ok(());
        }
        let position = self.next_position(&reference.source, &reference.sheet, &reference.field)?;
        self.conn.execute(
            "INSERT INTO sheet_references (
                source_path,
                sheet,
                field,
                reftype,
                target_path,
                position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                reference.source.as_str(),
                reference.sheet.as_str(),
                reference.field.as_str(),
                reftype,
                reference.target.as_str(),
                position,
            ],
        )?;
        Ok(())
    }

    fn get_references(
        &self,
        source: &ResourcePath,
        sheet: &str,
        field: &str,
    ) -> CoreResult<Vec<ResourcePath>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT target_path
             FROM sheet_references
             WHERE source_path = ?1 AND sheet = ?2 AND field = ?3
             ORDER BY position ASC, id ASC;",
        )?;
        let mut rows = stmt.query(params![source.as_str(), sheet, field])?;
        let mut targets = Vec::new();
        while let Some(row) = rows.next()? {
            targets.push(parse_path_column(row, "target_path")?);
        }
        Ok(targets)
    }

    fn get_sheet_references(
        &self,
        source: &ResourcePath,
    ) -> CoreResult<Vec<(String, String, Vec<ResourcePath>)>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT sheet, field, target_path
             FROM sheet_references
             WHERE source_path = ?1
             ORDER BY sheet ASC, field ASC, position ASC, id ASC;",
        )?;
        let mut rows = stmt.query([source.as_str()])?;
        let mut grouped: Vec<(String, String, Vec<ResourcePath>)> = Vec::new();
        while let Some(row) = rows.next()? {
            let sheet: String = row.get("sheet")?;
            let field: String = row.get("field")?;
            let target = parse_path_column(row, "target_path")?;
            match grouped.last_mut() {
                Some((last_sheet, last_field, targets))
                    if *last_sheet == sheet && *last_field == field =>
                {
                    targets.push(target);
                }
                _ => grouped.push((sheet, field, vec![target])),
            }
        }
        Ok(grouped)
    }

    fn get_back_references(
        &self,
        node: &ResourcePath,
        base_type: &str,
    ) -> CoreResult<Vec<Reference>> {
        let reftypes = self.registry.reference_types_extending(base_type);
        if reftypes.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; reftypes.len()].join(", ");
        let sql = format!(
            "SELECT source_path, sheet, field, target_path
             FROM sheet_references
             WHERE target_path = ? AND reftype IN ({placeholders})
             ORDER BY id ASC;"
        );
        let mut bind_values: Vec<Value> = Vec::with_capacity(reftypes.len() + 1);
        bind_values.push(Value::Text(node.as_str().to_string()));
        bind_values.extend(reftypes.iter().map(|name| Value::Text((*name).to_string())));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut references = Vec::new();
        while let Some(row) = rows.next()? {
            references.push(Reference {
                source: parse_path_column(row, "source_path")?,
                sheet: row.get("sheet")?,
                field: row.get("field")?,
                target: parse_path_column(row, "target_path")?,
            });
        }
        Ok(references)
    }

    fn replace_target(
        &self,
        source: &ResourcePath,
        sheet: &str,
        field: &str,
        old: &ResourcePath,
        new: &ResourcePath,
    ) -> CoreResult<usize> {
        let targets = self.get_references(source, sheet, field)?;
        if targets.contains(new) {
            // Target already present; dropping the old edge keeps the field duplicate-free.
            let removed = self.conn.execute(
                "DELETE FROM sheet_references
                 WHERE source_path = ?1 AND sheet = ?2 AND field = ?3 AND target_path = ?4;",
                params![source.as_str(), sheet, field, old.as_str()],
            )?;
            return Ok(removed);
        }
        let changed = self.conn.execute(
            "UPDATE sheet_references
             SET target_path = ?5
             WHERE source_path = ?1 AND sheet = ?2 AND field = ?3 AND target_path = ?4;",
            params![source.as_str(), sheet, field, old.as_str(), new.as_str()],
        )?;
        Ok(changed)
    }
}

fn parse_path_column(row: &Row<'_>, column: &str) -> CoreResult<ResourcePath> {
    let text: String = row.get(column)?;
    ResourcePath::parse(&text).map_err(|_| {
        CoreError::InvalidData(format!(
            "invalid path `{text}` in sheet_references.{column}"
        ))
    })
}
