//! Resource tree repository.
//!
//! # Invariants
//! - A resource's parent must exist and be a container (pool or item).
//! - Paths are unique; creating an existing path is a validation error.
//! - Item lookup walks the explicit parent chain, nearest ancestor first.

use crate::db::ensure_table;
use crate::error::{CoreError, CoreResult};
use crate::model::resource::{Resource, ResourceKind, ResourcePath};
use rusqlite::{params, Connection, OptionalExtension, Row};

const RESOURCE_SELECT_SQL: &str = "SELECT
    path,
    kind,
    content_type,
    creator,
    created_at,
    modified_at
FROM resources";

/// Enclosing item of a version, as found by [`ResourceRepository::find_item`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub path: ResourcePath,
    pub content_type: String,
}

/// Input for creating one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResource<'a> {
    pub parent: &'a ResourcePath,
    pub name: &'a str,
    pub kind: ResourceKind,
    pub content_type: &'a str,
    pub creator: Option<&'a str>,
}

/// Repository interface for the resource tree.
pub trait ResourceRepository {
    fn create_resource(&self, new: &NewResource<'_>) -> CoreResult<Resource>;
    fn get_resource(&self, path: &ResourcePath) -> CoreResult<Option<Resource>>;
    fn list_children(&self, parent: &ResourcePath) -> CoreResult<Vec<Resource>>;
    fn count_children(&self, parent: &ResourcePath, kind: ResourceKind) -> CoreResult<u32>;
    /// Bumps `modified_at` of an existing resource.
    fn touch(&self, path: &ResourcePath) -> CoreResult<()>;

    fn require_resource(&self, path: &ResourcePath) -> CoreResult<Resource> {
        self.get_resource(path)?
            .ok_or_else(|| CoreError::not_found("resource", path))
    }

    /// Nearest item in the parent chain of `path`, `None` when detached.
    fn find_item(&self, path: &ResourcePath) -> CoreResult<Option<Item>> {
        for ancestor in path.ancestors() {
            let Some(resource) = self.get_resource(&ancestor)? else {
                continue;
            };
            if resource.kind == ResourceKind::Item {
                return Ok(Some(Item {
                    path: resource.path,
                    content_type: resource.content_type,
                }));
            }
        }
        Ok(None)
    }
}

/// SQLite-backed resource repository.
pub struct SqliteResourceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteResourceRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> CoreResult<Self> {
        ensure_table(conn, "resources")?;
        Ok(Self { conn })
    }
}

impl ResourceRepository for SqliteResourceRepository<'_> {
    fn create_resource(&self, new: &NewResource<'_>) -> CoreResult<Resource> {
        let parent = self
            .get_resource(new.parent)?
            .ok_or_else(|| CoreError::not_found("parent resource", new.parent))?;
        if !parent.kind.is_container() {
            return Err(CoreError::validation(
                "parent",
                format!("{} cannot contain child resources", parent.path),
            ));
        }
        if new.content_type.trim().is_empty() {
            return Err(CoreError::validation(
                "content_type",
                "content type cannot be empty",
            ));
        }

        let path = new.parent.child(new.name)?;
        if self.get_resource(&path)?.is_some() {
            return Err(CoreError::validation(
                "name",
                format!("{path} already exists"),
            ));
        }

        self.conn.execute(
            "INSERT INTO resources (
                path,
                parent_path,
                name,
                kind,
                content_type,
                creator
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                path.as_str(),
                new.parent.as_str(),
                new.name,
                new.kind.as_db_str(),
                new.content_type,
                new.creator,
            ],
        )?;

        self.require_resource(&path)
    }

    fn get_resource(&self, path: &ResourcePath) -> CoreResult<Option<Resource>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("{RESOURCE_SELECT_SQL} WHERE path = ?1;"))?;
        let row = stmt
            .query_row([path.as_str()], |row| Ok(parse_resource_row(row)))
            .optional()?;
        row.transpose()
    }

    fn list_children(&self, parent: &ResourcePath) -> CoreResult<Vec<Resource>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "{RESOURCE_SELECT_SQL} WHERE parent_path = ?1 ORDER BY name ASC;"
        ))?;
        let mut rows = stmt.query([parent.as_str()])?;
        let mut children = Vec::new();
        while let Some(row) = rows.next()? {
            children.push(parse_resource_row(row)?);
        }
        Ok(children)
    }

    fn count_children(&self, parent: &ResourcePath, kind: ResourceKind) -> CoreResult<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM resources WHERE parent_path = ?1 AND kind = ?2;",
            params![parent.as_str(), kind.as_db_str()],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count)
    }

    fn touch(&self, path: &ResourcePath) -> CoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE resources
             SET modified_at = (strftime('%s', 'now') * 1000)
             WHERE path = ?1;",
            [path.as_str()],
        )?;
        if changed == 0 {
            return Err(CoreError::not_found("resource", path));
        }
        Ok(())
    }
}

fn parse_resource_row(row: &Row<'_>) -> CoreResult<Resource> {
    let path_text: String = row.get("path")?;
    let path = ResourcePath::parse(&path_text).map_err(|_| {
        CoreError::InvalidData(format!("invalid path `{path_text}` in resources.path"))
    })?;

    let kind_text: String = row.get("kind")?;
    let kind = ResourceKind::from_db_str(&kind_text).ok_or_else(|| {
        CoreError::InvalidData(format!("invalid kind `{kind_text}` in resources.kind"))
    })?;

    Ok(Resource {
        path,
        kind,
        content_type: row.get("content_type")?,
        creator: row.get("creator")?,
        created_at: row.get("created_at")?,
        modified_at: row.get("modified_at")?,
    })
}
