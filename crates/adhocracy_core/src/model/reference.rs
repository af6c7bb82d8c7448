//! Reference edges between resources.

use crate::model::resource::ResourcePath;
use serde::{Deserialize, Serialize};

/// Directed, typed edge `source.sheet.field -> target`.
///
/// Forward edges are written by the sheet that holds the reference; back
/// edges are answered from the same rows through the target index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub source: ResourcePath,
    /// Dotted sheet identifier, e.g. `adhocracy_core.sheets.document.IDocument`.
    pub sheet: String,
    pub field: String,
    pub target: ResourcePath,
}

impl Reference {
    pub fn new(
        source: ResourcePath,
        sheet: impl Into<String>,
        field: impl Into<String>,
        target: ResourcePath,
    ) -> Self {
        Self {
            source,
            sheet: sheet.into(),
            field: field.into(),
            target,
        }
    }
}

/// Sheet field value list used when creating a resource or version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SheetReferences {
    pub sheet: String,
    pub field: String,
    pub targets: Vec<ResourcePath>,
}

impl SheetReferences {
    pub fn new(
        sheet: impl Into<String>,
        field: impl Into<String>,
        targets: Vec<ResourcePath>,
    ) -> Self {
        Self {
            sheet: sheet.into(),
            field: field.into(),
            targets,
        }
    }
}
