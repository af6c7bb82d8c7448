//! Content registry: reference types, reference fields and event handlers.
//!
//! # Responsibility
//! - Hold the reference-type hierarchy used to filter back references.
//! - Declare which sheet fields carry references and whether they follow
//!   new versions automatically.
//! - Map `(event kind, sheet)` to handlers in registration order.
//!
//! # Invariants
//! - The registry is built once by the hosting service and passed by
//!   reference into every unit of work; nothing here is global.
//! - Every reference type except the root has a registered base.

use crate::events::{ContentEvent, EventHandler, EventKind};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Root of the reference-type hierarchy.
pub const SHEET_REFERENCE: &str = "adhocracy_core.interfaces.SheetReference";
/// Generic sheet-to-sheet reference; base type of the version fan-out.
pub const SHEET_TO_SHEET: &str = "adhocracy_core.interfaces.SheetToSheet";
/// Successor-to-predecessor reference written by `follows`.
pub const NEW_VERSION_TO_OLD_VERSION: &str = "adhocracy_core.interfaces.NewVersionToOldVersion";

pub const VERSIONABLE_SHEET: &str = "adhocracy_core.sheets.versions.IVersionable";
pub const FOLLOWS_FIELD: &str = "follows";

/// Declaration of one reference-holding sheet field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceField {
    pub sheet: String,
    pub field: String,
    pub reftype: String,
    /// Whether the default policy moves this field to new target versions.
    pub autoupdate: bool,
}

impl ReferenceField {
    pub fn new(
        sheet: impl Into<String>,
        field: impl Into<String>,
        reftype: impl Into<String>,
        autoupdate: bool,
    ) -> Self {
        Self {
            sheet: sheet.into(),
            field: field.into(),
            reftype: reftype.into(),
            autoupdate,
        }
    }
}

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    UnknownReferenceType(String),
    DuplicateReferenceType(String),
    DuplicateField { sheet: String, field: String },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownReferenceType(name) => write!(f, "unknown reference type: {name}"),
            Self::DuplicateReferenceType(name) => {
                write!(f, "reference type already registered: {name}")
            }
            Self::DuplicateField { sheet, field } => {
                write!(f, "reference field already registered: {sheet}.{field}")
            }
        }
    }
}

impl Error for RegistryError {}

struct Subscription {
    kind: EventKind,
    sheet: Option<String>,
    name: String,
    handler: EventHandler,
}

/// Explicit registry object owned by the hosting service.
pub struct ContentRegistry {
    reference_types: BTreeMap<String, Option<String>>,
    reference_fields: BTreeMap<(String, String), ReferenceField>,
    subscriptions: Vec<Subscription>,
}

impl Debug for ContentRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentRegistry")
            .field("reference_types", &self.reference_types)
            .field("reference_fields", &self.reference_fields.len())
            .field(
                "subscriptions",
                &self
                    .subscriptions
                    .iter()
                    .map(|subscription| subscription.name.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for ContentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentRegistry {
    /// Registry with the built-in reference types and the `follows` field,
    /// but without any handler.
    pub fn new() -> Self {
        let mut reference_types = BTreeMap::new();
        reference_types.insert(SHEET_REFERENCE.to_string(), None);
        reference_types.insert(
            SHEET_TO_SHEET.to_string(),
            Some(SHEET_REFERENCE.to_string()),
        );
        reference_types.insert(
            NEW_VERSION_TO_OLD_VERSION.to_string(),
            Some(SHEET_REFERENCE.to_string()),
        );

        let follows = ReferenceField::new(
            VERSIONABLE_SHEET,
            FOLLOWS_FIELD,
            NEW_VERSION_TO_OLD_VERSION,
            false,
        );
        let mut reference_fields = BTreeMap::new();
        reference_fields.insert(
            (follows.sheet.clone(), follows.field.clone()),
            follows,
        );

        Self {
            reference_types,
            reference_fields,
            subscriptions: Vec::new(),
        }
    }

    /// Registers a reference type extending `base`.
    pub fn register_reference_type(
        &mut self,
        name: &str,
        base: &str,
    ) -> Result<(), RegistryError> {
        if self.reference_types.contains_key(name) {
            return Err(RegistryError::DuplicateReferenceType(name.to_string()));
        }
        if !self.reference_types.contains_key(base) {
            return Err(RegistryError::UnknownReferenceType(base.to_string()));
        }
        self.reference_types
            .insert(name.to_string(), Some(base.to_string()));
        Ok(())
    }

    /// Whether `name` equals `base` or transitively extends it.
    pub fn is_or_extends(&self, name: &str, base: &str) -> bool {
        let mut current = Some(name);
        while let Some(reftype) = current {
            if reftype == base {
                return true;
            }
            current = self
                .reference_types
                .get(reftype)
                .and_then(|parent| parent.as_deref());
        }
        false
    }

    /// All registered types that are-or-extend `base`, sorted by name.
    pub fn reference_types_extending(&self, base: &str) -> Vec<&str> {
        self.reference_types
            .keys()
            .map(String::as_str)
            .filter(|name| self.is_or_extends(name, base))
            .collect()
    }

    pub fn register_reference_field(&mut self, field: ReferenceField) -> Result<(), RegistryError> {
        if !self.reference_types.contains_key(field.reftype.as_str()) {
            return Err(RegistryError::UnknownReferenceType(field.reftype));
        }
        let key = (field.sheet.clone(), field.field.clone());
        if self.reference_fields.contains_key(&key) {
            return Err(RegistryError::DuplicateField {
                sheet: field.sheet,
                field: field.field,
            });
        }
        self.reference_fields.insert(key, field);
        Ok(())
    }

    pub fn reference_field(&self, sheet: &str, field: &str) -> Option<&ReferenceField> {
        self.reference_fields
            .get(&(sheet.to_string(), field.to_string()))
    }

    /// Fields declared on `sheet`, sorted by field name.
    pub fn reference_fields_of<'a>(
        &'a self,
        sheet: &'a str,
    ) -> impl Iterator<Item = &'a ReferenceField> + 'a {
        self.reference_fields
            .values()
            .filter(move |declared| declared.sheet == sheet)
    }

    /// Subscribes `handler` to `kind`; `sheet = None` matches every sheet.
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        sheet: Option<&str>,
        name: impl Into<String>,
        handler: EventHandler,
    ) {
        self.subscriptions.push(Subscription {
            kind,
            sheet: sheet.map(str::to_string),
            name: name.into(),
            handler,
        });
    }

    /// Handlers matching `event`, in registration order.
    pub fn handlers_for(&self, event: &ContentEvent) -> Vec<(String, EventHandler)> {
        let kind = event.kind();
        let sheet = event.sheet();
        self.subscriptions
            .iter()
            .filter(|subscription| subscription.kind == kind)
            .filter(|subscription| {
                subscription
                    .sheet
                    .as_deref()
                    .map_or(true, |filter| filter == sheet)
            })
            .map(|subscription| (subscription.name.clone(), subscription.handler.clone()))
            .collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}
