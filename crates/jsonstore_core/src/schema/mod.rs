//! Collection schemas: declared search fields, their types, and how a new
//! declaration compares to the one already persisted.

mod extract;
mod manager;

pub(crate) use extract::{
    coerce, escape_text, index_value, scalar_text, sql_text, ARRAY_SEPARATOR,
};
pub(crate) use manager::{columns_match, SchemaManager};
pub(crate) use manager::{append_fields, create_collection, drop_collection, persist, KEYS_TABLE};

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type of a search field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Text.
    String,
    /// Whole number.
    Integer,
    /// Floating point number.
    Number,
    /// `true` or `false`, stored as 1 or 0.
    Boolean,
}

impl FieldType {
    /// SQL column type used for this field.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::String => "TEXT",
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Number => "REAL",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        })
    }
}

impl FromStr for FieldType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            other => Err(StoreError::invalid_schema(format!(
                "unsupported field type {other:?}"
            ))),
        }
    }
}

/// One declared search field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchField {
    /// Field name; dots address nested values (`address.city`).
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// An ordered set of search fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchFields(Vec<SearchField>);

impl SearchFields {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, keeping declaration order.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.0.push(SearchField {
            name: name.into(),
            field_type,
        });
        self
    }

    /// Parses `name:type` pairs separated by commas, e.g.
    /// `name:string,age:integer`.
    pub fn parse(text: &str) -> StoreResult<Self> {
        let mut fields = Self::new();
        for pair in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, ty) = pair.split_once(':').ok_or_else(|| {
                StoreError::invalid_schema(format!("expected name:type, got {pair:?}"))
            })?;
            fields = fields.with(name.trim(), ty.trim().parse()?);
        }
        Ok(fields)
    }

    /// Iterates over the fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &SearchField> {
        self.0.iter()
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SearchField> {
        self.0.iter().find(|f| f.name == name)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    fn tail(&self, from: usize) -> impl Iterator<Item = &SearchField> {
        self.0.iter().skip(from)
    }
}

impl FromIterator<(String, FieldType)> for SearchFields {
    fn from_iter<I: IntoIterator<Item = (String, FieldType)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, field_type)| SearchField { name, field_type })
                .collect(),
        )
    }
}

/// Options for [`provision`](crate::JsonStore::provision_with).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionOptions {
    /// Drop and recreate the collection when the new field set is
    /// incompatible with the persisted one.
    pub allow_destructive: bool,
}

/// What provisioning did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The collection was created.
    Created,
    /// The collection already had exactly this field set.
    Unchanged,
    /// New fields were appended and backfilled from existing documents.
    Extended {
        /// Names of the appended fields.
        added: Vec<String>,
    },
    /// The collection was dropped and recreated empty.
    Recreated {
        /// Why the old field set was incompatible.
        reason: String,
    },
}

impl ProvisionOutcome {
    /// Whether the collection was created during this call, either fresh or
    /// by recreation.
    #[must_use]
    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created | Self::Recreated { .. })
    }
}

/// Search fields and additional search fields of one collection.
///
/// Additional search fields are indexed like search fields but their values
/// come from the caller at store time, not from the document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Collection name.
    pub name: String,
    /// Fields indexed from document bodies.
    pub search_fields: SearchFields,
    /// Fields indexed from caller-supplied values.
    pub additional_fields: SearchFields,
}

/// How a requested schema relates to the persisted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SchemaChange {
    Identical,
    Append(Vec<SearchField>),
    Incompatible(String),
}

impl CollectionSchema {
    /// Creates a schema.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        search_fields: SearchFields,
        additional_fields: SearchFields,
    ) -> Self {
        Self {
            name: name.into(),
            search_fields,
            additional_fields,
        }
    }

    /// All indexed field names, search fields first.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.all_fields().map(|f| f.name.as_str()).collect()
    }

    /// Search fields followed by additional search fields.
    pub fn all_fields(&self) -> impl Iterator<Item = &SearchField> {
        self.search_fields.iter().chain(self.additional_fields.iter())
    }

    /// Type of an indexed field.
    #[must_use]
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.search_fields
            .get(name)
            .or_else(|| self.additional_fields.get(name))
            .map(|f| f.field_type)
    }

    /// Whether `name` is an additional search field.
    #[must_use]
    pub fn is_additional(&self, name: &str) -> bool {
        self.additional_fields.get(name).is_some()
    }

    /// Checks the collection name and every field name.
    pub fn validate(&self) -> StoreResult<()> {
        validate_collection_name(&self.name)?;
        if self.search_fields.is_empty() && self.additional_fields.is_empty() {
            return Err(StoreError::invalid_schema(format!(
                "collection {} declares no search fields",
                self.name
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for field in self.all_fields() {
            validate_field_name(&field.name)?;
            if !seen.insert(field.name.as_str()) {
                return Err(StoreError::invalid_schema(format!(
                    "field {:?} declared twice",
                    field.name
                )));
            }
        }
        Ok(())
    }

    /// Compares `requested` against this (persisted) schema.
    pub(crate) fn plan(&self, requested: &Self) -> SchemaChange {
        if self == requested {
            return SchemaChange::Identical;
        }
        if !requested.search_fields.starts_with(&self.search_fields) {
            return SchemaChange::Incompatible(format!(
                "search fields changed from [{}] to [{}]",
                describe(&self.search_fields),
                describe(&requested.search_fields)
            ));
        }
        if !requested.additional_fields.starts_with(&self.additional_fields) {
            return SchemaChange::Incompatible(format!(
                "additional search fields changed from [{}] to [{}]",
                describe(&self.additional_fields),
                describe(&requested.additional_fields)
            ));
        }
        let added = requested
            .search_fields
            .tail(self.search_fields.len())
            .chain(requested.additional_fields.tail(self.additional_fields.len()))
            .cloned()
            .collect();
        SchemaChange::Append(added)
    }
}

fn describe(fields: &SearchFields) -> String {
    fields
        .iter()
        .map(|f| format!("{}:{}", f.name, f.field_type))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Names starting with `_` are reserved for bookkeeping columns and tables.
pub(crate) fn validate_collection_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('_')
        && !name.to_ascii_lowercase().starts_with("sqlite_")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollectionName {
            name: name.to_string(),
        })
    }
}

fn validate_field_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.starts_with('_') {
        return Err(StoreError::invalid_schema(format!(
            "invalid field name {name:?}"
        )));
    }
    if name.split('.').any(str::is_empty) {
        return Err(StoreError::invalid_schema(format!(
            "field path {name:?} has an empty segment"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> CollectionSchema {
        CollectionSchema::new(
            "people",
            SearchFields::new()
                .with("name", FieldType::String)
                .with("age", FieldType::Integer),
            SearchFields::new(),
        )
    }

    #[test]
    fn parses_field_list() {
        let fields = SearchFields::parse("name:string, age:integer,active:Boolean").unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields.get("active").unwrap().field_type, FieldType::Boolean);
        assert_eq!(
            fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            ["name", "age", "active"]
        );
    }

    #[test]
    fn unsupported_type_is_invalid_schema() {
        assert!(matches!(
            SearchFields::parse("x:mixed"),
            Err(StoreError::InvalidSchema { .. })
        ));
        assert!(matches!(
            SearchFields::parse("nocolon"),
            Err(StoreError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn keys_list_search_then_additional() {
        let mut schema = people();
        schema.additional_fields = SearchFields::new().with("owner", FieldType::String);
        assert_eq!(schema.keys(), ["name", "age", "owner"]);
        assert!(schema.is_additional("owner"));
        assert_eq!(schema.field_type("age"), Some(FieldType::Integer));
        assert_eq!(schema.field_type("nope"), None);
    }

    #[test]
    fn validation_rejects_reserved_and_duplicate_names() {
        let mut schema = people();
        schema.search_fields = schema.search_fields.with("_json", FieldType::String);
        assert!(schema.validate().is_err());

        let mut schema = people();
        schema.additional_fields = SearchFields::new().with("name", FieldType::String);
        assert!(schema.validate().is_err());

        let mut schema = people();
        schema.search_fields = schema.search_fields.with("a..b", FieldType::String);
        assert!(schema.validate().is_err());

        assert!(people().validate().is_ok());
    }

    #[test]
    fn collection_names() {
        for bad in ["", "_private", "sqlite_master", "a b", "x;drop"] {
            assert!(
                matches!(
                    validate_collection_name(bad),
                    Err(StoreError::InvalidCollectionName { .. })
                ),
                "{bad:?}"
            );
        }
        assert!(validate_collection_name("orders-2024_v2").is_ok());
    }

    #[test]
    fn plan_identical_append_and_incompatible() {
        let current = people();
        assert_eq!(current.plan(&people()), SchemaChange::Identical);

        let mut wider = people();
        wider.search_fields = wider.search_fields.with("city", FieldType::String);
        wider.additional_fields = SearchFields::new().with("owner", FieldType::String);
        match current.plan(&wider) {
            SchemaChange::Append(added) => {
                let names: Vec<_> = added.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, ["city", "owner"]);
            }
            other => panic!("expected append, got {other:?}"),
        }

        let mut retyped = people();
        retyped.search_fields = SearchFields::new()
            .with("name", FieldType::String)
            .with("age", FieldType::String);
        assert!(matches!(
            current.plan(&retyped),
            SchemaChange::Incompatible(_)
        ));

        let mut narrower = people();
        narrower.search_fields = SearchFields::new().with("name", FieldType::String);
        assert!(matches!(
            current.plan(&narrower),
            SchemaChange::Incompatible(_)
        ));
    }
}
