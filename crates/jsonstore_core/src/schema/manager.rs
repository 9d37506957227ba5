//! Schema catalog and collection DDL.
//!
//! Every provisioned collection has a row in the catalog table holding its
//! declared fields as JSON, so a reopened store knows its schemas without
//! the caller provisioning again.

use super::{CollectionSchema, SearchField, SearchFields};
use crate::error::{StoreError, StoreResult};
use jsonstore_storage::{quote_ident, SqlValue, SqliteDriver, Statement};
use std::collections::HashMap;
use tracing::debug;

/// Catalog of provisioned collections.
pub(crate) const SCHEMA_TABLE: &str = "_jsonstore_schema";
/// Password-wrapped data keys, one row per user.
pub(crate) const KEYS_TABLE: &str = "_jsonstore_keys";
/// Columns every collection table carries besides its search fields.
pub(crate) const BOOKKEEPING_COLUMNS: [&str; 5] = ["_id", "_json", "_dirty", "_deleted", "_operation"];

/// In-memory view of the catalog.
#[derive(Debug, Default)]
pub(crate) struct SchemaManager {
    schemas: HashMap<String, CollectionSchema>,
}

impl SchemaManager {
    /// Creates the catalog and key tables if missing.
    pub(crate) fn bootstrap(driver: &mut SqliteDriver) -> StoreResult<()> {
        driver.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {SCHEMA_TABLE} (
                collection TEXT PRIMARY KEY,
                search_fields TEXT NOT NULL,
                additional_fields TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS {KEYS_TABLE} (
                username TEXT PRIMARY KEY,
                envelope TEXT NOT NULL
             );"
        ))?;
        Ok(())
    }

    /// Reads the catalog.
    pub(crate) fn load(driver: &mut SqliteDriver) -> StoreResult<Self> {
        let rows = driver.select(&Statement::new(format!(
            "SELECT collection, search_fields, additional_fields FROM {SCHEMA_TABLE}"
        )))?;
        let mut schemas = HashMap::with_capacity(rows.len());
        for row in rows {
            let (Some(name), Some(search), Some(additional)) = (row.text(0), row.text(1), row.text(2))
            else {
                return Err(StoreError::invalid_schema("corrupt catalog row"));
            };
            let schema = CollectionSchema::new(
                name,
                serde_json::from_str::<SearchFields>(search)?,
                serde_json::from_str::<SearchFields>(additional)?,
            );
            schemas.insert(name.to_string(), schema);
        }
        debug!(collections = schemas.len(), "loaded schema catalog");
        Ok(Self { schemas })
    }

    pub(crate) fn get(&self, name: &str) -> Option<&CollectionSchema> {
        self.schemas.get(name)
    }

    /// Returns a copy of the schema of `name`.
    pub(crate) fn require(&self, name: &str) -> StoreResult<CollectionSchema> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_provisioned(name))
    }

    /// Collection names, sorted.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub(crate) fn insert(&mut self, schema: CollectionSchema) {
        self.schemas.insert(schema.name.clone(), schema);
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<CollectionSchema> {
        self.schemas.remove(name)
    }

    pub(crate) fn clear(&mut self) {
        self.schemas.clear();
    }
}

/// Creates the table and indexes of a collection and records it in the
/// catalog.
pub(crate) fn create_collection(
    driver: &mut SqliteDriver,
    schema: &CollectionSchema,
) -> StoreResult<()> {
    let table = quote_ident(&schema.name);
    let mut columns = vec!["_id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    columns.extend(
        schema
            .all_fields()
            .map(|f| format!("{} {}", quote_ident(&f.name), f.field_type.sql_type())),
    );
    columns.push("_json TEXT NOT NULL".to_string());
    columns.push("_dirty REAL NOT NULL DEFAULT 0".to_string());
    columns.push("_deleted INTEGER NOT NULL DEFAULT 0".to_string());
    columns.push("_operation TEXT NOT NULL DEFAULT ''".to_string());

    driver.execute_batch(&format!("CREATE TABLE {table} ({})", columns.join(", ")))?;
    driver.execute_batch(&format!(
        "CREATE INDEX {} ON {table} (_operation)",
        index_name(&schema.name, "_operation")
    ))?;
    for field in schema.all_fields() {
        create_field_index(driver, &schema.name, field)?;
    }
    persist(driver, schema)
}

/// Adds columns for `added` to an existing collection table and records
/// the widened schema.
pub(crate) fn append_fields(
    driver: &mut SqliteDriver,
    schema: &CollectionSchema,
    added: &[SearchField],
) -> StoreResult<()> {
    let table = quote_ident(&schema.name);
    for field in added {
        driver.execute_batch(&format!(
            "ALTER TABLE {table} ADD COLUMN {} {}",
            quote_ident(&field.name),
            field.field_type.sql_type()
        ))?;
        create_field_index(driver, &schema.name, field)?;
    }
    persist(driver, schema)
}

/// Drops a collection table and its catalog row.
pub(crate) fn drop_collection(driver: &mut SqliteDriver, name: &str) -> StoreResult<()> {
    driver.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)))?;
    driver.execute(
        &Statement::new(format!("DELETE FROM {SCHEMA_TABLE} WHERE collection = ?"))
            .bind(name.to_string()),
    )?;
    Ok(())
}

/// Whether an existing table has exactly the columns `schema` implies.
pub(crate) fn columns_match(
    driver: &mut SqliteDriver,
    schema: &CollectionSchema,
) -> StoreResult<bool> {
    let mut actual = driver.table_columns(&schema.name)?;
    let mut expected: Vec<String> = schema
        .keys()
        .into_iter()
        .chain(BOOKKEEPING_COLUMNS)
        .map(str::to_string)
        .collect();
    actual.sort();
    expected.sort();
    Ok(actual == expected)
}

pub(crate) fn persist(driver: &mut SqliteDriver, schema: &CollectionSchema) -> StoreResult<()> {
    let stmt = Statement::new(format!(
        "INSERT OR REPLACE INTO {SCHEMA_TABLE} (collection, search_fields, additional_fields) \
         VALUES (?, ?, ?)"
    ))
    .bind_all([
        SqlValue::Text(schema.name.clone()),
        SqlValue::Text(serde_json::to_string(&schema.search_fields)?),
        SqlValue::Text(serde_json::to_string(&schema.additional_fields)?),
    ]);
    driver.execute(&stmt)?;
    Ok(())
}

fn create_field_index(
    driver: &mut SqliteDriver,
    collection: &str,
    field: &SearchField,
) -> StoreResult<()> {
    driver.execute_batch(&format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        index_name(collection, &field.name),
        quote_ident(collection),
        quote_ident(&field.name)
    ))?;
    Ok(())
}

fn index_name(collection: &str, column: &str) -> String {
    quote_ident(&format!("{collection}__{column}_idx"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    fn people() -> CollectionSchema {
        CollectionSchema::new(
            "people",
            SearchFields::new()
                .with("name", FieldType::String)
                .with("address.city", FieldType::String),
            SearchFields::new().with("owner", FieldType::String),
        )
    }

    fn driver() -> SqliteDriver {
        let mut driver = SqliteDriver::open_in_memory().unwrap();
        SchemaManager::bootstrap(&mut driver).unwrap();
        driver
    }

    #[test]
    fn create_and_reload() {
        let mut driver = driver();
        create_collection(&mut driver, &people()).unwrap();
        assert!(driver.table_exists("people").unwrap());
        assert!(columns_match(&mut driver, &people()).unwrap());

        let manager = SchemaManager::load(&mut driver).unwrap();
        assert_eq!(manager.get("people"), Some(&people()));
        assert_eq!(manager.names(), ["people"]);
    }

    #[test]
    fn append_adds_columns() {
        let mut driver = driver();
        create_collection(&mut driver, &people()).unwrap();

        let mut wider = people();
        wider.search_fields = wider.search_fields.with("age", FieldType::Integer);
        let added: Vec<_> = wider.search_fields.iter().skip(2).cloned().collect();
        append_fields(&mut driver, &wider, &added).unwrap();

        assert!(columns_match(&mut driver, &wider).unwrap());
        assert!(!columns_match(&mut driver, &people()).unwrap());
        let manager = SchemaManager::load(&mut driver).unwrap();
        assert_eq!(manager.require("people").unwrap(), wider);
    }

    #[test]
    fn drop_removes_table_and_catalog_row() {
        let mut driver = driver();
        create_collection(&mut driver, &people()).unwrap();
        drop_collection(&mut driver, "people").unwrap();
        assert!(!driver.table_exists("people").unwrap());
        let manager = SchemaManager::load(&mut driver).unwrap();
        assert!(manager.is_empty());
        assert!(matches!(
            manager.require("people"),
            Err(StoreError::NotProvisioned { .. })
        ));
    }
}
