//! CLI command implementations.

pub mod admin;
pub mod collections;
pub mod documents;
pub mod sync;

use jsonstore_core::{Config, FieldValueMap, FindOptions, JsonStore, SortOrder};
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::path::PathBuf;

/// Result type shared by the commands.
pub type CommandResult<T = ()> = Result<T, Box<dyn Error>>;

/// Where and as whom the commands open the store.
pub struct Context {
    root: PathBuf,
    username: String,
    password: Option<String>,
}

impl Context {
    /// Creates a context.
    pub fn new(root: PathBuf, username: String, password: Option<String>) -> Self {
        Self {
            root,
            username,
            password,
        }
    }

    /// Configuration for this context.
    pub fn config(&self, create_if_missing: bool) -> Config {
        let config = Config::at(&self.root)
            .username(self.username.clone())
            .create_if_missing(create_if_missing);
        match &self.password {
            Some(password) => config.password(password.clone()),
            None => config,
        }
    }

    /// Opens the store. Only provisioning creates a missing store.
    pub fn open(&self, create_if_missing: bool) -> CommandResult<JsonStore> {
        Ok(JsonStore::open(self.config(create_if_missing))?)
    }

    pub(crate) fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

/// Parses a query argument: one JSON object or an array of objects.
pub fn parse_queries(text: Option<&str>) -> CommandResult<Vec<FieldValueMap>> {
    match text {
        None => Ok(Vec::new()),
        Some(text) => parse_objects(text, "query"),
    }
}

/// Parses one JSON object or an array of objects.
pub fn parse_objects(text: &str, what: &str) -> CommandResult<Vec<FieldValueMap>> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(vec![map]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                other => Err(format!("{what} entries must be objects, got {other}").into()),
            })
            .collect(),
        other => Err(format!("{what} must be an object or an array, got {other}").into()),
    }
}

/// Builds find options from command-line flags.
pub fn find_options(
    exact: bool,
    limit: Option<u64>,
    offset: Option<u64>,
    sort: Option<&str>,
) -> CommandResult<FindOptions> {
    let mut options = FindOptions::new().exact(exact);
    if let Some(limit) = limit {
        options = options.limit(limit);
    }
    if let Some(offset) = offset {
        options = options.offset(offset);
    }
    for key in sort.unwrap_or_default().split(',').map(str::trim).filter(|k| !k.is_empty()) {
        let (field, order) = match key.split_once(':') {
            None => (key, SortOrder::Ascending),
            Some((field, "asc")) => (field, SortOrder::Ascending),
            Some((field, "desc")) => (field, SortOrder::Descending),
            Some((_, other)) => return Err(format!("unknown sort order: {other}").into()),
        };
        options = options.sort_by(field, order);
    }
    Ok(options)
}

/// Prints a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_accepts_object_or_array() {
        assert!(parse_queries(None).unwrap().is_empty());
        assert_eq!(parse_queries(Some(r#"{"name":"ann"}"#)).unwrap().len(), 1);
        assert_eq!(
            parse_queries(Some(r#"[{"name":"ann"},{"age":3}]"#)).unwrap().len(),
            2
        );
        assert!(parse_queries(Some("42")).is_err());
        assert!(parse_queries(Some("[1]")).is_err());
        assert!(parse_queries(Some("{oops")).is_err());
    }

    #[test]
    fn sort_keys_parse() {
        let options = find_options(true, Some(5), None, Some("age:desc, name")).unwrap();
        assert!(options.exact);
        assert_eq!(options.limit, Some(5));
        assert_eq!(
            options.sort,
            vec![
                ("age".to_string(), SortOrder::Descending),
                ("name".to_string(), SortOrder::Ascending),
            ]
        );
        assert!(find_options(false, None, None, Some("age:sideways")).is_err());
    }

    #[test]
    fn config_carries_identity() {
        let ctx = Context::new(PathBuf::from("/data"), "ann".into(), Some("pw".into()));
        let config = ctx.config(false);
        assert_eq!(config.username, "ann");
        assert!(!config.create_if_missing);
        assert!(config.password.is_some());
        assert_eq!(config.root.as_deref(), Some(std::path::Path::new("/data")));
    }
}
