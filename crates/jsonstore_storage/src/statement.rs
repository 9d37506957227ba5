//! Statement templates with ordered bind parameters, and result rows.

pub use rusqlite::types::Value as SqlValue;

/// A SQL statement template plus its ordered bind parameters.
///
/// Values are always bound, never spliced into the SQL text. Identifiers
/// (table and column names) go through [`quote_ident`].
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<SqlValue>,
}

impl Statement {
    /// Creates a statement with no parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Creates a statement with the given parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Appends one bind parameter.
    #[must_use]
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Appends several bind parameters.
    #[must_use]
    pub fn bind_all(mut self, values: impl IntoIterator<Item = SqlValue>) -> Self {
        self.params.extend(values);
        self
    }

    /// The statement template.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The bind parameters in placeholder order.
    #[must_use]
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
}

/// Quotes an identifier for use as a table or column name.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// One result row, values in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub(crate) Vec<SqlValue>);

impl Row {
    /// Creates a row from raw values.
    #[must_use]
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self(values)
    }

    /// Returns the value at `idx`.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&SqlValue> {
        self.0.get(idx)
    }

    /// Returns the value at `idx` as an integer.
    #[must_use]
    pub fn integer(&self, idx: usize) -> Option<i64> {
        match self.0.get(idx)? {
            SqlValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value at `idx` as a float, widening integers.
    #[must_use]
    pub fn real(&self, idx: usize) -> Option<f64> {
        match self.0.get(idx)? {
            SqlValue::Real(f) => Some(*f),
            SqlValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Returns the value at `idx` as text.
    #[must_use]
    pub fn text(&self, idx: usize) -> Option<&str> {
        match self.0.get(idx)? {
            SqlValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the row, returning its values.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_keeps_order() {
        let stmt = Statement::new("SELECT ? , ?").bind(1i64).bind("two".to_string());
        assert_eq!(
            stmt.params(),
            &[SqlValue::Integer(1), SqlValue::Text("two".to_string())]
        );
    }

    #[test]
    fn quote_escapes_embedded_quotes() {
        assert_eq!(quote_ident("name"), "\"name\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_ident("address.city"), "\"address.city\"");
    }

    #[test]
    fn row_accessors() {
        let row = Row::new(vec![
            SqlValue::Integer(7),
            SqlValue::Real(1.5),
            SqlValue::Text("x".into()),
            SqlValue::Null,
        ]);
        assert_eq!(row.integer(0), Some(7));
        assert_eq!(row.real(0), Some(7.0));
        assert_eq!(row.real(1), Some(1.5));
        assert_eq!(row.text(2), Some("x"));
        assert_eq!(row.text(3), None);
        assert_eq!(row.integer(9), None);
        assert_eq!(row.len(), 4);
    }
}
