//! Translation of query parts into parameterized SQL predicates.
//!
//! Values are always bound as parameters. Column names come only from the
//! collection schema, so user input never reaches the SQL text.

use super::{Clause, FieldValueMap, Operator, QueryPart, SortOrder, ID_FIELD};
use crate::error::{StoreError, StoreResult};
use crate::schema::{
    coerce, escape_text, scalar_text, sql_text, CollectionSchema, FieldType, ARRAY_SEPARATOR,
};
use jsonstore_storage::{casefold, quote_ident, SqlValue, CASEFOLD_FUNCTION};
use serde_json::Value;

/// A SQL boolean expression plus its bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Expression text with `?` placeholders.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<SqlValue>,
}

impl Predicate {
    /// A predicate that is always true.
    #[must_use]
    pub fn match_all() -> Self {
        Self {
            sql: "1".to_string(),
            params: Vec::new(),
        }
    }
}

/// Translates queries against one collection.
#[derive(Debug, Clone, Copy)]
pub struct Translator<'a> {
    schema: &'a CollectionSchema,
}

impl<'a> Translator<'a> {
    /// Creates a translator for `schema`.
    #[must_use]
    pub fn new(schema: &'a CollectionSchema) -> Self {
        Self { schema }
    }

    /// Translates field/value maps; each map becomes one ORed part.
    pub fn translate_maps(&self, maps: &[FieldValueMap], exact: bool) -> StoreResult<Predicate> {
        let parts: Vec<QueryPart> = maps.iter().map(|m| QueryPart::from_map(m, exact)).collect();
        self.translate(&parts)
    }

    /// Translates query parts. An empty list, or any empty part, matches all.
    ///
    /// # Errors
    ///
    /// - [`StoreError::QueryFieldNotIndexed`] for a field that is not a
    ///   search field of the collection
    /// - [`StoreError::InvalidQuery`] for operands of the wrong shape or type
    pub fn translate(&self, parts: &[QueryPart]) -> StoreResult<Predicate> {
        if parts.is_empty() || parts.iter().any(QueryPart::is_empty) {
            // still validate field names so typos surface
            for clause in parts.iter().flat_map(QueryPart::clauses) {
                self.column(&clause.field)?;
            }
            return Ok(Predicate::match_all());
        }

        let mut params = Vec::new();
        let mut disjuncts = Vec::with_capacity(parts.len());
        for part in parts {
            let conjuncts = part
                .clauses()
                .iter()
                .map(|c| self.clause(c, &mut params))
                .collect::<StoreResult<Vec<_>>>()?;
            disjuncts.push(format!("({})", conjuncts.join(" AND ")));
        }
        Ok(Predicate {
            sql: format!("({})", disjuncts.join(" OR ")),
            params,
        })
    }

    /// `ORDER BY` body for `sort`; id order breaks ties.
    pub fn order_by(&self, sort: &[(String, SortOrder)]) -> StoreResult<String> {
        let mut keys = sort
            .iter()
            .map(|(field, order)| {
                let (column, _) = self.column(field)?;
                let dir = match order {
                    SortOrder::Ascending => "ASC",
                    SortOrder::Descending => "DESC",
                };
                Ok(format!("{column} {dir}"))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        if !sort.iter().any(|(field, _)| field == ID_FIELD) {
            keys.push("_id ASC".to_string());
        }
        Ok(keys.join(", "))
    }

    fn column(&self, field: &str) -> StoreResult<(String, FieldType)> {
        if field == ID_FIELD {
            return Ok((ID_FIELD.to_string(), FieldType::Integer));
        }
        self.schema
            .field_type(field)
            .map(|ty| (quote_ident(field), ty))
            .ok_or_else(|| StoreError::field_not_indexed(&self.schema.name, field))
    }

    fn clause(&self, clause: &Clause, params: &mut Vec<SqlValue>) -> StoreResult<String> {
        let (column, ty) = self.column(&clause.field)?;
        match clause.op {
            Operator::Equal => self.equal(&column, ty, clause, params),
            Operator::NotEqual => Ok(format!("NOT {}", self.equal(&column, ty, clause, params)?)),
            Operator::Like | Operator::NotLike | Operator::LeftLike | Operator::RightLike => {
                let text = escape_like(&casefold(&like_text(ty, clause)?));
                let pattern = match clause.op {
                    Operator::LeftLike => format!("%{text}"),
                    Operator::RightLike => format!("{text}%"),
                    _ => format!("%{text}%"),
                };
                params.push(SqlValue::Text(pattern));
                let expr = format!("{CASEFOLD_FUNCTION}(CAST({column} AS TEXT)) LIKE ? ESCAPE '\\'");
                Ok(if clause.op == Operator::NotLike {
                    format!("NOT ({expr})")
                } else {
                    expr
                })
            }
            Operator::LessThan
            | Operator::LessOrEqual
            | Operator::GreaterThan
            | Operator::GreaterOrEqual => {
                let value = operand(ty, &clause.field, &clause.value)?;
                if value == SqlValue::Null {
                    return Err(StoreError::invalid_query(format!(
                        "cannot compare {} with null",
                        clause.field
                    )));
                }
                params.push(value);
                let op = match clause.op {
                    Operator::LessThan => "<",
                    Operator::LessOrEqual => "<=",
                    Operator::GreaterThan => ">",
                    _ => ">=",
                };
                Ok(format!("{column} {op} ?"))
            }
            Operator::Inside | Operator::NotInside => {
                let negate = clause.op == Operator::NotInside;
                let items = clause.value.as_array().ok_or_else(|| {
                    StoreError::invalid_query(format!("{} expects an array of values", clause.field))
                })?;
                if items.is_empty() {
                    return Ok(if negate { "1" } else { "0" }.to_string());
                }
                for item in items {
                    params.push(operand(ty, &clause.field, item)?);
                }
                let marks = vec!["?"; items.len()].join(", ");
                let not = if negate { "NOT " } else { "" };
                Ok(format!("{column} {not}IN ({marks})"))
            }
            Operator::Between | Operator::NotBetween => {
                let bounds = match clause.value.as_array().map(Vec::as_slice) {
                    Some([low, high]) => [low, high],
                    _ => {
                        return Err(StoreError::invalid_query(format!(
                            "{} expects a [low, high] pair",
                            clause.field
                        )))
                    }
                };
                for bound in bounds {
                    params.push(operand(ty, &clause.field, bound)?);
                }
                let not = if clause.op == Operator::NotBetween { "NOT " } else { "" };
                Ok(format!("{column} {not}BETWEEN ? AND ?"))
            }
        }
    }

    /// Exact match that also finds the value inside a joined multi-value.
    ///
    /// Stored text escapes `@`, so the wrapped needle can only line up with
    /// whole elements.
    fn equal(
        &self,
        column: &str,
        ty: FieldType,
        clause: &Clause,
        params: &mut Vec<SqlValue>,
    ) -> StoreResult<String> {
        let value = operand(ty, &clause.field, &clause.value)?;
        if value == SqlValue::Null {
            return Ok(format!("({column} IS NULL)"));
        }
        if clause.field == ID_FIELD {
            params.push(value);
            return Ok(format!("({column} = ?)"));
        }
        let needle = format!("{ARRAY_SEPARATOR}{}{ARRAY_SEPARATOR}", sql_text(&value));
        params.push(value);
        params.push(SqlValue::Text(needle));
        // instr compares bytes, so element matches keep the case of `=`
        Ok(format!(
            "({column} = ? OR instr('{ARRAY_SEPARATOR}' || {column} || '{ARRAY_SEPARATOR}', ?) > 0)"
        ))
    }
}

fn operand(ty: FieldType, field: &str, value: &Value) -> StoreResult<SqlValue> {
    if value.is_array() || value.is_object() {
        return Err(StoreError::invalid_query(format!(
            "operand for {field} must be a scalar, got {value}"
        )));
    }
    coerce(field, ty, value).map_err(|_| {
        StoreError::invalid_query(format!("{value} is not a valid {ty} for {field}"))
    })
}

fn like_text(ty: FieldType, clause: &Clause) -> StoreResult<String> {
    let raw = scalar_text(&clause.value).map(|t| escape_text(&t)).ok_or_else(|| {
        StoreError::invalid_query(format!(
            "substring match on {} needs a scalar, got {}",
            clause.field, clause.value
        ))
    })?;
    Ok(coerce(&clause.field, ty, &clause.value)
        .map(|v| sql_text(&v))
        .unwrap_or(raw))
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SearchFields;
    use serde_json::json;

    fn schema() -> CollectionSchema {
        CollectionSchema::new(
            "people",
            SearchFields::new()
                .with("name", FieldType::String)
                .with("age", FieldType::Integer)
                .with("active", FieldType::Boolean),
            SearchFields::new().with("owner", FieldType::String),
        )
    }

    fn map(value: Value) -> FieldValueMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn empty_query_matches_all() {
        let schema = schema();
        let t = Translator::new(&schema);
        assert_eq!(t.translate(&[]).unwrap(), Predicate::match_all());
        assert_eq!(
            t.translate_maps(&[FieldValueMap::new()], true).unwrap(),
            Predicate::match_all()
        );
    }

    #[test]
    fn fuzzy_match_binds_pattern() {
        let schema = schema();
        let p = Translator::new(&schema)
            .translate_maps(&[map(json!({"name": "an"}))], false)
            .unwrap();
        assert_eq!(
            p.sql,
            "((casefold(CAST(\"name\" AS TEXT)) LIKE ? ESCAPE '\\'))"
        );
        assert_eq!(p.params, vec![SqlValue::Text("%an%".into())]);

        let p = Translator::new(&schema)
            .translate_maps(&[map(json!({"name": "ÉMI"}))], false)
            .unwrap();
        assert_eq!(p.params, vec![SqlValue::Text("%émi%".into())]);
    }

    #[test]
    fn exact_match_covers_multi_values() {
        let schema = schema();
        let p = Translator::new(&schema)
            .translate_maps(&[map(json!({"age": "30"}))], true)
            .unwrap();
        assert!(p.sql.contains("\"age\" = ?"));
        assert!(p.sql.contains("instr('-@-' || \"age\" || '-@-', ?) > 0"));
        assert!(!p.sql.contains("LIKE"));
        assert_eq!(
            p.params,
            vec![SqlValue::Integer(30), SqlValue::Text("-@-30-@-".into())]
        );
    }

    #[test]
    fn exact_operands_are_escaped_like_stored_text() {
        let schema = schema();
        let p = Translator::new(&schema)
            .translate_maps(&[map(json!({"name": "a@b"}))], true)
            .unwrap();
        assert_eq!(
            p.params,
            vec![
                SqlValue::Text("a\\@b".into()),
                SqlValue::Text("-@-a\\@b-@-".into())
            ]
        );
    }

    #[test]
    fn parts_are_ored_clauses_anded() {
        let schema = schema();
        let p = Translator::new(&schema)
            .translate_maps(
                &[
                    map(json!({"name": "Ann", "age": 30})),
                    map(json!({"name": "Bob"})),
                ],
                false,
            )
            .unwrap();
        assert_eq!(p.sql.matches(" OR ").count(), 1);
        assert_eq!(p.sql.matches(" AND ").count(), 1);
        assert_eq!(p.params.len(), 3);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let schema = schema();
        let t = Translator::new(&schema);
        assert!(matches!(
            t.translate_maps(&[map(json!({"shoe": 9}))], true),
            Err(StoreError::QueryFieldNotIndexed { field, .. }) if field == "shoe"
        ));
        assert!(matches!(
            t.translate(&[QueryPart::new(), QueryPart::new().equal("shoe", 9)]),
            Err(StoreError::QueryFieldNotIndexed { .. })
        ));
        assert!(matches!(
            t.order_by(&[("shoe".to_string(), SortOrder::Ascending)]),
            Err(StoreError::QueryFieldNotIndexed { .. })
        ));
    }

    #[test]
    fn additional_fields_and_id_are_queryable() {
        let schema = schema();
        let t = Translator::new(&schema);
        let p = t
            .translate(&[QueryPart::new().equal("owner", "carol").inside(ID_FIELD, [1, 2])])
            .unwrap();
        assert!(p.sql.contains("_id IN (?, ?)"));
    }

    #[test]
    fn operand_shape_is_checked() {
        let schema = schema();
        let t = Translator::new(&schema);
        assert!(matches!(
            t.translate(&[QueryPart::new().equal("age", "old")]),
            Err(StoreError::InvalidQuery { .. })
        ));
        assert!(matches!(
            t.translate(&[QueryPart::new().clause("age", Operator::Between, json!([1]))]),
            Err(StoreError::InvalidQuery { .. })
        ));
        assert!(matches!(
            t.translate(&[QueryPart::new().clause("age", Operator::Inside, 3)]),
            Err(StoreError::InvalidQuery { .. })
        ));
        assert!(matches!(
            t.translate(&[QueryPart::new().like("name", json!({"a": 1}))]),
            Err(StoreError::InvalidQuery { .. })
        ));
    }

    #[test]
    fn like_variants_and_escaping() {
        let schema = schema();
        let t = Translator::new(&schema);
        let p = t
            .translate(&[QueryPart::new()
                .clause("name", Operator::RightLike, "a_b")
                .clause("name", Operator::LeftLike, "50%")])
            .unwrap();
        assert_eq!(
            p.params,
            vec![
                SqlValue::Text("a\\_b%".into()),
                SqlValue::Text("%50\\%".into())
            ]
        );
    }

    #[test]
    fn booleans_bind_as_integers() {
        let schema = schema();
        let p = Translator::new(&schema)
            .translate(&[QueryPart::new().like("active", true)])
            .unwrap();
        assert_eq!(p.params, vec![SqlValue::Text("%1%".into())]);
    }

    #[test]
    fn empty_inside_matches_nothing() {
        let schema = schema();
        let p = Translator::new(&schema)
            .translate(&[QueryPart::new().inside("age", Vec::<i64>::new())])
            .unwrap();
        assert_eq!(p.sql, "((0))");
    }

    #[test]
    fn order_by_appends_id() {
        let schema = schema();
        let t = Translator::new(&schema);
        assert_eq!(t.order_by(&[]).unwrap(), "_id ASC");
        assert_eq!(
            t.order_by(&[("age".to_string(), SortOrder::Descending)]).unwrap(),
            "\"age\" DESC, _id ASC"
        );
    }
}
