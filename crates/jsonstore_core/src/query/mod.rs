//! Query descriptors and options.
//!
//! A query is a list of [`QueryPart`]s. Clauses inside one part are ANDed
//! and the parts are ORed, so `[{name: "Ann"}, {name: "Bob"}]` finds both
//! Ann and Bob. An empty list matches every live document.

mod translate;

pub use translate::{Predicate, Translator};

use serde_json::{Map, Value};

/// Field name to value map, as accepted by `find`, `remove` and `change`.
pub type FieldValueMap = Map<String, Value>;

/// Name of the document id pseudo-field usable in queries and sorts.
pub const ID_FIELD: &str = "_id";

/// Comparison applied by a [`Clause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Exact match; for multi-valued fields, any one of the values.
    Equal,
    /// Negation of [`Operator::Equal`].
    NotEqual,
    /// Value contains the operand.
    Like,
    /// Value does not contain the operand.
    NotLike,
    /// Value ends with the operand.
    LeftLike,
    /// Value starts with the operand.
    RightLike,
    /// `<`
    LessThan,
    /// `<=`
    LessOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterOrEqual,
    /// Value is one of the operand array.
    Inside,
    /// Value is none of the operand array.
    NotInside,
    /// Value lies in the inclusive range given by a two-element array.
    Between,
    /// Value lies outside that range.
    NotBetween,
}

/// One field comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    /// Search field the clause applies to.
    pub field: String,
    /// The comparison.
    pub op: Operator,
    /// Operand. An array for `Inside`/`NotInside`, a pair for the ranges.
    pub value: Value,
}

/// A conjunction of clauses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPart {
    clauses: Vec<Clause>,
}

impl QueryPart {
    /// Creates a part that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a part from a field/value map: exact matches when `exact`,
    /// substring matches otherwise.
    #[must_use]
    pub fn from_map(map: &FieldValueMap, exact: bool) -> Self {
        let op = if exact { Operator::Equal } else { Operator::Like };
        let clauses = map
            .iter()
            .map(|(field, value)| Clause {
                field: field.clone(),
                op,
                value: value.clone(),
            })
            .collect();
        Self { clauses }
    }

    /// Adds a clause.
    #[must_use]
    pub fn clause(mut self, field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Adds an exact match.
    #[must_use]
    pub fn equal(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clause(field, Operator::Equal, value)
    }

    /// Adds a substring match.
    #[must_use]
    pub fn like(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clause(field, Operator::Like, value)
    }

    /// Adds a `<` comparison.
    #[must_use]
    pub fn less_than(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clause(field, Operator::LessThan, value)
    }

    /// Adds a `>` comparison.
    #[must_use]
    pub fn greater_than(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clause(field, Operator::GreaterThan, value)
    }

    /// Adds a membership test.
    #[must_use]
    pub fn inside<V: Into<Value>>(self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.clause(field, Operator::Inside, Value::Array(values))
    }

    /// Adds an inclusive range test.
    #[must_use]
    pub fn between(self, field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.clause(field, Operator::Between, Value::Array(vec![low.into(), high.into()]))
    }

    /// The clauses of this part.
    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Whether the part has no clauses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// Options for find operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Exact matching for map-style queries instead of substring matching.
    pub exact: bool,
    /// Maximum number of documents returned.
    pub limit: Option<u64>,
    /// Number of matching documents skipped.
    pub offset: Option<u64>,
    /// Sort keys, most significant first. Default order is by id.
    pub sort: Vec<(String, SortOrder)>,
}

impl FindOptions {
    /// Default options: fuzzy matching, no paging, id order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets exact matching.
    #[must_use]
    pub fn exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the offset.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Appends a sort key.
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }
}
