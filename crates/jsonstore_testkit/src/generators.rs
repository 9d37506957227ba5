//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random documents, names and queries
//! that the store accepts.

use jsonstore_core::{FieldType, SearchFields};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

/// Strategy for generating valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_-]{0,31}").expect("Invalid regex")
}

/// Strategy for generating valid search field names, dotted paths included.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::string::string_regex("[a-z][a-z0-9]{0,7}").expect("Invalid regex"),
        1..3,
    )
    .prop_map(|segments| segments.join("."))
}

/// Strategy for generating field types.
pub fn field_type_strategy() -> impl Strategy<Value = FieldType> {
    prop_oneof![
        Just(FieldType::String),
        Just(FieldType::Integer),
        Just(FieldType::Number),
        Just(FieldType::Boolean),
    ]
}

/// Strategy for generating search field sets with distinct names.
pub fn search_fields_strategy() -> impl Strategy<Value = SearchFields> {
    prop::collection::btree_map(field_name_strategy(), field_type_strategy(), 1..5)
        .prop_filter("dotted names must not shadow each other", |fields| {
            let names: Vec<_> = fields.keys().collect();
            !names.iter().any(|a| {
                names
                    .iter()
                    .any(|b| a != b && b.starts_with(&format!("{a}.")))
            })
        })
        .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for a JSON value of the given field type.
pub fn value_strategy(field_type: FieldType) -> BoxedStrategy<Value> {
    match field_type {
        FieldType::String => "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from).boxed(),
        FieldType::Integer => any::<i32>().prop_map(Value::from).boxed(),
        FieldType::Number => (-1.0e6f64..1.0e6).prop_map(Value::from).boxed(),
        FieldType::Boolean => any::<bool>().prop_map(Value::from).boxed(),
    }
}

/// Strategy for documents of the `people` shape: a name, an age, a list of
/// tags and a free-form note that is not indexed.
pub fn document_strategy() -> impl Strategy<Value = Value> {
    (
        "[A-Z][a-z]{1,9}",
        0u8..120,
        prop::collection::vec("[a-z]{1,6}", 0..4),
        ".{0,32}",
    )
        .prop_map(|(name, age, tags, note)| {
            json!({
                "name": name,
                "age": age,
                "tags": tags,
                "note": note,
            })
        })
}

/// Strategy for arbitrary JSON bodies, nested up to a few levels.
pub fn json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        ".{0,16}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Strategy for JSON object bodies.
pub fn object_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z]{1,8}", json_strategy(), 0..8)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
}

/// Strategy for a batch of `people` documents.
pub fn document_batch_strategy(max: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(document_strategy(), 0..max)
}
