//! Translation of [`Where`] trees into MongoDB-style filter documents.
//!
//! Only the filter shape is produced; executing it is up to the driver.
//! Document databases match `$ne`/`$nin` on missing fields, so negations also
//! exclude `null` to keep the SQL semantics of the other adapters.

use base64::Engine as _;
use serde_json::{json, Map, Value as Json};

use crate::field::ID_FIELD;
use crate::filter::{Predicate, Where};
use crate::like::like_to_regex;
use crate::query::{Direction, SortingRule};
use crate::sql_filter::format_date;
use crate::value::Value;

/// Key of the identifier in document databases.
pub const DOCUMENT_ID: &str = "_id";

pub fn document_filter(filter: &Where) -> Json {
    let mut clauses = Vec::new();

    for (field, predicates) in &filter.fields {
        let key = document_key(field);
        // merge operators on one field unless two share a name
        let mut merged = Map::new();
        for predicate in predicates {
            let (op, operand) = operator(predicate);
            if merged.contains_key(op) {
                clauses.push(json!({ key.clone(): { op: operand } }));
            } else {
                merged.insert(op.to_string(), operand);
            }
        }
        if !merged.is_empty() {
            clauses.push(json!({ key: merged }));
        }
    }
    clauses.extend(filter.and.iter().map(document_filter));
    if !filter.or.is_empty() {
        let alternatives: Vec<Json> = filter.or.iter().map(document_filter).collect();
        clauses.push(json!({ "$or": alternatives }));
    }

    match clauses.len() {
        0 => json!({}),
        1 => clauses.remove(0),
        _ => json!({ "$and": clauses }),
    }
}

fn document_key(field: &str) -> String {
    if field == ID_FIELD {
        DOCUMENT_ID.to_string()
    } else {
        field.to_string()
    }
}

fn operator(predicate: &Predicate) -> (&'static str, Json) {
    let with_null = |list: &[Value]| {
        let mut items: Vec<Json> = list.iter().map(document_value).collect();
        items.push(Json::Null);
        Json::Array(items)
    };
    match predicate {
        Predicate::Equals(v) => ("$eq", document_value(v)),
        Predicate::NotEquals(v) => ("$nin", with_null(std::slice::from_ref(v))),
        Predicate::In(list) => ("$in", Json::Array(list.iter().map(document_value).collect())),
        Predicate::NotIn(list) => ("$nin", with_null(list)),
        Predicate::Like(p) => ("$regex", Json::String(like_to_regex(p))),
        Predicate::NotLike(p) => (
            "$not",
            json!({ "$regex": like_to_regex(p) }),
        ),
        Predicate::Gt(v) => ("$gt", document_value(v)),
        Predicate::Gte(v) => ("$gte", document_value(v)),
        Predicate::Lt(v) => ("$lt", document_value(v)),
        Predicate::Lte(v) => ("$lte", document_value(v)),
        Predicate::IsNull => ("$eq", Json::Null),
        Predicate::IsNotNull => ("$ne", Json::Null),
    }
}

/// Values in extended JSON so dates and binaries keep their type.
pub fn document_value(value: &Value) -> Json {
    match value {
        Value::Date(d) => json!({ "$date": format_date(d) }),
        Value::Blob(b) => json!({
            "$binary": {
                "base64": base64::engine::general_purpose::STANDARD.encode(b),
                "subType": "00"
            }
        }),
        other => other.to_json(),
    }
}

/// Sort specification as ordered `(key, 1 | -1)` pairs; priority follows the list.
pub fn document_sort(order: &[SortingRule]) -> Vec<(String, i32)> {
    order
        .iter()
        .map(|rule| {
            let dir = match rule.direction {
                Direction::Asc => 1,
                Direction::Desc => -1,
            };
            (document_key(&rule.field), dir)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_merges_into_one_operator_object() {
        let w = Where::new()
            .field("age", Predicate::Gte(Value::Integer(18)))
            .field("age", Predicate::Lt(Value::Integer(65)));
        assert_eq!(document_filter(&w), json!({"age": {"$gte": 18, "$lt": 65}}));
    }

    #[test]
    fn negations_exclude_null() {
        let w = Where::new()
            .field("name", Predicate::NotEquals("Matti".into()))
            .field("nick", Predicate::NotLike("x%".into()));
        assert_eq!(
            document_filter(&w),
            json!({"$and": [
                {"name": {"$nin": ["Matti", null]}},
                {"nick": {"$not": {"$regex": "^x.*$"}}}
            ]})
        );
    }

    #[test]
    fn composition_id_mapping_and_duplicates() {
        let w = Where::new()
            .eq("id", "abc")
            .field("name", Predicate::Like("A%".into()))
            .field("name", Predicate::Like("%z".into()))
            .or(Where::new().field("age", Predicate::IsNull))
            .or(Where::new().field("age", Predicate::Gt(Value::Integer(3))));
        assert_eq!(
            document_filter(&w),
            json!({"$and": [
                {"_id": {"$eq": "abc"}},
                {"name": {"$regex": "^.*z$"}},
                {"name": {"$regex": "^A.*$"}},
                {"$or": [{"age": {"$eq": null}}, {"age": {"$gt": 3}}]}
            ]})
        );
        assert_eq!(document_filter(&Where::new()), json!({}));
    }

    #[test]
    fn sort_pairs_keep_priority() {
        let order = [SortingRule::desc("name"), SortingRule::asc("id")];
        assert_eq!(
            document_sort(&order),
            vec![("name".to_string(), -1), ("_id".to_string(), 1)]
        );
    }
}
