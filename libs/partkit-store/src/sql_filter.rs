//! Translation of [`Where`] trees and orderings into parameterized SQLite SQL.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::filter::{Predicate, Where};
use crate::query::SortingRule;
use crate::value::Value;

/// Positional parameter bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<&Value> for SqlParam {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlParam::Null,
            Value::Bool(b) => SqlParam::Integer(*b as i64),
            Value::Integer(i) => SqlParam::Integer(*i),
            Value::Float(f) => SqlParam::Float(*f),
            Value::String(s) => SqlParam::Text(s.clone()),
            Value::Blob(b) => SqlParam::Blob(b.clone()),
            Value::Date(d) => SqlParam::Text(format_date(d)),
            Value::Json(j) => SqlParam::Text(j.to_string()),
        }
    }
}

/// Fixed-width RFC 3339 so text order equals chronological order.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A rendered `WHERE` body and its parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    pub clause: String,
    pub params: Vec<SqlParam>,
}

pub fn where_to_sql(filter: &Where) -> SqlFilter {
    let mut params = Vec::new();
    let clause = render(filter, &mut params);
    SqlFilter { clause, params }
}

fn render(filter: &Where, params: &mut Vec<SqlParam>) -> String {
    let mut parts = Vec::new();
    for (field, predicates) in &filter.fields {
        let column = quote_ident(field);
        for predicate in predicates {
            parts.push(predicate_sql(&column, predicate, params));
        }
    }
    for nested in &filter.and {
        parts.push(format!("({})", render(nested, params)));
    }
    if !filter.or.is_empty() {
        let alternatives: Vec<String> = filter
            .or
            .iter()
            .map(|nested| format!("({})", render(nested, params)))
            .collect();
        parts.push(format!("({})", alternatives.join(" OR ")));
    }
    if parts.is_empty() {
        "1 = 1".to_string()
    } else {
        parts.join(" AND ")
    }
}

fn predicate_sql(column: &str, predicate: &Predicate, params: &mut Vec<SqlParam>) -> String {
    let mut bind = |value: &Value| {
        params.push(SqlParam::from(value));
        "?"
    };
    match predicate {
        Predicate::Equals(v) => format!("{column} = {}", bind(v)),
        Predicate::NotEquals(v) => format!("{column} <> {}", bind(v)),
        Predicate::In(list) if list.is_empty() => "0 = 1".to_string(),
        Predicate::In(list) => {
            let marks: Vec<_> = list.iter().map(&mut bind).collect();
            format!("{column} IN ({})", marks.join(", "))
        }
        // nothing to exclude, but null still fails
        Predicate::NotIn(list) if list.is_empty() => format!("{column} IS NOT NULL"),
        Predicate::NotIn(list) => {
            let marks: Vec<_> = list.iter().map(&mut bind).collect();
            format!("{column} NOT IN ({})", marks.join(", "))
        }
        Predicate::Like(p) => format!("{column} LIKE {}", bind(&Value::String(p.clone()))),
        Predicate::NotLike(p) => format!("{column} NOT LIKE {}", bind(&Value::String(p.clone()))),
        Predicate::Gt(v) => format!("{column} > {}", bind(v)),
        Predicate::Gte(v) => format!("{column} >= {}", bind(v)),
        Predicate::Lt(v) => format!("{column} < {}", bind(v)),
        Predicate::Lte(v) => format!("{column} <= {}", bind(v)),
        Predicate::IsNull => format!("{column} IS NULL"),
        Predicate::IsNotNull => format!("{column} IS NOT NULL"),
    }
}

/// `ORDER BY` body; `rowid` breaks ties so repeated reads return the same order.
pub fn order_to_sql(rules: &[SortingRule]) -> String {
    let mut terms: Vec<String> = rules
        .iter()
        .map(|r| format!("{} {}", quote_ident(&r.field), r.direction.as_sql()))
        .collect();
    terms.push("rowid ASC".to_string());
    terms.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_renders_two_anded_comparisons() {
        let w = Where::new()
            .field("age", Predicate::Gte(Value::Integer(18)))
            .field("age", Predicate::Lt(Value::Integer(65)));
        let sql = where_to_sql(&w);
        assert_eq!(sql.clause, "\"age\" >= ? AND \"age\" < ?");
        assert_eq!(sql.params, vec![SqlParam::Integer(18), SqlParam::Integer(65)]);
    }

    #[test]
    fn nested_groups_keep_parameter_order() {
        let w = Where::new()
            .field("name", Predicate::Like("M%".into()))
            .and(Where::new().field("age", Predicate::In(vec![1.into(), 2.into()])))
            .or(Where::new().field("nick", Predicate::IsNull))
            .or(Where::new().eq("nick", "x"));
        let sql = where_to_sql(&w);
        assert_eq!(
            sql.clause,
            "\"name\" LIKE ? AND (\"age\" IN (?, ?)) AND ((\"nick\" IS NULL) OR (\"nick\" = ?))"
        );
        assert_eq!(
            sql.params,
            vec![
                SqlParam::Text("M%".into()),
                SqlParam::Integer(1),
                SqlParam::Integer(2),
                SqlParam::Text("x".into())
            ]
        );
    }

    #[test]
    fn empty_lists_and_empty_filters() {
        assert_eq!(where_to_sql(&Where::new()).clause, "1 = 1");
        let w = Where::new().field("a", Predicate::In(vec![]));
        assert_eq!(where_to_sql(&w).clause, "0 = 1");
        let w = Where::new().field("a", Predicate::NotIn(vec![]));
        assert_eq!(where_to_sql(&w).clause, "\"a\" IS NOT NULL");
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(
            order_to_sql(&[SortingRule::desc("name")]),
            "\"name\" DESC, rowid ASC"
        );
    }
}
