//! Ordering, paging and the options bag for `find`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::field::{field_type, FieldMap};
use crate::filter::{FilterError, Where};
use crate::value::{Value, Values};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortingRule {
    pub field: String,
    pub direction: Direction,
}

impl SortingRule {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    /// Parse `[["name", "ASC"], ["age", "DESC"]]`.
    pub fn list_from_json(fields: &FieldMap, json: &Json) -> Result<Vec<Self>, FilterError> {
        let malformed =
            || FilterError::Malformed("order must be a list of [field, \"ASC\" | \"DESC\"]".into());
        let items = json.as_array().ok_or_else(malformed)?;
        items
            .iter()
            .map(|item| {
                let pair = item.as_array().filter(|p| p.len() == 2).ok_or_else(malformed)?;
                let field = pair[0].as_str().ok_or_else(malformed)?;
                if field_type(fields, field).is_none() {
                    return Err(FilterError::UnknownField(field.to_string()));
                }
                let direction = match pair[1].as_str() {
                    Some(d) if d.eq_ignore_ascii_case("asc") => Direction::Asc,
                    Some(d) if d.eq_ignore_ascii_case("desc") => Direction::Desc,
                    _ => return Err(malformed()),
                };
                Ok(Self {
                    field: field.to_string(),
                    direction,
                })
            })
            .collect()
    }
}

/// Options of [`Collection::find`](crate::Collection::find). An absent filter matches everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindOptions {
    pub filter: Option<Where>,
    pub order: Vec<SortingRule>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Where) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, rule: SortingRule) -> Self {
        self.order.push(rule);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Compare two documents by `rules` in priority order. Nulls sort first
/// ascending, as in SQLite; incomparable values tie.
pub fn compare_documents(rules: &[SortingRule], a: &Values, b: &Values) -> Ordering {
    for rule in rules {
        let left = a.get(&rule.field).unwrap_or(&Value::Null);
        let right = b.get(&rule.field).unwrap_or(&Value::Null);
        let ord = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => left.compare(right).unwrap_or(Ordering::Equal),
        };
        let ord = match rule.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Apply `offset` then `limit` to an already ordered list.
pub fn page<T>(items: Vec<T>, offset: Option<u64>, limit: Option<u64>) -> Vec<T> {
    let skip = offset.unwrap_or(0) as usize;
    let take = limit.map(|l| l as usize).unwrap_or(usize::MAX);
    items.into_iter().skip(skip).take(take).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use serde_json::json;

    #[test]
    fn parses_ordering_pairs() {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), Field::string());
        let rules =
            SortingRule::list_from_json(&fields, &json!([["name", "DESC"], ["id", "asc"]])).unwrap();
        assert_eq!(rules, vec![SortingRule::desc("name"), SortingRule::asc("id")]);
        assert!(SortingRule::list_from_json(&fields, &json!([["name", "UP"]])).is_err());
    }

    #[test]
    fn sorts_with_priority_and_nulls_first() {
        let row = |n: &str, a: Option<i64>| -> Values {
            let mut v = Values::new();
            v.insert("n".into(), n.into());
            v.insert("a".into(), a.map(Value::Integer).unwrap_or(Value::Null));
            v
        };
        let mut rows = vec![row("b", Some(1)), row("a", None), row("a", Some(2)), row("c", Some(1))];
        let rules = [SortingRule::asc("a"), SortingRule::desc("n")];
        rows.sort_by(|x, y| compare_documents(&rules, x, y));
        let names: Vec<_> = rows.iter().map(|r| r["n"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "c", "b", "a"]);
    }

    #[test]
    fn paging_skips_then_takes() {
        assert_eq!(page(vec![1, 2, 3, 4], Some(1), Some(2)), vec![2, 3]);
        assert_eq!(page(vec![1, 2, 3], Some(5), None), Vec::<i32>::new());
    }
}
