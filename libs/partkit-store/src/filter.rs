//! The `Where` filter tree shared by every adapter.
//!
//! Semantics follow SQL: a null stored value fails every predicate except
//! `is null`; `equals null` means `is null` and `notEquals null` means
//! `is not null`.

use std::collections::BTreeMap;

use serde_json::Value as Json;
use thiserror::Error;

use crate::field::{field_type, DataType, FieldMap};
use crate::like::like_matches;
use crate::value::{Value, Values};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unknown field '{0}' in filter")]
    UnknownField(String),
    #[error("unsupported operator '{operator}' for field '{field}'")]
    UnsupportedOperator { field: String, operator: String },
    #[error("invalid value for '{field}.{operator}': {message}")]
    InvalidValue {
        field: String,
        operator: String,
        message: String,
    },
    #[error("malformed filter: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equals(Value),
    NotEquals(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Like(String),
    NotLike(String),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    IsNull,
    IsNotNull,
}

impl Predicate {
    /// Rewrite null comparisons into null checks.
    pub fn normalize(self) -> Self {
        match self {
            Predicate::Equals(Value::Null) => Predicate::IsNull,
            Predicate::NotEquals(Value::Null) => Predicate::IsNotNull,
            other => other,
        }
    }

    /// Operator name as used in filter JSON.
    pub fn operator(&self) -> &'static str {
        match self {
            Predicate::Equals(_) => "equals",
            Predicate::NotEquals(_) => "notEquals",
            Predicate::In(_) => "in",
            Predicate::NotIn(_) => "notIn",
            Predicate::Like(_) => "like",
            Predicate::NotLike(_) => "notLike",
            Predicate::Gt(_) => "gt",
            Predicate::Gte(_) => "gte",
            Predicate::Lt(_) => "lt",
            Predicate::Lte(_) => "lte",
            Predicate::IsNull => "is",
            Predicate::IsNotNull => "isNot",
        }
    }

    /// Evaluate against a stored value (`Null` for absent fields).
    pub fn matches(&self, stored: &Value) -> bool {
        use std::cmp::Ordering::*;

        if stored.is_null() {
            return matches!(self, Predicate::IsNull);
        }
        let cmp = |v: &Value| stored.compare(v);
        match self {
            Predicate::IsNull => false,
            Predicate::IsNotNull => true,
            Predicate::Equals(v) => cmp(v) == Some(Equal),
            Predicate::NotEquals(v) => !v.is_null() && !stored.same_as(v),
            Predicate::In(list) => list.iter().any(|v| cmp(v) == Some(Equal)),
            // `x NOT IN (.., NULL)` is never true in SQL
            Predicate::NotIn(list) => {
                !list.iter().any(Value::is_null) && !list.iter().any(|v| cmp(v) == Some(Equal))
            }
            Predicate::Like(p) => stored.as_str().is_some_and(|s| like_matches(p, s)),
            Predicate::NotLike(p) => stored.as_str().is_some_and(|s| !like_matches(p, s)),
            Predicate::Gt(v) => cmp(v) == Some(Greater),
            Predicate::Gte(v) => matches!(cmp(v), Some(Greater | Equal)),
            Predicate::Lt(v) => cmp(v) == Some(Less),
            Predicate::Lte(v) => matches!(cmp(v), Some(Less | Equal)),
        }
    }
}

/// Recursive filter: field conditions, an `and` list and an `or` list, all
/// of which must hold. Multiple predicates on one field are ANDed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Where {
    pub fields: BTreeMap<String, Vec<Predicate>>,
    pub and: Vec<Where>,
    pub or: Vec<Where>,
}

impl Where {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate on `field`.
    pub fn field(mut self, field: impl Into<String>, predicate: Predicate) -> Self {
        self.fields
            .entry(field.into())
            .or_default()
            .push(predicate.normalize());
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(field, Predicate::Equals(value.into()))
    }

    pub fn and(mut self, other: Where) -> Self {
        self.and.push(other);
        self
    }

    pub fn or(mut self, other: Where) -> Self {
        self.or.push(other);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.and.is_empty() && self.or.is_empty()
    }

    /// Evaluate against a stored document.
    pub fn matches(&self, doc: &Values) -> bool {
        let fields_match = self.fields.iter().all(|(name, predicates)| {
            let stored = doc.get(name).unwrap_or(&Value::Null);
            predicates.iter().all(|p| p.matches(stored))
        });
        fields_match
            && self.and.iter().all(|w| w.matches(doc))
            && (self.or.is_empty() || self.or.iter().any(|w| w.matches(doc)))
    }

    /// Parse a filter object such as `{"age": {"gte": 18}, "or": [...]}`.
    ///
    /// A bare value on a field (`{"name": "Matti"}`) is shorthand for `equals`.
    pub fn from_json(fields: &FieldMap, json: &Json) -> Result<Self, FilterError> {
        let object = json
            .as_object()
            .ok_or_else(|| FilterError::Malformed("filter must be an object".into()))?;
        let mut out = Where::new();

        for (key, item) in object {
            match key.as_str() {
                "and" | "or" => {
                    let items = item.as_array().ok_or_else(|| {
                        FilterError::Malformed(format!("'{key}' must be an array of filters"))
                    })?;
                    let nested = items
                        .iter()
                        .map(|w| Where::from_json(fields, w))
                        .collect::<Result<Vec<_>, _>>()?;
                    if key == "and" {
                        out.and.extend(nested);
                    } else {
                        out.or.extend(nested);
                    }
                }
                name => {
                    let data_type = field_type(fields, name)
                        .ok_or_else(|| FilterError::UnknownField(name.to_string()))?;
                    match item.as_object() {
                        Some(ops) if data_type != DataType::Json || is_operator_object(item) => {
                            for (op, operand) in ops {
                                let predicate = parse_predicate(name, data_type, op, operand)?;
                                out = out.field(name, predicate);
                            }
                        }
                        _ => {
                            let predicate = parse_predicate(name, data_type, "equals", item)?;
                            out = out.field(name, predicate);
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

const OPERATORS: [&str; 12] = [
    "equals", "notEquals", "in", "notIn", "like", "notLike", "gt", "gte", "lt", "lte", "is",
    "isNot",
];

fn is_operator_object(json: &Json) -> bool {
    json.as_object()
        .is_some_and(|m| !m.is_empty() && m.keys().all(|k| OPERATORS.contains(&k.as_str())))
}

fn parse_predicate(
    field: &str,
    data_type: DataType,
    operator: &str,
    operand: &Json,
) -> Result<Predicate, FilterError> {
    let invalid = |message: String| FilterError::InvalidValue {
        field: field.to_string(),
        operator: operator.to_string(),
        message,
    };
    let unsupported = || FilterError::UnsupportedOperator {
        field: field.to_string(),
        operator: operator.to_string(),
    };
    let scalar = |json: &Json| Value::from_json(data_type, json).map_err(invalid);
    let list = |json: &Json| -> Result<Vec<Value>, FilterError> {
        json.as_array()
            .ok_or_else(|| invalid("expected an array".into()))?
            .iter()
            .map(|v| Value::from_json(data_type, v).map_err(invalid))
            .collect()
    };
    let pattern = |json: &Json| -> Result<String, FilterError> {
        if !data_type.is_string_like() {
            return Err(unsupported());
        }
        json.as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid("expected a string pattern".into()))
    };
    let ordered = |json: &Json| -> Result<Value, FilterError> {
        if !data_type.is_ordered() {
            return Err(unsupported());
        }
        scalar(json)
    };
    let null_only = |json: &Json| -> Result<(), FilterError> {
        if json.is_null() {
            Ok(())
        } else {
            Err(invalid("only null is supported".into()))
        }
    };

    Ok(match operator {
        "equals" => Predicate::Equals(scalar(operand)?),
        "notEquals" => Predicate::NotEquals(scalar(operand)?),
        "in" => Predicate::In(list(operand)?),
        "notIn" => Predicate::NotIn(list(operand)?),
        "like" => Predicate::Like(pattern(operand)?),
        "notLike" => Predicate::NotLike(pattern(operand)?),
        "gt" => Predicate::Gt(ordered(operand)?),
        "gte" => Predicate::Gte(ordered(operand)?),
        "lt" => Predicate::Lt(ordered(operand)?),
        "lte" => Predicate::Lte(ordered(operand)?),
        "is" => {
            null_only(operand)?;
            Predicate::IsNull
        }
        "isNot" => {
            null_only(operand)?;
            Predicate::IsNotNull
        }
        _ => return Err(unsupported()),
    }
    .normalize())
}
