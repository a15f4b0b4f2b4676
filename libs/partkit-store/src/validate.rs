//! Field constraint checks applied by every adapter on write and read.

use std::fmt;

use crate::field::{DataType, Field, FieldMap, ID_FIELD};
use crate::value::{Value, Values};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub constraint: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            constraint: constraint.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.constraint)
    }
}

/// Every constraint violation found in one write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    pub fn single(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self::new(vec![ValidationIssue::new(field, constraint)])
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("validation failed: ")?;
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Every non-nullable field must be present; missing nullable fields become null.
    Create,
    /// Only the supplied fields are checked.
    Update,
}

/// Validate application values and turn them into stored values.
///
/// Per field: schema check on the application value, `serialize` transform,
/// then type, nullability, length and integer-size checks on the stored value.
pub fn prepare_write(
    fields: &FieldMap,
    values: Values,
    mode: WriteMode,
) -> Result<Values, ValidationError> {
    let mut issues = Vec::new();
    let mut out = Values::new();

    for (name, value) in values {
        if name == ID_FIELD {
            issues.push(ValidationIssue::new(name, "is generated and cannot be written"));
            continue;
        }
        let Some(field) = fields.get(&name) else {
            issues.push(ValidationIssue::new(name, "unknown field"));
            continue;
        };
        match check_field(&name, field, value) {
            Ok(stored) => {
                out.insert(name, stored);
            }
            Err(mut found) => issues.append(&mut found),
        }
    }

    if mode == WriteMode::Create {
        for (name, field) in fields {
            if out.contains_key(name) || issues.iter().any(|i| &i.field == name) {
                continue;
            }
            if field.nullable {
                out.insert(name.clone(), Value::Null);
            } else {
                issues.push(ValidationIssue::new(name, "is required"));
            }
        }
    }

    if issues.is_empty() {
        Ok(out)
    } else {
        Err(ValidationError::new(issues))
    }
}

fn check_field(name: &str, field: &Field, value: Value) -> Result<Value, Vec<ValidationIssue>> {
    let issue = |constraint: String| vec![ValidationIssue::new(name, constraint)];

    if value.is_null() {
        return if field.nullable {
            Ok(Value::Null)
        } else {
            Err(issue("is not nullable".into()))
        };
    }

    if let Some(schema) = &field.schema {
        let outcome = schema.validate(&value.to_json());
        if !outcome.success {
            return Err(outcome
                .issues
                .iter()
                .map(|i| ValidationIssue::new(name, format!("schema: {i}")))
                .collect());
        }
    }

    let value = match &field.transform {
        Some(transform) => transform
            .serialize(value)
            .map_err(|e| issue(format!("serialize failed: {e}")))?,
        None => value,
    };

    let value = coerce(field.data_type, value).map_err(issue)?;

    match (&value, field.data_type) {
        (Value::String(s), _) => {
            if let Some(max) = field.length {
                if s.chars().count() > max {
                    return Err(issue(format!("length exceeds {max} characters")));
                }
            }
        }
        (Value::Blob(bytes), _) => {
            if let Some(max) = field.length {
                if bytes.len() > max {
                    return Err(issue(format!("length exceeds {max} bytes")));
                }
            }
        }
        (Value::Integer(i), DataType::Integer) => {
            let (min, max) = field.integer_bounds();
            if *i < min || *i > max {
                return Err(issue(format!("out of range for {}-bit integer", field.size)));
            }
        }
        _ => {}
    }

    Ok(value)
}

/// Check that a stored value has the variant a field type expects.
/// Integers are accepted for float fields; float precision is not checked.
fn coerce(data_type: DataType, value: Value) -> Result<Value, String> {
    match (data_type, value) {
        (DataType::String | DataType::Reference, v @ Value::String(_)) => Ok(v),
        (DataType::Boolean, v @ Value::Bool(_)) => Ok(v),
        (DataType::Integer, v @ Value::Integer(_)) => Ok(v),
        (DataType::Float, v @ Value::Float(_)) => Ok(v),
        (DataType::Float, Value::Integer(i)) => Ok(Value::Float(i as f64)),
        (DataType::Blob, v @ Value::Blob(_)) => Ok(v),
        (DataType::Date, v @ Value::Date(_)) => Ok(v),
        (DataType::Json, v @ Value::Json(_)) => Ok(v),
        (DataType::Json, other) => Ok(Value::Json(other.to_json())),
        (data_type, other) => Err(format!("expected {data_type}, got {}", other.kind())),
    }
}

/// Turn a stored row into application values: `deserialize`, then schema check.
pub fn decode_read(fields: &FieldMap, stored: Values) -> Result<Values, ValidationError> {
    let mut issues = Vec::new();
    let mut out = Values::new();
    for (name, value) in stored {
        let Some(field) = fields.get(&name) else {
            out.insert(name, value);
            continue;
        };
        if value.is_null() {
            out.insert(name, value);
            continue;
        }
        let value = match &field.transform {
            Some(transform) => match transform.deserialize(value) {
                Ok(v) => v,
                Err(e) => {
                    issues.push(ValidationIssue::new(&name, format!("deserialize failed: {e}")));
                    continue;
                }
            },
            None => value,
        };
        if let Some(schema) = &field.schema {
            let outcome = schema.validate(&value.to_json());
            if !outcome.success {
                issues.extend(
                    outcome
                        .issues
                        .iter()
                        .map(|i| ValidationIssue::new(&name, format!("schema: {i}"))),
                );
                continue;
            }
        }
        out.insert(name, value);
    }
    if issues.is_empty() {
        Ok(out)
    } else {
        Err(ValidationError::new(issues))
    }
}
