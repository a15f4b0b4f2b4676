//! Validation schemas attached to fields and operations.
//!
//! The store only depends on the [`ValueSchema`] contract. [`JsonSchema`] is the
//! bundled implementation and understands the subset of JSON Schema used by the
//! generated CRUD operations: `type`, `enum`, `const`, `minLength`,
//! `maxLength`, `pattern`, `format: date-time`, `minimum`, `maximum`,
//! `properties`, `required`, `additionalProperties`, `items`, `prefixItems`,
//! `minItems`, `maxItems`, `anyOf` and local `$ref`s into `#/$defs`.

use std::fmt;

use regex::Regex;
use serde_json::{Map, Value as Json};

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    /// JSON pointer of the offending value, empty for the root.
    pub path: String,
    pub message: String,
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaOutcome {
    pub success: bool,
    pub issues: Vec<SchemaIssue>,
}

impl SchemaOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            issues: Vec::new(),
        }
    }

    pub fn from_issues(issues: Vec<SchemaIssue>) -> Self {
        Self {
            success: issues.is_empty(),
            issues,
        }
    }

    /// Issues joined into one human-readable line.
    pub fn message(&self) -> String {
        self.issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Opaque validation schema.
pub trait ValueSchema: Send + Sync + fmt::Debug {
    fn validate(&self, value: &Json) -> SchemaOutcome;

    /// JSON Schema rendition, embedded into generated operation schemas.
    fn to_json_schema(&self) -> Json;
}

/// JSON Schema document validated by the built-in subset validator.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonSchema(Json);

impl JsonSchema {
    pub fn new(schema: Json) -> Self {
        Self(schema)
    }

    /// Schema accepting every value.
    pub fn any() -> Self {
        Self(Json::Object(Map::new()))
    }

    pub fn as_json(&self) -> &Json {
        &self.0
    }

    pub fn into_json(self) -> Json {
        self.0
    }
}

impl From<Json> for JsonSchema {
    fn from(value: Json) -> Self {
        Self(value)
    }
}

impl ValueSchema for JsonSchema {
    fn validate(&self, value: &Json) -> SchemaOutcome {
        let mut issues = Vec::new();
        Validator { root: &self.0 }.check(&self.0, value, "", &mut issues, 0);
        SchemaOutcome::from_issues(issues)
    }

    fn to_json_schema(&self) -> Json {
        self.0.clone()
    }
}

const MAX_REF_DEPTH: usize = 64;

struct Validator<'a> {
    root: &'a Json,
}

impl<'a> Validator<'a> {
    fn check(
        &self,
        schema: &'a Json,
        value: &Json,
        path: &str,
        issues: &mut Vec<SchemaIssue>,
        depth: usize,
    ) {
        let issue = |issues: &mut Vec<SchemaIssue>, message: String| {
            issues.push(SchemaIssue {
                path: path.to_string(),
                message,
            })
        };

        let schema = match schema {
            Json::Bool(true) => return,
            Json::Bool(false) => return issue(issues, "no value is allowed here".into()),
            Json::Object(map) => map,
            _ => return,
        };

        if let Some(Json::String(reference)) = schema.get("$ref") {
            if depth >= MAX_REF_DEPTH {
                return issue(issues, format!("reference '{reference}' nests too deeply"));
            }
            match self.resolve_ref(reference) {
                Some(target) => self.check(target, value, path, issues, depth + 1),
                None => issue(issues, format!("unresolvable reference '{reference}'")),
            }
        }

        if let Some(expected) = schema.get("type") {
            let matches = match expected {
                Json::String(t) => type_matches(t, value),
                Json::Array(ts) => ts.iter().filter_map(Json::as_str).any(|t| type_matches(t, value)),
                _ => true,
            };
            if !matches {
                let expected = match expected {
                    Json::Array(ts) => ts
                        .iter()
                        .filter_map(Json::as_str)
                        .collect::<Vec<_>>()
                        .join(" or "),
                    other => other.as_str().unwrap_or("?").to_string(),
                };
                // no point checking keywords of the wrong type
                return issue(issues, format!("expected {expected}, got {}", type_name(value)));
            }
        }

        if let Some(Json::Array(options)) = schema.get("enum") {
            if !options.contains(value) {
                issue(issues, format!("value is not one of {}", Json::Array(options.clone())));
            }
        }
        if let Some(constant) = schema.get("const") {
            if constant != value {
                issue(issues, format!("value must equal {constant}"));
            }
        }

        match value {
            Json::String(s) => self.check_string(schema, s, path, issues),
            Json::Number(n) => {
                if let Some(n) = n.as_f64() {
                    if let Some(min) = schema.get("minimum").and_then(Json::as_f64) {
                        if n < min {
                            issue(issues, format!("must be >= {min}"));
                        }
                    }
                    if let Some(max) = schema.get("maximum").and_then(Json::as_f64) {
                        if n > max {
                            issue(issues, format!("must be <= {max}"));
                        }
                    }
                }
            }
            Json::Object(object) => self.check_object(schema, object, path, issues, depth),
            Json::Array(items) => self.check_array(schema, items, path, issues, depth),
            _ => {}
        }

        if let Some(Json::Array(options)) = schema.get("anyOf") {
            let any = options.iter().any(|option| {
                let mut scratch = Vec::new();
                self.check(option, value, path, &mut scratch, depth);
                scratch.is_empty()
            });
            if !any {
                issue(issues, "value does not match any allowed shape".into());
            }
        }
    }

    fn check_array(
        &self,
        schema: &'a Map<String, Json>,
        items: &[Json],
        path: &str,
        issues: &mut Vec<SchemaIssue>,
        depth: usize,
    ) {
        if let Some(min) = schema.get("minItems").and_then(Json::as_u64) {
            if (items.len() as u64) < min {
                issues.push(SchemaIssue {
                    path: path.to_string(),
                    message: format!("must have at least {min} items"),
                });
            }
        }
        if let Some(max) = schema.get("maxItems").and_then(Json::as_u64) {
            if items.len() as u64 > max {
                issues.push(SchemaIssue {
                    path: path.to_string(),
                    message: format!("must have at most {max} items"),
                });
            }
        }

        // positional schemas first, `items` covers the rest
        let prefix: &[Json] = match schema.get("prefixItems") {
            Some(Json::Array(prefix)) => prefix,
            _ => &[],
        };
        for (i, item) in items.iter().enumerate() {
            if let Some(item_schema) = prefix.get(i).or_else(|| schema.get("items")) {
                self.check(item_schema, item, &format!("{path}/{i}"), issues, depth);
            }
        }
    }

    fn check_string(
        &self,
        schema: &Map<String, Json>,
        s: &str,
        path: &str,
        issues: &mut Vec<SchemaIssue>,
    ) {
        let len = s.chars().count() as u64;
        let mut push = |message: String| {
            issues.push(SchemaIssue {
                path: path.to_string(),
                message,
            })
        };
        if let Some(min) = schema.get("minLength").and_then(Json::as_u64) {
            if len < min {
                push(format!("must be at least {min} characters"));
            }
        }
        if let Some(max) = schema.get("maxLength").and_then(Json::as_u64) {
            if len > max {
                push(format!("must be at most {max} characters"));
            }
        }
        if let Some(pattern) = schema.get("pattern").and_then(Json::as_str) {
            match Regex::new(pattern) {
                Ok(re) if re.is_match(s) => {}
                Ok(_) => push(format!("does not match pattern '{pattern}'")),
                Err(_) => push(format!("invalid pattern '{pattern}' in schema")),
            }
        }
        if schema.get("format").and_then(Json::as_str) == Some("date-time")
            && chrono::DateTime::parse_from_rfc3339(s).is_err()
        {
            push("must be an RFC 3339 date-time".into());
        }
    }

    fn check_object(
        &self,
        schema: &'a Map<String, Json>,
        object: &Map<String, Json>,
        path: &str,
        issues: &mut Vec<SchemaIssue>,
        depth: usize,
    ) {
        if let Some(Json::Array(required)) = schema.get("required") {
            for key in required.iter().filter_map(Json::as_str) {
                if !object.contains_key(key) {
                    issues.push(SchemaIssue {
                        path: format!("{path}/{key}"),
                        message: "is required".into(),
                    });
                }
            }
        }

        let properties = schema.get("properties").and_then(Json::as_object);
        let additional = schema.get("additionalProperties");
        for (key, item) in object {
            let item_path = format!("{path}/{key}");
            match properties.and_then(|p| p.get(key)) {
                Some(property) => self.check(property, item, &item_path, issues, depth),
                None => match additional {
                    Some(Json::Bool(false)) => issues.push(SchemaIssue {
                        path: item_path,
                        message: "unknown property".into(),
                    }),
                    Some(extra @ Json::Object(_)) => {
                        self.check(extra, item, &item_path, issues, depth)
                    }
                    _ => {}
                },
            }
        }
    }

    fn resolve_ref(&self, reference: &str) -> Option<&'a Json> {
        if reference == "#" {
            return Some(self.root);
        }
        let pointer = reference.strip_prefix('#')?;
        self.root.pointer(pointer)
    }
}

fn type_matches(expected: &str, value: &Json) -> bool {
    match expected {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn type_name(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
