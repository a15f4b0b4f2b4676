//! JSON Schemas derived from a collection's field map.

use partkit::merge::deep_merge;
use partkit_store::{DataType, Field, FieldMap, ID_FIELD};
use serde_json::{json, Map, Value as Json};

pub const AUTHORIZATION: &str = "authorization";

fn base_schema(field: &Field) -> Json {
    match field.data_type {
        DataType::String => match field.length {
            Some(max) => json!({"type": "string", "maxLength": max}),
            None => json!({"type": "string"}),
        },
        DataType::Reference => json!({"type": "string"}),
        DataType::Boolean => json!({"type": "boolean"}),
        DataType::Integer => {
            let (min, max) = field.integer_bounds();
            json!({"type": "integer", "minimum": min, "maximum": max})
        }
        DataType::Float => json!({"type": "number"}),
        DataType::Blob => json!({"type": "string", "contentEncoding": "base64"}),
        DataType::Date => json!({"type": "string", "format": "date-time"}),
        DataType::Json => json!({}),
    }
}

fn or_null(schema: Json) -> Json {
    json!({"anyOf": [schema, {"type": "null"}]})
}

/// Schema of a stored value: type constraints, the field's own schema
/// merged on top, `null` admitted for nullable fields.
pub fn value_schema(field: &Field) -> Json {
    let mut schema = base_schema(field);
    if let Some(custom) = &field.schema {
        deep_merge(&mut schema, custom.to_json_schema());
    }
    if field.nullable {
        or_null(schema)
    } else {
        schema
    }
}

fn object(properties: Map<String, Json>, required: Vec<String>) -> Json {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// A stored document: every field plus `id`, all present.
pub fn document_schema(fields: &FieldMap) -> Json {
    let mut properties = Map::new();
    properties.insert(ID_FIELD.to_string(), json!({"type": "string"}));
    let mut required = vec![ID_FIELD.to_string()];
    for (name, field) in fields {
        properties.insert(name.clone(), value_schema(field));
        required.push(name.clone());
    }
    object(properties, required)
}

/// Writable data. `partial` drops the required list (updates).
pub fn data_schema(fields: &FieldMap, partial: bool) -> Json {
    let properties: Map<String, Json> = fields
        .iter()
        .map(|(name, field)| (name.clone(), value_schema(field)))
        .collect();
    let required = if partial {
        Vec::new()
    } else {
        fields
            .iter()
            .filter(|(_, field)| !field.nullable)
            .map(|(name, _)| name.clone())
            .collect()
    };
    object(properties, required)
}

/// Operator object accepted for one field in a `where` clause.
fn filter_schema(field: &Field) -> Json {
    let value = base_schema(field);
    let nullable_value = or_null(value.clone());
    let mut ops = Map::new();
    ops.insert("equals".into(), nullable_value.clone());
    ops.insert("notEquals".into(), nullable_value.clone());
    ops.insert("in".into(), json!({"type": "array", "items": nullable_value}));
    ops.insert("notIn".into(), json!({"type": "array", "items": or_null(value.clone())}));
    if field.data_type.is_string_like() {
        ops.insert("like".into(), json!({"type": "string"}));
        ops.insert("notLike".into(), json!({"type": "string"}));
    }
    if field.data_type.is_ordered() {
        for op in ["gt", "gte", "lt", "lte"] {
            ops.insert(op.into(), value.clone());
        }
    }
    if field.nullable {
        ops.insert("is".into(), json!({"type": "null"}));
        ops.insert("isNot".into(), json!({"type": "null"}));
    }
    json!({"type": "object", "properties": ops, "additionalProperties": false})
}

/// JSON pointer token escaping (RFC 6901).
fn pointer_token(name: &str) -> String {
    name.replace('~', "~0").replace('/', "~1")
}

fn filter_def(name: &str) -> String {
    format!("filter:{name}")
}

/// `$defs` holding the recursive `where` schema and one operator object per field.
pub fn where_defs(fields: &FieldMap) -> Json {
    let id = Field::string();
    let all = std::iter::once((ID_FIELD, &id)).chain(fields.iter().map(|(n, f)| (n.as_str(), f)));

    let mut defs = Map::new();
    let mut properties = Map::new();
    for (name, field) in all {
        let def = filter_def(name);
        let reference = format!("#/$defs/{}", pointer_token(&def));
        let shorthand = if field.data_type == DataType::Json {
            // a JSON value could look like an operator object, so only the operator form is accepted
            json!({"$ref": reference})
        } else {
            json!({"anyOf": [or_null(base_schema(field)), {"$ref": reference}]})
        };
        properties.insert(name.to_string(), shorthand);
        defs.insert(def, filter_schema(field));
    }
    let nested = json!({"type": "array", "items": {"$ref": "#/$defs/where"}});
    properties.insert("and".into(), nested.clone());
    properties.insert("or".into(), nested);
    defs.insert(
        "where".into(),
        json!({"type": "object", "properties": properties, "additionalProperties": false}),
    );
    Json::Object(defs)
}

fn order_schema(fields: &FieldMap) -> Json {
    let mut names = vec![ID_FIELD.to_string()];
    names.extend(fields.keys().cloned());
    json!({
        "type": "array",
        "items": {
            "type": "array",
            "prefixItems": [{"enum": names}, {"enum": ["ASC", "DESC", "asc", "desc"]}],
            "minItems": 2,
            "maxItems": 2,
        }
    })
}

fn page_schema() -> Json {
    json!({"type": "integer", "minimum": 0})
}

pub fn find_input(fields: &FieldMap) -> Json {
    json!({
        "type": "object",
        "properties": {
            "where": {"$ref": "#/$defs/where"},
            "order": order_schema(fields),
            "limit": page_schema(),
            "offset": page_schema(),
        },
        "additionalProperties": false,
        "$defs": where_defs(fields),
    })
}

pub fn count_input(fields: &FieldMap) -> Json {
    json!({
        "type": "object",
        "properties": {"where": {"$ref": "#/$defs/where"}},
        "additionalProperties": false,
        "$defs": where_defs(fields),
    })
}

/// Input object with the given required properties.
pub fn input(properties: Vec<(&str, Json)>) -> Json {
    let required: Vec<String> = properties.iter().map(|(k, _)| k.to_string()).collect();
    let properties: Map<String, Json> = properties
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    object(properties, required)
}

pub fn id_schema() -> Json {
    json!({"type": "string"})
}

/// Add a required `authorization` string to an input schema.
pub fn with_authorization(mut schema: Json) -> Json {
    deep_merge(
        &mut schema,
        json!({"properties": {AUTHORIZATION: {"type": "string"}}}),
    );
    if let Some(map) = schema.as_object_mut() {
        let required = map
            .entry("required")
            .or_insert_with(|| Json::Array(Vec::new()));
        if let Some(list) = required.as_array_mut() {
            list.push(json!(AUTHORIZATION));
        }
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use partkit_store::{JsonSchema, ValueSchema};

    fn people() -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), Field::string().length(10));
        fields.insert("age".into(), Field::integer().size(8).nullable());
        fields.insert("active".into(), Field::boolean());
        fields
    }

    fn valid(schema: &Json, value: Json) -> bool {
        JsonSchema::new(schema.clone()).validate(&value).success
    }

    #[test]
    fn order_pairs_are_checked_by_the_input_schema() {
        let find = find_input(&people());
        assert!(valid(&find, json!({"order": [["age", "DESC"], ["id", "asc"]]})));
        assert!(!valid(&find, json!({"order": [["nope"]]})));
        assert!(!valid(&find, json!({"order": [["age"]]})));
        assert!(!valid(&find, json!({"order": [["age", "UP"]]})));
        assert!(!valid(&find, json!({"order": [["age", "ASC", "again"]]})));
    }

    #[test]
    fn data_schema_requires_non_nullable_fields() {
        let create = data_schema(&people(), false);
        assert!(valid(&create, json!({"name": "Aino", "active": true})));
        assert!(valid(&create, json!({"name": "Aino", "active": true, "age": null})));
        assert!(!valid(&create, json!({"name": "Aino"})));
        assert!(!valid(&create, json!({"name": "Aino", "active": true, "age": 300})));
        assert!(!valid(&create, json!({"name": "Aino", "active": true, "extra": 1})));

        let update = data_schema(&people(), true);
        assert!(valid(&update, json!({"age": 3})));
        assert!(!valid(&update, json!({"name": "much too long"})));
    }

    #[test]
    fn custom_field_schema_is_merged() {
        let mut fields = FieldMap::new();
        fields.insert(
            "email".into(),
            Field::string().schema(JsonSchema::new(json!({"pattern": "^[^@]+@[^@]+$"}))),
        );
        let schema = data_schema(&fields, false);
        assert!(valid(&schema, json!({"email": "a@b"})));
        assert!(!valid(&schema, json!({"email": "nope"})));
    }

    #[test]
    fn where_schema_offers_operators_by_type() {
        let find = find_input(&people());
        let ok = |w: Json| valid(&find, json!({"where": w}));

        assert!(ok(json!({"name": "Aino"})));
        assert!(ok(json!({"name": {"like": "A%"}})));
        assert!(ok(json!({"age": {"gte": 18, "lt": 65}})));
        assert!(ok(json!({"age": {"is": null}})));
        assert!(ok(json!({"id": {"in": ["a", "b"]}})));
        assert!(ok(json!({"or": [{"name": "a"}, {"and": [{"age": {"lt": 3}}]}]})));

        assert!(!ok(json!({"active": {"like": "t%"}})));
        assert!(!ok(json!({"active": {"gt": true}})));
        assert!(!ok(json!({"name": {"is": null}})));
        assert!(!ok(json!({"unknown": 1})));
        assert!(!ok(json!({"or": [{"name": {"between": 1}}]})));
    }

    #[test]
    fn order_and_paging() {
        let find = find_input(&people());
        assert!(valid(&find, json!({"order": [["name", "ASC"]], "limit": 5, "offset": 0})));
        assert!(!valid(&find, json!({"limit": -1})));
    }

    #[test]
    fn authorization_becomes_required() {
        let schema = with_authorization(input(vec![("id", id_schema())]));
        assert!(valid(&schema, json!({"id": "x", "authorization": "secret"})));
        assert!(!valid(&schema, json!({"id": "x"})));
        assert_eq!(schema["required"], json!(["id", "authorization"]));

        let open = with_authorization(count_input(&people()));
        assert_eq!(open["required"], json!(["authorization"]));
        assert!(valid(&open, json!({"authorization": "s", "where": {"age": 3}})));
    }
}
