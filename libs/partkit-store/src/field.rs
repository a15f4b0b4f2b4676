//! Typed field descriptors shared by every document store.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::schema::ValueSchema;
use crate::value::Value;

/// Name of the generated identifier every document carries.
pub const ID_FIELD: &str = "id";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Boolean,
    Integer,
    Float,
    Blob,
    Date,
    Reference,
    Json,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Blob => "blob",
            DataType::Date => "date",
            DataType::Reference => "reference",
            DataType::Json => "json",
        }
    }

    /// Supports `like` / `notLike`.
    pub fn is_string_like(self) -> bool {
        matches!(self, DataType::String | DataType::Reference)
    }

    /// Supports `gt` / `gte` / `lt` / `lte`.
    pub fn is_ordered(self) -> bool {
        matches!(
            self,
            DataType::Integer
                | DataType::Float
                | DataType::Date
                | DataType::String
                | DataType::Reference
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversion between the application-level value and the stored value.
///
/// `serialize` runs on write after schema validation, `deserialize` on read
/// before schema validation.
pub trait FieldTransform: Send + Sync {
    fn serialize(&self, value: Value) -> anyhow::Result<Value>;
    fn deserialize(&self, value: Value) -> anyhow::Result<Value>;
}

/// Integer bit widths a field may be constrained to.
pub const INTEGER_SIZES: [u8; 4] = [8, 16, 32, 64];

#[derive(Clone)]
pub struct Field {
    pub data_type: DataType,
    pub nullable: bool,
    pub unique: bool,
    /// Max characters for strings, max bytes for blobs.
    pub length: Option<usize>,
    /// Integer bit width.
    pub size: u8,
    /// Target collection of a reference.
    pub reference: Option<String>,
    pub schema: Option<Arc<dyn ValueSchema>>,
    pub transform: Option<Arc<dyn FieldTransform>>,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("data_type", &self.data_type)
            .field("nullable", &self.nullable)
            .field("unique", &self.unique)
            .field("length", &self.length)
            .field("size", &self.size)
            .field("reference", &self.reference)
            .field("schema", &self.schema.is_some())
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl Field {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            nullable: false,
            unique: false,
            length: None,
            size: 64,
            reference: None,
            schema: None,
            transform: None,
        }
    }

    pub fn string() -> Self {
        Self::new(DataType::String)
    }

    pub fn boolean() -> Self {
        Self::new(DataType::Boolean)
    }

    pub fn integer() -> Self {
        Self::new(DataType::Integer)
    }

    pub fn float() -> Self {
        Self::new(DataType::Float)
    }

    pub fn blob() -> Self {
        Self::new(DataType::Blob)
    }

    pub fn date() -> Self {
        Self::new(DataType::Date)
    }

    pub fn json() -> Self {
        Self::new(DataType::Json)
    }

    pub fn reference(target: impl Into<String>) -> Self {
        Self {
            reference: Some(target.into()),
            ..Self::new(DataType::Reference)
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// Bit width for integer fields; values other than 8/16/32/64 fall back to 64.
    pub fn size(mut self, bits: u8) -> Self {
        self.size = if INTEGER_SIZES.contains(&bits) { bits } else { 64 };
        self
    }

    pub fn schema(mut self, schema: impl ValueSchema + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    pub fn transform(mut self, transform: impl FieldTransform + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Inclusive bounds of an integer field.
    pub fn integer_bounds(&self) -> (i64, i64) {
        match self.size {
            8 => (i8::MIN as i64, i8::MAX as i64),
            16 => (i16::MIN as i64, i16::MAX as i64),
            32 => (i32::MIN as i64, i32::MAX as i64),
            _ => (i64::MIN, i64::MAX),
        }
    }
}

/// Field name → descriptor. Iteration order is the column order of SQL tables.
pub type FieldMap = BTreeMap<String, Field>;

/// Data type of `name` in `fields`; the generated `id` is always a string.
pub fn field_type(fields: &FieldMap, name: &str) -> Option<DataType> {
    if name == ID_FIELD {
        return Some(DataType::String);
    }
    fields.get(name).map(|f| f.data_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_constraints() {
        let f = Field::string().length(80).nullable().unique();
        assert_eq!(f.data_type, DataType::String);
        assert_eq!(f.length, Some(80));
        assert!(f.nullable && f.unique);
        assert_eq!(f.size, 64);
    }

    #[test]
    fn integer_bounds_follow_size() {
        assert_eq!(Field::integer().size(8).integer_bounds(), (-128, 127));
        assert_eq!(Field::integer().size(12).size, 64);
    }

    #[test]
    fn id_is_always_a_string() {
        let fields = FieldMap::new();
        assert_eq!(field_type(&fields, "id"), Some(DataType::String));
        assert_eq!(field_type(&fields, "name"), None);
    }
}
