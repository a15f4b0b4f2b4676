//! # PartKit Store
//!
//! Field model, the `Where` filter DSL and document store adapters.
//!
//! Every adapter implements the same contracts ([`DocumentStore`],
//! [`Collection`], [`DocumentHandle`]) and the same semantics: writes are
//! validated against the field map, filters follow SQL null semantics and
//! `like` is case-sensitive.
//!
//! - [`MemoryStore`]: in-process, ready immediately
//! - [`SqlStore`]: SQLite through `sqlx`, connected by the application's `connect` trigger
//! - [`document_filter`]: filter documents for MongoDB-style databases

pub mod collection;
pub mod document_filter;
pub mod error;
pub mod field;
pub mod filter;
pub mod gate;
pub mod like;
pub mod memory;
pub mod parts;
pub mod query;
pub mod schema;
pub mod sql;
pub mod sql_filter;
pub mod validate;
pub mod value;

pub use collection::{
    find_by_id, Collection, CollectionDef, DocumentHandle, DocumentRef, DocumentStore, SharedStore,
};
pub use document_filter::{document_filter, document_sort};
pub use error::StoreError;
pub use field::{DataType, Field, FieldMap, FieldTransform, ID_FIELD};
pub use filter::{FilterError, Predicate, Where};
pub use gate::ConnectionGate;
pub use like::{like_matches, like_to_regex};
pub use memory::MemoryStore;
pub use parts::{memory_store_part, sql_store_part};
pub use query::{Direction, FindOptions, SortingRule};
pub use schema::{JsonSchema, SchemaIssue, SchemaOutcome, ValueSchema};
pub use sql::SqlStore;
pub use validate::{ValidationError, ValidationIssue};
pub use value::{values_from_json, values_to_json, Value, Values};
