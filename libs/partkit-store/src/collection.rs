//! Store, collection and document contracts implemented by every adapter.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::field::{Field, FieldMap, ID_FIELD};
use crate::filter::Where;
use crate::query::FindOptions;
use crate::value::Values;

/// Declaration of a collection: name plus its fields. The `id` field is implicit.
#[derive(Debug, Clone)]
pub struct CollectionDef {
    pub name: String,
    pub fields: FieldMap,
}

impl CollectionDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: FieldMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Adapter name used in logs.
    fn kind(&self) -> &'static str;

    async fn create_collection(&self, def: CollectionDef)
        -> Result<Arc<dyn Collection>, StoreError>;
}

/// Shared handle to a store, the output type of store parts.
pub type SharedStore = Arc<dyn DocumentStore>;

#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// Snapshot of the current field map.
    fn fields(&self) -> FieldMap;

    /// Declare an additional field. Whether this is allowed after the
    /// collection was synced depends on the adapter.
    fn add_field(&self, name: &str, field: Field) -> Result<(), StoreError>;

    async fn create(&self, values: Values) -> Result<DocumentRef, StoreError>;

    async fn find(&self, options: FindOptions) -> Result<Vec<DocumentRef>, StoreError>;

    async fn count(&self, filter: Option<Where>) -> Result<u64, StoreError>;
}

/// Reference to one stored document.
///
/// A handle is not guarded after `delete`; later calls report `NotFound`.
#[async_trait]
pub trait DocumentHandle: Send + Sync {
    fn id(&self) -> &str;

    /// Current values, including `id`.
    async fn get(&self) -> Result<Values, StoreError>;

    /// Partial write; only the supplied fields are validated and changed.
    async fn update(&self, values: Values) -> Result<(), StoreError>;

    async fn delete(&self) -> Result<(), StoreError>;
}

pub type DocumentRef = Arc<dyn DocumentHandle>;

/// Look a document up by `id` equality.
pub async fn find_by_id(
    collection: &dyn Collection,
    id: &str,
) -> Result<Option<DocumentRef>, StoreError> {
    let options = FindOptions::new()
        .filter(Where::new().eq(ID_FIELD, id))
        .limit(1);
    Ok(collection.find(options).await?.into_iter().next())
}
