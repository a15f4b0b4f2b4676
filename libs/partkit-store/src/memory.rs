//! In-process document store.
//!
//! Ready as soon as it is created; fields can be added at any time. Field maps
//! are read as snapshots, so a field added while a query runs is only seen by
//! later queries.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::collection::{Collection, CollectionDef, DocumentHandle, DocumentRef, DocumentStore};
use crate::error::StoreError;
use crate::field::{Field, FieldMap, ID_FIELD};
use crate::filter::Where;
use crate::query::{compare_documents, page, FindOptions};
use crate::validate::{decode_read, prepare_write, WriteMode};
use crate::value::{Value, Values};

#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, Arc<CollectionState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn create_collection(
        &self,
        def: CollectionDef,
    ) -> Result<Arc<dyn Collection>, StoreError> {
        use dashmap::mapref::entry::Entry;

        match self.collections.entry(def.name.clone()) {
            Entry::Occupied(_) => Err(StoreError::CollectionExists(def.name)),
            Entry::Vacant(slot) => {
                tracing::debug!(collection = %def.name, fields = def.fields.len(), "memory collection created");
                let state = Arc::new(CollectionState {
                    name: def.name,
                    fields: RwLock::new(def.fields),
                    rows: RwLock::new(Vec::new()),
                });
                slot.insert(state.clone());
                Ok(Arc::new(MemoryCollection(state)))
            }
        }
    }
}

struct CollectionState {
    name: String,
    fields: RwLock<FieldMap>,
    /// Documents in insertion order; stored values include `id`.
    rows: RwLock<Vec<Values>>,
}

impl CollectionState {
    fn row_id(row: &Values) -> Option<&str> {
        row.get(ID_FIELD).and_then(Value::as_str)
    }

    /// First unique field whose value in `candidate` is already taken by another row.
    fn unique_conflict(
        &self,
        fields: &FieldMap,
        rows: &[Values],
        candidate: &Values,
        own_id: Option<&str>,
    ) -> Option<String> {
        fields
            .iter()
            .filter(|(_, f)| f.unique)
            .find(|(name, _)| {
                let Some(value) = candidate.get(*name).filter(|v| !v.is_null()) else {
                    return false;
                };
                rows.iter()
                    .filter(|row| own_id.is_none() || Self::row_id(row) != own_id)
                    .any(|row| row.get(*name).is_some_and(|v| v.same_as(value)))
            })
            .map(|(name, _)| name.clone())
    }
}

struct MemoryCollection(Arc<CollectionState>);

impl std::ops::Deref for MemoryCollection {
    type Target = CollectionState;

    fn deref(&self) -> &CollectionState {
        &self.0
    }
}

impl MemoryCollection {
    fn handle(&self, id: String) -> DocumentRef {
        Arc::new(MemoryDocument {
            collection: Arc::clone(&self.0),
            id,
        })
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> FieldMap {
        self.fields.read().clone()
    }

    fn add_field(&self, name: &str, field: Field) -> Result<(), StoreError> {
        let mut fields = self.fields.write();
        // existing rows read the new field as null
        fields.insert(name.to_string(), field);
        Ok(())
    }

    async fn create(&self, values: Values) -> Result<DocumentRef, StoreError> {
        let fields = self.fields();
        let mut stored = prepare_write(&fields, values, WriteMode::Create)?;
        let id = uuid::Uuid::new_v4().to_string();

        let mut rows = self.rows.write();
        if let Some(field) = self.unique_conflict(&fields, &rows, &stored, None) {
            return Err(StoreError::UniqueViolation {
                collection: self.name.clone(),
                field,
            });
        }
        stored.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        rows.push(stored);
        drop(rows);

        tracing::debug!(collection = %self.name, %id, "document created");
        Ok(self.handle(id))
    }

    async fn find(&self, options: FindOptions) -> Result<Vec<DocumentRef>, StoreError> {
        let mut matched: Vec<Values> = {
            let rows = self.rows.read();
            rows.iter()
                .filter(|row| options.filter.as_ref().map_or(true, |w| w.matches(row)))
                .cloned()
                .collect()
        };
        if !options.order.is_empty() {
            // stable: ties keep insertion order
            matched.sort_by(|a, b| compare_documents(&options.order, a, b));
        }
        let ids = page(matched, options.offset, options.limit)
            .into_iter()
            .filter_map(|row| CollectionState::row_id(&row).map(str::to_string));
        Ok(ids.map(|id| self.handle(id)).collect())
    }

    async fn count(&self, filter: Option<Where>) -> Result<u64, StoreError> {
        let rows = self.rows.read();
        let n = match filter {
            Some(w) => rows.iter().filter(|row| w.matches(row)).count(),
            None => rows.len(),
        };
        Ok(n as u64)
    }
}

struct MemoryDocument {
    collection: Arc<CollectionState>,
    id: String,
}

impl MemoryDocument {
    fn not_found(&self) -> StoreError {
        StoreError::not_found(&self.collection.name, &self.id)
    }
}

#[async_trait]
impl DocumentHandle for MemoryDocument {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get(&self) -> Result<Values, StoreError> {
        let row = {
            let rows = self.collection.rows.read();
            rows.iter()
                .find(|row| CollectionState::row_id(row) == Some(self.id.as_str()))
                .cloned()
        };
        let row = row.ok_or_else(|| self.not_found())?;
        Ok(decode_read(&self.collection.fields.read(), row)?)
    }

    async fn update(&self, values: Values) -> Result<(), StoreError> {
        let fields = self.collection.fields.read().clone();
        let changes = prepare_write(&fields, values, WriteMode::Update)?;

        let mut rows = self.collection.rows.write();
        let index = rows
            .iter()
            .position(|row| CollectionState::row_id(row) == Some(self.id.as_str()))
            .ok_or_else(|| self.not_found())?;
        if let Some(field) =
            self.collection
                .unique_conflict(&fields, &rows, &changes, Some(self.id.as_str()))
        {
            return Err(StoreError::UniqueViolation {
                collection: self.collection.name.clone(),
                field,
            });
        }
        rows[index].extend(changes);
        Ok(())
    }

    async fn delete(&self) -> Result<(), StoreError> {
        let mut rows = self.collection.rows.write();
        let before = rows.len();
        rows.retain(|row| CollectionState::row_id(row) != Some(self.id.as_str()));
        if rows.len() == before {
            return Err(self.not_found());
        }
        tracing::debug!(collection = %self.collection.name, id = %self.id, "document deleted");
        Ok(())
    }
}
