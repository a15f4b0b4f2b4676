use thiserror::Error;

use crate::filter::FilterError;
use crate::validate::ValidationError;

/// Errors raised by document stores and their collections.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("document '{id}' not found in '{collection}'")]
    NotFound { collection: String, id: String },

    #[error("collection '{0}' already exists")]
    CollectionExists(String),

    #[error("field '{field}' of '{collection}' must be unique")]
    UniqueViolation { collection: String, field: String },

    #[error("cannot add field '{field}' to '{collection}' after it was synced")]
    SchemaLocked { collection: String, field: String },

    #[error("store is unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt value in '{collection}.{field}': {message}")]
    Corrupt {
        collection: String,
        field: String,
        message: String,
    },
}

impl StoreError {
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }
}
