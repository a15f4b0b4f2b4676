//! SQLite document store on `sqlx`.
//!
//! Collections declared before [`SqlStore::connect`] are synced
//! (`CREATE TABLE IF NOT EXISTS`) when the connection is established;
//! collections declared afterwards are synced on creation. Operations issued
//! before the store is connected wait on a shared [`ConnectionGate`]. A synced
//! collection no longer accepts new fields.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;

use crate::collection::{Collection, CollectionDef, DocumentHandle, DocumentRef, DocumentStore};
use crate::error::StoreError;
use crate::field::{DataType, Field, FieldMap, ID_FIELD};
use crate::filter::Where;
use crate::gate::ConnectionGate;
use crate::query::FindOptions;
use crate::sql_filter::{order_to_sql, quote_ident, where_to_sql, SqlParam};
use crate::validate::{decode_read, prepare_write, WriteMode};
use crate::value::{parse_date, Value, Values};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Pool and readiness shared by the store and its collections.
struct Backend {
    pool: OnceLock<SqlitePool>,
    gate: ConnectionGate,
}

impl Backend {
    async fn pool(&self) -> Result<SqlitePool, StoreError> {
        self.gate.wait().await?;
        self.pool
            .get()
            .cloned()
            .ok_or_else(|| StoreError::Unavailable("not connected".into()))
    }
}

#[derive(Clone)]
pub struct SqlStore {
    options: SqliteConnectOptions,
    in_memory: bool,
    max_connections: u32,
    backend: Arc<Backend>,
    collections: Arc<DashMap<String, Arc<SqlCollectionState>>>,
}

impl SqlStore {
    /// Parse a SQLite DSN such as `sqlite::memory:` or `sqlite://data/app.db`.
    /// Nothing is opened until [`connect`](Self::connect).
    pub fn new(dsn: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(dsn)?
            .create_if_missing(true)
            // LIKE matches case-sensitively in every adapter
            .pragma("case_sensitive_like", "ON");
        Ok(Self {
            options,
            in_memory: dsn.contains(":memory:") || dsn.contains("mode=memory"),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            backend: Arc::new(Backend {
                pool: OnceLock::new(),
                gate: ConnectionGate::new(),
            }),
            collections: Arc::new(DashMap::new()),
        })
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.backend.gate.is_open()
    }

    /// Open the pool, sync every declared collection and open the gate.
    pub async fn connect(&self) -> Result<(), StoreError> {
        if self.backend.pool.get().is_some() {
            return Ok(());
        }

        let pool_options = if self.in_memory {
            // one connection that never closes, or the database vanishes
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(self.max_connections)
        };

        let pool = match pool_options.connect_with(self.options.clone()).await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!(error = %e, "sql store connection failed");
                self.backend.gate.fail(e.to_string());
                return Err(e.into());
            }
        };
        let pool = self.backend.pool.get_or_init(|| pool).clone();

        let pending: Vec<Arc<SqlCollectionState>> =
            self.collections.iter().map(|e| Arc::clone(e.value())).collect();
        for collection in &pending {
            if let Err(e) = collection.sync(&pool).await {
                tracing::error!(collection = %collection.name, error = %e, "collection sync failed");
                self.backend.gate.fail(e.to_string());
                return Err(e);
            }
        }

        self.backend.gate.open();
        tracing::info!(collections = pending.len(), in_memory = self.in_memory, "sql store connected");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqlStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn create_collection(
        &self,
        def: CollectionDef,
    ) -> Result<Arc<dyn Collection>, StoreError> {
        if self.collections.contains_key(&def.name) {
            return Err(StoreError::CollectionExists(def.name));
        }
        let state = Arc::new(SqlCollectionState {
            name: def.name.clone(),
            fields: RwLock::new(def.fields),
            synced: AtomicBool::new(false),
            backend: Arc::clone(&self.backend),
        });
        self.collections.insert(def.name, Arc::clone(&state));

        // declared after connect: nobody else will sync it
        if let Some(pool) = self.backend.pool.get().cloned() {
            state.sync(&pool).await?;
        }
        Ok(Arc::new(SqlCollection(state)))
    }
}

struct SqlCollectionState {
    name: String,
    fields: RwLock<FieldMap>,
    synced: AtomicBool,
    backend: Arc<Backend>,
}

impl SqlCollectionState {
    fn table(&self) -> String {
        quote_ident(&self.name)
    }

    fn fields(&self) -> FieldMap {
        self.fields.read().clone()
    }

    async fn sync(&self, pool: &SqlitePool) -> Result<(), StoreError> {
        let fields = self.fields();
        let mut columns = vec![format!("{} TEXT PRIMARY KEY NOT NULL", quote_ident(ID_FIELD))];
        columns.extend(fields.iter().map(|(name, field)| column_ddl(name, field)));
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table(),
            columns.join(", ")
        );
        tracing::debug!(collection = %self.name, %ddl, "syncing collection");
        sqlx::query(&ddl).execute(pool).await?;
        self.synced.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn map_write_error(&self, e: sqlx::Error) -> StoreError {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                // "UNIQUE constraint failed: people.email"
                let field = db
                    .message()
                    .rsplit('.')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                return StoreError::UniqueViolation {
                    collection: self.name.clone(),
                    field,
                };
            }
        }
        e.into()
    }

    fn decode_row(&self, fields: &FieldMap, row: &SqliteRow) -> Result<Values, StoreError> {
        let mut stored = Values::new();
        let id: String = row.try_get(ID_FIELD)?;
        for (name, field) in fields {
            let corrupt = |message: String| StoreError::Corrupt {
                collection: self.name.clone(),
                field: name.clone(),
                message,
            };
            let value = match field.data_type {
                DataType::String | DataType::Reference => row
                    .try_get::<Option<String>, _>(name.as_str())?
                    .map(Value::String),
                DataType::Boolean => row
                    .try_get::<Option<i64>, _>(name.as_str())?
                    .map(|i| Value::Bool(i != 0)),
                DataType::Integer => row
                    .try_get::<Option<i64>, _>(name.as_str())?
                    .map(Value::Integer),
                DataType::Float => row
                    .try_get::<Option<f64>, _>(name.as_str())?
                    .map(Value::Float),
                DataType::Blob => row
                    .try_get::<Option<Vec<u8>>, _>(name.as_str())?
                    .map(Value::Blob),
                DataType::Date => match row.try_get::<Option<String>, _>(name.as_str())? {
                    Some(s) => Some(parse_date(&s).ok_or_else(|| corrupt(format!("bad date '{s}'")))?),
                    None => None,
                },
                DataType::Json => match row.try_get::<Option<String>, _>(name.as_str())? {
                    Some(s) => Some(Value::Json(
                        serde_json::from_str(&s).map_err(|e| corrupt(e.to_string()))?,
                    )),
                    None => None,
                },
            };
            stored.insert(name.clone(), value.unwrap_or(Value::Null));
        }
        let mut values = decode_read(fields, stored)?;
        values.insert(ID_FIELD.to_string(), Value::String(id));
        Ok(values)
    }
}

fn column_ddl(name: &str, field: &Field) -> String {
    let sql_type = match field.data_type {
        DataType::String | DataType::Reference | DataType::Date | DataType::Json => "TEXT",
        DataType::Boolean | DataType::Integer => "INTEGER",
        DataType::Float => "REAL",
        DataType::Blob => "BLOB",
    };
    let mut ddl = format!("{} {sql_type}", quote_ident(name));
    if !field.nullable {
        ddl.push_str(" NOT NULL");
    }
    if field.unique {
        ddl.push_str(" UNIQUE");
    }
    if let Some(target) = &field.reference {
        ddl.push_str(&format!(" REFERENCES {}({})", quote_ident(target), quote_ident(ID_FIELD)));
    }
    ddl
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: Vec<SqlParam>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(Option::<String>::None),
            SqlParam::Integer(i) => query.bind(i),
            SqlParam::Float(f) => query.bind(f),
            SqlParam::Text(s) => query.bind(s),
            SqlParam::Blob(b) => query.bind(b),
        };
    }
    query
}

struct SqlCollection(Arc<SqlCollectionState>);

impl SqlCollection {
    fn handle(&self, id: String) -> DocumentRef {
        Arc::new(SqlDocument {
            collection: Arc::clone(&self.0),
            id,
        })
    }
}

#[async_trait]
impl Collection for SqlCollection {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn fields(&self) -> FieldMap {
        self.0.fields()
    }

    fn add_field(&self, name: &str, field: Field) -> Result<(), StoreError> {
        if self.0.synced.load(Ordering::SeqCst) {
            return Err(StoreError::SchemaLocked {
                collection: self.0.name.clone(),
                field: name.to_string(),
            });
        }
        self.0.fields.write().insert(name.to_string(), field);
        Ok(())
    }

    async fn create(&self, values: Values) -> Result<DocumentRef, StoreError> {
        let state = &self.0;
        let pool = state.backend.pool().await?;
        let fields = state.fields();
        let stored = prepare_write(&fields, values, WriteMode::Create)?;
        let id = uuid::Uuid::new_v4().to_string();

        let mut columns = vec![quote_ident(ID_FIELD)];
        let mut params = vec![SqlParam::Text(id.clone())];
        for (name, value) in &stored {
            columns.push(quote_ident(name));
            params.push(SqlParam::from(value));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            state.table(),
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
        );
        bind_params(sqlx::query(&sql), params)
            .execute(&pool)
            .await
            .map_err(|e| state.map_write_error(e))?;

        tracing::debug!(collection = %state.name, %id, "document created");
        Ok(self.handle(id))
    }

    async fn find(&self, options: FindOptions) -> Result<Vec<DocumentRef>, StoreError> {
        let state = &self.0;
        let pool = state.backend.pool().await?;
        let filter = where_to_sql(&options.filter.unwrap_or_default());
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {}",
            quote_ident(ID_FIELD),
            state.table(),
            filter.clause,
            order_to_sql(&options.order)
        );
        let mut params = filter.params;
        match (options.limit, options.offset) {
            (Some(limit), offset) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                params.push(SqlParam::Integer(limit as i64));
                params.push(SqlParam::Integer(offset.unwrap_or(0) as i64));
            }
            (None, Some(offset)) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                params.push(SqlParam::Integer(offset as i64));
            }
            (None, None) => {}
        }

        let rows = bind_params(sqlx::query(&sql), params).fetch_all(&pool).await?;
        rows.iter()
            .map(|row| -> Result<DocumentRef, StoreError> {
                Ok(self.handle(row.try_get::<String, _>(0)?))
            })
            .collect()
    }

    async fn count(&self, filter: Option<Where>) -> Result<u64, StoreError> {
        let state = &self.0;
        let pool = state.backend.pool().await?;
        let filter = where_to_sql(&filter.unwrap_or_default());
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", state.table(), filter.clause);
        let row = bind_params(sqlx::query(&sql), filter.params)
            .fetch_one(&pool)
            .await?;
        let n: i64 = row.try_get(0)?;
        Ok(n.max(0) as u64)
    }
}

struct SqlDocument {
    collection: Arc<SqlCollectionState>,
    id: String,
}

#[async_trait]
impl DocumentHandle for SqlDocument {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get(&self) -> Result<Values, StoreError> {
        let state = &self.collection;
        let pool = state.backend.pool().await?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?",
            state.table(),
            quote_ident(ID_FIELD)
        );
        let row = sqlx::query(&sql)
            .bind(self.id.as_str())
            .fetch_optional(&pool)
            .await?
            .ok_or_else(|| StoreError::not_found(&state.name, &self.id))?;
        state.decode_row(&state.fields(), &row)
    }

    async fn update(&self, values: Values) -> Result<(), StoreError> {
        let state = &self.collection;
        let pool = state.backend.pool().await?;
        let changes = prepare_write(&state.fields(), values, WriteMode::Update)?;

        let (sql, params) = if changes.is_empty() {
            // nothing to write, but a missing document is still reported
            (
                format!(
                    "UPDATE {} SET {id} = {id} WHERE {id} = ?",
                    state.table(),
                    id = quote_ident(ID_FIELD)
                ),
                vec![SqlParam::Text(self.id.clone())],
            )
        } else {
            let assignments: Vec<String> = changes
                .keys()
                .map(|name| format!("{} = ?", quote_ident(name)))
                .collect();
            let mut params: Vec<SqlParam> = changes.values().map(SqlParam::from).collect();
            params.push(SqlParam::Text(self.id.clone()));
            (
                format!(
                    "UPDATE {} SET {} WHERE {} = ?",
                    state.table(),
                    assignments.join(", "),
                    quote_ident(ID_FIELD)
                ),
                params,
            )
        };

        let result = bind_params(sqlx::query(&sql), params)
            .execute(&pool)
            .await
            .map_err(|e| state.map_write_error(e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(&state.name, &self.id));
        }
        Ok(())
    }

    async fn delete(&self) -> Result<(), StoreError> {
        let state = &self.collection;
        let pool = state.backend.pool().await?;
        let sql = format!("DELETE FROM {} WHERE {} = ?", state.table(), quote_ident(ID_FIELD));
        let result = sqlx::query(&sql)
            .bind(self.id.as_str())
            .execute(&pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(&state.name, &self.id));
        }
        tracing::debug!(collection = %state.name, id = %self.id, "document deleted");
        Ok(())
    }
}
