//! Store parts for composing applications.

use std::sync::Arc;

use partkit::{Application, Part, PartKey};

use crate::collection::SharedStore;
use crate::memory::MemoryStore;
use crate::sql::SqlStore;

pub fn memory_store_part(name: impl Into<String>) -> Part<SharedStore> {
    Part::new(name, [], |_| async {
        tracing::info!("using in-memory document store");
        Ok(Arc::new(MemoryStore::new()) as SharedStore)
    })
}

/// SQLite store that connects when the application fires `connect`.
pub fn sql_store_part(
    name: impl Into<String>,
    app: &impl PartKey<Application>,
    dsn: impl Into<String>,
) -> Part<SharedStore> {
    let app = app.token().clone();
    let dsn = dsn.into();
    Part::new(name, [app.dep()], move |deps| {
        let (app, dsn) = (app.clone(), dsn.clone());
        async move {
            let application = deps.get(&app)?;
            let store = SqlStore::new(&dsn)?;
            let connecting = store.clone();
            application.on_connect().on_fn("sql-store", move |_| {
                let store = connecting.clone();
                async move { Ok(store.connect().await?) }
            });
            tracing::info!(%dsn, "using sqlite document store");
            Ok(Arc::new(store) as SharedStore)
        }
    })
}
