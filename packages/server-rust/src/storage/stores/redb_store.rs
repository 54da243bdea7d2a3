//! Embedded file-backed [`EngineStore`] using `redb`.
//!
//! redb transactions are synchronous, so every call runs on the blocking
//! thread pool to keep the async runtime responsive.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};

use crate::storage::store::EngineStore;

const ENGINES: TableDefinition<&str, &[u8]> = TableDefinition::new("scoring_engines");

/// Durable store in a single redb database file.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Opens (or creates) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is not a redb database.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let db = Database::create(path)
            .with_context(|| format!("opening engine store at {}", path.display()))?;
        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db)).await?
    }
}

#[async_trait]
impl EngineStore for RedbStore {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.blocking(|db| {
            let txn = db.begin_write()?;
            // Opening the table in a write transaction creates it.
            txn.open_table(ENGINES)?;
            txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn load_all(&self) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
        self.blocking(|db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(ENGINES)?;
            let mut out = Vec::new();
            for item in table.iter()? {
                let (key, value) = item?;
                out.push((key.value().to_string(), value.value().to_vec()));
            }
            Ok(out)
        })
        .await
    }

    async fn store(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let key = key.to_string();
        let value = value.to_vec();
        self.blocking(move |db| {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(ENGINES)?;
                table.insert(key.as_str(), value.as_slice())?;
            }
            txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let key = key.to_string();
        self.blocking(move |db| {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(ENGINES)?;
                table.remove(key.as_str())?;
            }
            txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> anyhow::Result<()> {
        // The file is released when the last `Arc<Database>` drops.
        Ok(())
    }
}
