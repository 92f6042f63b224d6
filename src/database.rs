//! Database management.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use sled::{Config as SledConfig, Db, IVec};

use crate::config::Config;
use crate::error::{ShutdownError, ShutdownResult};

pub type Tree = sled::Tree;

/// The default path to use for data storage.
pub const DEFAULT_DATA_PATH: &str = "/usr/local/datacat/db";
/// The DB tree name used for catalog records (projects, datasets, object groups, revisions).
const TREE_CATALOG: &str = "catalog";
/// The DB tree name used for the broker's event log.
const TREE_EVENTS: &str = "events";
/// The DB tree name used for durable broker consumer state.
const TREE_CONSUMERS: &str = "consumers";
/// The DB tree name used for stream group registry rows.
const TREE_STREAM_GROUPS: &str = "stream_groups";

/// The default path to use for data storage.
pub fn default_data_path() -> String {
    DEFAULT_DATA_PATH.to_string()
}

/// An abstraction over the eventing controller's database.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    /// System runtime config.
    #[allow(dead_code)]
    config: Arc<Config>,
    /// The underlying DB handle.
    db: Db,
}

impl Database {
    /// Open the database for usage.
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        // Determine the database path, and ensure it exists.
        let dbpath = PathBuf::from(&config.storage_data_path);
        tokio::fs::create_dir_all(&dbpath)
            .await
            .context("error creating dir for eventing database")?;

        Self::spawn_blocking(move || -> Result<Self> {
            let db = SledConfig::new().path(dbpath).mode(sled::Mode::HighThroughput).open()?;
            let inner = Arc::new(DatabaseInner { config, db });
            Ok(Self { inner })
        })
        .await?
    }

    /// Spawn a blocking database-related function, returning a ShutdownError if anything goes
    /// wrong related to spawning & joining.
    #[tracing::instrument(level = "trace", skip(f), err)]
    pub async fn spawn_blocking<F, R>(f: F) -> ShutdownResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|err| ShutdownError::from(anyhow::Error::from(err)))
    }

    /// Get a handle to the DB tree used for catalog records.
    pub async fn get_catalog_tree(&self) -> ShutdownResult<Tree> {
        self.get_tree(TREE_CATALOG).await
    }

    /// Get a handle to the DB tree used for the broker's event log.
    pub async fn get_events_tree(&self) -> ShutdownResult<Tree> {
        self.get_tree(TREE_EVENTS).await
    }

    /// Get a handle to the DB tree used for durable broker consumer state.
    pub async fn get_consumers_tree(&self) -> ShutdownResult<Tree> {
        self.get_tree(TREE_CONSUMERS).await
    }

    /// Get a handle to the DB tree used for stream group registry rows.
    pub async fn get_stream_groups_tree(&self) -> ShutdownResult<Tree> {
        self.get_tree(TREE_STREAM_GROUPS).await
    }

    async fn get_tree(&self, name: &'static str) -> ShutdownResult<Tree> {
        let (db, ivname) = (self.inner.db.clone(), IVec::from(name));
        let tree = Self::spawn_blocking(move || -> Result<Tree> { Ok(db.open_tree(ivname)?) })
            .await
            .and_then(|res| res.map_err(|err| ShutdownError(anyhow!("could not open DB tree {} {}", name, err))))?;
        Ok(tree)
    }
}
