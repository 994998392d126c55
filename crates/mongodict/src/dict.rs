//! Host-facing dictionary contract and the MongoDB table behind it.
//!
//! A host opens a table once with [`open`] (or [`open_file`]), calls
//! [`Dictionary::lookup`] any number of times from a single thread, and
//! finally [`Dictionary::close`]s it. When the configuration cannot be loaded
//! the host still gets a [`Dictionary`]: a [`SurrogateDictionary`] that
//! fails every lookup with the reason the table could not be opened.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::{CfFile, ConfigSource, DictConfig};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::{DictError, Result};
use crate::lookup::LookupEngine;
use crate::mongo::MongoConnector;
use crate::store::StoreConnector;

/// Dictionary type name, as used in `mongodb:/path/to/table.cf`.
pub const DICT_TYPE: &str = "mongodb";

/// Access mode requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// A named, read-only key-to-value store.
///
/// `lookup` takes `&mut self`: a table serves one caller at a time. `close`
/// consumes the table, so a closed table cannot be used again.
pub trait Dictionary: Send {
    /// Name the table was opened with.
    fn name(&self) -> &str;

    /// Resolve `key`. `Ok(None)` means the key is not in the table.
    ///
    /// # Errors
    ///
    /// Returns a [`DictError`]; check [`DictError::status`] to tell a
    /// transient failure from a permanent one.
    fn lookup(&mut self, key: &str) -> Result<Option<String>>;

    /// Release every resource held by the table.
    fn close(self: Box<Self>);
}

/// A lookup table backed by one MongoDB collection.
pub struct MongoDictionary {
    name: String,
    config: DictConfig,
    manager: ConnectionManager,
    engine: LookupEngine,
}

impl fmt::Debug for MongoDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDictionary")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MongoDictionary {
    /// Build a table from validated configuration. No connection is made.
    #[must_use]
    pub fn new(name: impl Into<String>, config: DictConfig, connector: Arc<dyn StoreConnector>) -> Self {
        let manager = ConnectionManager::new(
            connector,
            config.connect_options(),
            config.credentials.clone(),
            config.namespace.database(),
        );
        let engine = LookupEngine::new(
            config.namespace.clone(),
            config.key_field.as_str(),
            config.value_field.as_str(),
        );
        Self {
            name: name.into(),
            config,
            manager,
            engine,
        }
    }

    /// Load configuration from `source` and build the table. No connection
    /// is made.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::ReadOnly`] for any mode but
    /// [`OpenMode::ReadOnly`] and [`DictError::Config`] when the
    /// configuration is incomplete or invalid.
    pub fn from_source(
        name: &str,
        mode: OpenMode,
        source: &dyn ConfigSource,
        connector: Arc<dyn StoreConnector>,
    ) -> Result<Self> {
        if mode != OpenMode::ReadOnly {
            return Err(DictError::ReadOnly {
                table: name.to_string(),
            });
        }
        let config = DictConfig::from_source(source).map_err(|source| DictError::Config {
            table: name.to_string(),
            source,
        })?;
        Ok(Self::new(name, config, connector))
    }

    #[must_use]
    pub fn config(&self) -> &DictConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Open (or reopen) the server connection now.
    ///
    /// # Errors
    ///
    /// Returns the retryable connect or authentication failure.
    pub fn connect(&mut self) -> Result<()> {
        self.manager.connect()
    }
}

impl Dictionary for MongoDictionary {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&mut self, key: &str) -> Result<Option<String>> {
        self.engine.lookup(&mut self.manager, key)
    }

    fn close(mut self: Box<Self>) {
        self.manager.close();
        tracing::debug!(table = %self.name, "closed mongodb table");
    }
}

/// Stand-in for a table that could not be opened.
#[derive(Debug, Clone)]
pub struct SurrogateDictionary {
    name: String,
    reason: String,
}

impl SurrogateDictionary {
    #[must_use]
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Dictionary for SurrogateDictionary {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&mut self, _key: &str) -> Result<Option<String>> {
        Err(DictError::Surrogate {
            table: self.name.clone(),
            reason: self.reason.clone(),
        })
    }

    fn close(self: Box<Self>) {}
}

/// Open a table. Never fails: configuration problems yield a
/// [`SurrogateDictionary`].
///
/// The server connection is attempted right away; if that fails the table
/// is still returned and the next lookup reconnects.
#[must_use]
pub fn open(
    name: &str,
    mode: OpenMode,
    source: &dyn ConfigSource,
    connector: Arc<dyn StoreConnector>,
) -> Box<dyn Dictionary> {
    let mut dict = match MongoDictionary::from_source(name, mode, source, connector) {
        Ok(dict) => dict,
        Err(err) => return surrogate(name, &err),
    };
    if let Err(err) = dict.connect() {
        tracing::warn!(table = name, error = %err, "initial connect failed, retrying on first lookup");
    }
    Box::new(dict)
}

/// Open a table described by a configuration file, using the MongoDB driver.
#[must_use]
pub fn open_file(path: &Path, mode: OpenMode) -> Box<dyn Dictionary> {
    let name = path.display().to_string();
    match CfFile::load(path) {
        Ok(cf) => open(&name, mode, &cf, Arc::new(MongoConnector::new())),
        Err(source) => surrogate(
            &name,
            &DictError::Config {
                table: name.clone(),
                source,
            },
        ),
    }
}

fn surrogate(name: &str, err: &DictError) -> Box<dyn Dictionary> {
    tracing::error!(table = name, error = %err, "cannot open {DICT_TYPE} table");
    Box::new(SurrogateDictionary::new(name, err.to_string()))
}
