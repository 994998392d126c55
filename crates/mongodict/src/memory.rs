//! In-process [`StoreConnector`] for tests and benchmarks.
//!
//! [`MemoryStore`] keeps documents per [`Namespace`], optionally requires
//! credentials, and can be scripted to fail the next connect, reconnect,
//! health check or query. Every call is counted in [`MemoryStats`] so tests
//! can assert how often the lookup path touched the server.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mongodb::bson::{Bson, Document};

use crate::error::StoreError;
use crate::store::{
    ConnectOptions, Credentials, Namespace, Query, StoreConnection, StoreConnector, StoreResult,
};

/// Call counters of a [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub connects: usize,
    pub auths: usize,
    pub reconnects: usize,
    pub checks: usize,
    pub queries: usize,
    /// Connections opened and not yet closed.
    pub open_connections: usize,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<Namespace, Vec<Document>>,
    credentials: Option<Credentials>,
    connect_failures: VecDeque<StoreError>,
    reconnect_failures: VecDeque<StoreError>,
    check_failures: VecDeque<StoreError>,
    query_failures: VecDeque<StoreError>,
    stats: MemoryStats,
}

/// Shared in-memory document store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store that accepts unauthenticated clients.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// This store as a connector for [`ConnectionManager`](crate::connection::ConnectionManager)
    /// or [`crate::dict::open`].
    #[must_use]
    pub fn connector(&self) -> Arc<dyn StoreConnector> {
        Arc::new(self.clone())
    }

    /// Append a document to `namespace`. Documents are matched in insertion
    /// order.
    pub fn insert(&self, namespace: &Namespace, doc: Document) {
        self.lock()
            .collections
            .entry(namespace.clone())
            .or_default()
            .push(doc);
    }

    /// Require these credentials before queries are answered.
    pub fn set_credentials(&self, credentials: Credentials) {
        self.lock().credentials = Some(credentials);
    }

    /// Fail the next [`StoreConnector::connect`] call with `err`.
    pub fn fail_next_connect(&self, err: StoreError) {
        self.lock().connect_failures.push_back(err);
    }

    /// Fail the next [`StoreConnection::reconnect`] call with `err`.
    pub fn fail_next_reconnect(&self, err: StoreError) {
        self.lock().reconnect_failures.push_back(err);
    }

    /// Fail the next [`StoreConnection::check`] call with `err`.
    pub fn fail_next_check(&self, err: StoreError) {
        self.lock().check_failures.push_back(err);
    }

    /// Fail the next [`StoreConnection::find_first`] call with `err`.
    pub fn fail_next_query(&self, err: StoreError) {
        self.lock().query_failures.push_back(err);
    }

    /// Snapshot of the call counters.
    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StoreConnector for MemoryStore {
    fn connect(&self, _options: &ConnectOptions) -> StoreResult<Box<dyn StoreConnection>> {
        let mut inner = self.lock();
        inner.stats.connects += 1;
        if let Some(err) = inner.connect_failures.pop_front() {
            return Err(err);
        }
        inner.stats.open_connections += 1;
        Ok(Box::new(MemoryConnection {
            store: self.clone(),
            open: true,
            authenticated: false,
        }))
    }
}

struct MemoryConnection {
    store: MemoryStore,
    open: bool,
    authenticated: bool,
}

fn matches(doc: &Document, query: &Query) -> bool {
    matches!(doc.get(query.field()), Some(Bson::String(s)) if s == query.value())
}

impl StoreConnection for MemoryConnection {
    fn authenticate(&mut self, credentials: &Credentials, _database: &str) -> StoreResult<()> {
        let mut inner = self.store.lock();
        inner.stats.auths += 1;
        match &inner.credentials {
            Some(expected) if expected != credentials => Err(StoreError::Auth(format!(
                "bad credentials for user {}",
                credentials.user
            ))),
            _ => {
                self.authenticated = true;
                Ok(())
            }
        }
    }

    fn find_first(&mut self, namespace: &Namespace, query: &Query) -> StoreResult<Option<Document>> {
        let mut inner = self.store.lock();
        inner.stats.queries += 1;
        if let Some(err) = inner.query_failures.pop_front() {
            return Err(err);
        }
        if !self.open {
            return Err(StoreError::Io("connection closed".into()));
        }
        if inner.credentials.is_some() && !self.authenticated {
            return Err(StoreError::Query(format!(
                "not authorized on {} to execute find",
                namespace.database()
            )));
        }
        Ok(inner
            .collections
            .get(namespace)
            .and_then(|docs| docs.iter().find(|doc| matches(doc, query)))
            .cloned())
    }

    fn reconnect(&mut self) -> StoreResult<()> {
        let mut inner = self.store.lock();
        inner.stats.reconnects += 1;
        self.authenticated = false;
        if let Some(err) = inner.reconnect_failures.pop_front() {
            if self.open {
                self.open = false;
                inner.stats.open_connections -= 1;
            }
            return Err(err);
        }
        if !self.open {
            self.open = true;
            inner.stats.open_connections += 1;
        }
        Ok(())
    }

    fn check(&mut self) -> StoreResult<()> {
        let mut inner = self.store.lock();
        inner.stats.checks += 1;
        if let Some(err) = inner.check_failures.pop_front() {
            return Err(err);
        }
        if self.open {
            Ok(())
        } else {
            Err(StoreError::Io("connection closed".into()))
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.store.lock().stats.open_connections -= 1;
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}
