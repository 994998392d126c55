//! Key lookup: normalize, query, retry once on a dropped connection, extract.

use mongodb::bson::{Bson, Document};

use crate::connection::ConnectionManager;
use crate::error::{DictError, Result, StoreError};
use crate::normalize::normalize;
use crate::store::{Namespace, Query, StoreResult};

/// Translates lookups into single-field queries against one collection.
#[derive(Debug, Clone)]
pub struct LookupEngine {
    namespace: Namespace,
    key_field: String,
    value_field: String,
}

impl LookupEngine {
    #[must_use]
    pub fn new(namespace: Namespace, key_field: impl Into<String>, value_field: impl Into<String>) -> Self {
        Self {
            namespace,
            key_field: key_field.into(),
            value_field: value_field.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Look up `raw_key`.
    ///
    /// Returns `Ok(None)` when no document matches or the matched document
    /// has no usable value field. A transport error triggers exactly one
    /// reconnect and, if that succeeds, exactly one retried query.
    ///
    /// # Errors
    ///
    /// Returns a retryable [`DictError`] when no connection can be
    /// established, recovery fails, or the query itself fails.
    pub fn lookup(&self, manager: &mut ConnectionManager, raw_key: &str) -> Result<Option<String>> {
        manager.ensure_connected()?;

        let key = normalize(raw_key);
        if key != raw_key {
            tracing::debug!(key = %raw_key, normalized = %key, "stripped address extension");
        }
        let query = Query::new(self.key_field.as_str(), &*key);

        let doc = match self.find(manager, &query) {
            Ok(doc) => doc,
            Err(err) if err.is_transport() => {
                tracing::info!(namespace = %self.namespace, error = %err, "query hit a transport error");
                manager.recover()?;
                match self.find(manager, &query) {
                    Ok(doc) => doc,
                    Err(err) => {
                        if err.is_transport() {
                            manager.mark_failed();
                        }
                        return Err(self.query_error(err));
                    }
                }
            }
            Err(err) => return Err(self.query_error(err)),
        };

        let Some(doc) = doc else {
            tracing::debug!(namespace = %self.namespace, key = %key, "no matching document");
            return Ok(None);
        };
        let value = extract(&doc, &self.value_field);
        if value.is_none() {
            tracing::debug!(
                namespace = %self.namespace,
                key = %key,
                field = %self.value_field,
                "matched document has no usable value field"
            );
        }
        Ok(value)
    }

    fn find(&self, manager: &mut ConnectionManager, query: &Query) -> StoreResult<Option<Document>> {
        let conn = manager
            .connection()
            .ok_or_else(|| StoreError::Io("not connected".into()))?;
        conn.find_first(&self.namespace, query)
    }

    fn query_error(&self, source: StoreError) -> DictError {
        tracing::warn!(namespace = %self.namespace, error = %source, "mongodb query failed");
        DictError::Query {
            namespace: self.namespace.clone(),
            source,
        }
    }
}

/// Extract `path` from `doc` as a string.
///
/// `path` may use dots to reach into embedded documents. Strings are returned
/// as-is; integers, doubles, booleans and object ids in their text form. Any
/// other type counts as absent.
#[must_use]
pub fn extract(doc: &Document, path: &str) -> Option<String> {
    let value = match doc.get(path) {
        Some(value) => value,
        None => {
            let (head, rest) = path.split_once('.')?;
            return match doc.get(head) {
                Some(Bson::Document(inner)) => extract(inner, rest),
                _ => None,
            };
        }
    };
    match value {
        Bson::String(s) => Some(s.clone()),
        Bson::Int32(n) => Some(n.to_string()),
        Bson::Int64(n) => Some(n.to_string()),
        Bson::Double(n) => Some(n.to_string()),
        Bson::Boolean(b) => Some(b.to_string()),
        Bson::ObjectId(oid) => Some(oid.to_hex()),
        _ => None,
    }
}
