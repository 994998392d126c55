//! Lifecycle of the single connection owned by a table.

use std::sync::Arc;

use crate::error::{DictError, Result, StoreError};
use crate::store::{ConnectOptions, Credentials, StoreConnection, StoreConnector};

/// Connection state of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or closed.
    Disconnected,
    /// Connected and, when auth is enabled, authenticated.
    Connected,
    /// The last connect or recovery attempt failed.
    Failed,
}

/// Owns one logical connection: connect, authenticate, recover, close.
///
/// Invariant: in [`ConnectionState::Connected`] a connection object is
/// present.
pub struct ConnectionManager {
    connector: Arc<dyn StoreConnector>,
    options: ConnectOptions,
    credentials: Option<Credentials>,
    auth_database: String,
    state: ConnectionState,
    conn: Option<Box<dyn StoreConnection>>,
}

impl ConnectionManager {
    /// Create a manager in the [`ConnectionState::Disconnected`] state.
    ///
    /// `credentials`, when present, are verified against `auth_database`
    /// after every connect and reconnect.
    #[must_use]
    pub fn new(
        connector: Arc<dyn StoreConnector>,
        options: ConnectOptions,
        credentials: Option<Credentials>,
        auth_database: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            options,
            credentials,
            auth_database: auth_database.into(),
            state: ConnectionState::Disconnected,
            conn: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Open a fresh connection, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::Connect`] when the server cannot be reached and
    /// [`DictError::Authentication`] when the credentials are rejected. Both
    /// leave the manager in [`ConnectionState::Failed`].
    pub fn connect(&mut self) -> Result<()> {
        self.drop_connection();
        tracing::info!(endpoint = %self.options.endpoint, "connecting to mongodb server");

        let mut conn = match self.connector.connect(&self.options) {
            Ok(conn) => conn,
            Err(err) => {
                self.state = ConnectionState::Failed;
                tracing::warn!(
                    endpoint = %self.options.endpoint,
                    error = %err,
                    "connect to mongodb server failed"
                );
                return Err(DictError::Connect {
                    endpoint: self.options.endpoint.to_string(),
                    source: err,
                });
            }
        };

        if let Err(err) = self.authenticate(&mut *conn) {
            conn.close();
            self.state = ConnectionState::Failed;
            return Err(err);
        }

        self.conn = Some(conn);
        self.state = ConnectionState::Connected;
        tracing::debug!(endpoint = %self.options.endpoint, "connected to mongodb server");
        Ok(())
    }

    /// Connect unless already connected.
    ///
    /// # Errors
    ///
    /// Returns the error from [`ConnectionManager::connect`].
    pub fn ensure_connected(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected && self.conn.is_some() {
            return Ok(());
        }
        self.connect()
    }

    /// The live connection, if connected.
    pub fn connection(&mut self) -> Option<&mut (dyn StoreConnection + 'static)> {
        if self.state != ConnectionState::Connected {
            return None;
        }
        self.conn.as_deref_mut()
    }

    /// Recover after a transport error: one reconnect, a health check, and
    /// re-authentication. On success the caller may retry its operation once.
    /// Without a live connection nothing is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::Reconnect`] (or [`DictError::Authentication`])
    /// and leaves the manager in [`ConnectionState::Failed`].
    pub fn recover(&mut self) -> Result<()> {
        tracing::info!(
            endpoint = %self.options.endpoint,
            "lost connection to mongodb server, reconnecting"
        );

        let Some(mut conn) = self.conn.take() else {
            // No connection to reconnect in place. The next lookup connects afresh.
            self.state = ConnectionState::Failed;
            return Err(DictError::Reconnect {
                endpoint: self.options.endpoint.to_string(),
                source: StoreError::Io("no connection to reconnect".into()),
            });
        };

        if let Err(err) = conn.reconnect().and_then(|()| conn.check()) {
            conn.close();
            self.state = ConnectionState::Failed;
            tracing::warn!(
                endpoint = %self.options.endpoint,
                error = %err,
                "reconnect to mongodb server failed"
            );
            return Err(DictError::Reconnect {
                endpoint: self.options.endpoint.to_string(),
                source: err,
            });
        }

        if let Err(err) = self.authenticate(&mut *conn) {
            conn.close();
            self.state = ConnectionState::Failed;
            return Err(err);
        }

        self.conn = Some(conn);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Give up on the current connection; the next lookup reconnects.
    pub fn mark_failed(&mut self) {
        self.drop_connection();
        self.state = ConnectionState::Failed;
    }

    /// Release the connection. Safe to call more than once.
    pub fn close(&mut self) {
        self.drop_connection();
        self.state = ConnectionState::Disconnected;
    }

    fn authenticate(&self, conn: &mut dyn StoreConnection) -> Result<()> {
        let Some(credentials) = &self.credentials else {
            return Ok(());
        };
        conn.authenticate(credentials, &self.auth_database)
            .map_err(|err: StoreError| {
                tracing::error!(
                    user = %credentials.user,
                    endpoint = %self.options.endpoint,
                    error = %err,
                    "mongodb authentication failed"
                );
                DictError::Authentication {
                    user: credentials.user.clone(),
                    endpoint: self.options.endpoint.to_string(),
                    source: err,
                }
            })
    }

    fn drop_connection(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.drop_connection();
    }
}
