//! MongoDB-backed implementation of [`StoreConnector`].
//!
//! Uses the sync API of the official `mongodb` crate. The driver manages its
//! own internal tokio runtime, so this works from any thread. Each
//! [`StoreConnection`] owns one `Client`; reconnecting or authenticating
//! rebuilds it from the stored `ClientOptions`. The configured timeout is
//! also sent as `maxTimeMS` on every query and ping.

use std::io;
use std::time::Duration;

use mongodb::bson::{doc, Document};
use mongodb::error::{Error as DriverError, ErrorKind};
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use mongodb::sync::Client;

use crate::error::{ConnectFailure, StoreError};
use crate::store::{
    ConnectOptions, Credentials, Endpoint, Namespace, Query, StoreConnection, StoreConnector,
    StoreResult,
};

/// Application name reported to the server.
const APP_NAME: &str = "mongodict";

/// Database used for health checks.
const ADMIN_DB: &str = "admin";

/// Connector for real MongoDB deployments.
#[derive(Debug, Clone, Default)]
pub struct MongoConnector;

impl MongoConnector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl StoreConnector for MongoConnector {
    fn connect(&self, options: &ConnectOptions) -> StoreResult<Box<dyn StoreConnection>> {
        let conn = MongoConnection::new(options)?;
        ping(&conn.client, ADMIN_DB, conn.timeout).map_err(connect_error)?;
        Ok(Box::new(conn))
    }
}

/// Translate connection parameters into driver options.
fn client_options(options: &ConnectOptions) -> StoreResult<ClientOptions> {
    let mut client_options = match &options.endpoint {
        Endpoint::Uri(uri) => ClientOptions::parse(uri.as_str()).run().map_err(connect_error)?,
        Endpoint::HostPort { host, port } => ClientOptions::builder()
            .hosts(vec![ServerAddress::Tcp {
                host: host.clone(),
                port: Some(*port),
            }])
            .build(),
    };
    client_options.connect_timeout = Some(options.timeout);
    client_options.server_selection_timeout = Some(options.timeout);
    if client_options.app_name.is_none() {
        client_options.app_name = Some(APP_NAME.to_string());
    }
    Ok(client_options)
}

/// `ping` bounded by a server-side time limit.
fn ping_command(timeout: Duration) -> Document {
    let max_time_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
    doc! { "ping": 1, "maxTimeMS": max_time_ms }
}

fn ping(client: &Client, database: &str, timeout: Duration) -> Result<Document, DriverError> {
    client.database(database).run_command(ping_command(timeout)).run()
}

struct MongoConnection {
    client: Client,
    options: ClientOptions,
    /// Server-side limit for every operation.
    timeout: Duration,
}

impl MongoConnection {
    /// Build the client. The driver connects lazily, so nothing is sent yet.
    fn new(options: &ConnectOptions) -> StoreResult<Self> {
        let client_options = client_options(options)?;
        let client = Client::with_options(client_options.clone()).map_err(connect_error)?;
        Ok(Self {
            client,
            options: client_options,
            timeout: options.timeout,
        })
    }
}

impl StoreConnection for MongoConnection {
    fn authenticate(&mut self, credentials: &Credentials, database: &str) -> StoreResult<()> {
        let mut credential = Credential::default();
        credential.username = Some(credentials.user.clone());
        credential.password = Some(credentials.password.clone());
        credential.source = Some(database.to_string());

        let mut options = self.options.clone();
        options.credential = Some(credential);
        let client = Client::with_options(options.clone()).map_err(connect_error)?;
        ping(&client, database, self.timeout).map_err(|err| match operation_error(err) {
            StoreError::Query(message) => StoreError::Auth(message),
            other => other,
        })?;

        self.client = client;
        self.options = options;
        Ok(())
    }

    fn find_first(&mut self, namespace: &Namespace, query: &Query) -> StoreResult<Option<Document>> {
        self.client
            .database(namespace.database())
            .collection::<Document>(namespace.collection())
            .find_one(query.to_filter())
            .max_time(self.timeout)
            .run()
            .map_err(operation_error)
    }

    fn reconnect(&mut self) -> StoreResult<()> {
        self.client = Client::with_options(self.options.clone()).map_err(connect_error)?;
        Ok(())
    }

    fn check(&mut self) -> StoreResult<()> {
        ping(&self.client, ADMIN_DB, self.timeout)
            .map(drop)
            .map_err(connect_error)
    }
}

/// Classify a driver error raised while establishing a connection.
fn connect_error(err: DriverError) -> StoreError {
    let message = err.to_string();
    match &*err.kind {
        ErrorKind::Authentication { .. } => StoreError::Auth(message),
        ErrorKind::Io(io_err) => StoreError::connect(io_failure(io_err.kind()), message),
        ErrorKind::DnsResolve { .. } => StoreError::connect(ConnectFailure::NoSocket, message),
        ErrorKind::ServerSelection { .. } => {
            StoreError::connect(selection_failure(&message), message)
        }
        _ => StoreError::connect(ConnectFailure::Refused, message),
    }
}

/// Classify a driver error raised by an operation on an open connection.
fn operation_error(err: DriverError) -> StoreError {
    let message = err.to_string();
    match &*err.kind {
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. } => {
            StoreError::Io(message)
        }
        ErrorKind::Authentication { .. } => StoreError::Auth(message),
        _ => StoreError::Query(message),
    }
}

fn io_failure(kind: io::ErrorKind) -> ConnectFailure {
    match kind {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => ConnectFailure::Refused,
        io::ErrorKind::TimedOut => ConnectFailure::Unreachable,
        _ => ConnectFailure::NoSocket,
    }
}

/// Server selection errors only carry a message describing the topology.
fn selection_failure(message: &str) -> ConnectFailure {
    let lower = message.to_ascii_lowercase();
    if lower.contains("connection refused") {
        ConnectFailure::Refused
    } else if lower.contains("criteria primary") || lower.contains("rssecondary") {
        ConnectFailure::NotPrimary
    } else if lower.contains("failed to lookup") || lower.contains("dns") {
        ConnectFailure::NoSocket
    } else {
        ConnectFailure::Unreachable
    }
}
