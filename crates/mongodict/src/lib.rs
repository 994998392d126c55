//! Read-only MongoDB lookup tables for mail-system dictionaries.
//!
//! A table maps a key (an address, a domain, a local part) to a single
//! string value stored in one field of a MongoDB document. [`dict::open`]
//! turns a `name = value` configuration into a [`dict::Dictionary`];
//! lookups normalize the key, run a one-field `find_one`, and reconnect once
//! when the connection has dropped.

#![warn(clippy::pedantic)]

pub mod config;
pub mod connection;
pub mod dict;
pub mod error;
pub mod lookup;
pub mod memory;
pub mod mongo;
pub mod normalize;
pub mod store;

pub use mongodb::bson;

/// Common imports for hosts and tests.
pub mod prelude {
    pub use crate::config::{CfFile, ConfigSource, DictConfig};
    pub use crate::dict::{open, open_file, Dictionary, MongoDictionary, OpenMode};
    pub use crate::error::{DictError, DictStatus};
    pub use crate::memory::MemoryStore;
    pub use crate::mongo::MongoConnector;
    pub use crate::normalize::normalize;
    pub use crate::store::{Namespace, StoreConnector};
}
