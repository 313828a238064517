//! Named-instance datastore management.
//!
//! A process constructs one registry per backend kind at startup from a
//! `name -> URL` table and passes connection handles to consumers
//! explicitly. Lookups of unconfigured instances fail with a typed error
//! rather than at first use of a dangling handle.

mod metrics;
pub mod mysql;
pub mod redis;
mod sql;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("MySQL instance `{0}` does not exist")]
    UnknownMySqlInstance(String),
    #[error("Redis instance `{0}` does not exist")]
    UnknownRedisInstance(String),
}
