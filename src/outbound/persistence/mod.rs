//! PostgreSQL persistence adapters using Diesel.
//!
//! Concrete implementations of the store-shaped service ports, backed by
//! PostgreSQL through `diesel-async` with `bb8` connection pooling.
//!
//! Each public operation is one unit of work: a pooled connection, one
//! transaction, and a single clock reading used for every timestamp written
//! inside it. Row structs (`models.rs`) and table definitions (`schema.rs`)
//! stay internal to this adapter; all failures are mapped into the domain's
//! closed error kind set.

use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

use crate::domain::{Error, Result};

mod diesel_auth_service;
mod diesel_dial_membership_service;
mod diesel_dial_service;
mod diesel_error_mapping;
mod diesel_queries;
mod diesel_user_service;
mod models;
mod schema;

pub use diesel_auth_service::DieselAuthService;
pub use diesel_dial_membership_service::DieselDialMembershipService;
pub use diesel_dial_service::DieselDialService;
pub use diesel_user_service::DieselUserService;

/// Shared connection pool for the Diesel services.
///
/// The services never hold a connection beyond one transaction, so
/// `diesel-async`'s pool is used as-is instead of being wrapped in a
/// configuration type of its own.
pub type DbPool = Pool<AsyncPgConnection>;

/// Build the pool the services share.
///
/// A checked-out connection lives exactly as long as one service
/// transaction, so `max_connections` caps concurrent units of work against
/// the store rather than concurrent requests: reads that lose the race for
/// a connection queue briefly instead of piling up sessions on the
/// database. The cap is deliberately a required argument — how many
/// simultaneous transactions a deployment wants is a property of that
/// deployment, not of this crate.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<DbPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Pool::builder()
        .max_size(max_connections)
        .build(manager)
        .await
        .map_err(|err| Error::internal(format!("failed to build connection pool: {err}")))
}
