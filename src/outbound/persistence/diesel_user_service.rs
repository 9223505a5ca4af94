//! PostgreSQL-backed `UserService` implementation using Diesel.

use std::sync::Arc;

use async_trait::async_trait;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::AsyncConnection;
use mockable::{Clock, DefaultClock};

use crate::domain::ports::{Page, UserService};
use crate::domain::{Error, NewUser, Principal, Result, User, UserFilter, UserUpdate};

use super::diesel_error_mapping::map_pool_error;
use super::diesel_queries as queries;
use super::DbPool;

/// Diesel-backed implementation of the user service port.
///
/// Every operation runs as one transaction with a single clock reading, so
/// all timestamps written by a unit of work agree.
#[derive(Clone)]
pub struct DieselUserService {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl DieselUserService {
    /// Create a new service with the system clock.
    pub fn new(pool: DbPool) -> Self {
        Self::with_clock(pool, Arc::new(DefaultClock))
    }

    /// Create a new service with an injected clock, for deterministic
    /// timestamps under test.
    pub fn with_clock(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl UserService for DieselUserService {
    async fn find_user_by_id(&self, _principal: &Principal, id: i32) -> Result<User> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let mut user = queries::find_user_by_id(conn, id).await?;
                queries::attach_user_auths(conn, &mut user).await?;
                Ok(user)
            }
            .scope_boxed()
        })
        .await
    }

    async fn find_users(&self, _principal: &Principal, filter: UserFilter) -> Result<Page<User>> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let (items, total) = queries::find_users(conn, &filter).await?;
                Ok(Page { items, total })
            }
            .scope_boxed()
        })
        .await
    }

    async fn create_user(&self, _principal: &Principal, draft: NewUser) -> Result<User> {
        let now = self.clock.utc();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move { queries::create_user(conn, now, draft).await }.scope_boxed()
        })
        .await
    }

    async fn update_user(
        &self,
        principal: &Principal,
        id: i32,
        update: UserUpdate,
    ) -> Result<User> {
        let now = self.clock.utc();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let mut user = queries::update_user(conn, principal, now, id, update).await?;
                queries::attach_user_auths(conn, &mut user).await?;
                Ok(user)
            }
            .scope_boxed()
        })
        .await
    }

    async fn delete_user(&self, principal: &Principal, id: i32) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move { queries::delete_user(conn, principal, id).await }.scope_boxed()
        })
        .await
    }
}
