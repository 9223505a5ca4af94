//! PostgreSQL-backed `DialMembershipService` implementation using Diesel.

use std::sync::Arc;

use async_trait::async_trait;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::AsyncConnection;
use mockable::{Clock, DefaultClock};

use crate::domain::ports::{DialMembershipService, EventService, Page};
use crate::domain::{
    DialMembership, DialMembershipFilter, DialMembershipUpdate, Error, NewDialMembership,
    Principal, Result,
};

use super::diesel_error_mapping::map_pool_error;
use super::diesel_queries::{self as queries, PendingEvents};
use super::DbPool;

/// Diesel-backed implementation of the dial membership service port.
///
/// Like the dial service, mutations publish their queued events only after
/// the transaction commits.
#[derive(Clone)]
pub struct DieselDialMembershipService {
    pool: DbPool,
    events: Arc<dyn EventService>,
    clock: Arc<dyn Clock>,
}

impl DieselDialMembershipService {
    /// Create a new service publishing to `events`, with the system clock.
    pub fn new(pool: DbPool, events: Arc<dyn EventService>) -> Self {
        Self::with_clock(pool, events, Arc::new(DefaultClock))
    }

    /// Create a new service with an injected clock.
    pub fn with_clock(
        pool: DbPool,
        events: Arc<dyn EventService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            events,
            clock,
        }
    }

    fn publish_pending(&self, pending: PendingEvents) {
        for (user_id, event) in pending {
            self.events.publish(user_id, event);
        }
    }
}

#[async_trait]
impl DialMembershipService for DieselDialMembershipService {
    async fn find_dial_membership_by_id(
        &self,
        principal: &Principal,
        id: i32,
    ) -> Result<DialMembership> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let mut membership =
                    queries::find_dial_membership_by_id(conn, principal, id).await?;
                queries::attach_membership_associations(conn, principal, &mut membership).await?;
                Ok(membership)
            }
            .scope_boxed()
        })
        .await
    }

    async fn find_dial_memberships(
        &self,
        principal: &Principal,
        filter: DialMembershipFilter,
    ) -> Result<Page<DialMembership>> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let (mut items, total) =
                    queries::find_dial_memberships(conn, principal, &filter).await?;
                // Resolved one at a time; fine for an in-process database,
                // batch this up against a remote server.
                for membership in &mut items {
                    queries::attach_membership_associations(conn, principal, membership).await?;
                }
                Ok(Page { items, total })
            }
            .scope_boxed()
        })
        .await
    }

    async fn create_dial_membership(
        &self,
        principal: &Principal,
        draft: NewDialMembership,
    ) -> Result<DialMembership> {
        if principal.is_anonymous() {
            return Err(Error::unauthorized("You must be logged in to join a dial."));
        }

        let now = self.clock.utc();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let (membership, pending) = conn
            .transaction::<_, Error, _>(|conn| {
                async move {
                    let mut pending = PendingEvents::new();
                    let mut membership = queries::create_dial_membership(
                        conn,
                        now,
                        draft.dial_id,
                        principal.user_id(),
                        draft.value,
                        &mut pending,
                    )
                    .await?;
                    queries::attach_membership_associations(conn, principal, &mut membership)
                        .await?;
                    Ok((membership, pending))
                }
                .scope_boxed()
            })
            .await?;

        self.publish_pending(pending);
        Ok(membership)
    }

    async fn update_dial_membership(
        &self,
        principal: &Principal,
        id: i32,
        update: DialMembershipUpdate,
    ) -> Result<DialMembership> {
        let now = self.clock.utc();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let (membership, pending) = conn
            .transaction::<_, Error, _>(|conn| {
                async move {
                    let mut pending = PendingEvents::new();
                    let mut membership = queries::update_dial_membership(
                        conn,
                        principal,
                        now,
                        id,
                        update,
                        &mut pending,
                    )
                    .await?;
                    queries::attach_membership_associations(conn, principal, &mut membership)
                        .await?;
                    Ok((membership, pending))
                }
                .scope_boxed()
            })
            .await?;

        self.publish_pending(pending);
        Ok(membership)
    }

    async fn delete_dial_membership(&self, principal: &Principal, id: i32) -> Result<()> {
        let now = self.clock.utc();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let pending = conn
            .transaction::<_, Error, _>(|conn| {
                async move {
                    let mut pending = PendingEvents::new();
                    queries::delete_dial_membership(conn, principal, now, id, &mut pending)
                        .await?;
                    Ok(pending)
                }
                .scope_boxed()
            })
            .await?;

        self.publish_pending(pending);
        Ok(())
    }
}
