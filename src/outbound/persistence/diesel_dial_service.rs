//! PostgreSQL-backed `DialService` implementation using Diesel.
//!
//! Mutations queue their change events inside the transaction and publish
//! them to the event service only after commit, so subscribers never see an
//! event for state that was rolled back.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::AsyncConnection;
use mockable::{Clock, DefaultClock};

use crate::domain::ports::{DialService, EventService, Page};
use crate::domain::report::{
    average_slots, build_report, fill_slots, slot_count, truncate_to_interval,
    validate_report_interval,
};
use crate::domain::{
    Dial, DialFilter, DialMembershipFilter, DialMembershipUpdate, DialUpdate, DialValueReport,
    Error, NewDial, Principal, Result,
};

use super::diesel_error_mapping::map_pool_error;
use super::diesel_queries::{self as queries, PendingEvents};
use super::DbPool;

/// Diesel-backed implementation of the dial service port.
#[derive(Clone)]
pub struct DieselDialService {
    pool: DbPool,
    events: Arc<dyn EventService>,
    clock: Arc<dyn Clock>,
}

impl DieselDialService {
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

    /// Deliver events queued by a committed transaction. Fire-and-forget;
    /// delivery failures never surface to the mutating caller.
    fn publish_pending(&self, pending: PendingEvents) {
        for (user_id, event) in pending {
            self.events.publish(user_id, event);
        }
    }
}

#[async_trait]
impl DialService for DieselDialService {
    async fn find_dial_by_id(&self, principal: &Principal, id: i32) -> Result<Dial> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let mut dial = queries::find_dial_by_id(conn, principal, id).await?;
                queries::attach_dial_owner(conn, &mut dial).await?;

                // Single-object reads carry the member list with each
                // member's user resolved.
                let filter = DialMembershipFilter {
                    dial_id: Some(id),
                    ..DialMembershipFilter::default()
                };
                let (mut memberships, _) =
                    queries::find_dial_memberships(conn, principal, &filter).await?;
                for membership in &mut memberships {
                    membership.user =
                        Some(queries::find_user_by_id(conn, membership.user_id).await?);
                }
                dial.memberships = memberships;

                Ok(dial)
            }
            .scope_boxed()
        })
        .await
    }

    async fn find_dials(&self, principal: &Principal, filter: DialFilter) -> Result<Page<Dial>> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let (mut items, total) = queries::find_dials(conn, principal, &filter).await?;
                for dial in &mut items {
                    queries::attach_dial_owner(conn, dial).await?;
                }
                Ok(Page { items, total })
            }
            .scope_boxed()
        })
        .await
    }

    async fn create_dial(&self, principal: &Principal, draft: NewDial) -> Result<Dial> {
        if principal.is_anonymous() {
            return Err(Error::unauthorized("You must be logged in to create a dial."));
        }

        let now = self.clock.utc();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let (dial, pending) = conn
            .transaction::<_, Error, _>(|conn| {
                async move {
                    let mut pending = PendingEvents::new();
                    let mut dial = queries::create_dial(
                        conn,
                        now,
                        principal.user_id(),
                        draft.name,
                        &mut pending,
                    )
                    .await?;
                    queries::attach_dial_owner(conn, &mut dial).await?;
                    Ok((dial, pending))
                }
                .scope_boxed()
            })
            .await?;

        self.publish_pending(pending);
        Ok(dial)
    }

    async fn update_dial(
        &self,
        principal: &Principal,
        id: i32,
        update: DialUpdate,
    ) -> Result<Dial> {
        let now = self.clock.utc();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let mut dial = queries::update_dial(conn, principal, now, id, update).await?;
                queries::attach_dial_owner(conn, &mut dial).await?;
                Ok(dial)
            }
            .scope_boxed()
        })
        .await
    }

    async fn delete_dial(&self, principal: &Principal, id: i32) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move { queries::delete_dial(conn, principal, id).await }.scope_boxed()
        })
        .await
    }

    async fn set_dial_membership_value(
        &self,
        principal: &Principal,
        dial_id: i32,
        value: i32,
    ) -> Result<()> {
        let now = self.clock.utc();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let pending = conn
            .transaction::<_, Error, _>(|conn| {
                async move {
                    let filter = DialMembershipFilter {
                        dial_id: Some(dial_id),
                        user_id: Some(principal.user_id()),
                        ..DialMembershipFilter::default()
                    };
                    let (memberships, _) =
                        queries::find_dial_memberships(conn, principal, &filter).await?;
                    let Some(membership) = memberships.first() else {
                        return Err(Error::not_found("User is not a member of this dial."));
                    };

                    let mut pending = PendingEvents::new();
                    queries::update_dial_membership(
                        conn,
                        principal,
                        now,
                        membership.id,
                        DialMembershipUpdate { value: Some(value) },
                        &mut pending,
                    )
                    .await?;
                    Ok(pending)
                }
                .scope_boxed()
            })
            .await?;

        self.publish_pending(pending);
        Ok(())
    }

    async fn average_dial_value_report(
        &self,
        principal: &Principal,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Duration,
    ) -> Result<DialValueReport> {
        validate_report_interval(interval)?;

        // Line the report range up with the interval unit; the final slot's
        // right edge is `end`, exclusive.
        let start = truncate_to_interval(start, interval);
        let end = truncate_to_interval(end, interval);
        let slots = slot_count(start, end, interval);
        if slots == 0 {
            return Ok(DialValueReport::default());
        }

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let (dials, _) =
                    queries::find_dials(conn, principal, &DialFilter::default()).await?;

                let mut series = Vec::with_capacity(dials.len());
                for dial in &dials {
                    let seed = queries::find_dial_value_seed(conn, dial.id, start).await?;
                    let points =
                        queries::find_dial_value_points(conn, dial.id, start, end).await?;
                    series.push(fill_slots(seed, &points, start, interval, slots));
                }

                let averages = average_slots(&series, slots);
                Ok(build_report(start, interval, &averages))
            }
            .scope_boxed()
        })
        .await
    }

    async fn dial_values(&self, principal: &Principal, id: i32) -> Result<Vec<i32>> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                queries::find_dial_by_id(conn, principal, id).await?;
                queries::find_dial_values(conn, id).await
            }
            .scope_boxed()
        })
        .await
    }
}
