//! Driving ports: the service traits the core exposes to transports.
//!
//! Every operation takes the request's [`Principal`] explicitly; services
//! read it for authorization and visibility but never mutate it. All
//! failures carry one of the closed error kinds in
//! [`crate::domain::ErrorCode`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::domain::auth::{Auth, AuthFilter, NewAuth};
use crate::domain::dial::{Dial, DialFilter, DialUpdate, NewDial};
use crate::domain::event::Event;
use crate::domain::membership::{
    DialMembership, DialMembershipFilter, DialMembershipUpdate, NewDialMembership,
};
use crate::domain::principal::Principal;
use crate::domain::report::DialValueReport;
use crate::domain::user::{NewUser, User, UserFilter, UserUpdate};
use crate::domain::Result;

/// One page of results plus the total number of rows matching the filter,
/// which may exceed the page when a limit is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

/// Service for managing users.
#[async_trait]
pub trait UserService: Send + Sync {
    /// Retrieves a user by id along with their identity bindings.
    /// Returns `NotFound` if the user does not exist.
    async fn find_user_by_id(&self, principal: &Principal, id: i32) -> Result<User>;

    /// Retrieves a page of users matching the filter.
    async fn find_users(&self, principal: &Principal, filter: UserFilter) -> Result<Page<User>>;

    /// Creates a new user with a fresh API key. Users are normally created
    /// through the OAuth flow in [`AuthService::create_auth`]; this exists
    /// for seeding and tests.
    async fn create_user(&self, principal: &Principal, draft: NewUser) -> Result<User>;

    /// Updates a user's name or email. Returns `Unauthorized` unless the
    /// principal is the user being updated; `NotFound` if the user does
    /// not exist.
    async fn update_user(
        &self,
        principal: &Principal,
        id: i32,
        update: UserUpdate,
    ) -> Result<User>;

    /// Permanently deletes a user together with their owned dials and
    /// memberships. Same authorization as [`Self::update_user`].
    async fn delete_user(&self, principal: &Principal, id: i32) -> Result<()>;
}

/// Service for managing OAuth identity bindings.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Looks up a binding by id along with the associated user.
    /// Returns `NotFound` if the id does not exist.
    async fn find_auth_by_id(&self, principal: &Principal, id: i32) -> Result<Auth>;

    /// Retrieves a page of bindings matching the filter.
    async fn find_auths(&self, principal: &Principal, filter: AuthFilter) -> Result<Page<Auth>>;

    /// Creates a binding. If one already exists for `(source, source_id)`,
    /// its tokens and expiry are refreshed and the existing binding is
    /// returned. Otherwise the draft's embedded user is linked by unique
    /// email or created first.
    async fn create_auth(&self, principal: &Principal, draft: NewAuth) -> Result<Auth>;

    /// Permanently deletes a binding. The owning user is not removed.
    /// Returns `Unauthorized` unless the principal owns the binding.
    async fn delete_auth(&self, principal: &Principal, id: i32) -> Result<()>;
}

/// Service for managing dials.
#[async_trait]
pub trait DialService: Send + Sync {
    /// Retrieves a dial by id with its owner and memberships attached. Only
    /// the owner and members can see a dial; anyone else gets `NotFound`,
    /// never `Unauthorized`, so existence does not leak.
    async fn find_dial_by_id(&self, principal: &Principal, id: i32) -> Result<Dial>;

    /// Retrieves a page of dials. With an invite code in the filter, the
    /// code alone decides visibility (public discovery); otherwise only
    /// dials the principal belongs to are returned.
    async fn find_dials(&self, principal: &Principal, filter: DialFilter) -> Result<Page<Dial>>;

    /// Creates a dial owned by the principal, records the initial history
    /// point, and adds the owner membership. Returns `Unauthorized` when
    /// nobody is logged in.
    async fn create_dial(&self, principal: &Principal, draft: NewDial) -> Result<Dial>;

    /// Renames a dial. Owner only.
    async fn update_dial(
        &self,
        principal: &Principal,
        id: i32,
        update: DialUpdate,
    ) -> Result<Dial>;

    /// Permanently deletes a dial together with its memberships and
    /// history. Owner only.
    async fn delete_dial(&self, principal: &Principal, id: i32) -> Result<()>;

    /// Sets the principal's own membership value on a dial without
    /// requiring the membership id. Returns `NotFound` if the principal is
    /// not a member of the dial.
    async fn set_dial_membership_value(
        &self,
        principal: &Principal,
        dial_id: i32,
        value: i32,
    ) -> Result<()>;

    /// Average value across all dials visible to the principal, bucketed
    /// into `interval`-sized slots over `[start, end)`. The minimum
    /// interval is one minute.
    async fn average_dial_value_report(
        &self,
        principal: &Principal,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Duration,
    ) -> Result<DialValueReport>;

    /// All recorded history values for a dial in timestamp order. Intended
    /// for diagnostics; visibility matches [`Self::find_dial_by_id`].
    async fn dial_values(&self, principal: &Principal, id: i32) -> Result<Vec<i32>>;
}

/// Service for managing dial memberships.
#[async_trait]
pub trait DialMembershipService: Send + Sync {
    /// Retrieves a membership by id with its dial and user attached.
    /// Returns `NotFound` if it does not exist or the principal cannot see
    /// the containing dial.
    async fn find_dial_membership_by_id(
        &self,
        principal: &Principal,
        id: i32,
    ) -> Result<DialMembership>;

    /// Retrieves a page of memberships restricted to dials the principal
    /// owns or belongs to.
    async fn find_dial_memberships(
        &self,
        principal: &Principal,
        filter: DialMembershipFilter,
    ) -> Result<Page<DialMembership>>;

    /// Joins the principal to a dial. Returns `Unauthorized` when nobody is
    /// logged in; `NotFound` when the dial does not exist.
    async fn create_dial_membership(
        &self,
        principal: &Principal,
        draft: NewDialMembership,
    ) -> Result<DialMembership>;

    /// Changes a membership's value. Only the membership's own user may
    /// update it. Setting the current value again is a no-op (no write, no
    /// history row, no event).
    async fn update_dial_membership(
        &self,
        principal: &Principal,
        id: i32,
        update: DialMembershipUpdate,
    ) -> Result<DialMembership>;

    /// Deletes a membership. The dial owner's own membership cannot be
    /// deleted (`Conflict`); the dial owner or the membership's user may
    /// delete others (`Unauthorized` for anyone else).
    async fn delete_dial_membership(&self, principal: &Principal, id: i32) -> Result<()>;
}

/// Service for event dispatch and subscriptions.
///
/// Events are user-centric: publishing targets a user id and reaches every
/// live subscription that user holds. Dial-level fan-out is performed by
/// the stores, which publish to each member of the affected dial.
pub trait EventService: Send + Sync {
    /// Publishes an event to a user's subscriptions. A no-op when the user
    /// is not subscribed; never blocks the publisher.
    fn publish(&self, user_id: i32, event: Event);

    /// Creates a subscription for the principal's events. Returns
    /// `Unauthorized` when nobody is logged in. Callers must `close` the
    /// subscription (or drop it) when done.
    fn subscribe(&self, principal: &Principal) -> Result<Box<dyn Subscription>>;
}

/// A stream of events for a single user.
///
/// Each subscription buffers a bounded number of undelivered events; a
/// subscriber that falls behind is evicted by the bus rather than allowed
/// to block publishers.
#[async_trait]
pub trait Subscription: Send {
    /// Next event, or `None` once the subscription is closed and drained.
    async fn next_event(&mut self) -> Option<Event>;

    /// Disconnects from the event service. Idempotent; buffered events can
    /// still be drained afterwards.
    fn close(&mut self);
}
