//! Transaction-scoped query helpers shared by the Diesel services.
//!
//! Every function here runs against a connection the caller has already
//! placed inside a transaction, with the transaction's frozen `now` passed
//! in for timestamp writes. Mutations that want to notify subscribers push
//! `(user_id, event)` pairs into the caller's pending-event list; the
//! services publish those only after the transaction commits.

use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::domain::dial::aggregate_value;
use crate::domain::membership::{authorize_membership_delete, validate_membership_value};
use crate::domain::report::truncate_to_minute;
use crate::domain::{
    Auth, AuthFilter, Dial, DialFilter, DialMembership, DialMembershipFilter,
    DialMembershipSortBy, DialMembershipUpdate, DialUpdate, DialValueChangedPayload,
    DialMembershipValueChangedPayload, Error, Event, NewUser, Principal, Result, User,
    UserFilter, UserUpdate,
};

use super::models::{
    AuthRow, DialMembershipRow, DialRow, DialValueRow, NewAuthRow, NewDialMembershipRow,
    NewDialRow, NewUserRow, UserRow,
};
use super::schema::{auths, dial_memberships, dial_values, dials, users};

/// Events queued inside a transaction for post-commit publication.
pub(crate) type PendingEvents = Vec<(i32, Event)>;

/// 256-bit random hex secret for API access.
pub(crate) fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// 128-bit random hex code for dial invites.
pub(crate) fn generate_invite_code() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Apply offset/limit restrictions from a filter to a boxed query.
macro_rules! apply_page {
    ($query:expr, $filter:expr) => {{
        let mut query = $query;
        if let Some(limit) = $filter.limit {
            query = query.limit(limit);
        }
        if $filter.offset > 0 {
            query = query.offset($filter.offset);
        }
        query
    }};
}

/// Page a sorted in-memory result set the same way `apply_page!` pages SQL.
fn paginate<T>(items: Vec<T>, offset: i64, limit: Option<i64>) -> Vec<T> {
    let iter = items.into_iter().skip(offset.max(0) as usize);
    match limit {
        Some(limit) => iter.take(limit.max(0) as usize).collect(),
        None => iter.collect(),
    }
}

// ---------------------------------------------------------------------------
// Users

macro_rules! user_filter_query {
    ($select:expr, $filter:expr) => {{
        let mut query = $select.into_boxed();
        if let Some(id) = $filter.id {
            query = query.filter(users::id.eq(id));
        }
        if let Some(email) = $filter.email.clone() {
            query = query.filter(users::email.eq(email));
        }
        if let Some(api_key) = $filter.api_key.clone() {
            query = query.filter(users::api_key.eq(api_key));
        }
        query
    }};
}

/// List users matching a filter together with the total match count.
/// Users are not visibility-gated.
pub(crate) async fn find_users(
    conn: &mut AsyncPgConnection,
    filter: &UserFilter,
) -> Result<(Vec<User>, i64)> {
    let total: i64 = user_filter_query!(users::table.select(count_star()), filter)
        .get_result(conn)
        .await?;

    let rows: Vec<UserRow> = apply_page!(
        user_filter_query!(users::table.select(UserRow::as_select()), filter)
            .order(users::id.asc()),
        filter
    )
    .load(conn)
    .await?;

    Ok((rows.into_iter().map(User::from).collect(), total))
}

/// Fetch a user by id. Returns `NotFound` if the user does not exist.
pub(crate) async fn find_user_by_id(conn: &mut AsyncPgConnection, id: i32) -> Result<User> {
    let row: Option<UserRow> = users::table
        .find(id)
        .select(UserRow::as_select())
        .first(conn)
        .await
        .optional()?;
    row.map(User::from)
        .ok_or_else(|| Error::not_found("User not found."))
}

/// Fetch a user by unique email, if one exists.
pub(crate) async fn find_user_by_email(
    conn: &mut AsyncPgConnection,
    email: &str,
) -> Result<Option<User>> {
    let row: Option<UserRow> = users::table
        .filter(users::email.eq(email))
        .select(UserRow::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(row.map(User::from))
}

/// Insert a new user with a fresh API key. Blank emails are stored as
/// absent so the uniqueness constraint only binds real addresses.
pub(crate) async fn create_user(
    conn: &mut AsyncPgConnection,
    now: DateTime<Utc>,
    draft: NewUser,
) -> Result<User> {
    let email = draft.email.filter(|email| !email.is_empty());
    let api_key = generate_api_key();

    let candidate = User {
        id: 0,
        name: draft.name,
        email,
        api_key,
        created_at: now,
        updated_at: now,
        auths: Vec::new(),
    };
    candidate.validate()?;

    let row: UserRow = diesel::insert_into(users::table)
        .values(&NewUserRow {
            name: &candidate.name,
            email: candidate.email.as_deref(),
            api_key: &candidate.api_key,
            created_at: now,
            updated_at: now,
        })
        .returning(UserRow::as_returning())
        .get_result(conn)
        .await?;

    Ok(User::from(row))
}

/// Update a user's editable fields. Only the user themselves may do this.
pub(crate) async fn update_user(
    conn: &mut AsyncPgConnection,
    principal: &Principal,
    now: DateTime<Utc>,
    id: i32,
    update: UserUpdate,
) -> Result<User> {
    let mut user = find_user_by_id(conn, id).await?;
    if user.id != principal.user_id() {
        return Err(Error::unauthorized("You are not allowed to update this user."));
    }

    if let Some(name) = update.name {
        user.name = name;
    }
    if let Some(email) = update.email {
        user.email = if email.is_empty() { None } else { Some(email) };
    }
    user.updated_at = now;
    user.validate()?;

    diesel::update(users::table.find(id))
        .set((
            users::name.eq(&user.name),
            users::email.eq(user.email.as_deref()),
            users::updated_at.eq(now),
        ))
        .execute(conn)
        .await?;

    Ok(user)
}

/// Delete a user. Only the user themselves may do this; owned dials,
/// auths and memberships go with them via the schema's cascades.
pub(crate) async fn delete_user(
    conn: &mut AsyncPgConnection,
    principal: &Principal,
    id: i32,
) -> Result<()> {
    let user = find_user_by_id(conn, id).await?;
    if user.id != principal.user_id() {
        return Err(Error::unauthorized("You are not allowed to delete this user."));
    }

    diesel::delete(users::table.find(id)).execute(conn).await?;
    Ok(())
}

/// Attach the user's identity bindings.
pub(crate) async fn attach_user_auths(
    conn: &mut AsyncPgConnection,
    user: &mut User,
) -> Result<()> {
    let filter = AuthFilter {
        user_id: Some(user.id),
        ..AuthFilter::default()
    };
    let (auths, _) = find_auths(conn, &filter).await?;
    user.auths = auths;
    Ok(())
}

// ---------------------------------------------------------------------------
// Auths

macro_rules! auth_filter_query {
    ($select:expr, $filter:expr) => {{
        let mut query = $select.into_boxed();
        if let Some(id) = $filter.id {
            query = query.filter(auths::id.eq(id));
        }
        if let Some(user_id) = $filter.user_id {
            query = query.filter(auths::user_id.eq(user_id));
        }
        if let Some(source) = $filter.source.clone() {
            query = query.filter(auths::source.eq(source));
        }
        if let Some(source_id) = $filter.source_id.clone() {
            query = query.filter(auths::source_id.eq(source_id));
        }
        query
    }};
}

/// List identity bindings matching a filter with the total match count.
pub(crate) async fn find_auths(
    conn: &mut AsyncPgConnection,
    filter: &AuthFilter,
) -> Result<(Vec<Auth>, i64)> {
    let total: i64 = auth_filter_query!(auths::table.select(count_star()), filter)
        .get_result(conn)
        .await?;

    let rows: Vec<AuthRow> = apply_page!(
        auth_filter_query!(auths::table.select(AuthRow::as_select()), filter)
            .order(auths::id.asc()),
        filter
    )
    .load(conn)
    .await?;

    Ok((rows.into_iter().map(Auth::from).collect(), total))
}

/// Fetch a binding by id. Returns `NotFound` if it does not exist.
pub(crate) async fn find_auth_by_id(conn: &mut AsyncPgConnection, id: i32) -> Result<Auth> {
    let row: Option<AuthRow> = auths::table
        .find(id)
        .select(AuthRow::as_select())
        .first(conn)
        .await
        .optional()?;
    row.map(Auth::from)
        .ok_or_else(|| Error::not_found("Auth not found."))
}

/// Fetch a binding by provider identity, if one exists.
pub(crate) async fn find_auth_by_source_id(
    conn: &mut AsyncPgConnection,
    source: &str,
    source_id: &str,
) -> Result<Option<Auth>> {
    let row: Option<AuthRow> = auths::table
        .filter(auths::source.eq(source))
        .filter(auths::source_id.eq(source_id))
        .select(AuthRow::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(row.map(Auth::from))
}

/// Insert a new binding after validation.
pub(crate) async fn create_auth(
    conn: &mut AsyncPgConnection,
    now: DateTime<Utc>,
    auth: &Auth,
) -> Result<Auth> {
    auth.validate()?;

    let row: AuthRow = diesel::insert_into(auths::table)
        .values(&NewAuthRow {
            user_id: auth.user_id,
            source: &auth.source,
            source_id: &auth.source_id,
            access_token: &auth.access_token,
            refresh_token: &auth.refresh_token,
            expiry: auth.expiry,
            created_at: now,
            updated_at: now,
        })
        .returning(AuthRow::as_returning())
        .get_result(conn)
        .await?;

    Ok(Auth::from(row))
}

/// Refresh the tokens and expiry on an existing binding.
pub(crate) async fn update_auth_tokens(
    conn: &mut AsyncPgConnection,
    now: DateTime<Utc>,
    id: i32,
    access_token: &str,
    refresh_token: &str,
    expiry: Option<DateTime<Utc>>,
) -> Result<Auth> {
    let mut auth = find_auth_by_id(conn, id).await?;
    auth.access_token = access_token.to_owned();
    auth.refresh_token = refresh_token.to_owned();
    auth.expiry = expiry;
    auth.updated_at = now;
    auth.validate()?;

    diesel::update(auths::table.find(id))
        .set((
            auths::access_token.eq(&auth.access_token),
            auths::refresh_token.eq(&auth.refresh_token),
            auths::expiry.eq(auth.expiry),
            auths::updated_at.eq(now),
        ))
        .execute(conn)
        .await?;

    Ok(auth)
}

/// Delete a binding. Only its owner may do this; the user row stays.
pub(crate) async fn delete_auth(
    conn: &mut AsyncPgConnection,
    principal: &Principal,
    id: i32,
) -> Result<()> {
    let auth = find_auth_by_id(conn, id).await?;
    if auth.user_id != principal.user_id() {
        return Err(Error::unauthorized("You are not allowed to delete this auth."));
    }

    diesel::delete(auths::table.find(id)).execute(conn).await?;
    Ok(())
}

/// Attach the owning user.
pub(crate) async fn attach_auth_user(
    conn: &mut AsyncPgConnection,
    auth: &mut Auth,
) -> Result<()> {
    auth.user = Some(find_user_by_id(conn, auth.user_id).await?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Dials

/// Ids of all dials the user belongs to.
async fn find_member_dial_ids(conn: &mut AsyncPgConnection, user_id: i32) -> Result<Vec<i32>> {
    let ids = dial_memberships::table
        .filter(dial_memberships::user_id.eq(user_id))
        .select(dial_memberships::dial_id)
        .load(conn)
        .await?;
    Ok(ids)
}

macro_rules! dial_filter_query {
    ($select:expr, $filter:expr, $uid:expr, $visible:expr) => {{
        let mut query = $select.into_boxed();
        if let Some(id) = $filter.id {
            query = query.filter(dials::id.eq(id));
        }
        if let Some(code) = $filter.invite_code.clone() {
            query = query.filter(dials::invite_code.eq(code));
        }
        if let Some(ids) = $visible.clone() {
            query = query.filter(dials::user_id.eq($uid).or(dials::id.eq_any(ids)));
        }
        query
    }};
}

/// List dials matching a filter with the total match count.
///
/// With an invite code in the filter the code alone decides visibility
/// (public discovery); otherwise results are restricted to dials the
/// principal owns or belongs to.
pub(crate) async fn find_dials(
    conn: &mut AsyncPgConnection,
    principal: &Principal,
    filter: &DialFilter,
) -> Result<(Vec<Dial>, i64)> {
    let uid = principal.user_id();
    let visible: Option<Vec<i32>> = if filter.invite_code.is_some() {
        None
    } else {
        Some(find_member_dial_ids(conn, uid).await?)
    };

    let total: i64 = dial_filter_query!(dials::table.select(count_star()), filter, uid, visible)
        .get_result(conn)
        .await?;

    let rows: Vec<DialRow> = apply_page!(
        dial_filter_query!(dials::table.select(DialRow::as_select()), filter, uid, visible)
            .order(dials::id.asc()),
        filter
    )
    .load(conn)
    .await?;

    Ok((rows.into_iter().map(Dial::from).collect(), total))
}

/// Fetch a dial by id under the principal's visibility. Returns `NotFound`
/// both when the dial does not exist and when it is invisible.
pub(crate) async fn find_dial_by_id(
    conn: &mut AsyncPgConnection,
    principal: &Principal,
    id: i32,
) -> Result<Dial> {
    let filter = DialFilter {
        id: Some(id),
        ..DialFilter::default()
    };
    let (mut dials, _) = find_dials(conn, principal, &filter).await?;
    if dials.is_empty() {
        return Err(Error::not_found("Dial not found."));
    }
    Ok(dials.remove(0))
}

/// Existence check without the visibility gate, for inserts whose actor is
/// not yet a member (joining a dial, owner auto-membership).
pub(crate) async fn check_dial_exists(conn: &mut AsyncPgConnection, id: i32) -> Result<()> {
    let n: i64 = dials::table
        .filter(dials::id.eq(id))
        .select(count_star())
        .get_result(conn)
        .await?;
    if n == 0 {
        return Err(Error::not_found("Dial not found."));
    }
    Ok(())
}

/// Attach the owner user to the dial.
pub(crate) async fn attach_dial_owner(
    conn: &mut AsyncPgConnection,
    dial: &mut Dial,
) -> Result<()> {
    dial.user = Some(find_user_by_id(conn, dial.user_id).await?);
    Ok(())
}

/// Insert a new dial owned by `user_id`, record the initial history point,
/// and add the owner membership.
pub(crate) async fn create_dial(
    conn: &mut AsyncPgConnection,
    now: DateTime<Utc>,
    user_id: i32,
    name: String,
    events: &mut PendingEvents,
) -> Result<Dial> {
    let invite_code = generate_invite_code();

    let candidate = Dial {
        id: 0,
        user_id,
        user: None,
        name,
        invite_code,
        value: 0,
        created_at: now,
        updated_at: now,
        memberships: Vec::new(),
    };
    candidate.validate()?;

    let row: DialRow = diesel::insert_into(dials::table)
        .values(&NewDialRow {
            user_id: candidate.user_id,
            name: &candidate.name,
            invite_code: &candidate.invite_code,
            value: candidate.value,
            created_at: now,
            updated_at: now,
        })
        .returning(DialRow::as_returning())
        .get_result(conn)
        .await?;
    let dial = Dial::from(row);

    // Seed the history so the time series is never empty for a live dial.
    insert_dial_value(conn, dial.id, 0, now).await?;

    // The owner joins their own dial immediately.
    create_dial_membership(conn, now, dial.id, dial.user_id, 0, events).await?;

    Ok(dial)
}

/// Rename a dial. Owner only.
pub(crate) async fn update_dial(
    conn: &mut AsyncPgConnection,
    principal: &Principal,
    now: DateTime<Utc>,
    id: i32,
    update: DialUpdate,
) -> Result<Dial> {
    let mut dial = find_dial_by_id(conn, principal, id).await?;
    if dial.user_id != principal.user_id() {
        return Err(Error::unauthorized("Only the owner may edit a dial."));
    }

    if let Some(name) = update.name {
        dial.name = name;
    }
    dial.updated_at = now;
    dial.validate()?;

    diesel::update(dials::table.find(id))
        .set((dials::name.eq(&dial.name), dials::updated_at.eq(now)))
        .execute(conn)
        .await?;

    Ok(dial)
}

/// Delete a dial. Owner only; memberships and history cascade.
pub(crate) async fn delete_dial(
    conn: &mut AsyncPgConnection,
    principal: &Principal,
    id: i32,
) -> Result<()> {
    let dial = find_dial_by_id(conn, principal, id).await?;
    if dial.user_id != principal.user_id() {
        return Err(Error::unauthorized("Only the owner may delete a dial."));
    }

    diesel::delete(dials::table.find(id)).execute(conn).await?;
    Ok(())
}

/// Recompute a dial's aggregate value from its memberships.
///
/// Exits silently when the dial row is gone (a concurrent delete) and when
/// the value is unchanged. Otherwise persists the new value, records the
/// minute bucket, and queues a change event for every member.
pub(crate) async fn refresh_dial_value(
    conn: &mut AsyncPgConnection,
    now: DateTime<Utc>,
    dial_id: i32,
    events: &mut PendingEvents,
) -> Result<()> {
    let old_value: Option<i32> = dials::table
        .find(dial_id)
        .select(dials::value)
        .first(conn)
        .await
        .optional()?;
    let Some(old_value) = old_value else {
        return Ok(());
    };

    let member_values: Vec<i32> = dial_memberships::table
        .filter(dial_memberships::dial_id.eq(dial_id))
        .select(dial_memberships::value)
        .load(conn)
        .await?;
    let new_value = aggregate_value(&member_values);

    if new_value == old_value {
        return Ok(());
    }

    diesel::update(dials::table.find(dial_id))
        .set((dials::value.eq(new_value), dials::updated_at.eq(now)))
        .execute(conn)
        .await?;

    insert_dial_value(conn, dial_id, new_value, now).await?;

    queue_dial_event(
        conn,
        dial_id,
        Event::DialValueChanged(DialValueChangedPayload {
            id: dial_id,
            value: new_value,
        }),
        events,
    )
    .await?;

    Ok(())
}

/// Record a dial value at a point in time, truncated to the minute bucket.
/// Re-recording the same bucket overwrites it, so updates within one minute
/// collapse to the last written value.
pub(crate) async fn insert_dial_value(
    conn: &mut AsyncPgConnection,
    dial_id: i32,
    value: i32,
    timestamp: DateTime<Utc>,
) -> Result<()> {
    let row = DialValueRow {
        dial_id,
        timestamp: truncate_to_minute(timestamp),
        value,
    };

    diesel::insert_into(dial_values::table)
        .values(&row)
        .on_conflict((dial_values::dial_id, dial_values::timestamp))
        .do_update()
        .set(dial_values::value.eq(value))
        .execute(conn)
        .await?;

    Ok(())
}

/// Queue an event for every member of a dial. Publication happens after
/// commit; a failed delivery is never surfaced to the mutating caller.
pub(crate) async fn queue_dial_event(
    conn: &mut AsyncPgConnection,
    dial_id: i32,
    event: Event,
    events: &mut PendingEvents,
) -> Result<()> {
    let member_ids: Vec<i32> = dial_memberships::table
        .filter(dial_memberships::dial_id.eq(dial_id))
        .select(dial_memberships::user_id)
        .load(conn)
        .await?;

    for user_id in member_ids {
        events.push((user_id, event.clone()));
    }
    Ok(())
}

/// All recorded history values for a dial in timestamp order.
pub(crate) async fn find_dial_values(
    conn: &mut AsyncPgConnection,
    dial_id: i32,
) -> Result<Vec<i32>> {
    let values = dial_values::table
        .filter(dial_values::dial_id.eq(dial_id))
        .order(dial_values::timestamp.asc())
        .select(dial_values::value)
        .load(conn)
        .await?;
    Ok(values)
}

/// The most recent recorded value at or before `start`, if any.
pub(crate) async fn find_dial_value_seed(
    conn: &mut AsyncPgConnection,
    dial_id: i32,
    start: DateTime<Utc>,
) -> Result<Option<i32>> {
    let value = dial_values::table
        .filter(dial_values::dial_id.eq(dial_id))
        .filter(dial_values::timestamp.le(start))
        .order(dial_values::timestamp.desc())
        .select(dial_values::value)
        .first(conn)
        .await
        .optional()?;
    Ok(value)
}

/// History points within `[start, end)` in ascending timestamp order.
pub(crate) async fn find_dial_value_points(
    conn: &mut AsyncPgConnection,
    dial_id: i32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<(DateTime<Utc>, i32)>> {
    let points = dial_values::table
        .filter(dial_values::dial_id.eq(dial_id))
        .filter(dial_values::timestamp.ge(start))
        .filter(dial_values::timestamp.lt(end))
        .order(dial_values::timestamp.asc())
        .select((dial_values::timestamp, dial_values::value))
        .load(conn)
        .await?;
    Ok(points)
}

// ---------------------------------------------------------------------------
// Dial memberships

/// Order membership rows for listing. The default puts the principal's own
/// membership first and the remaining members in user-name order; both
/// orders are stable over the id-ordered load, so ties keep insertion
/// order.
pub(crate) fn sort_membership_entries(
    entries: &mut [(DialMembership, String)],
    sort_by: DialMembershipSortBy,
    principal_id: i32,
) {
    match sort_by {
        DialMembershipSortBy::UpdatedAtDesc => {
            entries.sort_by(|a, b| b.0.updated_at.cmp(&a.0.updated_at));
        }
        DialMembershipSortBy::Default => {
            entries.sort_by(|a, b| {
                let a_not_own = a.0.user_id != principal_id;
                let b_not_own = b.0.user_id != principal_id;
                a_not_own.cmp(&b_not_own).then_with(|| a.1.cmp(&b.1))
            });
        }
    }
}

/// List memberships matching a filter with the total match count,
/// restricted to dials the principal owns or belongs to.
pub(crate) async fn find_dial_memberships(
    conn: &mut AsyncPgConnection,
    principal: &Principal,
    filter: &DialMembershipFilter,
) -> Result<(Vec<DialMembership>, i64)> {
    let uid = principal.user_id();
    let member_dial_ids = find_member_dial_ids(conn, uid).await?;

    let mut query = dial_memberships::table
        .inner_join(dials::table)
        .inner_join(users::table)
        .select((DialMembershipRow::as_select(), users::name))
        .order(dial_memberships::id.asc())
        .into_boxed();

    if let Some(id) = filter.id {
        query = query.filter(dial_memberships::id.eq(id));
    }
    if let Some(dial_id) = filter.dial_id {
        query = query.filter(dial_memberships::dial_id.eq(dial_id));
    }
    if let Some(user_id) = filter.user_id {
        query = query.filter(dial_memberships::user_id.eq(user_id));
    }
    query = query.filter(
        dials::user_id
            .eq(uid)
            .or(dial_memberships::dial_id.eq_any(member_dial_ids)),
    );

    let rows: Vec<(DialMembershipRow, String)> = query.load(conn).await?;
    let mut entries: Vec<(DialMembership, String)> = rows
        .into_iter()
        .map(|(row, user_name)| (DialMembership::from(row), user_name))
        .collect();

    sort_membership_entries(&mut entries, filter.sort_by, uid);
    let total = entries.len() as i64;
    let memberships = paginate(entries, filter.offset, filter.limit)
        .into_iter()
        .map(|(membership, _)| membership)
        .collect();

    Ok((memberships, total))
}

/// Fetch a membership by id under the principal's visibility. Returns
/// `NotFound` both when it does not exist and when it is invisible.
pub(crate) async fn find_dial_membership_by_id(
    conn: &mut AsyncPgConnection,
    principal: &Principal,
    id: i32,
) -> Result<DialMembership> {
    let filter = DialMembershipFilter {
        id: Some(id),
        ..DialMembershipFilter::default()
    };
    let (mut memberships, _) = find_dial_memberships(conn, principal, &filter).await?;
    if memberships.is_empty() {
        return Err(Error::not_found("Dial membership not found."));
    }
    Ok(memberships.remove(0))
}

/// Insert a membership and refresh the parent dial's aggregate.
///
/// The dial existence check deliberately skips the visibility gate: the
/// joining user is not a member yet, so the gated lookup would always
/// refuse them.
pub(crate) async fn create_dial_membership(
    conn: &mut AsyncPgConnection,
    now: DateTime<Utc>,
    dial_id: i32,
    user_id: i32,
    value: i32,
    events: &mut PendingEvents,
) -> Result<DialMembership> {
    let candidate = DialMembership {
        id: 0,
        dial_id,
        dial: None,
        user_id,
        user: None,
        value,
        created_at: now,
        updated_at: now,
    };
    candidate.validate()?;

    check_dial_exists(conn, dial_id).await?;
    find_user_by_id(conn, user_id).await?;

    let row: DialMembershipRow = diesel::insert_into(dial_memberships::table)
        .values(&NewDialMembershipRow {
            dial_id,
            user_id,
            value,
            created_at: now,
            updated_at: now,
        })
        .returning(DialMembershipRow::as_returning())
        .get_result(conn)
        .await?;

    refresh_dial_value(conn, now, dial_id, events).await?;

    Ok(DialMembership::from(row))
}

/// Change a membership's value. Only the membership's own user may do
/// this; setting the current value again is a no-op with no write, no
/// history row, and no event.
pub(crate) async fn update_dial_membership(
    conn: &mut AsyncPgConnection,
    principal: &Principal,
    now: DateTime<Utc>,
    id: i32,
    update: DialMembershipUpdate,
    events: &mut PendingEvents,
) -> Result<DialMembership> {
    let mut membership = find_dial_membership_by_id(conn, principal, id).await?;
    if membership.user_id != principal.user_id() {
        return Err(Error::unauthorized(
            "You do not have permission to update the dial membership.",
        ));
    }

    let new_value = update.value.unwrap_or(membership.value);
    if new_value == membership.value {
        return Ok(membership);
    }
    validate_membership_value(new_value)?;

    membership.value = new_value;
    membership.updated_at = now;

    diesel::update(dial_memberships::table.find(id))
        .set((
            dial_memberships::value.eq(new_value),
            dial_memberships::updated_at.eq(now),
        ))
        .execute(conn)
        .await?;

    refresh_dial_value(conn, now, membership.dial_id, events).await?;

    queue_dial_event(
        conn,
        membership.dial_id,
        Event::DialMembershipValueChanged(DialMembershipValueChangedPayload {
            id,
            value: new_value,
        }),
        events,
    )
    .await?;

    Ok(membership)
}

/// Delete a membership and refresh the parent dial's aggregate.
///
/// The dial owner's own membership is never deletable while the dial
/// exists; the dial owner or the membership's user may delete others.
pub(crate) async fn delete_dial_membership(
    conn: &mut AsyncPgConnection,
    principal: &Principal,
    now: DateTime<Utc>,
    id: i32,
    events: &mut PendingEvents,
) -> Result<()> {
    let membership = find_dial_membership_by_id(conn, principal, id).await?;
    let dial = find_dial_by_id(conn, principal, membership.dial_id).await?;
    authorize_membership_delete(membership.user_id, dial.user_id, principal.user_id())?;

    diesel::delete(dial_memberships::table.find(id))
        .execute(conn)
        .await?;

    refresh_dial_value(conn, now, membership.dial_id, events).await?;
    Ok(())
}

/// Attach the parent dial and owning user to a membership.
pub(crate) async fn attach_membership_associations(
    conn: &mut AsyncPgConnection,
    principal: &Principal,
    membership: &mut DialMembership,
) -> Result<()> {
    membership.dial = Some(find_dial_by_id(conn, principal, membership.dial_id).await?);
    membership.user = Some(find_user_by_id(conn, membership.user_id).await?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn generated_secrets_have_expected_entropy() {
        let api_key = generate_api_key();
        let invite_code = generate_invite_code();

        assert_eq!(api_key.len(), 64);
        assert_eq!(invite_code.len(), 32);
        assert!(api_key.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(invite_code.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(generate_invite_code(), invite_code);
    }

    #[rstest]
    fn paginate_applies_offset_then_limit() {
        let items = vec![1, 2, 3, 4, 5];
        assert_eq!(paginate(items.clone(), 0, None), vec![1, 2, 3, 4, 5]);
        assert_eq!(paginate(items.clone(), 2, None), vec![3, 4, 5]);
        assert_eq!(paginate(items.clone(), 1, Some(2)), vec![2, 3]);
        assert_eq!(paginate(items, 10, Some(2)), Vec::<i32>::new());
    }

    fn entry(id: i32, user_id: i32, name: &str) -> (DialMembership, String) {
        (DialMembership::fixture(id, 1, user_id, 0), name.to_owned())
    }

    #[rstest]
    fn default_sort_puts_own_membership_first_then_names() {
        let mut entries = vec![
            entry(1, 10, "zoe"),
            entry(2, 11, "abe"),
            entry(3, 12, "mia"),
        ];
        sort_membership_entries(&mut entries, DialMembershipSortBy::Default, 12);

        let order: Vec<i32> = entries.iter().map(|(m, _)| m.user_id).collect();
        assert_eq!(order, vec![12, 11, 10]);
    }

    #[rstest]
    fn updated_at_sort_is_descending() {
        let mut entries = vec![
            entry(1, 10, "zoe"),
            entry(2, 11, "abe"),
        ];
        entries[1].0.updated_at += chrono::Duration::minutes(5);
        sort_membership_entries(&mut entries, DialMembershipSortBy::UpdatedAtDesc, 10);

        let order: Vec<i32> = entries.iter().map(|(m, _)| m.id).collect();
        assert_eq!(order, vec![2, 1]);
    }
}
