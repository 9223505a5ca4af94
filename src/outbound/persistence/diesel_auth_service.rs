//! PostgreSQL-backed `AuthService` implementation using Diesel.
//!
//! Carries the OAuth link-or-create semantics: a binding that already
//! exists for the provider identity gets fresh tokens, otherwise the
//! embedded user draft is linked by unique email or created inside the
//! same transaction as the binding.

use std::sync::Arc;

use async_trait::async_trait;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::AsyncConnection;
use mockable::{Clock, DefaultClock};

use crate::domain::ports::{AuthService, Page};
use crate::domain::{Auth, AuthFilter, Error, NewAuth, Principal, Result};

use super::diesel_error_mapping::map_pool_error;
use super::diesel_queries as queries;
use super::DbPool;

/// Diesel-backed implementation of the auth service port.
#[derive(Clone)]
pub struct DieselAuthService {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl DieselAuthService {
    /// Create a new service with the system clock.
    pub fn new(pool: DbPool) -> Self {
        Self::with_clock(pool, Arc::new(DefaultClock))
    }

    /// Create a new service with an injected clock.
    pub fn with_clock(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl AuthService for DieselAuthService {
    async fn find_auth_by_id(&self, _principal: &Principal, id: i32) -> Result<Auth> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let mut auth = queries::find_auth_by_id(conn, id).await?;
                queries::attach_auth_user(conn, &mut auth).await?;
                Ok(auth)
            }
            .scope_boxed()
        })
        .await
    }

    async fn find_auths(&self, _principal: &Principal, filter: AuthFilter) -> Result<Page<Auth>> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let (mut items, total) = queries::find_auths(conn, &filter).await?;
                for auth in &mut items {
                    queries::attach_auth_user(conn, auth).await?;
                }
                Ok(Page { items, total })
            }
            .scope_boxed()
        })
        .await
    }

    async fn create_auth(&self, _principal: &Principal, draft: NewAuth) -> Result<Auth> {
        let now = self.clock.utc();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move {
                // A binding that already exists for this provider identity
                // just gets its tokens refreshed.
                if let Some(existing) =
                    queries::find_auth_by_source_id(conn, &draft.source, &draft.source_id).await?
                {
                    let mut auth = queries::update_auth_tokens(
                        conn,
                        now,
                        existing.id,
                        &draft.access_token,
                        draft.refresh_token.as_deref().unwrap_or_default(),
                        draft.expiry,
                    )
                    .await?;
                    queries::attach_auth_user(conn, &mut auth).await?;
                    return Ok(auth);
                }

                // Resolve the owning user: an explicit id wins; otherwise an
                // embedded draft links by unique email or creates the user.
                let user = match (draft.user_id, draft.user.as_ref()) {
                    (Some(id), _) if id != 0 => Some(queries::find_user_by_id(conn, id).await?),
                    (_, Some(new_user)) => {
                        let email = new_user.email.as_deref().filter(|email| !email.is_empty());
                        let existing = match email {
                            Some(email) => queries::find_user_by_email(conn, email).await?,
                            None => None,
                        };
                        match existing {
                            Some(user) => Some(user),
                            None => {
                                Some(queries::create_user(conn, now, new_user.clone()).await?)
                            }
                        }
                    }
                    _ => None,
                };

                let candidate = Auth {
                    id: 0,
                    user_id: user.as_ref().map_or(0, |user| user.id),
                    user: None,
                    source: draft.source,
                    source_id: draft.source_id,
                    access_token: draft.access_token,
                    refresh_token: draft.refresh_token.unwrap_or_default(),
                    expiry: draft.expiry,
                    created_at: now,
                    updated_at: now,
                };

                let mut auth = queries::create_auth(conn, now, &candidate).await?;
                auth.user = user;
                Ok(auth)
            }
            .scope_boxed()
        })
        .await
    }

    async fn delete_auth(&self, principal: &Principal, id: i32) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, Error, _>(|conn| {
            async move { queries::delete_auth(conn, principal, id).await }.scope_boxed()
        })
        .await
    }
}
