use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::AuthError;
use crate::db::Store;
use crate::services::auth_service;

/// A caller cleared to join a club's relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorized {
    pub user_id: Uuid,
    pub club_id: Uuid,
}

/// Identity and membership checks consumed by the connection gate.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Verify a bearer token and return the user it belongs to.
    fn authenticate(&self, token: Option<&str>) -> Result<Uuid, AuthError>;

    /// Member ids of an existing club, `ClubNotFound` otherwise.
    async fn club_members(&self, club_id: Uuid) -> Result<Arc<Vec<Uuid>>, AuthError>;

    /// Club existence, then the token, then membership.
    async fn verify_and_authorize(
        &self,
        token: Option<&str>,
        club_id: &str,
    ) -> Result<Authorized, AuthError> {
        let club_id = Uuid::parse_str(club_id).map_err(|_| AuthError::ClubNotFound)?;
        let members = self.club_members(club_id).await?;
        let user_id = self.authenticate(token)?;
        if !members.contains(&user_id) {
            return Err(AuthError::NotMember);
        }
        Ok(Authorized { user_id, club_id })
    }
}

/// HS256 token verification backed by the store's club membership.
pub struct JwtAuthorizer {
    store: Arc<dyn Store>,
    secret: String,
    members: Option<Cache<Uuid, Arc<Vec<Uuid>>>>,
}

impl JwtAuthorizer {
    /// A zero `member_ttl` disables member list caching.
    pub fn new(store: Arc<dyn Store>, secret: impl Into<String>, member_ttl: Duration) -> Self {
        let members = (!member_ttl.is_zero()).then(|| {
            info!("Club member cache enabled (ttl {:?})", member_ttl);
            Cache::builder()
                .max_capacity(10_000)
                .time_to_live(member_ttl)
                .build()
        });
        Self {
            store,
            secret: secret.into(),
            members,
        }
    }

    async fn load_members(&self, club_id: Uuid) -> Result<Arc<Vec<Uuid>>, AuthError> {
        let club = self.store.get_club(club_id).await.map_err(|e| {
            error!(club_id = %club_id, "Failed to load club: {}", e);
            AuthError::Internal(e.to_string())
        })?;
        if club.is_none() {
            return Err(AuthError::ClubNotFound);
        }

        let members = self.store.get_club_member_ids(club_id).await.map_err(|e| {
            error!(club_id = %club_id, "Failed to load club members: {}", e);
            AuthError::Internal(e.to_string())
        })?;
        Ok(Arc::new(members))
    }
}

#[async_trait]
impl Authorizer for JwtAuthorizer {
    fn authenticate(&self, token: Option<&str>) -> Result<Uuid, AuthError> {
        auth_service::authenticate_token(token, &self.secret)
    }

    async fn club_members(&self, club_id: Uuid) -> Result<Arc<Vec<Uuid>>, AuthError> {
        let Some(cache) = &self.members else {
            return self.load_members(club_id).await;
        };

        if let Some(members) = cache.get(&club_id).await {
            return Ok(members);
        }

        debug!(club_id = %club_id, "Member cache miss");
        let members = self.load_members(club_id).await?;
        cache.insert(club_id, Arc::clone(&members)).await;
        Ok(members)
    }
}
