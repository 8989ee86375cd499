//! Time-bounded, token-identified leases over queues and items.
//!
//! A lease is live strictly before its `expires_at`. Expired leases are
//! never revoked proactively: the next competing acquisition takes them
//! over, or the cleanup sweep deletes them. Tokens are stored only as
//! SHA-256 digests, so a token is shown exactly once, to its acquirer.

use std::sync::Arc;

use chrono::Duration;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::lock::{Lock, LockGrant, LockScope};
use crate::persistence::db::Database;
use crate::persistence::lock_repo::LockRepo;
use crate::{AppError, Result};

/// Grants, releases, and sweeps leases.
#[derive(Clone)]
pub struct LockManager {
    repo: LockRepo,
    clock: Arc<dyn Clock>,
    default_ttl_seconds: i64,
}

impl LockManager {
    /// Build a manager over `db`. `default_ttl_seconds` replaces
    /// non-positive TTLs supplied by callers.
    #[must_use]
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, default_ttl_seconds: i64) -> Self {
        Self {
            repo: LockRepo::new(db),
            clock,
            default_ttl_seconds: default_ttl_seconds.max(1),
        }
    }

    /// TTL actually applied for a requested value.
    #[must_use]
    pub fn effective_ttl(&self, ttl_seconds: i64) -> i64 {
        if ttl_seconds > 0 {
            ttl_seconds
        } else {
            self.default_ttl_seconds
        }
    }

    /// Acquire or renew the lease on `(scope, target_id)` for `holder`.
    ///
    /// Succeeds when the target is free, already held by `holder`, or held
    /// by someone else under an expired lease. Every success issues a
    /// fresh token; earlier tokens for the same lease stop matching.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LockUnavailable` when another holder owns a live
    /// lease, `AppError::Validation` for blank identifiers, or
    /// `AppError::Db` on persistence failure.
    pub async fn acquire(
        &self,
        scope: LockScope,
        target_id: &str,
        holder: &str,
        ttl_seconds: i64,
    ) -> Result<LockGrant> {
        if target_id.trim().is_empty() || holder.trim().is_empty() {
            return Err(AppError::Validation(
                "target_id and holder must not be blank".into(),
            ));
        }

        let ttl = self.effective_ttl(ttl_seconds);
        let now = self.clock.now();
        let expires_at = now + Duration::seconds(ttl);
        let token = new_token();

        let granted = self
            .repo
            .try_acquire(scope, target_id, holder, &hash_token(&token), now, expires_at)
            .await?;

        if let Some(lock) = granted {
            debug!(
                lock_id = %lock.id,
                ?scope,
                target_id,
                holder,
                ttl_seconds = ttl,
                "lease granted"
            );
            Ok(LockGrant { lock, token })
        } else {
            debug!(?scope, target_id, holder, "lease held by another agent");
            Err(AppError::LockUnavailable(format!(
                "{} {target_id} is locked by another holder",
                scope.as_db_str()
            )))
        }
    }

    /// Release the live lease identified by `token` on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LockUnavailable` if no live lease matches the token
    /// or the lease belongs to someone other than `actor`.
    pub async fn release(&self, token: &str, actor: &str) -> Result<Lock> {
        let now = self.clock.now();
        match self
            .repo
            .delete_by_token(&hash_token(token), actor, now)
            .await?
        {
            Some(lock) => {
                debug!(lock_id = %lock.id, holder = actor, "lease released");
                Ok(lock)
            }
            None => Err(AppError::LockUnavailable(
                "no live lease matches the token for this holder".into(),
            )),
        }
    }

    /// Hand the lease on `(scope, target_id)` to `holder`, displacing any
    /// current holder. Used once a versioned commit has already decided who
    /// owns the target; the displaced holder's token stops matching.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on persistence failure.
    pub async fn take_over(
        &self,
        scope: LockScope,
        target_id: &str,
        holder: &str,
        ttl_seconds: i64,
    ) -> Result<LockGrant> {
        let ttl = self.effective_ttl(ttl_seconds);
        let now = self.clock.now();
        let token = new_token();
        let lock = self
            .repo
            .take_over(
                scope,
                target_id,
                holder,
                &hash_token(&token),
                now,
                now + Duration::seconds(ttl),
            )
            .await?;
        debug!(lock_id = %lock.id, ?scope, target_id, holder, ttl_seconds = ttl, "lease taken over");
        Ok(LockGrant { lock, token })
    }

    /// Drop whatever lease exists on a target.
    ///
    /// With `holder = Some(..)` only that holder's lease is removed; `None`
    /// removes it unconditionally (administrative reclaim). Returns whether
    /// a lease was removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on persistence failure.
    pub async fn release_target(
        &self,
        scope: LockScope,
        target_id: &str,
        holder: Option<&str>,
    ) -> Result<bool> {
        self.repo.delete_target(scope, target_id, holder).await
    }

    /// Delete every expired lease. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on persistence failure.
    #[instrument(name = "cleanup_expired_locks", skip(self))]
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let reclaimed = self.repo.delete_expired(self.clock.now()).await?;
        if reclaimed > 0 {
            info!(reclaimed, "expired leases reclaimed");
        }
        Ok(reclaimed)
    }

    /// Live lease on a target, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on persistence failure.
    pub async fn live_lock(&self, scope: LockScope, target_id: &str) -> Result<Option<Lock>> {
        self.repo.find_live(scope, target_id, self.clock.now()).await
    }

    /// Every live lease.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on persistence failure.
    pub async fn list_live(&self) -> Result<Vec<Lock>> {
        self.repo.list_live(self.clock.now()).await
    }
}

fn new_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// SHA-256 hex digest under which a token is stored.
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
