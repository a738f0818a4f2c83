//! Retry-update engine
//!
//! Persists a single-field [`Mutation`] of a document in the presence of
//! concurrent writers:
//!
//! ```text
//! no-op or already satisfied? ──yes──▶ Ok(false), no store call
//!   │
//!   ▼
//! apply ─▶ save ──ok──▶ advance revision, Ok(true)
//!            │
//!         conflict
//!            ▼
//!         refresh ─▶ satisfied? ──yes──▶ Ok(true) (another writer converged)
//!            │
//!            └──no──▶ apply again (bounded by RetryPolicy)
//! ```
//!
//! Only revision conflicts are retried. Transport failures and any other
//! store error are returned on the spot.

use deepstyle_core::domain::document::VersionedDocument;
use deepstyle_core::domain::mutation::Mutation;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::store::DocumentStore;

/// Attempt ceiling shared by document writes and attachment uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Writes sent to the store before giving up (at least 1)
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS)
    }
}

/// Apply `mutation` to `doc` and persist it despite concurrent writers
///
/// Returns `Ok(false)` without touching the store when the mutation is a
/// no-op or the snapshot already holds the desired value. Returns `Ok(true)`
/// once the value is persisted, either by our write or by another writer
/// observed after a conflict.
///
/// `doc` is replaced wholesale by a fresh snapshot after every conflict, and
/// its revision is advanced after a successful write, so it is always safe
/// to write again.
///
/// # Errors
/// * [`StoreError::RetryExhausted`] after `policy.max_attempts` conflicting writes
/// * [`StoreError::Rejected`] if the mutation's precondition fails
/// * any non-conflict store error, unmodified
pub async fn edit_with_retry<S, D, M>(
    store: &S,
    doc: &mut D,
    mutation: &M,
    policy: &RetryPolicy,
) -> Result<bool>
where
    S: DocumentStore,
    D: VersionedDocument + Serialize + DeserializeOwned + Send + Sync,
    M: Mutation<D> + ?Sized,
{
    if mutation.is_noop() {
        debug!("Skipping empty {} update for {}", mutation.field(), doc.id());
        return Ok(false);
    }

    if mutation.is_satisfied(doc) {
        debug!("{} of {} already up to date", mutation.field(), doc.id());
        return Ok(false);
    }

    for attempt in 1..=policy.max_attempts {
        check(doc, mutation)?;
        mutation.apply(doc);

        match store.save(&*doc).await {
            Ok(revision) => {
                debug!(
                    "Updated {} of {} (revision {})",
                    mutation.field(),
                    doc.id(),
                    revision
                );
                doc.set_revision(revision);
                return Ok(true);
            }
            Err(StoreError::Conflict(_)) => {
                warn!(
                    "Conflict updating {} of {} (attempt {}/{}), refreshing",
                    mutation.field(),
                    doc.id(),
                    attempt,
                    policy.max_attempts
                );

                let id = doc.id().to_string();
                *doc = store.retrieve(&id).await?;

                if mutation.is_satisfied(doc) {
                    info!(
                        "{} of {} already set by another writer",
                        mutation.field(),
                        id
                    );
                    return Ok(true);
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(StoreError::RetryExhausted {
        id: doc.id().to_string(),
        attempts: policy.max_attempts,
    })
}

fn check<D, M>(doc: &D, mutation: &M) -> Result<()>
where
    D: VersionedDocument,
    M: Mutation<D> + ?Sized,
{
    mutation.check(doc).map_err(|reason| StoreError::Rejected {
        id: doc.id().to_string(),
        field: mutation.field(),
        reason,
    })
}
