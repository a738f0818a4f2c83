//! Attachment uploader
//!
//! The store only accepts an attachment PUT that names the document's
//! current revision, and that revision is spent by any write. Every attempt
//! therefore reloads the document immediately before its PUT:
//!
//! ```text
//! for attempt in 1..=max_attempts:
//!     refresh snapshot           (GET document)
//!     PUT {base}/{id}/{name}?rev={snapshot revision}
//!         2xx   -> adopt the returned revision, done
//!         409   -> another writer got in first, next attempt
//!         other -> UnexpectedStatus, no retry
//! RetryExhausted
//! ```
//!
//! Nothing is read back after a successful PUT. The snapshot records a stub
//! for the new attachment alongside the returned revision, so a later full
//! write keeps the attachment.

use std::path::Path;

use bytes::Bytes;
use deepstyle_core::domain::document::VersionedDocument;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::retry::RetryPolicy;
use crate::store::DocumentStore;

/// Media type used when the caller does not name one
pub const DEFAULT_CONTENT_TYPE: &str = "image/png";

/// A named payload ready to be attached to a document
///
/// The body is held in memory so every attempt can send it again.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub body: Bytes,
    /// Where the body came from, for error messages
    pub source: String,
}

impl Attachment {
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            body: body.into(),
            source: "<memory>".to_string(),
        }
    }

    /// Read the whole file at `path` as the attachment body
    pub async fn from_file(
        name: impl Into<String>,
        content_type: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let body = tokio::fs::read(path).await?;

        Ok(Self {
            name: name.into(),
            content_type: content_type.into(),
            body: Bytes::from(body),
            source: path.display().to_string(),
        })
    }
}

/// Attach `attachment` to the document `doc` snapshots
///
/// `doc` is replaced by a fresh snapshot before each attempt. After success
/// it lists the new attachment and carries the revision the upload produced.
/// If the store did not report that revision, `doc` keeps the one it was
/// uploaded against and the next write through [`crate::edit_with_retry`]
/// conflicts once and reloads.
///
/// # Errors
/// * [`StoreError::UnexpectedStatus`] on a status other than 2xx or 409
/// * [`StoreError::RetryExhausted`] after `policy.max_attempts` conflicting PUTs
/// * any error from refreshing the snapshot or sending the request
pub async fn upload_attachment<S, D>(
    store: &S,
    doc: &mut D,
    attachment: &Attachment,
    policy: &RetryPolicy,
) -> Result<()>
where
    S: DocumentStore,
    D: VersionedDocument + DeserializeOwned + Send + Sync,
{
    let id = doc.id().to_string();

    for attempt in 1..=policy.max_attempts {
        *doc = store.retrieve(&id).await?;

        let write = store
            .put_attachment(
                &id,
                &attachment.name,
                doc.revision(),
                &attachment.content_type,
                attachment.body.clone(),
            )
            .await?;

        if write.status == StatusCode::CONFLICT {
            warn!(
                "Conflict attaching {} to {} (attempt {}/{}), retrying",
                attachment.name, id, attempt, policy.max_attempts
            );
            continue;
        }

        if !write.status.is_success() {
            return Err(StoreError::UnexpectedStatus {
                attachment: attachment.name.clone(),
                source_path: attachment.source.clone(),
                status: write.status.as_u16(),
            });
        }

        debug!(
            "Attached {} ({} bytes) to {} on attempt {}",
            attachment.name,
            attachment.body.len(),
            id,
            attempt
        );

        match write.revision {
            Some(revision) => {
                doc.set_revision(revision);
                doc.record_attachment(
                    &attachment.name,
                    &attachment.content_type,
                    attachment.body.len(),
                );
                info!(
                    "Attachment {} stored on {}/{} at revision {}",
                    attachment.name,
                    store.base_url(),
                    id,
                    doc.revision()
                );
            }
            None => warn!(
                "Attachment {} stored on {}/{} but no revision was returned",
                attachment.name,
                store.base_url(),
                id
            ),
        }
        return Ok(());
    }

    Err(StoreError::RetryExhausted {
        id,
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, job_json};
    use deepstyle_core::domain::job::{JobDocument, JobState};
    use std::io::Write;

    async fn setup() -> (MemoryStore, JobDocument) {
        let store = MemoryStore::new();
        store.insert(job_json("job-42", "NOT_READY_TO_PROCESS"));
        let job = store.retrieve("job-42").await.unwrap();
        store.reset_counters();
        (store, job)
    }

    fn png() -> Attachment {
        Attachment::from_bytes("source.png", DEFAULT_CONTENT_TYPE, &b"\x89PNG fake"[..])
    }

    #[tokio::test]
    async fn test_upload_refreshes_before_put_and_adopts_new_revision() {
        let (store, mut job) = setup().await;

        upload_attachment(&store, &mut job, &png(), &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(store.puts(), 1);
        assert_eq!(store.retrieves_of("job-42"), 1);
        assert_eq!(store.stale_puts(), 0);
        assert_eq!(
            store.attachment("job-42", "source.png").unwrap(),
            Bytes::from_static(b"\x89PNG fake")
        );
        assert!(job.has_attachment("source.png"));
        assert_eq!(job.revision(), store.current_revision("job-42"));
    }

    #[tokio::test]
    async fn test_conflicts_are_retried_with_fresh_revisions() {
        let (store, mut job) = setup().await;
        store.script_puts([409, 409, 409]);

        upload_attachment(&store, &mut job, &png(), &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(store.puts(), 4);
        assert_eq!(store.stale_puts(), 0);
        assert!(job.has_attachment("source.png"));
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_never_used_for_put() {
        let (store, mut job) = setup().await;

        // Someone else writes after our initial load; the uploader must not
        // reuse the revision it was handed.
        let mut other: JobDocument = store.retrieve("job-42").await.unwrap();
        crate::edit_with_retry(
            &store,
            &mut other,
            &deepstyle_core::domain::job::SetStdOutAndErr("warming up".to_string()),
            &RetryPolicy::default(),
        )
        .await
        .unwrap();

        upload_attachment(&store, &mut job, &png(), &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(store.puts(), 1);
        assert_eq!(store.stale_puts(), 0);
        assert_eq!(job.std_out_and_err(), "warming up");
    }

    #[tokio::test]
    async fn test_stored_attachment_is_success_even_if_reads_fail_afterwards() {
        let (store, mut job) = setup().await;
        store.fail_reads_after_put();

        upload_attachment(&store, &mut job, &png(), &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(store.puts(), 1);
        assert!(store.attachment("job-42", "source.png").is_some());
        assert!(job.has_attachment("source.png"));
        assert_eq!(job.revision(), store.current_revision("job-42"));

        // The adopted revision and stub let the next write go through
        // without a reload, and the attachment stays listed.
        let updated = crate::edit_with_retry(
            &store,
            &mut job,
            &deepstyle_core::domain::job::SetState(JobState::ReadyToProcess),
            &RetryPolicy::default(),
        )
        .await
        .unwrap();
        assert!(updated);
        assert_eq!(store.stored("job-42")["_attachments"]["source.png"]["stub"], true);
    }

    #[tokio::test]
    async fn test_missing_revision_leaves_snapshot_to_reload_on_next_write() {
        let (store, mut job) = setup().await;
        store.omit_put_revisions();
        let uploaded_against = store.current_revision("job-42");

        upload_attachment(&store, &mut job, &png(), &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(job.revision(), uploaded_against);
        assert!(!job.has_attachment("source.png"));

        crate::edit_with_retry(
            &store,
            &mut job,
            &deepstyle_core::domain::job::SetState(JobState::ReadyToProcess),
            &RetryPolicy::default(),
        )
        .await
        .unwrap();

        assert!(job.has_attachment("source.png"));
        assert_eq!(store.saves(), 2);
        let stored = store.stored("job-42");
        assert_eq!(stored["state"], "READY_TO_PROCESS");
        assert_eq!(stored["_attachments"]["source.png"]["stub"], true);
    }

    #[tokio::test]
    async fn test_unexpected_status_fails_immediately() {
        for status in [404, 500] {
            let (store, mut job) = setup().await;
            store.script_puts([status]);

            let err = upload_attachment(&store, &mut job, &png(), &RetryPolicy::default())
                .await
                .unwrap_err();

            match err {
                StoreError::UnexpectedStatus {
                    attachment,
                    source_path,
                    status: got,
                } => {
                    assert_eq!(attachment, "source.png");
                    assert_eq!(source_path, "<memory>");
                    assert_eq!(got, status);
                }
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(store.puts(), 1);
        }
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let (store, mut job) = setup().await;
        store.script_puts(std::iter::repeat_n(409, 5));

        let err = upload_attachment(&store, &mut job, &png(), &RetryPolicy::new(3))
            .await
            .unwrap_err();

        assert!(err.is_retry_exhausted());
        assert_eq!(store.puts(), 3);
        assert_eq!(store.retrieves_of("job-42"), 3);
        assert!(store.attachment("job-42", "source.png").is_none());
    }

    #[tokio::test]
    async fn test_from_file_reads_body_and_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"epoch 1/10\nepoch 2/10\n").unwrap();

        let attachment = Attachment::from_file("log.txt", "text/plain", file.path())
            .await
            .unwrap();

        assert_eq!(attachment.body, Bytes::from_static(b"epoch 1/10\nepoch 2/10\n"));
        assert_eq!(attachment.source, file.path().display().to_string());
    }

    #[tokio::test]
    async fn test_from_file_missing_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Attachment::from_file("x.png", DEFAULT_CONTENT_TYPE, dir.path().join("nope.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
