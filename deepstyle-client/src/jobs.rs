//! Job document operations
//!
//! [`JobClient`] pairs a store with a retry policy and exposes the job-level
//! operations workers need. The job snapshot is passed in by the caller on
//! every call; the client never keeps one.

use std::path::Path;

use bytes::Bytes;
use deepstyle_core::domain::document::VersionedDocument;
use deepstyle_core::domain::job::{
    JobDocument, JobState, SetErrorMessage, SetState, SetStdOutAndErr, TransitionState,
};
use tracing::info;

use crate::attachment::{Attachment, upload_attachment};
use crate::error::Result;
use crate::retry::{RetryPolicy, edit_with_retry};
use crate::store::DocumentStore;

/// Job operations over a [`DocumentStore`]
#[derive(Debug, Clone)]
pub struct JobClient<S> {
    store: S,
    policy: RetryPolicy,
}

impl<S: DocumentStore> JobClient<S> {
    /// Create a job client with the default attempt ceiling
    pub fn new(store: S) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: S, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Load the current snapshot of a job
    ///
    /// # Errors
    /// [`crate::StoreError::NotFound`] if no document has this id
    pub async fn load(&self, id: &str) -> Result<JobDocument> {
        self.store.retrieve(id).await
    }

    /// Replace `job` with the store's current snapshot
    pub async fn refresh(&self, job: &mut JobDocument) -> Result<()> {
        let id = job.id().to_string();
        *job = self.load(&id).await?;
        Ok(())
    }

    /// Set the processing state, whatever the current one is
    ///
    /// Returns `false` if the job already had this state.
    pub async fn update_state(&self, job: &mut JobDocument, state: JobState) -> Result<bool> {
        let updated = edit_with_retry(&self.store, job, &SetState(state), &self.policy).await?;
        if updated {
            info!("Job {} is now {}", job.id(), state);
        }
        Ok(updated)
    }

    /// Set the processing state, refusing transitions outside the workflow
    ///
    /// The transition is checked against the snapshot being written, so a
    /// conflicting writer that moved the job elsewhere turns into
    /// [`crate::StoreError::Rejected`] instead of being overwritten.
    pub async fn transition_state(&self, job: &mut JobDocument, state: JobState) -> Result<bool> {
        let updated =
            edit_with_retry(&self.store, job, &TransitionState(state), &self.policy).await?;
        if updated {
            info!("Job {} moved to {}", job.id(), state);
        }
        Ok(updated)
    }

    /// Record an error message; an empty message is skipped
    pub async fn set_error_message(
        &self,
        job: &mut JobDocument,
        message: impl Into<String>,
    ) -> Result<bool> {
        edit_with_retry(
            &self.store,
            job,
            &SetErrorMessage(message.into()),
            &self.policy,
        )
        .await
    }

    /// Record the worker's combined stdout/stderr; empty output is skipped
    pub async fn set_std_out_and_err(
        &self,
        job: &mut JobDocument,
        output: impl Into<String>,
    ) -> Result<bool> {
        edit_with_retry(
            &self.store,
            job,
            &SetStdOutAndErr(output.into()),
            &self.policy,
        )
        .await
    }

    /// Upload the file at `path` as attachment `name` of `job`
    pub async fn add_attachment(
        &self,
        job: &mut JobDocument,
        name: &str,
        path: impl AsRef<Path>,
        content_type: &str,
    ) -> Result<()> {
        let attachment = Attachment::from_file(name, content_type, path).await?;
        upload_attachment(&self.store, job, &attachment, &self.policy).await
    }

    /// Upload an in-memory payload as an attachment of `job`
    pub async fn attach(&self, job: &mut JobDocument, attachment: &Attachment) -> Result<()> {
        upload_attachment(&self.store, job, attachment, &self.policy).await
    }

    /// Fetch the bytes of one of the job's attachments
    pub async fn retrieve_attachment(&self, job: &JobDocument, name: &str) -> Result<Bytes> {
        self.store.fetch_attachment(job.id(), name).await
    }
}
