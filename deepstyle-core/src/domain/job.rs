//! Job domain types

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::document::{Document, VersionedDocument, null_as_default};
use super::mutation::Mutation;

/// Attachment name to store-reported metadata (digest, length, stub flag, ...)
///
/// Opaque to this crate, but it must be sent back unchanged on every full
/// document write or the store drops the attachments.
pub type Attachments = BTreeMap<String, Value>;

/// Job processing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// No attachments yet
    #[default]
    NotReadyToProcess,
    /// Attachments added
    ReadyToProcess,
    /// Worker running
    BeingProcessed,
    /// Worker done
    ProcessingSuccessful,
    /// Processing failed
    ProcessingFailed,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::NotReadyToProcess,
        JobState::ReadyToProcess,
        JobState::BeingProcessed,
        JobState::ProcessingSuccessful,
        JobState::ProcessingFailed,
    ];

    /// Wire representation, as stored in the `state` field
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::NotReadyToProcess => "NOT_READY_TO_PROCESS",
            JobState::ReadyToProcess => "READY_TO_PROCESS",
            JobState::BeingProcessed => "BEING_PROCESSED",
            JobState::ProcessingSuccessful => "PROCESSING_SUCCESSFUL",
            JobState::ProcessingFailed => "PROCESSING_FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::ProcessingSuccessful | JobState::ProcessingFailed
        )
    }

    /// Forward transitions of the processing workflow
    ///
    /// Only consulted by checked transitions; plain state updates accept any
    /// target. Staying in the same state is always allowed.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        if *self == next {
            return true;
        }

        matches!(
            (self, next),
            (JobState::NotReadyToProcess, JobState::ReadyToProcess)
                | (JobState::ReadyToProcess, JobState::BeingProcessed)
                | (JobState::BeingProcessed, JobState::ProcessingSuccessful)
                | (JobState::BeingProcessed, JobState::ProcessingFailed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the job state labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownJobState(pub String);

impl fmt::Display for UnknownJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown job state: {}", self.0)
    }
}

impl std::error::Error for UnknownJobState {}

impl FromStr for JobState {
    type Err = UnknownJobState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownJobState(s.to_string()))
    }
}

/// Snapshot of a job document
///
/// Fields are read-only outside this crate. Changes go through the
/// [`Mutation`] implementations below so that every write passes the
/// revision-checked retry path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDocument {
    #[serde(flatten)]
    header: Document,
    #[serde(
        rename = "_attachments",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    attachments: Attachments,
    #[serde(default, deserialize_with = "null_as_default")]
    state: JobState,
    #[serde(default, deserialize_with = "null_as_default")]
    created_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    owner: String,
    #[serde(
        rename = "owner_devicetoken",
        default,
        deserialize_with = "null_as_default"
    )]
    owner_device_token: String,
    #[serde(default, deserialize_with = "null_as_default")]
    error_message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    std_out_and_err: String,
    /// Fields this model does not know about, written back verbatim
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl JobDocument {
    pub fn is_job(&self) -> bool {
        self.header.is_job()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_ready_to_process(&self) -> bool {
        self.state == JobState::ReadyToProcess
    }

    pub fn is_being_processed(&self) -> bool {
        self.state == JobState::BeingProcessed
    }

    pub fn is_processing_successful(&self) -> bool {
        self.state == JobState::ProcessingSuccessful
    }

    pub fn is_processing_failed(&self) -> bool {
        self.state == JobState::ProcessingFailed
    }

    pub fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    pub fn has_attachment(&self, name: &str) -> bool {
        self.attachments.contains_key(name)
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn owner_device_token(&self) -> &str {
        &self.owner_device_token
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn std_out_and_err(&self) -> &str {
        &self.std_out_and_err
    }

    pub fn extra_fields(&self) -> &Map<String, Value> {
        &self.extra
    }
}

impl VersionedDocument for JobDocument {
    fn id(&self) -> &str {
        self.header.id()
    }

    fn revision(&self) -> &str {
        self.header.revision()
    }

    fn set_revision(&mut self, revision: String) {
        self.header.set_revision(revision);
    }

    fn record_attachment(&mut self, name: &str, content_type: &str, length: usize) {
        self.attachments.insert(
            name.to_string(),
            serde_json::json!({
                "content_type": content_type,
                "length": length,
                "stub": true,
            }),
        );
    }
}

// =============================================================================
// Field mutations
// =============================================================================

/// Set the processing state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetState(pub JobState);

impl Mutation<JobDocument> for SetState {
    fn field(&self) -> &'static str {
        "state"
    }

    fn apply(&self, doc: &mut JobDocument) {
        doc.state = self.0;
    }

    fn is_satisfied(&self, doc: &JobDocument) -> bool {
        doc.state == self.0
    }
}

/// Set the processing state, refusing transitions outside the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionState(pub JobState);

impl Mutation<JobDocument> for TransitionState {
    fn field(&self) -> &'static str {
        "state"
    }

    fn check(&self, doc: &JobDocument) -> Result<(), String> {
        if doc.state.can_transition_to(self.0) {
            Ok(())
        } else {
            Err(format!("illegal transition {} -> {}", doc.state, self.0))
        }
    }

    fn apply(&self, doc: &mut JobDocument) {
        doc.state = self.0;
    }

    fn is_satisfied(&self, doc: &JobDocument) -> bool {
        doc.state == self.0
    }
}

/// Record why processing failed; an empty message is a no-op
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetErrorMessage(pub String);

impl Mutation<JobDocument> for SetErrorMessage {
    fn field(&self) -> &'static str {
        "error_message"
    }

    fn is_noop(&self) -> bool {
        self.0.is_empty()
    }

    fn apply(&self, doc: &mut JobDocument) {
        doc.error_message.clone_from(&self.0);
    }

    fn is_satisfied(&self, doc: &JobDocument) -> bool {
        doc.error_message == self.0
    }
}

/// Capture the worker's combined stdout/stderr; empty output is a no-op
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetStdOutAndErr(pub String);

impl Mutation<JobDocument> for SetStdOutAndErr {
    fn field(&self) -> &'static str {
        "std_out_and_err"
    }

    fn is_noop(&self) -> bool {
        self.0.is_empty()
    }

    fn apply(&self, doc: &mut JobDocument) {
        doc.std_out_and_err.clone_from(&self.0);
    }

    fn is_satisfied(&self, doc: &JobDocument) -> bool {
        doc.std_out_and_err == self.0
    }
}
