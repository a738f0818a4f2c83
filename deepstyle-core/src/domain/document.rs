//! Versioned document types

use serde::{Deserialize, Deserializer, Serialize};

/// Type tag carried by job documents
pub const JOB: &str = "job";

/// A document whose writes are guarded by an opaque revision token
///
/// The store rejects any write that presents a revision other than the one it
/// currently holds for the id, so every snapshot must know its own revision.
pub trait VersionedDocument {
    /// Stable identifier, assigned at creation
    fn id(&self) -> &str;

    /// Revision the snapshot was read with
    fn revision(&self) -> &str;

    /// Advance the snapshot to a revision the store returned for our own write
    fn set_revision(&mut self, revision: String);

    /// List an attachment our own write just stored under the current revision
    ///
    /// Documents that carry their `_attachments` must keep a stub for it, or
    /// the next full write of the snapshot deletes the attachment.
    fn record_attachment(&mut self, _name: &str, _content_type: &str, _length: usize) {}
}

/// Read an explicit `null` as the field's default
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Identity and type tag shared by every stored document
///
/// Must not contain a `#[serde(flatten)]` field itself: job documents flatten
/// it beside a catch-all map of unknown fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(
        rename = "_rev",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub revision: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub doc_type: String,
}

impl Document {
    pub fn new(id: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            revision: String::new(),
            doc_type: doc_type.into(),
        }
    }

    pub fn is_job(&self) -> bool {
        self.doc_type == JOB
    }
}

impl VersionedDocument for Document {
    fn id(&self) -> &str {
        &self.id
    }

    fn revision(&self) -> &str {
        &self.revision
    }

    fn set_revision(&mut self, revision: String) {
        self.revision = revision;
    }
}
