//! Document store primitives
//!
//! [`DocumentStore`] is the seam between the concurrency protocol and the
//! wire: the retry-update engine and the attachment uploader only ever talk
//! to this trait, and [`CouchStore`] implements it over HTTP.

use async_trait::async_trait;
use bytes::Bytes;
use deepstyle_core::domain::document::VersionedDocument;
use deepstyle_core::dto::store::WriteResponse;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::CouchStore;
use crate::error::{Result, StoreError};

/// Outcome of an attachment PUT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentWrite {
    pub status: StatusCode,
    /// Document revision created by the write, when the store reported one
    pub revision: Option<String>,
}

/// Primitives of a revision-controlled document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Base URL documents are addressed under
    ///
    /// Used to name the store in logs and for callers that build their own
    /// links to documents.
    fn base_url(&self) -> &str;

    /// Fetch the current snapshot of a document
    ///
    /// Fails with [`StoreError::NotFound`] if the id does not exist.
    async fn retrieve<D>(&self, id: &str) -> Result<D>
    where
        D: DeserializeOwned + Send;

    /// Write the full document under the revision it carries
    ///
    /// Returns the new revision. A stale revision fails with
    /// [`StoreError::Conflict`].
    async fn save<D>(&self, doc: &D) -> Result<String>
    where
        D: VersionedDocument + Serialize + Sync;

    /// Fetch the bytes of a named attachment
    async fn fetch_attachment(&self, id: &str, name: &str) -> Result<Bytes>;

    /// PUT an attachment qualified by `revision`
    ///
    /// Any HTTP status is returned as-is; only transport failures are errors.
    /// Classifying the status is up to the caller.
    async fn put_attachment(
        &self,
        id: &str,
        name: &str,
        revision: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<AttachmentWrite>;
}

#[async_trait]
impl DocumentStore for CouchStore {
    fn base_url(&self) -> &str {
        self.database_url()
    }

    async fn retrieve<D>(&self, id: &str) -> Result<D>
    where
        D: DeserializeOwned + Send,
    {
        let url = self.endpoint(&[id])?;
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(id.to_string())),
            status if status.is_success() => response.json().await.map_err(|e| {
                StoreError::Parse(format!("Failed to parse document {}: {}", id, e))
            }),
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn save<D>(&self, doc: &D) -> Result<String>
    where
        D: VersionedDocument + Serialize + Sync,
    {
        let url = self.endpoint(&[doc.id()])?;
        let response = self.client.put(url).json(doc).send().await?;

        match response.status() {
            StatusCode::CONFLICT => Err(StoreError::Conflict(doc.id().to_string())),
            status if status.is_success() => {
                let written: WriteResponse = response.json().await.map_err(|e| {
                    StoreError::Parse(format!("Failed to parse write response: {}", e))
                })?;
                debug!("Saved {} at revision {}", written.id, written.rev);
                Ok(written.rev)
            }
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn fetch_attachment(&self, id: &str, name: &str) -> Result<Bytes> {
        let url = self.endpoint(&[id, name])?;
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(format!("{}/{}", id, name))),
            status if status.is_success() => Ok(response.bytes().await?),
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn put_attachment(
        &self,
        id: &str,
        name: &str,
        revision: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<AttachmentWrite> {
        let mut url = self.endpoint(&[id, name])?;
        url.query_pairs_mut().append_pair("rev", revision);
        debug!("PUT attachment {}", url);

        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Ok(AttachmentWrite {
                status,
                revision: None,
            });
        }

        // The attachment is stored at this point; an unreadable body only
        // costs us the new revision.
        let revision = match response.json::<WriteResponse>().await {
            Ok(written) => Some(written.rev),
            Err(e) => {
                debug!("No revision in attachment write response: {}", e);
                None
            }
        };

        Ok(AttachmentWrite { status, revision })
    }
}
