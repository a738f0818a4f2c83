//! In-memory document store used by unit tests
//!
//! Behaves like the real store where it matters: every write is checked
//! against the current revision, and each accepted write advances it. Tests
//! can inject other writers, failing statuses and attachment responses, and
//! inspect call counts afterwards.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use deepstyle_core::domain::document::VersionedDocument;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::{Result, StoreError};
use crate::store::{AttachmentWrite, DocumentStore};

type Writer = Box<dyn FnMut(&mut Value) + Send>;

/// A job document as the store would hold it, without a revision
pub(crate) fn job_json(id: &str, state: &str) -> Value {
    json!({
        "_id": id,
        "type": "job",
        "state": state,
        "created_at": "2016-02-01T10:00:00Z",
        "owner": "alice",
        "owner_devicetoken": "device-token",
        "error_message": "",
        "std_out_and_err": "",
    })
}

#[derive(Default)]
struct Inner {
    docs: HashMap<String, Value>,
    generations: HashMap<String, u64>,
    attachments: HashMap<(String, String), Bytes>,
    /// Writes another client lands just before each of our next saves
    interference: Option<(u32, Writer)>,
    save_failure: Option<u16>,
    put_statuses: VecDeque<u16>,
    /// Leave the new revision out of successful attachment PUT responses
    omit_put_revisions: bool,
    /// Answer every retrieve with 503 once an attachment PUT has succeeded
    fail_reads_after_put: bool,
    attachment_stored: bool,
    /// Revision handed out by the latest retrieve of each document
    last_served: HashMap<String, String>,
    stale_puts: usize,
    retrieves: HashMap<String, usize>,
    saves: usize,
    fetches: usize,
    puts: usize,
}

impl Inner {
    fn bump(&mut self, id: &str) -> String {
        let generation = self.generations.entry(id.to_string()).or_insert(0);
        *generation += 1;
        let rev = format!("{}-mem", generation);
        if let Some(doc) = self.docs.get_mut(id) {
            doc["_rev"] = json!(rev);
        }
        rev
    }

    fn current_revision(&self, id: &str) -> String {
        self.docs
            .get(id)
            .and_then(|doc| doc["_rev"].as_str())
            .unwrap_or_default()
            .to_string()
    }

    fn retrieve(&mut self, id: &str) -> Result<Value> {
        *self.retrieves.entry(id.to_string()).or_insert(0) += 1;

        if self.fail_reads_after_put && self.attachment_stored {
            return Err(StoreError::api_error(503, "read after put failed"));
        }

        let doc = self
            .docs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let rev = self.current_revision(id);
        self.last_served.insert(id.to_string(), rev);
        Ok(doc)
    }

    fn save(&mut self, id: &str, mut value: Value) -> Result<String> {
        self.saves += 1;

        if let Some(status) = self.save_failure {
            return Err(StoreError::api_error(status, "injected failure"));
        }
        if !self.docs.contains_key(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }

        if let Some((remaining, writer)) = self.interference.as_mut() {
            if *remaining > 0 {
                *remaining -= 1;
                if let Some(doc) = self.docs.get_mut(id) {
                    writer(doc);
                }
                self.bump(id);
            }
        }

        if value["_rev"].as_str() != Some(self.current_revision(id).as_str()) {
            return Err(StoreError::Conflict(id.to_string()));
        }

        self.docs.insert(id.to_string(), value.take());
        Ok(self.bump(id))
    }

    fn put_attachment(
        &mut self,
        id: &str,
        name: &str,
        revision: &str,
        content_type: &str,
        body: Bytes,
    ) -> AttachmentWrite {
        self.puts += 1;

        let current = self.current_revision(id);
        if revision != current || self.last_served.get(id).map(String::as_str) != Some(revision) {
            self.stale_puts += 1;
        }

        let status = self.put_statuses.pop_front().unwrap_or(201);
        if status == 409 {
            self.bump(id);
            return AttachmentWrite {
                status: StatusCode::CONFLICT,
                revision: None,
            };
        }
        if !(200..300).contains(&status) {
            return AttachmentWrite {
                status: StatusCode::from_u16(status).unwrap(),
                revision: None,
            };
        }
        if revision != current {
            return AttachmentWrite {
                status: StatusCode::CONFLICT,
                revision: None,
            };
        }

        let length = body.len();
        self.attachments
            .insert((id.to_string(), name.to_string()), body);
        if let Some(doc) = self.docs.get_mut(id) {
            doc["_attachments"][name] = json!({
                "content_type": content_type,
                "length": length,
                "stub": true,
            });
        }
        let rev = self.bump(id);
        self.attachment_stored = true;
        AttachmentWrite {
            status: StatusCode::from_u16(status).unwrap(),
            revision: (!self.omit_put_revisions).then_some(rev),
        }
    }
}

pub(crate) struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Store a document at its first revision
    pub(crate) fn insert(&self, doc: Value) {
        let id = doc["_id"].as_str().unwrap().to_string();
        let mut inner = self.lock();
        inner.docs.insert(id.clone(), doc);
        inner.generations.remove(&id);
        inner.bump(&id);
    }

    /// Let another writer modify the document before each of the next `times` saves
    pub(crate) fn interfere(&self, times: u32, writer: impl FnMut(&mut Value) + Send + 'static) {
        self.lock().interference = Some((times, Box::new(writer)));
    }

    /// Answer every save with `status`
    pub(crate) fn fail_saves_with(&self, status: u16) {
        self.lock().save_failure = Some(status);
    }

    /// Answer the next attachment PUTs with these statuses, then 201
    pub(crate) fn script_puts(&self, statuses: impl IntoIterator<Item = u16>) {
        self.lock().put_statuses.extend(statuses);
    }

    /// Answer successful attachment PUTs without the new revision
    pub(crate) fn omit_put_revisions(&self) {
        self.lock().omit_put_revisions = true;
    }

    /// Fail every retrieve once an attachment has been stored
    pub(crate) fn fail_reads_after_put(&self) {
        self.lock().fail_reads_after_put = true;
    }

    pub(crate) fn current_revision(&self, id: &str) -> String {
        self.lock().current_revision(id)
    }

    pub(crate) fn stored(&self, id: &str) -> Value {
        self.lock().docs[id].clone()
    }

    pub(crate) fn attachment(&self, id: &str, name: &str) -> Option<Bytes> {
        self.lock()
            .attachments
            .get(&(id.to_string(), name.to_string()))
            .cloned()
    }

    pub(crate) fn retrieves_of(&self, id: &str) -> usize {
        self.lock().retrieves.get(id).copied().unwrap_or(0)
    }

    pub(crate) fn saves(&self) -> usize {
        self.lock().saves
    }

    pub(crate) fn puts(&self) -> usize {
        self.lock().puts
    }

    /// PUTs sent with a revision other than the latest one served and stored
    pub(crate) fn stale_puts(&self) -> usize {
        self.lock().stale_puts
    }

    pub(crate) fn calls(&self) -> usize {
        let inner = self.lock();
        inner.retrieves.values().sum::<usize>() + inner.saves + inner.fetches + inner.puts
    }

    pub(crate) fn reset_counters(&self) {
        let mut inner = self.lock();
        inner.retrieves.clear();
        inner.saves = 0;
        inner.fetches = 0;
        inner.puts = 0;
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn base_url(&self) -> &str {
        "memory://deepstyle"
    }

    async fn retrieve<D>(&self, id: &str) -> Result<D>
    where
        D: DeserializeOwned + Send,
    {
        let value = self.lock().retrieve(id)?;
        serde_json::from_value(value).map_err(|e| StoreError::Parse(e.to_string()))
    }

    async fn save<D>(&self, doc: &D) -> Result<String>
    where
        D: VersionedDocument + Serialize + Sync,
    {
        let value = serde_json::to_value(doc).map_err(|e| StoreError::Parse(e.to_string()))?;
        self.lock().save(doc.id(), value)
    }

    async fn fetch_attachment(&self, id: &str, name: &str) -> Result<Bytes> {
        let mut inner = self.lock();
        inner.fetches += 1;
        inner
            .attachments
            .get(&(id.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", id, name)))
    }

    async fn put_attachment(
        &self,
        id: &str,
        name: &str,
        revision: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<AttachmentWrite> {
        Ok(self
            .lock()
            .put_attachment(id, name, revision, content_type, body))
    }
}
