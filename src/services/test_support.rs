//! Scripted in-memory store for unit tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;
use tokio::sync::{Mutex, Semaphore};

use crate::model::error::StoreError;
use crate::model::page::{ListObjectsPage, RemoteObject};
use crate::services::object_store::{ObjectStore, PutBody};
use crate::services::progress::TransferUpdate;
use crate::settings::Settings;

/// Serves pre-scripted listing pages in order and records every call.
///
/// All behavior knobs default to "succeed immediately"; tests set only what
/// they exercise.
#[derive(Default)]
pub(crate) struct ScriptedStore {
    pages: Mutex<VecDeque<Result<ListObjectsPage, StoreError>>>,
    /// Marker passed to each `list_objects` call, in order
    pub(crate) list_markers: Mutex<Vec<Option<String>>>,
    pub(crate) deleted_keys: Mutex<Vec<String>>,
    /// Key and body length of every upload
    pub(crate) put_keys: Mutex<Vec<(String, usize)>>,
    pub(crate) applied: Mutex<Vec<Settings>>,
    /// Per-key scripted delete failures
    pub(crate) delete_errors: Mutex<HashMap<String, StoreError>>,
    /// Per-key scripted upload failures
    pub(crate) put_errors: Mutex<HashMap<String, StoreError>>,
    /// Keys that `head_object` reports as existing
    pub(crate) existing_keys: Mutex<HashSet<String>>,
    /// Uploads of these keys never complete, so a test can abort them mid-flight
    pub(crate) hang_puts: Mutex<HashSet<String>>,
    /// When set, flipped to true while serving the first listing page
    pub(crate) stop_on_first_page: Option<Arc<AtomicBool>>,
    /// When present, each `list_objects` call waits for one permit first
    pub(crate) list_gate: Option<Arc<Semaphore>>,
    pub(crate) head_bucket_result: Mutex<Option<StoreError>>,
    pub(crate) head_bucket_calls: AtomicUsize,
}

impl ScriptedStore {
    pub(crate) fn new() -> ScriptedStore {
        ScriptedStore::default()
    }

    pub(crate) fn with_pages(pages: Vec<Result<ListObjectsPage, StoreError>>) -> ScriptedStore {
        ScriptedStore {
            pages: Mutex::new(pages.into()),
            ..ScriptedStore::default()
        }
    }

    pub(crate) async fn push_page(&self, page: Result<ListObjectsPage, StoreError>) {
        self.pages.lock().await.push_back(page);
    }

    pub(crate) async fn list_calls(&self) -> usize {
        self.list_markers.lock().await.len()
    }
}

/// Convenience for building page fixtures
pub(crate) fn page(
    keys: &[&str],
    prefixes: &[&str],
    is_truncated: bool,
    next_marker: Option<&str>,
) -> ListObjectsPage {
    ListObjectsPage {
        contents: keys.iter().map(|k| RemoteObject::new(*k)).collect(),
        common_prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        is_truncated,
        next_marker: next_marker.map(str::to_string),
    }
}

#[async_trait]
impl ObjectStore for ScriptedStore {
    async fn list_objects(
        &self,
        _bucket: &str,
        _prefix: &str,
        _delimiter: &str,
        marker: Option<String>,
    ) -> Result<ListObjectsPage, StoreError> {
        // Record before blocking so tests can see a call in flight
        let first_call = {
            let mut markers = self.list_markers.lock().await;
            markers.push(marker);
            markers.len() == 1
        };
        if first_call {
            if let Some(flag) = &self.stop_on_first_page {
                flag.store(true, Ordering::SeqCst);
            }
        }
        if let Some(gate) = &self.list_gate {
            let permit = gate.acquire().await;
            permit.map(|p| p.forget()).ok();
        }
        self.pages
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(ListObjectsPage::default()))
    }

    async fn put_object(
        &self,
        _bucket: &str,
        key: &str,
        body: PutBody,
        _content_type: Option<String>,
        progress: Option<Sender<TransferUpdate>>,
    ) -> Result<(), StoreError> {
        let len = match &body {
            PutBody::File(path) => path.as_os_str().len(),
            PutBody::Bytes(data) => data.len(),
        };
        self.put_keys.lock().await.push((key.to_string(), len));
        if self.hang_puts.lock().await.contains(key) {
            std::future::pending::<()>().await;
        }
        if let Some(tx) = progress {
            let _ = tx
                .send(TransferUpdate {
                    key: key.to_string(),
                    fraction: 1.0,
                })
                .await;
        }
        match self.put_errors.lock().await.remove(key) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn delete_object(&self, _bucket: &str, key: &str) -> Result<(), StoreError> {
        self.deleted_keys.lock().await.push(key.to_string());
        match self.delete_errors.lock().await.remove(key) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn head_object(&self, _bucket: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self.existing_keys.lock().await.contains(key))
    }

    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        _expires_in: Duration,
    ) -> Result<String, StoreError> {
        Ok(format!("https://signed.example/{}/{}", bucket, key))
    }

    async fn head_bucket(&self, _bucket: &str) -> Result<(), StoreError> {
        self.head_bucket_calls.fetch_add(1, Ordering::SeqCst);
        match self.head_bucket_result.lock().await.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn apply_settings(&self, settings: &Settings) {
        self.applied.lock().await.push(settings.clone());
    }
}
