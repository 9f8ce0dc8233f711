//! Concurrent batch uploads and deletes
//!
//! Every item is dispatched as its own task immediately; there is no
//! concurrency cap. A shared `remaining` counter is decremented once per
//! terminal item outcome and exactly one `ViewRefresh` is emitted when it
//! reaches zero, however the items ended.
//!
//! Abort is asymmetric on purpose: in-flight uploads are torn down via their
//! task handles, while deletes already dispatched run to completion and only
//! not-yet-started items are skipped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};

use crate::model::batch_item::{BatchItem, BatchSource, ItemOutcome};
use crate::model::error::{ErrorReport, StoreError};
use crate::model::event::{Event, EventBus};
use crate::paths;
use crate::services::object_store::{ObjectStore, PutBody};
use crate::services::progress::TransferUpdate;

/// Per-upload progress channel depth; ticks beyond this are dropped
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

struct BatchInner {
    remaining: AtomicUsize,
    total: usize,
    aborted: AtomicBool,
    outcomes: Mutex<Vec<Option<ItemOutcome>>>,
    /// Abort handles for upload transfers currently in flight, by item index
    transfers: Mutex<HashMap<usize, AbortHandle>>,
    events: EventBus,
}

impl BatchInner {
    /// Record a terminal outcome and emit the progress tick. The refresh
    /// fires once, when the last item lands.
    async fn finish(&self, index: usize, outcome: ItemOutcome) {
        {
            let mut outcomes = self.outcomes.lock().await;
            outcomes[index] = Some(outcome);
        }
        let remaining = self.remaining.fetch_sub(1, Ordering::SeqCst) - 1;
        self.events.send(Event::BatchProgress {
            remaining,
            total: self.total,
        });
        if remaining == 0 {
            self.events.send(Event::ViewRefresh);
        }
    }
}

/// A running batch. Dropping the handle does not cancel the work.
pub struct BatchHandle {
    inner: Arc<BatchInner>,
    workers: Vec<JoinHandle<()>>,
}

impl BatchHandle {
    /// Cancel the batch: tear down in-flight uploads and skip items that
    /// have not started yet. Deletes already dispatched are left to finish.
    pub async fn abort(&self) {
        self.inner.aborted.store(true, Ordering::SeqCst);
        let transfers = self.inner.transfers.lock().await;
        for handle in transfers.values() {
            handle.abort();
        }
    }

    pub fn remaining(&self) -> usize {
        self.inner.remaining.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.inner.total
    }

    pub async fn outcome(&self, index: usize) -> Option<ItemOutcome> {
        self.inner.outcomes.lock().await.get(index).cloned().flatten()
    }

    /// Wait for every item to reach a terminal outcome
    pub async fn wait(self) -> Vec<ItemOutcome> {
        for worker in self.workers {
            let _ = worker.await;
        }
        let outcomes = self.inner.outcomes.lock().await;
        outcomes
            .iter()
            .map(|o| o.clone().unwrap_or(ItemOutcome::Aborted))
            .collect()
    }
}

/// One batch of uploads or deletes against a single bucket
pub struct BatchOperation<S: ObjectStore + ?Sized + 'static> {
    store: Arc<S>,
    events: EventBus,
    bucket: String,
    /// Folder-level mode: deleting a folder key first deletes everything
    /// under it
    recursive_delete: bool,
}

impl<S: ObjectStore + ?Sized + 'static> BatchOperation<S> {
    pub fn new(
        store: Arc<S>,
        events: EventBus,
        bucket: impl Into<String>,
        recursive_delete: bool,
    ) -> BatchOperation<S> {
        BatchOperation {
            store,
            events,
            bucket: bucket.into(),
            recursive_delete,
        }
    }

    /// Dispatch every item concurrently and return immediately
    pub fn run(&self, items: Vec<BatchItem>) -> BatchHandle {
        let total = items.len();
        let inner = Arc::new(BatchInner {
            remaining: AtomicUsize::new(total),
            total,
            aborted: AtomicBool::new(false),
            outcomes: Mutex::new(vec![None; total]),
            transfers: Mutex::new(HashMap::new()),
            events: self.events.clone(),
        });

        // Single forwarder turns raw transfer ticks into events
        let (progress_tx, mut progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(update) = progress_rx.recv().await {
                let TransferUpdate { key, fraction } = update;
                events.send(Event::TransferProgress { key, fraction });
            }
        });

        tracing::info!(bucket = %self.bucket, total, "batch dispatched");

        let mut workers = Vec::with_capacity(total);
        for (index, item) in items.into_iter().enumerate() {
            let store = Arc::clone(&self.store);
            let inner = Arc::clone(&inner);
            let bucket = self.bucket.clone();
            let recursive = self.recursive_delete;
            let progress_tx = progress_tx.clone();
            workers.push(tokio::spawn(async move {
                run_item(index, item, bucket, store, inner, recursive, progress_tx).await;
            }));
        }

        BatchHandle { inner, workers }
    }
}

async fn run_item<S: ObjectStore + ?Sized + 'static>(
    index: usize,
    item: BatchItem,
    bucket: String,
    store: Arc<S>,
    inner: Arc<BatchInner>,
    recursive: bool,
    progress_tx: mpsc::Sender<TransferUpdate>,
) {
    if inner.aborted.load(Ordering::SeqCst) {
        inner.finish(index, ItemOutcome::Aborted).await;
        return;
    }
    let outcome = match item.source {
        BatchSource::Remote => delete_item(&item.target_key, &bucket, &store, &inner, recursive).await,
        _ => upload_item(index, item, &bucket, &store, &inner, progress_tx).await,
    };
    inner.finish(index, outcome).await;
}

async fn upload_item<S: ObjectStore + ?Sized + 'static>(
    index: usize,
    item: BatchItem,
    bucket: &str,
    store: &Arc<S>,
    inner: &Arc<BatchInner>,
    progress_tx: mpsc::Sender<TransferUpdate>,
) -> ItemOutcome {
    let key = item.target_key;
    let body = match item.source {
        BatchSource::File(path) => PutBody::File(path),
        BatchSource::Bytes(bytes) => PutBody::Bytes(bytes),
        BatchSource::Remote => unreachable!("deletes are routed to delete_item"),
    };

    // The transfer runs in its own task so abort() can tear it down while
    // this wrapper stays alive to record the outcome.
    let transfer = {
        let store = Arc::clone(store);
        let bucket = bucket.to_string();
        let key = key.clone();
        let content_type = item.content_type;
        tokio::spawn(async move {
            store
                .put_object(&bucket, &key, body, content_type, Some(progress_tx))
                .await
        })
    };
    inner
        .transfers
        .lock()
        .await
        .insert(index, transfer.abort_handle());
    // Abort may have raced past registration
    if inner.aborted.load(Ordering::SeqCst) {
        transfer.abort();
    }

    let result = transfer.await;
    inner.transfers.lock().await.remove(&index);

    match result {
        Ok(Ok(())) => ItemOutcome::Success,
        Ok(Err(err)) if err.is_access_denied() => ItemOutcome::AccessDenied,
        Ok(Err(err)) => {
            inner.events.error(
                ErrorReport::new("put_object", &err)
                    .detail("bucket", bucket)
                    .detail("key", &key),
            );
            ItemOutcome::OtherFailure(err.to_string())
        }
        Err(join_err) if join_err.is_cancelled() => ItemOutcome::Aborted,
        Err(join_err) => {
            let err = StoreError::Transport(join_err.to_string());
            inner.events.error(
                ErrorReport::new("put_object", &err)
                    .detail("bucket", bucket)
                    .detail("key", &key),
            );
            ItemOutcome::OtherFailure(err.to_string())
        }
    }
}

async fn delete_item<S: ObjectStore + ?Sized>(
    key: &str,
    bucket: &str,
    store: &Arc<S>,
    inner: &Arc<BatchInner>,
    recursive: bool,
) -> ItemOutcome {
    if recursive && paths::is_folder_key(key) {
        delete_descendants(key, bucket, store, inner).await;
    }
    if inner.aborted.load(Ordering::SeqCst) {
        return ItemOutcome::Aborted;
    }
    match store.delete_object(bucket, key).await {
        Ok(()) => ItemOutcome::Success,
        Err(err) if err.is_access_denied() => ItemOutcome::AccessDenied,
        Err(err) => {
            inner.events.error(
                ErrorReport::new("delete_object", &err)
                    .detail("bucket", bucket)
                    .detail("key", key),
            );
            ItemOutcome::OtherFailure(err.to_string())
        }
    }
}

/// Flat-list everything under a folder key and delete it concurrently.
/// Failures here are reported but never block the folder key's own delete.
async fn delete_descendants<S: ObjectStore + ?Sized>(
    prefix: &str,
    bucket: &str,
    store: &Arc<S>,
    inner: &Arc<BatchInner>,
) {
    let mut marker: Option<String> = None;
    let mut keys = Vec::new();
    loop {
        match store.list_objects(bucket, prefix, "", marker.clone()).await {
            Ok(page) => {
                keys.extend(
                    page.contents
                        .iter()
                        .filter(|obj| obj.key != prefix)
                        .map(|obj| obj.key.clone()),
                );
                if !page.is_truncated {
                    break;
                }
                match page
                    .next_marker
                    .clone()
                    .or_else(|| page.contents.last().map(|o| o.key.clone()))
                {
                    Some(m) => marker = Some(m),
                    None => break,
                }
            }
            Err(err) => {
                inner.events.error(
                    ErrorReport::new("list_objects", &err)
                        .detail("bucket", bucket)
                        .detail("prefix", prefix),
                );
                return;
            }
        }
    }

    let deletes = keys.into_iter().map(|key| {
        let store = Arc::clone(store);
        let inner = Arc::clone(inner);
        let bucket = bucket.to_string();
        async move {
            if inner.aborted.load(Ordering::SeqCst) {
                return;
            }
            match store.delete_object(&bucket, &key).await {
                Ok(()) => {}
                Err(err) if err.is_access_denied() => {
                    tracing::warn!(%bucket, %key, "descendant delete denied");
                }
                Err(err) => {
                    inner.events.error(
                        ErrorReport::new("delete_object", &err)
                            .detail("bucket", &bucket)
                            .detail("key", &key),
                    );
                }
            }
        }
    });
    futures::future::join_all(deletes).await;
}
