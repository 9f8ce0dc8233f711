//! Paginated listing session
//!
//! One session walks a bucket/prefix page by page, partitioning each response
//! into object and folder rows and emitting them as it goes. The session is
//! single-use: it runs until the listing completes, fails, or the shared stop
//! flag is observed between pages.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::model::entry::{Entry, StorageClass};
use crate::model::error::ErrorReport;
use crate::model::event::{Event, EventBus};
use crate::model::page::ListObjectsPage;
use crate::model::session_state::{ListingCounts, SessionState};
use crate::paths;
use crate::services::object_store::ObjectStore;

/// Final state and totals of one finished session
#[derive(Debug, Clone, PartialEq)]
pub struct ListingOutcome {
    pub state: SessionState,
    pub counts: ListingCounts,
}

pub struct ListingSession {
    id: u64,
    bucket: String,
    prefix: String,
    delimiter: String,
    stop: Arc<AtomicBool>,
}

impl ListingSession {
    pub fn new(
        id: u64,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        delimiter: impl Into<String>,
    ) -> ListingSession {
        ListingSession {
            id,
            bucket: bucket.into(),
            prefix: prefix.into(),
            delimiter: delimiter.into(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Shared flag a holder flips to stop the session between pages.
    /// The page already in flight still lands; no network I/O is cancelled.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Drive the listing to a terminal state, emitting `Page` and `Progress`
    /// events along the way and `ListingFinished` at the end.
    pub async fn run<S>(self, store: &S, events: &EventBus) -> ListingOutcome
    where
        S: ObjectStore + ?Sized,
    {
        let mut marker: Option<String> = None;
        let mut seen = HashSet::new();
        let mut counts = ListingCounts::default();
        let state;

        tracing::info!(
            bucket = %self.bucket,
            prefix = %self.prefix,
            session = self.id,
            "listing session started"
        );

        loop {
            let page = match store
                .list_objects(&self.bucket, &self.prefix, &self.delimiter, marker.clone())
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    events.error(
                        ErrorReport::new("list_objects", &err)
                            .detail("bucket", &self.bucket)
                            .detail("prefix", &self.prefix)
                            .detail("marker", marker.as_deref().unwrap_or("")),
                    );
                    state = SessionState::Failed;
                    break;
                }
            };

            let (entries, delta) = partition_page(&self.prefix, &page, &mut seen);
            counts.add(delta);
            events.send(Event::Page {
                session: self.id,
                entries,
            });
            events.send(Event::Progress {
                session: self.id,
                objects: delta.objects,
                folders: delta.folders,
            });

            if self.stop.load(Ordering::SeqCst) {
                state = SessionState::Stopped;
                break;
            }
            if !page.is_truncated {
                state = SessionState::Completed;
                break;
            }
            match next_marker(&page) {
                Some(m) => marker = Some(m),
                None => {
                    // Truncated response with neither NextMarker nor contents.
                    // Nothing to resume from; treat what we have as the end.
                    tracing::warn!(
                        bucket = %self.bucket,
                        prefix = %self.prefix,
                        "truncated listing without a resumable marker"
                    );
                    state = SessionState::Completed;
                    break;
                }
            }
        }

        tracing::info!(
            session = self.id,
            %state,
            objects = counts.objects,
            folders = counts.folders,
            "listing session finished"
        );
        events.send(Event::ListingFinished {
            session: self.id,
            state,
        });
        ListingOutcome { state, counts }
    }
}

/// Marker to resume after this page: `NextMarker` when the service sent one,
/// otherwise the last raw content key (valid because keys arrive in lexical
/// order).
fn next_marker(page: &ListObjectsPage) -> Option<String> {
    page.next_marker
        .clone()
        .or_else(|| page.contents.last().map(|o| o.key.clone()))
}

/// Split one response page into listing rows.
///
/// The placeholder object whose key equals the queried prefix is dropped, as
/// is the degenerate `"/"` common prefix some stores return for keys with a
/// leading slash. `seen` deduplicates keys across pages so repeated keys
/// (marker overlap, folder present both as placeholder and common prefix)
/// produce one row.
pub fn partition_page(
    prefix: &str,
    page: &ListObjectsPage,
    seen: &mut HashSet<String>,
) -> (Vec<Entry>, ListingCounts) {
    let mut entries = Vec::new();
    let mut delta = ListingCounts::default();

    for obj in &page.contents {
        if obj.key == prefix {
            continue;
        }
        if !seen.insert(obj.key.clone()) {
            continue;
        }
        if paths::is_folder_key(&obj.key) {
            entries.push(Entry::folder(&obj.key));
            delta.folders += 1;
        } else {
            entries.push(Entry::object(
                &obj.key,
                obj.size,
                obj.last_modified.clone(),
                obj.storage_class.as_deref().map(StorageClass::from_api),
            ));
            delta.objects += 1;
        }
    }

    for common in &page.common_prefixes {
        if common == "/" {
            continue;
        }
        if !seen.insert(common.clone()) {
            continue;
        }
        entries.push(Entry::folder(common));
        delta.folders += 1;
    }

    (entries, delta)
}
