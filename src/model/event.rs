//! Typed event bus connecting the core to its UI collaborators
//!
//! A fixed set of event kinds replaces ad-hoc broadcast: consumers hold the
//! receiving half of an unbounded channel and apply events in order. Sends
//! never block and are silently dropped once the receiver is gone.
//!
//! Listing events carry the id of the session that produced them so that a
//! superseded session's late pages can be recognized and ignored.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::model::entry::Entry;
use crate::model::error::ErrorReport;
use crate::model::session_state::SessionState;
use crate::settings::Settings;

/// How the effective prefix changed
#[derive(Debug, Clone, PartialEq)]
pub enum PrefixChange {
    /// Folder-level mode: a fresh query against this prefix is required
    Query(String),
    /// Bucket-level (flat) mode: satisfied by client-side filtering only
    View(String),
}

/// Everything the core emits
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// New settings are in effect (after any session-token exchange)
    SettingsApplied(Settings),
    PrefixChanged(PrefixChange),
    /// Someone requests the view to reload (e.g. a finished batch)
    ViewRefresh,
    /// Selected keys handed over for deletion
    BatchTrash { bucket: String, keys: Vec<String> },
    Error(ErrorReport),
    /// New rows from one listing response
    Page { session: u64, entries: Vec<Entry> },
    /// Count deltas for the running listing
    Progress {
        session: u64,
        objects: usize,
        folders: usize,
    },
    ListingFinished { session: u64, state: SessionState },
    /// Remaining/total after each terminal batch-item outcome
    BatchProgress { remaining: usize, total: usize },
    /// Per-key upload progress, 0.0..=1.0
    TransferProgress { key: String, fraction: f64 },
}

/// Cloneable sending half of the event stream
#[derive(Clone)]
pub struct EventBus {
    tx: UnboundedSender<Event>,
}

impl EventBus {
    pub fn new() -> (EventBus, UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventBus { tx }, rx)
    }

    pub fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Log and forward an error report to the error surface
    pub fn error(&self, report: ErrorReport) {
        tracing::error!("{}", report);
        self.send(Event::Error(report));
    }
}
