//! View state: the single owner of the visible row set
//!
//! All mutation funnels through [`ViewState::apply_event`] on the consumer's
//! event loop, so rows, counts and selection change on one task only while
//! sessions and batches run concurrently underneath.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::model::breadcrumb::{build_breadcrumbs, Breadcrumb};
use crate::model::entry::Entry;
use crate::model::error::{ErrorReport, StoreError};
use crate::model::event::{Event, EventBus, PrefixChange};
use crate::model::session_state::{ListingCounts, SessionState};
use crate::model::sorting::cmp_entries;
use crate::paths;
use crate::services::listing::ListingSession;
use crate::services::object_store::{ObjectStore, PutBody};
use crate::services::sts::TokenExchanger;
use crate::settings::Settings;

/// Presigned download links expire quickly; they are meant to be clicked,
/// not shared.
const DOWNLOAD_URL_EXPIRY: Duration = Duration::from_secs(15);

/// Handle onto the listing session currently spawned, if any
struct SessionHandle {
    id: u64,
    stop: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    fn is_running(&self) -> bool {
        !self.done.load(Ordering::SeqCst)
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

pub struct ViewState<S: ObjectStore + 'static> {
    store: Arc<S>,
    events: EventBus,
    settings: Settings,
    /// Flat mode only: narrows the visible rows without a new query
    view_prefix: Option<String>,
    rows: Vec<Entry>,
    row_keys: HashSet<String>,
    selected: BTreeMap<String, Entry>,
    counts: ListingCounts,
    breadcrumbs: Vec<Breadcrumb>,
    session: Option<SessionHandle>,
    next_session_id: u64,
    last_state: SessionState,
}

impl<S: ObjectStore + 'static> ViewState<S> {
    pub fn new(store: Arc<S>, events: EventBus, settings: Settings) -> ViewState<S> {
        let breadcrumbs = build_breadcrumbs(&settings.bucket, &settings.prefix);
        ViewState {
            store,
            events,
            settings,
            view_prefix: None,
            rows: Vec::new(),
            row_keys: HashSet::new(),
            selected: BTreeMap::new(),
            counts: ListingCounts::default(),
            breadcrumbs,
            session: None,
            next_session_id: 1,
            last_state: SessionState::Idle,
        }
    }

    /// The refresh control is a toggle: while a session runs it requests a
    /// stop and returns; otherwise it clears the view and starts a session.
    pub fn refresh(&mut self) {
        if let Some(handle) = &self.session {
            if handle.is_running() {
                handle.request_stop();
                return;
            }
        }
        self.start_session();
    }

    /// Stop whatever session is running and start a fresh one immediately.
    /// Late pages from the superseded session are dropped by id.
    fn restart(&mut self) {
        if let Some(handle) = &self.session {
            handle.request_stop();
        }
        self.start_session();
    }

    fn start_session(&mut self) {
        self.rows.clear();
        self.row_keys.clear();
        self.selected.clear();
        self.counts = ListingCounts::default();
        self.breadcrumbs =
            build_breadcrumbs(&self.settings.bucket, self.effective_prefix());
        self.last_state = SessionState::Running;

        let id = self.next_session_id;
        self.next_session_id += 1;

        let session = ListingSession::new(
            id,
            &self.settings.bucket,
            &self.settings.prefix,
            &self.settings.delimiter,
        );
        let stop = session.stop_flag();
        let done = Arc::new(AtomicBool::new(false));
        let done_flag = Arc::clone(&done);
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            session.run(store.as_ref(), &events).await;
            done_flag.store(true, Ordering::SeqCst);
        });
        self.session = Some(SessionHandle {
            id,
            stop,
            done,
            task,
        });
    }

    /// Navigate to a folder or breadcrumb. Folder-level mode re-queries under
    /// the new prefix; flat mode just narrows the filter over loaded rows.
    pub fn change_view_prefix(&mut self, prefix: &str) {
        if self.settings.is_flat() {
            self.view_prefix = Some(prefix.to_string());
            self.breadcrumbs = build_breadcrumbs(&self.settings.bucket, prefix);
            self.events
                .send(Event::PrefixChanged(PrefixChange::View(prefix.to_string())));
        } else {
            self.settings.prefix = prefix.to_string();
            self.view_prefix = None;
            self.events
                .send(Event::PrefixChanged(PrefixChange::Query(prefix.to_string())));
            self.restart();
        }
    }

    /// Replace the settings wholesale. With MFA enabled the long-lived keys
    /// are first exchanged for session credentials; any failure there leaves
    /// the previous settings in force.
    pub async fn change_settings(
        &mut self,
        mut new_settings: Settings,
        exchanger: Option<&dyn TokenExchanger>,
    ) {
        if new_settings.mfa.enabled {
            let Some(exchanger) = exchanger else {
                self.events.error(ErrorReport::new(
                    "get_session_token",
                    &StoreError::Transport("MFA enabled but no token exchanger wired".into()),
                ));
                return;
            };
            let serial = match exchanger.first_mfa_device().await {
                Ok(serial) => serial,
                Err(err) => {
                    self.events
                        .error(ErrorReport::new("list_mfa_devices", &err));
                    return;
                }
            };
            match exchanger
                .session_token(&serial, &new_settings.mfa.code)
                .await
            {
                Ok(creds) => new_settings.credentials = creds.into(),
                Err(err) => {
                    self.events.error(
                        ErrorReport::new("get_session_token", &err).detail("serial", &serial),
                    );
                    return;
                }
            }
        }

        self.settings = new_settings;
        self.view_prefix = None;
        self.store.apply_settings(&self.settings).await;

        // Reachability probe; a failure is surfaced but the settings stand
        if let Err(err) = self.store.head_bucket(&self.settings.bucket).await {
            self.events.error(
                ErrorReport::new("head_bucket", &err).detail("bucket", &self.settings.bucket),
            );
        }

        self.events
            .send(Event::SettingsApplied(self.settings.clone()));
        self.restart();
    }

    /// Fold one event into the row set. Listing events from superseded
    /// sessions are dropped here.
    pub fn apply_event(&mut self, event: &Event) {
        let current = self.session.as_ref().map(|s| s.id);
        match event {
            Event::Page { session, entries } if Some(*session) == current => {
                for entry in entries {
                    if self.row_keys.insert(entry.key.clone()) {
                        self.rows.push(entry.clone());
                    }
                }
            }
            Event::Progress {
                session,
                objects,
                folders,
            } if Some(*session) == current => {
                self.counts.add(ListingCounts {
                    objects: *objects,
                    folders: *folders,
                });
            }
            Event::ListingFinished { session, state } if Some(*session) == current => {
                self.last_state = *state;
            }
            _ => {}
        }
    }

    /// Rows in display order, narrowed by the view prefix in flat mode.
    /// The row matching the view prefix itself is the folder being browsed
    /// and is not shown.
    pub fn visible_rows(&self) -> Vec<&Entry> {
        let mut rows: Vec<&Entry> = match &self.view_prefix {
            Some(view) => self
                .rows
                .iter()
                .filter(|e| e.key.starts_with(view.as_str()) && e.key != view.as_str())
                .collect(),
            None => self.rows.iter().collect(),
        };
        rows.sort_by(|a, b| cmp_entries(a, b));
        rows
    }

    pub fn select(&mut self, entry: Entry) {
        self.selected.insert(entry.key.clone(), entry);
    }

    pub fn unselect(&mut self, key: &str) {
        self.selected.remove(key);
    }

    pub fn selected_keys(&self) -> Vec<String> {
        self.selected.keys().cloned().collect()
    }

    /// Hand the current selection over for deletion. A no-op when nothing
    /// is selected.
    pub fn trash_selected(&mut self) {
        if self.selected.is_empty() {
            return;
        }
        let keys = self.selected_keys();
        self.selected.clear();
        self.events.send(Event::BatchTrash {
            bucket: self.settings.bucket.clone(),
            keys,
        });
    }

    /// Create a folder placeholder under the effective prefix. Fails with
    /// `AlreadyExists` rather than silently overwriting.
    pub async fn create_folder(&self, name: &str) -> Result<String, StoreError> {
        let stripped = paths::strip_slashes(name);
        if stripped.is_empty() {
            return Err(StoreError::Transport("folder name is empty".into()));
        }
        let key = format!("{}{}/", self.effective_prefix(), stripped);

        match self.store.head_object(&self.settings.bucket, &key).await {
            Ok(true) => Err(StoreError::AlreadyExists(key)),
            Ok(false) => {
                self.store
                    .put_object(
                        &self.settings.bucket,
                        &key,
                        PutBody::Bytes(Vec::new()),
                        None,
                        None,
                    )
                    .await?;
                self.events.send(Event::ViewRefresh);
                Ok(key)
            }
            Err(err) => Err(err),
        }
    }

    /// Download link for an object: presigned when we hold keys, the plain
    /// virtual-host url otherwise.
    pub async fn download_url(&self, entry: &Entry) -> Result<String, StoreError> {
        if self.settings.has_keys() {
            self.store
                .presigned_get_url(&self.settings.bucket, &entry.key, DOWNLOAD_URL_EXPIRY)
                .await
        } else {
            Ok(paths::virtual_host_url(&self.settings.bucket, &entry.key))
        }
    }

    /// Prefix the view is showing: the flat-mode filter when set, otherwise
    /// the queried prefix
    pub fn effective_prefix(&self) -> &str {
        self.view_prefix.as_deref().unwrap_or(&self.settings.prefix)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn counts(&self) -> ListingCounts {
        self.counts
    }

    pub fn breadcrumbs(&self) -> &[Breadcrumb] {
        &self.breadcrumbs
    }

    pub fn last_state(&self) -> SessionState {
        self.last_state
    }

    pub fn session_running(&self) -> bool {
        self.session.as_ref().is_some_and(SessionHandle::is_running)
    }

    /// Block until the spawned session task exits. Test hook; production
    /// consumers watch `ListingFinished` instead.
    pub async fn wait_for_session(&mut self) {
        if let Some(handle) = &mut self.session {
            let _ = (&mut handle.task).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::object_store::MockObjectStore;
    use crate::services::sts::{MockTokenExchanger, SessionCredentials};
    use crate::services::test_support::{page, ScriptedStore};
    use crate::settings::AuthMode;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn drain_into(view: &mut ViewState<ScriptedStore>, rx: &mut UnboundedReceiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            view.apply_event(&event);
            events.push(event);
        }
        events
    }

    fn folder_settings(bucket: &str, prefix: &str) -> Settings {
        let mut settings = Settings::anonymous(bucket);
        settings.prefix = prefix.to_string();
        settings
    }

    #[tokio::test]
    async fn test_refresh_populates_sorted_rows() {
        let store = Arc::new(ScriptedStore::with_pages(vec![Ok(page(
            &["cars/polo.png", "cars/golf.png"],
            &["cars/vw/"],
            false,
            None,
        ))]));
        let (bus, mut rx) = EventBus::new();
        let mut view = ViewState::new(Arc::clone(&store), bus, folder_settings("bkt", "cars/"));

        view.refresh();
        view.wait_for_session().await;
        drain_into(&mut view, &mut rx).await;

        assert_eq!(view.last_state(), SessionState::Completed);
        assert_eq!(view.counts().objects, 2);
        assert_eq!(view.counts().folders, 1);
        let keys: Vec<_> = view.visible_rows().iter().map(|e| e.key.clone()).collect();
        // Folder first, then objects case-insensitively
        assert_eq!(keys, vec!["cars/vw/", "cars/golf.png", "cars/polo.png"]);
        let crumbs: Vec<_> = view.breadcrumbs().iter().map(|c| c.label.clone()).collect();
        assert_eq!(crumbs, vec!["bkt", "cars"]);
    }

    #[tokio::test]
    async fn test_refresh_is_a_toggle_while_running() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let mut store = ScriptedStore::with_pages(vec![Ok(page(
            &["a.txt"],
            &[],
            true,
            Some("m"),
        ))]);
        store.list_gate = Some(Arc::clone(&gate));
        let store = Arc::new(store);
        let (bus, mut rx) = EventBus::new();
        let mut view = ViewState::new(Arc::clone(&store), bus, folder_settings("bkt", ""));

        view.refresh();
        assert!(view.session_running());

        // Second press stops instead of restarting
        view.refresh();
        gate.add_permits(1);
        view.wait_for_session().await;
        drain_into(&mut view, &mut rx).await;

        assert_eq!(view.last_state(), SessionState::Stopped);
        assert_eq!(store.list_calls().await, 1);

        // Third press starts over
        gate.add_permits(8);
        store.push_page(Ok(page(&["b.txt"], &[], false, None))).await;
        view.refresh();
        view.wait_for_session().await;
        drain_into(&mut view, &mut rx).await;
        assert_eq!(view.last_state(), SessionState::Completed);
    }

    #[tokio::test]
    async fn test_flat_mode_prefix_change_filters_without_query() {
        let store = Arc::new(ScriptedStore::with_pages(vec![Ok(page(
            &["cars/", "cars/golf.png", "docs/", "docs/readme.md", "top.txt"],
            &[],
            false,
            None,
        ))]));
        let (bus, mut rx) = EventBus::new();
        let mut settings = Settings::anonymous("bkt");
        settings.delimiter = String::new();
        let mut view = ViewState::new(Arc::clone(&store), bus, settings);

        view.refresh();
        view.wait_for_session().await;
        drain_into(&mut view, &mut rx).await;
        assert_eq!(view.visible_rows().len(), 5);

        view.change_view_prefix("cars/");
        let events = drain_into(&mut view, &mut rx).await;

        // No new query went out
        assert_eq!(store.list_calls().await, 1);
        let keys: Vec<_> = view.visible_rows().iter().map(|e| e.key.clone()).collect();
        assert_eq!(keys, vec!["cars/golf.png"]);
        assert_eq!(view.effective_prefix(), "cars/");
        assert!(events.contains(&Event::PrefixChanged(PrefixChange::View(
            "cars/".to_string()
        ))));
        let crumbs: Vec<_> = view.breadcrumbs().iter().map(|c| c.label.clone()).collect();
        assert_eq!(crumbs, vec!["bkt", "cars"]);
    }

    #[tokio::test]
    async fn test_folder_mode_prefix_change_requeries() {
        let store = Arc::new(ScriptedStore::with_pages(vec![
            Ok(page(&[], &["cars/"], false, None)),
            Ok(page(&["cars/golf.png"], &[], false, None)),
        ]));
        let (bus, mut rx) = EventBus::new();
        let mut view = ViewState::new(Arc::clone(&store), bus, folder_settings("bkt", ""));

        view.refresh();
        view.wait_for_session().await;
        drain_into(&mut view, &mut rx).await;

        view.change_view_prefix("cars/");
        view.wait_for_session().await;
        let events = drain_into(&mut view, &mut rx).await;

        assert_eq!(store.list_calls().await, 2);
        assert_eq!(view.settings().prefix, "cars/");
        let keys: Vec<_> = view.visible_rows().iter().map(|e| e.key.clone()).collect();
        assert_eq!(keys, vec!["cars/golf.png"]);
        assert!(events.contains(&Event::PrefixChanged(PrefixChange::Query(
            "cars/".to_string()
        ))));
    }

    #[tokio::test]
    async fn test_stale_session_events_are_dropped() {
        let store = Arc::new(ScriptedStore::new());
        let (bus, _rx) = EventBus::new();
        let mut view = ViewState::new(Arc::clone(&store), bus, folder_settings("bkt", ""));

        view.refresh();
        view.wait_for_session().await;

        view.apply_event(&Event::Page {
            session: 99,
            entries: vec![Entry::object("stale.txt", None, None, None)],
        });
        view.apply_event(&Event::Progress {
            session: 99,
            objects: 1,
            folders: 0,
        });

        assert!(view.visible_rows().is_empty());
        assert_eq!(view.counts().total(), 0);
    }

    #[tokio::test]
    async fn test_change_settings_applies_and_probes_bucket() {
        let store = Arc::new(ScriptedStore::new());
        let (bus, mut rx) = EventBus::new();
        let mut view = ViewState::new(Arc::clone(&store), bus, folder_settings("bkt", ""));

        let new_settings = folder_settings("other-bucket", "cars/");
        view.change_settings(new_settings.clone(), None).await;
        view.wait_for_session().await;
        let events = drain_into(&mut view, &mut rx).await;

        assert_eq!(store.applied.lock().await.last(), Some(&new_settings));
        assert_eq!(store.head_bucket_calls.load(Ordering::SeqCst), 1);
        assert!(events.contains(&Event::SettingsApplied(new_settings)));
        // The new settings immediately drive a fresh listing
        assert_eq!(store.list_calls().await, 1);
    }

    #[tokio::test]
    async fn test_failed_bucket_probe_keeps_new_settings() {
        let store = Arc::new(ScriptedStore::new());
        *store.head_bucket_result.lock().await =
            Some(StoreError::NotFound("no such bucket".into()));
        let (bus, mut rx) = EventBus::new();
        let mut view = ViewState::new(Arc::clone(&store), bus, folder_settings("bkt", ""));

        let new_settings = folder_settings("missing-bucket", "");
        view.change_settings(new_settings.clone(), None).await;
        view.wait_for_session().await;
        let events = drain_into(&mut view, &mut rx).await;

        // The probe failure is surfaced but does not veto the apply
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Error(r) if r.context == "head_bucket")));
        assert_eq!(view.settings(), &new_settings);
        assert!(events.contains(&Event::SettingsApplied(new_settings)));
        assert_eq!(store.list_calls().await, 1);
    }

    #[tokio::test]
    async fn test_change_settings_with_mfa_swaps_credentials() {
        let store = Arc::new(ScriptedStore::new());
        let (bus, mut rx) = EventBus::new();
        let mut view = ViewState::new(Arc::clone(&store), bus, folder_settings("bkt", ""));

        let mut exchanger = MockTokenExchanger::new();
        exchanger
            .expect_first_mfa_device()
            .returning(|| Ok("arn:aws:iam::123:mfa/user".to_string()));
        exchanger
            .expect_session_token()
            .withf(|serial, code| serial == "arn:aws:iam::123:mfa/user" && code == "123456")
            .returning(|_, _| {
                Ok(SessionCredentials {
                    access_key_id: "ASIAEXAMPLE".to_string(),
                    secret_access_key: "temp-secret".to_string(),
                    session_token: "temp-token".to_string(),
                })
            });

        let mut new_settings = folder_settings("bkt", "");
        new_settings.auth_mode = AuthMode::Keys;
        new_settings.credentials.access_key_id = "AKIDEXAMPLE".to_string();
        new_settings.credentials.secret_access_key = "long-lived".to_string();
        new_settings.mfa.enabled = true;
        new_settings.mfa.code = "123456".to_string();

        view.change_settings(new_settings, Some(&exchanger)).await;
        view.wait_for_session().await;
        drain_into(&mut view, &mut rx).await;

        let applied = store.applied.lock().await.last().cloned().unwrap();
        assert_eq!(applied.credentials.access_key_id, "ASIAEXAMPLE");
        assert_eq!(applied.credentials.session_token.as_deref(), Some("temp-token"));
    }

    #[tokio::test]
    async fn test_failed_mfa_exchange_keeps_old_settings() {
        let store = Arc::new(ScriptedStore::new());
        let (bus, mut rx) = EventBus::new();
        let before = folder_settings("bkt", "");
        let mut view = ViewState::new(Arc::clone(&store), bus, before.clone());

        let mut exchanger = MockTokenExchanger::new();
        exchanger
            .expect_first_mfa_device()
            .returning(|| Err(StoreError::AccessDenied("cannot list devices".into())));

        let mut new_settings = folder_settings("elsewhere", "");
        new_settings.mfa.enabled = true;
        view.change_settings(new_settings, Some(&exchanger)).await;
        let events = drain_into(&mut view, &mut rx).await;

        assert_eq!(view.settings(), &before);
        assert!(store.applied.lock().await.is_empty());
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Error(r) if r.context == "list_mfa_devices")));
    }

    #[tokio::test]
    async fn test_trash_selected_hands_over_keys() {
        let store = Arc::new(ScriptedStore::new());
        let (bus, mut rx) = EventBus::new();
        let mut view = ViewState::new(Arc::clone(&store), bus, folder_settings("bkt", ""));

        // Empty selection is a no-op
        view.trash_selected();
        assert!(rx.try_recv().is_err());

        view.select(Entry::object("b.txt", None, None, None));
        view.select(Entry::folder("a/"));
        view.trash_selected();

        assert_eq!(
            rx.try_recv().unwrap(),
            Event::BatchTrash {
                bucket: "bkt".to_string(),
                keys: vec!["a/".to_string(), "b.txt".to_string()],
            }
        );
        assert!(view.selected_keys().is_empty());
    }

    #[tokio::test]
    async fn test_create_folder_strips_and_refuses_duplicates() {
        let store = Arc::new(ScriptedStore::new());
        store.existing_keys.lock().await.insert("cars/vw/".to_string());
        let (bus, mut rx) = EventBus::new();
        let view = ViewState::new(Arc::clone(&store), bus, folder_settings("bkt", "cars/"));

        let err = view.create_folder("/vw/").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));

        let key = view.create_folder("audi").await.unwrap();
        assert_eq!(key, "cars/audi/");
        let puts = store.put_keys.lock().await.clone();
        assert_eq!(puts, vec![("cars/audi/".to_string(), 0)]);
        assert_eq!(rx.try_recv().unwrap(), Event::ViewRefresh);

        let err = view.create_folder("//").await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
    }

    #[tokio::test]
    async fn test_download_url_depends_on_auth() {
        let store = Arc::new(ScriptedStore::new());
        let (bus, _rx) = EventBus::new();
        let entry = Entry::object("cars/golf.png", Some(1), None, None);

        let anon_view =
            ViewState::new(Arc::clone(&store), bus.clone(), folder_settings("bkt", ""));
        let url = anon_view.download_url(&entry).await.unwrap();
        assert_eq!(url, "https://bkt.s3.amazonaws.com/cars/golf.png");

        let mut signed_settings = folder_settings("bkt", "");
        signed_settings.auth_mode = AuthMode::Keys;
        signed_settings.credentials.access_key_id = "AKIDEXAMPLE".to_string();
        let signed_view = ViewState::new(Arc::clone(&store), bus, signed_settings);
        let url = signed_view.download_url(&entry).await.unwrap();
        assert_eq!(url, "https://signed.example/bkt/cars/golf.png");
    }

    #[tokio::test]
    async fn test_download_url_signs_for_fifteen_seconds() {
        let mut mock = MockObjectStore::new();
        mock.expect_presigned_get_url()
            .withf(|bucket, key, expires_in| {
                bucket == "bkt" && key == "cars/golf.png" && *expires_in == Duration::from_secs(15)
            })
            .return_once(|_, _, _| Ok("https://signed.example/short-lived".to_string()));
        let (bus, _rx) = EventBus::new();
        let mut signed_settings = folder_settings("bkt", "");
        signed_settings.auth_mode = AuthMode::Keys;
        signed_settings.credentials.access_key_id = "AKIDEXAMPLE".to_string();
        let view = ViewState::new(Arc::new(mock), bus, signed_settings);

        let entry = Entry::object("cars/golf.png", Some(1), None, None);
        let url = view.download_url(&entry).await.unwrap();
        assert_eq!(url, "https://signed.example/short-lived");
    }
}
