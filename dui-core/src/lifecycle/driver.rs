use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use tracing::{info, warn};

use super::machine::{self, Effect, LifecycleEvent, LifecycleState, Phase};
use crate::cache::SnapshotStore;
use crate::config::ScanConfig;
use crate::delete::{Deleter, FsDeleter};
use crate::index::{UsageIndex, absolute_path};
use crate::prune::prune;
use crate::scanner::{DuProbe, Scanner, SizeProbe};
use crate::size::format_size;
use crate::volume::{DfVolumeProbe, VolumeProbe, VolumeStats};

/// Stats for the current session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Total bytes freed by deletions
    pub bytes_freed: u64,
    /// Number of items deleted
    pub items_deleted: u32,
}

/// Everything observers may read, published after each processed event
#[derive(Debug, Clone)]
pub struct LifecycleView {
    /// Increments on every publish
    pub revision: u64,
    pub root: PathBuf,
    pub phase: Phase,
    pub index: Option<Arc<UsageIndex>>,
    pub volume: Option<VolumeStats>,
    /// Path most recently reported by the running scan
    pub active_path: Option<PathBuf>,
    pub deleting: bool,
    pub error: Option<String>,
    /// Transient message, e.g. a failed deletion
    pub notice: Option<String>,
    pub session: SessionStats,
    /// Whether the current index came from the snapshot store
    pub restored_from_cache: bool,
}

impl LifecycleView {
    fn initial(root: PathBuf) -> Self {
        Self {
            revision: 0,
            root,
            phase: Phase::CheckingCache,
            index: None,
            volume: None,
            active_path: None,
            deleting: false,
            error: None,
            notice: None,
            session: SessionStats::default(),
            restored_from_cache: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::Deleting)
    }

    /// Ready and idle, or failed: nothing is in flight
    pub fn is_settled(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::Error)
    }
}

/// External collaborators the lifecycle performs I/O through
#[derive(Clone)]
pub struct Collaborators {
    pub probe: Arc<dyn SizeProbe>,
    pub volume: Arc<dyn VolumeProbe>,
    pub deleter: Arc<dyn Deleter>,
}

impl Collaborators {
    /// `du`, `df` and the real filesystem, with program names from `config`
    pub fn system(config: &ScanConfig) -> Self {
        Self {
            probe: Arc::new(DuProbe::new(config.probe_program.clone())),
            volume: Arc::new(DfVolumeProbe::new(config.volume_program.clone())),
            deleter: Arc::new(FsDeleter),
        }
    }
}

#[derive(Debug)]
enum Request {
    Refresh,
    Retry,
    Delete(Vec<PathBuf>),
}

impl From<Request> for LifecycleEvent {
    fn from(request: Request) -> Self {
        match request {
            Request::Refresh => LifecycleEvent::Refresh,
            Request::Retry => LifecycleEvent::Retry,
            Request::Delete(paths) => LifecycleEvent::DeleteItems(paths),
        }
    }
}

/// Lifecycle for one root, not yet running
pub struct ScanLifecycle {
    root: PathBuf,
    config: ScanConfig,
    store: SnapshotStore,
    collaborators: Collaborators,
}

impl ScanLifecycle {
    pub fn new(
        root: &Path,
        config: ScanConfig,
        store: SnapshotStore,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            root: absolute_path(root),
            config,
            store,
            collaborators,
        }
    }

    /// Start the event loop on its own thread
    pub fn spawn(self) -> LifecycleHandle {
        let (request_tx, request_rx) = unbounded();
        // One pending wake-up is enough: readers always fetch the latest view
        let (update_tx, update_rx) = bounded(1);
        let (event_tx, event_rx) = unbounded();

        let current = Arc::new(RwLock::new(Arc::new(LifecycleView::initial(
            self.root.clone(),
        ))));

        let driver = Driver {
            root: self.root,
            config: self.config,
            store: self.store,
            collaborators: self.collaborators,
            state: LifecycleState::CheckingCache,
            index: None,
            volume: None,
            active_path: None,
            notice: None,
            session: SessionStats::default(),
            restored_from_cache: false,
            revision: 0,
            event_tx,
            current: Arc::clone(&current),
            updates: update_tx,
        };

        let thread = std::thread::spawn(move || driver.run(request_rx, event_rx));

        LifecycleHandle {
            requests: request_tx,
            updates: update_rx,
            current,
            thread,
        }
    }
}

/// Control and observation side of a running lifecycle. Dropping it stops
/// the event loop.
pub struct LifecycleHandle {
    requests: Sender<Request>,
    updates: Receiver<u64>,
    current: Arc<RwLock<Arc<LifecycleView>>>,
    thread: JoinHandle<()>,
}

impl LifecycleHandle {
    /// Invalidate the snapshot and rescan. Ignored unless idle.
    pub fn refresh(&self) {
        self.send(Request::Refresh);
    }

    /// Leave the error state and start over from the volume probe
    pub fn retry(&self) {
        self.send(Request::Retry);
    }

    /// Delete a batch of paths. Ignored unless idle.
    pub fn delete(&self, paths: Vec<PathBuf>) {
        self.send(Request::Delete(paths));
    }

    /// Latest published view
    pub fn view(&self) -> Arc<LifecycleView> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Wakes up when a newer view is published. Carries the revision that
    /// triggered it; read [`view`](Self::view) for the current state.
    pub fn updates(&self) -> &Receiver<u64> {
        &self.updates
    }

    /// Block until the latest view satisfies `accept` or `timeout` elapses
    pub fn wait_for(
        &self,
        timeout: Duration,
        accept: impl Fn(&LifecycleView) -> bool,
    ) -> Option<Arc<LifecycleView>> {
        let deadline = Instant::now() + timeout;
        loop {
            let view = self.view();
            if accept(&view) {
                return Some(view);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            if self.updates.recv_timeout(remaining).is_err() {
                let view = self.view();
                return accept(&view).then_some(view);
            }
        }
    }

    /// Stop the event loop and wait for it to exit. Worker threads still
    /// running are left to finish on their own.
    pub fn shutdown(self) {
        let LifecycleHandle {
            requests, thread, ..
        } = self;
        drop(requests);
        if thread.join().is_err() {
            warn!("lifecycle thread panicked");
        }
    }

    fn send(&self, request: Request) {
        if self.requests.send(request).is_err() {
            warn!("lifecycle is no longer running");
        }
    }
}

struct Driver {
    root: PathBuf,
    config: ScanConfig,
    store: SnapshotStore,
    collaborators: Collaborators,
    state: LifecycleState,
    index: Option<Arc<UsageIndex>>,
    volume: Option<VolumeStats>,
    active_path: Option<PathBuf>,
    notice: Option<String>,
    session: SessionStats,
    restored_from_cache: bool,
    revision: u64,
    event_tx: Sender<LifecycleEvent>,
    current: Arc<RwLock<Arc<LifecycleView>>>,
    updates: Sender<u64>,
}

impl Driver {
    fn run(mut self, requests: Receiver<Request>, events: Receiver<LifecycleEvent>) {
        info!(root = %self.root.display(), "lifecycle started");
        let (state, effects) = machine::start();
        self.state = state;
        self.execute_all(effects);
        self.publish();

        loop {
            let next = select! {
                recv(events) -> msg => msg.ok(),
                recv(requests) -> msg => msg.ok().map(LifecycleEvent::from),
            };
            let Some(event) = next else {
                break;
            };
            self.handle(event);
        }

        info!(root = %self.root.display(), "lifecycle stopped");
    }

    fn handle(&mut self, event: LifecycleEvent) {
        let name = event.name();
        let before = self.state.phase();
        let state = std::mem::replace(&mut self.state, LifecycleState::CheckingCache);
        let (next, effects) = machine::transition(state, event);
        self.state = next;

        let after = self.state.phase();
        if before != after {
            info!(event = name, from = ?before, to = ?after, "lifecycle transition");
        }

        self.execute_all(effects);
        self.publish();
    }

    fn execute_all(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::CheckCache => {
                let available = self.store.is_available();
                self.emit(LifecycleEvent::CacheChecked { available });
            }
            Effect::RestoreCache => {
                let snapshot = self.store.hydrate().map(Box::new);
                self.emit(LifecycleEvent::CacheRestored(snapshot));
            }
            Effect::InvalidateCache => self.store.invalidate(),
            Effect::ClearIndex => {
                self.index = None;
                self.active_path = None;
                self.restored_from_cache = false;
            }
            Effect::LoadVolume => self.spawn_volume_probe(),
            Effect::StoreVolume(volume) => self.volume = Some(volume),
            Effect::StartScan => {
                self.active_path = None;
                self.spawn_scan();
            }
            Effect::ShowActivePath(path) => self.active_path = Some(path),
            Effect::CommitRestored(snapshot) => {
                info!(
                    folders = snapshot.index.len(),
                    entries = snapshot.index.entry_count(),
                    "index restored from snapshot"
                );
                self.index = Some(Arc::new(snapshot.index));
                self.volume = Some(snapshot.volume);
                self.active_path = None;
                self.restored_from_cache = true;
            }
            Effect::CommitScan(index) => {
                if let Some(volume) = &self.volume {
                    self.store.persist(&index, volume);
                }
                self.index = Some(Arc::new(index));
                self.active_path = None;
                self.restored_from_cache = false;
            }
            Effect::RunDeletion(paths) => {
                self.notice = None;
                self.spawn_deletion(paths);
            }
            Effect::PruneDeleted(paths) => self.prune_deleted(&paths),
            Effect::NotifyDeletionFailed(message) => {
                warn!(error = %message, "deletion failed; index left unchanged");
                self.notice = Some(format!("Deletion failed: {message}"));
            }
        }
    }

    fn prune_deleted(&mut self, paths: &[PathBuf]) {
        let Some(current) = self.index.clone() else {
            return;
        };

        let outcome = prune(&current, paths, &self.root);
        let volume = self
            .volume
            .as_ref()
            .map(|volume| volume.with_freed(outcome.freed_bytes));

        self.session.bytes_freed = self.session.bytes_freed.saturating_add(outcome.freed_bytes);
        self.session.items_deleted = self
            .session
            .items_deleted
            .saturating_add(u32::try_from(paths.len()).unwrap_or(u32::MAX));

        if let Some(volume) = &volume {
            self.store.persist(&outcome.index, volume);
        }
        info!(
            items = paths.len(),
            freed = %format_size(outcome.freed_bytes),
            "index pruned after deletion"
        );

        self.index = Some(Arc::new(outcome.index));
        self.volume = volume;
    }

    fn spawn_volume_probe(&self) {
        let probe = Arc::clone(&self.collaborators.volume);
        let root = self.root.clone();
        let tx = self.event_tx.clone();
        std::thread::spawn(move || {
            let event = match probe.probe(&root) {
                Ok(space) => LifecycleEvent::VolumeLoaded(space.into()),
                Err(e) => LifecycleEvent::VolumeFailed(e.to_string()),
            };
            let _ = tx.send(event);
        });
    }

    fn spawn_scan(&self) {
        let scanner = Scanner::new(self.config.clone(), Arc::clone(&self.collaborators.probe));
        let root = self.root.clone();
        let tx = self.event_tx.clone();
        std::thread::spawn(move || {
            let result = scanner.run(&root, |progress| {
                if let Some(path) = &progress.current_path {
                    let _ = tx.send(LifecycleEvent::ScanProgress(path.clone()));
                }
            });
            let event = match result {
                Ok(index) => LifecycleEvent::ScanFinished(index),
                Err(e) => LifecycleEvent::ScanFailed(e.to_string()),
            };
            let _ = tx.send(event);
        });
    }

    fn spawn_deletion(&self, paths: Vec<PathBuf>) {
        let deleter = Arc::clone(&self.collaborators.deleter);
        let tx = self.event_tx.clone();
        std::thread::spawn(move || {
            let event = match deleter.delete(&paths) {
                Ok(()) => LifecycleEvent::DeletionSucceeded,
                Err(e) => LifecycleEvent::DeletionFailed(e.to_string()),
            };
            let _ = tx.send(event);
        });
    }

    fn emit(&self, event: LifecycleEvent) {
        // The loop owns a receiver, so this only fails during shutdown.
        let _ = self.event_tx.send(event);
    }

    fn publish(&mut self) {
        self.revision += 1;
        let view = Arc::new(LifecycleView {
            revision: self.revision,
            root: self.root.clone(),
            phase: self.state.phase(),
            index: self.index.clone(),
            volume: self.volume.clone(),
            active_path: self.active_path.clone(),
            deleting: self.state.phase() == Phase::Deleting,
            error: match &self.state {
                LifecycleState::Error { message } => Some(message.clone()),
                _ => None,
            },
            notice: self.notice.clone(),
            session: self.session.clone(),
            restored_from_cache: self.restored_from_cache,
        });

        match self.current.write() {
            Ok(mut guard) => *guard = view,
            Err(poisoned) => *poisoned.into_inner() = view,
        }
        // Full means a wake-up is already pending
        let _ = self.updates.try_send(self.revision);
    }
}
