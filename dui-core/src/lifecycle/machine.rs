//! Lifecycle state machine.
//!
//! [`transition`] is pure: it maps the current state and one event to the
//! next state plus a list of [`Effect`]s. All I/O (storage, subprocesses,
//! deletion) is performed by the driver when it executes those effects.

use std::path::PathBuf;

use tracing::debug;

use crate::cache::Snapshot;
use crate::index::UsageIndex;
use crate::volume::VolumeStats;

/// Sub-states of `ready`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    Idle,
    /// A deletion batch is running; its paths are pruned once it succeeds
    Deleting { paths: Vec<PathBuf> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    CheckingCache,
    RestoringCache,
    LoadingVolume,
    Scanning,
    Ready(ReadyState),
    /// Recoverable only through an explicit retry
    Error { message: String },
}

/// Flat view of [`LifecycleState`] for observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CheckingCache,
    RestoringCache,
    LoadingVolume,
    Scanning,
    Idle,
    Deleting,
    Error,
}

impl LifecycleState {
    pub fn phase(&self) -> Phase {
        match self {
            LifecycleState::CheckingCache => Phase::CheckingCache,
            LifecycleState::RestoringCache => Phase::RestoringCache,
            LifecycleState::LoadingVolume => Phase::LoadingVolume,
            LifecycleState::Scanning => Phase::Scanning,
            LifecycleState::Ready(ReadyState::Idle) => Phase::Idle,
            LifecycleState::Ready(ReadyState::Deleting { .. }) => Phase::Deleting,
            LifecycleState::Error { .. } => Phase::Error,
        }
    }
}

/// Everything the lifecycle reacts to: results of its own effects, scan
/// output, and user requests
#[derive(Debug)]
pub enum LifecycleEvent {
    CacheChecked { available: bool },
    /// `None` when the snapshot was absent or unreadable
    CacheRestored(Option<Box<Snapshot>>),
    VolumeLoaded(VolumeStats),
    VolumeFailed(String),
    ScanProgress(PathBuf),
    ScanFinished(UsageIndex),
    ScanFailed(String),
    Refresh,
    Retry,
    DeleteItems(Vec<PathBuf>),
    DeletionSucceeded,
    DeletionFailed(String),
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::CacheChecked { .. } => "cache-checked",
            LifecycleEvent::CacheRestored(_) => "cache-restored",
            LifecycleEvent::VolumeLoaded(_) => "volume-loaded",
            LifecycleEvent::VolumeFailed(_) => "volume-failed",
            LifecycleEvent::ScanProgress(_) => "scan-progress",
            LifecycleEvent::ScanFinished(_) => "scan-finished",
            LifecycleEvent::ScanFailed(_) => "scan-failed",
            LifecycleEvent::Refresh => "refresh",
            LifecycleEvent::Retry => "retry",
            LifecycleEvent::DeleteItems(_) => "delete-items",
            LifecycleEvent::DeletionSucceeded => "deletion-succeeded",
            LifecycleEvent::DeletionFailed(_) => "deletion-failed",
        }
    }
}

/// Side effects requested by a transition, executed in order
#[derive(Debug)]
pub enum Effect {
    CheckCache,
    RestoreCache,
    InvalidateCache,
    ClearIndex,
    LoadVolume,
    StoreVolume(VolumeStats),
    StartScan,
    ShowActivePath(PathBuf),
    /// Publish a restored snapshot
    CommitRestored(Snapshot),
    /// Persist and publish a freshly scanned index
    CommitScan(UsageIndex),
    RunDeletion(Vec<PathBuf>),
    /// Prune, update volume stats, persist and publish
    PruneDeleted(Vec<PathBuf>),
    NotifyDeletionFailed(String),
}

/// Initial state and the effects that kick it off
pub fn start() -> (LifecycleState, Vec<Effect>) {
    (LifecycleState::CheckingCache, vec![Effect::CheckCache])
}

pub fn transition(state: LifecycleState, event: LifecycleEvent) -> (LifecycleState, Vec<Effect>) {
    use LifecycleEvent as E;
    use LifecycleState as S;

    match (state, event) {
        (S::CheckingCache, E::CacheChecked { available: true }) => {
            (S::RestoringCache, vec![Effect::RestoreCache])
        }
        (S::CheckingCache, E::CacheChecked { available: false }) => {
            (S::LoadingVolume, vec![Effect::LoadVolume])
        }

        (S::RestoringCache, E::CacheRestored(Some(snapshot))) => (
            S::Ready(ReadyState::Idle),
            vec![Effect::CommitRestored(*snapshot)],
        ),
        (S::RestoringCache, E::CacheRestored(None)) => {
            (S::LoadingVolume, vec![Effect::LoadVolume])
        }

        (S::LoadingVolume, E::VolumeLoaded(volume)) => (
            S::Scanning,
            vec![Effect::StoreVolume(volume), Effect::StartScan],
        ),
        (S::LoadingVolume, E::VolumeFailed(message)) => (S::Error { message }, Vec::new()),

        (S::Scanning, E::ScanProgress(path)) => (S::Scanning, vec![Effect::ShowActivePath(path)]),
        (S::Scanning, E::ScanFinished(index)) => (
            S::Ready(ReadyState::Idle),
            vec![Effect::CommitScan(index)],
        ),
        (S::Scanning, E::ScanFailed(message)) => (S::Error { message }, Vec::new()),

        (S::Ready(ReadyState::Idle), E::Refresh) => (
            S::LoadingVolume,
            vec![
                Effect::InvalidateCache,
                Effect::ClearIndex,
                Effect::LoadVolume,
            ],
        ),
        (S::Ready(ReadyState::Idle), E::DeleteItems(paths)) if paths.is_empty() => {
            (S::Ready(ReadyState::Idle), Vec::new())
        }
        (S::Ready(ReadyState::Idle), E::DeleteItems(paths)) => (
            S::Ready(ReadyState::Deleting {
                paths: paths.clone(),
            }),
            vec![Effect::RunDeletion(paths)],
        ),

        (S::Ready(ReadyState::Deleting { paths }), E::DeletionSucceeded) => (
            S::Ready(ReadyState::Idle),
            vec![Effect::PruneDeleted(paths)],
        ),
        (S::Ready(ReadyState::Deleting { .. }), E::DeletionFailed(message)) => (
            S::Ready(ReadyState::Idle),
            vec![Effect::NotifyDeletionFailed(message)],
        ),

        (S::Error { .. }, E::Retry) => (S::LoadingVolume, vec![Effect::LoadVolume]),

        (state, event) => {
            debug!(phase = ?state.phase(), event = event.name(), "event not accepted in current state");
            (state, Vec::new())
        }
    }
}
