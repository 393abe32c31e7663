//! Scan lifecycle for a single root: cache restore, volume probe, scan,
//! and deletions, driven by a pure state machine on a dedicated thread.

mod driver;
mod machine;

pub use driver::{Collaborators, LifecycleHandle, LifecycleView, ScanLifecycle, SessionStats};
pub use machine::{Effect, LifecycleEvent, LifecycleState, Phase, ReadyState, start, transition};
