use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::joblog::JobLog;
use crate::registry::{Manifest, Registry};

/// The manifest pulled for the tag currently being replicated.
#[derive(Debug, Clone)]
pub struct PulledManifest {
    pub tag: String,
    pub manifest: Manifest,
    pub blobs: Vec<String>,
}

/// Where a transfer job stands in its tag list.
#[derive(Debug, Default)]
struct Progress {
    // Tags not pulled yet, in job order.
    pending: VecDeque<String>,
    // Manifest pulled but not pushed yet.
    current: Option<PulledManifest>,
}

/// State shared by the handlers of one transfer job.
///
/// Handlers run one after another on the owning worker, so the lock is
/// never contended; it only makes the session shareable between them.
pub struct Session {
    pub repository: String,
    /// Registry the images are read from.
    pub source: Arc<dyn Registry>,
    /// Registry the images are written to.
    pub target: Arc<dyn Registry>,
    pub log: JobLog,
    // Tag queue and the manifest in flight.
    progress: Mutex<Progress>,
}

impl Session {
    pub fn new(
        repository: String,
        tags: Vec<String>,
        source: Arc<dyn Registry>,
        target: Arc<dyn Registry>,
        log: JobLog,
    ) -> Self {
        Self {
            repository,
            source,
            target,
            log,
            progress: Mutex::new(Progress {
                pending: tags.into(),
                current: None,
            }),
        }
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether any tag is left to pull.
    pub fn has_tags(&self) -> bool {
        !self.progress().pending.is_empty()
    }

    /// Replaces the pending tags, e.g. with the full source tag list.
    pub fn set_tags(&self, tags: Vec<String>) {
        self.progress().pending = tags.into();
    }

    pub fn next_tag(&self) -> Option<String> {
        self.progress().pending.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.progress().pending.len()
    }

    pub fn set_current(&self, pulled: PulledManifest) {
        self.progress().current = Some(pulled);
    }

    pub fn current(&self) -> Option<PulledManifest> {
        self.progress().current.clone()
    }

    /// Removes the manifest in flight once it has been pushed.
    pub fn take_current(&self) -> Option<PulledManifest> {
        self.progress().current.take()
    }
}
