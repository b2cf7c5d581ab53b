use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::PipelineError;

/// Opaque, stable identity of one image target in the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    Queued,
    Translating,
    Translated,
    Failed,
    Editing,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: ProcessingState,
    before_edit: Option<ProcessingState>,
}

/// Processing state per target, shared by every clone.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    entries: Arc<Mutex<HashMap<TargetId, Entry>>>,
}

impl TargetRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<TargetId, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records the processing state of `id`. While an editor is open the
    /// target stays in `Editing` and `state` is restored once it closes.
    pub fn set(&self, id: &TargetId, state: ProcessingState) {
        let mut entries = self.lock();
        let entry = entries.entry(id.clone()).or_insert(Entry {
            state,
            before_edit: None,
        });
        if entry.state == ProcessingState::Editing && state != ProcessingState::Editing {
            entry.before_edit = Some(state);
            debug!("{id} -> {state:?} after editing");
            return;
        }
        entry.state = state;
        debug!("{id} -> {state:?}");
    }

    pub fn state(&self, id: &TargetId) -> Option<ProcessingState> {
        self.lock().get(id).map(|entry| entry.state)
    }

    pub fn is_editing(&self, id: &TargetId) -> bool {
        self.state(id) == Some(ProcessingState::Editing)
    }

    /// Marks `id` as being edited; a second editor on the same target is
    /// rejected.
    pub fn begin_edit(&self, id: &TargetId) -> Result<(), PipelineError> {
        let mut entries = self.lock();
        match entries.get_mut(id) {
            Some(entry) if entry.state == ProcessingState::Editing => {
                warn!("editor already open on {id}");
                Err(PipelineError::ConcurrencyGuardRejected(format!(
                    "an editor is already open on {id}"
                )))
            }
            Some(entry) => {
                entry.before_edit = Some(entry.state);
                entry.state = ProcessingState::Editing;
                Ok(())
            }
            None => {
                entries.insert(
                    id.clone(),
                    Entry {
                        state: ProcessingState::Editing,
                        before_edit: None,
                    },
                );
                Ok(())
            }
        }
    }

    /// Leaves the editing state, restoring whatever preceded it.
    pub fn end_edit(&self, id: &TargetId) {
        let mut entries = self.lock();
        let Some(entry) = entries.get(id).copied() else {
            return;
        };
        if entry.state != ProcessingState::Editing {
            return;
        }
        match entry.before_edit {
            Some(previous) => {
                entries.insert(
                    id.clone(),
                    Entry {
                        state: previous,
                        before_edit: None,
                    },
                );
            }
            None => {
                entries.remove(id);
            }
        }
    }

    pub fn forget(&self, id: &TargetId) -> Option<ProcessingState> {
        self.lock().remove(id).map(|entry| entry.state)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
