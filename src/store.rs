//! Shared persisted key-value store.
//!
//! Every context reads it as a snapshot; there is no push invalidation, so a
//! consumer re-reads before acting on state it did not just write itself.
//! Each mutation happens under one lock, so a cache write or clear is never
//! observed half-done.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, GuardResult};
use crate::model::{AnalysisResult, CacheEntry, ExtractedContent, PageIdentity, Session};

/// Raw store contents, keyed the way the extension persisted them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_content: Option<ExtractedContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_analysis: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_negative_content: Option<bool>,
}

impl StoreSnapshot {
    pub fn cache_entry(&self) -> Option<CacheEntry> {
        match (&self.last_content, &self.last_analysis) {
            (Some(content), Some(analysis)) => Some(CacheEntry {
                content: content.clone(),
                analysis: analysis.clone(),
            }),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<Session> {
        match (&self.user_id, self.login_time) {
            (Some(user_id), Some(login_time)) => Some(Session {
                user_id: user_id.clone(),
                is_admin: self.is_admin.unwrap_or(false),
                login_time,
            }),
            _ => None,
        }
    }

    /// Blocking is on unless the user explicitly turned it off.
    pub fn blocking_preference(&self) -> bool {
        self.block_negative_content != Some(false)
    }
}

/// Store seam injected into every context.
pub trait SharedStore: Send + Sync {
    fn snapshot(&self) -> GuardResult<StoreSnapshot>;

    /// Apply `f` atomically and persist the result.
    fn update(&self, f: &mut dyn FnMut(&mut StoreSnapshot)) -> GuardResult<()>;

    fn cache_entry(&self) -> GuardResult<Option<CacheEntry>> {
        Ok(self.snapshot()?.cache_entry())
    }

    /// Cached entry for `identity`, or `None` when absent or stale.
    fn fresh_entry(&self, identity: &PageIdentity) -> GuardResult<Option<CacheEntry>> {
        Ok(self.cache_entry()?.filter(|e| e.is_fresh_for(identity)))
    }

    fn put_cache_entry(&self, entry: CacheEntry) -> GuardResult<()> {
        let mut slot = Some(entry);
        self.update(&mut |state| {
            if let Some(entry) = slot.take() {
                state.last_content = Some(entry.content);
                state.last_analysis = Some(entry.analysis);
            }
        })
    }

    fn clear_cache(&self) -> GuardResult<()> {
        self.update(&mut |state| {
            state.last_content = None;
            state.last_analysis = None;
        })
    }

    fn session(&self) -> GuardResult<Option<Session>> {
        Ok(self.snapshot()?.session())
    }

    fn set_session(&self, session: Session) -> GuardResult<()> {
        self.update(&mut |state| {
            state.user_id = Some(session.user_id.clone());
            state.is_admin = Some(session.is_admin);
            state.login_time = Some(session.login_time);
        })
    }

    /// Logout: drops the session keys and the blocking preference.
    fn clear_session(&self) -> GuardResult<()> {
        self.update(&mut |state| {
            state.user_id = None;
            state.is_admin = None;
            state.login_time = None;
            state.block_negative_content = None;
        })
    }

    fn blocking_preference(&self) -> GuardResult<bool> {
        Ok(self.snapshot()?.blocking_preference())
    }

    fn set_blocking_preference(&self, enabled: bool) -> GuardResult<()> {
        self.update(&mut |state| state.block_negative_content = Some(enabled))
    }
}

/// Process-local store, used by tests and when no store path is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedStore for MemoryStore {
    fn snapshot(&self) -> GuardResult<StoreSnapshot> {
        let guard = self.state.lock().map_err(|_| poisoned())?;
        Ok(guard.clone())
    }

    fn update(&self, f: &mut dyn FnMut(&mut StoreSnapshot)) -> GuardResult<()> {
        let mut guard = self.state.lock().map_err(|_| poisoned())?;
        f(&mut guard);
        Ok(())
    }
}

/// JSON document on disk, rewritten after every mutation.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: Mutex<StoreSnapshot>,
}

impl FileStore {
    /// Open or create the store. A corrupt file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> GuardResult<Self> {
        let path = path.into();
        let state = if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|e| GuardError::Store(format!("read {}: {}", path.display(), e)))?;
            serde_json::from_str(&contents).unwrap_or_else(|e| {
                log::warn!("Store {} unreadable, starting empty: {}", path.display(), e);
                StoreSnapshot::default()
            })
        } else {
            StoreSnapshot::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &StoreSnapshot) -> GuardResult<()> {
        let serialized =
            serde_json::to_string_pretty(state).map_err(|e| GuardError::Store(e.to_string()))?;
        fs::write(&self.path, serialized)
            .map_err(|e| GuardError::Store(format!("write {}: {}", self.path.display(), e)))
    }
}

impl SharedStore for FileStore {
    fn snapshot(&self) -> GuardResult<StoreSnapshot> {
        let guard = self.state.lock().map_err(|_| poisoned())?;
        Ok(guard.clone())
    }

    fn update(&self, f: &mut dyn FnMut(&mut StoreSnapshot)) -> GuardResult<()> {
        let mut guard = self.state.lock().map_err(|_| poisoned())?;
        let mut next = guard.clone();
        f(&mut next);
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }
}

fn poisoned() -> GuardError {
    GuardError::Store("store lock poisoned".into())
}
