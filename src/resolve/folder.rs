use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use uuid::Uuid;

use crate::resolve::representation::TranscodeChild;

/// The transcode folder of one item as seen by one renderer.
///
/// Children are resolved at most once. The check and the population happen
/// under the folder's own mutex, so concurrent browsers of the same folder
/// wait for the first one and then share its result.
#[derive(Debug)]
pub struct TranscodeFolder {
    pub item_id: Uuid,
    pub renderer: String,
    children: Mutex<Option<Arc<[TranscodeChild]>>>,
}

impl TranscodeFolder {
    pub fn new(item_id: Uuid, renderer: impl Into<String>) -> Self {
        TranscodeFolder {
            item_id,
            renderer: renderer.into(),
            children: Mutex::new(None),
        }
    }

    /// Return the children, running `resolve` first if they don't exist yet.
    pub fn get_or_resolve<F>(&self, resolve: F) -> Arc<[TranscodeChild]>
    where
        F: FnOnce() -> Vec<TranscodeChild>,
    {
        let mut children = self.children.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = children.as_ref() {
            return Arc::clone(existing);
        }
        let resolved: Arc<[TranscodeChild]> = resolve().into();
        *children = Some(Arc::clone(&resolved));
        resolved
    }

    /// The children if some caller already resolved them.
    pub fn resolved(&self) -> Option<Arc<[TranscodeChild]>> {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Arc::clone)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved().is_some()
    }
}

/// Transcode folders keyed by (item id, renderer name).
#[derive(Debug, Default)]
pub struct TranscodeFolders {
    folders: RwLock<HashMap<(Uuid, String), Arc<TranscodeFolder>>>,
}

impl TranscodeFolders {
    pub fn new() -> Self {
        Self::default()
    }

    /// The folder for this pairing, created empty on first use.
    pub fn folder(&self, item_id: Uuid, renderer: &str) -> Arc<TranscodeFolder> {
        let key = (item_id, renderer.to_string());
        if let Some(folder) = self
            .folders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(folder);
        }
        let mut folders = self.folders.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            folders
                .entry(key)
                .or_insert_with(|| Arc::new(TranscodeFolder::new(item_id, renderer))),
        )
    }

    /// Already-resolved children of a pairing. Never creates the folder.
    pub fn resolved(&self, item_id: Uuid, renderer: &str) -> Option<Arc<[TranscodeChild]>> {
        self.folders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(item_id, renderer.to_string()))
            .and_then(|folder| folder.resolved())
    }

    pub fn len(&self) -> usize {
        self.folders.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
