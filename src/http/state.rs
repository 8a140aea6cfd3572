use std::sync::{Arc, PoisonError, RwLock};

use axum::http::{header, HeaderMap};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::{ConfiguredCatalog, EngineCatalog};
use crate::media::library::{MediaItem, MediaLibrary};
use crate::media::mime::MediaKind;
use crate::renderer::{Renderer, RendererRegistry};
use crate::resolve::{RepresentationResolver, TranscodeChild, TranscodeFolders};
use crate::stream::Transcoder;

/// Shared application state injected into all route handlers via axum::extract::State.
/// Everything is built once in main and only read afterwards; the transcode
/// folders fill themselves in lazily, one resolution per item and renderer.
#[derive(Clone)]
pub struct AppState {
    pub library: Arc<RwLock<MediaLibrary>>,
    pub renderers: Arc<RendererRegistry>,
    pub resolver: RepresentationResolver,
    pub folders: Arc<TranscodeFolders>,
    pub transcoder: Transcoder,
}

impl AppState {
    pub fn from_config(library: MediaLibrary, config: &Config) -> Self {
        let catalog: Arc<dyn EngineCatalog> = Arc::new(ConfiguredCatalog::from_config(&config.engines));
        AppState {
            library: Arc::new(RwLock::new(library)),
            renderers: Arc::new(RendererRegistry::new(&config.renderers)),
            resolver: RepresentationResolver::new(catalog, config.chapter_interval),
            folders: Arc::new(TranscodeFolders::new()),
            transcoder: Transcoder::new(config.max_transcodes, config.abort_timeout),
        }
    }

    /// The renderer profile matching the request's User-Agent.
    pub fn renderer(&self, headers: &HeaderMap) -> Arc<Renderer> {
        let ua = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok());
        let renderer = self.renderers.match_user_agent(ua);
        tracing::trace!("User-Agent {:?} -> renderer {}", ua, renderer.name);
        renderer
    }

    /// Look up an item by id. The lock is released before returning, so this
    /// is safe to call before any .await.
    pub fn item(&self, id: &Uuid) -> Option<MediaItem> {
        let lib = self.library.read().unwrap_or_else(PoisonError::into_inner);
        lib.get(id).cloned()
    }

    /// Items of one kind, or all items, in scan order.
    pub fn items(&self, kind: Option<MediaKind>) -> Vec<MediaItem> {
        let lib = self.library.read().unwrap_or_else(PoisonError::into_inner);
        lib.items
            .iter()
            .filter(|i| kind.map_or(true, |k| i.kind == k))
            .cloned()
            .collect()
    }

    pub fn item_count(&self) -> usize {
        self.library.read().unwrap_or_else(PoisonError::into_inner).items.len()
    }

    /// Children of the item's transcode folder for this renderer, resolved on
    /// first use and shared afterwards.
    pub fn transcode_children(&self, item: &MediaItem, renderer: &Renderer) -> Arc<[TranscodeChild]> {
        self.folders
            .folder(item.id, &renderer.name)
            .get_or_resolve(|| self.resolver.children(item, renderer, None))
    }

    /// Children of the item's transcode folder if they were resolved before.
    pub fn resolved_children(&self, item: &MediaItem, renderer: &Renderer) -> Option<Arc<[TranscodeChild]>> {
        self.folders.resolved(item.id, &renderer.name)
    }
}
