use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::engine::EngineCatalog;
use crate::media::library::{MediaItem, SubtitleTrack};
use crate::renderer::Renderer;
use crate::resolve::representation::{
    with_audio_subtitle_engine, ChapterFolder, Representation, TranscodeChild,
};

/// Enumerates the representations of an item for a renderer.
#[derive(Clone)]
pub struct RepresentationResolver {
    catalog: Arc<dyn EngineCatalog>,
    /// Minutes; used when the renderer does not set its own.
    chapter_interval: u32,
}

/// Null and "und" sort before any real language; the rest compare case-insensitively.
fn cmp_lang(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}

impl RepresentationResolver {
    pub fn new(catalog: Arc<dyn EngineCatalog>, chapter_interval: u32) -> Self {
        RepresentationResolver { catalog, chapter_interval }
    }

    pub fn catalog(&self) -> &Arc<dyn EngineCatalog> {
        &self.catalog
    }

    /// Chapter interval in seconds for `renderer`; 0 disables chapters.
    pub fn chapter_interval_secs(&self, renderer: &Renderer) -> u64 {
        u64::from(renderer.chapter_interval.unwrap_or(self.chapter_interval)) * 60
    }

    /// Ordered representations of `item` for `renderer`. The canonical direct
    /// entry always comes first. `subtitle_override`, when given, is the only
    /// subtitle offered to engines.
    pub fn representations(
        &self,
        item: &MediaItem,
        renderer: &Renderer,
        subtitle_override: Option<&SubtitleTrack>,
    ) -> Vec<Representation> {
        let canonical = with_audio_subtitle_engine(item, item.sole_audio_track(), None, None);

        let audios: Vec<_> = if item.audio_tracks.is_empty() {
            vec![None]
        } else {
            item.audio_tracks.iter().map(Some).collect()
        };

        let disabled = SubtitleTrack::disabled();
        let subtitles: Vec<Option<&SubtitleTrack>> = match subtitle_override {
            Some(sub) => vec![Some(sub)],
            None if item.subtitle_tracks.is_empty() => vec![None],
            None => item
                .subtitle_tracks
                .iter()
                .chain(std::iter::once(&disabled))
                .map(Some)
                .collect(),
        };

        // Equal ranks tie-break on catalog position.
        let position: HashMap<String, usize> = self
            .catalog
            .all()
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();

        let mut candidates: Vec<Representation> = Vec::new();
        for &audio in &audios {
            for &subtitle in &subtitles {
                for engine in self.catalog.engines(item, audio, subtitle) {
                    if !renderer.capabilities.accepts_mime(&engine.output_mime) {
                        tracing::trace!(
                            "{} rejects {} output {}",
                            renderer.name,
                            engine.id,
                            engine.output_mime
                        );
                        continue;
                    }
                    candidates.push(with_audio_subtitle_engine(item, audio, subtitle, Some(&engine)));
                }
            }
        }

        if renderer.stream_subtitles {
            for sub in subtitles.iter().flatten().filter(|s| s.is_external()) {
                let accepted = sub
                    .mime
                    .is_some_and(|m| renderer.capabilities.accepts_mime(m));
                if accepted {
                    candidates.push(with_audio_subtitle_engine(
                        item,
                        item.sole_audio_track(),
                        Some(*sub),
                        None,
                    ));
                }
            }
        }

        let mut seen = HashSet::new();
        candidates.retain(|r| seen.insert(r.key()));

        let engine_order = |r: &Representation| match &r.engine {
            None => (0, 0, 0),
            Some(e) => (1, e.rank, position.get(&e.id).copied().unwrap_or(usize::MAX)),
        };
        candidates.sort_by(|a, b| {
            engine_order(a)
                .cmp(&engine_order(b))
                .then_with(|| {
                    cmp_lang(
                        a.audio.as_ref().and_then(|t| t.known_lang()),
                        b.audio.as_ref().and_then(|t| t.known_lang()),
                    )
                })
                .then_with(|| {
                    cmp_lang(
                        a.subtitle.as_ref().and_then(|t| t.known_lang()),
                        b.subtitle.as_ref().and_then(|t| t.known_lang()),
                    )
                })
        });

        let mut out = Vec::with_capacity(candidates.len() + 1);
        out.push(canonical);
        out.extend(candidates);
        out
    }

    /// What plays the chapters of `representation`: the entry itself when its
    /// engine seeks in time, otherwise, for direct entries, the same tracks
    /// through the first time-seekable engine the renderer accepts.
    pub fn chapter_playback(
        &self,
        item: &MediaItem,
        renderer: &Renderer,
        representation: &Representation,
    ) -> Option<Representation> {
        if let Some(engine) = &representation.engine {
            return engine.time_seekable.then(|| representation.clone());
        }
        let audio = representation.audio.as_ref();
        let subtitle = representation.subtitle.as_ref();
        self.catalog
            .engines(item, audio, subtitle)
            .into_iter()
            .find(|e| e.time_seekable && renderer.capabilities.accepts_mime(&e.output_mime))
            .map(|engine| with_audio_subtitle_engine(item, audio, subtitle, Some(&engine)))
    }

    /// Representations with a chapter folder after each one that can be
    /// entered at an offset.
    pub fn children(
        &self,
        item: &MediaItem,
        renderer: &Renderer,
        subtitle_override: Option<&SubtitleTrack>,
    ) -> Vec<TranscodeChild> {
        let interval_secs = self.chapter_interval_secs(renderer);
        let representations = self.representations(item, renderer, subtitle_override);

        let mut children = Vec::with_capacity(representations.len() * 2);
        for (index, representation) in representations.into_iter().enumerate() {
            let long_seekable_video = item.is_video()
                && item.seekable
                && interval_secs > 0
                && item.duration_secs > interval_secs as f64;
            let playback = long_seekable_video
                .then(|| self.chapter_playback(item, renderer, &representation))
                .flatten();
            children.push(TranscodeChild::Representation { index, representation });
            if let Some(playback) = playback {
                children.push(TranscodeChild::ChapterFolder(ChapterFolder {
                    representation: index,
                    playback,
                    interval_secs,
                    duration_secs: item.duration_secs,
                }));
            }
        }
        tracing::debug!(
            "resolved {} children of {} for renderer {}",
            children.len(),
            item.id,
            renderer.name
        );
        children
    }
}
