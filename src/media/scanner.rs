use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::media::library::{MediaItem, MediaLibrary, SubtitleTrack};
use crate::media::metadata::{extract_metadata, media_item_id, MACHINE_NAMESPACE};
use crate::media::mime::{classify, container_name, MediaKind};

/// Statistics collected during scanning for the startup summary line.
#[derive(Debug, Default)]
pub struct ScanStats {
    pub video: usize,
    pub audio: usize,
    pub image: usize,
    pub subtitles: usize,
}

/// Scan all provided paths and return a MediaLibrary with all discovered media items.
/// Symlinks are followed. Missing/unreadable paths log warn and continue.
/// Subtitle files are never library items; they are attached to the video they sit next to.
pub fn scan(paths: &[PathBuf]) -> MediaLibrary {
    let start = Instant::now();
    let machine_ns = *MACHINE_NAMESPACE;
    let mut library = MediaLibrary::new();
    let mut stats = ScanStats::default();
    let mut sidecars: Vec<(PathBuf, &'static str)> = Vec::new();

    for root in paths {
        if !root.exists() {
            tracing::warn!("Scan path does not exist, skipping: {}", root.display());
            continue;
        }
        for entry in WalkDir::new(root).follow_links(true) {
            match entry {
                Err(e) => {
                    tracing::warn!("Cannot access entry: {}", e);
                }
                Ok(entry) if entry.file_type().is_file() => {
                    let path = entry.path();
                    match classify(path) {
                        Some((MediaKind::Subtitle, mime)) => {
                            sidecars.push((path.to_path_buf(), mime));
                        }
                        Some((kind, mime)) => {
                            if let Some(item) = process_file(path, kind, mime, &machine_ns) {
                                match kind {
                                    MediaKind::Video => stats.video += 1,
                                    MediaKind::Audio => stats.audio += 1,
                                    _ => stats.image += 1,
                                }
                                library.items.push(item);
                            }
                        }
                        None => {}
                    }
                }
                Ok(_) => {}
            }
        }
    }

    stats.subtitles = attach_sidecar_subtitles(&mut library.items, sidecars);

    tracing::info!(
        "Scanned {} files ({} video, {} audio, {} image, {} subtitle sidecars) in {:.1}s",
        library.items.len(),
        stats.video,
        stats.audio,
        stats.image,
        stats.subtitles,
        start.elapsed().as_secs_f64()
    );

    library
}

fn process_file(
    path: &Path,
    kind: MediaKind,
    mime: &'static str,
    machine_ns: &Uuid,
) -> Option<MediaItem> {
    let canonical = match std::fs::canonicalize(path) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("Cannot canonicalize {}: {}", path.display(), e);
            return None;
        }
    };

    let file_size = match std::fs::metadata(&canonical) {
        Ok(m) => m.len(),
        Err(e) => {
            tracing::warn!("Cannot stat {}: {}", canonical.display(), e);
            return None;
        }
    };

    let Some(probe) = extract_metadata(&canonical, kind, mime) else {
        tracing::warn!("Skipping {}: metadata extraction failed", canonical.display());
        return None;
    };

    let item = MediaItem {
        id: media_item_id(machine_ns, &canonical),
        container: container_name(&canonical),
        path: canonical,
        file_size,
        mime,
        kind,
        video_codec: probe.video_codec,
        audio_tracks: probe.audio_tracks,
        subtitle_tracks: probe.subtitle_tracks,
        duration_secs: probe.duration_secs,
        seekable: kind != MediaKind::Image,
        meta: probe.meta,
    };
    tracing::debug!("indexed {} -> {}", item.id, item.path.display());
    Some(item)
}

/// Split a sidecar file name into (video stem, language).
///
/// `Movie.srt` → ("Movie", None), `Movie.eng.srt` → ("Movie", Some("eng")).
/// A second extension that is not two or three letters is part of the stem
/// (`Movie.Part2.srt` → ("Movie.Part2", None)).
pub fn sidecar_stem_and_lang(path: &Path) -> Option<(String, Option<String>)> {
    let stem = path.file_stem()?.to_str()?;
    if let Some((base, tag)) = stem.rsplit_once('.') {
        let is_lang = (2..=3).contains(&tag.len()) && tag.chars().all(|c| c.is_ascii_alphabetic());
        if is_lang && !base.is_empty() {
            return Some((base.to_string(), Some(tag.to_ascii_lowercase())));
        }
    }
    Some((stem.to_string(), None))
}

/// Attach each sidecar subtitle to the video in the same directory whose stem it
/// matches. Indices continue after the embedded tracks. Returns how many were attached.
fn attach_sidecar_subtitles(items: &mut [MediaItem], mut sidecars: Vec<(PathBuf, &'static str)>) -> usize {
    // Deterministic index assignment regardless of walk order.
    sidecars.sort();

    let mut videos: HashMap<(PathBuf, String), usize> = HashMap::new();
    for (i, item) in items.iter().enumerate() {
        if item.kind != MediaKind::Video {
            continue;
        }
        if let (Some(dir), Some(stem)) = (item.path.parent(), item.path.file_stem().and_then(|s| s.to_str())) {
            videos.insert((dir.to_path_buf(), stem.to_string()), i);
        }
    }

    let mut attached = 0;
    for (path, mime) in sidecars {
        let Ok(canonical) = std::fs::canonicalize(&path) else {
            continue;
        };
        let (Some(dir), Some((stem, lang))) = (canonical.parent(), sidecar_stem_and_lang(&canonical)) else {
            continue;
        };
        let full_stem = canonical.file_stem().and_then(|s| s.to_str()).unwrap_or("").to_string();
        // Fall back to the whole stem: "Movie.One.srt" belongs to "Movie.One.mkv".
        let (idx, lang) = match videos.get(&(dir.to_path_buf(), stem)) {
            Some(&idx) => (idx, lang),
            None => match videos.get(&(dir.to_path_buf(), full_stem)) {
                Some(&idx) => (idx, None),
                None => {
                    tracing::debug!("Subtitle file has no matching video: {}", path.display());
                    continue;
                }
            },
        };
        let item = &mut items[idx];
        let next_index = item
            .subtitle_tracks
            .iter()
            .filter_map(|s| s.index)
            .max()
            .map_or(0, |m| m + 1);
        let mut track = SubtitleTrack::external(next_index, canonical, mime);
        track.lang = lang;
        tracing::debug!("attached subtitle {:?} to {}", track.external, item.id);
        item.subtitle_tracks.push(track);
        attached += 1;
    }
    attached
}
