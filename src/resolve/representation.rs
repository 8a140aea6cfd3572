use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::engine::EngineDescriptor;
use crate::media::library::{AudioTrack, MediaItem, SubtitleTrack};

/// One deliverable form of an item: which audio track, which subtitle track,
/// and which engine produces it. `engine == None` means the file is sent as is.
#[derive(Debug, Clone)]
pub struct Representation {
    pub item_id: Uuid,
    pub audio: Option<AudioTrack>,
    pub subtitle: Option<SubtitleTrack>,
    pub engine: Option<Arc<EngineDescriptor>>,
}

/// Identity used for deduplication: (audio, subtitle, engine).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepresentationKey {
    audio: Option<u32>,
    subtitle: Option<(Option<u32>, Option<PathBuf>)>,
    engine: Option<String>,
}

/// Build a representation of `item`. The only way representations are made.
pub fn with_audio_subtitle_engine(
    item: &MediaItem,
    audio: Option<&AudioTrack>,
    subtitle: Option<&SubtitleTrack>,
    engine: Option<&Arc<EngineDescriptor>>,
) -> Representation {
    Representation {
        item_id: item.id,
        audio: audio.cloned(),
        subtitle: subtitle.cloned(),
        engine: engine.cloned(),
    }
}

impl Representation {
    pub fn is_direct(&self) -> bool {
        self.engine.is_none()
    }

    /// The plain "send the file" entry: no engine and no subtitle.
    pub fn is_canonical(&self) -> bool {
        self.engine.is_none() && self.subtitle.is_none()
    }

    /// Whether a start offset can be applied, which only an engine can do.
    pub fn is_time_seekable(&self) -> bool {
        self.engine.as_ref().is_some_and(|e| e.time_seekable)
    }

    pub fn key(&self) -> RepresentationKey {
        RepresentationKey {
            audio: self.audio.as_ref().map(|a| a.index),
            subtitle: self
                .subtitle
                .as_ref()
                .map(|s| (s.index, s.external.clone())),
            engine: self.engine.as_ref().map(|e| e.id.clone()),
        }
    }

    /// MIME of the bytes this representation delivers.
    pub fn mime<'a>(&'a self, item: &'a MediaItem) -> &'a str {
        match &self.engine {
            Some(engine) => &engine.output_mime,
            None => item.mime,
        }
    }

    /// Human-readable title, e.g. `[FFmpeg Video] {Audio: eng/ac3/6ch} {Sub: fre}`.
    pub fn label(&self) -> String {
        let mut label = match &self.engine {
            Some(engine) => format!("[{}]", engine.name),
            None => "[Direct]".to_string(),
        };
        if let Some(audio) = &self.audio {
            let mut parts: Vec<String> = Vec::new();
            if let Some(lang) = audio.known_lang() {
                parts.push(lang.to_string());
            }
            parts.push(audio.codec.clone());
            if let Some(ch) = audio.channels {
                parts.push(format!("{}ch", ch));
            }
            let _ = write!(label, " {{Audio: {}}}", parts.join("/"));
        }
        match &self.subtitle {
            Some(sub) if sub.is_disabled() => label.push_str(" {No subtitles}"),
            Some(sub) => {
                let lang = sub.known_lang().unwrap_or("und");
                if sub.is_external() {
                    let _ = write!(label, " {{Sub: {} (file)}}", lang);
                } else {
                    let _ = write!(label, " {{Sub: {}}}", lang);
                }
            }
            None => {}
        }
        label
    }
}

impl PartialEq for Representation {
    fn eq(&self, other: &Self) -> bool {
        self.item_id == other.item_id && self.key() == other.key()
    }
}

impl Eq for Representation {}

/// Time offsets into a representation, listed as a folder right after it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterFolder {
    /// Index of the representation the chapters belong to.
    pub representation: usize,
    /// What is streamed for a chapter. Differs from the listed entry only
    /// for direct entries, which cannot start at an offset themselves.
    pub playback: Representation,
    pub interval_secs: u64,
    pub duration_secs: f64,
}

impl ChapterFolder {
    pub fn count(&self) -> u64 {
        if self.interval_secs == 0 {
            return 0;
        }
        (self.duration_secs / self.interval_secs as f64).ceil() as u64
    }

    /// Start offset of chapter `k` in seconds.
    pub fn start(&self, k: u64) -> Option<f64> {
        (k < self.count()).then(|| (k * self.interval_secs) as f64)
    }

    pub fn starts(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.count()).map(move |k| (k * self.interval_secs) as f64)
    }
}

/// An entry of a transcode folder.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeChild {
    /// `index` is stable for a given item and renderer and addresses the
    /// representation in stream URLs.
    Representation { index: usize, representation: Representation },
    ChapterFolder(ChapterFolder),
}

/// Look up representation `index` in a resolved child list.
pub fn find_representation(children: &[TranscodeChild], index: usize) -> Option<&Representation> {
    children.iter().find_map(|c| match c {
        TranscodeChild::Representation { index: i, representation } if *i == index => {
            Some(representation)
        }
        _ => None,
    })
}

/// Look up the chapter folder of representation `index`.
pub fn find_chapters(children: &[TranscodeChild], index: usize) -> Option<&ChapterFolder> {
    children.iter().find_map(|c| match c {
        TranscodeChild::ChapterFolder(f) if f.representation == index => Some(f),
        _ => None,
    })
}
