//! Transcoding engines and the catalog that picks them for an item.
//!
//! An engine is an external program plus an argument template. The catalog
//! answers one question: for this item, with this audio track and this
//! subtitle track, which engines can produce something playable, in priority
//! order? Whether the renderer accepts the engine's output is the resolver's
//! concern, not the catalog's.

pub mod command;

use serde::Deserialize;
use std::sync::Arc;

use crate::media::library::{AudioTrack, MediaItem, SubtitleTrack};
use crate::media::mime::MediaKind;

pub use command::EngineCommand;

/// Matches any value in a predicate list.
pub const WILDCARD: &str = "*";

fn default_rank() -> i32 {
    100
}

fn default_program() -> String {
    "ffmpeg".to_string()
}

fn default_kinds() -> Vec<MediaKind> {
    vec![MediaKind::Video]
}

fn wildcard() -> Vec<String> {
    vec![WILDCARD.to_string()]
}

fn default_true() -> bool {
    true
}

/// One transcoding engine, as configured under `[[engine]]`.
///
/// Argument lists may contain the placeholders `{input}`, `{start}`,
/// `{audio_index}`, `{subtitle_index}` and `{subtitle_path}`. An element that
/// is exactly `{audio_args}` or `{subtitle_args}` is replaced by the matching
/// list when the representation selects such a track, and removed otherwise.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EngineDescriptor {
    pub id: String,
    pub name: String,
    /// Lower ranks are preferred.
    #[serde(default = "default_rank")]
    pub rank: i32,
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_kinds")]
    pub kinds: Vec<MediaKind>,
    #[serde(default = "wildcard")]
    pub containers: Vec<String>,
    #[serde(default = "wildcard")]
    pub video_codecs: Vec<String>,
    #[serde(default = "wildcard")]
    pub audio_codecs: Vec<String>,
    /// Subtitle kinds the engine can render: "text", "bitmap", "on-demand".
    #[serde(default)]
    pub subtitle_types: Vec<String>,
    pub output_mime: String,
    /// Whether `{start}` is honored, i.e. the engine can start mid-stream.
    #[serde(default = "default_true")]
    pub time_seekable: bool,
    pub args: Vec<String>,
    #[serde(default)]
    pub audio_args: Vec<String>,
    #[serde(default)]
    pub subtitle_args: Vec<String>,
    #[serde(default)]
    pub external_subtitle_args: Vec<String>,
}

fn list_matches(list: &[String], value: &str) -> bool {
    list.iter()
        .any(|v| v == WILDCARD || v.eq_ignore_ascii_case(value))
}

impl EngineDescriptor {
    /// Capability predicate over the item's (container, codec) pairs and the
    /// selected tracks.
    pub fn can_handle(
        &self,
        item: &MediaItem,
        audio: Option<&AudioTrack>,
        subtitle: Option<&SubtitleTrack>,
    ) -> bool {
        if !self.kinds.contains(&item.kind) {
            return false;
        }
        if !list_matches(&self.containers, item.container) {
            return false;
        }
        // An unknown video codec is left to the engine.
        if let Some(codec) = &item.video_codec {
            if !list_matches(&self.video_codecs, codec) {
                return false;
            }
        }
        if let Some(audio) = audio {
            if !list_matches(&self.audio_codecs, &audio.codec) {
                return false;
            }
        }
        match subtitle {
            None => true,
            Some(sub) if sub.is_disabled() => true,
            Some(sub) => {
                let args = if sub.is_external() {
                    &self.external_subtitle_args
                } else {
                    &self.subtitle_args
                };
                !args.is_empty()
                    && self
                        .subtitle_types
                        .iter()
                        .any(|t| t.eq_ignore_ascii_case(sub.kind.as_str()))
            }
        }
    }
}

/// Source of candidate engines for an (item, audio, subtitle) combination.
pub trait EngineCatalog: Send + Sync {
    /// Engines able to handle the combination, ordered by priority. An empty
    /// result means the combination is simply not offered.
    fn engines(
        &self,
        item: &MediaItem,
        audio: Option<&AudioTrack>,
        subtitle: Option<&SubtitleTrack>,
    ) -> Vec<Arc<EngineDescriptor>>;

    /// Every engine the catalog knows, in priority order.
    fn all(&self) -> Vec<Arc<EngineDescriptor>>;
}

/// Catalog built from configuration. Engines are kept sorted by rank; equal
/// ranks stay in configuration order.
#[derive(Debug, Clone)]
pub struct ConfiguredCatalog {
    engines: Vec<Arc<EngineDescriptor>>,
}

impl ConfiguredCatalog {
    pub fn new(mut engines: Vec<EngineDescriptor>) -> Self {
        engines.sort_by_key(|e| e.rank);
        ConfiguredCatalog {
            engines: engines.into_iter().map(Arc::new).collect(),
        }
    }

    /// The configured engines, or [`default_engines`] when none are configured.
    pub fn from_config(engines: &[EngineDescriptor]) -> Self {
        if engines.is_empty() {
            Self::new(default_engines())
        } else {
            Self::new(engines.to_vec())
        }
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

impl EngineCatalog for ConfiguredCatalog {
    fn engines(
        &self,
        item: &MediaItem,
        audio: Option<&AudioTrack>,
        subtitle: Option<&SubtitleTrack>,
    ) -> Vec<Arc<EngineDescriptor>> {
        self.engines
            .iter()
            .filter(|e| e.can_handle(item, audio, subtitle))
            .cloned()
            .collect()
    }

    fn all(&self) -> Vec<Arc<EngineDescriptor>> {
        self.engines.clone()
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// FFmpeg to MPEG-TS for video and FFmpeg to MP3 for audio.
pub fn default_engines() -> Vec<EngineDescriptor> {
    vec![
        EngineDescriptor {
            id: "ffmpeg-video".to_string(),
            name: "FFmpeg Video".to_string(),
            rank: 10,
            program: default_program(),
            kinds: vec![MediaKind::Video],
            containers: wildcard(),
            video_codecs: wildcard(),
            audio_codecs: wildcard(),
            subtitle_types: strings(&["text"]),
            output_mime: "video/mpeg".to_string(),
            time_seekable: true,
            args: strings(&[
                "-hide_banner", "-loglevel", "warning",
                "-ss", "{start}", "-i", "{input}",
                "-map", "0:v:0", "{audio_args}", "{subtitle_args}",
                "-c:v", "mpeg2video", "-q:v", "3",
                "-c:a", "ac3", "-b:a", "384k",
                "-f", "mpegts", "pipe:1",
            ]),
            audio_args: strings(&["-map", "0:a:{audio_index}"]),
            subtitle_args: strings(&["-vf", "subtitles={input}:si={subtitle_index}"]),
            external_subtitle_args: strings(&["-vf", "subtitles={subtitle_path}"]),
        },
        EngineDescriptor {
            id: "ffmpeg-audio".to_string(),
            name: "FFmpeg Audio".to_string(),
            rank: 20,
            program: default_program(),
            kinds: vec![MediaKind::Audio],
            containers: wildcard(),
            video_codecs: wildcard(),
            audio_codecs: wildcard(),
            subtitle_types: Vec::new(),
            output_mime: "audio/mpeg".to_string(),
            time_seekable: true,
            args: strings(&[
                "-hide_banner", "-loglevel", "warning",
                "-ss", "{start}", "-i", "{input}",
                "{audio_args}", "-vn",
                "-c:a", "libmp3lame", "-b:a", "320k",
                "-f", "mp3", "pipe:1",
            ]),
            audio_args: strings(&["-map", "0:a:{audio_index}"]),
            subtitle_args: Vec::new(),
            external_subtitle_args: Vec::new(),
        },
    ]
}
