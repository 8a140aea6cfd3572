use std::path::PathBuf;
use uuid::Uuid;
use crate::media::mime::MediaKind;

/// Language tag used by probes and sidecar parsing when nothing better is known.
pub const UNDETERMINED_LANG: &str = "und";

/// Presentation metadata extracted from file headers at scan time.
/// All fields are Option; extraction may fail for any given file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMeta {
    /// UPnP duration format: "HH:MM:SS.mmm". None if extraction failed.
    pub duration: Option<String>,
    /// Pixel dimensions: "WxH". None if not applicable or extraction failed.
    pub resolution: Option<String>,
    /// Bitrate in bits per second. None if not available.
    pub bitrate: Option<u32>,
    /// DLNA profile name e.g. "MP3", "JPEG_LRG".
    /// None means omit DLNA.ORG_PN= from protocolInfo entirely rather than sending a wildcard.
    pub dlna_profile: Option<&'static str>,
}

/// One audio stream of an item. `index` is the ordinal among the item's audio
/// streams (what ffmpeg calls `0:a:{index}`), unique within the item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioTrack {
    pub index: u32,
    pub codec: String,
    pub lang: Option<String>,
    pub channels: Option<u32>,
    pub bit_depth: Option<u32>,
    pub sample_rate: Option<u32>,
    pub default: bool,
    pub forced: bool,
}

impl AudioTrack {
    pub fn new(index: u32, codec: impl Into<String>) -> Self {
        AudioTrack {
            index,
            codec: codec.into(),
            lang: None,
            channels: None,
            bit_depth: None,
            sample_rate: None,
            default: false,
            forced: false,
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_channels(mut self, channels: u32) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Language used for ordering and labels; "und" counts as no language.
    pub fn known_lang(&self) -> Option<&str> {
        known_lang(self.lang.as_deref())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SubtitleKind {
    /// Text subtitles (SRT, WebVTT, ASS, mov_text …).
    Text,
    /// Picture-based subtitles (PGS, VobSub, DVB).
    Bitmap,
    /// Fetched on demand from an external service; never embedded.
    OnDemand,
}

impl SubtitleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubtitleKind::Text => "text",
            SubtitleKind::Bitmap => "bitmap",
            SubtitleKind::OnDemand => "on-demand",
        }
    }
}

/// One subtitle stream, either embedded in the container or an external file.
///
/// The "no-subtitle" sentinel (see [`SubtitleTrack::disabled`]) has no index and
/// no language. The resolver synthesizes it; the library never stores one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubtitleTrack {
    pub index: Option<u32>,
    pub kind: SubtitleKind,
    pub lang: Option<String>,
    /// Absolute path of the sidecar file. Present iff the track is external.
    pub external: Option<PathBuf>,
    /// MIME of the subtitle payload, e.g. "text/srt". Used to match renderer capabilities.
    pub mime: Option<&'static str>,
    pub default: bool,
    pub forced: bool,
}

impl SubtitleTrack {
    pub fn embedded(index: u32, kind: SubtitleKind) -> Self {
        SubtitleTrack {
            index: Some(index),
            kind,
            lang: None,
            external: None,
            mime: None,
            default: false,
            forced: false,
        }
    }

    pub fn external(index: u32, path: PathBuf, mime: &'static str) -> Self {
        SubtitleTrack {
            index: Some(index),
            kind: SubtitleKind::Text,
            lang: None,
            external: Some(path),
            mime: Some(mime),
            default: false,
            forced: false,
        }
    }

    /// The synthesized "no-subtitle" sentinel.
    pub fn disabled() -> Self {
        SubtitleTrack {
            index: None,
            kind: SubtitleKind::Text,
            lang: None,
            external: None,
            mime: None,
            default: false,
            forced: false,
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.index.is_none() && self.external.is_none()
    }

    pub fn is_external(&self) -> bool {
        self.external.is_some()
    }

    pub fn known_lang(&self) -> Option<&str> {
        known_lang(self.lang.as_deref())
    }
}

fn known_lang(lang: Option<&str>) -> Option<&str> {
    lang.filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case(UNDETERMINED_LANG))
}

/// A single discovered media file with all metadata extracted at scan time.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    /// Stable UUIDv5: uuid5(machine_namespace, canonical_path_bytes). Same file on same
    /// machine always produces the same ID across server restarts.
    pub id: Uuid,
    /// Canonical absolute path (via std::fs::canonicalize).
    pub path: PathBuf,
    /// File size in bytes, used in DIDL-Lite <res size="..."> and Content-Length.
    pub file_size: u64,
    /// MIME type string from classify(), a static str, e.g. "video/mp4".
    pub mime: &'static str,
    /// Video, Audio, or Image (never Subtitle).
    pub kind: MediaKind,
    /// Short container name, e.g. "mkv", "mp4", "mpegts".
    pub container: &'static str,
    /// Codec of the first video stream, when the probe could tell.
    pub video_codec: Option<String>,
    pub audio_tracks: Vec<AudioTrack>,
    pub subtitle_tracks: Vec<SubtitleTrack>,
    /// Seconds; 0.0 when unknown.
    pub duration_secs: f64,
    /// Whether an engine may start reading this source at a time offset.
    pub seekable: bool,
    /// Extracted presentation metadata. Fields are None when extraction failed or not applicable.
    pub meta: MediaMeta,
}

impl MediaItem {
    /// File name without extension, used as the DIDL-Lite title.
    pub fn title(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    /// The track that a direct stream plays, when there is no ambiguity.
    pub fn sole_audio_track(&self) -> Option<&AudioTrack> {
        match self.audio_tracks.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

/// Flat in-memory media library built synchronously at startup.
/// Wrapped in Arc<RwLock<MediaLibrary>> in main.rs for thread-safe sharing.
#[derive(Debug, Default)]
pub struct MediaLibrary {
    /// All discovered media items. Subtitle files are attached to their video, never listed.
    pub items: Vec<MediaItem>,
}

impl MediaLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Uuid) -> Option<&MediaItem> {
        self.items.iter().find(|i| &i.id == id)
    }
}
