use std::path::Path;

/// Media kind classification for discovered files.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
    Subtitle,
}

/// One recognized file format.
struct Format {
    extensions: &'static [&'static str],
    kind: MediaKind,
    /// The MIME type renderers expect, e.g. `video/MP2T` rather than `video/mp2t`.
    mime: &'static str,
    /// Container name engines match on. Empty for subtitles.
    container: &'static str,
}

const fn format(
    extensions: &'static [&'static str],
    kind: MediaKind,
    mime: &'static str,
    container: &'static str,
) -> Format {
    Format { extensions, kind, mime, container }
}

use self::MediaKind::{Audio, Image, Subtitle, Video};

const FORMATS: &[Format] = &[
    format(&["mp4", "m4v"], Video, "video/mp4", "mp4"),
    format(&["mkv"], Video, "video/x-matroska", "mkv"),
    format(&["avi"], Video, "video/x-msvideo", "avi"),
    format(&["mov"], Video, "video/quicktime", "mp4"),
    format(&["ts", "m2ts", "mts"], Video, "video/MP2T", "mpegts"),
    format(&["mpg", "mpeg"], Video, "video/mpeg", "mpegps"),
    format(&["wmv"], Video, "video/x-ms-wmv", "asf"),
    format(&["flv"], Video, "video/x-flv", "flv"),
    format(&["ogv"], Video, "video/ogg", "ogg"),
    format(&["webm"], Video, "video/webm", "webm"),
    format(&["3gp"], Video, "video/3gpp", "mp4"),
    format(&["mp3"], Audio, "audio/mpeg", "mp3"),
    format(&["flac"], Audio, "audio/flac", "flac"),
    format(&["wav"], Audio, "audio/wav", "wav"),
    format(&["m4a"], Audio, "audio/mp4", "mp4"),
    format(&["aac"], Audio, "audio/aac", "aac"),
    format(&["ogg", "oga", "opus"], Audio, "audio/ogg", "ogg"),
    format(&["wma"], Audio, "audio/x-ms-wma", "asf"),
    format(&["aiff", "aif"], Audio, "audio/aiff", "aiff"),
    format(&["jpg", "jpeg"], Image, "image/jpeg", "jpeg"),
    format(&["png"], Image, "image/png", "png"),
    format(&["gif"], Image, "image/gif", "gif"),
    format(&["webp"], Image, "image/webp", "webp"),
    format(&["bmp"], Image, "image/bmp", "bmp"),
    format(&["tiff", "tif"], Image, "image/tiff", "tiff"),
    // Never served as items; the scanner attaches them to videos.
    format(&["srt"], Subtitle, "text/srt", ""),
    format(&["vtt"], Subtitle, "text/vtt", ""),
    format(&["ass"], Subtitle, "text/x-ass", ""),
    format(&["ssa"], Subtitle, "text/x-ssa", ""),
];

fn lookup(path: &Path) -> Option<&'static Format> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    FORMATS.iter().find(|f| f.extensions.iter().any(|e| *e == ext))
}

/// Kind and MIME type by extension, case-insensitively. `None` means the
/// file is not media and gets skipped without a log line.
pub fn classify(path: &Path) -> Option<(MediaKind, &'static str)> {
    lookup(path).map(|f| (f.kind, f.mime))
}

/// Container name engines match on; "" when unknown. Engines with a `*`
/// container pattern accept that too.
pub fn container_name(path: &Path) -> &'static str {
    lookup(path).map_or("", |f| f.container)
}

/// MIME types served as-is, in table order without repeats. Subtitles are
/// left out; ConnectionManager only advertises playable media.
pub fn served_mimes() -> Vec<&'static str> {
    let mut mimes: Vec<&'static str> = Vec::new();
    for f in FORMATS.iter().filter(|f| f.kind != Subtitle) {
        if !mimes.contains(&f.mime) {
            mimes.push(f.mime);
        }
    }
    mimes
}
