use std::io::BufReader;
use std::path::Path;
use uuid::Uuid;

use crate::media::library::{AudioTrack, MediaMeta, SubtitleKind, SubtitleTrack};
use crate::media::mime::MediaKind;

/// Everything a header-only probe can tell about one file.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    pub meta: MediaMeta,
    /// Seconds; 0.0 when unknown.
    pub duration_secs: f64,
    pub video_codec: Option<String>,
    pub audio_tracks: Vec<AudioTrack>,
    /// Embedded subtitle streams only; sidecar files are attached by the scanner.
    pub subtitle_tracks: Vec<SubtitleTrack>,
}

/// Format a duration for UPnP/DLNA. `total_seconds` is the whole-second count;
/// `frac` is the sub-second fraction in [0.0, 1.0).
/// Returns a string in "HH:MM:SS.mmm" format (hours zero-padded to at least 2 digits).
pub fn format_upnp_duration(total_seconds: u64, frac: f64) -> String {
    let h = total_seconds / 3600;
    let m = (total_seconds % 3600) / 60;
    let s = total_seconds % 60;
    let ms = ((frac * 1000.0).round() as u32).min(999);
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, ms)
}

/// Same as [`format_upnp_duration`] for a fractional second count.
pub fn format_upnp_seconds(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    format_upnp_duration(seconds.trunc() as u64, seconds.fract())
}

/// Return the static DLNA profile name for a given MIME type, or None when the
/// type has no assigned profile.
pub fn dlna_profile_for(mime: &str) -> Option<&'static str> {
    match mime {
        "audio/mpeg" => Some("MP3"),
        "audio/mp4" => Some("AAC_ISO_320"),
        "image/jpeg" => Some("JPEG_LRG"),
        "image/png" => Some("PNG_LRG"),
        _ => None,
    }
}

/// Derive a machine-specific UUID namespace by seeding UUIDv5 from the machine UID.
/// Falls back to "unknown" if machine_uid::get() fails.
pub fn build_machine_namespace() -> Uuid {
    let machine_id = machine_uid::get().unwrap_or_else(|_| "unknown".to_string());
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, machine_id.as_bytes())
}

/// Cached machine-specific UUID namespace. Computed once at first access.
pub static MACHINE_NAMESPACE: std::sync::LazyLock<Uuid> =
    std::sync::LazyLock::new(build_machine_namespace);

/// Derive a stable UUIDv5 for a media file using `namespace` and the file's canonical path bytes.
pub fn media_item_id(namespace: &Uuid, canonical_path: &Path) -> Uuid {
    Uuid::new_v5(namespace, canonical_path.as_os_str().as_encoded_bytes())
}

/// Probe a media file by reading its container headers.
///
/// Audio and image files that cannot be probed return None and are skipped by the
/// scanner. Video files only need to be readable: a container the probes do not
/// understand still gets an item with no tracks, since an engine may handle it.
pub fn extract_metadata(path: &Path, kind: MediaKind, mime: &'static str) -> Option<Probe> {
    match kind {
        MediaKind::Audio => extract_audio(path, mime),
        MediaKind::Video => extract_video(path, mime),
        MediaKind::Image => extract_image(path, mime),
        MediaKind::Subtitle => None,
    }
}

fn extract_audio(path: &Path, mime: &'static str) -> Option<Probe> {
    let mut probe = probe_symphonia(path)?;
    if probe.audio_tracks.is_empty() {
        return None;
    }
    probe.meta.dlna_profile = dlna_profile_for(mime);
    Some(probe)
}

fn extract_video(path: &Path, mime: &'static str) -> Option<Probe> {
    // Must at least be readable.
    std::fs::File::open(path).ok()?;

    let probe = match mime {
        "video/mp4" | "video/quicktime" | "video/3gpp" => probe_mp4(path),
        _ => probe_symphonia(path),
    };
    let mut probe = probe.unwrap_or_else(|| {
        tracing::debug!("No track information for {}", path.display());
        Probe::default()
    });
    probe.meta.dlna_profile = dlna_profile_for(mime);
    Some(probe)
}

/// Probe with symphonia. Yields the audio tracks of anything symphonia can demux;
/// video streams are invisible to it.
fn probe_symphonia(path: &Path) -> Option<Probe> {
    use symphonia::core::codecs::CODEC_TYPE_NULL;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path).ok()?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &Default::default(), &Default::default())
        .ok()?;
    let format = probed.format;
    let codecs = symphonia::default::get_codecs();

    let mut probe = Probe::default();
    let audio = format
        .tracks()
        .iter()
        .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL);

    for (ordinal, track) in audio.enumerate() {
        let params = &track.codec_params;
        let codec = codecs
            .get_codec(params.codec)
            .map(|d| d.short_name.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        // Duration from the first track with a known frame count.
        if probe.meta.duration.is_none() {
            if let (Some(tb), Some(n)) = (params.time_base, params.n_frames) {
                let t = tb.calc_time(n);
                probe.meta.duration = Some(format_upnp_duration(t.seconds, t.frac));
                probe.duration_secs = t.seconds as f64 + t.frac;
            }
        }
        if probe.meta.bitrate.is_none() {
            probe.meta.bitrate = params.bits_per_coded_sample;
        }

        probe.audio_tracks.push(AudioTrack {
            index: ordinal as u32,
            codec,
            lang: track.language.clone(),
            channels: params.channels.map(|c| c.count() as u32),
            bit_depth: params.bits_per_sample,
            sample_rate: params.sample_rate,
            default: ordinal == 0,
            forced: false,
        });
    }

    if probe.meta.duration.is_none() {
        tracing::debug!("No duration for {} (n_frames unavailable)", path.display());
    }
    Some(probe)
}

/// Probe MP4/MOV with the mp4 crate: duration, resolution, video codec, and the
/// audio and timed-text tracks in track-id order.
fn probe_mp4(path: &Path) -> Option<Probe> {
    use mp4::TrackType;

    let file = std::fs::File::open(path).ok()?;
    let file_len = file.metadata().ok()?.len();
    let reader = BufReader::new(file);
    let mp4 = mp4::Mp4Reader::read_header(reader, file_len).ok()?;

    let mut probe = Probe::default();
    let duration_ms = mp4.duration().as_millis() as u64;
    if duration_ms > 0 {
        probe.meta.duration = Some(format_upnp_duration(
            duration_ms / 1000,
            (duration_ms % 1000) as f64 / 1000.0,
        ));
        probe.duration_secs = duration_ms as f64 / 1000.0;
    }

    let mut track_ids: Vec<u32> = mp4.tracks().keys().copied().collect();
    track_ids.sort_unstable();

    let mut audio_ordinal = 0u32;
    let mut subtitle_ordinal = 0u32;
    for id in track_ids {
        let Some(track) = mp4.tracks().get(&id) else {
            continue;
        };
        let lang = Some(track.language().to_string()).filter(|l| !l.is_empty());
        match track.track_type() {
            Ok(TrackType::Video) if probe.video_codec.is_none() => {
                let (w, h) = (track.width(), track.height());
                if w > 0 && h > 0 {
                    probe.meta.resolution = Some(format!("{}x{}", w, h));
                }
                let bps = track.bitrate();
                if bps > 0 {
                    probe.meta.bitrate = Some(bps);
                }
                probe.video_codec = track.media_type().ok().map(|m| m.to_string());
            }
            Ok(TrackType::Audio) => {
                let codec = track
                    .media_type()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                let mut audio = AudioTrack::new(audio_ordinal, codec);
                audio.lang = lang;
                audio.sample_rate = track.sample_freq_index().ok().map(|i| i.freq());
                audio.default = audio_ordinal == 0;
                probe.audio_tracks.push(audio);
                audio_ordinal += 1;
            }
            Ok(TrackType::Subtitle) => {
                let mut sub = SubtitleTrack::embedded(subtitle_ordinal, SubtitleKind::Text);
                sub.lang = lang;
                probe.subtitle_tracks.push(sub);
                subtitle_ordinal += 1;
            }
            _ => {}
        }
    }
    Some(probe)
}

/// Image dimensions via imagesize header reads; never fully decodes the image.
fn extract_image(path: &Path, mime: &'static str) -> Option<Probe> {
    match imagesize::size(path) {
        Ok(dim) => Some(Probe {
            meta: MediaMeta {
                duration: None,
                resolution: Some(format!("{}x{}", dim.width, dim.height)),
                bitrate: None,
                dlna_profile: dlna_profile_for(mime),
            },
            ..Probe::default()
        }),
        Err(e) => {
            tracing::warn!("Cannot read image dimensions for {}: {}", path.display(), e);
            None
        }
    }
}
