use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use uuid::Uuid;

use repcast::engine::{ConfiguredCatalog, EngineCatalog, EngineDescriptor};
use repcast::media::library::{AudioTrack, MediaItem, MediaMeta, SubtitleKind, SubtitleTrack};
use repcast::media::mime::MediaKind;
use repcast::renderer::{CapabilityProfile, Renderer};
use repcast::resolve::{
    find_chapters, find_representation, RepresentationResolver, TranscodeChild, TranscodeFolders,
};

fn engine(id: &str, rank: i32, output_mime: &str, subtitles: bool) -> EngineDescriptor {
    let args = |a: &[&str]| a.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    EngineDescriptor {
        id: id.to_string(),
        name: id.to_uppercase(),
        rank,
        program: "ffmpeg".to_string(),
        kinds: vec![MediaKind::Video],
        containers: vec!["*".to_string()],
        video_codecs: vec!["*".to_string()],
        audio_codecs: vec!["*".to_string()],
        subtitle_types: if subtitles { args(&["text"]) } else { vec![] },
        output_mime: output_mime.to_string(),
        time_seekable: true,
        args: args(&["-i", "{input}", "{audio_args}", "{subtitle_args}", "pipe:1"]),
        audio_args: args(&["-map", "0:a:{audio_index}"]),
        subtitle_args: if subtitles { args(&["-vf", "subtitles={input}:si={subtitle_index}"]) } else { vec![] },
        external_subtitle_args: if subtitles { args(&["-vf", "subtitles={subtitle_path}"]) } else { vec![] },
    }
}

fn resolver(engines: Vec<EngineDescriptor>, chapter_interval: u32) -> RepresentationResolver {
    let catalog: Arc<dyn EngineCatalog> = Arc::new(ConfiguredCatalog::new(engines));
    RepresentationResolver::new(catalog, chapter_interval)
}

fn movie() -> MediaItem {
    MediaItem {
        id: Uuid::new_v4(),
        path: PathBuf::from("/m/movie.mkv"),
        file_size: 1 << 30,
        mime: "video/x-matroska",
        kind: MediaKind::Video,
        container: "mkv",
        video_codec: Some("h264".to_string()),
        audio_tracks: vec![
            AudioTrack::new(0, "ac3").with_lang("fre"),
            AudioTrack::new(1, "aac").with_lang("eng"),
        ],
        subtitle_tracks: vec![SubtitleTrack::embedded(0, SubtitleKind::Text).with_lang("ger")],
        duration_secs: 1200.0,
        seekable: true,
        meta: MediaMeta::default(),
    }
}

fn renderer(caps: &str) -> Renderer {
    Renderer {
        capabilities: CapabilityProfile::parse(caps),
        ..Renderer::generic()
    }
}

fn labels(resolver: &RepresentationResolver, item: &MediaItem, renderer: &Renderer) -> Vec<String> {
    resolver
        .representations(item, renderer, None)
        .iter()
        .map(|r| r.label())
        .collect()
}

#[test]
fn canonical_direct_entry_comes_first_and_only_once() {
    let resolver = resolver(vec![engine("a", 10, "video/mpeg", true)], 5);
    let reps = resolver.representations(&movie(), &Renderer::generic(), None);
    assert!(reps[0].is_canonical());
    assert!(reps[0].audio.is_none(), "two audio tracks leave the direct entry unspecified");
    assert_eq!(reps.iter().filter(|r| r.is_canonical()).count(), 1);
}

#[test]
fn engines_rank_then_audio_language_then_subtitle_language() {
    let resolver = resolver(
        vec![engine("late", 20, "video/mpeg", false), engine("a", 10, "video/mpeg", true)],
        5,
    );
    assert_eq!(
        labels(&resolver, &movie(), &Renderer::generic()),
        vec![
            "[Direct]",
            "[A] {Audio: eng/aac} {No subtitles}",
            "[A] {Audio: eng/aac} {Sub: ger}",
            "[A] {Audio: fre/ac3} {No subtitles}",
            "[A] {Audio: fre/ac3} {Sub: ger}",
            "[LATE] {Audio: eng/aac} {No subtitles}",
            "[LATE] {Audio: fre/ac3} {No subtitles}",
        ]
    );
}

#[test]
fn equal_ranks_keep_catalog_order() {
    let first = resolver(
        vec![engine("x", 10, "video/mpeg", false), engine("y", 10, "video/mpeg", false)],
        5,
    );
    let second = resolver(
        vec![engine("y", 10, "video/mpeg", false), engine("x", 10, "video/mpeg", false)],
        5,
    );
    let engines_of = |r: &RepresentationResolver| -> Vec<String> {
        r.representations(&movie(), &Renderer::generic(), None)
            .iter()
            .filter_map(|rep| rep.engine.as_ref().map(|e| e.id.clone()))
            .collect()
    };
    assert_eq!(engines_of(&first), vec!["x", "x", "y", "y"]);
    assert_eq!(engines_of(&second), vec!["y", "y", "x", "x"]);
}

#[test]
fn equal_ranks_keep_catalog_order_when_the_first_engine_skips_subtitles() {
    let resolver = resolver(
        vec![engine("x", 10, "video/mpeg", false), engine("y", 10, "video/mpeg", true)],
        5,
    );
    let mut item = movie();
    item.audio_tracks.truncate(1);
    let engines: Vec<String> = resolver
        .representations(&item, &Renderer::generic(), None)
        .iter()
        .filter_map(|rep| rep.engine.as_ref().map(|e| e.id.clone()))
        .collect();
    assert_eq!(engines, vec!["x", "y", "y"]);
}

#[test]
fn resolution_is_deterministic() {
    let resolver = resolver(
        vec![engine("a", 10, "video/mpeg", true), engine("b", 10, "video/mp4", true)],
        5,
    );
    let item = movie();
    let r = Renderer::generic();
    let once = resolver.representations(&item, &r, None);
    let twice = resolver.representations(&item, &r, None);
    assert_eq!(once, twice);
    assert_eq!(
        once.iter().map(|x| x.label()).collect::<Vec<_>>(),
        twice.iter().map(|x| x.label()).collect::<Vec<_>>()
    );
}

#[test]
fn empty_catalog_yields_only_the_direct_entry() {
    let resolver = resolver(vec![], 5);
    let mut item = movie();
    item.audio_tracks.truncate(1);
    let reps = resolver.representations(&item, &Renderer::generic(), None);
    assert_eq!(reps.len(), 1);
    assert_eq!(reps[0].audio.as_ref().map(|a| a.index), Some(0));
    assert!(reps[0].subtitle.is_none());
}

#[test]
fn item_without_tracks_gets_engine_entries_without_tracks() {
    let resolver = resolver(vec![engine("a", 10, "video/mpeg", true)], 5);
    let mut item = movie();
    item.audio_tracks.clear();
    item.subtitle_tracks.clear();
    let reps = resolver.representations(&item, &Renderer::generic(), None);
    assert_eq!(reps.len(), 2);
    assert!(reps[1].audio.is_none());
    assert!(reps[1].subtitle.is_none());
    assert_eq!(reps[1].label(), "[A]");
}

#[test]
fn renderer_capabilities_filter_engine_output() {
    let resolver = resolver(
        vec![engine("mpeg", 10, "video/mpeg", false), engine("mp4", 20, "video/mp4", false)],
        5,
    );
    let reps = resolver.representations(&movie(), &renderer("http-get:*:video/mp4:*"), None);
    assert!(reps
        .iter()
        .filter_map(|r| r.engine.as_ref())
        .all(|e| e.id == "mp4"));
    assert_eq!(reps.len(), 3);
}

#[test]
fn subtitle_override_is_the_only_subtitle_offered() {
    let resolver = resolver(vec![engine("a", 10, "video/mpeg", true)], 5);
    let item = movie();
    let sidecar = SubtitleTrack::external(1, PathBuf::from("/m/movie.spa.srt"), "text/srt").with_lang("spa");
    let reps = resolver.representations(&item, &Renderer::generic(), Some(&sidecar));
    let transcoded: Vec<_> = reps.iter().filter(|r| !r.is_direct()).collect();
    assert_eq!(transcoded.len(), 2);
    for r in transcoded {
        assert_eq!(r.subtitle.as_ref(), Some(&sidecar));
        assert!(r.label().ends_with("{Sub: spa (file)}"), "{}", r.label());
    }
}

#[test]
fn subtitle_streaming_renderer_gets_direct_sidecar_entries() {
    let resolver = resolver(vec![], 5);
    let mut item = movie();
    item.subtitle_tracks
        .push(SubtitleTrack::external(1, PathBuf::from("/m/movie.eng.srt"), "text/srt").with_lang("eng"));

    let streaming = Renderer {
        stream_subtitles: true,
        capabilities: CapabilityProfile::parse("http-get:*:video/x-matroska:*,http-get:*:text/srt:*"),
        ..Renderer::generic()
    };
    let reps = resolver.representations(&item, &streaming, None);
    assert_eq!(reps.len(), 2);
    assert!(reps[1].is_direct());
    assert_eq!(reps[1].label(), "[Direct] {Sub: eng (file)}");

    let no_srt = Renderer {
        stream_subtitles: true,
        capabilities: CapabilityProfile::parse("http-get:*:video/x-matroska:*"),
        ..Renderer::generic()
    };
    assert_eq!(resolver.representations(&item, &no_srt, None).len(), 1);
}

#[test]
fn subtitle_override_limits_direct_sidecar_entries() {
    let resolver = resolver(vec![], 5);
    let mut item = movie();
    let eng = SubtitleTrack::external(1, PathBuf::from("/m/movie.eng.srt"), "text/srt").with_lang("eng");
    let spa = SubtitleTrack::external(2, PathBuf::from("/m/movie.spa.srt"), "text/srt").with_lang("spa");
    item.subtitle_tracks.push(eng);
    item.subtitle_tracks.push(spa.clone());

    let streaming = Renderer {
        stream_subtitles: true,
        capabilities: CapabilityProfile::parse("http-get:*:video/x-matroska:*,http-get:*:text/srt:*"),
        ..Renderer::generic()
    };
    let reps = resolver.representations(&item, &streaming, Some(&spa));
    assert_eq!(reps.len(), 2);
    assert_eq!(reps[1].subtitle.as_ref(), Some(&spa));
    assert_eq!(reps[1].label(), "[Direct] {Sub: spa (file)}");
}

// ── chapters ──────────────────────────────────────────────────────────────────

#[test]
fn chapter_folders_follow_time_seekable_entries() {
    let resolver = resolver(vec![engine("a", 10, "video/mpeg", false)], 5);
    let children = resolver.children(&movie(), &Renderer::generic(), None);

    // Every entry is followed by its chapters.
    assert!(matches!(children[0], TranscodeChild::Representation { index: 0, .. }));
    assert!(matches!(&children[1], TranscodeChild::ChapterFolder(f) if f.representation == 0));
    assert!(matches!(children[2], TranscodeChild::Representation { index: 1, .. }));
    let chapters = find_chapters(&children, 1).expect("chapters for entry 1");
    assert!(matches!(&children[3], TranscodeChild::ChapterFolder(f) if f == chapters));
    assert_eq!(chapters.count(), 4);
    assert_eq!(chapters.starts().collect::<Vec<_>>(), vec![0.0, 300.0, 600.0, 900.0]);
    assert_eq!(chapters.start(4), None);
    assert_eq!(Some(&chapters.playback), find_representation(&children, 1));
    assert!(find_representation(&children, 2).is_some());
}

#[test]
fn direct_chapters_play_through_the_first_time_seekable_engine() {
    let mut fixed = engine("fixed", 5, "video/mpeg", false);
    fixed.time_seekable = false;
    let resolver = resolver(
        vec![fixed, engine("mp4", 10, "video/mp4", false), engine("a", 20, "video/mpeg", false)],
        5,
    );
    let mpeg_only = renderer("http-get:*:video/x-matroska:*,http-get:*:video/mpeg:*");
    let children = resolver.children(&movie(), &mpeg_only, None);

    let direct = find_representation(&children, 0).expect("direct entry");
    assert!(direct.is_direct());
    let chapters = find_chapters(&children, 0).expect("chapters for the direct entry");
    assert_eq!(chapters.count(), 4);
    assert_eq!(chapters.playback.engine.as_ref().map(|e| e.id.as_str()), Some("a"));
    assert_eq!(chapters.playback.audio, direct.audio);
    assert_eq!(chapters.playback.subtitle, direct.subtitle);
}

#[test]
fn direct_entries_get_no_chapters_without_a_seeking_engine() {
    let resolver = resolver(vec![], 5);
    let children = resolver.children(&movie(), &Renderer::generic(), None);
    assert_eq!(children.len(), 1);
    assert!(find_chapters(&children, 0).is_none());
}

#[test]
fn partial_last_chapter_is_counted() {
    let resolver = resolver(vec![engine("a", 10, "video/mpeg", false)], 5);
    let mut item = movie();
    item.duration_secs = 1201.5;
    let children = resolver.children(&item, &Renderer::generic(), None);
    assert_eq!(find_chapters(&children, 1).map(|c| c.count()), Some(5));
}

#[test]
fn no_chapters_when_disabled_short_or_unseekable() {
    let mut fixed = engine("a", 10, "video/mpeg", false);
    fixed.time_seekable = false;
    let no_seek = resolver(vec![fixed], 5);
    let resolver = resolver(vec![engine("a", 10, "video/mpeg", false)], 5);
    let has_chapters = |children: &[TranscodeChild]| {
        children.iter().any(|c| matches!(c, TranscodeChild::ChapterFolder(_)))
    };

    let off = Renderer { chapter_interval: Some(0), ..Renderer::generic() };
    assert!(!has_chapters(&resolver.children(&movie(), &off, None)));

    let mut short = movie();
    short.duration_secs = 300.0;
    assert!(!has_chapters(&resolver.children(&short, &Renderer::generic(), None)));

    let mut live = movie();
    live.seekable = false;
    assert!(!has_chapters(&resolver.children(&live, &Renderer::generic(), None)));

    assert!(!has_chapters(&no_seek.children(&movie(), &Renderer::generic(), None)));
}

#[test]
fn renderer_chapter_interval_overrides_default() {
    let resolver = resolver(vec![engine("a", 10, "video/mpeg", false)], 5);
    let coarse = Renderer { chapter_interval: Some(10), ..Renderer::generic() };
    assert_eq!(resolver.chapter_interval_secs(&coarse), 600);
    let children = resolver.children(&movie(), &coarse, None);
    assert_eq!(find_chapters(&children, 1).map(|c| c.count()), Some(2));
}

// ── transcode folders ─────────────────────────────────────────────────────────

#[test]
fn transcode_folder_resolves_once_under_concurrency() {
    let folders = Arc::new(TranscodeFolders::new());
    let resolver = resolver(vec![engine("a", 10, "video/mpeg", true)], 5);
    let item = Arc::new(movie());
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let (folders, resolver, item, calls, barrier) = (
                Arc::clone(&folders),
                resolver.clone(),
                Arc::clone(&item),
                Arc::clone(&calls),
                Arc::clone(&barrier),
            );
            std::thread::spawn(move || {
                barrier.wait();
                let renderer = Renderer::generic();
                folders.folder(item.id, &renderer.name).get_or_resolve(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    resolver.children(&item, &renderer, None)
                })
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(folders.len(), 1);
    for r in &results[1..] {
        assert!(Arc::ptr_eq(r, &results[0]));
    }
}

#[test]
fn folders_are_kept_per_renderer() {
    let folders = TranscodeFolders::new();
    let id = Uuid::new_v4();
    let generic = folders.folder(id, "Generic");
    generic.get_or_resolve(Vec::new);
    assert!(generic.is_resolved());
    assert!(!folders.folder(id, "Bravia").is_resolved());
    assert!(Arc::ptr_eq(&generic, &folders.folder(id, "Generic")));
    assert_eq!(folders.len(), 2);
}
