use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use repcast::config::{Config, RendererConfig};
use repcast::engine::EngineDescriptor;
use repcast::http::{build_router, state::AppState};
use repcast::media::library::{AudioTrack, MediaItem, MediaLibrary, MediaMeta};
use repcast::media::mime::MediaKind;

const TEST_NAME: &str = "Test DLNA Server";

fn test_config(engines: Vec<EngineDescriptor>, renderers: Vec<RendererConfig>) -> Config {
    Config {
        port: 8200,
        name: TEST_NAME.to_string(),
        paths: vec![],
        localhost: true,
        chapter_interval: 5,
        max_transcodes: 1,
        abort_timeout: Duration::from_secs(2),
        engines,
        renderers,
    }
}

fn make_state(items: Vec<MediaItem>, config: &Config) -> AppState {
    let mut library = MediaLibrary::new();
    library.items = items;
    AppState::from_config(library, config)
}

fn make_app(items: Vec<MediaItem>) -> axum::Router {
    build_router(make_state(items, &test_config(vec![], vec![])))
}

fn video_item(path: &Path, file_size: u64) -> MediaItem {
    MediaItem {
        id: Uuid::new_v5(&Uuid::NAMESPACE_DNS, path.as_os_str().as_encoded_bytes()),
        path: path.to_path_buf(),
        file_size,
        mime: "video/mp4",
        kind: MediaKind::Video,
        container: "mp4",
        video_codec: Some("h264".to_string()),
        audio_tracks: vec![AudioTrack::new(0, "ac3").with_lang("eng").with_channels(6)],
        subtitle_tracks: vec![],
        duration_secs: 1200.0,
        seekable: true,
        meta: MediaMeta {
            duration: Some("00:20:00.000".to_string()),
            ..MediaMeta::default()
        },
    }
}

fn fake_item() -> MediaItem {
    video_item(&PathBuf::from("/fake/test.mp4"), 1_048_576)
}

/// A 1000-byte file on disk, bytes 0..=255 repeating.
fn real_item(dir: &tempfile::TempDir) -> MediaItem {
    let path = dir.path().join("clip.mp4");
    let data: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
    std::fs::write(&path, &data).unwrap();
    video_item(&path, 1000)
}

/// An engine that runs `sh -c <script>` and claims MPEG output.
fn shell_engine(script: &str) -> EngineDescriptor {
    EngineDescriptor {
        id: "sh".to_string(),
        name: "Shell".to_string(),
        rank: 1,
        program: "sh".to_string(),
        kinds: vec![MediaKind::Video],
        containers: vec!["*".to_string()],
        video_codecs: vec!["*".to_string()],
        audio_codecs: vec!["*".to_string()],
        subtitle_types: vec![],
        output_mime: "video/mpeg".to_string(),
        time_seekable: true,
        args: vec!["-c".to_string(), script.to_string()],
        audio_args: vec![],
        subtitle_args: vec![],
        external_subtitle_args: vec![],
    }
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ── POST /cds/control ─────────────────────────────────────────────────────────

fn browse_body(object_id: &str, flag: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"
            s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
  <s:Body>
    <u:Browse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1">
      <ObjectID>{object_id}</ObjectID>
      <BrowseFlag>{flag}</BrowseFlag>
      <Filter>*</Filter>
      <StartingIndex>0</StartingIndex>
      <RequestedCount>0</RequestedCount>
      <SortCriteria></SortCriteria>
    </u:Browse>
  </s:Body>
</s:Envelope>"#
    )
}

fn cds_browse_request(object_id: &str, flag: &str, user_agent: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/cds/control")
        .header(
            "soapaction",
            "\"urn:schemas-upnp-org:service:ContentDirectory:1#Browse\"",
        )
        .header("content-type", "text/xml; charset=\"utf-8\"");
    if let Some(ua) = user_agent {
        builder = builder.header("user-agent", ua);
    }
    builder.body(Body::from(browse_body(object_id, flag))).unwrap()
}

fn total_matches(text: &str) -> usize {
    let start = text.find("<TotalMatches>").unwrap() + "<TotalMatches>".len();
    let end = text[start..].find("</TotalMatches>").unwrap() + start;
    text[start..end].parse().unwrap()
}

#[tokio::test]
async fn cds_browse_root_returns_four_containers() {
    let response = make_app(vec![fake_item()])
        .oneshot(cds_browse_request("0", "BrowseDirectChildren", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("s:Envelope"), "Expected SOAP Envelope:\n{text}");
    assert!(text.contains("DIDL-Lite"), "Expected DIDL-Lite:\n{text}");
    assert_eq!(total_matches(&text), 4);
}

#[tokio::test]
async fn cds_video_container_lists_item_and_its_transcode_folder() {
    let item = fake_item();
    let videos = repcast::http::soap::container_uuid(repcast::http::soap::CONTAINER_VIDEOS);
    let response = make_app(vec![item.clone()])
        .oneshot(cds_browse_request(&videos.to_string(), "BrowseDirectChildren", None))
        .await
        .unwrap();
    let text = body_text(response).await;
    assert_eq!(total_matches(&text), 2);
    assert!(text.contains(&format!("{}/transcode", item.id)), "{text}");
    assert!(text.contains("[Transcode]"), "{text}");
}

#[tokio::test]
async fn cds_transcode_folder_lists_representations_then_chapters() {
    let item = fake_item();
    let response = make_app(vec![item.clone()])
        .oneshot(cds_browse_request(
            &format!("{}/transcode", item.id),
            "BrowseDirectChildren",
            None,
        ))
        .await
        .unwrap();
    let text = body_text(response).await;
    // Direct and FFmpeg Video, each followed by its chapter folder.
    assert_eq!(total_matches(&text), 4, "{text}");
    let direct = text.find("[Direct] {Audio: eng/ac3/6ch}&lt;/dc:title").expect("direct entry");
    let direct_chapters = text.find("[Direct] {Audio: eng/ac3/6ch} [Chapters]").expect("direct chapters");
    let ffmpeg = text.find("[FFmpeg Video] {Audio: eng/ac3/6ch}&lt;/dc:title").expect("ffmpeg entry");
    assert!(direct < direct_chapters && direct_chapters < ffmpeg);
    assert!(text.contains(&format!("{}/transcode/0/chapters", item.id)), "{text}");
    assert!(text.contains(&format!("/media/{}/1", item.id)), "{text}");
    assert!(text.contains("DLNA.ORG_CI=1"), "{text}");
}

#[tokio::test]
async fn cds_chapter_folder_lists_chapter_offsets() {
    let item = fake_item();
    let response = make_app(vec![item.clone()])
        .oneshot(cds_browse_request(
            &format!("{}/transcode/1/chapters", item.id),
            "BrowseDirectChildren",
            None,
        ))
        .await
        .unwrap();
    let text = body_text(response).await;
    // 20 minutes at 5 minute intervals.
    assert_eq!(total_matches(&text), 4, "{text}");
    assert!(text.contains("?start=900"), "{text}");
}

#[tokio::test]
async fn cds_direct_chapters_point_at_engine_output() {
    let item = fake_item();
    let response = make_app(vec![item.clone()])
        .oneshot(cds_browse_request(
            &format!("{}/transcode/0/chapters", item.id),
            "BrowseDirectChildren",
            None,
        ))
        .await
        .unwrap();
    let text = body_text(response).await;
    assert_eq!(total_matches(&text), 4, "{text}");
    assert!(text.contains(&format!("/media/{}/0?start=300", item.id)), "{text}");
    assert!(text.contains("http-get:*:video/mpeg:"), "{text}");
    assert!(!text.contains("size="), "{text}");
}

#[tokio::test]
async fn cds_container_listing_leaves_transcode_folders_unresolved() {
    let item = fake_item();
    let state = make_state(vec![item.clone()], &test_config(vec![], vec![]));
    let app = build_router(state.clone());
    let videos = repcast::http::soap::container_uuid(repcast::http::soap::CONTAINER_VIDEOS);

    let response = app
        .clone()
        .oneshot(cds_browse_request(&videos.to_string(), "BrowseDirectChildren", None))
        .await
        .unwrap();
    let text = body_text(response).await;
    assert_eq!(total_matches(&text), 2, "{text}");
    assert!(state.folders.is_empty());

    let response = app
        .oneshot(cds_browse_request(
            &format!("{}/transcode", item.id),
            "BrowseDirectChildren",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(total_matches(&body_text(response).await), 4);
    assert_eq!(state.folders.len(), 1);
}

#[tokio::test]
async fn cds_renderer_without_mpeg_support_gets_only_direct() {
    let config = test_config(
        vec![],
        vec![RendererConfig {
            name: "Bravia".to_string(),
            user_agent: vec!["bravia".to_string()],
            capabilities: Some("http-get:*:video/mp4:*".to_string()),
            stream_subtitles: false,
            chapter_interval: None,
        }],
    );
    let item = fake_item();
    let app = build_router(make_state(vec![item.clone()], &config));
    let response = app
        .oneshot(cds_browse_request(
            &format!("{}/transcode", item.id),
            "BrowseDirectChildren",
            Some("SEC_HHP_BRAVIA/1.0"),
        ))
        .await
        .unwrap();
    let text = body_text(response).await;
    assert_eq!(total_matches(&text), 1, "{text}");
}

#[tokio::test]
async fn cds_browse_metadata_of_representation() {
    let item = fake_item();
    let response = make_app(vec![item.clone()])
        .oneshot(cds_browse_request(
            &format!("{}/transcode/0", item.id),
            "BrowseMetadata",
            None,
        ))
        .await
        .unwrap();
    let text = body_text(response).await;
    assert_eq!(total_matches(&text), 1);
    assert!(text.contains("[Direct]"), "{text}");
}

#[tokio::test]
async fn cds_unknown_object_is_701() {
    let item = fake_item();
    let response = make_app(vec![item.clone()])
        .oneshot(cds_browse_request(
            &format!("{}/transcode/42", item.id),
            "BrowseMetadata",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = body_text(response).await;
    assert!(text.contains("<errorCode>701</errorCode>"), "{text}");
}

#[tokio::test]
async fn cds_unknown_action_returns_soap_fault() {
    let response = make_app(vec![])
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cds/control")
                .header(
                    "soapaction",
                    "\"urn:schemas-upnp-org:service:ContentDirectory:1#NonExistentAction\"",
                )
                .header("content-type", "text/xml; charset=\"utf-8\"")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    // UPnP SOAP faults use HTTP 500 per SOAP 1.1
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// ── POST /cms/control ─────────────────────────────────────────────────────────

#[tokio::test]
async fn cms_get_protocol_info_lists_engine_output() {
    let mut engine = shell_engine("true");
    engine.output_mime = "video/x-repcast-test".to_string();
    let config = test_config(vec![engine], vec![]);
    let response = build_router(make_state(vec![], &config))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cms/control")
                .header(
                    "soapaction",
                    "\"urn:schemas-upnp-org:service:ConnectionManager:1#GetProtocolInfo\"",
                )
                .header("content-type", "text/xml; charset=\"utf-8\"")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("<Source>"), "{text}");
    assert!(text.contains("http-get:*:video/mp4:*"), "{text}");
    assert!(text.contains("http-get:*:video/x-repcast-test:*"), "{text}");
}

// ── GET|HEAD /media/{id} ──────────────────────────────────────────────────────

#[tokio::test]
async fn media_unknown_id_returns_404() {
    let id = Uuid::new_v4();
    let response = make_app(vec![])
        .oneshot(get(&format!("/media/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn media_get_full_body() {
    let dir = tempfile::tempdir().unwrap();
    let item = real_item(&dir);
    let response = make_app(vec![item.clone()])
        .oneshot(get(&format!("/media/{}", item.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-length"], "1000");
    assert_eq!(response.headers()["accept-ranges"], "bytes");
    assert!(response.headers().get("content-range").is_none());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.len(), 1000);
}

#[tokio::test]
async fn media_open_ended_range_from_zero_is_206() {
    let dir = tempfile::tempdir().unwrap();
    let item = real_item(&dir);
    let response = make_app(vec![item.clone()])
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}", item.id))
                .header("range", "bytes=0-")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()["content-range"], "bytes 0-999/1000");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.len(), 1000);
}

#[tokio::test]
async fn media_mid_range_returns_exact_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let item = real_item(&dir);
    let response = make_app(vec![item.clone()])
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}", item.id))
                .header("range", "bytes=300-309")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()["content-length"], "10");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let expected: Vec<u8> = (300..310u32).map(|i| (i % 256) as u8).collect();
    assert_eq!(bytes.to_vec(), expected);
}

#[tokio::test]
async fn media_range_past_end_falls_back_to_full_200() {
    let dir = tempfile::tempdir().unwrap();
    let item = real_item(&dir);
    let response = make_app(vec![item.clone()])
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}", item.id))
                .header("range", "bytes=1100-1200")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("content-range").is_none());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.len(), 1000);
}

#[tokio::test]
async fn media_head_has_headers_and_no_body() {
    // The file does not exist: HEAD must not try to open it.
    let item = fake_item();
    let response = make_app(vec![item.clone()])
        .oneshot(
            Request::builder()
                .method("HEAD")
                .uri(format!("/media/{}", item.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-length"], "1048576");
    assert_eq!(response.headers()["transfermode.dlna.org"], "Streaming");
    assert!(response.headers()["contentfeatures.dlna.org"]
        .to_str()
        .unwrap()
        .contains("DLNA.ORG_OP=01"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.is_empty());
}

// ── GET|HEAD /media/{id}/{rep} ────────────────────────────────────────────────

#[tokio::test]
async fn representation_head_of_transcode_has_no_length() {
    let item = fake_item();
    let response = make_app(vec![item.clone()])
        .oneshot(
            Request::builder()
                .method("HEAD")
                .uri(format!("/media/{}/1?start=300", item.id))
                .header("range", "bytes=100-")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("content-length").is_none());
    assert!(response.headers().get("content-range").is_none());
    assert_eq!(response.headers()["content-type"], "video/mpeg");
    assert_eq!(response.headers()["timeseekrange.dlna.org"], "npt=300-");
    let features = response.headers()["contentfeatures.dlna.org"].to_str().unwrap();
    assert!(features.contains("DLNA.ORG_CI=1"), "{features}");
}

#[tokio::test]
async fn representation_rejects_non_finite_or_negative_start() {
    let item = fake_item();
    let app = make_app(vec![item.clone()]);
    for start in ["inf", "NaN", "-300"] {
        let response = app
            .clone()
            .oneshot(get(&format!("/media/{}/1?start={}", item.id, start)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "start={start}");
    }
}

#[tokio::test]
async fn direct_start_without_chapters_is_404() {
    let config = test_config(
        vec![],
        vec![RendererConfig {
            name: "Bravia".to_string(),
            user_agent: vec!["bravia".to_string()],
            capabilities: Some("http-get:*:video/mp4:*".to_string()),
            stream_subtitles: false,
            chapter_interval: None,
        }],
    );
    let item = fake_item();
    let response = build_router(make_state(vec![item.clone()], &config))
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}/0?start=300", item.id))
                .header("user-agent", "SEC_HHP_BRAVIA/1.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn representation_out_of_range_is_404() {
    let item = fake_item();
    let response = make_app(vec![item.clone()])
        .oneshot(get(&format!("/media/{}/9", item.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[cfg(unix)]
#[tokio::test]
async fn representation_get_streams_engine_output() {
    let config = test_config(vec![shell_engine("printf transcoded")], vec![]);
    let item = fake_item();
    let response = build_router(make_state(vec![item.clone()], &config))
        .oneshot(get(&format!("/media/{}/1", item.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("content-length").is_none());
    assert_eq!(body_text(response).await, "transcoded");
}

#[cfg(unix)]
#[tokio::test]
async fn direct_chapter_streams_through_engine() {
    let config = test_config(vec![shell_engine("printf chapter")], vec![]);
    let item = fake_item();
    let response = build_router(make_state(vec![item.clone()], &config))
        .oneshot(get(&format!("/media/{}/0?start=300", item.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("content-length").is_none());
    assert_eq!(response.headers()["content-type"], "video/mpeg");
    assert_eq!(response.headers()["timeseekrange.dlna.org"], "npt=300-");
    assert_eq!(body_text(response).await, "chapter");
}

#[cfg(unix)]
#[tokio::test]
async fn representation_get_over_limit_is_503() {
    let config = test_config(vec![shell_engine("sleep 5")], vec![]);
    let item = fake_item();
    let app = build_router(make_state(vec![item.clone()], &config));

    // Holds the only transcode slot while its body is alive.
    let first = app
        .clone()
        .oneshot(get(&format!("/media/{}/1", item.id)))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(get(&format!("/media/{}/1", item.id)))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    drop(first);
}

// ── GET /subtitles/{id}/{index} ───────────────────────────────────────────────

#[tokio::test]
async fn subtitle_sidecar_is_served() {
    let dir = tempfile::tempdir().unwrap();
    let mut item = real_item(&dir);
    let srt = dir.path().join("clip.eng.srt");
    std::fs::write(&srt, "1\n00:00:01,000 --> 00:00:02,000\nHello\n").unwrap();
    item.subtitle_tracks.push(
        repcast::media::library::SubtitleTrack::external(0, srt, "text/srt").with_lang("eng"),
    );
    let response = make_app(vec![item.clone()])
        .oneshot(get(&format!("/subtitles/{}/0", item.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/srt");
    assert!(body_text(response).await.contains("Hello"));
}
