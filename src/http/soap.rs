//! SOAP plumbing shared by the ContentDirectory and ConnectionManager control
//! endpoints, and the DLNA attribute strings their DIDL-Lite output carries.

use std::borrow::Cow;
use std::path::Path;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

pub const CDS_NAMESPACE: &str = "urn:schemas-upnp-org:service:ContentDirectory:1";
pub const CMS_NAMESPACE: &str = "urn:schemas-upnp-org:service:ConnectionManager:1";

/// DLNA.ORG_FLAGS: streaming transfer mode, background transfer, connection
/// stalling and DLNA 1.5.
pub const DLNA_FLAGS: &str = "01700000000000000000000000000000";

// Top-level container titles. Also the UUIDv5 seed for their object ids.
pub const CONTAINER_VIDEOS: &str = "Videos";
pub const CONTAINER_MUSIC: &str = "Music";
pub const CONTAINER_PHOTOS: &str = "Photos";
pub const CONTAINER_ALL_MEDIA: &str = "All Media";

const XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

const ENVELOPE_HEAD: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n",
    "<s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" ",
    "s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">",
    "<s:Body>",
);
const ENVELOPE_TAIL: &str = "</s:Body></s:Envelope>\n";

fn envelope(body: &str) -> String {
    let mut out = String::with_capacity(ENVELOPE_HEAD.len() + body.len() + ENVELOPE_TAIL.len());
    out.push_str(ENVELOPE_HEAD);
    out.push_str(body);
    out.push_str(ENVELOPE_TAIL);
    out
}

/// `<u:{action}Response>` in the given service namespace, wrapped in an envelope.
pub fn soap_response_ns(action: &str, inner_xml: &str, namespace: &str) -> String {
    envelope(&format!(
        r#"<u:{action}Response xmlns:u="{namespace}">{inner_xml}</u:{action}Response>"#
    ))
}

/// ContentDirectory flavour of [`soap_response_ns`].
pub fn soap_response(action: &str, inner_xml: &str) -> String {
    soap_response_ns(action, inner_xml, CDS_NAMESPACE)
}

/// 200 with an XML body.
pub fn xml_ok(body: String) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, XML_CONTENT_TYPE)], body).into_response()
}

/// A UPnPError fault. SOAP 1.1 sends faults as HTTP 500.
pub fn soap_fault(error_code: u32, error_description: &str) -> Response {
    let fault = format!(
        concat!(
            "<s:Fault><faultcode>s:Client</faultcode><faultstring>UPnPError</faultstring>",
            "<detail><UPnPError xmlns=\"urn:schemas-upnp-org:control-1-0\">",
            "<errorCode>{}</errorCode><errorDescription>{}</errorDescription>",
            "</UPnPError></detail></s:Fault>",
        ),
        error_code,
        xml_escape(error_description),
    );
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
        envelope(&fault),
    )
        .into_response()
}

/// Name of the invoked action.
///
/// Taken from the fragment of the `SOAPAction` header
/// (`"urn:...:ContentDirectory:1#Browse"`). Some control points leave the
/// header empty, so the first `<u:Action` element in the body is the fallback.
pub fn soap_action<'a>(headers: &'a HeaderMap, body: &'a str) -> Option<&'a str> {
    let from_header = headers
        .get("soapaction")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit_once('#'))
        .map(|(_, action)| action.trim_matches('"'))
        .filter(|action| !action.is_empty());

    from_header.or_else(|| {
        let rest = &body[body.find("<u:")? + 3..];
        let end = rest.find([' ', '>', '/']).unwrap_or(rest.len());
        Some(&rest[..end]).filter(|action| !action.is_empty())
    })
}

/// Text content of the first `<param>...</param>` in a SOAP body.
///
/// A plain substring scan; control bodies are small and flat.
pub fn extract_soap_param<'a>(body: &'a str, param: &str) -> Option<&'a str> {
    let (_, after_open) = body.split_once(&format!("<{param}>"))?;
    after_open
        .split_once(&format!("</{param}>"))
        .map(|(value, _)| value)
}

/// Browse windowing. A start past the end yields nothing; a count of 0
/// returns everything from the start on.
pub fn apply_pagination<T>(items: &[T], starting_index: u32, requested_count: u32) -> &[T] {
    let rest = items.get(starting_index as usize..).unwrap_or(&[]);
    match requested_count as usize {
        0 => rest,
        count => &rest[..count.min(rest.len())],
    }
}

/// protocolInfo for a file served as-is. Byte seek only, never converted.
///
/// Files without a known DLNA profile get no `DLNA.ORG_PN` at all; a `*`
/// profile makes several renderers refuse the resource.
pub fn build_protocol_info(mime: &str, dlna_profile: Option<&str>) -> String {
    format!("http-get:*:{mime}:{}", content_features(dlna_profile, false, false))
}

/// protocolInfo for engine output.
pub fn build_transcode_protocol_info(mime: &str, time_seekable: bool) -> String {
    format!("http-get:*:{mime}:{}", content_features(None, true, time_seekable))
}

/// Fourth protocolInfo field, also returned as `contentFeatures.dlna.org`.
///
/// `DLNA.ORG_OP` has a time-seek bit and a byte-seek bit. Engine output has no
/// fixed length so it can only ever offer the former.
pub fn content_features(dlna_profile: Option<&str>, transcoded: bool, time_seekable: bool) -> String {
    let op = if !transcoded {
        "01"
    } else if time_seekable {
        "10"
    } else {
        "00"
    };
    let ci = u8::from(transcoded);
    let pn = dlna_profile
        .map(|profile| format!("DLNA.ORG_PN={profile};"))
        .unwrap_or_default();
    format!("{pn}DLNA.ORG_OP={op};DLNA.ORG_CI={ci};DLNA.ORG_FLAGS={DLNA_FLAGS}")
}

/// Object id of a top-level container. Same machine namespace as items, so
/// ids survive restarts.
pub fn container_uuid(name: &str) -> uuid::Uuid {
    uuid::Uuid::new_v5(&crate::media::metadata::MACHINE_NAMESPACE, name.as_bytes())
}

/// `dc:date` from the file mtime. Samsung sets drop items without one, so
/// unreadable files get the epoch.
pub fn format_dc_date(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(|mtime| {
            chrono::DateTime::<chrono::Utc>::from(mtime)
                .format("%Y-%m-%d")
                .to_string()
        })
        .unwrap_or_else(|_| String::from("1970-01-01"))
}

/// Absolute URL for `path` using the authority the client connected to.
///
/// Echoing `Host` keeps URLs reachable whichever address family or interface
/// the renderer came in on.
pub fn build_url(headers: &HeaderMap, path: &str) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost:8200");
    format!("http://{host}{path}")
}

/// Escape text for XML content and attribute values.
pub fn xml_escape(s: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(s)
}
