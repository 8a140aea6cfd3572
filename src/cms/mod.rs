//! ConnectionManager service.
//!
//! Only the source side matters here: renderers call GetProtocolInfo to learn
//! which formats the server can hand out. Connections are never prepared, so
//! the connection queries describe the single implicit connection 0.

use axum::{extract::State, http::HeaderMap, response::Response};

use crate::http::soap::{soap_action, soap_fault, soap_response_ns, xml_ok, CMS_NAMESPACE};
use crate::http::state::AppState;
use crate::media::mime::served_mimes;

const CONNECTION_INFO: &str = concat!(
    "<RcsID>-1</RcsID>",
    "<AVTransportID>-1</AVTransportID>",
    "<ProtocolInfo></ProtocolInfo>",
    "<PeerConnectionManager></PeerConnectionManager>",
    "<PeerConnectionID>-1</PeerConnectionID>",
    "<Direction>Output</Direction>",
    "<Status>OK</Status>",
);

/// POST /cms/control
pub async fn cms_control(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    let (action, inner) = match soap_action(&headers, &body) {
        Some(action @ "GetProtocolInfo") => (
            action,
            format!("<Source>{}</Source><Sink></Sink>", source_protocol_info(&state)),
        ),
        Some(action @ "GetCurrentConnectionIDs") => (action, "<ConnectionIDs>0</ConnectionIDs>".to_string()),
        Some(action @ "GetCurrentConnectionInfo") => (action, CONNECTION_INFO.to_string()),
        other => {
            tracing::warn!(action = ?other, "Unsupported ConnectionManager action");
            return soap_fault(401, "Invalid Action");
        }
    };
    xml_ok(soap_response_ns(action, &inner, CMS_NAMESPACE))
}

/// Every MIME served as-is, then each distinct engine output MIME in
/// catalog order.
fn source_protocol_info(state: &AppState) -> String {
    let engines = state.resolver.catalog().all();
    let mut mimes: Vec<&str> = served_mimes();
    for engine in engines.iter() {
        let mime = engine.output_mime.as_str();
        if !mimes.iter().any(|known| known.eq_ignore_ascii_case(mime)) {
            mimes.push(mime);
        }
    }
    mimes
        .iter()
        .map(|mime| format!("http-get:*:{mime}:*"))
        .collect::<Vec<_>>()
        .join(",")
}
