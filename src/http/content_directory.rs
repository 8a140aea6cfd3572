use std::fmt::Write as _;

use axum::{extract::State, http::HeaderMap, response::Response};

use crate::http::resource::Resource;
use crate::http::soap::{self, apply_pagination, extract_soap_param, soap_fault, soap_response, xml_ok};
use crate::http::state::AppState;
use crate::renderer::Renderer;

/// POST /cds/control
pub async fn cds_control(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    match soap::soap_action(&headers, &body) {
        Some("Browse") => match BrowseArgs::parse(&body) {
            Ok(args) => browse(&state, &headers, args),
            Err(fault) => fault,
        },
        Some("GetSearchCapabilities") => {
            xml_ok(soap_response("GetSearchCapabilities", "<SearchCaps></SearchCaps>"))
        }
        Some("GetSortCapabilities") => {
            xml_ok(soap_response("GetSortCapabilities", "<SortCaps></SortCaps>"))
        }
        // The counter never moves; the library is fixed after startup.
        Some("GetSystemUpdateID") => xml_ok(soap_response("GetSystemUpdateID", "<Id>1</Id>")),
        other => {
            tracing::warn!(action = ?other, "Unsupported ContentDirectory action");
            soap_fault(402, "InvalidArgs")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrowseFlag {
    Metadata,
    DirectChildren,
}

#[derive(Debug)]
struct BrowseArgs {
    object_id: String,
    flag: BrowseFlag,
    starting_index: u32,
    requested_count: u32,
}

impl BrowseArgs {
    fn parse(body: &str) -> Result<Self, Response> {
        let invalid = || soap_fault(402, "InvalidArgs");

        let raw_id = extract_soap_param(body, "ObjectID").ok_or_else(invalid)?;
        let flag = match extract_soap_param(body, "BrowseFlag").ok_or_else(invalid)? {
            "BrowseMetadata" => BrowseFlag::Metadata,
            "BrowseDirectChildren" => BrowseFlag::DirectChildren,
            other => {
                tracing::warn!(flag = other, "Unknown BrowseFlag");
                return Err(invalid());
            }
        };
        let number = |name: &str| -> u32 {
            extract_soap_param(body, name)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0)
        };
        let object_id = quick_xml::escape::unescape(raw_id)
            .map(|id| id.into_owned())
            .unwrap_or_else(|_| raw_id.to_string());

        Ok(Self {
            object_id,
            flag,
            starting_index: number("StartingIndex"),
            requested_count: number("RequestedCount"),
        })
    }
}

/// Children of the transcode folders depend on which renderer asks, so the
/// renderer is matched before the object is looked up.
fn browse(state: &AppState, headers: &HeaderMap, args: BrowseArgs) -> Response {
    let renderer = state.renderer(headers);
    let Some(resource) = Resource::lookup(state, &renderer, &args.object_id) else {
        tracing::debug!(object_id = %args.object_id, "Browse for unknown object");
        return soap_fault(701, "No such object");
    };

    let mut didl = Didl::new(state, &renderer, headers);
    let (returned, total) = match args.flag {
        BrowseFlag::Metadata => {
            didl.push(&resource);
            (1, 1)
        }
        BrowseFlag::DirectChildren => {
            let children = resource.children(state, &renderer);
            let page = apply_pagination(&children, args.starting_index, args.requested_count);
            for child in page {
                didl.push(child);
            }
            (page.len(), children.len())
        }
    };

    let inner = format!(
        "<Result>{}</Result><NumberReturned>{returned}</NumberReturned>\
         <TotalMatches>{total}</TotalMatches><UpdateID>1</UpdateID>",
        soap::xml_escape(&didl.finish()),
    );
    xml_ok(soap_response("Browse", &inner))
}

/// Accumulates DIDL-Lite elements for one Browse result.
struct Didl<'a> {
    state: &'a AppState,
    renderer: &'a Renderer,
    headers: &'a HeaderMap,
    out: String,
}

impl<'a> Didl<'a> {
    // Samsung firmware silently rejects results missing xmlns:dlna.
    const OPEN: &'static str = concat!(
        r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/""#,
        r#" xmlns:dc="http://purl.org/dc/elements/1.1/""#,
        r#" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/""#,
        r#" xmlns:dlna="urn:schemas-dlna-org:metadata-1-0/">"#,
    );

    fn new(state: &'a AppState, renderer: &'a Renderer, headers: &'a HeaderMap) -> Self {
        Self { state, renderer, headers, out: String::from(Self::OPEN) }
    }

    fn push(&mut self, resource: &Resource) {
        if resource.is_container() {
            self.container(resource);
        } else {
            self.item(resource);
        }
    }

    fn finish(mut self) -> String {
        self.out.push_str("</DIDL-Lite>");
        self.out
    }

    fn url(&self, path: &str) -> String {
        soap::xml_escape(&soap::build_url(self.headers, path)).into_owned()
    }

    fn container(&mut self, resource: &Resource) {
        let _ = write!(
            self.out,
            r#"<container id="{}" parentID="{}" restricted="1" childCount="{}"><dc:title>{}</dc:title><upnp:class>{}</upnp:class></container>"#,
            soap::xml_escape(&resource.object_id().to_string()),
            soap::xml_escape(&resource.parent_id()),
            resource.child_count(self.state, self.renderer),
            soap::xml_escape(&resource.title()),
            resource.upnp_class(),
        );
    }

    /// Engine output has no size; its length is unknown until it ends.
    fn item(&mut self, resource: &Resource) {
        let (Some(target), Some(item)) = (resource.stream_target(), resource.item()) else {
            return;
        };

        let mut res_attrs = String::new();
        if let Some(size) = target.size {
            let _ = write!(res_attrs, r#" size="{size}""#);
        }
        if let Some(duration) = &target.duration {
            let _ = write!(res_attrs, r#" duration="{duration}""#);
        }
        if let Some(resolution) = &target.resolution {
            let _ = write!(res_attrs, r#" resolution="{resolution}""#);
        }
        if let Some(bitrate) = target.bitrate {
            let _ = write!(res_attrs, r#" bitrate="{bitrate}""#);
        }

        let res_url = self.url(&target.path);
        let _ = write!(
            self.out,
            r#"<item id="{}" parentID="{}" restricted="1"><dc:title>{}</dc:title><upnp:class>{}</upnp:class><dc:date>{}</dc:date><res protocolInfo="{}"{}>{}</res>"#,
            soap::xml_escape(&resource.object_id().to_string()),
            soap::xml_escape(&resource.parent_id()),
            soap::xml_escape(&resource.title()),
            resource.upnp_class(),
            soap::format_dc_date(&item.path),
            target.protocol_info,
            res_attrs,
            res_url,
        );
        if let Some((path, mime)) = resource.subtitle_target() {
            let url = self.url(&path);
            let _ = write!(self.out, r#"<res protocolInfo="http-get:*:{mime}:*">{url}</res>"#);
        }
        if let Some(thumb) = resource.thumbnail() {
            let url = self.url(&thumb);
            let _ = write!(self.out, "<upnp:albumArtURI>{url}</upnp:albumArtURI>");
        }
        self.out.push_str("</item>");
    }
}
