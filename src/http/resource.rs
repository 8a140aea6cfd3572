//! Everything a ContentDirectory client can browse, as one tagged type.
//!
//! Object ids:
//!
//! | id                                   | resource                              |
//! |--------------------------------------|---------------------------------------|
//! | `0`                                  | root                                  |
//! | container UUID                       | Videos / Music / Photos / All Media   |
//! | item UUID                            | the item, streamed directly           |
//! | `{item}/transcode`                   | the item's representations            |
//! | `{item}/transcode/{n}`               | representation `n`                    |
//! | `{item}/transcode/{n}/chapters`      | chapter offsets into `n`              |
//! | `{item}/transcode/{n}/chapters/{k}`  | chapter `k`                           |

use std::fmt;
use uuid::Uuid;

use crate::http::soap;
use crate::http::state::AppState;
use crate::media::library::MediaItem;
use crate::media::metadata::format_upnp_seconds;
use crate::media::mime::MediaKind;
use crate::renderer::Renderer;
use crate::resolve::{find_chapters, find_representation, ChapterFolder, Representation, TranscodeChild};

pub const ROOT_ID: &str = "0";
const TRANSCODE: &str = "transcode";
const CHAPTERS: &str = "chapters";

/// Parsed object id. A bare UUID is either a container or an item; which one
/// is decided on lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectId {
    Root,
    Node(Uuid),
    TranscodeFolder(Uuid),
    Representation(Uuid, usize),
    ChapterFolder(Uuid, usize),
    Chapter(Uuid, usize, u64),
}

impl ObjectId {
    pub fn parse(s: &str) -> Option<Self> {
        if s == ROOT_ID {
            return Some(ObjectId::Root);
        }
        let parts: Vec<&str> = s.split('/').collect();
        let id = Uuid::parse_str(parts[0]).ok()?;
        match parts[1..] {
            [] => Some(ObjectId::Node(id)),
            [TRANSCODE] => Some(ObjectId::TranscodeFolder(id)),
            [TRANSCODE, n] => Some(ObjectId::Representation(id, n.parse().ok()?)),
            [TRANSCODE, n, CHAPTERS] => Some(ObjectId::ChapterFolder(id, n.parse().ok()?)),
            [TRANSCODE, n, CHAPTERS, k] => {
                Some(ObjectId::Chapter(id, n.parse().ok()?, k.parse().ok()?))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectId::Root => f.write_str(ROOT_ID),
            ObjectId::Node(id) => write!(f, "{}", id),
            ObjectId::TranscodeFolder(id) => write!(f, "{}/{}", id, TRANSCODE),
            ObjectId::Representation(id, n) => write!(f, "{}/{}/{}", id, TRANSCODE, n),
            ObjectId::ChapterFolder(id, n) => write!(f, "{}/{}/{}/{}", id, TRANSCODE, n, CHAPTERS),
            ObjectId::Chapter(id, n, k) => {
                write!(f, "{}/{}/{}/{}/{}", id, TRANSCODE, n, CHAPTERS, k)
            }
        }
    }
}

/// One of the four top-level containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Container {
    pub id: Uuid,
    pub title: &'static str,
    /// None lists every item.
    pub kind: Option<MediaKind>,
}

pub fn containers() -> [Container; 4] {
    [
        Container { id: soap::container_uuid(soap::CONTAINER_VIDEOS), title: soap::CONTAINER_VIDEOS, kind: Some(MediaKind::Video) },
        Container { id: soap::container_uuid(soap::CONTAINER_MUSIC), title: soap::CONTAINER_MUSIC, kind: Some(MediaKind::Audio) },
        Container { id: soap::container_uuid(soap::CONTAINER_PHOTOS), title: soap::CONTAINER_PHOTOS, kind: Some(MediaKind::Image) },
        Container { id: soap::container_uuid(soap::CONTAINER_ALL_MEDIA), title: soap::CONTAINER_ALL_MEDIA, kind: None },
    ]
}

fn container_of(kind: MediaKind) -> Container {
    let [videos, music, photos, all] = containers();
    match kind {
        MediaKind::Video => videos,
        MediaKind::Audio => music,
        MediaKind::Image => photos,
        MediaKind::Subtitle => all,
    }
}

/// What a `<res>` element points at.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamTarget {
    /// Server-relative URL path, with query.
    pub path: String,
    pub protocol_info: String,
    pub size: Option<u64>,
    pub duration: Option<String>,
    pub resolution: Option<String>,
    pub bitrate: Option<u32>,
}

/// A browsable object.
#[derive(Debug, Clone)]
pub enum Resource {
    Root,
    Container(Container),
    Item(MediaItem),
    /// Children resolve only when the folder itself is browsed.
    TranscodeFolder {
        item: MediaItem,
    },
    Representation {
        item: MediaItem,
        index: usize,
        representation: Representation,
    },
    ChapterFolder {
        item: MediaItem,
        representation: Representation,
        folder: ChapterFolder,
    },
    Chapter {
        item: MediaItem,
        /// The chapter folder's playback entry, not the listed one.
        representation: Representation,
        index: usize,
        chapter: u64,
        start: f64,
    },
}

/// Items a renderer can be offered other forms of.
fn has_transcode_folder(item: &MediaItem) -> bool {
    matches!(item.kind, MediaKind::Video | MediaKind::Audio)
}

impl Resource {
    /// Resolve an object id for `renderer`. None for anything that does not exist.
    pub fn lookup(state: &AppState, renderer: &Renderer, object_id: &str) -> Option<Resource> {
        let parsed = ObjectId::parse(object_id)?;
        let item_of = |id: Uuid| state.item(&id);
        match parsed {
            ObjectId::Root => Some(Resource::Root),
            ObjectId::Node(id) => containers()
                .into_iter()
                .find(|c| c.id == id)
                .map(Resource::Container)
                .or_else(|| item_of(id).map(Resource::Item)),
            ObjectId::TranscodeFolder(id) => {
                let item = item_of(id).filter(has_transcode_folder)?;
                Some(Resource::TranscodeFolder { item })
            }
            ObjectId::Representation(id, index) => {
                let item = item_of(id).filter(has_transcode_folder)?;
                let children = state.transcode_children(&item, renderer);
                let representation = find_representation(&children, index)?.clone();
                Some(Resource::Representation { item, index, representation })
            }
            ObjectId::ChapterFolder(id, index) => {
                let item = item_of(id).filter(has_transcode_folder)?;
                let children = state.transcode_children(&item, renderer);
                let representation = find_representation(&children, index)?.clone();
                let folder = find_chapters(&children, index)?.clone();
                Some(Resource::ChapterFolder { item, representation, folder })
            }
            ObjectId::Chapter(id, index, chapter) => {
                let item = item_of(id).filter(has_transcode_folder)?;
                let children = state.transcode_children(&item, renderer);
                let folder = find_chapters(&children, index)?;
                let start = folder.start(chapter)?;
                let representation = folder.playback.clone();
                Some(Resource::Chapter { item, representation, index, chapter, start })
            }
        }
    }

    pub fn object_id(&self) -> ObjectId {
        match self {
            Resource::Root => ObjectId::Root,
            Resource::Container(c) => ObjectId::Node(c.id),
            Resource::Item(item) => ObjectId::Node(item.id),
            Resource::TranscodeFolder { item, .. } => ObjectId::TranscodeFolder(item.id),
            Resource::Representation { item, index, .. } => ObjectId::Representation(item.id, *index),
            Resource::ChapterFolder { item, folder, .. } => {
                ObjectId::ChapterFolder(item.id, folder.representation)
            }
            Resource::Chapter { item, index, chapter, .. } => {
                ObjectId::Chapter(item.id, *index, *chapter)
            }
        }
    }

    pub fn parent_id(&self) -> String {
        match self {
            Resource::Root => "-1".to_string(),
            Resource::Container(_) => ROOT_ID.to_string(),
            Resource::Item(item) | Resource::TranscodeFolder { item, .. } => {
                container_of(item.kind).id.to_string()
            }
            Resource::Representation { item, .. } | Resource::ChapterFolder { item, .. } => {
                ObjectId::TranscodeFolder(item.id).to_string()
            }
            Resource::Chapter { item, index, .. } => ObjectId::ChapterFolder(item.id, *index).to_string(),
        }
    }

    pub fn title(&self) -> String {
        match self {
            Resource::Root => "Root".to_string(),
            Resource::Container(c) => c.title.to_string(),
            Resource::Item(item) => item.title().to_string(),
            Resource::TranscodeFolder { item, .. } => format!("{} [Transcode]", item.title()),
            Resource::Representation { representation, .. } => representation.label(),
            Resource::ChapterFolder { representation, .. } => {
                format!("{} [Chapters]", representation.label())
            }
            Resource::Chapter { chapter, start, .. } => {
                let hms = format_upnp_seconds(*start);
                // Drop the milliseconds; chapters start on whole seconds.
                let hms = hms.split('.').next().unwrap_or(&hms).to_string();
                format!("Chapter {} ({})", chapter + 1, hms)
            }
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Resource::Root
                | Resource::Container(_)
                | Resource::TranscodeFolder { .. }
                | Resource::ChapterFolder { .. }
        )
    }

    pub fn upnp_class(&self) -> &'static str {
        let item = match self {
            Resource::Root | Resource::Container(_) | Resource::TranscodeFolder { .. } | Resource::ChapterFolder { .. } => {
                return "object.container.storageFolder";
            }
            Resource::Item(item) | Resource::Representation { item, .. } | Resource::Chapter { item, .. } => item,
        };
        match item.kind {
            MediaKind::Video => "object.item.videoItem",
            MediaKind::Audio => "object.item.audioItem.musicTrack",
            MediaKind::Image => "object.item.imageItem.photo",
            MediaKind::Subtitle => "object.item",
        }
    }

    /// The media item behind this resource, if any.
    pub fn item(&self) -> Option<&MediaItem> {
        match self {
            Resource::Root | Resource::Container(_) => None,
            Resource::Item(item)
            | Resource::TranscodeFolder { item, .. }
            | Resource::Representation { item, .. }
            | Resource::ChapterFolder { item, .. }
            | Resource::Chapter { item, .. } => Some(item),
        }
    }

    /// Direct children, in listing order.
    pub fn children(&self, state: &AppState, renderer: &Renderer) -> Vec<Resource> {
        match self {
            Resource::Root => containers().into_iter().map(Resource::Container).collect(),
            Resource::Container(c) => {
                let mut out = Vec::new();
                for item in state.items(c.kind) {
                    if has_transcode_folder(&item) {
                        out.push(Resource::Item(item.clone()));
                        out.push(Resource::TranscodeFolder { item });
                    } else {
                        out.push(Resource::Item(item));
                    }
                }
                out
            }
            Resource::TranscodeFolder { item } => {
                let children = state.transcode_children(item, renderer);
                children
                    .iter()
                    .filter_map(|child| match child {
                        TranscodeChild::Representation { index, representation } => {
                            Some(Resource::Representation {
                                item: item.clone(),
                                index: *index,
                                representation: representation.clone(),
                            })
                        }
                        TranscodeChild::ChapterFolder(folder) => {
                            let representation = find_representation(&children, folder.representation)?;
                            Some(Resource::ChapterFolder {
                                item: item.clone(),
                                representation: representation.clone(),
                                folder: folder.clone(),
                            })
                        }
                    })
                    .collect()
            }
            Resource::ChapterFolder { item, folder, .. } => folder
                .starts()
                .enumerate()
                .map(|(k, start)| Resource::Chapter {
                    item: item.clone(),
                    representation: folder.playback.clone(),
                    index: folder.representation,
                    chapter: k as u64,
                    start,
                })
                .collect(),
            Resource::Item(_) | Resource::Representation { .. } | Resource::Chapter { .. } => Vec::new(),
        }
    }

    /// childCount without materializing children where that is cheap. A
    /// transcode folder nobody has opened yet reports its direct entry only.
    pub fn child_count(&self, state: &AppState, renderer: &Renderer) -> usize {
        match self {
            Resource::Root => containers().len(),
            Resource::Container(c) => state
                .items(c.kind)
                .iter()
                .map(|item| if has_transcode_folder(item) { 2 } else { 1 })
                .sum(),
            Resource::TranscodeFolder { item } => {
                state.resolved_children(item, renderer).map_or(1, |children| children.len())
            }
            Resource::ChapterFolder { folder, .. } => folder.count() as usize,
            Resource::Item(_) | Resource::Representation { .. } | Resource::Chapter { .. } => 0,
        }
    }

    /// Where the bytes of this resource are served.
    pub fn stream_target(&self) -> Option<StreamTarget> {
        let (item, path, protocol_info) = match self {
            Resource::Item(item) => (
                item,
                format!("/media/{}", item.id),
                soap::build_protocol_info(item.mime, item.meta.dlna_profile),
            ),
            Resource::Representation { item, index, representation } => (
                item,
                format!("/media/{}/{}", item.id, index),
                protocol_info_for(item, representation),
            ),
            Resource::Chapter { item, index, representation, start, .. } => (
                item,
                format!("/media/{}/{}?start={}", item.id, index, start),
                protocol_info_for(item, representation),
            ),
            _ => return None,
        };
        let transcoded = self.representation().is_some_and(|r| !r.is_direct());
        let duration = match self {
            Resource::Chapter { start, .. } if item.duration_secs > 0.0 => {
                Some(format_upnp_seconds(item.duration_secs - start))
            }
            _ => item.meta.duration.clone(),
        };
        Some(StreamTarget {
            path,
            protocol_info,
            size: (!transcoded).then_some(item.file_size),
            duration,
            resolution: item.meta.resolution.clone(),
            bitrate: if transcoded { None } else { item.meta.bitrate },
        })
    }

    /// External subtitle a renderer should fetch alongside the stream:
    /// (URL path, MIME).
    pub fn subtitle_target(&self) -> Option<(String, &'static str)> {
        let representation = self.representation()?;
        if !representation.is_direct() {
            return None;
        }
        let sub = representation.subtitle.as_ref()?;
        let index = sub.index?;
        let mime = sub.mime?;
        sub.external.as_ref()?;
        Some((format!("/subtitles/{}/{}", representation.item_id, index), mime))
    }

    /// Thumbnail URL path. Photos are their own thumbnail; everything else has none.
    pub fn thumbnail(&self) -> Option<String> {
        let item = self.item()?;
        (item.kind == MediaKind::Image && matches!(self, Resource::Item(_)))
            .then(|| format!("/media/{}", item.id))
    }

    fn representation(&self) -> Option<&Representation> {
        match self {
            Resource::Representation { representation, .. } | Resource::Chapter { representation, .. } => {
                Some(representation)
            }
            _ => None,
        }
    }
}

fn protocol_info_for(item: &MediaItem, representation: &Representation) -> String {
    match &representation.engine {
        None => soap::build_protocol_info(item.mime, item.meta.dlna_profile),
        Some(engine) => soap::build_transcode_protocol_info(&engine.output_mime, engine.time_seekable),
    }
}
