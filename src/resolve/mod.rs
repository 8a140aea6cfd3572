//! Which forms of an item a renderer is offered, and in what order.

pub mod folder;
pub mod representation;
pub mod resolver;

pub use folder::{TranscodeFolder, TranscodeFolders};
pub use representation::{
    find_chapters, find_representation, with_audio_subtitle_engine, ChapterFolder, Representation,
    TranscodeChild,
};
pub use resolver::RepresentationResolver;
