pub mod library;
pub mod metadata;
pub mod mime;
pub mod scanner;
