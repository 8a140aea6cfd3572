//! DLNA/UPnP media server that works out, per renderer, which forms of each
//! item it can play (direct, or through a transcoding engine with a chosen
//! audio and subtitle track) and streams the chosen form over HTTP.

pub mod cli;
pub mod cms;
pub mod config;
pub mod engine;
pub mod http;
pub mod media;
pub mod renderer;
pub mod resolve;
pub mod stream;
