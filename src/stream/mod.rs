//! Turning a representation into response bytes.

pub mod pipeline;
pub mod range;
pub mod session;

pub use pipeline::{PipelineError, PipelineExit, ProcessPipeline, Transcoder};
pub use range::ByteRange;
pub use session::{SessionBody, SessionError, SessionState, StreamSession};
