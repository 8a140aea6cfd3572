pub mod capability;
pub mod registry;

pub use capability::{CapabilityError, CapabilityProfile, ProtocolInfo};
pub use registry::{Renderer, RendererRegistry};
