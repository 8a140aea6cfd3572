use std::sync::Arc;

use crate::config::RendererConfig;
use crate::renderer::capability::CapabilityProfile;

/// Name of the renderer used when no configured User-Agent pattern matches.
pub const GENERIC_RENDERER: &str = "Generic";

/// A playback device class and what it can play.
#[derive(Debug)]
pub struct Renderer {
    pub name: String,
    /// Lowercased substrings matched against the request User-Agent.
    pub user_agents: Vec<String>,
    pub capabilities: CapabilityProfile,
    /// Renderer fetches sidecar subtitle files itself.
    pub stream_subtitles: bool,
    /// Minutes; overrides the server-wide chapter interval. 0 disables chapters.
    pub chapter_interval: Option<u32>,
}

impl Renderer {
    /// A renderer we know nothing about: empty profile (accepts all), no
    /// subtitle streaming, server default chapter interval.
    pub fn generic() -> Self {
        Renderer {
            name: GENERIC_RENDERER.to_string(),
            user_agents: Vec::new(),
            capabilities: CapabilityProfile::new(),
            stream_subtitles: false,
            chapter_interval: None,
        }
    }

    fn from_config(cfg: &RendererConfig) -> Self {
        let capabilities = CapabilityProfile::new();
        if let Some(caps) = &cfg.capabilities {
            capabilities.set(caps);
        }
        Renderer {
            name: cfg.name.clone(),
            user_agents: cfg.user_agent.iter().map(|ua| ua.to_ascii_lowercase()).collect(),
            capabilities,
            stream_subtitles: cfg.stream_subtitles,
            chapter_interval: cfg.chapter_interval,
        }
    }

    pub fn matches(&self, user_agent: &str) -> bool {
        let ua = user_agent.to_ascii_lowercase();
        self.user_agents.iter().any(|pat| !pat.is_empty() && ua.contains(pat.as_str()))
    }
}

/// Configured renderers in declaration order, plus the generic fallback.
#[derive(Debug)]
pub struct RendererRegistry {
    renderers: Vec<Arc<Renderer>>,
    generic: Arc<Renderer>,
}

impl RendererRegistry {
    pub fn new(configs: &[RendererConfig]) -> Self {
        let renderers: Vec<Arc<Renderer>> = configs
            .iter()
            .map(|cfg| {
                let r = Renderer::from_config(cfg);
                tracing::debug!(
                    "renderer {} ({} capabilities, stream_subtitles={})",
                    r.name,
                    r.capabilities.len(),
                    r.stream_subtitles
                );
                Arc::new(r)
            })
            .collect();
        RendererRegistry {
            renderers,
            generic: Arc::new(Renderer::generic()),
        }
    }

    /// First configured renderer whose pattern occurs in `user_agent`, else the generic one.
    pub fn match_user_agent(&self, user_agent: Option<&str>) -> Arc<Renderer> {
        user_agent
            .and_then(|ua| self.renderers.iter().find(|r| r.matches(ua)))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.generic))
    }

    pub fn generic(&self) -> Arc<Renderer> {
        Arc::clone(&self.generic)
    }

    pub fn len(&self) -> usize {
        self.renderers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renderers.is_empty()
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::new(&[])
    }
}
