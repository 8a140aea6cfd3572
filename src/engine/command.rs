use std::path::Path;

use crate::engine::EngineDescriptor;
use crate::media::library::{AudioTrack, SubtitleTrack};

const AUDIO_ARGS: &str = "{audio_args}";
const SUBTITLE_ARGS: &str = "{subtitle_args}";

/// A fully expanded engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
}

struct Vars<'a> {
    input: &'a str,
    start: String,
    audio_index: String,
    subtitle_index: String,
    subtitle_path: String,
}

impl Vars<'_> {
    fn expand(&self, arg: &str) -> String {
        arg.replace("{input}", self.input)
            .replace("{start}", &self.start)
            .replace("{audio_index}", &self.audio_index)
            .replace("{subtitle_index}", &self.subtitle_index)
            .replace("{subtitle_path}", &self.subtitle_path)
    }
}

/// Seconds as ffmpeg accepts them: whole numbers without a fraction, else
/// millisecond precision.
pub fn format_start(start_secs: f64) -> String {
    let start = start_secs.max(0.0);
    if start.fract() == 0.0 {
        format!("{}", start as u64)
    } else {
        format!("{:.3}", start)
    }
}

impl EngineCommand {
    /// Expand the engine's argument template for one representation.
    pub fn build(
        engine: &EngineDescriptor,
        input: &Path,
        audio: Option<&AudioTrack>,
        subtitle: Option<&SubtitleTrack>,
        start_secs: f64,
    ) -> Self {
        let input = input.to_string_lossy();
        let subtitle = subtitle.filter(|s| !s.is_disabled());
        let vars = Vars {
            input: &input,
            start: format_start(start_secs),
            audio_index: audio.map(|a| a.index.to_string()).unwrap_or_default(),
            subtitle_index: subtitle
                .and_then(|s| s.index)
                .map(|i| i.to_string())
                .unwrap_or_default(),
            subtitle_path: subtitle
                .and_then(|s| s.external.as_deref())
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        let subtitle_template: &[String] = match subtitle {
            Some(s) if s.is_external() => &engine.external_subtitle_args,
            Some(_) => &engine.subtitle_args,
            None => &[],
        };
        let audio_template: &[String] = if audio.is_some() { &engine.audio_args } else { &[] };

        let mut args = Vec::with_capacity(engine.args.len());
        for arg in &engine.args {
            match arg.as_str() {
                AUDIO_ARGS => args.extend(audio_template.iter().map(|a| vars.expand(a))),
                SUBTITLE_ARGS => args.extend(subtitle_template.iter().map(|a| vars.expand(a))),
                _ => args.push(vars.expand(arg)),
            }
        }

        EngineCommand {
            program: engine.program.clone(),
            args,
        }
    }
}

impl std::fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}
