use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::tracker::TrackerParams;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Both,
}

impl OutputFormat {
    pub fn includes_text(&self) -> bool {
        matches!(self, OutputFormat::Text | OutputFormat::Both)
    }

    pub fn includes_json(&self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Both)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Frame reports land here as one JSON document; stdout otherwise.
    pub json_out: Option<PathBuf>,
    /// Directory receiving a per-frame id raster PNG.
    pub raster_dir: Option<PathBuf>,
}

/// Synthetic turntable scene rendered by the demo.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneConfig {
    pub width: u32,
    pub height: u32,
    pub frames: usize,
    /// Rotation applied between frames, in radians.
    pub spin_step: f64,
    /// Radial resolution of the demo tube mesh.
    pub segments: usize,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            frames: 8,
            spin_step: 0.05,
            segments: 24,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    pub scene: SceneConfig,
    pub output: OutputConfig,
    pub tracker: TrackerParams,
}

pub fn load_config(path: &Path) -> Result<RuntimeConfig, String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    let config: RuntimeConfig = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))?;
    Ok(config)
}

/// Parse the demo command line: an optional config path, defaults when
/// absent.
pub fn parse_cli(program: &str) -> Result<RuntimeConfig, String> {
    let mut args = env::args().skip(1);
    match args.next() {
        None => Ok(RuntimeConfig::default()),
        Some(flag) if flag == "-h" || flag == "--help" => {
            Err(format!("Usage: {program} [config.json]"))
        }
        Some(path) => load_config(Path::new(&path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config: RuntimeConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(config.scene.width, 640);
        assert_eq!(config.scene.frames, 8);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert!(config.output.json_out.is_none());
        assert_eq!(config.tracker.propagation.max_steps, 6);
    }

    #[test]
    fn nested_tracker_overrides_apply() {
        let text = r#"{
            "scene": {"frames": 3, "spinStep": 0.1},
            "output": {"format": "both"},
            "tracker": {"visSamplingPix": 4.0}
        }"#;
        let config: RuntimeConfig = serde_json::from_str(text).expect("parse");
        assert_eq!(config.scene.frames, 3);
        assert!(config.output.format.includes_json());
        assert!(config.output.format.includes_text());
        assert!((config.tracker.vis_sampling_pix - 4.0).abs() < 1e-12);
        assert_eq!(config.scene.segments, 24);
    }
}
