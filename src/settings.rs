use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{HighlightError, Result};
use crate::model::EventName;

/// Pixel rectangle inside a 1920x1080 frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn ffmpeg_filter(&self) -> String {
        format!("crop={}:{}:{}:{}", self.width, self.height, self.x, self.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayRegions {
    pub timer: CropRegion,
    pub killfeed: CropRegion,
}

impl Default for OverlayRegions {
    fn default() -> Self {
        Self {
            timer: CropRegion {
                x: 910,
                y: 0,
                width: 100,
                height: 40,
            },
            killfeed: CropRegion {
                x: 1520,
                y: 180,
                width: 400,
                height: 300,
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub ocr_command: String,
    pub demo_parser_command: String,
    pub templates_dir: PathBuf,
    pub regions: BTreeMap<String, OverlayRegions>,
    pub default_regions: OverlayRegions,
    pub weights: BTreeMap<EventName, u32>,
    pub round_weight: u32,
    pub density_weight: u32,
    pub chunk_seconds: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            ocr_command: "paddleocr".to_string(),
            demo_parser_command: "demoparser".to_string(),
            templates_dir: PathBuf::from("data/templates"),
            regions: BTreeMap::new(),
            default_regions: OverlayRegions::default(),
            weights: BTreeMap::new(),
            round_weight: 0,
            density_weight: 0,
            chunk_seconds: 600,
        }
    }
}

impl PipelineSettings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw_json =
            std::fs::read_to_string(path).map_err(|error| HighlightError::io(path, error))?;
        serde_json::from_str(&raw_json).map_err(|error| HighlightError::Json {
            path: path.to_path_buf(),
            source: error,
        })
    }

    pub fn regions_for(&self, tournament: Option<&str>) -> OverlayRegions {
        tournament
            .and_then(|name| self.regions.get(name))
            .copied()
            .unwrap_or(self.default_regions)
    }
}
