use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
}

impl ClassifierConfig {
    pub fn new() -> Self {
        ClassifierConfig {
            model_path: PathBuf::from("models/model.bin"),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings forwarded to the landmark estimator the host runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EstimatorConfig {
    pub detection_confidence: f32,
    pub tracking_confidence: f32,
    pub max_hands: usize,
    pub max_faces: usize,
}

impl EstimatorConfig {
    pub fn new() -> Self {
        EstimatorConfig {
            detection_confidence: 0.5,
            tracking_confidence: 0.5,
            max_hands: 2,
            max_faces: 1,
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateConfig {
    /// Predictions below this are demoted to the idle label. Range [0, 1].
    pub confidence_threshold: f32,
    /// Reserved label treated as "no gesture".
    pub idle_label: String,
}

impl GateConfig {
    pub fn new() -> Self {
        GateConfig {
            confidence_threshold: 0.5,
            idle_label: "binh_thuong".to_string(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeechEngineKind {
    Offline,
    OnlineVietnamese,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub engine: SpeechEngineKind,
    pub min_interval_secs: f32,
}

impl SpeechConfig {
    pub fn new() -> Self {
        SpeechConfig {
            enabled: false,
            engine: SpeechEngineKind::Offline,
            min_interval_secs: 2.0,
        }
    }

    /// Narration interval as a Duration, clamped to non-negative.
    pub fn min_interval(&self) -> Duration {
        let secs = if self.min_interval_secs.is_finite() {
            self.min_interval_secs.max(0.0)
        } else {
            0.0
        };
        Duration::from_secs_f32(secs)
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON config file; absent fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("config - cannot read {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("config - cannot parse {}", path.display()))?;
        Ok(config)
    }
}
