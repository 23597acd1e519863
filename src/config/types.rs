//! Configuration type definitions.

use crate::constants::{
    DEFAULT_CONCURRENT_JOBS, DEFAULT_MIN_CONFIDENCE, DEFAULT_MODEL_CACHE_CAPACITY, DEFAULT_OVERLAP,
    DEFAULT_TILE_SIZE, DEFAULT_TILE_TIMEOUT_SECS, DEFAULT_TILE_WORKERS, retry,
};
use crate::geometry::Crs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configured models by name.
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,

    /// Default job settings.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Store and notification retry settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Model cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Job queue settings.
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Configuration for a single detection model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the ONNX model file.
    pub path: PathBuf,

    /// Path to the labels file (one class name per line).
    pub labels: PathBuf,

    /// Detection head layout.
    #[serde(rename = "type", default)]
    pub model_type: ModelType,

    /// Square input edge; read from the model when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_size: Option<u32>,

    /// IoU threshold for non-maximum suppression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iou_threshold: Option<f32>,
}

/// Detection head layout of a model.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ModelType {
    /// Axis-aligned boxes (`[1, 4 + classes, anchors]`).
    #[default]
    Yolo,
    /// Oriented boxes with a trailing angle (`[1, 4 + classes + 1, anchors]`).
    YoloObb,
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yolo => write!(f, "yolo"),
            Self::YoloObb => write!(f, "yolo-obb"),
        }
    }
}

impl std::str::FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yolo" | "detect" => Ok(Self::Yolo),
            "yolo-obb" | "obb" => Ok(Self::YoloObb),
            other => Err(format!("unknown model type: {other}")),
        }
    }
}

/// Default job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Default model name to use.
    pub model: Option<String>,

    /// Minimum confidence threshold.
    pub min_confidence: f32,

    /// Tile edge length in pixels.
    pub tile_size: u32,

    /// Overlap between adjacent tiles in pixels.
    pub overlap: u32,

    /// Tiles inferred concurrently within one job.
    pub workers: usize,

    /// Per-tile inference deadline in seconds.
    pub tile_timeout_secs: u64,

    /// CRS that detection footprints are stored in.
    pub target_crs: Crs,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            model: None,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            tile_size: DEFAULT_TILE_SIZE,
            overlap: DEFAULT_OVERLAP,
            workers: DEFAULT_TILE_WORKERS,
            tile_timeout_secs: DEFAULT_TILE_TIMEOUT_SECS,
            target_crs: Crs::WGS84,
        }
    }
}

/// Retry settings for the store and notification sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Attempts for a spatial intersection query.
    pub query_attempts: u32,

    /// Attempts for a detection insert.
    pub insert_attempts: u32,

    /// Attempts for one notification emission.
    pub delivery_attempts: u32,

    /// Initial backoff in milliseconds, doubled per attempt.
    pub backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            query_attempts: retry::QUERY_ATTEMPTS,
            insert_attempts: retry::INSERT_ATTEMPTS,
            delivery_attempts: retry::DELIVERY_ATTEMPTS,
            backoff_ms: retry::BACKOFF_MS,
        }
    }
}

/// Model cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of models kept loaded.
    pub models: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            models: DEFAULT_MODEL_CACHE_CAPACITY,
        }
    }
}

/// Job queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Jobs run concurrently.
    pub concurrent_jobs: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrent_jobs: DEFAULT_CONCURRENT_JOBS,
        }
    }
}
