//! Application-wide constants.
//!
//! All magic numbers and strings are defined here to ensure consistency
//! and make changes easy to track.

/// Application name used for config directories and user-facing messages.
pub const APP_NAME: &str = "oro";

/// Configuration file name inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "ORO_CONFIG";

/// Default minimum confidence threshold for detections.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.25;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Default overlap between adjacent tiles in pixels.
pub const DEFAULT_OVERLAP: u32 = 0;

/// Default number of tiles inferred concurrently within one job.
pub const DEFAULT_TILE_WORKERS: usize = 2;

/// Default number of jobs run concurrently by the job queue.
pub const DEFAULT_CONCURRENT_JOBS: usize = 1;

/// Default per-tile inference deadline in seconds.
pub const DEFAULT_TILE_TIMEOUT_SECS: u64 = 60;

/// Default number of models kept loaded by the model cache.
pub const DEFAULT_MODEL_CACHE_CAPACITY: usize = 2;

/// Maximum allowed tile edge length.
///
/// Tiles are held in memory as `f32` samples, so a 4096 tile of a 4-band
/// raster is already 256 MiB.
pub const MAX_TILE_SIZE: u32 = 4096;

/// Output file suffixes.
pub mod output_extensions {
    /// Detections GeoJSON suffix.
    pub const DETECTIONS: &str = ".detections.geojson";
    /// Notifications JSON Lines suffix.
    pub const NOTIFICATIONS: &str = ".notifications.jsonl";
}

/// Confidence value bounds.
pub mod confidence {
    /// Minimum valid confidence value.
    pub const MIN: f32 = 0.0;
    /// Maximum valid confidence value.
    pub const MAX: f32 = 1.0;
}

/// Retry defaults for store queries and notification delivery.
pub mod retry {
    /// Attempts for a spatial intersection query before deferring.
    pub const QUERY_ATTEMPTS: u32 = 3;
    /// Attempts for a detection insert before dropping the detection.
    pub const INSERT_ATTEMPTS: u32 = 3;
    /// Attempts for one notification emission before it goes to the outbox.
    pub const DELIVERY_ATTEMPTS: u32 = 3;
    /// Initial backoff between attempts in milliseconds (doubled per attempt).
    pub const BACKOFF_MS: u64 = 50;
}

/// ONNX detector defaults.
pub mod detector {
    /// Square model input edge when the model config does not specify one.
    pub const DEFAULT_INPUT_SIZE: u32 = 640;
    /// IoU above which overlapping boxes are suppressed.
    pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
    /// Letterbox padding value (normalised).
    pub const PAD_VALUE: f32 = 114.0 / 255.0;
}

/// GeoTIFF tag and key identifiers.
pub mod geotiff {
    /// `ModelPixelScaleTag`.
    pub const MODEL_PIXEL_SCALE: u16 = 33550;
    /// `ModelTiepointTag`.
    pub const MODEL_TIEPOINT: u16 = 33922;
    /// `ModelTransformationTag`.
    pub const MODEL_TRANSFORMATION: u16 = 34264;
    /// `GeoKeyDirectoryTag`.
    pub const GEO_KEY_DIRECTORY: u16 = 34735;
    /// `GTRasterTypeGeoKey`.
    pub const KEY_RASTER_TYPE: u16 = 1025;
    /// `GeographicTypeGeoKey`.
    pub const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
    /// `ProjectedCSTypeGeoKey`.
    pub const KEY_PROJECTED_TYPE: u16 = 3072;
    /// `RasterPixelIsPoint` value of the raster type key.
    pub const RASTER_PIXEL_IS_POINT: u16 = 2;
    /// User-defined marker value in the GeoKey directory.
    pub const USER_DEFINED: u16 = 32767;
    /// Upper bound on decoded strip/tile bytes kept per open raster.
    pub const CHUNK_CACHE_BYTES: usize = 256 * 1024 * 1024;
}

/// Channel sizing between pipeline stages.
pub mod channels {
    /// Decoded tiles buffered per inference worker.
    pub const TILES_PER_WORKER: usize = 2;

    /// Reconstructed detections buffered ahead of the dispatcher.
    pub const DETECTIONS: usize = 256;
}
