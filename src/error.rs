//! Error types for oro.

/// Result type alias for oro operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for oro.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration directory could not be determined.
    #[error("could not determine configuration directory for this platform")]
    ConfigDirNotFound,

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// Failed to write configuration file.
    #[error("failed to write config file '{path}'")]
    ConfigWrite {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize configuration.
    #[error("failed to serialize config")]
    ConfigSerialize {
        /// Underlying serialization error.
        #[source]
        source: toml::ser::Error,
    },

    /// Model reference could not be resolved.
    #[error("model '{name}' not found")]
    ModelNotFound {
        /// Name of the missing model.
        name: String,
    },

    /// A model with this name is already configured.
    #[error("model '{name}' already exists in configuration")]
    ModelAlreadyExists {
        /// Name of the existing model.
        name: String,
    },

    /// Model file does not exist.
    #[error("model file does not exist: {path}")]
    ModelFileNotFound {
        /// Path to the missing model file.
        path: std::path::PathBuf,
    },

    /// Labels file does not exist.
    #[error("labels file does not exist: {path}")]
    LabelsFileNotFound {
        /// Path to the missing labels file.
        path: std::path::PathBuf,
    },

    /// Model was resolved but could not be loaded.
    #[error("model '{name}' is unavailable: {reason}")]
    ModelUnavailable {
        /// Name of the model.
        name: String,
        /// Description of the load failure.
        reason: String,
    },

    /// Raster source could not be opened or read.
    #[error("raster source '{source_ref}' is unreadable: {reason}")]
    SourceUnreadable {
        /// Image reference that failed.
        source_ref: String,
        /// Description of the failure.
        reason: String,
    },

    /// A pixel window could not be read from the raster.
    #[error("failed to read window at ({col}, {row}): {reason}")]
    TileRead {
        /// Column offset of the window.
        col: u32,
        /// Row offset of the window.
        row: u32,
        /// Description of the failure.
        reason: String,
    },

    /// Inference failed.
    #[error("inference failed: {reason}")]
    Inference {
        /// Description of the inference failure.
        reason: String,
    },

    /// Inference did not finish within the per-tile deadline.
    #[error("inference timed out after {millis}ms")]
    InferenceTimeout {
        /// Deadline in milliseconds.
        millis: u64,
    },

    /// Geometry cannot be reprojected between the given CRS pair.
    #[error("cannot reproject from {from} to {to}: {reason}")]
    Reprojection {
        /// Source CRS.
        from: String,
        /// Target CRS.
        to: String,
        /// Description of the failure.
        reason: String,
    },

    /// Geometry is malformed.
    #[error("invalid geometry: {message}")]
    InvalidGeometry {
        /// Description of the problem.
        message: String,
    },

    /// Store insert or update failed.
    #[error("store operation failed: {reason}")]
    Store {
        /// Description of the failure.
        reason: String,
    },

    /// Spatial intersection query failed.
    #[error("spatial query failed: {reason}")]
    StoreQuery {
        /// Description of the failure.
        reason: String,
    },

    /// Report does not exist in the store.
    #[error("report {id} not found")]
    ReportNotFound {
        /// Missing report id.
        id: u64,
    },

    /// Notification could not be delivered.
    #[error("notification delivery failed: {reason}")]
    Delivery {
        /// Description of the failure.
        reason: String,
    },

    /// Failed to read a rule region file.
    #[error("failed to read rule regions file '{path}'")]
    RegionsRead {
        /// Path to the regions file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a rule region file.
    #[error("failed to parse rule regions file '{path}'")]
    RegionsParse {
        /// Path to the regions file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Rule region file parsed but its contents are unusable.
    #[error("invalid rule regions file '{path}': {message}")]
    RegionsInvalid {
        /// Path to the regions file.
        path: std::path::PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// Failed to write JSON output file.
    #[error("failed to write JSON output file '{path}'")]
    JsonWrite {
        /// Path to the JSON file.
        path: std::path::PathBuf,
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// Some images could not be processed.
    #[error("{failed} of {total} image(s) failed")]
    JobsFailed {
        /// Images whose job failed.
        failed: usize,
        /// Images submitted.
        total: usize,
    },

    /// The job queue no longer accepts work.
    #[error("job queue is closed")]
    QueueClosed,

    /// Internal error (for unexpected failures).
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Stable reason code reported for job-level failures.
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::SourceUnreadable { .. } | Self::TileRead { .. } => "source_unreadable",
            Self::ModelNotFound { .. } => "model_not_found",
            Self::ModelUnavailable { .. }
            | Self::ModelFileNotFound { .. }
            | Self::LabelsFileNotFound { .. } => "model_unavailable",
            Self::Inference { .. } | Self::InferenceTimeout { .. } => "inference_error",
            Self::Reprojection { .. } => "reprojection_error",
            Self::Store { .. } | Self::StoreQuery { .. } | Self::ReportNotFound { .. } => {
                "store_error"
            }
            Self::Delivery { .. } => "delivery_error",
            Self::InvalidGeometry { .. } => "invalid_geometry",
            Self::ConfigDirNotFound
            | Self::ConfigRead { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigValidation { .. }
            | Self::ConfigWrite { .. }
            | Self::ConfigSerialize { .. }
            | Self::ModelAlreadyExists { .. } => "config_error",
            Self::Io(_)
            | Self::RegionsRead { .. }
            | Self::RegionsParse { .. }
            | Self::RegionsInvalid { .. }
            | Self::JsonWrite { .. }
            | Self::JobsFailed { .. }
            | Self::QueueClosed
            | Self::Internal { .. } => "internal",
        }
    }
}
