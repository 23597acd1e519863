//! Job description and outcome.

use crate::config::Config;
use crate::dispatch::{DispatchPolicy, NotificationEvent, RetryPolicy};
use crate::geometry::{Area, Crs};
use crate::store::{DetectionId, RegionId, ReportId, ReportStatus};
use std::time::Duration;

/// One image to process against one report.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Raster source reference handed to the opener.
    pub image_ref: String,
    /// Report receiving the detections; must already exist.
    pub report_id: ReportId,
    /// Model reference handed to the model cache.
    pub model_ref: String,
    /// Minimum confidence, inclusive.
    pub min_confidence: f32,
    /// Rule regions to evaluate detections against.
    pub region_ids: Vec<RegionId>,
    /// Restricts the job to this area (target CRS); `None` covers the
    /// whole image.
    pub area_of_interest: Option<Area>,
}

/// Settings shared by all jobs run through one context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Tile edge length in pixels.
    pub tile_size: u32,
    /// Overlap between neighbouring tiles in pixels.
    pub overlap: u32,
    /// Concurrent inference workers per job.
    pub workers: usize,
    /// Deadline for one tile's inference.
    pub tile_timeout: Duration,
    /// CRS detection footprints are stored in.
    pub target_crs: Crs,
    /// Retry budgets for the dispatcher.
    pub dispatch: DispatchPolicy,
}

impl PipelineSettings {
    /// Build settings from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let backoff = Duration::from_millis(config.dispatch.backoff_ms);
        Self {
            tile_size: config.defaults.tile_size,
            overlap: config.defaults.overlap,
            workers: config.defaults.workers,
            tile_timeout: Duration::from_secs(config.defaults.tile_timeout_secs),
            target_crs: config.defaults.target_crs,
            dispatch: DispatchPolicy {
                insert: RetryPolicy::new(config.dispatch.insert_attempts, backoff),
                query: RetryPolicy::new(config.dispatch.query_attempts, backoff),
                delivery: RetryPolicy::new(config.dispatch.delivery_attempts, backoff),
            },
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Outcome of one job.
#[derive(Debug, Clone, Default)]
pub struct JobSummary {
    /// Report the job wrote to.
    pub report_id: ReportId,
    /// Terminal report status.
    pub status: ReportStatus,
    /// Tiles in the grid.
    pub tiles_total: usize,
    /// Tiles whose inference succeeded.
    pub tiles_processed: usize,
    /// Tiles skipped after a read, inference or timeout failure.
    pub tiles_skipped: usize,
    /// Tiles never read because they miss the area of interest.
    pub tiles_outside_area: usize,
    /// Detections persisted.
    pub detections_persisted: usize,
    /// Detections that could not be reprojected.
    pub dropped_reprojection: usize,
    /// Detections outside the image footprint.
    pub out_of_extent: usize,
    /// Detections outside the area of interest.
    pub outside_area: usize,
    /// Detections dropped after insert retries.
    pub insert_failures: usize,
    /// Region matches recorded.
    pub matches: usize,
    /// Detections whose rule evaluation never succeeded.
    pub deferred: Vec<DetectionId>,
    /// Notifications delivered.
    pub notifications_emitted: usize,
    /// Notifications that could not be delivered.
    pub undelivered: Vec<NotificationEvent>,
    /// Wall-clock time spent on the job.
    pub duration: Duration,
}

impl JobSummary {
    pub(crate) fn new(report_id: ReportId) -> Self {
        Self {
            report_id,
            ..Self::default()
        }
    }

    /// Whether the job ran to completion.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == ReportStatus::Completed
    }
}
