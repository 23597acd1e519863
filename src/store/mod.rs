//! Detection store contract and in-memory implementation.

mod memory;
mod types;

pub use memory::MemoryStore;
pub use types::{
    Detection, DetectionId, MatchRecord, NewDetection, RegionId, Report, ReportId, ReportStatus,
    RuleConditions, RuleRegion,
};

use crate::error::Result;
use crate::geometry::{Area, Polygon};

/// Durable storage for reports, detections, rule regions and matches.
///
/// All calls are synchronous: when `insert` returns, the detection is
/// visible to every other call. Pipelines call the store from blocking
/// threads.
pub trait DetectionStore: Send + Sync {
    /// Create a report in `pending` state.
    fn create_report(&self, name: &str, image_ref: &str) -> Result<ReportId>;

    /// Fetch a report.
    fn report(&self, id: ReportId) -> Result<Report>;

    /// Record the image footprint (store CRS).
    fn set_report_footprint(&self, id: ReportId, footprint: Polygon) -> Result<()>;

    /// Restrict the report to an area of interest (store CRS).
    fn set_report_area_of_interest(&self, id: ReportId, area: Area) -> Result<()>;

    /// Change the report state.
    fn set_report_status(&self, id: ReportId, status: ReportStatus) -> Result<()>;

    /// Persist a detection and return its new id.
    fn insert(&self, detection: NewDetection) -> Result<DetectionId>;

    /// Subset of `region_ids` whose area intersects `footprint`.
    ///
    /// Unknown ids never match.
    fn intersects(&self, region_ids: &[RegionId], footprint: &Polygon) -> Result<Vec<RegionId>>;

    /// Look up rule regions; unknown ids are omitted.
    fn rule_regions(&self, ids: &[RegionId]) -> Result<Vec<RuleRegion>>;

    /// Persist a match before its notification is emitted.
    fn record_match(&self, record: MatchRecord) -> Result<()>;

    /// All detections of a report in insertion order.
    fn detections_for_report(&self, id: ReportId) -> Result<Vec<Detection>>;

    /// All matches recorded for a report.
    fn matches_for_report(&self, id: ReportId) -> Result<Vec<MatchRecord>>;
}
