//! Thread-safe in-memory store.

use super::{
    Detection, DetectionId, DetectionStore, MatchRecord, NewDetection, RegionId, Report, ReportId,
    ReportStatus, RuleConditions, RuleRegion,
};
use crate::error::{Error, Result};
use crate::geometry::{Area, Polygon};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    next_report: u64,
    next_detection: u64,
    next_region: u64,
    reports: BTreeMap<ReportId, Report>,
    detections: BTreeMap<DetectionId, Detection>,
    regions: BTreeMap<RegionId, RuleRegion>,
    matches: Vec<MatchRecord>,
}

/// In-memory [`DetectionStore`] with monotonically increasing ids.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| Error::Store {
            reason: "store lock poisoned".to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| Error::Store {
            reason: "store lock poisoned".to_string(),
        })
    }

    /// Add a rule region with a freshly assigned id.
    pub fn add_rule_region(
        &self,
        name: Option<String>,
        area: impl Into<Area>,
        conditions: RuleConditions,
    ) -> Result<RegionId> {
        let mut inner = self.write()?;
        inner.next_region += 1;
        let id = RegionId(inner.next_region);
        inner.regions.insert(
            id,
            RuleRegion {
                id,
                name,
                area: area.into(),
                conditions,
            },
        );
        Ok(id)
    }

    /// Insert or replace a rule region under its own id.
    pub fn upsert_rule_region(&self, region: RuleRegion) -> Result<()> {
        let mut inner = self.write()?;
        inner.next_region = inner.next_region.max(region.id.0);
        inner.regions.insert(region.id, region);
        Ok(())
    }

    /// Number of persisted detections across all reports.
    pub fn detection_count(&self) -> Result<usize> {
        Ok(self.read()?.detections.len())
    }
}

impl DetectionStore for MemoryStore {
    fn create_report(&self, name: &str, image_ref: &str) -> Result<ReportId> {
        let mut inner = self.write()?;
        inner.next_report += 1;
        let id = ReportId(inner.next_report);
        let now = Utc::now();
        inner.reports.insert(
            id,
            Report {
                id,
                name: name.to_string(),
                image_ref: image_ref.to_string(),
                footprint: None,
                area_of_interest: None,
                status: ReportStatus::Pending,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    fn report(&self, id: ReportId) -> Result<Report> {
        self.read()?
            .reports
            .get(&id)
            .cloned()
            .ok_or(Error::ReportNotFound { id: id.0 })
    }

    fn set_report_footprint(&self, id: ReportId, footprint: Polygon) -> Result<()> {
        let mut inner = self.write()?;
        let report = inner
            .reports
            .get_mut(&id)
            .ok_or(Error::ReportNotFound { id: id.0 })?;
        report.footprint = Some(footprint);
        report.updated_at = Utc::now();
        Ok(())
    }

    fn set_report_area_of_interest(&self, id: ReportId, area: Area) -> Result<()> {
        let mut inner = self.write()?;
        let report = inner
            .reports
            .get_mut(&id)
            .ok_or(Error::ReportNotFound { id: id.0 })?;
        report.area_of_interest = Some(area);
        report.updated_at = Utc::now();
        Ok(())
    }

    fn set_report_status(&self, id: ReportId, status: ReportStatus) -> Result<()> {
        let mut inner = self.write()?;
        let report = inner
            .reports
            .get_mut(&id)
            .ok_or(Error::ReportNotFound { id: id.0 })?;
        report.status = status;
        report.updated_at = Utc::now();
        Ok(())
    }

    fn insert(&self, detection: NewDetection) -> Result<DetectionId> {
        let mut inner = self.write()?;
        if !inner.reports.contains_key(&detection.report_id) {
            return Err(Error::ReportNotFound {
                id: detection.report_id.0,
            });
        }
        inner.next_detection += 1;
        let id = DetectionId(inner.next_detection);
        inner.detections.insert(
            id,
            Detection {
                id,
                report_id: detection.report_id,
                class_label: detection.class_label,
                confidence: detection.confidence,
                pixel_geometry: detection.pixel_geometry,
                footprint: detection.footprint,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    fn intersects(&self, region_ids: &[RegionId], footprint: &Polygon) -> Result<Vec<RegionId>> {
        let inner = self.read()?;
        Ok(region_ids
            .iter()
            .filter_map(|id| inner.regions.get(id))
            .filter(|region| region.area.intersects(footprint))
            .map(|region| region.id)
            .collect())
    }

    fn rule_regions(&self, ids: &[RegionId]) -> Result<Vec<RuleRegion>> {
        let inner = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.regions.get(id).cloned())
            .collect())
    }

    fn record_match(&self, record: MatchRecord) -> Result<()> {
        self.write()?.matches.push(record);
        Ok(())
    }

    fn detections_for_report(&self, id: ReportId) -> Result<Vec<Detection>> {
        Ok(self
            .read()?
            .detections
            .values()
            .filter(|d| d.report_id == id)
            .cloned()
            .collect())
    }

    fn matches_for_report(&self, id: ReportId) -> Result<Vec<MatchRecord>> {
        Ok(self
            .read()?
            .matches
            .iter()
            .filter(|m| m.report_id == id)
            .copied()
            .collect())
    }
}
