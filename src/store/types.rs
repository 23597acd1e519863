//! Persisted record types.

use crate::geometry::{Area, Polygon};
use crate::inference::BoxGeometry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                Self(v)
            }
        }
    };
}

id_type!(
    /// Identifier of a persisted detection.
    DetectionId
);
id_type!(
    /// Identifier of a report (one analysed image).
    ReportId
);
id_type!(
    /// Identifier of a rule region.
    RegionId
);

/// Processing state of a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReportStatus {
    /// Created, not yet picked up.
    #[default]
    Pending,
    /// A job is running for this report.
    Processing,
    /// Job finished (possibly with skipped tiles).
    Completed,
    /// Job aborted; `reason` is a stable reason code.
    Failed {
        /// Reason code such as `source_unreadable`.
        reason: String,
    },
    /// Job was cancelled before finishing.
    Cancelled,
}

impl ReportStatus {
    /// Whether no further transitions are expected.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. } | Self::Cancelled)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed { reason } => write!(f, "failed({reason})"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// An analysed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Report id.
    pub id: ReportId,
    /// Display name.
    pub name: String,
    /// Image reference the report was created for.
    pub image_ref: String,
    /// Image footprint in store CRS; `None` until the raster is opened.
    pub footprint: Option<Polygon>,
    /// Area the report is restricted to, in store CRS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_of_interest: Option<Area>,
    /// Current state.
    pub status: ReportStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last status or footprint change.
    pub updated_at: DateTime<Utc>,
}

/// A detection ready to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDetection {
    /// Owning report.
    pub report_id: ReportId,
    /// Class name.
    pub class_label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Geometry in absolute raster pixels.
    pub pixel_geometry: BoxGeometry,
    /// Closed footprint in store CRS.
    pub footprint: Polygon,
}

/// A persisted detection. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Detection id.
    pub id: DetectionId,
    /// Owning report.
    pub report_id: ReportId,
    /// Class name.
    pub class_label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Geometry in absolute raster pixels.
    pub pixel_geometry: BoxGeometry,
    /// Closed footprint in store CRS.
    pub footprint: Polygon,
    /// Insert time.
    pub created_at: DateTime<Utc>,
}

/// Non-spatial filters a region applies after the intersection test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConditions {
    /// Minimum confidence (inclusive).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f32>,
    /// Accepted class names; empty accepts all.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
}

impl RuleConditions {
    /// Whether a detection of `class_label` at `confidence` passes.
    #[must_use]
    pub fn accepts(&self, class_label: &str, confidence: f32) -> bool {
        let confident = self.min_confidence.is_none_or(|min| confidence >= min);
        let class_ok = self.classes.is_empty()
            || self
                .classes
                .iter()
                .any(|c| c.eq_ignore_ascii_case(class_label));
        confident && class_ok
    }
}

/// A user-defined area that triggers notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRegion {
    /// Region id.
    pub id: RegionId,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Area in store CRS; may have several disjoint parts.
    pub area: Area,
    /// Extra filters.
    #[serde(default)]
    pub conditions: RuleConditions,
}

/// A detection that matched a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Matching detection.
    pub detection_id: DetectionId,
    /// Matched region.
    pub region_id: RegionId,
    /// Report of the detection.
    pub report_id: ReportId,
}
