//! Coordinate reference systems and reprojection.
//!
//! Reprojection uses pure Rust (`proj4rs`) with PROJ strings taken from the
//! `crs-definitions` EPSG database.

use super::{Coord, Polygon};
use crate::error::{Error, Result};
use proj4rs::proj::Proj;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Coordinate reference system of a raster or of the detection store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// An EPSG-registered CRS.
    Epsg(u16),
    /// No CRS information in the source.
    Unknown,
}

impl Crs {
    /// WGS 84 geographic coordinates.
    pub const WGS84: Self = Self::Epsg(4326);

    /// PROJ string for this CRS, if known to the EPSG database.
    #[must_use]
    pub fn proj_string(self) -> Option<&'static str> {
        match self {
            Self::Epsg(code) => crs_definitions::from_code(code).map(|def| def.proj4),
            Self::Unknown => None,
        }
    }

    /// Whether coordinates in this CRS are longitude/latitude degrees.
    #[must_use]
    pub fn is_geographic(self) -> bool {
        self.proj_string()
            .is_some_and(|proj| proj.contains("+proj=longlat"))
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Epsg(code) => write!(f, "EPSG:{code}"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for Crs {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("unknown") {
            return Ok(Self::Unknown);
        }
        let code = trimmed
            .strip_prefix("EPSG:")
            .or_else(|| trimmed.strip_prefix("epsg:"))
            .unwrap_or(trimmed);
        code.parse::<u16>()
            .map(Self::Epsg)
            .map_err(|_| format!("'{s}' is not a CRS identifier (expected EPSG:<code>)"))
    }
}

impl TryFrom<String> for Crs {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

#[derive(Clone)]
enum Plan {
    Identity,
    Proj {
        source: Arc<Proj>,
        target: Arc<Proj>,
        source_geographic: bool,
        target_geographic: bool,
    },
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "Identity"),
            Self::Proj { source, target, .. } => {
                write!(f, "Proj({} -> {})", source.projname(), target.projname())
            }
        }
    }
}

/// Validated transformation between two CRSs.
///
/// Both projections are parsed once in [`Reprojector::new`]; clones share
/// them, so one reprojector serves every worker thread of a job.
#[derive(Debug, Clone)]
pub struct Reprojector {
    from: Crs,
    to: Crs,
    plan: Plan,
}

impl Reprojector {
    /// Check that `from -> to` is supported and prepare the transformation.
    pub fn new(from: Crs, to: Crs) -> Result<Self> {
        if from == to {
            return Ok(Self {
                from,
                to,
                plan: Plan::Identity,
            });
        }

        let source = from.proj_string().ok_or_else(|| unsupported(from, to, from))?;
        let target = to.proj_string().ok_or_else(|| unsupported(from, to, to))?;
        let parse = |definition: &str| {
            Proj::from_proj_string(definition).map_err(|e| Error::Reprojection {
                from: from.to_string(),
                to: to.to_string(),
                reason: format!("{e:?}"),
            })
        };

        Ok(Self {
            from,
            to,
            plan: Plan::Proj {
                source: Arc::new(parse(source)?),
                target: Arc::new(parse(target)?),
                source_geographic: from.is_geographic(),
                target_geographic: to.is_geographic(),
            },
        })
    }

    /// Source CRS.
    #[must_use]
    pub fn from(&self) -> Crs {
        self.from
    }

    /// Target CRS.
    #[must_use]
    pub fn to(&self) -> Crs {
        self.to
    }

    /// Whether the transformation is a no-op.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        matches!(self.plan, Plan::Identity)
    }

    fn apply(&self, coord: Coord) -> Result<Coord> {
        let Plan::Proj {
            source,
            target,
            source_geographic,
            target_geographic,
        } = &self.plan
        else {
            return Ok(coord);
        };

        // proj4rs works in radians for geographic systems
        let mut point = if *source_geographic {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        proj4rs::transform::transform(source, target, &mut point)
            .map_err(|e| self.error(format!("{e:?}")))?;

        let out = if *target_geographic {
            Coord::new(point.0.to_degrees(), point.1.to_degrees())
        } else {
            Coord::new(point.0, point.1)
        };
        if !out.x.is_finite() || !out.y.is_finite() {
            return Err(self.error(format!("non-finite result for ({}, {})", coord.x, coord.y)));
        }
        Ok(out)
    }

    /// Reproject a single coordinate.
    pub fn point(&self, coord: Coord) -> Result<Coord> {
        self.apply(coord)
    }

    /// Reproject every vertex of a polygon.
    pub fn polygon(&self, polygon: &Polygon) -> Result<Polygon> {
        if self.is_identity() {
            return Ok(polygon.clone());
        }
        polygon.try_map(|c| self.apply(c))
    }

    fn error(&self, reason: String) -> Error {
        Error::Reprojection {
            from: self.from.to_string(),
            to: self.to.to_string(),
            reason,
        }
    }
}

fn unsupported(from: Crs, to: Crs, missing: Crs) -> Error {
    Error::Reprojection {
        from: from.to_string(),
        to: to.to_string(),
        reason: format!("{missing} is not in the EPSG database"),
    }
}
