//! Rule region loading from GeoJSON.
//!
//! Regions are read from a `FeatureCollection` of `Polygon` or
//! `MultiPolygon` features. Coordinates must already be in the job's
//! target CRS. Only the outer ring of each polygon is used; every polygon
//! of a `MultiPolygon` becomes one part of the region's area.
//!
//! The same reader loads a job's area of interest, given either as a bare
//! geometry or as a feature collection whose features are merged.

use crate::error::{Error, Result};
use crate::geometry::{Area, Coord, Polygon};
use crate::store::{RegionId, RuleConditions, RuleRegion};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Document {
    FeatureCollection { features: Vec<Feature> },
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    id: Option<FeatureId>,
    geometry: Geometry,
    #[serde(default)]
    properties: Properties,
}

/// GeoJSON allows numbers and strings as feature ids.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureId {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
enum Geometry {
    Polygon(Vec<Vec<[f64; 2]>>),
    MultiPolygon(Vec<Vec<Vec<[f64; 2]>>>),
}

#[derive(Debug, Default, Deserialize)]
struct Properties {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    min_confidence: Option<f32>,
    #[serde(default, alias = "object_types")]
    classes: Vec<String>,
}

/// Parse rule regions from GeoJSON text; `origin` names the source in errors.
///
/// Ids may be numbers or numeric strings and must be unique. Features
/// without an `id` are numbered by position starting at 1, skipping any
/// number another feature already claims.
pub fn parse_regions(json: &str, origin: &Path) -> Result<Vec<RuleRegion>> {
    let Document::FeatureCollection { features } =
        serde_json::from_str(json).map_err(|e| Error::RegionsParse {
            path: origin.to_path_buf(),
            source: e,
        })?;

    let invalid = |message: String| Error::RegionsInvalid {
        path: origin.to_path_buf(),
        message,
    };

    let mut explicit = Vec::with_capacity(features.len());
    let mut taken = HashSet::new();
    for (index, feature) in features.iter().enumerate() {
        let id = match &feature.id {
            None => None,
            Some(FeatureId::Number(n)) => Some(*n),
            Some(FeatureId::Text(text)) => Some(text.trim().parse::<u64>().map_err(|_| {
                invalid(format!(
                    "feature {} has non-numeric id {text:?}; region ids must be integers \
                     (use properties.name for labels)",
                    index + 1
                ))
            })?),
        };
        if let Some(id) = id
            && !taken.insert(id)
        {
            return Err(invalid(format!("region id {id} is used by more than one feature")));
        }
        explicit.push(id);
    }

    let mut regions = Vec::with_capacity(features.len());
    for ((index, feature), id) in features.into_iter().enumerate().zip(explicit) {
        let id = match id {
            Some(id) => id,
            None => {
                let mut candidate = index as u64 + 1;
                while taken.contains(&candidate) {
                    candidate += 1;
                }
                taken.insert(candidate);
                candidate
            }
        };
        regions.push(to_region(RegionId(id), feature)?);
    }
    Ok(regions)
}

fn outer_ring(rings: Vec<Vec<[f64; 2]>>) -> Result<Polygon> {
    let outer = rings.into_iter().next().ok_or_else(|| Error::InvalidGeometry {
        message: "polygon has no rings".to_string(),
    })?;
    Polygon::new(outer.into_iter().map(|[x, y]| Coord::new(x, y)).collect())
}

fn to_region(id: RegionId, feature: Feature) -> Result<RuleRegion> {
    let area = match feature.geometry {
        Geometry::Polygon(rings) => Area::from(outer_ring(rings)?),
        Geometry::MultiPolygon(polygons) => Area::new(
            polygons
                .into_iter()
                .map(outer_ring)
                .collect::<Result<Vec<_>>>()?,
        )?,
    };

    if let Some(min) = feature.properties.min_confidence
        && !(crate::constants::confidence::MIN..=crate::constants::confidence::MAX).contains(&min)
    {
        return Err(Error::InvalidGeometry {
            message: format!("region {id} has min_confidence {min} outside [0, 1]"),
        });
    }

    Ok(RuleRegion {
        id,
        name: feature.properties.name,
        area,
        conditions: RuleConditions {
            min_confidence: feature.properties.min_confidence,
            classes: feature.properties.classes,
        },
    })
}

/// Either shape an area-of-interest file may take.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AreaDocument {
    Geometry(Geometry),
    Collection(Document),
}

/// Parse an area of interest from GeoJSON text.
pub fn parse_area(json: &str, origin: &Path) -> Result<Area> {
    let document: AreaDocument = serde_json::from_str(json).map_err(|e| Error::RegionsParse {
        path: origin.to_path_buf(),
        source: e,
    })?;
    let geometries = match document {
        AreaDocument::Geometry(geometry) => vec![geometry],
        AreaDocument::Collection(Document::FeatureCollection { features }) => {
            features.into_iter().map(|f| f.geometry).collect()
        }
    };

    let mut parts = Vec::new();
    for geometry in geometries {
        match geometry {
            Geometry::Polygon(rings) => parts.push(outer_ring(rings)?),
            Geometry::MultiPolygon(polygons) => {
                for rings in polygons {
                    parts.push(outer_ring(rings)?);
                }
            }
        }
    }
    Area::new(parts).map_err(|_| Error::RegionsInvalid {
        path: origin.to_path_buf(),
        message: "area of interest has no polygons".to_string(),
    })
}

/// Load an area of interest from a GeoJSON file.
pub fn load_area(path: &Path) -> Result<Area> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::RegionsRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_area(&contents, path)
}

/// Load rule regions from a GeoJSON file.
pub fn load_regions(path: &Path) -> Result<Vec<RuleRegion>> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::RegionsRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_regions(&contents, path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const HARBOUR: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "id": 7,
                "properties": { "name": "harbour", "classes": ["ship"], "min_confidence": 0.5 },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]]]
                }
            },
            {
                "type": "Feature",
                "properties": {},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [
                        [[20, 20], [30, 20], [30, 30], [20, 20]],
                        [[22, 22], [23, 22], [23, 23], [22, 22]]
                    ]
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_feature_collection() {
        let regions = parse_regions(HARBOUR, Path::new("inline")).unwrap();
        assert_eq!(regions.len(), 2);

        assert_eq!(regions[0].id, RegionId(7));
        assert_eq!(regions[0].name.as_deref(), Some("harbour"));
        assert_eq!(regions[0].conditions.classes, vec!["ship".to_string()]);
        assert_eq!(regions[0].conditions.min_confidence, Some(0.5));

        // unnamed feature numbered by position
        assert_eq!(regions[1].id, RegionId(2));
        assert!(regions[1].conditions.accepts("anything", 0.01));
    }

    #[test]
    fn test_rejects_non_polygon_geometry() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"Point","coordinates":[1,2]}}
        ]}"#;
        let err = parse_regions(json, Path::new("inline")).unwrap_err();
        assert!(matches!(err, Error::RegionsParse { .. }));
    }

    #[test]
    fn test_rejects_degenerate_ring() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"Polygon","coordinates":[[[0,0],[1,1]]]}}
        ]}"#;
        let result = parse_regions(json, Path::new("inline"));
        assert!(matches!(result, Err(Error::InvalidGeometry { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_regions(&dir.path().join("missing.geojson")).unwrap_err();
        assert!(matches!(err, Error::RegionsRead { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.geojson");
        std::fs::write(&path, HARBOUR).unwrap();
        assert_eq!(load_regions(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_multipolygon_parts_all_count() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","id":3,"properties":{"name":"twin basins"},"geometry":{
                "type":"MultiPolygon",
                "coordinates":[
                    [[[0,0],[1,0],[1,1],[0,1],[0,0]]],
                    [[[5,5],[6,5],[6,6],[5,6],[5,5]]]
                ]
            }}
        ]}"#;
        let regions = parse_regions(json, Path::new("inline")).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].id, RegionId(3));
        assert_eq!(regions[0].area.parts().len(), 2);
        assert!(regions[0].area.intersects(&Polygon::rectangle(5.5, 5.5, 7.0, 7.0)));
        assert!(!regions[0].area.intersects(&Polygon::rectangle(2.0, 2.0, 3.0, 3.0)));
    }

    #[test]
    fn test_empty_multipolygon_is_rejected() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"MultiPolygon","coordinates":[]}}
        ]}"#;
        let result = parse_regions(json, Path::new("inline"));
        assert!(matches!(result, Err(Error::InvalidGeometry { .. })));
    }

    #[test]
    fn test_positional_id_skips_explicitly_claimed_number() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","id":2,"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
            {"type":"Feature","geometry":{"type":"Polygon","coordinates":[[[5,5],[6,5],[6,6],[5,5]]]}}
        ]}"#;
        let regions = parse_regions(json, Path::new("inline")).unwrap();
        assert_eq!(regions[0].id, RegionId(2));
        assert_eq!(regions[1].id, RegionId(3));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","id":4,"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
            {"type":"Feature","id":"4","geometry":{"type":"Polygon","coordinates":[[[5,5],[6,5],[6,6],[5,5]]]}}
        ]}"#;
        let err = parse_regions(json, Path::new("inline")).unwrap_err();
        assert!(matches!(err, Error::RegionsInvalid { .. }));
        assert!(err.to_string().contains("region id 4"));
    }

    #[test]
    fn test_string_ids() {
        let numeric = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","id":"12","geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}
        ]}"#;
        let regions = parse_regions(numeric, Path::new("inline")).unwrap();
        assert_eq!(regions[0].id, RegionId(12));

        let named = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","id":"harbour","geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}
        ]}"#;
        let err = parse_regions(named, Path::new("inline")).unwrap_err();
        assert!(matches!(err, Error::RegionsInvalid { .. }));
        assert!(err.to_string().contains("harbour"));
    }

    #[test]
    fn test_object_types_is_accepted_for_classes() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"object_types":["Vessel"]},
             "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}
        ]}"#;
        let regions = parse_regions(json, Path::new("inline")).unwrap();
        assert_eq!(regions[0].conditions.classes, vec!["Vessel".to_string()]);
        assert!(regions[0].conditions.accepts("vessel", 0.3));
        assert!(!regions[0].conditions.accepts("plane", 0.3));
    }

    #[test]
    fn test_area_from_bare_geometry() {
        let json = r#"{"type":"Polygon","coordinates":[[[0,0],[4,0],[4,4],[0,4],[0,0]]]}"#;
        let area = parse_area(json, Path::new("inline")).unwrap();
        assert_eq!(area.parts().len(), 1);
        assert!(area.intersects(&Polygon::rectangle(1.0, 1.0, 2.0, 2.0)));
    }

    #[test]
    fn test_area_merges_collection_features() {
        let area = parse_area(HARBOUR, Path::new("inline")).unwrap();
        assert_eq!(area.parts().len(), 2);
        assert!(area.intersects(&Polygon::rectangle(25.0, 21.0, 26.0, 22.0)));
    }

    #[test]
    fn test_empty_area_collection_is_rejected() {
        let json = r#"{"type":"FeatureCollection","features":[]}"#;
        let err = parse_area(json, Path::new("inline")).unwrap_err();
        assert!(matches!(err, Error::RegionsInvalid { .. }));
    }
}
