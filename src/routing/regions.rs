//! Denied-region index.
//!
//! Stores named polygons with their regulatory flags and answers point and
//! segment queries against them. Regions are loaded once before any query
//! and never change afterwards, so the index is shared read-only
//! (`Arc<GeoRegionIndex>`) between the graph store and anything else that
//! needs it.

use serde::Deserialize;
use std::collections::HashMap;

use super::geometry::{Point, point_in_polygon, sample_segment, segment_intersects_polygon};

/// How segment crossings are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossingMode {
    /// 21 equally spaced samples along the segment.
    #[default]
    Sampled,
    /// Samples first, then exact boundary intersection for anything the samples missed.
    Exact,
}

/// Regulatory attributes of a region.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RegionConstraints {
    #[serde(default)]
    pub no_transmission: bool,
    #[serde(default)]
    pub no_overflight: bool,
    #[serde(default)]
    pub limited_frequency: bool,
    /// Allowed bands as (low MHz, high MHz).
    #[serde(default)]
    pub frequency_limits: Vec<(f64, f64)>,
}

/// Region as it appears in scenario files: polygon vertices as `[lat, lon]`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionDefinition {
    pub name: String,
    pub polygon: Vec<(f64, f64)>,
    #[serde(flatten)]
    pub constraints: RegionConstraints,
}

#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub polygon: Vec<Point>,
    pub constraints: RegionConstraints,
}

/// Outcome of a point query. `region_name` is set iff `in_region`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionHit {
    pub in_region: bool,
    pub region_name: Option<String>,
}

/// Outcome of a segment query. `region_name` is set iff `crosses`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentCrossing {
    pub crosses: bool,
    pub region_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionLoadError {
    DuplicateName(String),
    EmptyName,
}

impl std::fmt::Display for RegionLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionLoadError::DuplicateName(name) => write!(f, "Duplicate region name: {}", name),
            RegionLoadError::EmptyName => write!(f, "Region name must not be empty"),
        }
    }
}

impl std::error::Error for RegionLoadError {}

/// Named polygon regions, queried in insertion order.
#[derive(Debug, Default)]
pub struct GeoRegionIndex {
    regions: Vec<Region>,
    by_name: HashMap<String, usize>,
    crossing_mode: CrossingMode,
}

impl GeoRegionIndex {
    pub fn new(crossing_mode: CrossingMode) -> Self {
        Self {
            regions: Vec::new(),
            by_name: HashMap::new(),
            crossing_mode,
        }
    }

    /// Build an index from scenario definitions, keeping their order.
    pub fn from_definitions(definitions: Vec<RegionDefinition>, crossing_mode: CrossingMode) -> Result<Self, RegionLoadError> {
        let mut index = Self::new(crossing_mode);
        for definition in definitions {
            index.add_region(definition)?;
        }
        Ok(index)
    }

    /// Register a region. Names are stored lowercase and must be unique.
    pub fn add_region(&mut self, definition: RegionDefinition) -> Result<(), RegionLoadError> {
        let name = definition.name.trim().to_lowercase();
        if name.is_empty() {
            return Err(RegionLoadError::EmptyName);
        }
        if self.by_name.contains_key(&name) {
            return Err(RegionLoadError::DuplicateName(name));
        }
        if definition.polygon.len() < 3 {
            log::warn!("Region {} has {} vertices and will never match", name, definition.polygon.len());
        }

        let polygon = definition.polygon.iter().map(|&(lat, lon)| Point::from_lat_lon(lat, lon)).collect();
        self.by_name.insert(name.clone(), self.regions.len());
        self.regions.push(Region {
            name,
            polygon,
            constraints: definition.constraints,
        });
        Ok(())
    }

    pub fn crossing_mode(&self) -> CrossingMode {
        self.crossing_mode
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// First region (in insertion order) containing the point.
    pub fn is_point_in_region(&self, lat: f64, lon: f64) -> RegionHit {
        let point = Point::from_lat_lon(lat, lon);
        self.first_region_containing(&point)
            .map(|region| RegionHit {
                in_region: true,
                region_name: Some(region.name.clone()),
            })
            .unwrap_or_default()
    }

    /// Whether the lat/lon segment between two positions enters any region.
    ///
    /// Samples the segment at t = 0, 1/20, ..., 1 and reports the region of
    /// the first sample that falls inside one. In `CrossingMode::Exact`, a
    /// segment no sample caught is also tested against every polygon boundary.
    pub fn does_segment_cross_region(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> SegmentCrossing {
        let a = Point::from_lat_lon(lat1, lon1);
        let b = Point::from_lat_lon(lat2, lon2);

        for sample in sample_segment(&a, &b) {
            if let Some(region) = self.first_region_containing(&sample) {
                return SegmentCrossing {
                    crosses: true,
                    region_name: Some(region.name.clone()),
                };
            }
        }

        if self.crossing_mode == CrossingMode::Exact {
            if let Some(region) = self.regions.iter().find(|r| segment_intersects_polygon(&a, &b, &r.polygon)) {
                return SegmentCrossing {
                    crosses: true,
                    region_name: Some(region.name.clone()),
                };
            }
        }

        SegmentCrossing::default()
    }

    /// Constraints for a region, looked up case-insensitively.
    pub fn get_region_constraints(&self, region_name: &str) -> Option<&RegionConstraints> {
        let key = region_name.to_lowercase();
        self.by_name.get(&key).map(|&i| &self.regions[i].constraints)
    }

    /// Names of every region the segment enters, in insertion order.
    ///
    /// Uses the same samples (and, in `CrossingMode::Exact`, the same
    /// boundary test) as `does_segment_cross_region`, but does not stop at
    /// the first hit. The result does not depend on which end is passed first.
    pub fn regions_crossed_by_segment(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Vec<&str> {
        let a = Point::from_lat_lon(lat1, lon1);
        let b = Point::from_lat_lon(lat2, lon2);
        let samples: Vec<Point> = sample_segment(&a, &b).collect();

        self.regions
            .iter()
            .filter(|region| {
                samples.iter().any(|p| point_in_polygon(p, &region.polygon))
                    || (self.crossing_mode == CrossingMode::Exact && segment_intersects_polygon(&a, &b, &region.polygon))
            })
            .map(|region| region.name.as_str())
            .collect()
    }

    fn first_region_containing(&self, point: &Point) -> Option<&Region> {
        self.regions.iter().find(|r| point_in_polygon(point, &r.polygon))
    }
}
