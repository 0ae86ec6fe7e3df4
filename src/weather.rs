//! Weather multipliers applied to edge traversal times.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::graph::{Edge, EdgeId, NetworkGraph};
use crate::haversine::Coordinate;

/// Inclusive lat/lng rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Coordinate,
    pub max: Coordinate,
}

impl BoundingBox {
    pub const fn new(min: Coordinate, max: Coordinate) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        (self.min.lat..=self.max.lat).contains(&point.lat)
            && (self.min.lng..=self.max.lng).contains(&point.lng)
    }

    /// Smallest box holding every node of `graph`, if it has any.
    pub fn around(graph: &NetworkGraph) -> Option<Self> {
        let mut points = graph.nodes().map(|node| node.coordinate);
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |bounds, point| Self {
            min: Coordinate::new(bounds.min.lat.min(point.lat), bounds.min.lng.min(point.lng)),
            max: Coordinate::new(bounds.max.lat.max(point.lat), bounds.max.lng.max(point.lng)),
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionImpact {
    pub bounds: BoundingBox,
    pub multiplier: f64,
}

/// Weather slowdown factors, per edge and per region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherImpact {
    pub per_edge: HashMap<EdgeId, f64>,
    pub regions: Vec<RegionImpact>,
}

impl WeatherImpact {
    pub fn is_empty(&self) -> bool {
        self.per_edge.is_empty() && self.regions.is_empty()
    }

    pub fn with_edge(mut self, edge: EdgeId, multiplier: f64) -> Self {
        self.per_edge.insert(edge, multiplier);
        self
    }

    pub fn with_region(mut self, bounds: BoundingBox, multiplier: f64) -> Self {
        self.regions.push(RegionImpact { bounds, multiplier });
        self
    }

    /// Region slowed down by observed `conditions`.
    pub fn with_region_conditions(self, bounds: BoundingBox, conditions: &WeatherConditions) -> Self {
        self.with_region(bounds, conditions.multiplier())
    }

    /// Raw multiplier for `edge`: the per-edge value wins, otherwise the
    /// strongest region holding the edge's source node. `None` when no data
    /// covers the edge.
    pub fn multiplier_for(&self, graph: &NetworkGraph, edge: &Edge) -> Option<f64> {
        if let Some(value) = self.per_edge.get(&edge.id) {
            return Some(*value);
        }

        let origin = graph.node(edge.from)?.coordinate;
        self.regions
            .iter()
            .filter(|region| region.bounds.contains(&origin))
            .map(|region| region.multiplier)
            .reduce(f64::max)
    }
}

/// Observed conditions, as reported by a weather feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherConditions {
    /// Meters.
    pub visibility: f64,
    /// Meters per second.
    pub wind_speed: f64,
    /// Millimeters per hour.
    pub precipitation: f64,
    /// Degrees Celsius.
    pub temperature: f64,
}

impl Default for WeatherConditions {
    fn default() -> Self {
        Self {
            visibility: 10_000.0,
            wind_speed: 0.0,
            precipitation: 0.0,
            temperature: 20.0,
        }
    }
}

impl WeatherConditions {
    /// Slowdown factor for these conditions, always `>= 1.0`.
    pub fn multiplier(&self) -> f64 {
        let mut multiplier = 1.0;
        if self.visibility < 5_000.0 {
            multiplier += 0.5;
        }
        if self.wind_speed > 15.0 {
            multiplier += 0.3;
        }
        if self.precipitation > 10.0 {
            multiplier += 0.8;
        }
        if self.temperature < 0.0 {
            multiplier += 0.4;
        }
        multiplier
    }
}
