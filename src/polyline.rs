//! Polyline representation for route geometries.
//!
//! Routes carry their driven geometry as decoded coordinates taken from the
//! network nodes. Encoding into a compact wire format is left to callers.

use serde::{Deserialize, Serialize};

use crate::graph::{NetworkGraph, NodeId};
use crate::haversine::{self, Coordinate};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Coordinate>,
}

impl Polyline {
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self { points }
    }

    /// Geometry of a node path. Nodes missing from `graph` are skipped.
    pub fn from_nodes(graph: &NetworkGraph, nodes: &[NodeId]) -> Self {
        let points = nodes
            .iter()
            .filter_map(|id| graph.node(*id))
            .map(|node| node.coordinate)
            .collect();
        Self { points }
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Coordinate> {
        self.points
    }

    pub fn length_km(&self) -> f64 {
        haversine::path_length_km(&self.points)
    }
}
