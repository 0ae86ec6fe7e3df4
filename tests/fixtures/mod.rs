//! Road network fixtures shared by the integration tests.
//!
//! Coordinates sit around lower Manhattan; travel times are in seconds.

#![allow(dead_code)]

use rescue_router::haversine::Coordinate;
use rescue_router::{Edge, EdgeId, NetworkGraph, Node, NodeId};

/// Builds graphs with two-way roads and sequential edge ids.
pub struct RoadBuilder {
    graph: NetworkGraph,
    next_edge: u64,
}

impl RoadBuilder {
    pub fn new() -> Self {
        Self {
            graph: NetworkGraph::new(),
            next_edge: 1,
        }
    }

    pub fn node(mut self, id: u64, lat: f64, lng: f64) -> Self {
        self.graph
            .add_node(Node::new(NodeId(id), Coordinate::new(lat, lng)))
            .unwrap();
        self
    }

    /// Adds `a -> b` and `b -> a`, returning their edge ids in that order.
    pub fn road(&mut self, a: u64, b: u64, seconds: f64) -> (EdgeId, EdgeId) {
        let forward = EdgeId(self.next_edge);
        let backward = EdgeId(self.next_edge + 1);
        self.next_edge += 2;
        self.graph
            .add_or_update_edge(Edge::new(forward, NodeId(a), NodeId(b), seconds))
            .unwrap();
        self.graph
            .add_or_update_edge(Edge::new(backward, NodeId(b), NodeId(a), seconds))
            .unwrap();
        (forward, backward)
    }

    pub fn build(self) -> NetworkGraph {
        self.graph
    }
}

pub const A: u64 = 1;
pub const B: u64 = 2;
pub const C: u64 = 3;
pub const D: u64 = 4;

/// Line A - B - C with a side loop A - D - B. All roads take 10 s.
///
/// Returns the graph and the two directed edges of road A - B.
pub fn detour_network() -> (NetworkGraph, (EdgeId, EdgeId)) {
    let mut builder = RoadBuilder::new()
        .node(A, 40.7000, -74.0100)
        .node(B, 40.7010, -74.0100)
        .node(C, 40.7020, -74.0100)
        .node(D, 40.7005, -74.0090);
    let a_b = builder.road(A, B, 10.0);
    builder.road(B, C, 10.0);
    builder.road(A, D, 10.0);
    builder.road(D, B, 10.0);
    (builder.build(), a_b)
}

/// `n` x `n` street grid; node id is `row * n + col`.
pub fn city_grid(n: u64) -> NetworkGraph {
    let mut builder = RoadBuilder::new();
    for row in 0..n {
        for col in 0..n {
            builder = builder.node(row * n + col, 40.70 + row as f64 * 0.005, -74.02 + col as f64 * 0.005);
        }
    }
    for row in 0..n {
        for col in 0..n {
            let id = row * n + col;
            let seconds = 60.0 + 5.0 * ((row * 7 + col * 3) % 4) as f64;
            if col + 1 < n {
                builder.road(id, id + 1, seconds);
            }
            if row + 1 < n {
                builder.road(id, id + n, seconds);
            }
        }
    }
    builder.build()
}

/// Hub node 0 with a two-way spoke of `seconds` to each node `1..=len`.
pub fn star(spokes: &[f64]) -> NetworkGraph {
    let mut builder = RoadBuilder::new().node(0, 40.70, -74.00);
    for (i, _) in spokes.iter().enumerate() {
        let id = i as u64 + 1;
        builder = builder.node(id, 40.70 + 0.002 * id as f64, -74.00);
    }
    for (i, seconds) in spokes.iter().enumerate() {
        builder.road(0, i as u64 + 1, *seconds);
    }
    builder.build()
}
