//! Stop-to-stop leg table computed from a cost model.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::cost::CostModel;
use crate::error::GraphError;
use crate::graph::{EdgeId, NetworkGraph, NodeId};

/// Cheapest drive between two stop locations.
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    /// Penalized cost, including closure penalties.
    pub cost: f64,
    /// Expected seconds on the road.
    pub travel_time: f64,
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
}

/// Dense table of legs between every pair of locations.
#[derive(Debug, Clone)]
pub struct LegTable {
    index: HashMap<NodeId, usize>,
    legs: Vec<Vec<Option<Leg>>>,
}

impl LegTable {
    /// Runs one Dijkstra per distinct location, in parallel.
    pub fn build(graph: &NetworkGraph, costs: &CostModel, locations: &[NodeId]) -> Result<Self, GraphError> {
        let unique = dedupe_locations(locations);
        let index: HashMap<NodeId, usize> = unique.iter().enumerate().map(|(i, node)| (*node, i)).collect();

        let legs = unique
            .par_iter()
            .map(|source| -> Result<Vec<Option<Leg>>, GraphError> {
                let tree = graph.shortest_path_tree(*source, |edge| costs.cost(edge.id))?;
                Ok(unique
                    .iter()
                    .map(|target| {
                        tree.path_to(graph, *target).map(|path| Leg {
                            cost: path.cost,
                            travel_time: path.edges.iter().map(|edge| costs.travel_time(*edge)).sum(),
                            nodes: path.nodes,
                            edges: path.edges,
                        })
                    })
                    .collect())
            })
            .collect::<Result<Vec<_>, GraphError>>()?;

        Ok(Self { index, legs })
    }

    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        self.index.get(&node).copied()
    }

    /// Cost between two location indices, infinite when unreachable.
    pub fn cost(&self, from: usize, to: usize) -> f64 {
        self.legs
            .get(from)
            .and_then(|row| row.get(to))
            .and_then(Option::as_ref)
            .map_or(f64::INFINITY, |leg| leg.cost)
    }

    pub fn leg_between(&self, from: NodeId, to: NodeId) -> Option<&Leg> {
        let from = self.index_of(from)?;
        let to = self.index_of(to)?;
        self.legs.get(from)?.get(to)?.as_ref()
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }
}

fn dedupe_locations(locations: &[NodeId]) -> Vec<NodeId> {
    let mut unique = Vec::with_capacity(locations.len());
    for location in locations {
        if !unique.contains(location) {
            unique.push(*location);
        }
    }
    unique
}
