//! Directed road network with closure state and shortest-path queries.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GraphError;
use crate::haversine::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub u64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub coordinate: Coordinate,
}

impl Node {
    pub const fn new(id: NodeId, coordinate: Coordinate) -> Self {
        Self { id, coordinate }
    }
}

/// A directed road segment. Two-way roads are stored as two edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    /// Free-flow traversal time in seconds.
    pub base_time: f64,
    /// Road capacity or width, when known.
    pub capacity: Option<f64>,
    /// Historical traffic load in `0..=1`, forwarded to the delay predictor.
    pub historical_load: Option<f64>,
    pub closed: bool,
}

impl Edge {
    pub fn new(id: EdgeId, from: NodeId, to: NodeId, base_time: f64) -> Self {
        Self {
            id,
            from,
            to,
            base_time,
            capacity: None,
            historical_load: None,
            closed: false,
        }
    }

    pub fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_historical_load(mut self, load: f64) -> Self {
        self.historical_load = Some(load);
        self
    }

    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }
}

/// A resolved route through the network.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkStats {
    pub nodes: usize,
    pub edges: usize,
    pub closed_edges: usize,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkGraph {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    outgoing: BTreeMap<NodeId, Vec<EdgeId>>,
}

impl NetworkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node. Nodes are immutable: re-adding the same node is a
    /// no-op, re-adding its id with other coordinates fails.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if !node.coordinate.is_valid() {
            return Err(GraphError::InvalidCoordinate(node.id));
        }
        match self.nodes.get(&node.id) {
            Some(existing) if existing == &node => Ok(()),
            Some(_) => Err(GraphError::NodeConflict(node.id)),
            None => {
                self.nodes.insert(node.id, node);
                self.outgoing.entry(node.id).or_default();
                Ok(())
            }
        }
    }

    /// Inserts or replaces an edge by id.
    pub fn add_or_update_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        for endpoint in [edge.from, edge.to] {
            if !self.nodes.contains_key(&endpoint) {
                return Err(GraphError::InvalidEdge {
                    edge: edge.id,
                    reason: format!("endpoint {} is not in the network", endpoint),
                });
            }
        }
        if !edge.base_time.is_finite() || edge.base_time < 0.0 {
            return Err(GraphError::InvalidEdge {
                edge: edge.id,
                reason: format!("base time {} must be finite and non-negative", edge.base_time),
            });
        }

        if let Some(previous) = self.edges.get(&edge.id) {
            if previous.from != edge.from {
                let previous_from = previous.from;
                if let Some(list) = self.outgoing.get_mut(&previous_from) {
                    list.retain(|id| *id != edge.id);
                }
                self.outgoing.entry(edge.from).or_default().push(edge.id);
            }
        } else {
            self.outgoing.entry(edge.from).or_default().push(edge.id);
        }

        self.edges.insert(edge.id, edge);
        Ok(())
    }

    /// Sets the closure flag. Returns whether the flag changed.
    pub fn set_closure(&mut self, edge_id: EdgeId, closed: bool) -> Result<bool, GraphError> {
        let edge = self
            .edges
            .get_mut(&edge_id)
            .ok_or(GraphError::UnknownEdge(edge_id))?;
        let changed = edge.closed != closed;
        edge.closed = closed;
        Ok(changed)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// All edges in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.values()
    }

    pub fn closed_edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.values().filter(|edge| edge.closed)
    }

    /// Outgoing edges of `node`. Unknown nodes have no neighbors.
    pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.outgoing
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id))
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            closed_edges: self.closed_edges().count(),
        }
    }

    /// Cheapest path from `from` to `to` with edges weighted by `cost_fn`.
    ///
    /// Edges whose weight is negative or not finite are skipped.
    pub fn shortest_path<F>(&self, from: NodeId, to: NodeId, cost_fn: F) -> Result<Path, GraphError>
    where
        F: Fn(&Edge) -> f64,
    {
        self.ensure_node(from)?;
        self.ensure_node(to)?;

        let tree = self.dijkstra(from, Some(to), &cost_fn);
        tree.path_to(self, to).ok_or(GraphError::NoPath { from, to })
    }

    /// One-to-all cheapest paths from `source`.
    pub fn shortest_path_tree<F>(&self, source: NodeId, cost_fn: F) -> Result<PathTree, GraphError>
    where
        F: Fn(&Edge) -> f64,
    {
        self.ensure_node(source)?;
        Ok(self.dijkstra(source, None, &cost_fn))
    }

    fn ensure_node(&self, id: NodeId) -> Result<(), GraphError> {
        if self.nodes.contains_key(&id) {
            Ok(())
        } else {
            Err(GraphError::UnknownNode(id))
        }
    }

    fn dijkstra<F>(&self, source: NodeId, target: Option<NodeId>, cost_fn: &F) -> PathTree
    where
        F: Fn(&Edge) -> f64,
    {
        let mut heap = BinaryHeap::with_capacity(64);
        let mut labels: HashMap<NodeId, Label> = HashMap::new();
        let mut settled: HashSet<NodeId> = HashSet::new();

        labels.insert(source, Label { cost: 0.0, via: None });
        heap.push(HeapItem { node_id: source, cost: 0.0 });

        while let Some(HeapItem { node_id, cost }) = heap.pop() {
            if !settled.insert(node_id) {
                continue;
            }
            if target == Some(node_id) {
                break;
            }

            for edge in self.neighbors(node_id) {
                if settled.contains(&edge.to) {
                    continue;
                }

                let weight = cost_fn(edge);
                if !weight.is_finite() || weight < 0.0 {
                    continue;
                }

                let next = cost + weight;
                let improves = labels.get(&edge.to).is_none_or(|label| next < label.cost);
                if improves {
                    labels.insert(edge.to, Label { cost: next, via: Some(edge.id) });
                    heap.push(HeapItem { node_id: edge.to, cost: next });
                }
            }
        }

        labels.retain(|node, _| settled.contains(node));
        debug!(source = %source, settled = settled.len(), "dijkstra finished");

        PathTree { source, labels }
    }
}

#[derive(Debug, Clone, Copy)]
struct Label {
    cost: f64,
    via: Option<EdgeId>,
}

#[derive(Debug, Clone, Copy)]
struct HeapItem {
    node_id: NodeId,
    cost: f64,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Flipped on both keys: cheapest first, then lowest node id.
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node_id.cmp(&self.node_id))
    }
}

/// Settled labels of a one-to-all Dijkstra run.
#[derive(Debug, Clone)]
pub struct PathTree {
    source: NodeId,
    labels: HashMap<NodeId, Label>,
}

impl PathTree {
    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn cost_to(&self, node: NodeId) -> Option<f64> {
        self.labels.get(&node).map(|label| label.cost)
    }

    pub fn path_to(&self, graph: &NetworkGraph, node: NodeId) -> Option<Path> {
        let cost = self.cost_to(node)?;
        let mut nodes = vec![node];
        let mut edges = Vec::new();
        let mut current = node;

        while let Some(edge_id) = self.labels.get(&current)?.via {
            let edge = graph.edge(edge_id)?;
            edges.push(edge_id);
            nodes.push(edge.from);
            current = edge.from;
        }

        nodes.reverse();
        edges.reverse();
        Some(Path { nodes, edges, cost })
    }
}

/// Process-wide network with snapshot-on-read semantics.
///
/// Readers clone the current `Arc`; writers serialize on the lock and copy
/// the graph if any snapshot is still alive.
#[derive(Debug, Default)]
pub struct SharedNetwork {
    inner: RwLock<Arc<NetworkGraph>>,
}

impl SharedNetwork {
    pub fn new(graph: NetworkGraph) -> Self {
        Self {
            inner: RwLock::new(Arc::new(graph)),
        }
    }

    pub fn snapshot(&self) -> Arc<NetworkGraph> {
        Arc::clone(&self.inner.read())
    }

    pub fn set_closure(&self, edge_id: EdgeId, closed: bool) -> Result<bool, GraphError> {
        let mut guard = self.inner.write();
        let current = guard.edge(edge_id).ok_or(GraphError::UnknownEdge(edge_id))?;
        if current.closed == closed {
            return Ok(false);
        }
        Arc::make_mut(&mut guard).set_closure(edge_id, closed)
    }

    /// Applies `update` to the live graph under the write lock.
    pub fn update<F, R>(&self, update: F) -> R
    where
        F: FnOnce(&mut NetworkGraph) -> R,
    {
        let mut guard = self.inner.write();
        update(Arc::make_mut(&mut guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u64, lat: f64, lng: f64) -> Node {
        Node::new(NodeId(id), Coordinate::new(lat, lng))
    }

    /// Diamond: 1 -> 2 -> 4 (cost 2), 1 -> 3 -> 4 (cost 5), plus 4 -> 5.
    fn diamond() -> NetworkGraph {
        let mut graph = NetworkGraph::new();
        for id in 1..=5 {
            graph.add_node(node(id, 0.0, id as f64 * 0.01)).unwrap();
        }
        graph.add_or_update_edge(Edge::new(EdgeId(12), NodeId(1), NodeId(2), 1.0)).unwrap();
        graph.add_or_update_edge(Edge::new(EdgeId(24), NodeId(2), NodeId(4), 1.0)).unwrap();
        graph.add_or_update_edge(Edge::new(EdgeId(13), NodeId(1), NodeId(3), 2.0)).unwrap();
        graph.add_or_update_edge(Edge::new(EdgeId(34), NodeId(3), NodeId(4), 3.0)).unwrap();
        graph.add_or_update_edge(Edge::new(EdgeId(45), NodeId(4), NodeId(5), 1.0)).unwrap();
        graph
    }

    #[test]
    fn test_edge_with_unknown_endpoint_is_rejected() {
        let mut graph = diamond();
        let result = graph.add_or_update_edge(Edge::new(EdgeId(99), NodeId(1), NodeId(42), 1.0));
        assert!(matches!(result, Err(GraphError::InvalidEdge { edge: EdgeId(99), .. })));
    }

    #[test]
    fn test_negative_base_time_is_rejected() {
        let mut graph = diamond();
        let result = graph.add_or_update_edge(Edge::new(EdgeId(99), NodeId(1), NodeId(2), -1.0));
        assert!(matches!(result, Err(GraphError::InvalidEdge { .. })));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut graph = diamond();
        let edge = Edge::new(EdgeId(12), NodeId(1), NodeId(2), 1.0);
        graph.add_or_update_edge(edge.clone()).unwrap();
        graph.add_or_update_edge(edge).unwrap();
        assert_eq!(graph.neighbors(NodeId(1)).count(), 2);
        assert_eq!(graph.stats().edges, 5);
    }

    #[test]
    fn test_upsert_moves_adjacency_when_source_changes() {
        let mut graph = diamond();
        graph.add_or_update_edge(Edge::new(EdgeId(12), NodeId(3), NodeId(2), 1.0)).unwrap();
        let from_one: Vec<EdgeId> = graph.neighbors(NodeId(1)).map(|e| e.id).collect();
        let from_three: Vec<EdgeId> = graph.neighbors(NodeId(3)).map(|e| e.id).collect();
        assert_eq!(from_one, vec![EdgeId(13)]);
        assert_eq!(from_three, vec![EdgeId(34), EdgeId(12)]);
    }

    #[test]
    fn test_node_is_immutable() {
        let mut graph = diamond();
        assert!(graph.add_node(node(1, 0.0, 0.01)).is_ok());
        assert_eq!(graph.add_node(node(1, 5.0, 5.0)), Err(GraphError::NodeConflict(NodeId(1))));
    }

    #[test]
    fn test_invalid_coordinates_are_rejected() {
        let mut graph = NetworkGraph::new();
        assert_eq!(graph.add_node(node(7, 91.0, 0.0)), Err(GraphError::InvalidCoordinate(NodeId(7))));
        assert_eq!(graph.add_node(node(8, 0.0, f64::NAN)), Err(GraphError::InvalidCoordinate(NodeId(8))));
        assert!(!graph.contains_node(NodeId(7)));
        assert_eq!(graph.nodes().count(), 0);
    }

    #[test]
    fn test_shortest_path_prefers_cheaper_branch() {
        let graph = diamond();
        let path = graph.shortest_path(NodeId(1), NodeId(5), |e| e.base_time).unwrap();
        assert_eq!(path.nodes, vec![NodeId(1), NodeId(2), NodeId(4), NodeId(5)]);
        assert_eq!(path.edges, vec![EdgeId(12), EdgeId(24), EdgeId(45)]);
        assert!((path.cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_shortest_path_respects_cost_fn() {
        let graph = diamond();
        let path = graph
            .shortest_path(NodeId(1), NodeId(4), |e| if e.id == EdgeId(24) { 100.0 } else { e.base_time })
            .unwrap();
        assert_eq!(path.nodes, vec![NodeId(1), NodeId(3), NodeId(4)]);
    }

    #[test]
    fn test_no_path_against_edge_direction() {
        let graph = diamond();
        let result = graph.shortest_path(NodeId(5), NodeId(1), |e| e.base_time);
        assert_eq!(result, Err(GraphError::NoPath { from: NodeId(5), to: NodeId(1) }));
    }

    #[test]
    fn test_unknown_node_in_query() {
        let graph = diamond();
        let result = graph.shortest_path(NodeId(1), NodeId(77), |e| e.base_time);
        assert_eq!(result, Err(GraphError::UnknownNode(NodeId(77))));
    }

    #[test]
    fn test_path_to_self_is_empty() {
        let graph = diamond();
        let path = graph.shortest_path(NodeId(2), NodeId(2), |e| e.base_time).unwrap();
        assert_eq!(path.nodes, vec![NodeId(2)]);
        assert!(path.edges.is_empty());
        assert_eq!(path.cost, 0.0);
    }

    #[test]
    fn test_path_tree_costs() {
        let graph = diamond();
        let tree = graph.shortest_path_tree(NodeId(1), |e| e.base_time).unwrap();
        assert_eq!(tree.cost_to(NodeId(4)), Some(2.0));
        assert_eq!(tree.cost_to(NodeId(3)), Some(2.0));
        assert_eq!(tree.cost_to(NodeId(5)), Some(3.0));
        assert_eq!(tree.source(), NodeId(1));
    }

    #[test]
    fn test_set_closure_reports_change() {
        let mut graph = diamond();
        assert_eq!(graph.set_closure(EdgeId(12), true), Ok(true));
        assert_eq!(graph.set_closure(EdgeId(12), true), Ok(false));
        assert_eq!(graph.stats().closed_edges, 1);
        assert_eq!(graph.set_closure(EdgeId(404), true), Err(GraphError::UnknownEdge(EdgeId(404))));
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_closures() {
        let shared = SharedNetwork::new(diamond());
        let before = shared.snapshot();
        assert_eq!(shared.set_closure(EdgeId(24), true), Ok(true));
        let after = shared.snapshot();

        assert!(!before.edge(EdgeId(24)).unwrap().closed);
        assert!(after.edge(EdgeId(24)).unwrap().closed);
    }

    #[test]
    fn test_shared_closure_is_idempotent() {
        let shared = SharedNetwork::new(diamond());
        assert_eq!(shared.set_closure(EdgeId(24), true), Ok(true));
        assert_eq!(shared.set_closure(EdgeId(24), true), Ok(false));
        assert_eq!(shared.snapshot().stats().closed_edges, 1);
    }
}
