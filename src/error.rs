//! Error types for graph construction, cost modelling and request handling.

use thiserror::Error;

use crate::graph::{EdgeId, NodeId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("edge {edge}: {reason}")]
    InvalidEdge { edge: EdgeId, reason: String },
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("unknown edge {0}")]
    UnknownEdge(EdgeId),
    #[error("node {0} has an invalid coordinate")]
    InvalidCoordinate(NodeId),
    #[error("node {0} already exists with different coordinates")]
    NodeConflict(NodeId),
    #[error("no path from {from} to {to}")]
    NoPath { from: NodeId, to: NodeId },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CostError {
    #[error("invalid cost input for edge {edge}: {reason}")]
    InvalidCostInput { edge: EdgeId, reason: String },
    #[error("invalid cost options: {0}")]
    InvalidOptions(String),
}

/// Hard failures surfaced to the caller of the routing service.
///
/// Everything else (closures, unreachable stops, capacity shortfall, time
/// pressure) is reported inside the returned plan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlannerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Cost(#[from] CostError),
}
