//! rescue-router
//!
//! Capacitated multi-vehicle routing over a road network whose costs move
//! with closures, weather and predicted delays.

pub mod error;
pub mod haversine;
pub mod graph;
pub mod weather;
pub mod cost;
pub mod legs;
pub mod request;
pub mod plan;
pub mod polyline;
pub mod solver;
pub mod traits;
pub mod store;
pub mod service;
pub mod http_signals;

pub use error::{CostError, GraphError, PlannerError};
pub use graph::{Edge, EdgeId, NetworkGraph, Node, NodeId, SharedNetwork};
pub use plan::{PlanStatus, Route, RoutePlan, UnassignedReason};
pub use request::{Destination, RouteRequest, Vehicle};
pub use service::{RoutingService, ServiceOptions};
