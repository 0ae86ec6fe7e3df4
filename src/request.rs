//! Per-call optimization input.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cost::{CostOptions, DEFAULT_CLOSURE_PENALTY};
use crate::error::PlannerError;
use crate::graph::{NetworkGraph, NodeId};

/// Default wall-clock budget for one optimization.
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub capacity: f64,
    /// Start and end node. Falls back to the request origin.
    pub depot: Option<NodeId>,
}

impl Vehicle {
    pub fn new(id: impl Into<String>, capacity: f64) -> Self {
        Self {
            id: id.into(),
            capacity,
            depot: None,
        }
    }

    pub fn at(mut self, depot: NodeId) -> Self {
        self.depot = Some(depot);
        self
    }

    pub fn depot_or(&self, origin: NodeId) -> NodeId {
        self.depot.unwrap_or(origin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub id: String,
    pub node: NodeId,
    pub demand: f64,
}

impl Destination {
    pub fn new(id: impl Into<String>, node: NodeId, demand: f64) -> Self {
        Self {
            id: id.into(),
            node,
            demand,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Identifier the resulting plan is stored under.
    pub id: String,
    pub origin: NodeId,
    pub destinations: Vec<Destination>,
    pub vehicles: Vec<Vehicle>,
    pub avoid_closures: bool,
    pub optimize_for_weather: bool,
    pub time_budget: Duration,
    /// Hour of day (0-23) the fleet leaves, forwarded to the collaborators.
    pub departure_hour: u8,
}

impl RouteRequest {
    pub fn new(id: impl Into<String>, origin: NodeId) -> Self {
        Self {
            id: id.into(),
            origin,
            destinations: Vec::new(),
            vehicles: Vec::new(),
            avoid_closures: true,
            optimize_for_weather: true,
            time_budget: DEFAULT_TIME_BUDGET,
            departure_hour: 8,
        }
    }

    pub fn destination(mut self, destination: Destination) -> Self {
        self.destinations.push(destination);
        self
    }

    pub fn vehicle(mut self, vehicle: Vehicle) -> Self {
        self.vehicles.push(vehicle);
        self
    }

    pub fn avoid_closures(mut self, avoid: bool) -> Self {
        self.avoid_closures = avoid;
        self
    }

    pub fn optimize_for_weather(mut self, enabled: bool) -> Self {
        self.optimize_for_weather = enabled;
        self
    }

    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = budget;
        self
    }

    pub fn departure_hour(mut self, hour: u8) -> Self {
        self.departure_hour = hour;
        self
    }

    /// Cost configuration for this call.
    pub fn cost_options(&self, closure_penalty: Option<f64>) -> CostOptions {
        CostOptions {
            avoid_closures: self.avoid_closures,
            optimize_for_weather: self.optimize_for_weather,
            closure_penalty: closure_penalty.unwrap_or(DEFAULT_CLOSURE_PENALTY),
        }
    }

    /// Rejects structurally malformed requests against `graph`.
    pub fn validate(&self, graph: &NetworkGraph) -> Result<(), PlannerError> {
        let invalid = |message: String| Err(PlannerError::InvalidRequest(message));

        if !graph.contains_node(self.origin) {
            return invalid(format!("origin {} is not in the network", self.origin));
        }
        if self.vehicles.is_empty() {
            return invalid("at least one vehicle is required".to_string());
        }
        if self.departure_hour > 23 {
            return invalid(format!("departure hour {} is out of range", self.departure_hour));
        }

        let mut vehicle_ids = HashSet::new();
        for vehicle in &self.vehicles {
            if !vehicle_ids.insert(vehicle.id.as_str()) {
                return invalid(format!("duplicate vehicle id {}", vehicle.id));
            }
            if !vehicle.capacity.is_finite() || vehicle.capacity <= 0.0 {
                return invalid(format!("vehicle {} has invalid capacity {}", vehicle.id, vehicle.capacity));
            }
            let depot = vehicle.depot_or(self.origin);
            if !graph.contains_node(depot) {
                return invalid(format!("vehicle {} depot {} is not in the network", vehicle.id, depot));
            }
        }

        let mut destination_ids = HashSet::new();
        for destination in &self.destinations {
            if !destination_ids.insert(destination.id.as_str()) {
                return invalid(format!("duplicate destination id {}", destination.id));
            }
            if !destination.demand.is_finite() || destination.demand < 0.0 {
                return invalid(format!(
                    "destination {} has invalid demand {}",
                    destination.id, destination.demand
                ));
            }
            if !graph.contains_node(destination.node) {
                return invalid(format!(
                    "destination {} node {} is not in the network",
                    destination.id, destination.node
                ));
            }
        }

        Ok(())
    }
}
