//! Optimizer output and its assembly from solved stop sequences.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::cost::CostModel;
use crate::graph::{EdgeId, NetworkGraph, NodeId};
use crate::legs::LegTable;
use crate::polyline::Polyline;
use crate::request::{Destination, Vehicle};

/// Why a destination could not be placed on any route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnassignedReason {
    /// No vehicle had room left for the demand.
    CapacityExceeded,
    /// No vehicle can drive from its depot to the destination and back.
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassignedDestination {
    pub destination_id: String,
    pub node: NodeId,
    pub demand: f64,
    pub reason: UnassignedReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    /// Local search converged or ran out of iterations.
    Completed,
    /// The time budget ran out or the caller cancelled during improvement.
    TimedOut,
    /// At least one destination exceeds the available capacity.
    Infeasible,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub vehicle_id: String,
    /// Depot, each served destination node, depot.
    pub stops: Vec<NodeId>,
    /// Served destinations, in visiting order.
    pub destination_ids: Vec<String>,
    /// Seconds from departure, one per entry of `stops`.
    pub arrival_times: Vec<f64>,
    /// Every node driven through.
    pub path: Vec<NodeId>,
    pub geometry: Polyline,
    pub load: f64,
    pub distance_km: f64,
    pub total_time: f64,
    pub total_cost: f64,
    /// Closed edges the route still has to use.
    pub closed_edges: usize,
    /// Closed edges leaving a node on `path` that the route does not drive.
    pub closures_avoided: usize,
    /// Seconds of `total_time` caused by weather.
    pub weather_delay: f64,
    /// Seconds of `total_time` from confidence-weighted delay predictions.
    pub predicted_delay: f64,
    /// 0 (safe) to 1 (risky). See [`risk_score`].
    pub risk_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub id: String,
    pub routes: Vec<Route>,
    pub unassigned: Vec<UnassignedDestination>,
    pub total_cost: f64,
    pub feasible: bool,
    pub status: PlanStatus,
}

impl RoutePlan {
    pub fn route_for(&self, vehicle_id: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.vehicle_id == vehicle_id)
    }

    pub fn unassigned_with(&self, reason: UnassignedReason) -> Vec<&str> {
        self.unassigned
            .iter()
            .filter(|entry| entry.reason == reason)
            .map(|entry| entry.destination_id.as_str())
            .collect()
    }

    pub fn assigned_count(&self) -> usize {
        self.routes.iter().map(|route| route.destination_ids.len()).sum()
    }
}

/// A vehicle with its solved visiting order.
#[derive(Debug, Clone)]
pub(crate) struct RouteDraft<'a> {
    pub vehicle: &'a Vehicle,
    pub depot: NodeId,
    pub stops: Vec<&'a Destination>,
}

/// Turns solved drafts into the public plan.
///
/// Drafts without stops are dropped; `unassigned` is sorted by destination id.
pub(crate) fn assemble(
    plan_id: &str,
    drafts: &[RouteDraft<'_>],
    mut unassigned: Vec<UnassignedDestination>,
    timed_out: bool,
    graph: &NetworkGraph,
    costs: &CostModel,
    legs: &LegTable,
) -> RoutePlan {
    let routes: Vec<Route> = drafts
        .iter()
        .filter(|draft| !draft.stops.is_empty())
        .map(|draft| assemble_route(draft, graph, costs, legs))
        .collect();

    unassigned.sort_by(|a, b| a.destination_id.cmp(&b.destination_id));

    let feasible = !unassigned
        .iter()
        .any(|entry| entry.reason == UnassignedReason::CapacityExceeded);
    let status = if timed_out {
        PlanStatus::TimedOut
    } else if !feasible {
        PlanStatus::Infeasible
    } else {
        PlanStatus::Completed
    };

    RoutePlan {
        id: plan_id.to_string(),
        total_cost: routes.iter().map(|route| route.total_cost).sum(),
        routes,
        unassigned,
        feasible,
        status,
    }
}

fn assemble_route(draft: &RouteDraft<'_>, graph: &NetworkGraph, costs: &CostModel, legs: &LegTable) -> Route {
    let mut stops = Vec::with_capacity(draft.stops.len() + 2);
    stops.push(draft.depot);
    stops.extend(draft.stops.iter().map(|destination| destination.node));
    stops.push(draft.depot);

    let mut arrival_times = vec![0.0];
    let mut path = vec![draft.depot];
    let mut elapsed = 0.0;
    let mut total_cost = 0.0;
    let mut driven: Vec<EdgeId> = Vec::new();

    for pair in stops.windows(2) {
        if let Some(leg) = legs.leg_between(pair[0], pair[1]) {
            elapsed += leg.travel_time;
            total_cost += leg.cost;
            path.extend(leg.nodes.iter().skip(1));
            driven.extend(leg.edges.iter().copied());
        }
        arrival_times.push(elapsed);
    }

    let closed_edges = driven
        .iter()
        .filter(|edge| graph.edge(**edge).is_some_and(|edge| edge.closed))
        .count();
    let (weather_delay, predicted_delay) = driven
        .iter()
        .filter_map(|edge| costs.breakdown(*edge))
        .fold((0.0, 0.0), |(weather, predicted), cost| {
            (weather + cost.weather_delay, predicted + cost.predicted_delay)
        });

    let visited: HashSet<NodeId> = path.iter().copied().collect();
    let used: HashSet<EdgeId> = driven.iter().copied().collect();
    let closures_avoided = graph
        .closed_edges()
        .filter(|edge| visited.contains(&edge.from) && !used.contains(&edge.id))
        .count();

    let geometry = Polyline::from_nodes(graph, &path);
    let risk = risk_score(elapsed, weather_delay + predicted_delay, draft.stops.len(), closed_edges);

    Route {
        vehicle_id: draft.vehicle.id.clone(),
        destination_ids: draft.stops.iter().map(|destination| destination.id.clone()).collect(),
        load: draft.stops.iter().map(|destination| destination.demand).sum(),
        distance_km: geometry.length_km(),
        total_time: elapsed,
        stops,
        arrival_times,
        path,
        geometry,
        total_cost,
        closed_edges,
        closures_avoided,
        weather_delay,
        predicted_delay,
        risk_score: risk,
    }
}

/// Route risk on a 0-1 scale: a small floor, plus the share of driving time
/// that rests on forecasts, plus the number of stops, plus a surcharge for
/// driving through closures.
pub fn risk_score(total_time: f64, uncertain_time: f64, stops: usize, closed_edges: usize) -> f64 {
    const BASE: f64 = 0.1;
    const UNCERTAINTY_WEIGHT: f64 = 0.4;
    const PER_STOP: f64 = 0.05;
    const MAX_STOP_RISK: f64 = 0.3;
    const CLOSURE_RISK: f64 = 0.2;

    let uncertain_share = if total_time > 0.0 {
        (uncertain_time / total_time).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let stop_risk = (stops as f64 * PER_STOP).min(MAX_STOP_RISK);
    let closure_risk = if closed_edges > 0 { CLOSURE_RISK } else { 0.0 };

    (BASE + UNCERTAINTY_WEIGHT * uncertain_share + stop_risk + closure_risk).min(1.0)
}
