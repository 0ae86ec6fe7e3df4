//! Capacitated multi-vehicle route optimizer.
//!
//! Cheapest insertion builds a feasible seed, then first-improvement local
//! search (2-opt, relocate, exchange) lowers the penalized cost until no move
//! helps or the time budget runs out.

use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cost::CostModel;
use crate::error::PlannerError;
use crate::graph::{NetworkGraph, NodeId};
use crate::legs::LegTable;
use crate::plan::{self, RouteDraft, RoutePlan, UnassignedDestination, UnassignedReason};
use crate::request::{DEFAULT_TIME_BUDGET, Destination, RouteRequest, Vehicle};

/// Local search neighborhoods to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveSet {
    /// Reverse a segment within one route.
    pub two_opt: bool,
    /// Move one stop to another position or vehicle.
    pub relocate: bool,
    /// Swap two stops, within or across routes.
    pub exchange: bool,
}

impl Default for MoveSet {
    fn default() -> Self {
        Self {
            two_opt: true,
            relocate: true,
            exchange: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveOptions {
    pub time_budget: Duration,
    /// Cost differences within this tolerance count as ties.
    pub epsilon: f64,
    pub moves: MoveSet,
    /// Upper bound on full local search passes.
    pub max_iterations: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            time_budget: DEFAULT_TIME_BUDGET,
            epsilon: 1e-6,
            moves: MoveSet::default(),
            max_iterations: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initialized,
    Constructing,
    Improving,
    Finalizing,
}

/// Wall-clock deadline plus an optional caller-owned cancel flag.
#[derive(Debug, Clone)]
struct Deadline {
    start: Instant,
    budget: Duration,
    cancel: Option<Arc<AtomicBool>>,
}

/// Local search stopped before converging.
#[derive(Debug, Clone, Copy)]
struct Interrupted;

impl Deadline {
    fn check(&self) -> Result<(), Interrupted> {
        let cancelled = self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(AtomicOrdering::Relaxed));
        if cancelled || self.start.elapsed() >= self.budget {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Optimizes one request against a fixed graph snapshot and cost model.
pub struct RouteOptimizer<'a> {
    graph: &'a NetworkGraph,
    costs: &'a CostModel,
    options: SolveOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> RouteOptimizer<'a> {
    pub fn new(graph: &'a NetworkGraph, costs: &'a CostModel, options: SolveOptions) -> Self {
        Self {
            graph,
            costs,
            options,
            cancel: None,
        }
    }

    /// Setting the flag stops local search at the next move evaluation.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn optimize(&self, request: &RouteRequest) -> Result<RoutePlan, PlannerError> {
        let deadline = Deadline {
            start: Instant::now(),
            budget: self.options.time_budget,
            cancel: self.cancel.clone(),
        };
        let mut phase = Phase::Initialized;
        request.validate(self.graph)?;

        info!(
            plan = %request.id,
            destinations = request.destinations.len(),
            vehicles = request.vehicles.len(),
            "optimizing routes"
        );

        let problem = Problem::new(request, self.graph, self.costs, self.options.epsilon)?;
        let mut unassigned = problem.screen();

        transition(&mut phase, Phase::Constructing);
        let mut routes = problem.empty_routes();
        let pending: Vec<usize> = (0..problem.destinations.len())
            .filter(|index| !unassigned.iter().any(|(d, _)| d == index))
            .collect();
        let leftover = construct(&problem, &mut routes, pending, self.options.epsilon);
        unassigned.extend(leftover.into_iter().map(|d| (d, UnassignedReason::CapacityExceeded)));

        transition(&mut phase, Phase::Improving);
        let mut timed_out = false;
        if routes.iter().any(|route| !route.stops.is_empty()) {
            let search = LocalSearch {
                problem: &problem,
                options: &self.options,
                deadline: &deadline,
            };
            timed_out = search.run(&mut routes).is_err();
        }

        transition(&mut phase, Phase::Finalizing);
        let drafts: Vec<RouteDraft<'_>> = routes
            .iter()
            .map(|route| RouteDraft {
                vehicle: problem.vehicles[route.vehicle],
                depot: problem.depot_nodes[route.vehicle],
                stops: route.stops.iter().map(|d| problem.destinations[*d]).collect(),
            })
            .collect();
        let unassigned = unassigned
            .into_iter()
            .map(|(d, reason)| {
                let destination = problem.destinations[d];
                UnassignedDestination {
                    destination_id: destination.id.clone(),
                    node: destination.node,
                    demand: destination.demand,
                    reason,
                }
            })
            .collect();

        let plan = plan::assemble(&request.id, &drafts, unassigned, timed_out, self.graph, self.costs, &problem.legs);

        info!(
            plan = %plan.id,
            status = ?plan.status,
            total_cost = plan.total_cost,
            unassigned = plan.unassigned.len(),
            elapsed_ms = deadline.start.elapsed().as_millis() as u64,
            "optimization finished"
        );

        Ok(plan)
    }
}

fn transition(phase: &mut Phase, next: Phase) {
    debug!(from = ?*phase, to = ?next, "optimizer phase");
    *phase = next;
}

/// Request data in deterministic order, indexed into the leg table.
struct Problem<'r> {
    vehicles: Vec<&'r Vehicle>,
    depot_nodes: Vec<NodeId>,
    depots: Vec<usize>,
    destinations: Vec<&'r Destination>,
    locations: Vec<usize>,
    legs: LegTable,
    /// Slack on capacity checks so rounding in summed demands never rejects a fit.
    epsilon: f64,
}

impl<'r> Problem<'r> {
    fn new(request: &'r RouteRequest, graph: &NetworkGraph, costs: &CostModel, epsilon: f64) -> Result<Self, PlannerError> {
        let mut vehicles: Vec<&Vehicle> = request.vehicles.iter().collect();
        vehicles.sort_by(|a, b| a.id.cmp(&b.id));
        let mut destinations: Vec<&Destination> = request.destinations.iter().collect();
        destinations.sort_by(|a, b| a.id.cmp(&b.id));

        let depot_nodes: Vec<NodeId> = vehicles
            .iter()
            .map(|vehicle| vehicle.depot_or(request.origin))
            .collect();
        let stop_nodes: Vec<NodeId> = depot_nodes
            .iter()
            .copied()
            .chain(destinations.iter().map(|destination| destination.node))
            .collect();
        let legs = LegTable::build(graph, costs, &stop_nodes)?;

        let locate = |node: NodeId| legs.index_of(node).unwrap_or(usize::MAX);
        let depots = depot_nodes.iter().map(|node| locate(*node)).collect();
        let locations = destinations.iter().map(|destination| locate(destination.node)).collect();

        Ok(Self {
            vehicles,
            depot_nodes,
            depots,
            destinations,
            locations,
            legs,
            epsilon,
        })
    }

    fn empty_routes(&self) -> Vec<RouteState> {
        (0..self.vehicles.len())
            .map(|vehicle| RouteState {
                vehicle,
                stops: Vec::new(),
                load: 0.0,
                cost: 0.0,
            })
            .collect()
    }

    /// Destinations no vehicle could ever serve.
    fn screen(&self) -> Vec<(usize, UnassignedReason)> {
        let max_capacity = self
            .vehicles
            .iter()
            .map(|vehicle| vehicle.capacity)
            .fold(0.0, f64::max);

        let mut rejected = Vec::new();
        for (d, destination) in self.destinations.iter().enumerate() {
            if destination.demand > max_capacity + self.epsilon {
                rejected.push((d, UnassignedReason::CapacityExceeded));
            } else if !(0..self.vehicles.len()).any(|v| self.reachable(d, v)) {
                rejected.push((d, UnassignedReason::Unreachable));
            }
        }
        rejected
    }

    /// Whether vehicle `v` can drive to destination `d` and back.
    fn reachable(&self, d: usize, v: usize) -> bool {
        let depot = self.depots[v];
        let location = self.locations[d];
        self.legs.cost(depot, location).is_finite() && self.legs.cost(location, depot).is_finite()
    }

    fn fits(&self, route: &RouteState, demand: f64) -> bool {
        self.within_capacity(route.vehicle, route.load + demand)
    }

    fn within_capacity(&self, vehicle: usize, load: f64) -> bool {
        load <= self.vehicles[vehicle].capacity + self.epsilon
    }

    /// Penalized cost of driving `stops` from and back to the vehicle's depot.
    fn sequence_cost(&self, vehicle: usize, stops: &[usize]) -> f64 {
        if stops.is_empty() {
            return 0.0;
        }
        let depot = self.depots[vehicle];
        let mut previous = depot;
        let mut total = 0.0;
        for stop in stops {
            let location = self.locations[*stop];
            total += self.legs.cost(previous, location);
            previous = location;
        }
        total + self.legs.cost(previous, depot)
    }

    fn insertion_delta(&self, route: &RouteState, d: usize, position: usize) -> f64 {
        let depot = self.depots[route.vehicle];
        let previous = match position {
            0 => depot,
            p => self.locations[route.stops[p - 1]],
        };
        let next = route
            .stops
            .get(position)
            .map_or(depot, |stop| self.locations[*stop]);
        let location = self.locations[d];

        self.legs.cost(previous, location) + self.legs.cost(location, next) - self.legs.cost(previous, next)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RouteState {
    vehicle: usize,
    stops: Vec<usize>,
    load: f64,
    cost: f64,
}

#[derive(Debug, Clone, Copy)]
struct Insertion {
    destination: usize,
    vehicle: usize,
    position: usize,
    delta: f64,
    remaining: f64,
}

/// Ordering of insertion candidates, best first: cheapest delta, then the
/// vehicle with most room, then lowest vehicle, destination and position.
fn compare_insertions(a: &Insertion, b: &Insertion, epsilon: f64) -> Ordering {
    compare_with_tolerance(a.delta, b.delta, epsilon)
        .then_with(|| compare_with_tolerance(b.remaining, a.remaining, epsilon))
        .then_with(|| a.vehicle.cmp(&b.vehicle))
        .then_with(|| a.destination.cmp(&b.destination))
        .then_with(|| a.position.cmp(&b.position))
}

fn compare_with_tolerance(a: f64, b: f64, epsilon: f64) -> Ordering {
    if a < b - epsilon {
        Ordering::Less
    } else if a > b + epsilon {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

/// Greedy cheapest insertion. Returns the destinations that fit nowhere.
fn construct(problem: &Problem<'_>, routes: &mut [RouteState], mut pending: Vec<usize>, epsilon: f64) -> Vec<usize> {
    while !pending.is_empty() {
        let mut best: Option<Insertion> = None;

        for &d in &pending {
            let demand = problem.destinations[d].demand;
            for route in routes.iter() {
                if !problem.reachable(d, route.vehicle) || !problem.fits(route, demand) {
                    continue;
                }
                let remaining = problem.vehicles[route.vehicle].capacity - route.load;
                for position in 0..=route.stops.len() {
                    let delta = problem.insertion_delta(route, d, position);
                    if !delta.is_finite() {
                        continue;
                    }
                    let candidate = Insertion {
                        destination: d,
                        vehicle: route.vehicle,
                        position,
                        delta,
                        remaining,
                    };
                    let better = best.is_none_or(|current| {
                        compare_insertions(&candidate, &current, epsilon) == Ordering::Less
                    });
                    if better {
                        best = Some(candidate);
                    }
                }
            }
        }

        let Some(insertion) = best else {
            break;
        };

        let route = &mut routes[insertion.vehicle];
        route.stops.insert(insertion.position, insertion.destination);
        route.load += problem.destinations[insertion.destination].demand;
        route.cost = problem.sequence_cost(route.vehicle, &route.stops);
        pending.retain(|d| *d != insertion.destination);

        debug!(
            destination = %problem.destinations[insertion.destination].id,
            vehicle = %problem.vehicles[insertion.vehicle].id,
            position = insertion.position,
            delta = insertion.delta,
            "inserted stop"
        );
    }

    pending
}

struct LocalSearch<'s, 'r> {
    problem: &'s Problem<'r>,
    options: &'s SolveOptions,
    deadline: &'s Deadline,
}

impl LocalSearch<'_, '_> {
    /// Runs improvement passes until none helps. Moves are applied whole, so
    /// an interruption leaves `routes` at the last accepted state.
    fn run(&self, routes: &mut [RouteState]) -> Result<(), Interrupted> {
        let moves = self.options.moves;
        let mut accepted = 0usize;

        for pass in 0..self.options.max_iterations {
            self.deadline.check()?;
            let mut improved = false;

            if moves.two_opt {
                for route in routes.iter_mut() {
                    while self.two_opt(route)? {
                        improved = true;
                        accepted += 1;
                    }
                }
            }
            if moves.relocate && self.relocate(routes)? {
                improved = true;
                accepted += 1;
            }
            if moves.exchange && self.exchange(routes)? {
                improved = true;
                accepted += 1;
            }

            if !improved {
                debug!(passes = pass + 1, accepted, "local search converged");
                return Ok(());
            }
        }

        debug!(accepted, "local search hit the iteration limit");
        Ok(())
    }

    fn improves(&self, candidate: f64, current: f64) -> bool {
        candidate < current - self.options.epsilon
    }

    /// Reverses `stops[i..=j]` when that lowers the route cost.
    fn two_opt(&self, route: &mut RouteState) -> Result<bool, Interrupted> {
        let n = route.stops.len();
        if n < 2 {
            return Ok(false);
        }

        for i in 0..n - 1 {
            for j in i + 1..n {
                self.deadline.check()?;
                let mut candidate = route.stops.clone();
                candidate[i..=j].reverse();
                let cost = self.problem.sequence_cost(route.vehicle, &candidate);
                if self.improves(cost, route.cost) {
                    debug!(vehicle = route.vehicle, i, j, saving = route.cost - cost, "2-opt move");
                    route.stops = candidate;
                    route.cost = cost;
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// Moves a single stop to the first position, on any route, that lowers
    /// the total cost.
    fn relocate(&self, routes: &mut [RouteState]) -> Result<bool, Interrupted> {
        for from in 0..routes.len() {
            for index in 0..routes[from].stops.len() {
                let d = routes[from].stops[index];
                let demand = self.problem.destinations[d].demand;

                for to in 0..routes.len() {
                    if from == to {
                        let vehicle = routes[from].vehicle;
                        let current = routes[from].cost;
                        let mut without = routes[from].stops.clone();
                        without.remove(index);
                        for position in 0..=without.len() {
                            if position == index {
                                continue;
                            }
                            self.deadline.check()?;
                            let mut candidate = without.clone();
                            candidate.insert(position, d);
                            let cost = self.problem.sequence_cost(vehicle, &candidate);
                            if self.improves(cost, current) {
                                debug!(vehicle, index, position, "intra-route relocate");
                                routes[from].stops = candidate;
                                routes[from].cost = cost;
                                return Ok(true);
                            }
                        }
                        continue;
                    }

                    if !self.problem.reachable(d, routes[to].vehicle) || !self.problem.fits(&routes[to], demand) {
                        continue;
                    }

                    let mut source = routes[from].stops.clone();
                    source.remove(index);
                    let source_cost = self.problem.sequence_cost(routes[from].vehicle, &source);
                    let current = routes[from].cost + routes[to].cost;

                    for position in 0..=routes[to].stops.len() {
                        self.deadline.check()?;
                        let mut target = routes[to].stops.clone();
                        target.insert(position, d);
                        let target_cost = self.problem.sequence_cost(routes[to].vehicle, &target);
                        if self.improves(source_cost + target_cost, current) {
                            debug!(from, to, position, "inter-route relocate");
                            routes[from].stops = source;
                            routes[from].cost = source_cost;
                            routes[from].load -= demand;
                            routes[to].stops = target;
                            routes[to].cost = target_cost;
                            routes[to].load += demand;
                            return Ok(true);
                        }
                    }
                }
            }
        }

        Ok(false)
    }

    /// Swaps two stops, inside one route or between two routes.
    fn exchange(&self, routes: &mut [RouteState]) -> Result<bool, Interrupted> {
        for a in 0..routes.len() {
            let n = routes[a].stops.len();
            for i in 0..n {
                for j in i + 1..n {
                    self.deadline.check()?;
                    let mut candidate = routes[a].stops.clone();
                    candidate.swap(i, j);
                    let cost = self.problem.sequence_cost(routes[a].vehicle, &candidate);
                    if self.improves(cost, routes[a].cost) {
                        debug!(vehicle = routes[a].vehicle, i, j, "intra-route exchange");
                        routes[a].stops = candidate;
                        routes[a].cost = cost;
                        return Ok(true);
                    }
                }
            }

            for b in a + 1..routes.len() {
                for i in 0..routes[a].stops.len() {
                    for j in 0..routes[b].stops.len() {
                        self.deadline.check()?;
                        if let Some((left, right)) = self.try_swap(&routes[a], &routes[b], i, j) {
                            debug!(a, b, i, j, "inter-route exchange");
                            routes[a] = left;
                            routes[b] = right;
                            return Ok(true);
                        }
                    }
                }
            }
        }

        Ok(false)
    }

    fn try_swap(&self, left: &RouteState, right: &RouteState, i: usize, j: usize) -> Option<(RouteState, RouteState)> {
        let problem = self.problem;
        let x = left.stops[i];
        let y = right.stops[j];
        let demand_x = problem.destinations[x].demand;
        let demand_y = problem.destinations[y].demand;

        let left_load = left.load - demand_x + demand_y;
        let right_load = right.load - demand_y + demand_x;
        if !problem.within_capacity(left.vehicle, left_load) || !problem.within_capacity(right.vehicle, right_load) {
            return None;
        }
        if !problem.reachable(y, left.vehicle) || !problem.reachable(x, right.vehicle) {
            return None;
        }

        let mut left_stops = left.stops.clone();
        left_stops[i] = y;
        let mut right_stops = right.stops.clone();
        right_stops[j] = x;

        let left_cost = problem.sequence_cost(left.vehicle, &left_stops);
        let right_cost = problem.sequence_cost(right.vehicle, &right_stops);
        if !self.improves(left_cost + right_cost, left.cost + right.cost) {
            return None;
        }

        Some((
            RouteState {
                vehicle: left.vehicle,
                stops: left_stops,
                load: left_load,
                cost: left_cost,
            },
            RouteState {
                vehicle: right.vehicle,
                stops: right_stops,
                load: right_load,
                cost: right_cost,
            },
        ))
    }
}
