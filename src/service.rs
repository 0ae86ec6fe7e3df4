//! Boundary facade: owns the shared network and wires collaborators into
//! each optimization.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::cost::{CostModel, CostSignals, DEFAULT_CLOSURE_PENALTY};
use crate::error::PlannerError;
use crate::graph::{EdgeId, NetworkGraph, NetworkStats, SharedNetwork};
use crate::plan::RoutePlan;
use crate::request::RouteRequest;
use crate::solver::{RouteOptimizer, SolveOptions};
use crate::store::InMemoryPlanStore;
use crate::traits::{DelayPredictor, EdgeFeatures, NoSignals, PlanStore, WeatherProvider, WeatherQuery};
use crate::weather::BoundingBox;

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub closure_penalty: f64,
    /// Window asked of the weather feed, from departure.
    pub forecast_horizon: Duration,
    /// Solver defaults; the time budget is taken from each request.
    pub solve: SolveOptions,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            closure_penalty: DEFAULT_CLOSURE_PENALTY,
            forecast_horizon: Duration::from_secs(24 * 3600),
            solve: SolveOptions::default(),
        }
    }
}

pub struct RoutingService<W = NoSignals, P = NoSignals, S = InMemoryPlanStore> {
    network: SharedNetwork,
    weather: W,
    predictor: P,
    store: S,
    options: ServiceOptions,
}

impl RoutingService {
    /// Service without weather or prediction feeds, storing plans in memory.
    pub fn new(graph: NetworkGraph) -> Self {
        Self::with_collaborators(graph, NoSignals, NoSignals, InMemoryPlanStore::new(), ServiceOptions::default())
    }
}

impl<W, P, S> RoutingService<W, P, S>
where
    W: WeatherProvider,
    P: DelayPredictor,
    S: PlanStore,
{
    pub fn with_collaborators(graph: NetworkGraph, weather: W, predictor: P, store: S, options: ServiceOptions) -> Self {
        Self {
            network: SharedNetwork::new(graph),
            weather,
            predictor,
            store,
            options,
        }
    }

    pub fn network(&self) -> &SharedNetwork {
        &self.network
    }

    pub fn network_stats(&self) -> NetworkStats {
        self.network.snapshot().stats()
    }

    /// Optimizes against a snapshot of the network taken now and stores the
    /// resulting plan.
    pub fn optimize(&self, request: &RouteRequest) -> Result<RoutePlan, PlannerError> {
        self.run(request, None)
    }

    /// Like [`Self::optimize`], but stops improving once `cancel` is set.
    pub fn optimize_with_cancel(&self, request: &RouteRequest, cancel: Arc<AtomicBool>) -> Result<RoutePlan, PlannerError> {
        self.run(request, Some(cancel))
    }

    /// Marks an edge closed or open. Unknown edges are logged and ignored.
    pub fn report_closure(&self, edge: EdgeId, closed: bool) {
        match self.network.set_closure(edge, closed) {
            Ok(true) => info!(edge = %edge, closed, "closure state changed"),
            Ok(false) => {}
            Err(err) => warn!(edge = %edge, error = %err, "ignoring closure report"),
        }
    }

    pub fn query_route(&self, route_id: &str) -> Option<RoutePlan> {
        self.store.load(route_id)
    }

    fn run(&self, request: &RouteRequest, cancel: Option<Arc<AtomicBool>>) -> Result<RoutePlan, PlannerError> {
        let snapshot = self.network.snapshot();
        request.validate(&snapshot)?;

        let signals = self.collect_signals(&snapshot, request);
        let costs = CostModel::build(&snapshot, &signals, request.cost_options(Some(self.options.closure_penalty)))?;
        let options = SolveOptions {
            time_budget: request.time_budget,
            ..self.options.solve.clone()
        };

        let mut optimizer = RouteOptimizer::new(&snapshot, &costs, options);
        if let Some(flag) = cancel {
            optimizer = optimizer.with_cancel_flag(flag);
        }
        let plan = optimizer.optimize(request)?;

        self.store.save(&plan);
        Ok(plan)
    }

    fn collect_signals(&self, graph: &NetworkGraph, request: &RouteRequest) -> CostSignals {
        let weather = if request.optimize_for_weather {
            self.weather.impact_for(&WeatherQuery {
                edges: graph.edges().map(|edge| edge.id).collect(),
                bounds: BoundingBox::around(graph),
                departure_hour: request.departure_hour,
                horizon_secs: self.options.forecast_horizon.as_secs(),
            })
        } else {
            Default::default()
        };

        let features: Vec<EdgeFeatures> = graph
            .edges()
            .map(|edge| EdgeFeatures {
                edge_id: edge.id,
                base_time: edge.base_time,
                capacity: edge.capacity,
                historical_load: edge.historical_load,
                weather_multiplier: weather.multiplier_for(graph, edge).unwrap_or(1.0),
                hour_of_day: request.departure_hour,
            })
            .collect();
        let predictions = self.predictor.predict(&features);

        CostSignals { weather, predictions }
    }
}

impl<W, P, S> RoutingService<W, P, S>
where
    W: WeatherProvider + Sync,
    P: DelayPredictor + Sync,
    S: PlanStore + Sync,
{
    /// Optimizes independent requests in parallel. Each one takes its own
    /// snapshot when it starts.
    pub fn optimize_batch(&self, requests: &[RouteRequest]) -> Vec<Result<RoutePlan, PlannerError>> {
        requests.par_iter().map(|request| self.optimize(request)).collect()
    }
}
