//! Per-edge traversal costs combining base time, weather, predicted delay and
//! closure penalties.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CostError;
use crate::graph::{Edge, EdgeId, NetworkGraph};
use crate::weather::WeatherImpact;

/// Default surcharge for traversing a closed edge, in seconds (~11.5 days).
pub const DEFAULT_CLOSURE_PENALTY: f64 = 1_000_000.0;

/// Externally predicted extra travel time for one edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayPrediction {
    /// Seconds.
    pub delay: f64,
    pub confidence: f64,
}

impl DelayPrediction {
    pub const fn new(delay: f64, confidence: f64) -> Self {
        Self { delay, confidence }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostOptions {
    pub avoid_closures: bool,
    pub optimize_for_weather: bool,
    /// Added to a closed edge's cost when `avoid_closures` is set.
    pub closure_penalty: f64,
}

impl Default for CostOptions {
    fn default() -> Self {
        Self {
            avoid_closures: true,
            optimize_for_weather: true,
            closure_penalty: DEFAULT_CLOSURE_PENALTY,
        }
    }
}

/// External inputs folded into the cost model.
#[derive(Debug, Clone, Default)]
pub struct CostSignals {
    pub weather: WeatherImpact,
    pub predictions: HashMap<EdgeId, DelayPrediction>,
}

/// Where one edge's cost comes from, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub base_time: f64,
    /// Extra time from the weather multiplier.
    pub weather_delay: f64,
    /// Predicted delay weighted by its confidence.
    pub predicted_delay: f64,
    /// Closure surcharge; not real driving time.
    pub penalty: f64,
}

impl CostBreakdown {
    pub fn travel_time(&self) -> f64 {
        self.base_time + self.weather_delay + self.predicted_delay
    }

    pub fn total(&self) -> f64 {
        self.travel_time() + self.penalty
    }
}

/// Immutable cost table for one graph snapshot.
///
/// Closed edges stay traversable; they only become expensive.
#[derive(Debug, Clone)]
pub struct CostModel {
    options: CostOptions,
    costs: HashMap<EdgeId, CostBreakdown>,
}

impl CostModel {
    pub fn build(graph: &NetworkGraph, signals: &CostSignals, options: CostOptions) -> Result<Self, CostError> {
        if !options.closure_penalty.is_finite() || options.closure_penalty < 0.0 {
            return Err(CostError::InvalidOptions(format!(
                "closure penalty {} must be finite and non-negative",
                options.closure_penalty
            )));
        }

        let mut costs = HashMap::with_capacity(graph.stats().edges);
        for edge in graph.edges() {
            let multiplier = if options.optimize_for_weather {
                signals.weather.multiplier_for(graph, edge)
            } else {
                None
            };
            let prediction = signals.predictions.get(&edge.id).copied();
            costs.insert(edge.id, edge_cost(edge, multiplier, prediction, &options)?);
        }

        Ok(Self { options, costs })
    }

    pub fn options(&self) -> &CostOptions {
        &self.options
    }

    /// Penalized cost used by the optimizer. Unknown edges cost infinity.
    pub fn cost(&self, edge: EdgeId) -> f64 {
        self.costs
            .get(&edge)
            .map_or(f64::INFINITY, CostBreakdown::total)
    }

    /// Expected seconds to drive the edge, without closure penalty.
    pub fn travel_time(&self, edge: EdgeId) -> f64 {
        self.costs.get(&edge).map_or(f64::INFINITY, CostBreakdown::travel_time)
    }

    pub fn breakdown(&self, edge: EdgeId) -> Option<CostBreakdown> {
        self.costs.get(&edge).copied()
    }

    pub fn is_penalized(&self, edge: EdgeId) -> bool {
        self.costs.get(&edge).is_some_and(|cost| cost.penalty > 0.0)
    }
}

fn edge_cost(
    edge: &Edge,
    multiplier: Option<f64>,
    prediction: Option<DelayPrediction>,
    options: &CostOptions,
) -> Result<CostBreakdown, CostError> {
    let invalid = |reason: String| CostError::InvalidCostInput { edge: edge.id, reason };

    let multiplier = multiplier.unwrap_or(1.0);
    if !multiplier.is_finite() || multiplier < 0.0 {
        return Err(invalid(format!("weather multiplier {} must be finite and non-negative", multiplier)));
    }

    let delay = match prediction {
        Some(prediction) => {
            if !prediction.delay.is_finite() || prediction.delay < 0.0 {
                return Err(invalid(format!("predicted delay {} must be finite and non-negative", prediction.delay)));
            }
            if prediction.confidence.is_nan() {
                return Err(invalid("prediction confidence is NaN".to_string()));
            }
            prediction.delay * prediction.confidence.clamp(0.0, 1.0)
        }
        None => 0.0,
    };

    // Multipliers below 1.0 would discount the base time.
    let breakdown = CostBreakdown {
        base_time: edge.base_time,
        weather_delay: edge.base_time * (multiplier.max(1.0) - 1.0),
        predicted_delay: delay,
        penalty: if edge.closed && options.avoid_closures {
            options.closure_penalty
        } else {
            0.0
        },
    };
    if !breakdown.total().is_finite() {
        return Err(invalid(format!(
            "cost overflows: base {} x weather {} + delay {}",
            edge.base_time, multiplier, delay
        )));
    }

    Ok(breakdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, NodeId};
    use crate::haversine::Coordinate;

    fn graph(closed: bool) -> NetworkGraph {
        let mut graph = NetworkGraph::new();
        graph.add_node(Node::new(NodeId(1), Coordinate::new(0.0, 0.0))).unwrap();
        graph.add_node(Node::new(NodeId(2), Coordinate::new(0.0, 0.1))).unwrap();
        let mut edge = Edge::new(EdgeId(7), NodeId(1), NodeId(2), 100.0);
        edge.closed = closed;
        graph.add_or_update_edge(edge).unwrap();
        graph
    }

    fn signals(multiplier: f64, delay: f64, confidence: f64) -> CostSignals {
        CostSignals {
            weather: WeatherImpact::default().with_edge(EdgeId(7), multiplier),
            predictions: HashMap::from([(EdgeId(7), DelayPrediction::new(delay, confidence))]),
        }
    }

    #[test]
    fn test_base_cost_without_signals() {
        let model = CostModel::build(&graph(false), &CostSignals::default(), CostOptions::default()).unwrap();
        assert_eq!(model.cost(EdgeId(7)), 100.0);
        assert_eq!(model.travel_time(EdgeId(7)), 100.0);
    }

    #[test]
    fn test_weather_and_weighted_delay() {
        let model = CostModel::build(&graph(false), &signals(1.5, 40.0, 0.5), CostOptions::default()).unwrap();
        assert!((model.cost(EdgeId(7)) - 170.0).abs() < 1e-9);
    }

    #[test]
    fn test_weather_ignored_when_disabled() {
        let options = CostOptions {
            optimize_for_weather: false,
            ..CostOptions::default()
        };
        let model = CostModel::build(&graph(false), &signals(3.0, 0.0, 0.0), options).unwrap();
        assert_eq!(model.cost(EdgeId(7)), 100.0);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let high = CostModel::build(&graph(false), &signals(1.0, 10.0, 4.0), CostOptions::default()).unwrap();
        let low = CostModel::build(&graph(false), &signals(1.0, 10.0, -2.0), CostOptions::default()).unwrap();
        assert_eq!(high.cost(EdgeId(7)), 110.0);
        assert_eq!(low.cost(EdgeId(7)), 100.0);
    }

    #[test]
    fn test_never_discounted_below_base() {
        let model = CostModel::build(&graph(false), &signals(0.5, 0.0, 0.0), CostOptions::default()).unwrap();
        assert_eq!(model.cost(EdgeId(7)), 100.0);
    }

    #[test]
    fn test_negative_inputs_rejected() {
        let multiplier = CostModel::build(&graph(false), &signals(-1.0, 0.0, 0.0), CostOptions::default());
        let delay = CostModel::build(&graph(false), &signals(1.0, -5.0, 1.0), CostOptions::default());
        assert!(matches!(multiplier, Err(CostError::InvalidCostInput { edge: EdgeId(7), .. })));
        assert!(matches!(delay, Err(CostError::InvalidCostInput { edge: EdgeId(7), .. })));
    }

    #[test]
    fn test_closure_penalty_applies_only_when_avoiding() {
        let avoiding = CostModel::build(&graph(true), &CostSignals::default(), CostOptions::default()).unwrap();
        assert_eq!(avoiding.cost(EdgeId(7)), 100.0 + DEFAULT_CLOSURE_PENALTY);
        assert_eq!(avoiding.travel_time(EdgeId(7)), 100.0);
        assert!(avoiding.is_penalized(EdgeId(7)));

        let options = CostOptions {
            avoid_closures: false,
            ..CostOptions::default()
        };
        let ignoring = CostModel::build(&graph(true), &CostSignals::default(), options).unwrap();
        assert_eq!(ignoring.cost(EdgeId(7)), 100.0);
        assert!(!ignoring.is_penalized(EdgeId(7)));
    }

    #[test]
    fn test_overflowing_cost_rejected() {
        let mut graph = NetworkGraph::new();
        graph.add_node(Node::new(NodeId(1), Coordinate::new(0.0, 0.0))).unwrap();
        graph.add_node(Node::new(NodeId(2), Coordinate::new(0.0, 0.1))).unwrap();
        graph.add_or_update_edge(Edge::new(EdgeId(1), NodeId(1), NodeId(2), 1e308)).unwrap();
        let signals = CostSignals {
            weather: WeatherImpact::default().with_edge(EdgeId(1), 2.0),
            ..CostSignals::default()
        };

        let result = CostModel::build(&graph, &signals, CostOptions::default());
        assert!(matches!(result, Err(CostError::InvalidCostInput { edge: EdgeId(1), .. })));
    }

    #[test]
    fn test_invalid_penalty_is_an_options_error() {
        let options = CostOptions {
            closure_penalty: f64::NAN,
            ..CostOptions::default()
        };
        let result = CostModel::build(&graph(false), &CostSignals::default(), options);
        assert!(matches!(result, Err(CostError::InvalidOptions(_))));
    }

    #[test]
    fn test_breakdown_splits_signals() {
        let model = CostModel::build(&graph(true), &signals(1.5, 40.0, 0.5), CostOptions::default()).unwrap();
        let breakdown = model.breakdown(EdgeId(7)).unwrap();
        assert_eq!(breakdown.base_time, 100.0);
        assert!((breakdown.weather_delay - 50.0).abs() < 1e-9);
        assert!((breakdown.predicted_delay - 20.0).abs() < 1e-9);
        assert_eq!(breakdown.penalty, DEFAULT_CLOSURE_PENALTY);
        assert!((model.travel_time(EdgeId(7)) - 170.0).abs() < 1e-9);
        assert!(model.breakdown(EdgeId(99)).is_none());
    }

    #[test]
    fn test_unknown_edge_is_impassable() {
        let model = CostModel::build(&graph(false), &CostSignals::default(), CostOptions::default()).unwrap();
        assert!(model.cost(EdgeId(99)).is_infinite());
    }
}
