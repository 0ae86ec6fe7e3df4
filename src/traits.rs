//! Interfaces to the collaborators around the routing core.
//!
//! Weather feeds, delay predictors and plan persistence live outside this
//! crate. Applications implement these traits for their own backends.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cost::DelayPrediction;
use crate::graph::EdgeId;
use crate::plan::RoutePlan;
use crate::weather::{BoundingBox, WeatherImpact};

/// What a weather feed is asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherQuery {
    pub edges: Vec<EdgeId>,
    pub bounds: Option<BoundingBox>,
    /// Hour of day (0-23) the trip starts.
    pub departure_hour: u8,
    /// Length of the window from departure, in seconds.
    pub horizon_secs: u64,
}

/// Provides weather multipliers for a region and time window.
///
/// Edges missing from the answer default to a multiplier of 1.0.
pub trait WeatherProvider {
    fn impact_for(&self, query: &WeatherQuery) -> WeatherImpact;
}

/// Inputs the delay model scores for one edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeFeatures {
    pub edge_id: EdgeId,
    pub base_time: f64,
    pub capacity: Option<f64>,
    pub historical_load: Option<f64>,
    pub weather_multiplier: f64,
    pub hour_of_day: u8,
}

/// Inference side of the delay model.
///
/// Edges missing from the answer are treated as zero delay.
pub trait DelayPredictor {
    fn predict(&self, features: &[EdgeFeatures]) -> HashMap<EdgeId, DelayPrediction>;
}

/// Persistence for computed plans, keyed by plan id.
pub trait PlanStore {
    fn save(&self, plan: &RoutePlan);

    fn load(&self, route_id: &str) -> Option<RoutePlan>;
}

/// Stands in for absent weather and prediction feeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignals;

impl WeatherProvider for NoSignals {
    fn impact_for(&self, _query: &WeatherQuery) -> WeatherImpact {
        WeatherImpact::default()
    }
}

impl DelayPredictor for NoSignals {
    fn predict(&self, _features: &[EdgeFeatures]) -> HashMap<EdgeId, DelayPrediction> {
        HashMap::new()
    }
}
