//! HTTP adapter for a remote delay-prediction and weather-impact service.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cost::DelayPrediction;
use crate::graph::EdgeId;
use crate::traits::{DelayPredictor, EdgeFeatures, WeatherProvider, WeatherQuery};
use crate::weather::{BoundingBox, RegionImpact, WeatherConditions, WeatherImpact};

#[derive(Debug, Clone)]
pub struct SignalServiceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for SignalServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Blocking client for the signal service.
///
/// Transport and decoding failures are logged and treated as missing data,
/// so optimization falls back to base travel times.
#[derive(Debug, Clone)]
pub struct HttpSignalClient {
    config: SignalServiceConfig,
    client: reqwest::blocking::Client,
}

impl HttpSignalClient {
    pub fn new(config: SignalServiceConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn post<B, R>(&self, path: &str, body: &B) -> Result<R, reqwest::Error>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        self.client
            .post(url)
            .json(body)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<R>())
    }
}

impl DelayPredictor for HttpSignalClient {
    fn predict(&self, features: &[EdgeFeatures]) -> HashMap<EdgeId, DelayPrediction> {
        if features.is_empty() {
            return HashMap::new();
        }

        match self.post::<_, PredictResponse>("predict", &PredictRequest { features }) {
            Ok(body) => body
                .predictions
                .into_iter()
                .map(|entry| (entry.edge_id, DelayPrediction::new(entry.delay, entry.confidence)))
                .collect(),
            Err(err) => {
                warn!(error = %err, edges = features.len(), "delay prediction unavailable");
                HashMap::new()
            }
        }
    }
}

impl WeatherProvider for HttpSignalClient {
    fn impact_for(&self, query: &WeatherQuery) -> WeatherImpact {
        match self.post::<_, WeatherResponse>("weather/impact", query) {
            Ok(body) => body.into_impact(),
            Err(err) => {
                warn!(error = %err, "weather impact unavailable");
                WeatherImpact::default()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    features: &'a [EdgeFeatures],
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predictions: Vec<PredictionEntry>,
}

#[derive(Debug, Deserialize)]
struct PredictionEntry {
    edge_id: EdgeId,
    delay: f64,
    confidence: f64,
}

/// The weather service may answer with ready multipliers, raw observations
/// per region, or both.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WeatherResponse {
    per_edge: HashMap<EdgeId, f64>,
    regions: Vec<RegionImpact>,
    conditions: Vec<RegionConditions>,
}

#[derive(Debug, Deserialize)]
struct RegionConditions {
    bounds: BoundingBox,
    #[serde(flatten)]
    observed: WeatherConditions,
}

impl WeatherResponse {
    fn into_impact(self) -> WeatherImpact {
        let impact = WeatherImpact {
            per_edge: self.per_edge,
            regions: self.regions,
        };
        self.conditions
            .iter()
            .fold(impact, |impact, region| impact.with_region_conditions(region.bounds, &region.observed))
    }
}
