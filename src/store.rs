//! In-process plan storage.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::plan::RoutePlan;
use crate::traits::PlanStore;

/// Keeps plans in memory, keyed by plan id. Saving under an existing id
/// replaces the earlier plan.
#[derive(Debug, Default)]
pub struct InMemoryPlanStore {
    plans: RwLock<HashMap<String, RoutePlan>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.plans.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.read().is_empty()
    }
}

impl PlanStore for InMemoryPlanStore {
    fn save(&self, plan: &RoutePlan) {
        self.plans.write().insert(plan.id.clone(), plan.clone());
    }

    fn load(&self, route_id: &str) -> Option<RoutePlan> {
        self.plans.read().get(route_id).cloned()
    }
}
