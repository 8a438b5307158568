//! Planner configuration, loadable from JSON.
//!
//! Every section has defaults, so a config file only needs the values it
//! changes:
//!
//! ```json
//! { "ga": { "population_size": 100 }, "conflicts": { "separation": 45.0 } }
//! ```

use crate::conflict::ConflictConfig;
use crate::error::ScenarioError;
use crate::exact::SchedulerConfig;
use crate::heuristics::astar::PathfinderConfig;
use crate::heuristics::candidates::CandidateConfig;
use crate::heuristics::genetic::GAConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub pathfinder: PathfinderConfig,
    pub conflicts: ConflictConfig,
    pub candidates: CandidateConfig,
    pub ga: GAConfig,
    pub scheduler: SchedulerConfig,
    /// Run the GA first in exact mode and hand its result to the scheduler
    pub ga_warm_start: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            pathfinder: PathfinderConfig::default(),
            conflicts: ConflictConfig::default(),
            candidates: CandidateConfig::default(),
            ga: GAConfig::default(),
            scheduler: SchedulerConfig::default(),
            ga_warm_start: true,
        }
    }
}

impl PlannerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Seed for the genetic search
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.ga.seed = Some(seed);
        self
    }

    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.scheduler.time_limit = seconds;
        self.ga.time_limit = Some(seconds);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PlannerConfig =
            serde_json::from_str(r#"{"ga": {"population_size": 12}, "conflicts": {"separation": 45.0}}"#).unwrap();
        assert_eq!(config.ga.population_size, 12);
        assert_eq!(config.ga.max_generations, GAConfig::default().max_generations);
        assert_eq!(config.conflicts.separation, 45.0);
        assert_eq!(config.candidates.k_paths, 3);
        assert!(config.scheduler.warm_start.is_none());
        assert!(config.ga_warm_start);
    }

    #[test]
    fn test_overrides() {
        let config = PlannerConfig::default().with_seed(7).with_time_limit(5.0);
        assert_eq!(config.ga.seed, Some(7));
        assert_eq!(config.scheduler.time_limit, 5.0);
    }
}
