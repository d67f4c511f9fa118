//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::model::Priority;

/// Scalar the optimizer minimizes along traversed arcs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Goal {
    #[default]
    Time,
    Distance,
}

/// Penalized target position for a priority tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftTarget {
    /// Highest position-dimension value reached without penalty.
    pub target: i64,
    /// Cost added per unit above `target`.
    pub penalty: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRule {
    /// Amount the position dimension grows when a stop of this tier is visited.
    pub increment: i64,
    #[serde(default)]
    pub soft_target: Option<SoftTarget>,
}

/// Priority to position-weight table.
///
/// Lower increments let urgent stops use up less of the position budget, and
/// the soft targets make visiting them late expensive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityPolicy {
    pub high: PriorityRule,
    pub medium: PriorityRule,
    pub low: PriorityRule,
    /// Increment for virtual terminals and vehicle start nodes.
    pub default_increment: i64,
    /// Hard cap on the position dimension per route.
    pub position_capacity: i64,
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self {
            high: PriorityRule {
                increment: 1,
                soft_target: Some(SoftTarget {
                    target: 1,
                    penalty: 50_000,
                }),
            },
            medium: PriorityRule {
                increment: 2,
                soft_target: Some(SoftTarget {
                    target: 2,
                    penalty: 10_000,
                }),
            },
            low: PriorityRule {
                increment: 3,
                soft_target: None,
            },
            default_increment: 1,
            position_capacity: 30,
        }
    }
}

impl PriorityPolicy {
    pub fn rule(&self, priority: Priority) -> &PriorityRule {
        match priority {
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Scales the guided local search penalty against the mean arc cost.
    pub gls_lambda_coefficient: f64,
    /// Upper bound on local search moves, independent of the time budget.
    pub max_iterations: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            gls_lambda_coefficient: 0.1,
            max_iterations: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum MatrixSettings {
    Valhalla {
        base_url: String,
        #[serde(default = "default_costing")]
        costing: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    Haversine {
        #[serde(default = "default_speed_kmh")]
        speed_kmh: f64,
    },
}

fn default_costing() -> String {
    "auto".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_speed_kmh() -> f64 {
    40.0
}

impl Default for MatrixSettings {
    fn default() -> Self {
        MatrixSettings::Haversine {
            speed_kmh: default_speed_kmh(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub goal: Goal,
    /// Distance each vehicle may travel per tick, in metres.
    pub travel_budget_m: f64,
    /// Wall-clock budget for one solve, in seconds.
    pub solver_time_budget_s: f64,
    /// A vehicle this close to its target incident resolves it.
    pub completion_radius_m: f64,
    /// Pause between ticks, in seconds. Zero runs ticks back to back.
    pub tick_interval_s: f64,
    /// UTM zone (north) for planar distance computations.
    pub utm_zone: u8,
    /// Hard cap on the cumulative goal cost of a single route.
    pub max_route_cost: i64,
    pub priority_policy: PriorityPolicy,
    pub solver: SolverSettings,
    pub matrix: MatrixSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            goal: Goal::Time,
            travel_budget_m: 200.0,
            solver_time_budget_s: 5.0,
            completion_radius_m: 100.0,
            tick_interval_s: 0.0,
            utm_zone: 33,
            max_route_cost: 10_000,
            priority_policy: PriorityPolicy::default(),
            solver: SolverSettings::default(),
            matrix: MatrixSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.travel_budget_m.is_finite() && self.travel_budget_m > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "travel_budget_m must be positive, got {}",
                self.travel_budget_m
            )));
        }
        if !(self.solver_time_budget_s.is_finite() && self.solver_time_budget_s > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "solver_time_budget_s must be positive, got {}",
                self.solver_time_budget_s
            )));
        }
        if !(self.completion_radius_m.is_finite() && self.completion_radius_m >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "completion_radius_m must not be negative, got {}",
                self.completion_radius_m
            )));
        }
        if !(self.tick_interval_s.is_finite() && self.tick_interval_s >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tick_interval_s must not be negative, got {}",
                self.tick_interval_s
            )));
        }
        if !(1..=60).contains(&self.utm_zone) {
            return Err(ConfigError::Invalid(format!(
                "utm_zone must be within 1..=60, got {}",
                self.utm_zone
            )));
        }
        let policy = &self.priority_policy;
        for rule in [&policy.high, &policy.medium, &policy.low] {
            if rule.increment < 0 {
                return Err(ConfigError::Invalid(
                    "priority increments must not be negative".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn solver_time_budget(&self) -> Duration {
        Duration::from_secs_f64(self.solver_time_budget_s)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.tick_interval_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.solver_time_budget(), Duration::from_secs(5));
    }

    #[test]
    fn overrides_and_tagged_provider() {
        let config = EngineConfig::from_json(
            r#"{
                "goal": "distance",
                "travel_budget_m": 350,
                "matrix": { "provider": "valhalla", "base_url": "http://localhost:8002" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.goal, Goal::Distance);
        assert_eq!(config.travel_budget_m, 350.0);
        assert_eq!(
            config.matrix,
            MatrixSettings::Valhalla {
                base_url: "http://localhost:8002".to_string(),
                costing: "auto".to_string(),
                timeout_secs: 30,
            }
        );
    }

    #[test]
    fn policy_is_configurable() {
        let config = EngineConfig::from_json(
            r#"{ "priority_policy": { "low": { "increment": 5 } } }"#,
        )
        .unwrap();
        assert_eq!(config.priority_policy.rule(Priority::Low).increment, 5);
        assert_eq!(config.priority_policy.rule(Priority::High).increment, 1);
    }

    #[test]
    fn rejects_non_positive_budget() {
        let err = EngineConfig::from_json(r#"{ "travel_budget_m": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
