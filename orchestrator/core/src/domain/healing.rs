// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Healing Strategies
//!
//! Remediation rules are plain data: a [`HealingCondition`] variant, a
//! [`HealingAction`] variant and a retry budget. Matching and the
//! apply / exhaust decision are pure functions of an [`AgentMetadata`]
//! snapshot and the current time, so they can be tested without any
//! runtime state.
//!
//! ## Decision Table
//! | Agent state | Outcome |
//! |-------------|---------|
//! | `Failed`, `Paused`, `Initializing`, or `auto_heal == false` | skip |
//! | no strategy matches | skip |
//! | `healing_attempts >= max_retries` of the matched strategy | exhausted → `Failed` |
//! | otherwise | apply attempt `healing_attempts + 1` |
//!
//! Strategies are evaluated top to bottom; the first match wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::agent::{AgentId, AgentMetadata, AgentStatus, LATENCY_MS_METRIC, MEMORY_BYTES_METRIC};
use crate::domain::capability::ResourceLimits;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealingCondition {
    /// The last health check raised an error or timed out.
    Crashed,
    /// Still registered but no successful check for longer than `max_age`.
    HeartbeatStale {
        #[serde(with = "humantime_serde")]
        max_age: Duration,
    },
    LatencyAbove { limit_ms: f64 },
    MemoryAbove { limit_bytes: u64 },
    HealthBelow { threshold: f64 },
    Always,
}

impl HealingCondition {
    pub fn matches(&self, agent: &AgentMetadata, now: DateTime<Utc>) -> bool {
        match self {
            HealingCondition::Crashed => agent.last_check_failed,
            HealingCondition::HeartbeatStale { max_age } => {
                match chrono::Duration::from_std(*max_age) {
                    Ok(max_age) => agent.heartbeat_age(now) > max_age,
                    Err(_) => false,
                }
            }
            HealingCondition::LatencyAbove { limit_ms } => agent
                .metric(LATENCY_MS_METRIC)
                .is_some_and(|latency| latency > *limit_ms),
            HealingCondition::MemoryAbove { limit_bytes } => agent
                .metric(MEMORY_BYTES_METRIC)
                .is_some_and(|memory| memory > *limit_bytes as f64),
            HealingCondition::HealthBelow { threshold } => agent.health < *threshold,
            HealingCondition::Always => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealingAction {
    RestartInPlace,
    KillAndRestart,
    RestartWithConstrainedResources {
        #[serde(default)]
        limits: ResourceLimits,
    },
}

impl HealingAction {
    pub fn kind(&self) -> &'static str {
        match self {
            HealingAction::RestartInPlace => "restart_in_place",
            HealingAction::KillAndRestart => "kill_and_restart",
            HealingAction::RestartWithConstrainedResources { .. } => "restart_with_constrained_resources",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingStrategy {
    pub name: String,
    pub condition: HealingCondition,
    pub action: HealingAction,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl HealingStrategy {
    pub fn new(name: impl Into<String>, condition: HealingCondition, action: HealingAction) -> Self {
        Self {
            name: name.into(),
            condition,
            action,
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    /// Delay before remediation attempt `attempt` (1-based): `base * factor^(attempt-1)`.
    pub fn backoff(&self, base: Duration, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor >= 1.0 {
            self.backoff_factor
        } else {
            1.0
        };
        base.mul_f64(factor.powi(exponent))
    }
}

/// Built-in strategy list used when the configuration names none.
///
/// A heartbeat only goes stale through failed checks, so `restart-stale`
/// must come before `restart-on-crash` to ever be selected.
pub fn default_strategies(health_threshold: f64) -> Vec<HealingStrategy> {
    vec![
        HealingStrategy::new(
            "restart-stale",
            HealingCondition::HeartbeatStale { max_age: Duration::from_secs(60) },
            HealingAction::KillAndRestart,
        ),
        HealingStrategy::new("restart-on-crash", HealingCondition::Crashed, HealingAction::RestartInPlace),
        HealingStrategy::new(
            "constrain-memory",
            HealingCondition::MemoryAbove { limit_bytes: 1 << 30 },
            HealingAction::RestartWithConstrainedResources {
                limits: ResourceLimits { cpu_millis: None, memory_bytes: Some(1 << 30) },
            },
        )
        .with_max_retries(2),
        HealingStrategy::new(
            "restart-degraded",
            HealingCondition::HealthBelow { threshold: health_threshold },
            HealingAction::RestartInPlace,
        ),
    ]
}

/// First strategy whose condition matches, in declaration order.
pub fn select_strategy<'a>(
    strategies: &'a [HealingStrategy],
    agent: &AgentMetadata,
    now: DateTime<Utc>,
) -> Option<&'a HealingStrategy> {
    strategies.iter().find(|s| s.condition.matches(agent, now))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Terminal,
    Paused,
    NotInitialized,
    AutoHealDisabled,
    NoMatchingStrategy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HealingDecision {
    Skip(SkipReason),
    Apply {
        strategy: HealingStrategy,
        attempt: u32,
    },
    Exhausted(HealingExhaustedError),
}

/// Decide what to do with an unhealthy agent snapshot.
pub fn plan_remediation(
    strategies: &[HealingStrategy],
    agent: &AgentMetadata,
    now: DateTime<Utc>,
) -> HealingDecision {
    match agent.status {
        AgentStatus::Failed => return HealingDecision::Skip(SkipReason::Terminal),
        AgentStatus::Paused => return HealingDecision::Skip(SkipReason::Paused),
        AgentStatus::Initializing => return HealingDecision::Skip(SkipReason::NotInitialized),
        AgentStatus::Active | AgentStatus::Healing => {}
    }
    if !agent.auto_heal {
        return HealingDecision::Skip(SkipReason::AutoHealDisabled);
    }
    let Some(strategy) = select_strategy(strategies, agent, now) else {
        return HealingDecision::Skip(SkipReason::NoMatchingStrategy);
    };
    if agent.healing_attempts >= strategy.max_retries {
        return HealingDecision::Exhausted(HealingExhaustedError {
            agent_id: agent.id.clone(),
            strategy: strategy.name.clone(),
            attempts: agent.healing_attempts,
        });
    }
    HealingDecision::Apply {
        strategy: strategy.clone(),
        attempt: agent.healing_attempts + 1,
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Healing exhausted for agent {agent_id}: strategy '{strategy}' used {attempts} attempts")]
pub struct HealingExhaustedError {
    pub agent_id: AgentId,
    pub strategy: String,
    pub attempts: u32,
}

#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("Remediation timed out after {0} ms")]
    Timeout(u64),
    #[error("Remediation failed: {0}")]
    Failed(String),
    #[error("No agent handle registered for {0}")]
    MissingHandle(AgentId),
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_agent(health: f64) -> AgentMetadata {
        let mut agent = AgentMetadata::new("a1", "a1");
        agent.status = AgentStatus::Active;
        agent.health = health;
        agent
    }

    #[test]
    fn test_first_match_wins() {
        let strategies = vec![
            HealingStrategy::new("crash", HealingCondition::Crashed, HealingAction::KillAndRestart),
            HealingStrategy::new("degraded", HealingCondition::HealthBelow { threshold: 0.5 }, HealingAction::RestartInPlace),
            HealingStrategy::new("catch-all", HealingCondition::Always, HealingAction::RestartInPlace),
        ];

        let mut agent = active_agent(0.3);
        let now = Utc::now();
        assert_eq!(select_strategy(&strategies, &agent, now).unwrap().name, "degraded");

        agent.last_check_failed = true;
        assert_eq!(select_strategy(&strategies, &agent, now).unwrap().name, "crash");

        agent.last_check_failed = false;
        agent.health = 0.9;
        assert_eq!(select_strategy(&strategies, &agent, now).unwrap().name, "catch-all");
    }

    #[test]
    fn test_default_strategies_escalate_stale_crash() {
        let strategies = default_strategies(0.5);
        let now = Utc::now();
        let mut agent = active_agent(0.0);
        agent.last_check_failed = true;

        let strategy = select_strategy(&strategies, &agent, now).unwrap();
        assert_eq!(strategy.name, "restart-on-crash");
        assert_eq!(strategy.action, HealingAction::RestartInPlace);

        // Checks kept failing long enough for the heartbeat to go stale
        agent.last_heartbeat = now - chrono::Duration::seconds(75);
        let strategy = select_strategy(&strategies, &agent, now).unwrap();
        assert_eq!(strategy.name, "restart-stale");
        assert_eq!(strategy.action, HealingAction::KillAndRestart);

        agent.last_check_failed = false;
        agent.last_heartbeat = now;
        agent.health = 0.2;
        assert_eq!(select_strategy(&strategies, &agent, now).unwrap().name, "restart-degraded");
    }

    #[test]
    fn test_signal_conditions() {
        let now = Utc::now();
        let mut agent = active_agent(1.0);
        agent.metrics.insert(LATENCY_MS_METRIC.to_string(), 250.0);
        agent.metrics.insert(MEMORY_BYTES_METRIC.to_string(), 2048.0);

        assert!(HealingCondition::LatencyAbove { limit_ms: 200.0 }.matches(&agent, now));
        assert!(!HealingCondition::LatencyAbove { limit_ms: 300.0 }.matches(&agent, now));
        assert!(HealingCondition::MemoryAbove { limit_bytes: 1024 }.matches(&agent, now));
        assert!(!HealingCondition::MemoryAbove { limit_bytes: 4096 }.matches(&agent, now));

        agent.last_heartbeat = now - chrono::Duration::seconds(120);
        assert!(HealingCondition::HeartbeatStale { max_age: Duration::from_secs(60) }.matches(&agent, now));
        assert!(!HealingCondition::HeartbeatStale { max_age: Duration::from_secs(600) }.matches(&agent, now));
    }

    #[test]
    fn test_plan_counts_attempts_then_exhausts() {
        let strategies = vec![
            HealingStrategy::new("restart", HealingCondition::Always, HealingAction::RestartInPlace).with_max_retries(3),
        ];
        let mut agent = active_agent(0.0);
        let now = Utc::now();

        for expected in 1..=3 {
            match plan_remediation(&strategies, &agent, now) {
                HealingDecision::Apply { attempt, .. } => assert_eq!(attempt, expected),
                other => panic!("expected apply, got {:?}", other),
            }
            agent.healing_attempts = expected;
            agent.status = AgentStatus::Healing;
        }

        match plan_remediation(&strategies, &agent, now) {
            HealingDecision::Exhausted(err) => {
                assert_eq!(err.strategy, "restart");
                assert_eq!(err.attempts, 3);
            }
            other => panic!("expected exhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_skips() {
        let strategies = vec![HealingStrategy::new("any", HealingCondition::Always, HealingAction::RestartInPlace)];
        let now = Utc::now();

        let mut agent = active_agent(0.0);
        agent.status = AgentStatus::Failed;
        assert_eq!(plan_remediation(&strategies, &agent, now), HealingDecision::Skip(SkipReason::Terminal));

        agent.status = AgentStatus::Paused;
        assert_eq!(plan_remediation(&strategies, &agent, now), HealingDecision::Skip(SkipReason::Paused));

        let agent = active_agent(0.0).with_auto_heal(false);
        assert_eq!(plan_remediation(&strategies, &agent, now), HealingDecision::Skip(SkipReason::AutoHealDisabled));

        let agent = active_agent(0.9);
        assert_eq!(plan_remediation(&[], &agent, now), HealingDecision::Skip(SkipReason::NoMatchingStrategy));
    }

    #[test]
    fn test_backoff_grows_by_factor() {
        let strategy = HealingStrategy::new("s", HealingCondition::Always, HealingAction::RestartInPlace)
            .with_backoff_factor(2.0);
        let base = Duration::from_millis(100);
        assert_eq!(strategy.backoff(base, 1), Duration::from_millis(100));
        assert_eq!(strategy.backoff(base, 2), Duration::from_millis(200));
        assert_eq!(strategy.backoff(base, 3), Duration::from_millis(400));
        assert_eq!(strategy.backoff(Duration::ZERO, 5), Duration::ZERO);
    }

    #[test]
    fn test_strategy_yaml_shape() {
        let yaml = r#"
name: constrain
condition:
  type: memory_above
  limit_bytes: 1024
action:
  type: restart_with_constrained_resources
  limits:
    memory_bytes: 512
max_retries: 2
"#;
        let strategy: HealingStrategy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(strategy.condition, HealingCondition::MemoryAbove { limit_bytes: 1024 });
        assert_eq!(strategy.max_retries, 2);
        assert_eq!(strategy.backoff_factor, 2.0);
        assert_eq!(strategy.action.kind(), "restart_with_constrained_resources");
    }
}
