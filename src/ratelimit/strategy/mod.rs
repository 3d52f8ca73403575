//! Admission strategies.
//!
//! A strategy decides admissibility from matched rules plus current state,
//! and evolves that state in memory after an admit. Strategies never touch
//! the store; the limiter hands them a state snapshot and persists whatever
//! they mutated.

mod bucket;
mod rolling;
mod static_window;

pub use bucket::TokenBucket;
pub use rolling::SlidingWindow;
pub use static_window::StaticWindow;

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::StrategyConfig;
use crate::error::{Result, SluiceError};
use crate::key::form_key;
use crate::ratelimit::rules::{AttributeRule, EntityRules};
use crate::store::{AttributeState, EntityState, StateMap};

/// The two-operation strategy contract.
///
/// Both operations are pure with respect to I/O; `update_state` mutates the
/// passed snapshot in place.
pub trait Strategy: Send + Sync + std::fmt::Debug {
    /// Check every matched attribute rule against the fetched state.
    ///
    /// Entities with rules but no recorded state pass unconditionally; a
    /// single failing attribute denies the whole request. A rule and a
    /// state disagreeing about the entity behind the same key is a fatal
    /// evaluation error.
    fn allowed(&self, rules: &HashMap<String, EntityRules>, state: &StateMap) -> Result<bool>;

    /// Record consumption for every matched attribute rule, synthesizing
    /// zero-valued counters where no state exists yet.
    fn update_state(&self, rules: &HashMap<String, EntityRules>, state: &mut StateMap)
        -> Result<()>;
}

/// Build a strategy from its configuration tags.
///
/// Unknown strategy or time unit tags are construction-time errors.
pub fn from_config(config: &StrategyConfig) -> Result<Box<dyn Strategy>> {
    let unit = TimeUnit::parse(&config.time_unit)?;
    match config.kind.as_str() {
        "rolling_window" => Ok(Box::new(SlidingWindow::new(unit))),
        "static_window" => Ok(Box::new(StaticWindow::new(unit))),
        "fixed_bucket" => Ok(Box::new(TokenBucket::new(unit))),
        other => Err(SluiceError::UnknownStrategy(other.to_string())),
    }
}

/// Granularity every rule duration and stored timestamp is expressed in.
/// Fixed at construction; never mixed across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
}

impl TimeUnit {
    pub fn parse(unit: &str) -> Result<Self> {
        match unit {
            "ns" => Ok(TimeUnit::Nanoseconds),
            "us" => Ok(TimeUnit::Microseconds),
            "ms" => Ok(TimeUnit::Milliseconds),
            "s" => Ok(TimeUnit::Seconds),
            other => Err(SluiceError::UnknownTimeUnit(other.to_string())),
        }
    }

    /// Map a wall-clock instant to integer ticks. Clocks before the epoch
    /// clamp to zero.
    pub fn ticks(&self, t: SystemTime) -> i64 {
        let since_epoch = t.duration_since(UNIX_EPOCH).unwrap_or_default();
        match self {
            TimeUnit::Nanoseconds => since_epoch.as_nanos() as i64,
            TimeUnit::Microseconds => since_epoch.as_micros() as i64,
            TimeUnit::Milliseconds => since_epoch.as_millis() as i64,
            TimeUnit::Seconds => since_epoch.as_secs() as i64,
        }
    }
}

/// Smallest index into the sorted log whose entry falls inside the window.
fn window_start_index(logs: &[i64], window_start: i64) -> usize {
    logs.partition_point(|&stamp| stamp < window_start)
}

/// Walk the rule map and apply `check` to every attribute that has both a
/// rule and recorded state. Short-circuits on the first failing attribute.
fn evaluate(
    rules: &HashMap<String, EntityRules>,
    state: &StateMap,
    check: impl Fn(&AttributeRule, &AttributeState) -> bool,
) -> Result<bool> {
    for (entity_key, rule) in rules {
        let Some(entity_state) = state.get(entity_key) else {
            // no prior usage recorded, nothing to deny on
            continue;
        };

        if entity_state.entity_type != rule.entity_type
            || entity_state.entity_name != rule.entity_name
        {
            return Err(SluiceError::EntityMismatch {
                rule: form_key([rule.entity_type.as_str(), rule.entity_name.as_str()]),
                state: form_key([
                    entity_state.entity_type.as_str(),
                    entity_state.entity_name.as_str(),
                ]),
            });
        }

        for attribute_rule in &rule.attributes {
            let attribute_key = form_key([
                attribute_rule.attribute_type.as_str(),
                attribute_rule.attribute_value.as_str(),
            ]);
            if let Some(attribute_state) = entity_state.attributes.get(&attribute_key) {
                if !check(attribute_rule, attribute_state) {
                    return Ok(false);
                }
            }
        }
    }

    Ok(true)
}

/// Walk the rule map and apply `apply` to the counter behind every
/// attribute rule, materializing zero-valued entities and counters first
/// where none exist.
fn change_state(
    rules: &HashMap<String, EntityRules>,
    state: &mut StateMap,
    apply: impl Fn(&AttributeRule, &mut AttributeState),
) {
    for (entity_key, entity_rule) in rules {
        let entity_state = state.entry(entity_key.clone()).or_insert_with(|| EntityState {
            entity_type: entity_rule.entity_type.clone(),
            entity_name: entity_rule.entity_name.clone(),
            attributes: HashMap::new(),
        });

        for attribute_rule in &entity_rule.attributes {
            let attribute_key = form_key([
                attribute_rule.attribute_type.as_str(),
                attribute_rule.attribute_value.as_str(),
            ]);
            let attribute_state = entity_state.attributes.entry(attribute_key).or_default();
            apply(attribute_rule, attribute_state);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::ratelimit::rules::Rate;

    fn config(kind: &str, time_unit: &str) -> StrategyConfig {
        StrategyConfig {
            kind: kind.to_string(),
            time_unit: time_unit.to_string(),
        }
    }

    #[test]
    fn test_from_config_known_tags() {
        for kind in ["rolling_window", "static_window", "fixed_bucket"] {
            assert!(from_config(&config(kind, "ns")).is_ok());
        }
    }

    #[test]
    fn test_from_config_unknown_strategy() {
        let err = from_config(&config("leaky_bucket", "ns")).unwrap_err();
        assert!(matches!(err, SluiceError::UnknownStrategy(_)));
    }

    #[test]
    fn test_from_config_unknown_time_unit() {
        let err = from_config(&config("rolling_window", "h")).unwrap_err();
        assert!(matches!(err, SluiceError::UnknownTimeUnit(_)));
    }

    #[test]
    fn test_time_unit_ticks() {
        let t = UNIX_EPOCH + std::time::Duration::from_secs(2);
        assert_eq!(TimeUnit::Seconds.ticks(t), 2);
        assert_eq!(TimeUnit::Milliseconds.ticks(t), 2_000);
        assert_eq!(TimeUnit::Microseconds.ticks(t), 2_000_000);
        assert_eq!(TimeUnit::Nanoseconds.ticks(t), 2_000_000_000);
    }

    #[test]
    fn test_window_start_index_binary_search() {
        let logs = [100, 200, 300, 400];
        assert_eq!(window_start_index(&logs, 50), 0);
        assert_eq!(window_start_index(&logs, 200), 1);
        assert_eq!(window_start_index(&logs, 250), 2);
        assert_eq!(window_start_index(&logs, 500), 4);
        assert_eq!(window_start_index(&[], 500), 0);
    }

    #[test]
    fn test_evaluate_passes_when_no_state() {
        let rules = rule_map(
            "user",
            "alice",
            rate_attribute(vec![Rate {
                duration: 1_000,
                limit: 1,
            }]),
        );
        let allowed = evaluate(&rules, &StateMap::new(), |_, _| false).unwrap();
        assert!(allowed);
    }

    #[test]
    fn test_evaluate_detects_entity_mismatch() {
        let rules = rule_map(
            "user",
            "alice",
            rate_attribute(vec![Rate {
                duration: 1_000,
                limit: 1,
            }]),
        );
        // same entity key, different identity recorded in state
        let mut state = state_map("user", "bob", AttributeState::default());
        let entity = state.remove("user:bob").unwrap();
        state.insert("user:alice".to_string(), entity);

        let err = evaluate(&rules, &state, |_, _| true).unwrap_err();
        assert!(matches!(err, SluiceError::EntityMismatch { .. }));
    }

    #[test]
    fn test_change_state_materializes_missing_counters() {
        let rules = rule_map(
            "user",
            "alice",
            rate_attribute(vec![Rate {
                duration: 1_000,
                limit: 1,
            }]),
        );
        let mut state = StateMap::new();
        change_state(&rules, &mut state, |_, attribute| {
            attribute.bucket += 1;
        });

        let entity = &state["user:alice"];
        assert_eq!(entity.entity_name, "alice");
        assert_eq!(entity.attributes["ip:1.2.3.4"].bucket, 1);
    }
}
