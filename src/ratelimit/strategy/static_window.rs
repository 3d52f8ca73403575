//! Static (clock-aligned) window strategy.

use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::ratelimit::rules::EntityRules;
use crate::store::StateMap;

use super::{change_state, evaluate, window_start_index, Strategy, TimeUnit};

/// Fixed window aligned to multiples of each sub-rate's duration.
///
/// Unlike the sliding variant the window does not move with the request:
/// every instant inside the same aligned interval shares one window start,
/// and the admitted count may reach the limit inclusively (`<=` rather than
/// the sliding window's strict `<`). The asymmetry is intentional.
pub struct StaticWindow {
    unit: TimeUnit,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for StaticWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticWindow")
            .field("unit", &self.unit)
            .finish_non_exhaustive()
    }
}

impl StaticWindow {
    pub fn new(unit: TimeUnit) -> Self {
        Self {
            unit,
            clock: Arc::new(SystemClock::new()),
        }
    }

    #[cfg(test)]
    fn with_clock(unit: TimeUnit, clock: Arc<dyn Clock>) -> Self {
        Self { unit, clock }
    }

    fn now_ticks(&self) -> i64 {
        self.unit.ticks(self.clock.now())
    }
}

impl Strategy for StaticWindow {
    fn allowed(&self, rules: &HashMap<String, EntityRules>, state: &StateMap) -> Result<bool> {
        let current_time = self.now_ticks();
        evaluate(rules, state, |attribute_rule, attribute_state| {
            let log_count = attribute_state.logs.len();
            for sub_rate in &attribute_rule.rates {
                let window_size = sub_rate.duration;
                let window_start = window_size * (current_time / window_size);
                let idx = window_start_index(&attribute_state.logs, window_start);
                if (log_count - idx) as i64 > sub_rate.limit {
                    return false;
                }
            }
            true
        })
    }

    fn update_state(
        &self,
        rules: &HashMap<String, EntityRules>,
        state: &mut StateMap,
    ) -> Result<()> {
        let current_time = self.now_ticks();
        change_state(rules, state, |attribute_rule, attribute_state| {
            // purge everything before the widest sub-rate's aligned window
            let window_size = attribute_rule
                .rates
                .iter()
                .map(|rate| rate.duration)
                .max()
                .unwrap_or_default();
            let window_start = if window_size > 0 {
                window_size * (current_time / window_size)
            } else {
                current_time
            };
            let idx = window_start_index(&attribute_state.logs, window_start);

            attribute_state.logs.drain(..idx);
            attribute_state.logs.push(current_time);
            attribute_state.last_updated = current_time;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::ratelimit::rules::Rate;
    use crate::ratelimit::strategy::testing::{rate_attribute, rule_map, state_map};
    use crate::store::AttributeState;

    fn strategy_at(nanos: i64) -> StaticWindow {
        StaticWindow::with_clock(TimeUnit::Nanoseconds, Arc::new(ManualClock::at_nanos(nanos)))
    }

    fn logs_state(logs: Vec<i64>) -> AttributeState {
        let last_updated = logs.last().copied().unwrap_or_default();
        AttributeState {
            logs,
            last_updated,
            ..Default::default()
        }
    }

    #[test]
    fn test_count_at_limit_still_allowed() {
        let strategy = strategy_at(1_999);
        let rules = rule_map(
            "user",
            "alice",
            rate_attribute(vec![Rate {
                duration: 1_000,
                limit: 2,
            }]),
        );
        // window start aligns to 1000; both entries inside; 2 <= 2 passes
        let state = state_map("user", "alice", logs_state(vec![1_500, 1_800]));

        assert!(strategy.allowed(&rules, &state).unwrap());
    }

    #[test]
    fn test_count_above_limit_denied() {
        let strategy = strategy_at(1_999);
        let rules = rule_map(
            "user",
            "alice",
            rate_attribute(vec![Rate {
                duration: 1_000,
                limit: 2,
            }]),
        );
        let state = state_map("user", "alice", logs_state(vec![1_200, 1_500, 1_800]));

        assert!(!strategy.allowed(&rules, &state).unwrap());
    }

    #[test]
    fn test_fresh_window_forgets_prior_logs() {
        let rules = rule_map(
            "user",
            "alice",
            rate_attribute(vec![Rate {
                duration: 1_000,
                limit: 2,
            }]),
        );
        let state = state_map("user", "alice", logs_state(vec![1_500, 1_800]));

        // one tick later the window boundary at 2000 resets the count
        let strategy = strategy_at(2_000);
        assert!(strategy.allowed(&rules, &state).unwrap());
    }

    #[test]
    fn test_update_purges_below_aligned_start() {
        let strategy = strategy_at(2_300);
        let rules = rule_map(
            "user",
            "alice",
            rate_attribute(vec![Rate {
                duration: 1_000,
                limit: 5,
            }]),
        );
        let mut state = state_map("user", "alice", logs_state(vec![1_500, 1_800, 2_100]));

        strategy.update_state(&rules, &mut state).unwrap();

        let counter = &state["user:alice"].attributes["ip:1.2.3.4"];
        // aligned start is 2000: the 1xxx entries fall away
        assert_eq!(counter.logs, vec![2_100, 2_300]);
        assert_eq!(counter.last_updated, 2_300);
    }

    #[test]
    fn test_window_start_is_always_a_duration_multiple() {
        let rules = rule_map(
            "user",
            "alice",
            rate_attribute(vec![Rate {
                duration: 700,
                limit: 1,
            }]),
        );
        let clock = Arc::new(ManualClock::at_nanos(0));
        let strategy = StaticWindow::with_clock(TimeUnit::Nanoseconds, clock.clone());

        let mut state = StateMap::new();
        for tick in [0, 650, 699, 700, 1_399, 1_400] {
            clock.set_nanos(tick);
            strategy.update_state(&rules, &mut state).unwrap();

            let logs = &state["user:alice"].attributes["ip:1.2.3.4"].logs;
            let aligned_start = 700 * (tick / 700);
            assert!(
                logs.iter().all(|&t| t >= aligned_start),
                "log retains entries before window start {} at tick {}",
                aligned_start,
                tick
            );
        }
    }
}
