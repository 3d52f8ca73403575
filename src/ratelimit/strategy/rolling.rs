//! Sliding-window log strategy.

use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::ratelimit::rules::EntityRules;
use crate::store::StateMap;

use super::{change_state, evaluate, window_start_index, Strategy, TimeUnit};

/// Sliding window over a log of admission timestamps.
///
/// Each sub-rate is checked independently against the window ending at the
/// current instant; all must pass. The admitted count inside a window must
/// stay strictly below the limit.
pub struct SlidingWindow {
    unit: TimeUnit,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SlidingWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindow")
            .field("unit", &self.unit)
            .finish_non_exhaustive()
    }
}

impl SlidingWindow {
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

impl Strategy for SlidingWindow {
    fn allowed(&self, rules: &HashMap<String, EntityRules>, state: &StateMap) -> Result<bool> {
        let current_time = self.now_ticks();
        evaluate(rules, state, |attribute_rule, attribute_state| {
            let log_count = attribute_state.logs.len();
            for sub_rate in &attribute_rule.rates {
                let window_start = current_time - sub_rate.duration;
                let idx = window_start_index(&attribute_state.logs, window_start);
                if (log_count - idx) as i64 >= sub_rate.limit {
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
            // purge entries older than the widest sub-rate window
            let window_size = attribute_rule
                .rates
                .iter()
                .map(|rate| rate.duration)
                .max()
                .unwrap_or_default();
            let window_start = current_time - window_size;
            let idx = window_start_index(&attribute_state.logs, window_start);

            attribute_state.logs.drain(..idx);
            attribute_state.logs.push(current_time);
            attribute_state.last_updated = current_time;
        });
        Ok(())
    }
}
