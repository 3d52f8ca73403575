//! Token bucket strategy.

use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::ratelimit::rules::EntityRules;
use crate::store::StateMap;

use super::{change_state, evaluate, Strategy, TimeUnit};

/// Token bucket with lazy refill.
///
/// Refill is computed on demand from the time elapsed since the counter was
/// last stamped; there is no background ticking. The refill seen during a
/// check is not persisted by the update, which only debits the stored
/// bucket and stamps the time; the next check recomputes refill from that
/// stamp. Changing this to accumulate refill incrementally would change
/// observable admission behavior.
pub struct TokenBucket {
    unit: TimeUnit,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("unit", &self.unit)
            .finish_non_exhaustive()
    }
}

impl TokenBucket {
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

impl Strategy for TokenBucket {
    fn allowed(&self, rules: &HashMap<String, EntityRules>, state: &StateMap) -> Result<bool> {
        let current_time = self.now_ticks();
        evaluate(rules, state, |attribute_rule, attribute_state| {
            let Some(bucket) = &attribute_rule.bucket else {
                // not a bucket rule, nothing for this strategy to deny on
                return true;
            };

            let elapsed = (current_time - attribute_state.last_updated) as f64;
            let refill = (bucket.refill as f64 * (elapsed / bucket.duration as f64)).round() as i64;
            let tokens = bucket.maximum.min(attribute_state.bucket + refill);
            tokens - bucket.cost >= 0
        })
    }

    fn update_state(
        &self,
        rules: &HashMap<String, EntityRules>,
        state: &mut StateMap,
    ) -> Result<()> {
        let current_time = self.now_ticks();
        change_state(rules, state, |attribute_rule, attribute_state| {
            let Some(bucket) = &attribute_rule.bucket else {
                return;
            };
            attribute_state.bucket -= bucket.cost;
            attribute_state.last_updated = current_time;
        });
        Ok(())
    }
}
