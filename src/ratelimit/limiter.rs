//! The rate limiter facade.
//!
//! Wires the rule cache, strategy engine and state store together per
//! request: resolve applicable rules, fetch the counters they name, let the
//! strategy decide, and (for the updating variant) persist the mutated
//! counters.

use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{LimiterConfig, StorageKind};
use crate::error::Result;
use crate::store::{state_request_from_rules, MemoryStore, RedisStore, StateStore};

use super::request::LimitRequest;
use super::rules::{EntityRules, RuleAction, RuleCache, RuleImport};
use super::strategy::{self, Strategy};

/// A configured rate limiter instance.
///
/// Each instance exclusively owns its rule cache and state store; callers
/// hold and pass the handle explicitly. Construction fails fast on unknown
/// strategy tags, unknown time units and unreachable backends.
///
/// `allowed` and `allow_and_update` are not atomic with respect to each
/// other: between the state read and the state write of one call, another
/// caller touching the same attribute key can interleave. The store
/// backends provide no cross-call transaction to close that gap.
pub struct RateLimiter {
    rule_cache: RuleCache,
    store: Arc<dyn StateStore>,
    strategy: Box<dyn Strategy>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Build a limiter from configuration, ingesting the initial rules.
    pub async fn new(config: &LimiterConfig, rules: &RuleImport) -> Result<Self> {
        let store: Arc<dyn StateStore> = match config.storage {
            StorageKind::Memory => Arc::new(MemoryStore::new(&config.memory)),
            StorageKind::Redis => {
                Arc::new(RedisStore::connect(&config.redis, &config.namespace).await?)
            }
        };
        Self::from_parts(store, strategy::from_config(&config.strategy)?, rules)
    }

    /// Build a limiter on top of an externally owned Redis connection.
    /// The connection stays owned by the caller and is never torn down here.
    pub fn from_connection(
        config: &LimiterConfig,
        conn: ConnectionManager,
        rules: &RuleImport,
    ) -> Result<Self> {
        let store = Arc::new(RedisStore::from_connection(conn, &config.namespace));
        Self::from_parts(store, strategy::from_config(&config.strategy)?, rules)
    }

    /// Assemble a limiter from explicit parts and ingest the initial rules.
    pub fn from_parts(
        store: Arc<dyn StateStore>,
        strategy: Box<dyn Strategy>,
        rules: &RuleImport,
    ) -> Result<Self> {
        let rule_cache = RuleCache::new();
        rule_cache.save_rules(rules, RuleAction::Add)?;
        Ok(Self {
            rule_cache,
            store,
            strategy,
        })
    }

    /// Check whether a request is admissible under the current rules and
    /// state, without recording any consumption.
    pub async fn allowed(&self, request: &LimitRequest) -> Result<bool> {
        let (rules, _) = match self.resolve(request) {
            Some(matched) => matched,
            None => return Ok(true),
        };

        let state_request = state_request_from_rules(&rules);
        let state = self.store.get_state(&state_request).await?;

        self.strategy.allowed(&rules, &state)
    }

    /// Check admissibility and, when the request passes, record its
    /// consumption against every matched attribute counter.
    pub async fn allow_and_update(&self, request: &LimitRequest) -> Result<bool> {
        let (rules, request_id) = match self.resolve(request) {
            Some(matched) => matched,
            None => return Ok(true),
        };

        let state_request = state_request_from_rules(&rules);
        let mut state = self.store.get_state(&state_request).await?;

        if !self.strategy.allowed(&rules, &state)? {
            debug!(request_id = %request_id, "Request denied");
            return Ok(false);
        }

        self.strategy.update_state(&rules, &mut state)?;
        self.store.set_state(&state).await?;

        Ok(true)
    }

    /// Apply a rule import to the cache. Safe to call while requests are
    /// being evaluated.
    pub fn update_rules(&self, import: &RuleImport, action: RuleAction) -> Result<()> {
        self.rule_cache.save_rules(import, action)
    }

    /// Export the stored rules for the given entity types.
    pub fn rules_for_types(&self, entity_types: &[&str]) -> HashMap<String, EntityRules> {
        self.rule_cache.rules_for_types(entity_types)
    }

    /// Wildcard-augment the request and resolve its rules. `None` when no
    /// rule matches, meaning the request is not limited.
    fn resolve(&self, request: &LimitRequest) -> Option<(HashMap<String, EntityRules>, String)> {
        let mut request = request.clone();
        request.add_wildcard_attributes();

        let request_id = request.request_id.clone().unwrap_or_else(|| "-".to_string());
        let rules = self.rule_cache.valid_rules(&request);
        if rules.is_empty() {
            info!(request_id = %request_id, "No rules in cache for request");
            return None;
        }

        debug!(
            request_id = %request_id,
            entities = rules.len(),
            "Resolved rules for request"
        );
        Some((rules, request_id))
    }
}
