//! In-process state store backend.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::info;

use crate::config::MemoryConfig;
use crate::error::{Result, SluiceError};
use crate::key::{form_key, key_part};

use super::ttl::{EvictionListener, TtlCache};
use super::{AttributeState, EntityState, StateMap, StateRequest, StateStore};

/// State store backed by an in-process TTL cache.
///
/// A single mutex serializes every `get_state`/`set_state` call, so each
/// call is individually linearizable. The read-compute-write sequence of a
/// full admission check still spans two calls and is not atomic.
///
/// Reads are **strict**: a single requested attribute with no stored state
/// fails the whole call. This differs from the Redis backend on purpose;
/// the remote path degrades by omission instead.
pub struct MemoryStore {
    lock: Mutex<()>,
    cache: TtlCache<AttributeState>,
}

impl MemoryStore {
    /// Create a store from the configured TTL parameters, logging evictions
    /// as entities get dropped.
    pub fn new(config: &MemoryConfig) -> Self {
        let listener: EvictionListener = Box::new(|key: &str, _reason| {
            let entity_type = key_part(key, 0).unwrap_or_default();
            let entity_name = key_part(key, 1).unwrap_or_default();
            info!(
                entity = entity_name,
                entity_type = entity_type,
                "Dropping state for entity"
            );
        });

        let to_duration = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        Self {
            lock: Mutex::new(()),
            cache: TtlCache::new(
                to_duration(config.expiration_ms),
                to_duration(config.cleanup_interval_ms),
                Some(listener),
            ),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_state(&self, request: &StateRequest) -> Result<StateMap> {
        let _guard = self.lock.lock();

        let mut state_map = StateMap::new();

        for (entity_key, entity_request) in request {
            let mut attributes = std::collections::HashMap::new();

            for attribute in &entity_request.attributes {
                let attribute_key = attribute.field();
                let state_key = form_key([entity_key.as_str(), attribute_key.as_str()]);
                match self.cache.get(&state_key) {
                    Some(state) => {
                        attributes.insert(attribute_key, state);
                    }
                    None => return Err(SluiceError::MissingState(state_key)),
                }
            }

            if !attributes.is_empty() {
                state_map.insert(
                    entity_key.clone(),
                    EntityState {
                        entity_type: entity_request.entity_type.clone(),
                        entity_name: entity_request.entity_name.clone(),
                        attributes,
                    },
                );
            }
        }

        Ok(state_map)
    }

    async fn set_state(&self, state: &StateMap) -> Result<()> {
        let _guard = self.lock.lock();

        for (entity_key, entity_state) in state {
            for (attribute_key, attribute_state) in &entity_state.attributes {
                let state_key = form_key([entity_key.as_str(), attribute_key.as_str()]);
                self.cache.set(&state_key, attribute_state.clone());
            }
        }

        Ok(())
    }
}
