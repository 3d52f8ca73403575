//! State store abstraction and the per-attribute counter model.
//!
//! Two backends share one contract: an in-process TTL cache and a Redis
//! hash store. They differ deliberately on missing state: the in-process
//! backend treats any missing requested attribute as a hard error for the
//! whole call, while the Redis backend simply omits it from the result.

mod memory;
mod redis;
mod ttl;
mod wire;

pub use memory::MemoryStore;
pub use redis::RedisStore;
pub use ttl::{EvictionListener, EvictionReason, TtlCache};

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::key::form_key;
use crate::ratelimit::rules::EntityRules;

/// entity key ("type:name") -> the attribute counters wanted for it.
pub type StateRequest = HashMap<String, EntityRequest>;

/// The attributes requested for one entity.
#[derive(Debug, Clone)]
pub struct EntityRequest {
    pub entity_type: String,
    pub entity_name: String,
    pub attributes: Vec<AttributeKey>,
}

/// Identifies one attribute counter within an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeKey {
    pub attribute_type: String,
    pub attribute_value: String,
}

impl AttributeKey {
    /// The hash-field / cache-key form, "type:value".
    pub fn field(&self) -> String {
        form_key([self.attribute_type.as_str(), self.attribute_value.as_str()])
    }
}

/// entity key ("type:name") -> current state for that entity.
pub type StateMap = HashMap<String, EntityState>;

/// Current counters for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityState {
    pub entity_type: String,
    pub entity_name: String,
    /// attribute key ("type:value") -> counter
    pub attributes: HashMap<String, AttributeState>,
}

/// The usage record for one attribute.
///
/// `bucket` is only meaningful under the token bucket strategy, `logs`
/// only under the window strategies. `logs` is always sorted ascending;
/// entries are appended at the tail with a monotonic clock assumption.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeState {
    pub bucket: i64,
    pub logs: Vec<i64>,
    pub last_updated: i64,
}

/// Backing store for attribute counters.
///
/// `get_state` followed by `set_state` is not atomic: concurrent callers
/// touching the same attribute key can interleave between the two. The
/// backends make no attempt to close that gap.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch the current counters named by the request. Only entities with
    /// at least one found attribute appear in the result; see the backend
    /// docs for how each treats attributes that are absent.
    async fn get_state(&self, request: &StateRequest) -> Result<StateMap>;

    /// Persist every attribute counter in the map.
    async fn set_state(&self, state: &StateMap) -> Result<()>;
}

/// Build the state-fetch request covering every attribute rule matched for
/// a request.
pub fn state_request_from_rules(rules: &HashMap<String, EntityRules>) -> StateRequest {
    let mut request = StateRequest::new();
    for entity in rules.values() {
        let attributes = entity
            .attributes
            .iter()
            .map(|rule| AttributeKey {
                attribute_type: rule.attribute_type.clone(),
                attribute_value: rule.attribute_value.clone(),
            })
            .collect();

        let entity_key = form_key([entity.entity_type.as_str(), entity.entity_name.as_str()]);
        request.insert(
            entity_key,
            EntityRequest {
                entity_type: entity.entity_type.clone(),
                entity_name: entity.entity_name.clone(),
                attributes,
            },
        );
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::rules::AttributeRule;

    #[test]
    fn test_state_request_covers_all_rule_attributes() {
        let mut rules = HashMap::new();
        rules.insert(
            "user:alice".to_string(),
            EntityRules {
                entity_name: "alice".to_string(),
                entity_type: "user".to_string(),
                attributes: vec![
                    AttributeRule {
                        attribute_type: "ip".to_string(),
                        attribute_value: "1.2.3.4".to_string(),
                        ..Default::default()
                    },
                    AttributeRule {
                        attribute_type: "endpoint".to_string(),
                        attribute_value: "/pay".to_string(),
                        ..Default::default()
                    },
                ],
            },
        );

        let request = state_request_from_rules(&rules);
        let entity = &request["user:alice"];
        assert_eq!(entity.entity_type, "user");
        assert_eq!(entity.entity_name, "alice");
        assert_eq!(entity.attributes.len(), 2);
        assert!(entity.attributes.contains(&AttributeKey {
            attribute_type: "ip".to_string(),
            attribute_value: "1.2.3.4".to_string(),
        }));
    }

    #[test]
    fn test_attribute_key_field_form() {
        let key = AttributeKey {
            attribute_type: "ip".to_string(),
            attribute_value: "1.2.3.4".to_string(),
        };
        assert_eq!(key.field(), "ip:1.2.3.4");
    }
}
