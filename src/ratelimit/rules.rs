//! Rate limit rule model, import format and the rule cache.
//!
//! Rules are keyed by (entity type, attribute type, attribute value) and
//! matched against incoming requests. Exactly one rule may exist per key;
//! imports that collide fail per rule rather than silently overwriting.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, SluiceError};
use crate::key::{form_key, split_key};

use super::request::LimitRequest;

/// A rule import document: entity type -> rule group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleImport {
    #[serde(rename = "ruleMap")]
    pub entity_rules: HashMap<String, EntityRules>,
}

/// The rules attached to one entity.
///
/// At the definition level only the entity type participates in matching;
/// the name is filled in when rules are resolved for a concrete request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRules {
    #[serde(default, rename = "name")]
    pub entity_name: String,

    #[serde(rename = "type")]
    pub entity_type: String,

    #[serde(rename = "attributes")]
    pub attributes: Vec<AttributeRule>,
}

/// A limit on one attribute dimension of an entity.
///
/// Carries either `rates` (window strategies; multiple rates are ANDed) or
/// `bucket` (token bucket strategy). The two are mutually exclusive by
/// contract; strategies only read the field they understand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "type")]
    pub attribute_type: String,

    #[serde(rename = "value")]
    pub attribute_value: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rates: Vec<Rate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<Bucket>,
}

/// One (duration, limit) pair. The duration is expressed in the integer
/// ticks of the limiter's configured time unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub duration: i64,
    pub limit: i64,
}

/// Token bucket parameters: `refill` tokens flow back per `duration` ticks,
/// each admitted request costs `cost`, and the bucket never holds more than
/// `maximum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub duration: i64,
    pub refill: i64,
    pub cost: i64,
    pub maximum: i64,
}

/// What a rule import should do to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Add,
    Update,
    Delete,
}

/// Mutable, concurrently readable store of attribute rules.
///
/// Reads during request evaluation and writes from rule imports may run
/// concurrently; the backing map provides per-key locking.
#[derive(Debug, Default)]
pub struct RuleCache {
    rules: DashMap<String, AttributeRule>,
}

impl RuleCache {
    pub fn new() -> Self {
        Self {
            rules: DashMap::new(),
        }
    }

    /// Apply a rule import to the cache.
    ///
    /// Rules are applied independently: a failure on one rule does not stop
    /// the rest of the batch. The first error encountered is returned once
    /// the whole import has been attempted.
    pub fn save_rules(&self, import: &RuleImport, action: RuleAction) -> Result<()> {
        let mut first_error = None;

        for entity in import.entity_rules.values() {
            if entity.attributes.is_empty() {
                first_error.get_or_insert(SluiceError::EmptyRuleGroup(entity.entity_type.clone()));
                continue;
            }

            for attribute in &entity.attributes {
                let cache_key = form_key([
                    entity.entity_type.as_str(),
                    attribute.attribute_type.as_str(),
                    attribute.attribute_value.as_str(),
                ]);

                let outcome = match action {
                    RuleAction::Delete => {
                        self.rules.remove(&cache_key);
                        Ok(())
                    }
                    RuleAction::Add => match self.rules.entry(cache_key.clone()) {
                        Entry::Occupied(_) => Err(SluiceError::DuplicateRule(cache_key)),
                        Entry::Vacant(slot) => {
                            slot.insert(attribute.clone());
                            Ok(())
                        }
                    },
                    RuleAction::Update => match self.rules.get_mut(&cache_key) {
                        Some(mut existing) => {
                            *existing = attribute.clone();
                            Ok(())
                        }
                        None => Err(SluiceError::RuleNotFound(cache_key)),
                    },
                };

                if let Err(e) = outcome {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Resolve the rules applicable to a request.
    ///
    /// For every entity, every (attribute type, value) pair present on it is
    /// looked up; entities with no matching attribute rule are omitted. An
    /// empty result means the request is not limited at all.
    pub fn valid_rules(&self, request: &LimitRequest) -> HashMap<String, EntityRules> {
        let mut result = HashMap::new();

        for (entity_name, params) in &request.parameters {
            let mut attributes = Vec::new();
            for (attribute_type, attribute_value) in &params.attributes {
                let rule_key = form_key([
                    params.entity_type.as_str(),
                    attribute_type.as_str(),
                    attribute_value.as_str(),
                ]);
                if let Some(rule) = self.rules.get(&rule_key) {
                    attributes.push(rule.clone());
                }
            }

            if !attributes.is_empty() {
                let entity_key = form_key([params.entity_type.as_str(), entity_name.as_str()]);
                result.insert(
                    entity_key,
                    EntityRules {
                        entity_name: entity_name.clone(),
                        entity_type: params.entity_type.clone(),
                        attributes,
                    },
                );
            }
        }

        result
    }

    /// Bulk export of all rules for the given entity types.
    pub fn rules_for_types(&self, entity_types: &[&str]) -> HashMap<String, EntityRules> {
        let mut result: HashMap<String, EntityRules> = HashMap::new();

        for item in self.rules.iter() {
            let parts = split_key(item.key());
            let entity_type = parts[0];
            if !entity_types.contains(&entity_type) {
                continue;
            }

            result
                .entry(entity_type.to_string())
                .or_insert_with(|| EntityRules {
                    entity_type: entity_type.to_string(),
                    ..Default::default()
                })
                .attributes
                .push(item.value().clone());
        }

        result
    }
}
