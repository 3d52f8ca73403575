//! Limit request model and wildcard helpers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, SluiceError};
use crate::key::ALL_ATTRIBUTE;

/// A request to be checked against the configured limits.
///
/// Maps each entity name to its type and the attribute values the request
/// carries for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitRequest {
    /// entity name -> entity type + attribute map
    #[serde(default)]
    pub parameters: HashMap<String, EntityParameters>,

    /// Optional identifier for log correlation
    #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// One entity in a limit request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityParameters {
    #[serde(rename = "entityType")]
    pub entity_type: String,

    /// attribute type -> attribute value
    #[serde(rename = "attributesMap")]
    pub attributes: HashMap<String, String>,
}

impl LimitRequest {
    /// Attach the wildcard attribute to one entity, so rules scoped to any
    /// value of that entity type also match.
    ///
    /// Fails when the named entity is absent from the request or its type
    /// does not match.
    pub fn add_wildcard_attribute(&mut self, entity_type: &str, entity_name: &str) -> Result<()> {
        match self.parameters.get_mut(entity_name) {
            Some(entity) if entity.entity_type == entity_type => {
                entity
                    .attributes
                    .insert(ALL_ATTRIBUTE.to_string(), ALL_ATTRIBUTE.to_string());
                Ok(())
            }
            _ => Err(SluiceError::InvalidRequest(format!(
                "no entity named {} with type {} in request parameters",
                entity_name, entity_type
            ))),
        }
    }

    /// Attach the wildcard entity carrying the given attributes, so rules
    /// scoped to any entity also apply to this request.
    pub fn add_wildcard_entity(&mut self, attributes: HashMap<String, String>) -> Result<()> {
        if attributes.is_empty() {
            return Err(SluiceError::InvalidRequest(
                "cannot attach wildcard entity with empty attributes".to_string(),
            ));
        }
        self.parameters.insert(
            crate::key::ALL_ENTITY.to_string(),
            EntityParameters {
                entity_type: crate::key::ALL_ENTITY.to_string(),
                attributes,
            },
        );
        Ok(())
    }

    /// Attach the wildcard attribute to every entity in the request.
    /// Called by the limiter before rule matching.
    pub(crate) fn add_wildcard_attributes(&mut self) {
        for entity in self.parameters.values_mut() {
            entity
                .attributes
                .insert(ALL_ATTRIBUTE.to_string(), ALL_ATTRIBUTE.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(entity_name: &str, entity_type: &str) -> LimitRequest {
        let mut request = LimitRequest::default();
        request.parameters.insert(
            entity_name.to_string(),
            EntityParameters {
                entity_type: entity_type.to_string(),
                attributes: HashMap::from([("ip".to_string(), "1.2.3.4".to_string())]),
            },
        );
        request
    }

    #[test]
    fn test_wildcard_attribute_added_for_all_entities() {
        let mut request = request_with("alice", "user");
        request.add_wildcard_attributes();

        let attrs = &request.parameters["alice"].attributes;
        assert_eq!(attrs.get(ALL_ATTRIBUTE).map(String::as_str), Some(ALL_ATTRIBUTE));
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn test_wildcard_attribute_requires_matching_type() {
        let mut request = request_with("alice", "user");

        assert!(request.add_wildcard_attribute("user", "alice").is_ok());
        assert!(request.add_wildcard_attribute("service", "alice").is_err());
        assert!(request.add_wildcard_attribute("user", "bob").is_err());
    }

    #[test]
    fn test_wildcard_entity_rejects_empty_attributes() {
        let mut request = request_with("alice", "user");
        assert!(request.add_wildcard_entity(HashMap::new()).is_err());

        let attrs = HashMap::from([("region".to_string(), "eu".to_string())]);
        assert!(request.add_wildcard_entity(attrs).is_ok());
        assert!(request.parameters.contains_key(crate::key::ALL_ENTITY));
    }

    #[test]
    fn test_request_deserializes_from_json() {
        let json = r#"{
            "parameters": {
                "alice": {
                    "entityType": "user",
                    "attributesMap": {"ip": "1.2.3.4"}
                }
            },
            "requestId": "req-77"
        }"#;
        let request: LimitRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.request_id.as_deref(), Some("req-77"));
        assert_eq!(request.parameters["alice"].entity_type, "user");
    }
}
