//! Redis state store backend.
//!
//! One hash per entity, one field per attribute, one pipelined round trip
//! per call. All attributes of all entities in a request ride the same
//! pipeline, so network cost is paid once regardless of fan-out.

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RedisConfig;
use crate::error::Result;
use crate::key::form_key;

use super::wire::{decode_attribute, encode_attribute};
use super::{EntityState, StateMap, StateRequest, StateStore};

/// State store backed by Redis hashes.
///
/// Reads are **lenient**: attributes with no stored field are omitted from
/// the result instead of failing the call, and entities where every
/// attribute is missing are left out entirely. Decode failures on stored
/// bytes do fail the call. On write, an attribute that cannot be encoded is
/// logged and skipped while the rest of the batch proceeds; transport
/// failures abort the whole call.
pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisStore {
    /// Connect to Redis and verify the connection with a PING.
    pub async fn connect(config: &RedisConfig, namespace: &str) -> Result<Self> {
        let url = if config.password.is_empty() {
            format!("redis://{}/{}", config.host, config.db)
        } else {
            format!("redis://:{}@{}/{}", config.password, config.host, config.db)
        };
        let client = Client::open(url)?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .set_response_timeout(Duration::from_millis(config.response_timeout_ms));
        let mut conn = ConnectionManager::new_with_config(client, manager_config).await?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(host = %config.host, db = config.db, pong = %pong, "Connected to Redis");

        Ok(Self::from_connection(conn, namespace))
    }

    /// Wrap an externally owned connection. The caller keeps ownership;
    /// this store never tears the connection down.
    pub fn from_connection(conn: ConnectionManager, namespace: &str) -> Self {
        Self {
            conn,
            key_prefix: namespace.to_string(),
        }
    }

    fn hash_key(&self, entity_key: &str) -> String {
        format!("{}{}", self.key_prefix, entity_key)
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn get_state(&self, request: &StateRequest) -> Result<StateMap> {
        let mut state_map = StateMap::new();
        if request.is_empty() {
            return Ok(state_map);
        }

        // index-based lookup: pipeline results come back in command order
        let mut hash_keys = Vec::with_capacity(request.len());
        let mut pipe = redis::pipe();

        for entity_request in request.values() {
            let entity_key = form_key([
                entity_request.entity_type.as_str(),
                entity_request.entity_name.as_str(),
            ]);
            let fields: Vec<String> = entity_request
                .attributes
                .iter()
                .map(|attribute| attribute.field())
                .collect();

            pipe.cmd("HMGET").arg(self.hash_key(&entity_key)).arg(fields);
            hash_keys.push(entity_key);
        }

        let mut conn = self.conn.clone();
        let results: Vec<Vec<Option<Vec<u8>>>> = pipe.query_async(&mut conn).await?;

        for (hash_key, fields) in hash_keys.iter().zip(results) {
            let entity_request = &request[hash_key];
            let mut attributes = HashMap::new();

            for (attribute, value) in entity_request.attributes.iter().zip(fields) {
                // no state yet for this attribute
                let Some(bytes) = value else {
                    continue;
                };

                let attribute_key = attribute.field();
                let state = decode_attribute(&bytes, &attribute_key)?;
                attributes.entry(attribute_key).or_insert(state);
            }

            if !attributes.is_empty() {
                state_map.insert(
                    hash_key.clone(),
                    EntityState {
                        entity_type: entity_request.entity_type.clone(),
                        entity_name: entity_request.entity_name.clone(),
                        attributes,
                    },
                );
            } else {
                debug!(entity = %hash_key, "No stored state for entity");
            }
        }

        Ok(state_map)
    }

    async fn set_state(&self, state: &StateMap) -> Result<()> {
        if state.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();

        for entity_state in state.values() {
            let entity_key = form_key([
                entity_state.entity_type.as_str(),
                entity_state.entity_name.as_str(),
            ]);

            let mut fields: Vec<(String, Vec<u8>)> =
                Vec::with_capacity(entity_state.attributes.len());
            for (attribute_key, attribute_state) in &entity_state.attributes {
                match encode_attribute(attribute_state) {
                    Ok(bytes) => fields.push((attribute_key.clone(), bytes)),
                    Err(e) => {
                        warn!(
                            entity = %entity_key,
                            attribute = %attribute_key,
                            error = %e,
                            "Skipping attribute in HSET, could not encode state"
                        );
                    }
                }
            }

            if !fields.is_empty() {
                pipe.cmd("HSET")
                    .arg(self.hash_key(&entity_key))
                    .arg(fields)
                    .ignore();
            }
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}
