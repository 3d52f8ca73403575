//! Sluice - Embedded Rate Limiting Engine
//!
//! This crate decides whether requests are admissible under a set of
//! configured per-attribute limits and records consumption against stored
//! counters. It is consumed as a library by a host process: callers
//! construct a [`RateLimiter`] handle, feed it rule imports and limit
//! requests, and keep the handle for the lifetime of the instance.
//!
//! Three interchangeable strategies (token bucket, sliding-window log,
//! clock-aligned static window) operate over two state store backends
//! (an in-process TTL cache and a Redis hash store).

pub mod clock;
pub mod config;
pub mod error;
pub mod key;
pub mod ratelimit;
pub mod store;

pub use config::{LimiterConfig, MemoryConfig, RedisConfig, StorageKind, StrategyConfig};
pub use error::{Result, SluiceError};
pub use ratelimit::{
    AttributeRule, Bucket, EntityParameters, EntityRules, LimitRequest, Rate, RateLimiter,
    RuleAction, RuleImport,
};
pub use store::{MemoryStore, RedisStore, StateStore};
