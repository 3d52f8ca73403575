//! Rate limiting logic: rules, requests, strategies and the limiter facade.

pub mod limiter;
pub mod request;
pub mod rules;
pub mod strategy;

pub use limiter::RateLimiter;
pub use request::{EntityParameters, LimitRequest};
pub use rules::{AttributeRule, Bucket, EntityRules, Rate, RuleAction, RuleCache, RuleImport};
pub use strategy::{Strategy, TimeUnit};
