// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod metrics;
pub mod redis;
pub mod telemetry;

// Domain layer (business logic)
pub mod channel;
pub mod dedup;
pub mod event;
pub mod preferences;
pub mod queue;
pub mod ratelimit;
pub mod template;

// Delivery collaborators
pub mod directory;
pub mod sink;

// Orchestration
pub mod fanout;

// Supporting modules
pub mod tasks;
