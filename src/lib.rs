// Topic parsing and wildcard matching
pub mod topic;

// Bus envelopes and typed payloads
pub mod event;

// REST records shared by seeds and payloads
pub mod model;

// Error taxonomy
pub mod error;

// Generic entity reconciler
pub mod state;

// Pub/sub bus seam and NATS client
pub mod nats;

// Subscription management
pub mod subscription;

// REST seed source and commands
pub mod api;

// Reconciler configurations per consumer
pub mod views;

// Tile grid movement coordinator
pub mod grid;

// Selection controller
pub mod selection;

// Session composition
pub mod session;

// Configuration
pub mod config;

#[cfg(test)]
mod test_support;
