// Bus subscription lifecycle: subscribe, scoped teardown, delivery counters

pub mod manager;
pub mod stats;

pub use manager::{Subscription, SubscriptionManager, SubscriptionScope};
pub use stats::{StatsSnapshot, SubscriptionStats};
