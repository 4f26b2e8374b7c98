//! Subscription registry: the single shared index of live subscriptions.

mod filter_key;
mod subscription;
mod subscription_registry;

pub use filter_key::EntityKey;
pub use subscription::{Subscription, SubscriptionId};
pub use subscription_registry::SubscriptionRegistry;
pub(crate) use subscription_registry::WeakRegistry;
