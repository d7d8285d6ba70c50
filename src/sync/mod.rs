//! Client-side synchronization: subscriptions, revalidation, actions and optimistic writes.
//!
//! Everything hangs off a [`SyncClient`], which owns the [`CacheStore`](crate::cache::CacheStore)
//! for the lifetime of the process.

mod action;
mod client;
mod fetcher;
mod optimistic;
mod subscription;

pub use action::{ActionTrigger, MutationState};
pub use client::SyncClient;
pub use fetcher::Fetcher;
pub use optimistic::{OptimisticUpdater, ReconcilePolicy};
pub use subscription::{Subscription, SubscriptionState};
