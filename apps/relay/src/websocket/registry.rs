//! Lookup of per-user routers
//!
//! Uses DashMap so upgrades for different users never contend on one lock.
//! A router is spawned the first time its user is seen and evicted by
//! [`RouterRegistry::release`] once the registry holds the only handle to it.
//! Socket tasks keep their handle until their `Remove` has been sent, so an
//! evicted router has no connections left and its task ends after draining.

use std::sync::Arc;

use dashmap::DashMap;
use switchboard_protocol::{BroadcastFilter, Envelope, RouterStats};

use super::router::{UserRouter, UserRouterHandle};
use crate::error::ApiResult;

/// Registry of per-user routers, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct RouterRegistry {
    routers: Arc<DashMap<String, UserRouterHandle>>,
}

impl RouterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router for `user_id`, spawning it on first use
    pub fn router_for(&self, user_id: &str) -> UserRouterHandle {
        if let Some(handle) = self.routers.get(user_id) {
            return handle.clone();
        }

        self.routers
            .entry(user_id.to_string())
            .or_insert_with(|| UserRouter::spawn(user_id))
            .clone()
    }

    /// Router for `user_id` if one was ever started
    pub fn get(&self, user_id: &str) -> Option<UserRouterHandle> {
        self.routers.get(user_id).map(|h| h.clone())
    }

    /// Evict the user's router if nothing outside the registry holds it
    ///
    /// Call after dropping a handle obtained from [`Self::router_for`] or
    /// [`Self::get`]. The check runs under the map's shard lock, so it cannot
    /// race a concurrent `router_for` handing out a new clone.
    pub fn release(&self, user_id: &str) {
        let evicted = self
            .routers
            .remove_if(user_id, |_, handle| handle.holder_count() == 1);

        if evicted.is_some() {
            tracing::debug!(user_id = %user_id, "Connection router evicted");
        }
    }

    /// Broadcast to one user's connections; zero when the user has no router
    pub async fn broadcast(
        &self,
        user_id: &str,
        envelope: Envelope,
        filter: BroadcastFilter,
    ) -> ApiResult<usize> {
        let Some(router) = self.get(user_id) else {
            return Ok(0);
        };
        let delivered = router.broadcast(envelope, filter).await;
        drop(router);
        self.release(user_id);
        delivered
    }

    /// Stats for one user; empty when the user has no router
    pub async fn stats(&self, user_id: &str) -> ApiResult<RouterStats> {
        let Some(router) = self.get(user_id) else {
            return Ok(RouterStats::default());
        };
        let stats = router.stats().await;
        drop(router);
        self.release(user_id);
        stats
    }

    /// Number of users with a router
    pub fn user_count(&self) -> usize {
        self.routers.len()
    }
}
