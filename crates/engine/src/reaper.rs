//! Gateway-backed resource reaper.
//!
//! Tracks every network created during the session so that anything left
//! behind, including the shared network, can be removed at shutdown.

use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Arc;

use testbed_core::{EngineGateway, ResourceReaper, Result};

pub struct GatewayReaper {
    gateway: Arc<dyn EngineGateway>,
    networks: DashSet<String>,
}

impl GatewayReaper {
    pub fn new(gateway: Arc<dyn EngineGateway>) -> Self {
        Self {
            gateway,
            networks: DashSet::new(),
        }
    }

    /// Ids registered and not yet removed.
    pub fn tracked_networks(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.networks.iter().map(|id| id.clone()).collect();
        ids.sort();
        ids
    }

    /// Remove every tracked network. Failures are logged and the network
    /// stays tracked. Returns how many were removed.
    pub async fn reap_all(&self) -> usize {
        let mut removed = 0;
        for id in self.tracked_networks() {
            match self.remove_network(&id).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(network = %id, error = %e, "Failed to reap network");
                }
            }
        }
        tracing::info!(removed, "Reaped session networks");
        removed
    }
}

#[async_trait]
impl ResourceReaper for GatewayReaper {
    fn register_network(&self, network_id: &str) {
        tracing::debug!(network = %network_id, "Tracking network for cleanup");
        self.networks.insert(network_id.to_string());
    }

    async fn remove_network(&self, network_id: &str) -> Result<()> {
        match self.gateway.remove_network(network_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(network = %network_id, "Network already gone");
            }
            Err(e) => return Err(e),
        }
        self.networks.remove(network_id);
        Ok(())
    }
}
