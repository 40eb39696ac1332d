use async_trait::async_trait;

use crate::error::Result;

/// Collaborator responsible for removing ephemeral resources, both on request
/// and in bulk when leaked resources are reclaimed.
#[async_trait]
pub trait ResourceReaper: Send + Sync {
    /// Record a freshly created network so it can be reclaimed later.
    fn register_network(&self, network_id: &str);

    /// Remove a network now and forget it.
    async fn remove_network(&self, network_id: &str) -> Result<()>;
}
