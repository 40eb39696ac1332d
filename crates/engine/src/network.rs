//! Lazily created, label-stamped networks.
//!
//! A [`Network`] has a unique name from construction but only exists on the
//! engine after the first [`Network::get_id`]. Closing it hands removal to
//! the resource reaper; the process-wide shared network ignores close.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

use testbed_core::labels::default_labels;
use testbed_core::{CreateNetworkRequest, EngineGateway, Error, ResourceReaper, Result};

type Modifier = Box<dyn Fn(&mut CreateNetworkRequest) + Send + Sync>;

// =============================================================================
// Builder
// =============================================================================

/// Creation options for a [`Network`]. Nothing touches the engine until the
/// built network's id is first requested.
#[derive(Default)]
pub struct NetworkBuilder {
    driver: Option<String>,
    enable_ipv6: Option<bool>,
    labels: HashMap<String, String>,
    modifiers: Vec<Modifier>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn enable_ipv6(mut self, enable: bool) -> Self {
        self.enable_ipv6 = Some(enable);
        self
    }

    /// Caller label. Default labels still win on key collisions.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Customise the raw create request. Modifiers run in registration order.
    pub fn modifier(
        mut self,
        modifier: impl Fn(&mut CreateNetworkRequest) + Send + Sync + 'static,
    ) -> Self {
        self.modifiers.push(Box::new(modifier));
        self
    }

    pub fn build(
        self,
        gateway: Arc<dyn EngineGateway>,
        reaper: Arc<dyn ResourceReaper>,
    ) -> Network {
        Network {
            name: uuid::Uuid::new_v4().to_string(),
            options: self,
            protected: false,
            gateway,
            reaper,
            state: Mutex::new(NetworkState::Uncreated),
        }
    }
}

// =============================================================================
// Network
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum NetworkState {
    Uncreated,
    Created(String),
    Closed(String),
}

pub struct Network {
    name: String,
    options: NetworkBuilder,
    /// Protected networks survive `close`; only the reaper removes them.
    protected: bool,
    gateway: Arc<dyn EngineGateway>,
    reaper: Arc<dyn ResourceReaper>,
    state: Mutex<NetworkState>,
}

impl Network {
    pub fn builder() -> NetworkBuilder {
        NetworkBuilder::new()
    }

    /// A network with default options.
    pub fn new_network(gateway: Arc<dyn EngineGateway>, reaper: Arc<dyn ResourceReaper>) -> Self {
        NetworkBuilder::new().build(gateway, reaper)
    }

    /// The process-wide shared network. The first call fixes its gateway and
    /// reaper; later calls return the same instance.
    pub fn shared(
        gateway: Arc<dyn EngineGateway>,
        reaper: Arc<dyn ResourceReaper>,
    ) -> Arc<Network> {
        static SHARED: OnceLock<Arc<Network>> = OnceLock::new();
        SHARED
            .get_or_init(|| Arc::new(Self::protected(gateway, reaper)))
            .clone()
    }

    /// A network that ignores `close`, for callers managing their own
    /// shared instance.
    pub fn protected(gateway: Arc<dyn EngineGateway>, reaper: Arc<dyn ResourceReaper>) -> Self {
        let mut network = Self::new_network(gateway, reaper);
        network.protected = true;
        network
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// Whether the engine-side network has been created (and not closed).
    pub async fn is_initialized(&self) -> bool {
        matches!(*self.state.lock().await, NetworkState::Created(_))
    }

    /// Engine id, creating the network on first call. Concurrent callers
    /// share a single creation.
    pub async fn get_id(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        match &*state {
            NetworkState::Created(id) => Ok(id.clone()),
            NetworkState::Closed(id) => Err(Error::precondition(format!(
                "network {} ({}) has been closed",
                self.name, id
            ))),
            NetworkState::Uncreated => {
                let request = self.create_request();
                let id = self.gateway.create_network(&request).await?;
                self.reaper.register_network(&id);
                tracing::info!(network = %self.name, id = %id, "Created network");
                *state = NetworkState::Created(id.clone());
                Ok(id)
            }
        }
    }

    /// Release the network. Idempotent; a no-op if it was never created or
    /// is protected. The network counts as closed even if removal fails.
    pub async fn close(&self) -> Result<()> {
        if self.protected {
            tracing::debug!(network = %self.name, "Ignoring close on shared network");
            return Ok(());
        }

        let id = {
            let mut state = self.state.lock().await;
            match &*state {
                NetworkState::Created(id) => {
                    let id = id.clone();
                    *state = NetworkState::Closed(id.clone());
                    id
                }
                NetworkState::Uncreated | NetworkState::Closed(_) => return Ok(()),
            }
        };

        tracing::debug!(network = %self.name, id = %id, "Removing network");
        self.reaper.remove_network(&id).await
    }

    fn create_request(&self) -> CreateNetworkRequest {
        let mut request = CreateNetworkRequest::new(&self.name).with_check_duplicate(true);
        if let Some(driver) = &self.options.driver {
            request.driver = Some(driver.clone());
        }
        if let Some(enable) = self.options.enable_ipv6 {
            request.enable_ipv6 = Some(enable);
        }
        for modifier in &self.options.modifiers {
            modifier(&mut request);
        }
        request.labels.extend(self.options.labels.clone());
        request.labels.extend(default_labels());
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testbed_core::labels::LABEL_MARKER;
    use testbed_core::mocks::{GatewayCall, MockGateway, RecordingReaper};

    fn created_requests(gateway: &MockGateway) -> Vec<CreateNetworkRequest> {
        gateway
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::CreateNetwork(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_creation_is_lazy() {
        let gateway = Arc::new(MockGateway::new());
        let reaper = Arc::new(RecordingReaper::new());
        let network = Network::new_network(gateway.clone(), reaper.clone());

        assert!(!network.is_initialized().await);
        assert!(gateway.calls().is_empty());

        let id = network.get_id().await.unwrap();
        assert_eq!(id, "net-1");
        assert_eq!(network.get_id().await.unwrap(), id);
        assert!(network.is_initialized().await);
        assert_eq!(created_requests(&gateway).len(), 1);
        assert_eq!(reaper.registered(), vec!["net-1"]);
    }

    #[tokio::test]
    async fn test_request_carries_options_and_default_labels() {
        let gateway = Arc::new(MockGateway::new());
        let reaper = Arc::new(RecordingReaper::new());
        let network = Network::builder()
            .driver("overlay")
            .enable_ipv6(true)
            .label("team", "qa")
            .label(LABEL_MARKER, "false")
            .build(gateway.clone(), reaper);
        network.get_id().await.unwrap();

        let request = &created_requests(&gateway)[0];
        assert_eq!(request.name, network.name());
        assert!(request.check_duplicate);
        assert_eq!(request.driver.as_deref(), Some("overlay"));
        assert_eq!(request.enable_ipv6, Some(true));
        assert_eq!(request.labels.get("team").map(String::as_str), Some("qa"));
        assert_eq!(request.labels.get(LABEL_MARKER).map(String::as_str), Some("true"));
    }

    #[tokio::test]
    async fn test_closed_network_rejects_get_id() {
        let gateway = Arc::new(MockGateway::new());
        let reaper = Arc::new(RecordingReaper::new());
        let network = Network::new_network(gateway, reaper.clone());
        network.get_id().await.unwrap();
        network.close().await.unwrap();

        let err = network.get_id().await.unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert_eq!(reaper.removed(), vec!["net-1"]);
    }

    #[tokio::test]
    async fn test_close_before_creation_is_noop() {
        let gateway = Arc::new(MockGateway::new());
        let reaper = Arc::new(RecordingReaper::new());
        let network = Network::new_network(gateway.clone(), reaper.clone());
        network.close().await.unwrap();
        assert!(gateway.calls().is_empty());
        assert!(reaper.removed().is_empty());
    }

    #[tokio::test]
    async fn test_protected_network_ignores_close() {
        let gateway = Arc::new(MockGateway::new());
        let reaper = Arc::new(RecordingReaper::new());
        let network = Network::protected(gateway, reaper.clone());
        network.get_id().await.unwrap();
        network.close().await.unwrap();
        assert!(network.is_initialized().await);
        assert!(reaper.removed().is_empty());
    }
}
