//! Engine capability detection, evaluated once per engine.

use std::sync::Arc;
use tokio::sync::OnceCell;

use testbed_core::{EngineGateway, Error, Result};

pub struct EngineCapabilities {
    gateway: Arc<dyn EngineGateway>,
    exec_supported: OnceCell<bool>,
}

impl EngineCapabilities {
    pub fn new(gateway: Arc<dyn EngineGateway>) -> Self {
        Self {
            gateway,
            exec_supported: OnceCell::new(),
        }
    }

    /// Whether the engine can run commands in containers. LXC-driven engines
    /// cannot. A failed check is not cached.
    pub async fn supports_exec(&self) -> Result<bool> {
        self.exec_supported
            .get_or_try_init(|| async {
                let info = self.gateway.info().await?;
                tracing::debug!(
                    server_version = ?info.server_version,
                    driver = ?info.execution_driver,
                    "Detected engine capabilities"
                );
                Ok::<_, Error>(info.supports_exec())
            })
            .await
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testbed_core::mocks::{GatewayCall, MockGateway};
    use testbed_core::EngineInfo;

    #[tokio::test]
    async fn test_detection_runs_once() {
        let gateway = Arc::new(MockGateway::new());
        let caps = EngineCapabilities::new(gateway.clone());
        assert!(caps.supports_exec().await.unwrap());
        assert!(caps.supports_exec().await.unwrap());
        assert_eq!(gateway.count(|c| matches!(c, GatewayCall::Info)), 1);
    }

    #[tokio::test]
    async fn test_lxc_driver_has_no_exec() {
        let gateway = Arc::new(MockGateway::new().with_info(EngineInfo {
            execution_driver: Some("lxc-1.0.5".into()),
            ..EngineInfo::default()
        }));
        let caps = EngineCapabilities::new(gateway);
        assert!(!caps.supports_exec().await.unwrap());
    }
}
