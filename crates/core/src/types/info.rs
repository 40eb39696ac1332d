use serde::{Deserialize, Serialize};

/// Engine-wide facts used for capability probing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub server_version: Option<String>,
    pub api_version: Option<String>,
    pub operating_system: Option<String>,
    /// Legacy execution driver name; absent on modern daemons.
    pub execution_driver: Option<String>,
}

impl EngineInfo {
    /// `docker exec` is not available under the legacy `lxc` execution driver.
    pub fn supports_exec(&self) -> bool {
        !self
            .execution_driver
            .as_deref()
            .is_some_and(|driver| driver.starts_with("lxc"))
    }
}
