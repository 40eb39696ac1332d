//! Labels stamped on every resource this process creates.

use std::collections::HashMap;
use std::sync::LazyLock;

pub const LABEL_MARKER: &str = "io.testbed";
pub const LABEL_VERSION: &str = "io.testbed.version";
pub const LABEL_SESSION_ID: &str = "io.testbed.session-id";

/// Identifies all resources created by this process.
pub static SESSION_ID: LazyLock<String> = LazyLock::new(|| uuid::Uuid::new_v4().to_string());

/// Default labels, merged last into any caller-supplied labels.
pub fn default_labels() -> HashMap<String, String> {
    HashMap::from([
        (LABEL_MARKER.to_string(), "true".to_string()),
        (
            LABEL_VERSION.to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        ),
        (LABEL_SESSION_ID.to_string(), SESSION_ID.clone()),
    ])
}
