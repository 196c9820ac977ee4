//! Page snapshot model

use serde::{Deserialize, Serialize};

/// Cached whole-page read payload used to render a page while offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Logical page key (usually includes the tenant/account scope)
    pub page_id: String,
    pub page_type: String,
    /// Opaque read payload
    pub data: serde_json::Value,
    /// Cheap fingerprint of the inputs the payload was built from
    pub data_version: String,
    /// Capture time (Unix ms)
    pub snapshot_at: i64,
    pub schema_version: i64,
}
