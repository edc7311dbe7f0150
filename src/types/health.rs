use serde::{Deserialize, Serialize};

/// Response of `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    /// `"ok"` when the backend and its model are reachable.
    pub status: String,

    /// Model readiness as reported by the backend.
    pub model: String,

    /// Seconds since the backend started.
    pub uptime: u64,

    /// Server time, ISO 8601.
    pub timestamp: String,
}

impl HealthStatus {
    /// Returns true if the backend reports itself healthy.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
