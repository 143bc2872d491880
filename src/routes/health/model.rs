use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Unhealthy,
    Disabled,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `healthy` 或 `degraded`
    pub status: &'static str,
    pub cache: ComponentStatus,
    pub maximo: ComponentStatus,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn new(cache: ComponentStatus, maximo: ComponentStatus) -> Self {
        let degraded = cache == ComponentStatus::Unhealthy || maximo == ComponentStatus::Unhealthy;
        Self {
            status: if degraded { "degraded" } else { "healthy" },
            cache,
            maximo,
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now(),
        }
    }
}
