use axum::extract::{Json, State};

use super::model::{ComponentStatus, HealthReport};
use crate::AppState;

fn component(healthy: bool) -> ComponentStatus {
    if healthy {
        ComponentStatus::Healthy
    } else {
        ComponentStatus::Unhealthy
    }
}

#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let cache_check = async {
        if state.cache.is_enabled() {
            component(state.cache.health().await)
        } else {
            ComponentStatus::Disabled
        }
    };
    let maximo_check = async { component(state.client.health_check().await) };

    let (cache, maximo) = tokio::join!(cache_check, maximo_check);
    let report = HealthReport::new(cache, maximo);
    if report.status != "healthy" {
        tracing::warn!(cache = ?cache, maximo = ?maximo, "Health check degraded");
    }
    Json(report)
}
