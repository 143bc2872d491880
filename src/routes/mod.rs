pub mod health;
pub mod tool;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::{
    AppState,
    middleware::{auth_middleware, correlation_id, log_errors, rate_limit_middleware},
};

/// 构建完整路由：公开的健康检查与需要 API key 的工具接口
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        // 资产
        .route("/tools/get_asset", post(tool::get_asset))
        .route("/tools/search_assets", post(tool::search_assets))
        .route("/tools/create_asset", post(tool::create_asset))
        .route("/tools/update_asset_status", post(tool::update_asset_status))
        // 工单
        .route("/tools/get_work_order", post(tool::get_work_order))
        .route("/tools/search_work_orders", post(tool::search_work_orders))
        .route("/tools/create_work_order", post(tool::create_work_order))
        .route("/tools/update_work_order_status", post(tool::update_work_order_status))
        // 库存
        .route("/tools/get_inventory", post(tool::get_inventory))
        .route("/tools/search_inventory", post(tool::search_inventory))
        .route("/tools/issue_inventory", post(tool::issue_inventory))
        // 用户
        .route("/tools/get_user_status", post(tool::get_user_status))
        .route("/tools/search_users", post(tool::search_users))
        .route("/tools/unlock_user_account", post(tool::unlock_user_account))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let public_routes = Router::new().route("/health", get(health::health));

    // 限流在认证之前执行，未认证的请求按客户端地址计数
    let api = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware));

    // nest 不接受空路径或根路径
    let base = state.config.api_base_uri.trim_end_matches('/');
    let router = if base.is_empty() {
        api
    } else if base.starts_with('/') {
        Router::new().nest(base, api)
    } else {
        Router::new().nest(&format!("/{base}"), api)
    };

    let router = router
        .layer(from_fn(log_errors))
        .layer(from_fn(correlation_id));

    let router = if state.config.cors_enabled {
        tracing::debug!("Adding permissive CORS layer");
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    router.with_state(state)
}
