use axum::extract::{Json, State, rejection::JsonRejection};
use serde_json::Value;

use crate::AppState;
use crate::error::AppError;
use crate::tools::{ToolContext, asset, inventory, user, workorder};
use crate::utils::{ApiResponse, success_to_api_response};

type ToolResponse = Result<Json<ApiResponse<Value>>, AppError>;

fn parse_args<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(args)| args)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

macro_rules! tool_handler {
    ($name:ident, $tool:path, $args:ty) => {
        #[axum::debug_handler]
        pub async fn $name(
            State(state): State<AppState>,
            ctx: ToolContext,
            payload: Result<Json<$args>, JsonRejection>,
        ) -> ToolResponse {
            let args = parse_args(payload)?;
            let result = $tool(&state, &ctx, args).await?;
            Ok(success_to_api_response(result))
        }
    };
}

tool_handler!(get_asset, asset::get_asset, asset::GetAssetArgs);
tool_handler!(search_assets, asset::search_assets, asset::SearchAssetsArgs);
tool_handler!(create_asset, asset::create_asset, asset::CreateAssetArgs);
tool_handler!(update_asset_status, asset::update_asset_status, asset::UpdateAssetStatusArgs);

tool_handler!(get_work_order, workorder::get_work_order, workorder::GetWorkOrderArgs);
tool_handler!(search_work_orders, workorder::search_work_orders, workorder::SearchWorkOrdersArgs);
tool_handler!(create_work_order, workorder::create_work_order, workorder::CreateWorkOrderArgs);
tool_handler!(
    update_work_order_status,
    workorder::update_work_order_status,
    workorder::UpdateWorkOrderStatusArgs
);

tool_handler!(get_inventory, inventory::get_inventory, inventory::GetInventoryArgs);
tool_handler!(search_inventory, inventory::search_inventory, inventory::SearchInventoryArgs);
tool_handler!(issue_inventory, inventory::issue_inventory, inventory::IssueInventoryArgs);

tool_handler!(get_user_status, user::get_user_status, user::GetUserStatusArgs);
tool_handler!(search_users, user::search_users, user::SearchUsersArgs);
tool_handler!(unlock_user_account, user::unlock_user_account, user::UnlockUserAccountArgs);
