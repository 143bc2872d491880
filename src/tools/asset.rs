//! 资产工具

use serde::Deserialize;
use serde_json::{Value, json};

use super::filter::{DEFAULT_PAGE_SIZE, OslcQuery};
use super::{ToolContext, admit, body, first_member, invalidate, members, read_through, resolve_id};
use crate::AppState;
use crate::cache::{CacheCategory, CacheKey};
use crate::client::MaximoError;
use crate::error::AppError;
use crate::rate_limit::category;

const ENDPOINT: &str = "/oslc/os/mxapiasset";
const DETAIL_FIELDS: &str =
    "assetnum,siteid,description,status,location,assettype,serialnum,manufacturer,model";
const SEARCH_FIELDS: &str = "assetnum,siteid,description,status,location,assettype,serialnum";

pub const GET_OP: &str = "get_asset";
pub const SEARCH_OP: &str = "search_assets";

#[derive(Debug, Deserialize)]
pub struct GetAssetArgs {
    pub assetnum: String,
    pub siteid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchAssetsArgs {
    pub query: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
    pub assettype: Option<String>,
    pub siteid: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateAssetArgs {
    pub assetnum: String,
    pub siteid: String,
    pub description: String,
    pub assettype: Option<String>,
    pub location: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAssetStatusArgs {
    pub assetnum: String,
    pub siteid: String,
    pub new_status: String,
    pub memo: Option<String>,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_status() -> String {
    "NOT READY".to_string()
}

pub async fn get_asset(state: &AppState, ctx: &ToolContext, args: GetAssetArgs) -> Result<Value, AppError> {
    admit(state, ctx, category::DEFAULT)?;
    load(state, ctx, &args.assetnum, args.siteid.as_deref()).await
}

/// 带缓存的单条读取，供更新操作解析记录 id 复用（不再重复计入限流）
async fn load(
    state: &AppState,
    ctx: &ToolContext,
    assetnum: &str,
    siteid: Option<&str>,
) -> Result<Value, AppError> {
    let key = CacheKey::new(GET_OP).arg(assetnum).kwarg("siteid", &siteid).build();

    read_through(state, &key, CacheCategory::AssetDetail, || async {
        tracing::info!(assetnum, siteid = ?siteid, "Getting asset");
        let params = OslcQuery::select(DETAIL_FIELDS)
            .eq("assetnum", assetnum)
            .eq_opt("siteid", siteid)
            .into_params();
        let response = state
            .client
            .get(ENDPOINT, &params, ctx.forwarded_headers())
            .await?;
        first_member(response, || format!("Asset not found: {assetnum}"))
    })
    .await
}

pub async fn search_assets(
    state: &AppState,
    ctx: &ToolContext,
    args: SearchAssetsArgs,
) -> Result<Value, AppError> {
    admit(state, ctx, category::SEARCH)?;

    let key = CacheKey::new(SEARCH_OP)
        .kwarg("query", &args.query)
        .kwarg("status", &args.status)
        .kwarg("location", &args.location)
        .kwarg("assettype", &args.assettype)
        .kwarg("siteid", &args.siteid)
        .kwarg("page_size", &args.page_size)
        .build();

    read_through(state, &key, CacheCategory::AssetSearch, || async {
        let params = OslcQuery::select(SEARCH_FIELDS)
            .text_search(&["description", "assetnum"], args.query.as_deref())
            .eq_opt("status", args.status.as_deref())
            .eq_opt("location", args.location.as_deref())
            .eq_opt("assettype", args.assettype.as_deref())
            .eq_opt("siteid", args.siteid.as_deref())
            .page_size(args.page_size)
            .into_params();
        let response = state
            .client
            .get(ENDPOINT, &params, ctx.forwarded_headers())
            .await?;
        let assets = members(response);
        tracing::info!(count = assets.len(), "Assets search completed");
        Ok::<_, MaximoError>(Value::Array(assets))
    })
    .await
}

pub async fn create_asset(
    state: &AppState,
    ctx: &ToolContext,
    args: CreateAssetArgs,
) -> Result<Value, AppError> {
    admit(state, ctx, category::CREATE)?;
    tracing::info!(assetnum = %args.assetnum, siteid = %args.siteid, "Creating asset");

    let payload = body([
        ("assetnum", Some(json!(args.assetnum))),
        ("siteid", Some(json!(args.siteid))),
        ("description", Some(json!(args.description))),
        ("status", Some(json!(args.status))),
        ("assettype", args.assettype.map(Value::from)),
        ("location", args.location.map(Value::from)),
    ]);
    let response = state
        .client
        .post(ENDPOINT, payload, ctx.forwarded_headers())
        .await?;

    invalidate(state, GET_OP, &args.assetnum, SEARCH_OP).await;
    Ok(response)
}

pub async fn update_asset_status(
    state: &AppState,
    ctx: &ToolContext,
    args: UpdateAssetStatusArgs,
) -> Result<Value, AppError> {
    admit(state, ctx, category::CREATE)?;
    tracing::info!(assetnum = %args.assetnum, new_status = %args.new_status, "Changing asset status");

    let asset = load(state, ctx, &args.assetnum, Some(args.siteid.as_str())).await?;
    let id = resolve_id(&asset, "assetuid", "asset")?;

    let payload = body([
        ("status", Some(json!(args.new_status))),
        ("memo", args.memo.map(Value::from)),
    ]);
    let response = state
        .client
        .patch(&format!("{ENDPOINT}/{id}"), payload, ctx.forwarded_headers())
        .await?;

    invalidate(state, GET_OP, &args.assetnum, SEARCH_OP).await;
    Ok(response)
}
