//! 工单工具

use serde::Deserialize;
use serde_json::{Value, json};

use super::filter::{DEFAULT_PAGE_SIZE, OslcQuery};
use super::{
    ToolContext, admit, body, first_member, invalidate, invalidate_search, members, read_through,
    resolve_id,
};
use crate::AppState;
use crate::cache::{CacheCategory, CacheKey};
use crate::client::MaximoError;
use crate::error::AppError;
use crate::rate_limit::category;

const ENDPOINT: &str = "/oslc/os/mxwo";
const DETAIL_FIELDS: &str =
    "wonum,siteid,description,status,worktype,assetnum,location,priority,reportedby,reportdate";
const SEARCH_FIELDS: &str = "wonum,siteid,description,status,worktype,assetnum,location,priority";

pub const GET_OP: &str = "get_work_order";
pub const SEARCH_OP: &str = "search_work_orders";

#[derive(Debug, Deserialize)]
pub struct GetWorkOrderArgs {
    pub wonum: String,
    pub siteid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchWorkOrdersArgs {
    pub query: Option<String>,
    pub status: Option<String>,
    pub worktype: Option<String>,
    pub assetnum: Option<String>,
    pub location: Option<String>,
    pub siteid: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkOrderArgs {
    pub description: String,
    pub siteid: String,
    pub assetnum: Option<String>,
    pub location: Option<String>,
    #[serde(default = "default_worktype")]
    pub worktype: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWorkOrderStatusArgs {
    pub wonum: String,
    pub siteid: String,
    pub new_status: String,
    pub memo: Option<String>,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_worktype() -> String {
    "CM".to_string()
}

fn default_priority() -> u8 {
    2
}

pub async fn get_work_order(
    state: &AppState,
    ctx: &ToolContext,
    args: GetWorkOrderArgs,
) -> Result<Value, AppError> {
    admit(state, ctx, category::DEFAULT)?;
    load(state, ctx, &args.wonum, args.siteid.as_deref()).await
}

async fn load(
    state: &AppState,
    ctx: &ToolContext,
    wonum: &str,
    siteid: Option<&str>,
) -> Result<Value, AppError> {
    let key = CacheKey::new(GET_OP).arg(wonum).kwarg("siteid", &siteid).build();

    read_through(state, &key, CacheCategory::WorkOrderDetail, || async {
        tracing::info!(wonum, siteid = ?siteid, "Getting work order");
        let params = OslcQuery::select(DETAIL_FIELDS)
            .eq("wonum", wonum)
            .eq_opt("siteid", siteid)
            .into_params();
        let response = state
            .client
            .get(ENDPOINT, &params, ctx.forwarded_headers())
            .await?;
        first_member(response, || format!("Work order not found: {wonum}"))
    })
    .await
}

pub async fn search_work_orders(
    state: &AppState,
    ctx: &ToolContext,
    args: SearchWorkOrdersArgs,
) -> Result<Value, AppError> {
    admit(state, ctx, category::SEARCH)?;

    let key = CacheKey::new(SEARCH_OP)
        .kwarg("query", &args.query)
        .kwarg("status", &args.status)
        .kwarg("worktype", &args.worktype)
        .kwarg("assetnum", &args.assetnum)
        .kwarg("location", &args.location)
        .kwarg("siteid", &args.siteid)
        .kwarg("page_size", &args.page_size)
        .build();

    read_through(state, &key, CacheCategory::WorkOrderList, || async {
        let params = OslcQuery::select(SEARCH_FIELDS)
            .text_search(&["description", "wonum"], args.query.as_deref())
            .eq_opt("status", args.status.as_deref())
            .eq_opt("worktype", args.worktype.as_deref())
            .eq_opt("assetnum", args.assetnum.as_deref())
            .eq_opt("location", args.location.as_deref())
            .eq_opt("siteid", args.siteid.as_deref())
            .page_size(args.page_size)
            .into_params();
        let response = state
            .client
            .get(ENDPOINT, &params, ctx.forwarded_headers())
            .await?;
        let work_orders = members(response);
        tracing::info!(count = work_orders.len(), "Work orders search completed");
        Ok::<_, MaximoError>(Value::Array(work_orders))
    })
    .await
}

pub async fn create_work_order(
    state: &AppState,
    ctx: &ToolContext,
    args: CreateWorkOrderArgs,
) -> Result<Value, AppError> {
    admit(state, ctx, category::CREATE)?;
    tracing::info!(siteid = %args.siteid, worktype = %args.worktype, "Creating work order");

    let payload = body([
        ("description", Some(json!(args.description))),
        ("siteid", Some(json!(args.siteid))),
        ("worktype", Some(json!(args.worktype))),
        ("priority", Some(json!(args.priority))),
        ("assetnum", args.assetnum.map(Value::from)),
        ("location", args.location.map(Value::from)),
    ]);
    let response = state
        .client
        .post(ENDPOINT, payload, ctx.forwarded_headers())
        .await?;

    // 工单号由下游分配
    match response.get("wonum").and_then(Value::as_str) {
        Some(wonum) => {
            tracing::info!(wonum, "Work order created");
            invalidate(state, GET_OP, wonum, SEARCH_OP).await;
        }
        None => invalidate_search(state, SEARCH_OP).await,
    }
    Ok(response)
}

pub async fn update_work_order_status(
    state: &AppState,
    ctx: &ToolContext,
    args: UpdateWorkOrderStatusArgs,
) -> Result<Value, AppError> {
    admit(state, ctx, category::CREATE)?;
    tracing::info!(wonum = %args.wonum, new_status = %args.new_status, "Changing work order status");

    let work_order = load(state, ctx, &args.wonum, Some(args.siteid.as_str())).await?;
    let id = resolve_id(&work_order, "workorderid", "work order")?;

    let payload = body([
        ("status", Some(json!(args.new_status))),
        ("memo", args.memo.map(Value::from)),
    ]);
    let response = state
        .client
        .patch(&format!("{ENDPOINT}/{id}"), payload, ctx.forwarded_headers())
        .await?;

    invalidate(state, GET_OP, &args.wonum, SEARCH_OP).await;
    Ok(response)
}
