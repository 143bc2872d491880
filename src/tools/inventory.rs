//! 库存工具

use serde::Deserialize;
use serde_json::{Value, json};

use super::filter::{DEFAULT_PAGE_SIZE, OslcQuery};
use super::{ToolContext, admit, body, first_member, invalidate, members, read_through};
use crate::AppState;
use crate::cache::{CacheCategory, CacheKey};
use crate::client::MaximoError;
use crate::error::AppError;
use crate::rate_limit::category;

const ENDPOINT: &str = "/oslc/os/mxapiinventory";
const TRANSACTION_ENDPOINT: &str = "/oslc/os/mxapiinvtrans";
const DETAIL_FIELDS: &str = "itemnum,siteid,location,description,curbal,reorder,status,binnum";
const SEARCH_FIELDS: &str = "itemnum,siteid,location,description,curbal,reorder,status";

pub const GET_OP: &str = "get_inventory";
pub const SEARCH_OP: &str = "search_inventory";

#[derive(Debug, Deserialize)]
pub struct GetInventoryArgs {
    pub itemnum: String,
    pub siteid: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchInventoryArgs {
    pub query: Option<String>,
    #[serde(default)]
    pub low_stock: bool,
    pub siteid: Option<String>,
    pub location: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct IssueInventoryArgs {
    pub itemnum: String,
    pub quantity: f64,
    pub siteid: String,
    pub location: String,
    pub to_wonum: Option<String>,
    pub to_location: Option<String>,
    pub memo: Option<String>,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

pub async fn get_inventory(
    state: &AppState,
    ctx: &ToolContext,
    args: GetInventoryArgs,
) -> Result<Value, AppError> {
    admit(state, ctx, category::DEFAULT)?;

    let key = CacheKey::new(GET_OP)
        .arg(&args.itemnum)
        .kwarg("siteid", &args.siteid)
        .kwarg("location", &args.location)
        .build();

    read_through(state, &key, CacheCategory::InventoryDetail, || async {
        tracing::info!(itemnum = %args.itemnum, siteid = ?args.siteid, location = ?args.location, "Getting inventory");
        let params = OslcQuery::select(DETAIL_FIELDS)
            .eq("itemnum", &args.itemnum)
            .eq_opt("siteid", args.siteid.as_deref())
            .eq_opt("location", args.location.as_deref())
            .into_params();
        let response = state
            .client
            .get(ENDPOINT, &params, ctx.forwarded_headers())
            .await?;
        first_member(response, || format!("Inventory item not found: {}", args.itemnum))
    })
    .await
}

pub async fn search_inventory(
    state: &AppState,
    ctx: &ToolContext,
    args: SearchInventoryArgs,
) -> Result<Value, AppError> {
    admit(state, ctx, category::SEARCH)?;

    let key = CacheKey::new(SEARCH_OP)
        .kwarg("query", &args.query)
        .kwarg("low_stock", &args.low_stock)
        .kwarg("siteid", &args.siteid)
        .kwarg("location", &args.location)
        .kwarg("page_size", &args.page_size)
        .build();

    read_through(state, &key, CacheCategory::InventoryStock, || async {
        let params = OslcQuery::select(SEARCH_FIELDS)
            .text_search(&["description", "itemnum"], args.query.as_deref())
            .clause_if(args.low_stock, "curbal<reorder")
            .eq_opt("siteid", args.siteid.as_deref())
            .eq_opt("location", args.location.as_deref())
            .page_size(args.page_size)
            .into_params();
        let response = state
            .client
            .get(ENDPOINT, &params, ctx.forwarded_headers())
            .await?;
        let items = members(response);
        tracing::info!(count = items.len(), "Inventory search completed");
        Ok::<_, MaximoError>(Value::Array(items))
    })
    .await
}

pub async fn issue_inventory(
    state: &AppState,
    ctx: &ToolContext,
    args: IssueInventoryArgs,
) -> Result<Value, AppError> {
    admit(state, ctx, category::CREATE)?;

    if !args.quantity.is_finite() || args.quantity <= 0.0 {
        return Err(AppError::BadRequest(format!(
            "quantity must be a positive number, got {}",
            args.quantity
        )));
    }
    tracing::info!(itemnum = %args.itemnum, quantity = args.quantity, "Issuing inventory");

    let payload = body([
        ("itemnum", Some(json!(args.itemnum))),
        ("quantity", Some(json!(args.quantity))),
        ("siteid", Some(json!(args.siteid))),
        ("location", Some(json!(args.location))),
        ("transtype", Some(json!("ISSUE"))),
        ("wonum", args.to_wonum.map(Value::from)),
        ("tolocation", args.to_location.map(Value::from)),
        ("memo", args.memo.map(Value::from)),
    ]);
    let response = state
        .client
        .post(TRANSACTION_ENDPOINT, payload, ctx.forwarded_headers())
        .await?;

    invalidate(state, GET_OP, &args.itemnum, SEARCH_OP).await;
    Ok(response)
}
