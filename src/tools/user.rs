//! 用户账号工具

use serde::Deserialize;
use serde_json::{Value, json};

use super::filter::{DEFAULT_PAGE_SIZE, OslcQuery};
use super::{ToolContext, admit, body, first_member, invalidate, members, read_through, resolve_id};
use crate::AppState;
use crate::cache::{CacheCategory, CacheKey};
use crate::client::MaximoError;
use crate::error::AppError;
use crate::rate_limit::category;

const ENDPOINT: &str = "/oslc/os/mxuser";
const DETAIL_FIELDS: &str = "userid,personid,displayname,status,loginid,lockedout,failedlogincount,emailaddress,primaryphone";
const SEARCH_FIELDS: &str =
    "userid,personid,displayname,status,loginid,lockedout,failedlogincount,emailaddress";

pub const GET_OP: &str = "get_user_status";
pub const SEARCH_OP: &str = "search_users";

#[derive(Debug, Deserialize)]
pub struct GetUserStatusArgs {
    pub userid: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchUsersArgs {
    pub query: Option<String>,
    pub status: Option<String>,
    pub personid: Option<String>,
    #[serde(default)]
    pub locked_only: bool,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct UnlockUserAccountArgs {
    pub userid: String,
    pub memo: Option<String>,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// 为用户记录补充 `is_locked` / `is_active` / `failed_login_count`
pub fn enrich(mut user: Value) -> Value {
    let is_locked = match user.get("lockedout") {
        Some(Value::Bool(locked)) => *locked,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    };
    let is_active = user.get("status").and_then(Value::as_str) == Some("ACTIVE");
    let failed_login_count = user
        .get("failedlogincount")
        .cloned()
        .unwrap_or_else(|| json!(0));

    if let Value::Object(map) = &mut user {
        map.insert("is_locked".into(), Value::Bool(is_locked));
        map.insert("is_active".into(), Value::Bool(is_active));
        map.insert("failed_login_count".into(), failed_login_count);
    }
    user
}

pub async fn get_user_status(
    state: &AppState,
    ctx: &ToolContext,
    args: GetUserStatusArgs,
) -> Result<Value, AppError> {
    admit(state, ctx, category::DEFAULT)?;
    load(state, ctx, &args.userid).await
}

async fn load(state: &AppState, ctx: &ToolContext, userid: &str) -> Result<Value, AppError> {
    let key = CacheKey::new(GET_OP).arg(userid).build();

    read_through(state, &key, CacheCategory::UserDetail, || async {
        tracing::info!(userid, "Getting user status");
        let params = OslcQuery::select(DETAIL_FIELDS)
            .eq("userid", userid)
            .into_params();
        let response = state
            .client
            .get(ENDPOINT, &params, ctx.forwarded_headers())
            .await?;
        let user = first_member(response, || format!("User not found: {userid}"))?;
        Ok::<_, MaximoError>(enrich(user))
    })
    .await
}

pub async fn search_users(
    state: &AppState,
    ctx: &ToolContext,
    args: SearchUsersArgs,
) -> Result<Value, AppError> {
    admit(state, ctx, category::SEARCH)?;

    let key = CacheKey::new(SEARCH_OP)
        .kwarg("query", &args.query)
        .kwarg("status", &args.status)
        .kwarg("personid", &args.personid)
        .kwarg("locked_only", &args.locked_only)
        .kwarg("page_size", &args.page_size)
        .build();

    read_through(state, &key, CacheCategory::UserSearch, || async {
        let params = OslcQuery::select(SEARCH_FIELDS)
            .text_search(&["userid", "displayname", "personid"], args.query.as_deref())
            .eq_opt("status", args.status.as_deref())
            .eq_opt("personid", args.personid.as_deref())
            .clause_if(args.locked_only, "lockedout=1")
            .page_size(args.page_size)
            .into_params();
        let response = state
            .client
            .get(ENDPOINT, &params, ctx.forwarded_headers())
            .await?;
        let users: Vec<Value> = members(response).into_iter().map(enrich).collect();
        tracing::info!(count = users.len(), "User search completed");
        Ok::<_, MaximoError>(Value::Array(users))
    })
    .await
}

/// 解锁账号：状态置为 ACTIVE，并清零锁定标记与失败登录次数
pub async fn unlock_user_account(
    state: &AppState,
    ctx: &ToolContext,
    args: UnlockUserAccountArgs,
) -> Result<Value, AppError> {
    admit(state, ctx, category::CREATE)?;
    tracing::info!(userid = %args.userid, "Unlocking user account");

    let user = load(state, ctx, &args.userid).await?;
    let id = resolve_id(&user, "maxuserid", "user")?;

    let payload = body([
        ("status", Some(json!("ACTIVE"))),
        ("lockedout", Some(json!(0))),
        ("failedlogincount", Some(json!(0))),
        ("memo", args.memo.map(Value::from)),
    ]);
    let response = state
        .client
        .patch(&format!("{ENDPOINT}/{id}"), payload, ctx.forwarded_headers())
        .await?;

    invalidate(state, GET_OP, &args.userid, SEARCH_OP).await;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enriches_lock_and_activity_flags() {
        let user = enrich(json!({"userid": "JDOE", "status": "ACTIVE", "lockedout": false, "failedlogincount": 0}));
        assert_eq!(user["is_locked"], json!(false));
        assert_eq!(user["is_active"], json!(true));
        assert_eq!(user["failed_login_count"], json!(0));

        let user = enrich(json!({"userid": "JDOE", "status": "BLOCKED", "lockedout": 1, "failedlogincount": 5}));
        assert_eq!(user["is_locked"], json!(true));
        assert_eq!(user["is_active"], json!(false));
        assert_eq!(user["failed_login_count"], json!(5));
        assert_eq!(user["userid"], json!("JDOE"));
    }

    #[test]
    fn missing_fields_default_to_unlocked() {
        let user = enrich(json!({"userid": "JDOE"}));
        assert_eq!(user["is_locked"], json!(false));
        assert_eq!(user["is_active"], json!(false));
        assert_eq!(user["failed_login_count"], json!(0));
    }
}
