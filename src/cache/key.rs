use std::borrow::Cow;
use std::time::Duration;

use serde_json::Value;

use crate::config::Config;

/// 可以参与缓存键的参数；复杂类型与空值不进入键
pub trait KeyArg {
    fn key_part(&self) -> Option<String>;
}

impl KeyArg for str {
    fn key_part(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl KeyArg for String {
    fn key_part(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl KeyArg for bool {
    fn key_part(&self) -> Option<String> {
        Some(self.to_string())
    }
}

macro_rules! numeric_key_arg {
    ($($ty:ty),*) => {
        $(impl KeyArg for $ty {
            fn key_part(&self) -> Option<String> {
                Some(self.to_string())
            }
        })*
    };
}

numeric_key_arg!(i32, i64, u32, u64, usize, f64);

impl<T: KeyArg + ?Sized> KeyArg for &T {
    fn key_part(&self) -> Option<String> {
        (**self).key_part()
    }
}

impl<T: KeyArg> KeyArg for Option<T> {
    fn key_part(&self) -> Option<String> {
        self.as_ref().and_then(KeyArg::key_part)
    }
}

impl KeyArg for Value {
    fn key_part(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// 转义参数中的分隔符，避免不同参数组合拼出同一个键
fn escape(part: &str) -> Cow<'_, str> {
    if !part.contains(['%', ':', '=']) {
        return Cow::Borrowed(part);
    }
    let mut escaped = String::with_capacity(part.len() + 8);
    for c in part.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            '=' => escaped.push_str("%3D"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// 缓存键构造器
///
/// 形如 `operation:pos1:pos2:kw_a=1:kw_b=2`，关键字参数按名称排序，
/// 因此同一逻辑调用无论参数书写顺序如何都得到同一个键。
#[derive(Debug, Clone)]
pub struct CacheKey {
    operation: String,
    positional: Vec<String>,
    keyword: Vec<(String, String)>,
}

impl CacheKey {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            positional: Vec::new(),
            keyword: Vec::new(),
        }
    }

    pub fn arg<T: KeyArg + ?Sized>(mut self, value: &T) -> Self {
        if let Some(part) = value.key_part() {
            self.positional.push(escape(&part).into_owned());
        }
        self
    }

    pub fn kwarg<T: KeyArg + ?Sized>(mut self, name: &str, value: &T) -> Self {
        if let Some(part) = value.key_part() {
            self.keyword.push((name.to_string(), escape(&part).into_owned()));
        }
        self
    }

    pub fn build(mut self) -> String {
        self.keyword.sort_by(|a, b| a.0.cmp(&b.0));

        let mut parts = Vec::with_capacity(1 + self.positional.len() + self.keyword.len());
        parts.push(self.operation);
        parts.extend(self.positional);
        parts.extend(self.keyword.into_iter().map(|(k, v)| format!("{k}={v}")));
        parts.join(":")
    }

    /// 某个操作下所有缓存键的匹配模式，例如 `search_assets:*`
    pub fn all(operation: &str) -> String {
        format!("{operation}:*")
    }

    /// 以某个资源标识开头的所有变体，例如 `get_asset:A123:*`
    pub fn variants(operation: &str, id: &str) -> String {
        format!("{operation}:{}:*", escape(id))
    }
}

/// 缓存类别，决定条目的 TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    AssetDetail,
    AssetSearch,
    WorkOrderDetail,
    WorkOrderList,
    InventoryDetail,
    InventoryStock,
    UserDetail,
    UserSearch,
}

#[derive(Debug, Clone)]
pub struct CacheTtls {
    pub asset: Duration,
    pub work_order: Duration,
    pub inventory: Duration,
    pub search: Duration,
    pub user: Duration,
}

impl CacheTtls {
    pub fn from_config(config: &Config) -> Self {
        Self {
            asset: Duration::from_secs(config.cache_ttl_asset_secs),
            work_order: Duration::from_secs(config.cache_ttl_workorder_secs),
            inventory: Duration::from_secs(config.cache_ttl_inventory_secs),
            search: Duration::from_secs(config.cache_ttl_search_secs),
            user: Duration::from_secs(config.cache_ttl_user_secs),
        }
    }

    pub fn ttl(&self, category: CacheCategory) -> Duration {
        match category {
            CacheCategory::AssetDetail => self.asset,
            CacheCategory::AssetSearch => self.search,
            CacheCategory::WorkOrderDetail | CacheCategory::WorkOrderList => self.work_order,
            CacheCategory::InventoryDetail | CacheCategory::InventoryStock => self.inventory,
            CacheCategory::UserDetail | CacheCategory::UserSearch => self.user,
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            asset: Duration::from_secs(600),
            work_order: Duration::from_secs(300),
            inventory: Duration::from_secs(600),
            search: Duration::from_secs(300),
            user: Duration::from_secs(300),
        }
    }
}
