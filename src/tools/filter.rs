//! OSLC 查询参数构造

pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// 构造 `oslc.select` / `oslc.where` / `oslc.pageSize` / `lean` 查询参数
#[derive(Debug, Clone)]
pub struct OslcQuery {
    select: &'static str,
    clauses: Vec<String>,
    page_size: Option<u32>,
}

impl OslcQuery {
    pub fn select(fields: &'static str) -> Self {
        Self {
            select: fields,
            clauses: Vec::new(),
            page_size: None,
        }
    }

    /// `field="value"`
    pub fn eq(mut self, field: &str, value: &str) -> Self {
        self.clauses.push(format!("{field}=\"{}\"", sanitize(value)));
        self
    }

    pub fn eq_opt(self, field: &str, value: Option<&str>) -> Self {
        match value.filter(|v| !v.is_empty()) {
            Some(value) => self.eq(field, value),
            None => self,
        }
    }

    /// 在多个字段上做模糊匹配：`(a~"q" or b~"q")`
    pub fn text_search(mut self, fields: &[&str], query: Option<&str>) -> Self {
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            let query = sanitize(query);
            let alternatives: Vec<String> = fields
                .iter()
                .map(|field| format!("{field}~\"{query}\""))
                .collect();
            self.clauses.push(format!("({})", alternatives.join(" or ")));
        }
        self
    }

    /// 原样追加的固定子句，只接受代码中的常量
    pub fn clause_if(mut self, condition: bool, clause: &'static str) -> Self {
        if condition {
            self.clauses.push(clause.to_string());
        }
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    pub fn where_clause(&self) -> Option<String> {
        if self.clauses.is_empty() {
            None
        } else {
            Some(self.clauses.join(" and "))
        }
    }

    pub fn into_params(self) -> Vec<(&'static str, String)> {
        let mut params = vec![("oslc.select", self.select.to_string())];
        if let Some(clause) = self.where_clause() {
            params.push(("oslc.where", clause));
        }
        if let Some(page_size) = self.page_size {
            params.push(("oslc.pageSize", page_size.to_string()));
        }
        params.push(("lean", "1".to_string()));
        params
    }
}

/// 去掉双引号，避免用户输入闭合 where 子句中的字符串
fn sanitize(value: &str) -> String {
    value.replace('"', "")
}
