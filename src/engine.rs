//! 搜索服务: 串起词法分析, 语法分析, 校验, 复杂度检查, 计划与执行
//!
//! ```text
//! Received → Lexed → Parsed → FieldsResolved → Validated{Valid|Warning}
//!          → Evaluated → Results
//! 任一阶段失败 → Rejected
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::ast::Query;
use crate::complexity;
use crate::config::EngineConfig;
use crate::directory::Directory;
use crate::error::{JqlError, MessageSet, Result};
use crate::evaluator::Evaluator;
use crate::fitness::{self, Fitness};
use crate::functions::{FunctionRegistry, JqlFunction, QueryContext};
use crate::index::IssueIndex;
use crate::lexer::tokenize;
use crate::parser::Parser;
use crate::planner::{Optimization, Planner};
use crate::registry::FieldRegistry;
use crate::sanitize::Sanitizer;
use crate::validator::{QueryOrigin, ValidatedQuery, Validator};

/// 一次搜索所处的阶段, 只用于日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Received,
    Lexed,
    Parsed,
    FieldsResolved,
    Validated(Validity),
    Evaluated,
    Results,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Warning,
}

fn transition(state: SearchState) {
    debug!(?state, "search state");
}

fn rejected(error: JqlError) -> JqlError {
    info!(state = ?SearchState::Rejected, status = error.status_code(), %error, "search rejected");
    error
}

/// 执行结果: 排好序的 issue key
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    pub keys: Vec<String>,
    pub warnings: MessageSet,
    pub optimizations: Vec<Optimization>,
}

impl SearchResults {
    pub fn total(&self) -> usize {
        self.keys.len()
    }
}

/// 对外的应答, 带 HTTP 风格的状态码
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub status: u16,
    pub keys: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl SearchResponse {
    fn ok(results: SearchResults) -> Self {
        SearchResponse {
            status: 200,
            warnings: results.warnings.warning_texts().into_iter().map(String::from).collect(),
            keys: results.keys,
            errors: Vec::new(),
        }
    }

    fn failed(error: &JqlError) -> Self {
        SearchResponse { status: error.status_code(), keys: Vec::new(), warnings: Vec::new(), errors: error.messages() }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// 搜索服务. 构建后不可变, 可以在线程之间共享
#[derive(Clone)]
pub struct SearchService {
    directory: Arc<dyn Directory>,
    index: Arc<IssueIndex>,
    fields: Arc<FieldRegistry>,
    functions: Arc<FunctionRegistry>,
    config: Arc<EngineConfig>,
    /// 固定的当前时间, 为 None 时使用系统时间
    now: Option<DateTime<Utc>>,
}

impl SearchService {
    pub fn new(directory: Arc<dyn Directory>, index: Arc<IssueIndex>, config: EngineConfig) -> Self {
        let fields = FieldRegistry::from_directory(config.features, directory.as_ref());
        SearchService {
            directory,
            index,
            fields: Arc::new(fields),
            functions: Arc::new(FunctionRegistry::with_builtins()),
            config: Arc::new(config),
            now: None,
        }
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// 注册一个函数, 同名的内置函数会被替换
    pub fn with_function(mut self, function: Arc<dyn JqlFunction>) -> Self {
        Arc::make_mut(&mut self.functions).register(function);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn index(&self) -> &IssueIndex {
        &self.index
    }

    fn context<'s>(&'s self, user: Option<&'s str>) -> QueryContext<'s> {
        QueryContext {
            user,
            now: self.now.unwrap_or_else(Utc::now),
            directory: self.directory.as_ref(),
            index: &self.index,
            config: &self.config,
        }
    }

    pub fn parse(&self, text: &str) -> Result<Query> {
        transition(SearchState::Received);
        let tokens = tokenize(text).map_err(rejected)?;
        transition(SearchState::Lexed);
        let query = Parser::new(&tokens).parse().map_err(rejected)?;
        transition(SearchState::Parsed);
        Ok(query)
    }

    pub fn validate(&self, query: Query, user: Option<&str>, origin: QueryOrigin) -> Result<ValidatedQuery> {
        let user = normalize(user);
        let ctx = self.context(user.as_deref());
        let validated = Validator::new(ctx, &self.fields, &self.functions).validate(query, origin).map_err(rejected)?;
        transition(SearchState::FieldsResolved);
        let validity = if validated.warnings().has_warnings() { Validity::Warning } else { Validity::Valid };
        transition(SearchState::Validated(validity));
        Ok(validated)
    }

    pub fn parse_and_validate(&self, text: &str, user: Option<&str>, origin: QueryOrigin) -> Result<ValidatedQuery> {
        let query = self.parse(text)?;
        self.validate(query, user, origin)
    }

    /// 执行已校验的查询. 超过复杂度上限时不会执行
    pub fn evaluate(&self, query: &ValidatedQuery, user: Option<&str>) -> Result<SearchResults> {
        let user = normalize(user);
        let ctx = self.context(user.as_deref());
        let fan_out = complexity::check(query, self.config.max_query_terms).map_err(rejected)?;
        let compiled = Planner::new(ctx, &self.fields).compile(query);
        let evaluator = Evaluator::new(ctx);
        let docs = evaluator.eval(&compiled.plan);
        transition(SearchState::Evaluated);
        let ordered = evaluator.order(&docs, query.sorts());
        let keys: Vec<String> = ordered
            .into_iter()
            .filter_map(|doc| self.index.issue(doc))
            .map(|issue| issue.key.clone())
            .collect();
        debug!(fan_out, hits = keys.len(), "search finished");
        transition(SearchState::Results);
        Ok(SearchResults { keys, warnings: query.warnings().clone(), optimizations: compiled.optimizations })
    }

    /// 完整的一次搜索: 成功为 200, 查询有误为 400
    pub fn search(&self, text: &str, user: Option<&str>) -> SearchResponse {
        let result = self
            .parse_and_validate(text, user, QueryOrigin::Fresh)
            .and_then(|validated| self.evaluate(&validated, user));
        match result {
            Ok(results) => SearchResponse::ok(results),
            Err(error) => SearchResponse::failed(&error),
        }
    }

    pub fn fits_simple_form(&self, query: &Query, user: Option<&str>) -> Fitness {
        let user = normalize(user);
        fitness::check(self.context(user.as_deref()), &self.fields, query)
    }

    pub fn sanitize(&self, query: &Query, user: Option<&str>) -> Query {
        let user = normalize(user);
        Sanitizer::new(self.directory.as_ref(), &self.functions, user.as_deref()).sanitize(query)
    }

    pub fn to_jql(&self, query: &Query) -> String {
        query.to_string()
    }
}

/// 登录名大小写不敏感
fn normalize(user: Option<&str>) -> Option<String> {
    user.map(|u| u.trim().to_lowercase()).filter(|u| !u.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::functions::testing::{directory, index};

    fn service() -> SearchService {
        let dir = directory();
        let index = index(&dir);
        SearchService::new(Arc::new(dir), Arc::new(index), EngineConfig::default())
            .with_now(Utc.with_ymd_and_hms(2024, 5, 15, 13, 30, 0).unwrap())
    }

    #[test]
    fn test_service_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchService>();
    }

    #[test]
    fn test_search_statuses() {
        let service = service();
        let response = service.search("watcher = currentUser()", Some("Admin"));
        assert_eq!(response.status, 200);
        assert_eq!(response.keys, vec!["MKY-1", "HSP-1"]);

        let response = service.search("project = ", Some("admin"));
        assert_eq!(response.status, 400);
        assert_eq!(response.errors.len(), 1);

        let response = service.search("nosuchfield = 1", None);
        assert_eq!(response.status, 400);
        assert_eq!(
            response.errors,
            vec!["Field 'nosuchfield' does not exist or you do not have permission to view it."]
        );
    }

    #[test]
    fn test_warnings_do_not_block() {
        let service = service();
        let response = service.search("assignee = ghost OR project = HSP", None);
        assert!(response.is_success());
        assert_eq!(response.keys, vec!["HSP-2", "HSP-1"]);
        assert_eq!(response.warnings.len(), 1);
    }

    #[test]
    fn test_empty_query_returns_visible_issues() {
        let service = service();
        assert_eq!(service.search("", None).keys, vec!["HSP-2", "HSP-1"]);
        assert_eq!(service.search("", Some("admin")).keys, vec!["MKY-1", "HSP-2", "HSP-1"]);
    }

    #[test]
    fn test_to_jql_round_trip() {
        let service = service();
        let query = service.parse("project = HSP and (assignee = fred or reporter is empty) order by key").unwrap();
        let text = service.to_jql(&query);
        assert_eq!(service.parse(&text).unwrap(), query);
    }
}
