//! JQL 函数
//!
//! 每个函数实现 [`JqlFunction`] 并注册到 [`FunctionRegistry`]. 注册表按名称
//! (大小写不敏感) 查找函数, 新增函数不需要改动校验器与执行器.

mod constant;
mod date;
mod issue;
mod user;
mod version;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::ast::FunctionCall;
use crate::config::EngineConfig;
use crate::directory::Directory;
use crate::error::{MessageKind, MessageSet};
use crate::field::{FieldDescriptor, ValueKind};
use crate::index::IssueIndex;
use crate::model::Project;
use crate::operand::QueryLiteral;

pub use constant::{no_child_term, CascadeOption, IssueTypesFunction};
pub use date::{DateBoundaryFunction, NowFunction};
pub use issue::{IssueHistoryFunction, LinkedIssuesFunction, UserIssuesFunction};
pub use user::{CurrentUserFunction, MembersOfFunction};
pub use version::{VersionFunction, VersionSelection};

/// 一次查询的执行环境
#[derive(Clone, Copy)]
pub struct QueryContext<'a> {
    /// 小写登录名, None 为匿名用户
    pub user: Option<&'a str>,
    pub now: DateTime<Utc>,
    pub directory: &'a dyn Directory,
    pub index: &'a IssueIndex,
    pub config: &'a EngineConfig,
}

/// 参数个数的范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    /// None 表示不限
    pub max: Option<usize>,
}

impl Arity {
    pub const NONE: Arity = Arity { min: 0, max: Some(0) };

    pub fn exactly(n: usize) -> Self {
        Arity { min: n, max: Some(n) }
    }

    pub fn between(min: usize, max: usize) -> Self {
        Arity { min, max: Some(max) }
    }

    pub fn at_least(min: usize) -> Self {
        Arity { min, max: None }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }

    pub fn message(&self, function: &str, count: usize) -> String {
        match self.max {
            Some(max) if max == self.min => format!(
                "Function '{}' expected '{}' arguments but received '{}'.",
                function, max, count
            ),
            Some(max) => format!(
                "Function '{}' expected between '{}' and '{}' arguments but received '{}'.",
                function, self.min, max, count
            ),
            None => format!(
                "Function '{}' expected at least '{}' arguments but received '{}'.",
                function, self.min, count
            ),
        }
    }
}

/// 函数产生的取值类型, 决定它能用在哪些字段上
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionDataType {
    User,
    Date,
    Issue,
    Version,
    Option,
    IssueType,
    /// 可用于任何字段
    Any,
}

impl FunctionDataType {
    pub fn is_compatible(&self, kind: ValueKind) -> bool {
        match self {
            FunctionDataType::User => kind == ValueKind::User,
            FunctionDataType::Date => kind.is_date(),
            FunctionDataType::Issue => kind == ValueKind::IssueKey,
            FunctionDataType::Version => kind == ValueKind::Version,
            FunctionDataType::Option => kind == ValueKind::Cascade,
            FunctionDataType::IssueType => kind == ValueKind::IssueType,
            FunctionDataType::Any => true,
        }
    }
}

pub trait JqlFunction: Send + Sync {
    fn name(&self) -> &str;

    fn arity(&self) -> Arity;

    fn data_type(&self) -> FunctionDataType;

    /// 返回多个取值, 只能与 IN/NOT IN 一起使用
    fn is_list(&self) -> bool;

    /// 参数个数已经检查过
    fn validate(&self, _ctx: &QueryContext<'_>, _call: &FunctionCall, _field: &FieldDescriptor) -> MessageSet {
        MessageSet::new()
    }

    fn values(&self, ctx: &QueryContext<'_>, call: &FunctionCall, field: &FieldDescriptor) -> Vec<QueryLiteral>;
}

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn JqlFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册全部内置函数
    pub fn with_builtins() -> Self {
        use crate::date::Boundary;

        let mut registry = FunctionRegistry::new();
        registry.register(Arc::new(CurrentUserFunction));
        registry.register(Arc::new(MembersOfFunction));
        registry.register(Arc::new(NowFunction));
        for (name, boundary) in [
            ("startOfDay", Boundary::StartOfDay),
            ("endOfDay", Boundary::EndOfDay),
            ("startOfWeek", Boundary::StartOfWeek),
            ("endOfWeek", Boundary::EndOfWeek),
            ("startOfMonth", Boundary::StartOfMonth),
            ("endOfMonth", Boundary::EndOfMonth),
            ("startOfYear", Boundary::StartOfYear),
            ("endOfYear", Boundary::EndOfYear),
        ] {
            registry.register(Arc::new(DateBoundaryFunction::new(name, boundary)));
        }
        registry.register(Arc::new(UserIssuesFunction::watched()));
        registry.register(Arc::new(UserIssuesFunction::voted()));
        registry.register(Arc::new(IssueHistoryFunction));
        registry.register(Arc::new(LinkedIssuesFunction));
        for selection in [
            VersionSelection::LatestReleased,
            VersionSelection::EarliestUnreleased,
            VersionSelection::Released,
            VersionSelection::Unreleased,
        ] {
            registry.register(Arc::new(VersionFunction::new(selection)));
        }
        registry.register(Arc::new(CascadeOption));
        registry.register(Arc::new(IssueTypesFunction::standard()));
        registry.register(Arc::new(IssueTypesFunction::subtask()));
        registry
    }

    /// 同名函数会被替换
    pub fn register(&mut self, function: Arc<dyn JqlFunction>) {
        self.functions.insert(function.name().to_lowercase(), function);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn JqlFunction>> {
        self.functions.get(&name.to_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.values().map(|f| f.name()).collect();
        names.sort_unstable();
        names
    }
}

/// 按 key, 名称, 数字 id 的顺序解析项目参数, 只返回用户可浏览的项目
pub fn resolve_project<'a>(directory: &'a dyn Directory, user: Option<&str>, arg: &str) -> Option<&'a Project> {
    let project = directory
        .project_by_key(arg)
        .or_else(|| directory.projects().iter().find(|p| p.name.eq_ignore_ascii_case(arg)))
        .or_else(|| arg.trim().parse().ok().and_then(|id| directory.project(id)))?;
    directory.can_browse(user, project).then_some(project)
}

/// 项目参数全部可以解析, 否则逐个报错
pub(crate) fn validate_projects(ctx: &QueryContext<'_>, call: &FunctionCall) -> MessageSet {
    let mut messages = MessageSet::new();
    for arg in &call.args {
        if resolve_project(ctx.directory, ctx.user, arg).is_none() {
            messages.add_error(
                MessageKind::FunctionArgument,
                format!("Could not resolve the project '{}' provided to function '{}'.", arg, call.name),
            );
        }
    }
    messages
}
