//! 领域实体: 项目, 版本, 用户, 自定义字段以及被搜索的 Issue
//!
//! 这些结构由外部系统提供, 引擎只读取它们.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type Id = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Id,
    pub key: String,
    pub name: String,
    pub category: Option<Id>,
    /// 可以浏览该项目的用户组; 为空表示任何人 (包括匿名用户) 都可以浏览
    #[serde(default)]
    pub browse_groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectCategory {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: Id,
    pub project: Id,
    pub name: String,
    /// 项目内的排序序号
    pub sequence: i64,
    pub released: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: Id,
    pub project: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueType {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub subtask: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: Id,
    pub name: String,
}

/// 序号越小优先级越高
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Priority {
    pub id: Id,
    pub name: String,
    pub sequence: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub id: Id,
    pub name: String,
    pub sequence: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityLevel {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkType {
    pub id: Id,
    pub name: String,
    pub inward: String,
    pub outward: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// 登录名, 大小写不敏感
    pub name: String,
    pub full_name: String,
    pub email: String,
    /// 最近浏览过的 issue key, 最近的在前
    #[serde(default)]
    pub viewed_issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

/// 自定义字段的类型, 决定它的取值种类与支持的运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomFieldType {
    FreeText,
    Select,
    MultiSelect,
    Cascade,
    Number,
    Date,
    DateTime,
    UserPicker,
    MultiUserPicker,
    GroupPicker,
    Version,
    Project,
    Url,
    Labels,
}

/// 字段的配置范围
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FieldContext {
    #[default]
    Global,
    /// 空的 issue_types 表示适用于所有问题类型
    Scoped { projects: Vec<Id>, issue_types: Vec<Id> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldOption {
    pub id: Id,
    pub value: String,
    /// 级联选择中子选项的父选项
    #[serde(default)]
    pub parent: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldDefinition {
    pub id: Id,
    pub name: String,
    pub field_type: CustomFieldType,
    #[serde(default)]
    pub context: FieldContext,
    #[serde(default)]
    pub options: Vec<CustomFieldOption>,
    #[serde(default = "default_true")]
    pub searchable: bool,
}

fn default_true() -> bool {
    true
}

impl CustomFieldDefinition {
    pub fn option(&self, id: Id) -> Option<&CustomFieldOption> {
        self.options.iter().find(|o| o.id == id)
    }
}

/// 自定义字段在某个 issue 上的取值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CustomValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    /// 选项 id; 级联选择同时包含父选项与子选项
    Options(Vec<Id>),
    Users(Vec<String>),
    Groups(Vec<String>),
    Versions(Vec<Id>),
    Project(Id),
    Url(String),
    Labels(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
    /// 仅该组成员可见
    #[serde(default)]
    pub group: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkDirection {
    Outward,
    Inward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueLink {
    pub link_type: Id,
    /// 另一端 issue 的 key
    pub target: String,
    pub direction: LinkDirection,
}

/// 一条字段变更记录. 取值使用索引中的规范形式 (实体 id 或小写用户名)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeItem {
    pub field: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub author: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: Id,
    pub key: String,
    pub project: Id,
    pub issue_type: Id,
    pub status: Id,
    pub priority: Option<Id>,
    pub resolution: Option<Id>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub summary: String,
    pub description: Option<String>,
    pub environment: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub due: Option<NaiveDate>,
    pub resolved: Option<DateTime<Utc>>,
    pub affected_versions: Vec<Id>,
    pub fix_versions: Vec<Id>,
    pub components: Vec<Id>,
    pub labels: Vec<String>,
    /// 子任务的父 issue key
    pub parent: Option<String>,
    pub voters: Vec<String>,
    pub watchers: Vec<String>,
    /// 时间跟踪, 单位为分钟
    pub original_estimate: Option<i64>,
    pub remaining_estimate: Option<i64>,
    pub time_spent: Option<i64>,
    pub security_level: Option<Id>,
    pub attachments: u32,
    pub comments: Vec<Comment>,
    pub links: Vec<IssueLink>,
    pub changes: Vec<ChangeItem>,
    pub custom_values: BTreeMap<Id, CustomValue>,
}

impl Issue {
    /// 以最少的必填信息创建一个 issue, 其余字段为空
    pub fn new(id: Id, key: &str, project: Id, issue_type: Id, status: Id, created: DateTime<Utc>) -> Self {
        Issue {
            id,
            key: key.to_string(),
            project,
            issue_type,
            status,
            priority: None,
            resolution: None,
            assignee: None,
            reporter: None,
            summary: String::new(),
            description: None,
            environment: None,
            created,
            updated: created,
            due: None,
            resolved: None,
            affected_versions: Vec::new(),
            fix_versions: Vec::new(),
            components: Vec::new(),
            labels: Vec::new(),
            parent: None,
            voters: Vec::new(),
            watchers: Vec::new(),
            original_estimate: None,
            remaining_estimate: None,
            time_spent: None,
            security_level: None,
            attachments: 0,
            comments: Vec::new(),
            links: Vec::new(),
            changes: Vec::new(),
            custom_values: BTreeMap::new(),
        }
    }

    /// key 中 `-` 之后的序号, 例如 `HSP-12` 为 12
    pub fn number(&self) -> u64 {
        key_number(&self.key).unwrap_or(0)
    }

    /// 工作比率: 已用时间占原始估计的百分比
    pub fn work_ratio(&self) -> Option<i64> {
        match (self.original_estimate, self.time_spent) {
            (Some(estimate), spent) if estimate > 0 => Some(spent.unwrap_or(0) * 100 / estimate),
            _ => None,
        }
    }
}

/// Splits `ABC-12` into its project key and number.
pub fn split_key(key: &str) -> Option<(&str, u64)> {
    let (project, number) = key.rsplit_once('-')?;
    if project.is_empty() {
        return None;
    }
    // 序号只占 key 编码的低 32 位
    number.parse::<u32>().ok().map(|n| (project, u64::from(n)))
}

fn key_number(key: &str) -> Option<u64> {
    split_key(key).map(|(_, n)| n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_split_key() {
        assert_eq!(split_key("HSP-12"), Some(("HSP", 12)));
        assert_eq!(split_key("MY-PROJ-3"), Some(("MY-PROJ", 3)));
        assert_eq!(split_key("HSP"), None);
        assert_eq!(split_key("-3"), None);
        assert_eq!(split_key("HSP-x"), None);
        assert_eq!(split_key("HSP-4294967295"), Some(("HSP", 4_294_967_295)));
        assert_eq!(split_key("HSP-4294967296"), None);
    }

    #[test]
    fn test_work_ratio() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut issue = Issue::new(1, "HSP-1", 1, 1, 1, created);
        assert_eq!(issue.work_ratio(), None);
        issue.original_estimate = Some(120);
        assert_eq!(issue.work_ratio(), Some(0));
        issue.time_spent = Some(30);
        assert_eq!(issue.work_ratio(), Some(25));
        assert_eq!(issue.number(), 1);
    }
}
