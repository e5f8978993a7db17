//! 可搜索字段的描述: 字段标识, 取值种类, 支持的运算符

use std::fmt;

use crate::ast::Operator;
use crate::config::FeatureToggles;
use crate::model::{CustomFieldDefinition, CustomFieldType, FieldContext, Id};

/// 系统字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SystemField {
    Project,
    IssueType,
    Status,
    Priority,
    Resolution,
    Assignee,
    Reporter,
    Summary,
    Description,
    Environment,
    Comment,
    Text,
    Created,
    Updated,
    Due,
    Resolved,
    AffectedVersion,
    FixVersion,
    Component,
    Labels,
    IssueKey,
    Parent,
    Votes,
    Voter,
    Watcher,
    Watchers,
    OriginalEstimate,
    RemainingEstimate,
    TimeSpent,
    WorkRatio,
    Level,
    Category,
    Attachments,
}

/// 字段的逻辑标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    System(SystemField),
    Custom(Id),
}

impl From<SystemField> for FieldKey {
    fn from(field: SystemField) -> Self {
        FieldKey::System(field)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::System(field) => write!(f, "{:?}", field),
            FieldKey::Custom(id) => write!(f, "cf[{}]", id),
        }
    }
}

/// 字段取值的种类, 决定字面量如何校验与解析
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Text,
    AllText,
    Date,
    DateTime,
    User,
    Group,
    Option,
    Cascade,
    Version,
    Component,
    Project,
    Category,
    IssueType,
    Status,
    Priority,
    Resolution,
    SecurityLevel,
    IssueKey,
    Number,
    Duration,
    Votes,
    WorkRatio,
    Label,
    Url,
    Attachment,
}

impl ValueKind {
    /// 取值为目录中的具名实体, 可按名称或 id 查找
    pub fn is_named_constant(&self) -> bool {
        matches!(
            self,
            ValueKind::Version
                | ValueKind::Component
                | ValueKind::Project
                | ValueKind::Category
                | ValueKind::IssueType
                | ValueKind::Status
                | ValueKind::Priority
                | ValueKind::Resolution
                | ValueKind::SecurityLevel
        )
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ValueKind::Text | ValueKind::AllText)
    }

    pub fn is_date(&self) -> bool {
        matches!(self, ValueKind::Date | ValueKind::DateTime)
    }

    /// 索引中按数值保存, 支持范围查找
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueKind::Date
                | ValueKind::DateTime
                | ValueKind::Number
                | ValueKind::Duration
                | ValueKind::Votes
                | ValueKind::WorkRatio
        )
    }
}

/// 运算符集合 (位集)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperatorSet(u32);

fn bit(op: Operator) -> u32 {
    1 << (Operator::ALL.iter().position(|o| *o == op).unwrap_or(0) as u32)
}

impl OperatorSet {
    pub const EMPTY: OperatorSet = OperatorSet(0);

    pub fn of(ops: &[Operator]) -> Self {
        OperatorSet(ops.iter().fold(0, |acc, op| acc | bit(*op)))
    }

    pub fn contains(&self, op: Operator) -> bool {
        self.0 & bit(op) != 0
    }

    pub fn union(self, other: OperatorSet) -> Self {
        OperatorSet(self.0 | other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Operator> + '_ {
        Operator::ALL.into_iter().filter(move |op| self.contains(*op))
    }

    pub fn equality() -> Self {
        Self::of(&[Operator::Equals, Operator::NotEquals, Operator::In, Operator::NotIn])
    }

    pub fn empty() -> Self {
        Self::of(&[Operator::Is, Operator::IsNot])
    }

    pub fn relational() -> Self {
        Self::of(&[
            Operator::LessThan,
            Operator::LessThanEquals,
            Operator::GreaterThan,
            Operator::GreaterThanEquals,
        ])
    }

    pub fn like() -> Self {
        Self::of(&[Operator::Like, Operator::NotLike])
    }

    pub fn history() -> Self {
        Self::of(&[
            Operator::Was,
            Operator::WasNot,
            Operator::WasIn,
            Operator::WasNotIn,
            Operator::Changed,
        ])
    }
}

/// 一个可搜索字段的完整描述
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub key: FieldKey,
    pub name: String,
    /// 小写别名, 自定义字段包含 `cf[id]`
    pub aliases: Vec<String>,
    pub kind: ValueKind,
    pub searchable: bool,
    pub operators: OperatorSet,
    pub supports_empty: bool,
    pub supports_history: bool,
    pub sortable: bool,
    /// 一个 issue 上可以有多个取值
    pub multi_valued: bool,
    pub context: FieldContext,
}

impl FieldDescriptor {
    pub fn supports(&self, op: Operator) -> bool {
        self.operators.contains(op)
    }

    pub fn matches_name(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.name.to_lowercase() == lower || self.aliases.iter().any(|a| *a == lower)
    }

    pub fn custom_id(&self) -> Option<Id> {
        match self.key {
            FieldKey::Custom(id) => Some(id),
            FieldKey::System(_) => None,
        }
    }

    pub fn system(&self) -> Option<SystemField> {
        match self.key {
            FieldKey::System(field) => Some(field),
            FieldKey::Custom(_) => None,
        }
    }
}

struct SystemFieldDef {
    field: SystemField,
    name: &'static str,
    aliases: &'static [&'static str],
    kind: ValueKind,
    multi: bool,
    sortable: bool,
    history: bool,
}

const fn def(
    field: SystemField,
    name: &'static str,
    aliases: &'static [&'static str],
    kind: ValueKind,
    multi: bool,
    sortable: bool,
    history: bool,
) -> SystemFieldDef {
    SystemFieldDef { field, name, aliases, kind, multi, sortable, history }
}

use SystemField as S;
use ValueKind as K;

const SYSTEM_FIELDS: &[SystemFieldDef] = &[
    def(S::Project, "project", &[], K::Project, false, true, false),
    def(S::IssueType, "issuetype", &["type"], K::IssueType, false, true, false),
    def(S::Status, "status", &[], K::Status, false, true, true),
    def(S::Priority, "priority", &[], K::Priority, false, true, true),
    def(S::Resolution, "resolution", &[], K::Resolution, false, true, true),
    def(S::Assignee, "assignee", &[], K::User, false, true, true),
    def(S::Reporter, "reporter", &[], K::User, false, true, true),
    def(S::Summary, "summary", &[], K::Text, false, true, false),
    def(S::Description, "description", &[], K::Text, false, true, false),
    def(S::Environment, "environment", &[], K::Text, false, true, false),
    def(S::Comment, "comment", &[], K::Text, true, false, false),
    def(S::Text, "text", &[], K::AllText, true, false, false),
    def(S::Created, "created", &["createddate"], K::DateTime, false, true, false),
    def(S::Updated, "updated", &["updateddate"], K::DateTime, false, true, false),
    def(S::Due, "due", &["duedate"], K::Date, false, true, false),
    def(S::Resolved, "resolved", &["resolutiondate"], K::DateTime, false, true, false),
    def(S::AffectedVersion, "affectedVersion", &[], K::Version, true, true, false),
    def(S::FixVersion, "fixVersion", &[], K::Version, true, true, true),
    def(S::Component, "component", &[], K::Component, true, true, false),
    def(S::Labels, "labels", &[], K::Label, true, true, false),
    def(S::IssueKey, "issuekey", &["key", "id", "issue"], K::IssueKey, false, true, false),
    def(S::Parent, "parent", &[], K::IssueKey, false, false, false),
    def(S::Votes, "votes", &[], K::Votes, false, true, false),
    def(S::Voter, "voter", &[], K::User, true, false, false),
    def(S::Watcher, "watcher", &[], K::User, true, false, false),
    def(S::Watchers, "watchers", &[], K::Votes, false, true, false),
    def(S::OriginalEstimate, "originalEstimate", &["timeoriginalestimate"], K::Duration, false, true, false),
    def(S::RemainingEstimate, "remainingEstimate", &["timeestimate"], K::Duration, false, true, false),
    def(S::TimeSpent, "timeSpent", &["timespent"], K::Duration, false, true, false),
    def(S::WorkRatio, "workRatio", &[], K::WorkRatio, false, true, false),
    def(S::Level, "level", &[], K::SecurityLevel, false, true, false),
    def(S::Category, "category", &[], K::Category, false, false, false),
    def(S::Attachments, "attachments", &[], K::Attachment, false, false, false),
];

/// 系统字段是否被功能开关关闭
pub fn is_enabled(field: SystemField, features: &FeatureToggles) -> bool {
    match field {
        S::OriginalEstimate | S::RemainingEstimate | S::TimeSpent | S::WorkRatio => features.time_tracking,
        S::Votes | S::Voter => features.voting,
        S::Watcher | S::Watchers => features.watching,
        S::Parent => features.subtasks,
        S::Attachments => features.attachments,
        _ => true,
    }
}

/// 取值种类对应的运算符集合
fn operators_for(field: Option<SystemField>, kind: ValueKind) -> OperatorSet {
    let eq = OperatorSet::equality();
    let empty = OperatorSet::empty();
    let rel = OperatorSet::relational();
    match (field, kind) {
        (Some(S::Text), _) => OperatorSet::of(&[Operator::Like]),
        (_, K::Text) => OperatorSet::like().union(empty),
        (_, K::AllText) => OperatorSet::of(&[Operator::Like]),
        (Some(S::Parent), _) => eq,
        (_, K::IssueKey) => eq.union(rel),
        (_, K::Date | K::DateTime | K::Number | K::Duration | K::WorkRatio) => eq.union(rel).union(empty),
        (_, K::Version | K::Priority | K::Resolution) => eq.union(rel).union(empty),
        (_, K::Votes) => eq.union(rel),
        (_, K::Attachment) => empty,
        (_, K::IssueType | K::Status) => eq,
        _ => eq.union(empty),
    }
}

/// 字段是否可以用 EMPTY 搜索
fn supports_empty(field: Option<SystemField>, operators: OperatorSet) -> bool {
    !matches!(field, Some(S::Comment)) && operators.contains(Operator::Is)
}

fn system_descriptor(spec: &SystemFieldDef) -> FieldDescriptor {
    let mut operators = operators_for(Some(spec.field), spec.kind);
    if spec.history {
        operators = operators.union(OperatorSet::history());
    }
    FieldDescriptor {
        key: FieldKey::System(spec.field),
        name: spec.name.to_string(),
        aliases: spec.aliases.iter().map(|a| a.to_lowercase()).collect(),
        kind: spec.kind,
        searchable: true,
        operators,
        supports_empty: supports_empty(Some(spec.field), operators),
        supports_history: spec.history,
        sortable: spec.sortable,
        multi_valued: spec.multi,
        context: FieldContext::Global,
    }
}

/// 启用的系统字段描述
pub fn system_fields(features: &FeatureToggles) -> Vec<FieldDescriptor> {
    SYSTEM_FIELDS
        .iter()
        .filter(|s| is_enabled(s.field, features))
        .map(system_descriptor)
        .collect()
}

/// 所有系统字段, 包括被关闭的
pub fn all_system_fields() -> Vec<FieldDescriptor> {
    SYSTEM_FIELDS.iter().map(system_descriptor).collect()
}

pub fn custom_kind(field_type: CustomFieldType) -> (ValueKind, bool) {
    match field_type {
        CustomFieldType::FreeText => (K::Text, false),
        CustomFieldType::Select => (K::Option, false),
        CustomFieldType::MultiSelect => (K::Option, true),
        CustomFieldType::Cascade => (K::Cascade, true),
        CustomFieldType::Number => (K::Number, false),
        CustomFieldType::Date => (K::Date, false),
        CustomFieldType::DateTime => (K::DateTime, false),
        CustomFieldType::UserPicker => (K::User, false),
        CustomFieldType::MultiUserPicker => (K::User, true),
        CustomFieldType::GroupPicker => (K::Group, true),
        CustomFieldType::Version => (K::Version, true),
        CustomFieldType::Project => (K::Project, false),
        CustomFieldType::Url => (K::Url, false),
        CustomFieldType::Labels => (K::Label, true),
    }
}

pub fn custom_descriptor(def: &CustomFieldDefinition) -> FieldDescriptor {
    let (kind, multi_valued) = custom_kind(def.field_type);
    let operators = operators_for(None, kind);
    FieldDescriptor {
        key: FieldKey::Custom(def.id),
        name: def.name.clone(),
        aliases: vec![format!("cf[{}]", def.id)],
        kind,
        searchable: def.searchable,
        operators,
        supports_empty: supports_empty(None, operators),
        supports_history: false,
        sortable: !matches!(kind, K::Text | K::Label),
        multi_valued,
        context: def.context.clone(),
    }
}
