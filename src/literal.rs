//! 字面量解析: 把一个取值按字段的取值种类转换为索引中的规范形式
//!
//! 校验器与查询计划共用这里的逻辑: 校验器收集消息, 计划只使用结果.

use lazy_static::lazy_static;
use regex::Regex;

use crate::date::{parse_date, parse_duration};
use crate::error::{MessageKind, MessageSet};
use crate::field::{FieldDescriptor, ValueKind};
use crate::functions::QueryContext;
use crate::index::number_key;
use crate::model::{
    Component, CustomFieldDefinition, Id, IssueType, Priority, Project, ProjectCategory, Resolution,
    SecurityLevel, Status, Version,
};
use crate::operand::{LiteralValue, QueryLiteral};
use crate::text::{TextQuery, TextQueryError};

lazy_static! {
    static ref ISSUE_KEY: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*-\d+$").unwrap();
    static ref NO_CHILD: Regex = Regex::new(r"^(\d+):none$").unwrap();
}

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// 规范化后的取值
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 倒排表中的词项
    Term(String),
    /// 数值索引中的精确值
    Number(i64),
    /// 不带时间的日期用于日期时间字段时表示一整天 `[start, end)`
    Span(i64, i64),
    Text(TextQuery),
    Empty,
    /// 无法解析, 不匹配任何 issue
    Nothing,
}

/// 具名常量: 可以按名称或 id 查找
trait Named {
    fn id(&self) -> Id;
    fn name(&self) -> &str;
}

macro_rules! named {
    ($($ty:ty),*) => {
        $(impl Named for $ty {
            fn id(&self) -> Id {
                self.id
            }
            fn name(&self) -> &str {
                &self.name
            }
        })*
    };
}

named!(Project, ProjectCategory, Version, Component, IssueType, Status, Priority, Resolution, SecurityLevel);

/// 带引号的输入先按名称后按 id 查找, 数字先按 id 后按名称
fn find_named<T: Named>(items: &[&T], literal: &QueryLiteral) -> Vec<Id> {
    let by_name = |text: &str| -> Vec<Id> {
        items.iter().filter(|i| i.name().eq_ignore_ascii_case(text)).map(|i| i.id()).collect()
    };
    let by_id = |id: Id| -> Vec<Id> { items.iter().filter(|i| i.id() == id).map(|i| i.id()).collect() };
    match &literal.value {
        LiteralValue::String(s) => {
            let found = by_name(s);
            if found.is_empty() {
                s.trim().parse().map(by_id).unwrap_or_default()
            } else {
                found
            }
        }
        LiteralValue::Number(n) => {
            let found = u64::try_from(*n).map(by_id).unwrap_or_default();
            if found.is_empty() {
                by_name(&n.to_string())
            } else {
                found
            }
        }
        LiteralValue::Empty => Vec::new(),
    }
}

fn terms(ids: Vec<Id>) -> Vec<Value> {
    ids.into_iter().map(|id| Value::Term(id.to_string())).collect()
}

/// 生成消息文本; 由函数产生的取值改用函数的说法
struct Report<'r> {
    field: &'r str,
    literal: &'r QueryLiteral,
}

impl Report<'_> {
    fn not_found(&self, messages: &mut MessageSet, warning: bool) {
        let (kind, text) = match (&self.literal.function, &self.literal.value) {
            (Some(function), _) => (
                MessageKind::ValueNotFound,
                format!("A value provided by the function '{}' does not exist for the field '{}'.", function, self.field),
            ),
            (None, LiteralValue::Number(n)) => (
                MessageKind::IdNotFound,
                format!("A value with ID '{}' does not exist for the field '{}'.", n, self.field),
            ),
            (None, _) => (
                MessageKind::ValueNotFound,
                format!("The value {} does not exist for the field '{}'.", self.literal, self.field),
            ),
        };
        if warning {
            messages.add_warning(kind, text);
        } else {
            messages.add_error(kind, text);
        }
    }

    /// `template` 中的 `{v}` 与 `{f}` 分别替换为取值与字段名
    fn invalid(&self, messages: &mut MessageSet, kind: MessageKind, template: &str) {
        let text = match &self.literal.function {
            Some(function) => {
                format!("A value provided by the function '{}' is invalid for the field '{}'.", function, self.field)
            }
            None => template.replace("{v}", &self.literal.to_string()).replace("{f}", self.field),
        };
        messages.add_error(kind, text);
    }
}

/// 把一个取值解析为规范形式. 出错时写入 `messages` 并返回 `Value::Nothing`
pub fn resolve(
    ctx: &QueryContext<'_>,
    field: &FieldDescriptor,
    field_name: &str,
    literal: &QueryLiteral,
    messages: &mut MessageSet,
) -> Vec<Value> {
    if literal.is_empty() {
        return vec![Value::Empty];
    }
    let report = Report { field: field_name, literal };
    let values = match field.kind {
        ValueKind::Text | ValueKind::AllText => text_value(&report, messages),
        ValueKind::Date | ValueKind::DateTime => date_value(ctx, field.kind, &report, messages),
        ValueKind::Number => number_value(&report, messages),
        ValueKind::Duration => duration_value(ctx, &report, messages),
        ValueKind::WorkRatio => integer_value(&report, messages),
        ValueKind::Votes => votes_value(&report, messages),
        ValueKind::IssueKey => issue_key_value(ctx, &report, messages),
        ValueKind::User => user_value(ctx, &report, messages),
        ValueKind::Group => group_value(ctx, &report, messages),
        ValueKind::Option | ValueKind::Cascade => option_value(ctx, field, &report, messages),
        ValueKind::Label => label_value(&report, messages),
        ValueKind::Url => vec![Value::Term(literal.text())],
        ValueKind::Attachment => Vec::new(),
        ValueKind::Resolution if is_unresolved(ctx, literal) => vec![Value::Empty],
        kind => named_value(ctx, kind, &report, messages),
    };
    if values.is_empty() {
        vec![Value::Nothing]
    } else {
        values
    }
}

/// `resolution = unresolved` 表示没有解决结果, 除非真的存在名为 unresolved 的解决结果
fn is_unresolved(ctx: &QueryContext<'_>, literal: &QueryLiteral) -> bool {
    match &literal.value {
        LiteralValue::String(s) => {
            s.eq_ignore_ascii_case("unresolved")
                && !ctx.directory.resolutions().iter().any(|r| r.name.eq_ignore_ascii_case(s))
        }
        _ => false,
    }
}

fn text_value(report: &Report<'_>, messages: &mut MessageSet) -> Vec<Value> {
    match TextQuery::parse(&report.literal.text()) {
        Ok(query) => vec![Value::Text(query)],
        Err(TextQueryError::Empty) => {
            messages.add_error(
                MessageKind::EmptyStringNotSupported,
                format!("The field '{}' does not support searching for an empty string.", report.field),
            );
            Vec::new()
        }
        Err(TextQueryError::InvalidStart) => {
            report.invalid(
                messages,
                MessageKind::InvalidTextQuery,
                "The text query {v} for field '{f}' is not allowed to start with {v}.",
            );
            Vec::new()
        }
        Err(TextQueryError::Range) => {
            report.invalid(
                messages,
                MessageKind::InvalidTextQuery,
                "The text query {v} for field '{f}' is not valid: probably your range query is incorrect.",
            );
            Vec::new()
        }
        Err(TextQueryError::Unparsable) => {
            report.invalid(messages, MessageKind::InvalidTextQuery, "Unable to parse the text {v} for field '{f}'.");
            Vec::new()
        }
    }
}

fn date_value(ctx: &QueryContext<'_>, kind: ValueKind, report: &Report<'_>, messages: &mut MessageSet) -> Vec<Value> {
    let text = match &report.literal.value {
        LiteralValue::Number(millis) => return vec![Value::Number(*millis)],
        _ => report.literal.text(),
    };
    match parse_date(&text, ctx.now) {
        Some(date) if kind == ValueKind::DateTime && !date.has_time => {
            vec![Value::Span(date.millis(), date.millis() + DAY_MILLIS)]
        }
        Some(date) if kind == ValueKind::DateTime || !date.has_time || is_period(&text) => {
            vec![Value::Number(date.millis())]
        }
        _ if kind == ValueKind::Date => {
            report.invalid(
                messages,
                MessageKind::InvalidValue,
                "Date value {v} for field '{f}' is invalid. Valid formats include: 'YYYY/MM/DD', 'YYYY-MM-DD', or a period format e.g. '-5d', '4w 2d'.",
            );
            Vec::new()
        }
        _ => {
            report.invalid(
                messages,
                MessageKind::InvalidValue,
                "Date value {v} for field '{f}' is invalid. Valid formats include: 'yyyy/MM/dd HH:mm', 'yyyy-MM-dd HH:mm', 'yyyy/MM/dd', 'yyyy-MM-dd', or a period format e.g. '-5d', '4w 2d'.",
            );
            Vec::new()
        }
    }
}

fn is_period(text: &str) -> bool {
    crate::date::parse_period(text).is_some()
}

fn number_value(report: &Report<'_>, messages: &mut MessageSet) -> Vec<Value> {
    let parsed = match &report.literal.value {
        LiteralValue::Number(n) => Some(*n as f64),
        _ => report.literal.text().trim().parse::<f64>().ok().filter(|f| f.is_finite()),
    };
    match parsed {
        Some(value) => vec![Value::Number(number_key(value))],
        None => {
            report.invalid(messages, MessageKind::InvalidValue, "Value {v} for the '{f}' field is not a valid number.");
            Vec::new()
        }
    }
}

fn duration_value(ctx: &QueryContext<'_>, report: &Report<'_>, messages: &mut MessageSet) -> Vec<Value> {
    let minutes = match &report.literal.value {
        LiteralValue::Number(n) => Some(*n).filter(|n| *n >= 0),
        _ => parse_duration(&report.literal.text(), ctx.config.minutes_per_day(), ctx.config.minutes_per_week()),
    };
    match minutes {
        Some(minutes) => vec![Value::Number(minutes)],
        None => {
            report.invalid(
                messages,
                MessageKind::InvalidValue,
                "The value {v} for field '{f}' is invalid. Please specify a positive duration format; for example: '1h 30m', '2d'.",
            );
            Vec::new()
        }
    }
}

fn integer_value(report: &Report<'_>, messages: &mut MessageSet) -> Vec<Value> {
    let parsed = match &report.literal.value {
        LiteralValue::Number(n) => Some(*n),
        _ => report.literal.text().trim().parse::<i64>().ok(),
    };
    match parsed {
        Some(n) => vec![Value::Number(n)],
        None => {
            report.invalid(
                messages,
                MessageKind::InvalidValue,
                "The value {v} for field '{f}' is invalid - please specify an integer.",
            );
            Vec::new()
        }
    }
}

fn votes_value(report: &Report<'_>, messages: &mut MessageSet) -> Vec<Value> {
    let parsed = match &report.literal.value {
        LiteralValue::Number(n) => Some(*n),
        _ => report.literal.text().trim().parse::<i64>().ok(),
    };
    match parsed.filter(|n| *n >= 0) {
        Some(n) => vec![Value::Number(n)],
        None => {
            report.invalid(
                messages,
                MessageKind::InvalidValue,
                "Value {v} is invalid for the '{f}' field. Votes must be a positive whole number.",
            );
            Vec::new()
        }
    }
}

fn issue_key_value(ctx: &QueryContext<'_>, report: &Report<'_>, messages: &mut MessageSet) -> Vec<Value> {
    let visible = |issue: &&crate::model::Issue| ctx.directory.can_see_issue(ctx.user, issue);
    match &report.literal.value {
        LiteralValue::Number(id) => {
            let found = ctx.index.issues().iter().filter(visible).find(|i| i.id as i64 == *id);
            match found {
                Some(issue) => vec![Value::Term(issue.key.to_uppercase())],
                None => {
                    report.not_found(messages, false);
                    Vec::new()
                }
            }
        }
        _ => {
            let key = report.literal.text();
            if !ISSUE_KEY.is_match(key.trim()) {
                report.invalid(messages, MessageKind::InvalidValue, "The issue key {v} for field '{f}' is invalid.");
                return Vec::new();
            }
            match ctx.index.issue_by_key(key.trim()).filter(visible) {
                Some(issue) => vec![Value::Term(issue.key.to_uppercase())],
                None => {
                    let text = match &report.literal.function {
                        Some(function) => format!(
                            "A value provided by the function '{}' does not exist for the field '{}'.",
                            function, report.field
                        ),
                        None => format!("An issue with key {} does not exist for field '{}'.", report.literal, report.field),
                    };
                    messages.add_error(MessageKind::ValueNotFound, text);
                    Vec::new()
                }
            }
        }
    }
}

/// 找不到的用户只是警告, 该分支不匹配任何 issue
fn user_value(ctx: &QueryContext<'_>, report: &Report<'_>, messages: &mut MessageSet) -> Vec<Value> {
    let users = ctx.directory.find_users(&report.literal.text());
    if users.is_empty() {
        report.not_found(messages, true);
    }
    users.into_iter().map(|u| Value::Term(u.name.to_lowercase())).collect()
}

fn group_value(ctx: &QueryContext<'_>, report: &Report<'_>, messages: &mut MessageSet) -> Vec<Value> {
    match ctx.directory.group(&report.literal.text()) {
        Some(group) => vec![Value::Term(group.name.to_lowercase())],
        None => {
            report.invalid(messages, MessageKind::ValueNotFound, "The group {v} for field '{f}' does not exist.");
            Vec::new()
        }
    }
}

fn option_value(
    ctx: &QueryContext<'_>,
    field: &FieldDescriptor,
    report: &Report<'_>,
    messages: &mut MessageSet,
) -> Vec<Value> {
    let definition = field.custom_id().and_then(|id| ctx.directory.custom_field(id));
    let found = definition.map(|d| find_option(d, field.kind, report.literal)).unwrap_or_default();
    if found.is_empty() {
        report.invalid(messages, MessageKind::ValueNotFound, "The option {v} for field '{f}' does not exist.");
    }
    found
}

fn find_option(definition: &CustomFieldDefinition, kind: ValueKind, literal: &QueryLiteral) -> Vec<Value> {
    let by_value = |text: &str| -> Vec<Value> {
        definition
            .options
            .iter()
            .filter(|o| o.value.eq_ignore_ascii_case(text))
            .map(|o| Value::Term(o.id.to_string()))
            .collect()
    };
    let by_id = |id: Id| -> Vec<Value> {
        definition.option(id).map(|o| Value::Term(o.id.to_string())).into_iter().collect()
    };
    match &literal.value {
        LiteralValue::String(s) => {
            if kind == ValueKind::Cascade {
                if let Some(caps) = NO_CHILD.captures(s) {
                    let is_parent = caps[1]
                        .parse()
                        .ok()
                        .and_then(|id| definition.option(id))
                        .is_some_and(|o| o.parent.is_none());
                    if is_parent {
                        return vec![Value::Term(s.clone())];
                    }
                }
            }
            let found = by_value(s);
            if found.is_empty() {
                s.trim().parse().map(by_id).unwrap_or_default()
            } else {
                found
            }
        }
        LiteralValue::Number(n) => {
            let found = u64::try_from(*n).map(by_id).unwrap_or_default();
            if found.is_empty() {
                by_value(&n.to_string())
            } else {
                found
            }
        }
        LiteralValue::Empty => Vec::new(),
    }
}

fn label_value(report: &Report<'_>, messages: &mut MessageSet) -> Vec<Value> {
    let text = report.literal.text();
    if text.is_empty() {
        messages.add_error(
            MessageKind::EmptyStringNotSupported,
            format!("The field '{}' does not support searching for an empty string.", report.field),
        );
        return Vec::new();
    }
    vec![Value::Term(text)]
}

fn named_value(ctx: &QueryContext<'_>, kind: ValueKind, report: &Report<'_>, messages: &mut MessageSet) -> Vec<Value> {
    let dir = ctx.directory;
    let browsable = |project: Id| dir.project(project).is_some_and(|p| dir.can_browse(ctx.user, p));
    let literal = report.literal;
    let ids = match kind {
        ValueKind::Project => {
            let projects: Vec<&Project> = dir.visible_projects(ctx.user);
            // 项目还可以按 key 查找
            let by_key: Vec<Id> = match &literal.value {
                LiteralValue::String(s) => projects.iter().filter(|p| p.key.eq_ignore_ascii_case(s)).map(|p| p.id).collect(),
                _ => Vec::new(),
            };
            if by_key.is_empty() {
                find_named(&projects, literal)
            } else {
                by_key
            }
        }
        ValueKind::Version => {
            let versions: Vec<&Version> = dir.versions().iter().filter(|v| browsable(v.project)).collect();
            find_named(&versions, literal)
        }
        ValueKind::Component => {
            let components: Vec<&Component> = dir.components().iter().filter(|c| browsable(c.project)).collect();
            find_named(&components, literal)
        }
        ValueKind::Category => find_named(&dir.categories().iter().collect::<Vec<_>>(), literal),
        ValueKind::IssueType => find_named(&dir.issue_types().iter().collect::<Vec<_>>(), literal),
        ValueKind::Status => find_named(&dir.statuses().iter().collect::<Vec<_>>(), literal),
        ValueKind::Priority => find_named(&dir.priorities().iter().collect::<Vec<_>>(), literal),
        ValueKind::Resolution => find_named(&dir.resolutions().iter().collect::<Vec<_>>(), literal),
        ValueKind::SecurityLevel => find_named(&dir.security_levels().iter().collect::<Vec<_>>(), literal),
        _ => Vec::new(),
    };
    if ids.is_empty() {
        report.not_found(messages, false);
    }
    terms(ids)
}
