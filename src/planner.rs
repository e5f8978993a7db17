//! 查询计划: 把通过校验的查询编译为可在位图索引上执行的计划树,
//! 并在编译时做合并与去重优化.

use std::collections::BTreeSet;
use std::ops::Bound;

use tracing::debug;

use crate::ast::{Clause, Operator, PredicateKind};
use crate::config::OptimizationConfig;
use crate::field::{FieldDescriptor, FieldKey, SystemField, ValueKind};
use crate::functions::QueryContext;
use crate::index::issue_key_code;
use crate::literal::Value;
use crate::model::{split_key, Id};
use crate::registry::FieldRegistry;
use crate::text::TextQuery;
use crate::validator::{ResolvedClause, ResolvedField, ValidatedQuery};

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// 历史取值集合; `empty` 表示包含"没有取值"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueSet {
    pub terms: BTreeSet<String>,
    pub empty: bool,
}

impl ValueSet {
    fn from_values(values: &[Value]) -> Self {
        let mut set = ValueSet::default();
        for value in values {
            match value {
                Value::Term(term) => {
                    set.terms.insert(term.clone());
                }
                Value::Number(n) => {
                    set.terms.insert(n.to_string());
                }
                Value::Empty => set.empty = true,
                _ => {}
            }
        }
        set
    }

    pub fn contains(&self, value: Option<&str>) -> bool {
        match value {
            Some(v) => self.terms.contains(v),
            None => self.empty,
        }
    }

    /// 区间的取值列表是否与集合相交
    pub fn intersects(&self, values: &[String]) -> bool {
        (self.empty && values.is_empty()) || values.iter().any(|v| self.terms.contains(v))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryMode {
    Was(ValueSet),
    Changed { from: Option<ValueSet>, to: Option<ValueSet> },
}

/// WAS/CHANGED 的执行计划. 时间窗口为 `[start, end)`
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPlan {
    pub field: SystemField,
    pub mode: HistoryMode,
    pub by: Option<BTreeSet<String>>,
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    All,
    Nothing,
    /// 字段包含集合中任一词项
    Terms { field: FieldKey, terms: BTreeSet<String> },
    Range { field: FieldKey, lower: Bound<i64>, upper: Bound<i64> },
    Present(FieldKey),
    Text { field: FieldKey, query: TextQuery },
    /// 用户可见的评论
    Comments(TextQuery),
    History(HistoryPlan),
    And(Vec<Plan>),
    Or(Vec<Plan>),
    Not(Box<Plan>),
}

impl Plan {
    fn absent(field: FieldKey) -> Plan {
        Plan::Not(Box::new(Plan::Present(field)))
    }

    fn exact(field: FieldKey, value: i64) -> Plan {
        Plan::Range { field, lower: Bound::Included(value), upper: Bound::Included(value) }
    }

    /// 构造时不做任何优化, 只处理空与单元素的情况
    fn any(mut plans: Vec<Plan>) -> Plan {
        match plans.len() {
            0 => Plan::Nothing,
            1 => plans.remove(0),
            _ => Plan::Or(plans),
        }
    }
}

/// 编译过程中做过的优化
#[derive(Debug, Clone, PartialEq)]
pub enum Optimization {
    /// 同一字段上 OR 连接的等值条件合并为一个词项集合
    OrToIn { field: FieldKey, value_count: usize },
    DuplicateRemoval { removed: usize },
    /// 嵌套的同类布尔节点被展平
    Flatten { merged: usize },
}

#[derive(Debug, Clone)]
pub struct CompiledPlan {
    pub plan: Plan,
    pub optimizations: Vec<Optimization>,
}

pub struct Planner<'a> {
    ctx: QueryContext<'a>,
    fields: &'a FieldRegistry,
    config: OptimizationConfig,
}

impl<'a> Planner<'a> {
    pub fn new(ctx: QueryContext<'a>, fields: &'a FieldRegistry) -> Self {
        Planner { ctx, fields, config: ctx.config.optimization }
    }

    pub fn with_config(mut self, config: OptimizationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn compile(&self, query: &ValidatedQuery) -> CompiledPlan {
        let mut optimizations = Vec::new();
        let plan = match &query.query().where_clause {
            None => Plan::All,
            Some(root) => {
                let mut next = 0;
                let raw = self.clause(root, query.clauses(), &mut next);
                self.optimize(raw, &mut optimizations)
            }
        };
        debug!(optimizations = optimizations.len(), "compiled query plan");
        CompiledPlan { plan, optimizations }
    }

    /// 叶子按深度优先顺序与校验结果一一对应
    fn clause(&self, clause: &Clause, resolved: &[ResolvedClause], next: &mut usize) -> Plan {
        match clause {
            Clause::And(children) => Plan::And(children.iter().map(|c| self.clause(c, resolved, next)).collect()),
            Clause::Or(children) => Plan::Or(children.iter().map(|c| self.clause(c, resolved, next)).collect()),
            Clause::Not(child) => Plan::Not(Box::new(self.clause(child, resolved, next))),
            Clause::Terminal(_) | Clause::Was(_) | Clause::Changed(_) => {
                let leaf = resolved.get(*next).map(|r| self.leaf(r)).unwrap_or(Plan::Nothing);
                *next += 1;
                leaf
            }
        }
    }

    /// 多个候选字段之间取并集
    fn leaf(&self, clause: &ResolvedClause) -> Plan {
        let plans = clause
            .candidates
            .iter()
            .map(|candidate| {
                if clause.operator.is_history() {
                    self.history(clause, candidate)
                } else {
                    self.terminal(clause.operator, candidate)
                }
            })
            .collect();
        Plan::any(plans)
    }

    fn terminal(&self, op: Operator, field: &ResolvedField) -> Plan {
        let key = field.descriptor.key;
        match op {
            Operator::Is => Plan::absent(key),
            Operator::IsNot => Plan::Present(key),
            Operator::Like => self.text(&field.descriptor, &field.values),
            Operator::NotLike => Plan::And(vec![
                Plan::Present(key),
                Plan::Not(Box::new(self.text(&field.descriptor, &field.values))),
            ]),
            Operator::Equals | Operator::In => self.matching(key, &field.values),
            Operator::NotEquals | Operator::NotIn => {
                let values: Vec<Value> = field.values.iter().filter(|v| **v != Value::Empty).cloned().collect();
                Plan::And(vec![Plan::Present(key), Plan::Not(Box::new(self.matching(key, &values)))])
            }
            op if op.is_relational() => {
                Plan::any(field.values.iter().map(|v| self.relational(op, &field.descriptor, v)).collect())
            }
            _ => Plan::Nothing,
        }
    }

    /// 等值匹配: 词项合并为一个集合, 数值与日期为区间, EMPTY 为字段缺失
    fn matching(&self, key: FieldKey, values: &[Value]) -> Plan {
        let mut terms = BTreeSet::new();
        let mut plans = Vec::new();
        for value in values {
            match value {
                Value::Term(term) => {
                    terms.insert(term.clone());
                }
                Value::Number(n) => plans.push(Plan::exact(key, *n)),
                Value::Span(start, end) => plans.push(Plan::Range {
                    field: key,
                    lower: Bound::Included(*start),
                    upper: Bound::Excluded(*end),
                }),
                Value::Empty => plans.push(Plan::absent(key)),
                Value::Text(_) | Value::Nothing => {}
            }
        }
        if !terms.is_empty() {
            plans.insert(0, Plan::Terms { field: key, terms });
        }
        Plan::any(plans)
    }

    fn text(&self, descriptor: &FieldDescriptor, values: &[Value]) -> Plan {
        let queries = values.iter().filter_map(|v| match v {
            Value::Text(query) => Some(query.clone()),
            _ => None,
        });
        let plans = queries
            .map(|query| match descriptor.key {
                FieldKey::System(SystemField::Text) => self.all_text(query),
                FieldKey::System(SystemField::Comment) => Plan::Comments(query),
                key => Plan::Text { field: key, query },
            })
            .collect();
        Plan::any(plans)
    }

    /// `text ~`: 摘要, 描述, 环境, 可见评论以及用户可见的文本自定义字段
    fn all_text(&self, query: TextQuery) -> Plan {
        let mut plans: Vec<Plan> = [SystemField::Summary, SystemField::Description, SystemField::Environment]
            .into_iter()
            .map(|field| Plan::Text { field: field.into(), query: query.clone() })
            .collect();
        plans.push(Plan::Comments(query.clone()));
        for field in self.fields.custom_fields() {
            if field.kind == ValueKind::Text && self.fields.is_visible(field, self.ctx.user, self.ctx.directory) {
                plans.push(Plan::Text { field: field.key, query: query.clone() });
            }
        }
        Plan::Or(plans)
    }

    fn relational(&self, op: Operator, descriptor: &FieldDescriptor, value: &Value) -> Plan {
        let key = descriptor.key;
        match (descriptor.kind, value) {
            (ValueKind::Version, Value::Term(id)) => self.version_range(op, key, id),
            (ValueKind::Priority, Value::Term(id)) => self.priority_range(op, key, id),
            (ValueKind::Resolution, Value::Term(id)) => self.resolution_range(op, key, id),
            (ValueKind::IssueKey, Value::Term(issue_key)) => self.key_range(op, key, issue_key),
            (_, Value::Number(n)) => {
                let (lower, upper) = match op {
                    Operator::LessThan => (Bound::Unbounded, Bound::Excluded(*n)),
                    Operator::LessThanEquals => (Bound::Unbounded, Bound::Included(*n)),
                    Operator::GreaterThan => (Bound::Excluded(*n), Bound::Unbounded),
                    _ => (Bound::Included(*n), Bound::Unbounded),
                };
                Plan::Range { field: key, lower, upper }
            }
            // 一整天: `<` 早于当天, `<=` 不晚于当天, `>` 晚于当天, `>=` 不早于当天
            (_, Value::Span(start, end)) => {
                let (lower, upper) = match op {
                    Operator::LessThan => (Bound::Unbounded, Bound::Excluded(*start)),
                    Operator::LessThanEquals => (Bound::Unbounded, Bound::Excluded(*end)),
                    Operator::GreaterThan => (Bound::Included(*end), Bound::Unbounded),
                    _ => (Bound::Included(*start), Bound::Unbounded),
                };
                Plan::Range { field: key, lower, upper }
            }
            _ => Plan::Nothing,
        }
    }

    /// 按序号比较, 结果展开为词项集合
    fn sequence_terms<I>(op: Operator, key: FieldKey, pivot: i64, items: I) -> Plan
    where
        I: Iterator<Item = (Id, i64)>,
    {
        let terms: BTreeSet<String> = items
            .filter(|(_, sequence)| match op {
                Operator::LessThan => *sequence < pivot,
                Operator::LessThanEquals => *sequence <= pivot,
                Operator::GreaterThan => *sequence > pivot,
                _ => *sequence >= pivot,
            })
            .map(|(id, _)| id.to_string())
            .collect();
        if terms.is_empty() {
            Plan::Nothing
        } else {
            Plan::Terms { field: key, terms }
        }
    }

    /// 只与同一项目中的版本比较
    fn version_range(&self, op: Operator, key: FieldKey, id: &str) -> Plan {
        let Some(pivot) = id.parse().ok().and_then(|id| self.ctx.directory.version(id)) else {
            return Plan::Nothing;
        };
        let versions = self
            .ctx
            .directory
            .versions()
            .iter()
            .filter(|v| v.project == pivot.project)
            .map(|v| (v.id, v.sequence));
        Self::sequence_terms(op, key, pivot.sequence, versions)
    }

    /// 序号越小优先级越高, 所以 `>` 对应更小的序号
    fn priority_range(&self, op: Operator, key: FieldKey, id: &str) -> Plan {
        let Some(pivot) = id.parse().ok().and_then(|id| self.ctx.directory.priority(id)) else {
            return Plan::Nothing;
        };
        let flipped = match op {
            Operator::LessThan => Operator::GreaterThan,
            Operator::LessThanEquals => Operator::GreaterThanEquals,
            Operator::GreaterThan => Operator::LessThan,
            _ => Operator::LessThanEquals,
        };
        let priorities = self.ctx.directory.priorities().iter().map(|p| (p.id, p.sequence));
        Self::sequence_terms(flipped, key, pivot.sequence, priorities)
    }

    fn resolution_range(&self, op: Operator, key: FieldKey, id: &str) -> Plan {
        let resolutions = self.ctx.directory.resolutions();
        let Some(pivot) = resolutions.iter().find(|r| r.id.to_string() == id) else {
            return Plan::Nothing;
        };
        Self::sequence_terms(op, key, pivot.sequence, resolutions.iter().map(|r| (r.id, r.sequence)))
    }

    /// key 比较限定在同一项目内
    fn key_range(&self, op: Operator, key: FieldKey, issue_key: &str) -> Plan {
        let Some((project_key, number)) = split_key(issue_key) else { return Plan::Nothing };
        let Some(project) = self.ctx.directory.project_by_key(project_key) else { return Plan::Nothing };
        let pivot = issue_key_code(project.id, number);
        let first = issue_key_code(project.id, 0);
        let last = issue_key_code(project.id, u32::MAX as u64);
        let (lower, upper) = match op {
            Operator::LessThan => (Bound::Included(first), Bound::Excluded(pivot)),
            Operator::LessThanEquals => (Bound::Included(first), Bound::Included(pivot)),
            Operator::GreaterThan => (Bound::Excluded(pivot), Bound::Included(last)),
            _ => (Bound::Included(pivot), Bound::Included(last)),
        };
        Plan::Range { field: key, lower, upper }
    }

    fn history(&self, clause: &ResolvedClause, field: &ResolvedField) -> Plan {
        let Some(system) = field.descriptor.system() else { return Plan::Nothing };
        let mut from = None;
        let mut to = None;
        let mut plan = HistoryPlan {
            field: system,
            mode: HistoryMode::Was(ValueSet::from_values(&field.values)),
            by: None,
            start: i64::MIN,
            end: i64::MAX,
        };
        for predicate in &clause.predicates {
            let bounds: Vec<(i64, i64)> = predicate.values.iter().filter_map(instant_bounds).collect();
            match predicate.kind {
                PredicateKind::After => {
                    if let Some((start, _)) = bounds.first() {
                        plan.start = plan.start.max(*start);
                    }
                }
                PredicateKind::Before => {
                    if let Some((start, _)) = bounds.first() {
                        plan.end = plan.end.min(*start);
                    }
                }
                PredicateKind::On => {
                    if let Some((start, end)) = bounds.first() {
                        let (start, end) = day_of(*start, *end);
                        plan.start = plan.start.max(start);
                        plan.end = plan.end.min(end);
                    }
                }
                PredicateKind::During => {
                    if let (Some((start, _)), Some((_, end))) = (bounds.first(), bounds.get(1)) {
                        plan.start = plan.start.max(*start);
                        plan.end = plan.end.min(end.saturating_add(1));
                    }
                }
                PredicateKind::By => {
                    plan.by = Some(ValueSet::from_values(&predicate.values).terms);
                }
                PredicateKind::From => from = Some(ValueSet::from_values(&predicate.values)),
                PredicateKind::To => to = Some(ValueSet::from_values(&predicate.values)),
            }
        }
        match clause.operator {
            Operator::Changed => {
                plan.mode = HistoryMode::Changed { from, to };
                Plan::History(plan)
            }
            Operator::WasNot | Operator::WasNotIn => Plan::Not(Box::new(Plan::History(plan))),
            _ => Plan::History(plan),
        }
    }

    fn optimize(&self, plan: Plan, optimizations: &mut Vec<Optimization>) -> Plan {
        match plan {
            Plan::And(children) => {
                let children = children.into_iter().map(|c| self.optimize(c, optimizations)).collect();
                let mut children = self.flatten(children, true, optimizations);
                if children.contains(&Plan::Nothing) {
                    return Plan::Nothing;
                }
                children.retain(|c| *c != Plan::All);
                let children = self.dedup(children, optimizations);
                match children.len() {
                    0 => Plan::All,
                    1 => children.into_iter().next().unwrap_or(Plan::All),
                    _ => Plan::And(children),
                }
            }
            Plan::Or(children) => {
                let children = children.into_iter().map(|c| self.optimize(c, optimizations)).collect();
                let mut children = self.flatten(children, false, optimizations);
                if children.contains(&Plan::All) {
                    return Plan::All;
                }
                children.retain(|c| *c != Plan::Nothing);
                if self.config.merge_or_terms {
                    children = self.merge_terms(children, optimizations);
                }
                let children = self.dedup(children, optimizations);
                match children.len() {
                    0 => Plan::Nothing,
                    1 => children.into_iter().next().unwrap_or(Plan::Nothing),
                    _ => Plan::Or(children),
                }
            }
            Plan::Not(child) => match self.optimize(*child, optimizations) {
                Plan::Not(inner) => *inner,
                Plan::All => Plan::Nothing,
                Plan::Nothing => Plan::All,
                other => Plan::Not(Box::new(other)),
            },
            other => other,
        }
    }

    fn flatten(&self, children: Vec<Plan>, and: bool, optimizations: &mut Vec<Optimization>) -> Vec<Plan> {
        let mut merged = 0;
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Plan::And(inner) if and => {
                    merged += 1;
                    flat.extend(inner);
                }
                Plan::Or(inner) if !and => {
                    merged += 1;
                    flat.extend(inner);
                }
                other => flat.push(other),
            }
        }
        if merged > 0 {
            optimizations.push(Optimization::Flatten { merged });
        }
        flat
    }

    /// 同一字段上的多个词项集合合并为一个
    fn merge_terms(&self, children: Vec<Plan>, optimizations: &mut Vec<Optimization>) -> Vec<Plan> {
        let mut result: Vec<Plan> = Vec::with_capacity(children.len());
        let mut merged_fields: Vec<FieldKey> = Vec::new();
        for child in children {
            if let Plan::Terms { field, terms } = &child {
                let existing = result.iter_mut().find_map(|p| match p {
                    Plan::Terms { field: f, terms: t } if f == field => Some(t),
                    _ => None,
                });
                if let Some(existing) = existing {
                    existing.extend(terms.iter().cloned());
                    if !merged_fields.contains(field) {
                        merged_fields.push(*field);
                    }
                    continue;
                }
            }
            result.push(child);
        }
        for field in merged_fields {
            let value_count = result
                .iter()
                .find_map(|p| match p {
                    Plan::Terms { field: f, terms } if *f == field => Some(terms.len()),
                    _ => None,
                })
                .unwrap_or(0);
            optimizations.push(Optimization::OrToIn { field, value_count });
        }
        result
    }

    fn dedup(&self, children: Vec<Plan>, optimizations: &mut Vec<Optimization>) -> Vec<Plan> {
        if !self.config.remove_duplicates {
            return children;
        }
        let before = children.len();
        let mut unique: Vec<Plan> = Vec::with_capacity(before);
        for child in children {
            if !unique.contains(&child) {
                unique.push(child);
            }
        }
        if unique.len() < before {
            optimizations.push(Optimization::DuplicateRemoval { removed: before - unique.len() });
        }
        unique
    }
}

/// 时间点或一整天的 `[start, end)`
fn instant_bounds(value: &Value) -> Option<(i64, i64)> {
    match value {
        Value::Number(n) => Some((*n, *n)),
        Value::Span(start, end) => Some((*start, end - 1)),
        _ => None,
    }
}

/// ON 总是覆盖一整天
fn day_of(start: i64, end: i64) -> (i64, i64) {
    if end > start {
        (start, end + 1)
    } else {
        let day = start - start.rem_euclid(DAY_MILLIS);
        (day, day + DAY_MILLIS)
    }
}
