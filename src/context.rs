//! 搜索上下文: 由顶层 `project` 与 `issuetype` 条件推导出的项目/问题类型范围

use std::collections::BTreeSet;

use crate::ast::{Clause, Literal, Operand, Operator};
use crate::directory::Directory;
use crate::model::{FieldContext, Id};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchContext {
    /// None 表示不限项目
    projects: Option<BTreeSet<Id>>,
    issue_types: Option<BTreeSet<Id>>,
}

impl SearchContext {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn for_projects(projects: impl IntoIterator<Item = Id>) -> Self {
        SearchContext { projects: Some(projects.into_iter().collect()), issue_types: None }
    }

    pub fn is_global(&self) -> bool {
        self.projects.is_none() && self.issue_types.is_none()
    }

    pub fn projects(&self) -> Option<&BTreeSet<Id>> {
        self.projects.as_ref()
    }

    pub fn issue_types(&self) -> Option<&BTreeSet<Id>> {
        self.issue_types.as_ref()
    }

    /// 字段配置是否适用于当前上下文
    pub fn applies_to(&self, context: &FieldContext) -> bool {
        match context {
            FieldContext::Global => true,
            FieldContext::Scoped { projects, issue_types } => {
                overlaps(&self.projects, projects) && overlaps(&self.issue_types, issue_types)
            }
        }
    }

    /// 只看根节点, 或根节点为 AND 时的直接子节点
    pub fn from_query(clause: Option<&Clause>, directory: &dyn Directory, user: Option<&str>) -> Self {
        let mut context = SearchContext::global();
        let top_level: Vec<&Clause> = match clause {
            Some(Clause::And(children)) => children.iter().collect(),
            Some(other) => vec![other],
            None => Vec::new(),
        };

        for clause in top_level {
            let Clause::Terminal(terminal) = clause else { continue };
            if !matches!(terminal.operator, Operator::Equals | Operator::In) {
                continue;
            }
            let Some(values) = literal_values(&terminal.operand) else { continue };
            match terminal.field.to_lowercase().as_str() {
                "project" => {
                    let ids = values.iter().filter_map(|v| project_id(directory, user, v)).collect();
                    intersect(&mut context.projects, ids);
                }
                "issuetype" | "type" => {
                    let ids = values.iter().filter_map(|v| issue_type_id(directory, v)).collect();
                    intersect(&mut context.issue_types, ids);
                }
                _ => {}
            }
        }
        context
    }
}

/// 上下文为 None 或字段配置为空时视为重叠
fn overlaps(context: &Option<BTreeSet<Id>>, configured: &[Id]) -> bool {
    match context {
        None => true,
        Some(_) if configured.is_empty() => true,
        Some(ids) => configured.iter().any(|id| ids.contains(id)),
    }
}

fn intersect(target: &mut Option<BTreeSet<Id>>, ids: BTreeSet<Id>) {
    if ids.is_empty() {
        return;
    }
    *target = Some(match target.take() {
        Some(existing) => existing.intersection(&ids).copied().collect(),
        None => ids,
    });
}

fn literal_values(operand: &Operand) -> Option<Vec<&Literal>> {
    match operand {
        Operand::Single(literal) => Some(vec![literal]),
        Operand::Multi(items) => items
            .iter()
            .map(|item| match item {
                Operand::Single(literal) => Some(literal),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

fn project_id(directory: &dyn Directory, user: Option<&str>, literal: &Literal) -> Option<Id> {
    let text = literal.as_text();
    let project = directory
        .project_by_key(&text)
        .or_else(|| directory.projects().iter().find(|p| p.name.eq_ignore_ascii_case(&text)))
        .or_else(|| text.parse().ok().and_then(|id| directory.project(id)))?;
    directory.can_browse(user, project).then_some(project.id)
}

fn issue_type_id(directory: &dyn Directory, literal: &Literal) -> Option<Id> {
    let text = literal.as_text();
    directory
        .issue_types()
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(&text) || t.id.to_string() == text)
        .map(|t| t.id)
}
