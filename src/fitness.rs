//! 简单表单判定: 查询能否在基础搜索表单中原样展示
//!
//! 基础表单只能表达"每个字段至多一个条件, 条件之间为 AND". 同名的多个
//! 自定义字段只有在取值种类与选项完全相同时才能合并为一个表单项.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::ast::{Clause, Operand, Query, TerminalClause};
use crate::context::SearchContext;
use crate::error::MessageSet;
use crate::field::{FieldDescriptor, FieldKey};
use crate::functions::QueryContext;
use crate::literal::{self, Value};
use crate::operand::QueryLiteral;
use crate::registry::FieldRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fitness {
    Fits,
    TooComplex(String),
}

impl Fitness {
    pub fn fits(&self) -> bool {
        matches!(self, Fitness::Fits)
    }
}

pub fn check(ctx: QueryContext<'_>, fields: &FieldRegistry, query: &Query) -> Fitness {
    let fitness = evaluate(ctx, fields, query);
    debug!(?fitness, "simple form fitness");
    fitness
}

fn evaluate(ctx: QueryContext<'_>, fields: &FieldRegistry, query: &Query) -> Fitness {
    let top_level: Vec<&Clause> = match &query.where_clause {
        None => return Fitness::Fits,
        Some(Clause::And(children)) => children.iter().collect(),
        Some(other) => vec![other],
    };
    let context = SearchContext::from_query(query.where_clause.as_ref(), ctx.directory, ctx.user);
    let mut seen: HashSet<FieldKey> = HashSet::new();
    for clause in top_level {
        let terminal = match clause {
            Clause::Terminal(terminal) => terminal,
            Clause::Or(_) => return Fitness::TooComplex("OR clauses cannot be shown in the simple form".into()),
            Clause::Not(_) => return Fitness::TooComplex("NOT clauses cannot be shown in the simple form".into()),
            Clause::And(_) => return Fitness::TooComplex("nested clauses cannot be shown in the simple form".into()),
            Clause::Was(_) | Clause::Changed(_) => {
                return Fitness::TooComplex("history clauses cannot be shown in the simple form".into())
            }
        };
        let candidates = fields.resolve(&terminal.field, ctx.user, ctx.directory, &context);
        if candidates.is_empty() {
            return Fitness::TooComplex(format!("field '{}' cannot be resolved", terminal.field));
        }
        if !candidates.iter().all(|c| seen.insert(c.key)) {
            return Fitness::TooComplex(format!("field '{}' is used more than once", terminal.field));
        }
        if !mergeable(ctx, &candidates) {
            return Fitness::TooComplex(format!("field '{}' refers to several different fields", terminal.field));
        }
        if let Some(reason) = ambiguous_value(ctx, &candidates, terminal) {
            return Fitness::TooComplex(reason);
        }
    }
    Fitness::Fits
}

/// 同名字段的取值种类与选项集合都相同
fn mergeable(ctx: QueryContext<'_>, candidates: &[&FieldDescriptor]) -> bool {
    let Some(first) = candidates.first() else { return true };
    let options = |field: &FieldDescriptor| -> BTreeSet<String> {
        field
            .custom_id()
            .and_then(|id| ctx.directory.custom_field(id))
            .map(|def| def.options.iter().map(|o| o.value.to_lowercase()).collect())
            .unwrap_or_default()
    };
    let first_options = options(first);
    candidates.iter().skip(1).all(|c| c.kind == first.kind && options(c) == first_options)
}

/// 具名取值在表单中必须对应唯一的选项
fn ambiguous_value(
    ctx: QueryContext<'_>,
    candidates: &[&FieldDescriptor],
    terminal: &TerminalClause,
) -> Option<String> {
    let literals: Vec<QueryLiteral> = match &terminal.operand {
        Operand::Single(literal) => vec![literal.into()],
        Operand::Multi(items) => items
            .iter()
            .filter_map(|item| match item {
                Operand::Single(literal) => Some(literal.into()),
                _ => None,
            })
            .collect(),
        Operand::Function(_) | Operand::Empty => Vec::new(),
    };
    for candidate in candidates.iter().filter(|c| c.kind.is_named_constant()) {
        for item in &literals {
            let mut scratch = MessageSet::new();
            let values = literal::resolve(&ctx, candidate, &terminal.field, item, &mut scratch);
            if values.iter().filter(|v| matches!(v, Value::Term(_))).count() > 1 {
                return Some(format!("value {} matches more than one '{}'", item, terminal.field));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::functions::testing::{config, context, directory, index};
    use crate::model::{CustomFieldDefinition, CustomFieldOption, CustomFieldType, FieldContext, Version};
    use crate::parser::parse;

    fn fixture() -> InMemoryDirectory {
        let mut dir = directory();
        for (id, project) in [(30, 1), (31, 2)] {
            dir.versions.push(Version {
                id,
                project,
                name: "10000".into(),
                sequence: 9,
                released: false,
                archived: false,
                release_date: None,
            });
        }
        let option = |id, value: &str| CustomFieldOption { id, value: value.into(), parent: None };
        let scoped = |project| FieldContext::Scoped { projects: vec![project], issue_types: vec![] };
        dir.custom_fields = vec![
            CustomFieldDefinition {
                id: 100,
                name: "Size".into(),
                field_type: CustomFieldType::Select,
                context: scoped(1),
                options: vec![option(1, "S"), option(2, "L")],
                searchable: true,
            },
            CustomFieldDefinition {
                id: 101,
                name: "Size".into(),
                field_type: CustomFieldType::Select,
                context: scoped(2),
                options: vec![option(3, "s"), option(4, "l")],
                searchable: true,
            },
            CustomFieldDefinition {
                id: 102,
                name: "Risk".into(),
                field_type: CustomFieldType::Select,
                context: scoped(1),
                options: vec![option(5, "High")],
                searchable: true,
            },
            CustomFieldDefinition {
                id: 103,
                name: "Risk".into(),
                field_type: CustomFieldType::Number,
                context: scoped(2),
                options: vec![],
                searchable: true,
            },
        ];
        dir
    }

    fn fitness(jql: &str) -> Fitness {
        let dir = fixture();
        let index = index(&dir);
        let config = config();
        let fields = FieldRegistry::from_directory(config.features, &dir);
        check(context(Some("admin"), &dir, &index, &config), &fields, &parse(jql).unwrap())
    }

    #[test]
    fn test_simple_conjunctions_fit() {
        assert!(fitness("").fits());
        assert!(fitness("ORDER BY created").fits());
        assert!(fitness("project = HSP AND assignee = admin").fits());
        assert!(fitness("fixVersion in ('1.0', '2.0')").fits());
    }

    #[test]
    fn test_structure_too_complex() {
        assert!(!fitness("assignee = admin OR reporter = admin").fits());
        assert!(!fitness("NOT assignee = admin").fits());
        assert!(!fitness("status WAS Open").fits());
        assert!(!fitness("assignee = admin AND assignee = fred").fits());
    }

    #[test]
    fn test_collisions() {
        assert!(fitness("\"Size\" = S").fits());
        assert!(matches!(fitness("Risk = 5"), Fitness::TooComplex(_)));
    }

    #[test]
    fn test_ambiguous_version_name() {
        let reason = fitness("fixVersion = 10000");
        assert_eq!(reason, Fitness::TooComplex("value 10000 matches more than one 'fixVersion'".into()));
    }
}
