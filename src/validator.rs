//! 语义校验
//!
//! 按源码顺序检查每个叶子子句: 字段是否存在, 运算符是否支持, 操作数的形状,
//! 函数调用, 最后把每个取值解析为索引中的规范形式. 解析结果保存在
//! [`ValidatedQuery`] 中, 查询计划与简单表单都直接使用它.

use tracing::{debug, info};

use crate::ast::{
    Clause, ChangedClause, FunctionCall, Operand, Operator, OrderBy, PredicateKind, Query, SortOrder,
    TerminalClause, WasClause,
};
use crate::context::SearchContext;
use crate::error::{JqlError, MessageKind, MessageSet, Result};
use crate::field::{FieldDescriptor, ValueKind};
use crate::functions::{FunctionRegistry, QueryContext};
use crate::literal::{self, Value};
use crate::operand;
use crate::registry::FieldRegistry;

/// 查询的来源. 从存储中加载的查询不会因为"不存在"一类的错误而加载失败
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryOrigin {
    #[default]
    Fresh,
    Stored,
}

/// 一个候选字段以及操作数在该字段上解析出的取值
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub descriptor: FieldDescriptor,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPredicate {
    pub kind: PredicateKind,
    pub values: Vec<Value>,
}

/// 叶子子句的解析结果. 校验失败的子句没有候选字段
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedClause {
    pub field: String,
    pub operator: Operator,
    /// CHANGED 子句没有操作数
    pub operand: Option<Operand>,
    pub candidates: Vec<ResolvedField>,
    pub predicates: Vec<ResolvedPredicate>,
}

impl ResolvedClause {
    fn new(field: &str, operator: Operator, operand: Option<&Operand>) -> Self {
        ResolvedClause {
            field: field.to_string(),
            operator,
            operand: operand.cloned(),
            candidates: Vec::new(),
            predicates: Vec::new(),
        }
    }

    /// 执行时展开的项数: 候选字段数 × 取值数 (至少为 1)
    pub fn fan_out(&self) -> usize {
        self.candidates.iter().map(|c| c.values.len().max(1)).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSort {
    pub field: String,
    pub descriptor: FieldDescriptor,
    pub order: Option<SortOrder>,
}

/// 通过校验的查询, 可能带有警告
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    query: Query,
    clauses: Vec<ResolvedClause>,
    sorts: Vec<ResolvedSort>,
    warnings: MessageSet,
}

impl ValidatedQuery {
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// 按源码顺序排列的叶子子句 (Terminal, WAS, CHANGED)
    pub fn clauses(&self) -> &[ResolvedClause] {
        &self.clauses
    }

    pub fn sorts(&self) -> &[ResolvedSort] {
        &self.sorts
    }

    pub fn warnings(&self) -> &MessageSet {
        &self.warnings
    }
}

/// 按深度优先顺序收集叶子子句, 与查询计划遍历的顺序一致
pub fn leaves(clause: &Clause) -> Vec<&Clause> {
    let mut out = Vec::new();
    clause.visit(&mut |c| {
        if matches!(c, Clause::Terminal(_) | Clause::Was(_) | Clause::Changed(_)) {
            out.push(c);
        }
    });
    out
}

fn calls(operand: &Operand) -> Vec<&FunctionCall> {
    match operand {
        Operand::Function(call) => vec![call],
        Operand::Multi(items) => items.iter().flat_map(calls).collect(),
        Operand::Single(_) | Operand::Empty => Vec::new(),
    }
}

pub struct Validator<'a> {
    ctx: QueryContext<'a>,
    fields: &'a FieldRegistry,
    functions: &'a FunctionRegistry,
    search_context: SearchContext,
    messages: MessageSet,
}

impl<'a> Validator<'a> {
    pub fn new(ctx: QueryContext<'a>, fields: &'a FieldRegistry, functions: &'a FunctionRegistry) -> Self {
        Validator {
            ctx,
            fields,
            functions,
            search_context: SearchContext::global(),
            messages: MessageSet::new(),
        }
    }

    /// 校验整个查询. 有任何错误时返回 `JqlError::Rejected`
    pub fn validate(mut self, query: Query, origin: QueryOrigin) -> Result<ValidatedQuery> {
        let max_errors = self.ctx.config.max_validation_errors;
        self.search_context =
            SearchContext::from_query(query.where_clause.as_ref(), self.ctx.directory, self.ctx.user);

        let mut clauses = Vec::new();
        if let Some(root) = &query.where_clause {
            for leaf in leaves(root) {
                if self.messages.error_count() >= max_errors {
                    debug!(max_errors, "validation error cap reached");
                    break;
                }
                let resolved = match leaf {
                    Clause::Terminal(t) => self.terminal(t),
                    Clause::Was(w) => self.was(w),
                    Clause::Changed(c) => self.changed(c),
                    _ => continue,
                };
                clauses.push(resolved);
            }
        }
        let sorts = match &query.order_by {
            Some(order_by) => self.sorts(order_by, max_errors),
            None => Vec::new(),
        };

        let mut messages = self.messages;
        messages.truncate_errors(max_errors);
        if origin == QueryOrigin::Stored {
            messages = messages.downgraded_for_stored_query();
        }
        if messages.has_errors() {
            info!(errors = messages.error_count(), "query rejected by validation");
            return Err(JqlError::Rejected(messages));
        }
        debug!(clauses = clauses.len(), warnings = messages.warnings().len(), "query validated");
        Ok(ValidatedQuery { query, clauses, sorts, warnings: messages })
    }

    fn candidates(&mut self, name: &str) -> Option<Vec<&'a FieldDescriptor>> {
        let fields = self.fields;
        let candidates = fields.resolve(name, self.ctx.user, self.ctx.directory, &self.search_context);
        if candidates.is_empty() {
            self.messages.add_error(
                MessageKind::FieldNotFound,
                format!("Field '{}' does not exist or you do not have permission to view it.", name),
            );
            return None;
        }
        Some(candidates)
    }

    fn terminal(&mut self, clause: &TerminalClause) -> ResolvedClause {
        let mut resolved = ResolvedClause::new(&clause.field, clause.operator, Some(&clause.operand));
        let Some(candidates) = self.candidates(&clause.field) else { return resolved };
        let supporting: Vec<&FieldDescriptor> =
            candidates.into_iter().filter(|f| f.supports(clause.operator)).collect();
        if supporting.is_empty() {
            self.messages.add_error(
                MessageKind::OperatorNotSupported,
                format!("The operator '{}' is not supported by the '{}' field.", clause.operator, clause.field),
            );
            return resolved;
        }
        if self.check_operand(&clause.field, clause.operator, &clause.operand, &supporting)
            && self.check_functions(&clause.field, &clause.operand, &supporting)
        {
            resolved.candidates = self.resolve_values(&clause.field, &clause.operand, &supporting);
        }
        resolved
    }

    fn history_candidates(&mut self, name: &str) -> Option<Vec<&'a FieldDescriptor>> {
        let candidates = self.candidates(name)?;
        let supporting: Vec<&FieldDescriptor> = candidates.into_iter().filter(|f| f.supports_history).collect();
        if supporting.is_empty() {
            self.messages.add_error(
                MessageKind::HistoryNotSupported,
                format!("History searches are not supported for the '{}' field.", name),
            );
            return None;
        }
        Some(supporting)
    }

    fn was(&mut self, clause: &WasClause) -> ResolvedClause {
        let mut resolved = ResolvedClause::new(&clause.field, clause.operator, Some(&clause.operand));
        let Some(supporting) = self.history_candidates(&clause.field) else { return resolved };
        if self.check_operand(&clause.field, clause.operator, &clause.operand, &supporting)
            && self.check_functions(&clause.field, &clause.operand, &supporting)
        {
            resolved.candidates = self.resolve_values(&clause.field, &clause.operand, &supporting);
            resolved.predicates = self.predicates(&clause.field, &clause.predicates, supporting[0]);
        }
        resolved
    }

    fn changed(&mut self, clause: &ChangedClause) -> ResolvedClause {
        let mut resolved = ResolvedClause::new(&clause.field, Operator::Changed, None);
        let Some(supporting) = self.history_candidates(&clause.field) else { return resolved };
        resolved.candidates = supporting
            .iter()
            .map(|d| ResolvedField { descriptor: (*d).clone(), values: Vec::new() })
            .collect();
        resolved.predicates = self.predicates(&clause.field, &clause.predicates, supporting[0]);
        resolved
    }

    /// 操作数的形状是否与运算符匹配
    fn check_operand(&mut self, name: &str, op: Operator, operand: &Operand, fields: &[&FieldDescriptor]) -> bool {
        let before = self.messages.error_count();
        let has_empty = match operand {
            Operand::Empty => true,
            Operand::Multi(items) => items.iter().any(|i| *i == Operand::Empty),
            _ => false,
        };
        match operand {
            Operand::Empty if op.is_relational() || matches!(op, Operator::Like | Operator::NotLike) => {
                self.messages.add_error(
                    MessageKind::OperandNotSupported,
                    format!("The operator '{}' does not support the value 'EMPTY' for field '{}'.", op, name),
                );
            }
            Operand::Empty => {}
            _ if op.is_empty_only() => {
                self.messages.add_error(
                    MessageKind::OperandNotSupported,
                    format!("The operator '{}' only supports the EMPTY value.", op),
                );
            }
            Operand::Single(literal) if op.is_list() => {
                self.messages.add_error(
                    MessageKind::OperandNotSupported,
                    format!(
                        "The operator '{}' does not support the value '{}' for field '{}'; expected a list of values.",
                        op,
                        literal.as_text(),
                        name
                    ),
                );
            }
            Operand::Multi(_) if !op.is_list() => self.list_not_supported(name, op, operand),
            Operand::Function(_) if !op.is_list() && operand::is_list_operand(operand, self.functions) => {
                self.list_not_supported(name, op, operand)
            }
            _ => {}
        }
        if has_empty && self.messages.error_count() == before && !fields.iter().any(|f| f.supports_empty) {
            self.messages.add_error(
                MessageKind::EmptyNotSupported,
                format!("The field '{}' does not support searching for EMPTY values.", name),
            );
        }
        self.messages.error_count() == before
    }

    fn list_not_supported(&mut self, name: &str, op: Operator, operand: &Operand) {
        self.messages.add_error(
            MessageKind::OperandNotSupported,
            format!("The operator '{}' does not support the list value '{}' for field '{}'.", op, operand, name),
        );
    }

    /// 函数是否存在, 参数是否正确, 产生的取值类型能否用于该字段
    fn check_functions(&mut self, name: &str, operand: &Operand, fields: &[&FieldDescriptor]) -> bool {
        let Some(first) = fields.first() else { return false };
        let messages = operand::validate_functions(&self.ctx, self.functions, operand, first);
        if messages.has_errors() {
            self.messages.add_all(messages);
            return false;
        }
        self.messages.add_all(messages);
        let mut ok = true;
        for call in calls(operand) {
            let Some(function) = self.functions.get(&call.name) else { continue };
            if !fields.iter().any(|f| function.data_type().is_compatible(f.kind)) {
                self.messages.add_error(
                    MessageKind::FunctionArgument,
                    format!("Function '{}' is not supported for the field '{}'.", function.name(), name),
                );
                ok = false;
            }
        }
        ok
    }

    fn resolve_on(&self, name: &str, operand: &Operand, field: &FieldDescriptor, messages: &mut MessageSet) -> Vec<Value> {
        operand::literals(&self.ctx, self.functions, operand, field)
            .iter()
            .flat_map(|l| literal::resolve(&self.ctx, field, name, l, messages))
            .collect()
    }

    /// 在每个候选字段上解析取值. 只要有一个候选字段能解析就不报错
    fn resolve_values(&mut self, name: &str, operand: &Operand, fields: &[&FieldDescriptor]) -> Vec<ResolvedField> {
        let mut accepted = Vec::new();
        let mut warnings = MessageSet::new();
        let mut first_failure = None;
        for field in fields {
            let mut messages = MessageSet::new();
            let values = self.resolve_on(name, operand, field, &mut messages);
            if messages.has_errors() {
                first_failure.get_or_insert(messages);
            } else {
                warnings.add_all(messages);
                accepted.push(ResolvedField { descriptor: (*field).clone(), values });
            }
        }
        match first_failure {
            Some(failure) if accepted.is_empty() => self.messages.add_all(failure),
            _ => self.messages.add_all(warnings),
        }
        accepted
    }

    /// BY 按用户解析, FROM/TO 按字段取值解析, 其余按日期时间解析
    fn predicates(
        &mut self,
        name: &str,
        predicates: &[crate::ast::HistoryPredicate],
        field: &FieldDescriptor,
    ) -> Vec<ResolvedPredicate> {
        let mut resolved = Vec::new();
        for predicate in predicates {
            let kind = match predicate.kind {
                PredicateKind::By => ValueKind::User,
                PredicateKind::From | PredicateKind::To => field.kind,
                _ => ValueKind::DateTime,
            };
            let descriptor = FieldDescriptor { kind, ..field.clone() };
            if !self.check_functions(name, &predicate.operand, &[&descriptor]) {
                continue;
            }
            let mut messages = MessageSet::new();
            let values = self.resolve_on(name, &predicate.operand, &descriptor, &mut messages);
            self.messages.add_all(messages);
            resolved.push(ResolvedPredicate { kind: predicate.kind, values });
        }
        resolved
    }

    fn sorts(&mut self, order_by: &OrderBy, max_errors: usize) -> Vec<ResolvedSort> {
        let mut sorts = Vec::new();
        for sort in &order_by.sorts {
            if self.messages.error_count() >= max_errors {
                break;
            }
            let Some(candidates) = self.candidates(&sort.field) else { continue };
            match candidates.into_iter().find(|f| f.sortable) {
                Some(descriptor) => sorts.push(ResolvedSort {
                    field: sort.field.clone(),
                    descriptor: descriptor.clone(),
                    order: sort.order,
                }),
                None => self.messages.add_error(
                    MessageKind::FieldNotSortable,
                    format!("Field '{}' does not support sorting.", sort.field),
                ),
            }
        }
        sorts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::directory::InMemoryDirectory;
    use crate::functions::testing::{context, directory, index};
    use crate::index::IssueIndex;
    use crate::model::Status;
    use crate::parser::parse;

    struct Fixture {
        dir: InMemoryDirectory,
        index: IssueIndex,
        config: EngineConfig,
        fields: FieldRegistry,
        functions: FunctionRegistry,
    }

    impl Fixture {
        fn new(config: EngineConfig) -> Self {
            let mut dir = directory();
            dir.statuses = vec![Status { id: 1, name: "Open".into() }];
            let index = index(&dir);
            let fields = FieldRegistry::from_directory(config.features, &dir);
            Fixture { dir, index, config, fields, functions: FunctionRegistry::with_builtins() }
        }

        fn validate(&self, jql: &str, origin: QueryOrigin) -> Result<ValidatedQuery> {
            let ctx = context(Some("admin"), &self.dir, &self.index, &self.config);
            Validator::new(ctx, &self.fields, &self.functions).validate(parse(jql)?, origin)
        }

        fn errors(&self, jql: &str) -> Vec<String> {
            match self.validate(jql, QueryOrigin::Fresh) {
                Err(JqlError::Rejected(messages)) => messages.error_texts().iter().map(|s| s.to_string()).collect(),
                other => panic!("expected rejection for {}: {:?}", jql, other.map(|v| v.clauses().len())),
            }
        }
    }

    #[test]
    fn test_unknown_field_and_operator() {
        let fixture = Fixture::new(EngineConfig::default());
        assert_eq!(
            fixture.errors("nosuchfield = x"),
            vec!["Field 'nosuchfield' does not exist or you do not have permission to view it."]
        );
        assert_eq!(
            fixture.errors("summary = x"),
            vec!["The operator '=' is not supported by the 'summary' field."]
        );
    }

    #[test]
    fn test_operand_shapes() {
        let fixture = Fixture::new(EngineConfig::default());
        assert_eq!(
            fixture.errors("status in Open"),
            vec!["The operator 'in' does not support the value 'Open' for field 'status'; expected a list of values."]
        );
        assert_eq!(
            fixture.errors("status = (Open, Closed)"),
            vec!["The operator '=' does not support the list value '(Open, Closed)' for field 'status'."]
        );
        assert_eq!(fixture.errors("assignee is fred"), vec!["The operator 'is' only supports the EMPTY value."]);
        assert_eq!(
            fixture.errors("status is EMPTY"),
            vec!["The operator 'is' is not supported by the 'status' field."]
        );
        assert_eq!(
            fixture.errors("assignee = membersOf(developers)"),
            vec!["The operator '=' does not support the list value 'membersOf(developers)' for field 'assignee'."]
        );
    }

    #[test]
    fn test_function_checks() {
        let fixture = Fixture::new(EngineConfig::default());
        assert_eq!(fixture.errors("assignee = nope()"), vec!["Unable to find JQL function 'nope()'."]);
        assert_eq!(
            fixture.errors("assignee in membersOf()"),
            vec!["Function 'membersOf' expected '1' arguments but received '0'."]
        );
        assert_eq!(
            fixture.errors("project = currentUser()"),
            vec!["Function 'currentUser' is not supported for the field 'project'."]
        );
        assert!(fixture.validate("assignee = currentUser()", QueryOrigin::Fresh).is_ok());
    }

    #[test]
    fn test_values_are_resolved() {
        let fixture = Fixture::new(EngineConfig::default());
        let validated = fixture.validate("status = open AND assignee in (fred, ghost)", QueryOrigin::Fresh).unwrap();
        let clauses = validated.clauses();
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].candidates[0].values, vec![Value::Term("1".into())]);
        assert_eq!(clauses[1].candidates[0].values, vec![Value::Term("fred".into()), Value::Nothing]);
        assert_eq!(
            validated.warnings().warning_texts(),
            vec!["The value 'ghost' does not exist for the field 'assignee'."]
        );
    }

    #[test]
    fn test_max_errors_cap() {
        let mut config = EngineConfig::default();
        config.max_validation_errors = 3;
        let fixture = Fixture::new(config);
        let jql = (0..6).map(|i| format!("f{} = x", i)).collect::<Vec<_>>().join(" AND ");
        let errors = fixture.errors(&jql);
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[2], "Field 'f2' does not exist or you do not have permission to view it.");
    }

    #[test]
    fn test_stored_query_downgrade() {
        let fixture = Fixture::new(EngineConfig::default());
        let validated = fixture.validate("gone = x AND status = Missing", QueryOrigin::Stored).unwrap();
        assert_eq!(
            validated.warnings().warning_texts(),
            vec![
                "Field 'gone' does not exist or you do not have permission to view it.",
                "The value 'Missing' does not exist for the field 'status'."
            ]
        );
        assert_eq!(fixture.errors("gone = x").len(), 1);
    }

    #[test]
    fn test_history_clauses() {
        let fixture = Fixture::new(EngineConfig::default());
        assert_eq!(
            fixture.errors("summary was foo"),
            vec!["History searches are not supported for the 'summary' field."]
        );
        let validated = fixture
            .validate("status was Open BY fred AFTER '2024/01/01' AND status changed", QueryOrigin::Fresh)
            .unwrap();
        let was = &validated.clauses()[0];
        assert_eq!(was.predicates.len(), 2);
        assert_eq!(was.predicates[0].values, vec![Value::Term("fred".into())]);
        assert!(matches!(was.predicates[1].values[0], Value::Span(_, _)));
        assert_eq!(validated.clauses()[1].operator, Operator::Changed);

        assert!(fixture.errors("status was Open AFTER 'yesterday'")[0].starts_with("Date value 'yesterday'"));
    }

    #[test]
    fn test_order_by() {
        let fixture = Fixture::new(EngineConfig::default());
        assert_eq!(fixture.errors("ORDER BY comment"), vec!["Field 'comment' does not support sorting."]);
        assert_eq!(
            fixture.errors("ORDER BY bogus"),
            vec!["Field 'bogus' does not exist or you do not have permission to view it."]
        );
        let validated = fixture.validate("ORDER BY created", QueryOrigin::Fresh).unwrap();
        assert_eq!(validated.sorts()[0].descriptor.kind, ValueKind::DateTime);
    }

    #[test]
    fn test_disabled_feature_fields() {
        let mut config = EngineConfig::default();
        config.features.voting = false;
        let fixture = Fixture::new(config);
        assert_eq!(
            fixture.errors("votes > 1"),
            vec!["Field 'votes' does not exist or you do not have permission to view it."]
        );
    }
}
