use crate::ast::FunctionCall;
use crate::error::{MessageKind, MessageSet};
use crate::field::{FieldDescriptor, SystemField};
use crate::model::{Issue, LinkDirection};
use crate::operand::QueryLiteral;

use super::{Arity, FunctionDataType, JqlFunction, QueryContext};

fn visible_keys<'i>(ctx: &QueryContext<'_>, issues: impl Iterator<Item = &'i Issue>) -> Vec<QueryLiteral> {
    issues
        .filter(|issue| ctx.directory.can_see_issue(ctx.user, issue))
        .map(|issue| QueryLiteral::string(issue.key.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Watched,
    Voted,
}

/// `watchedIssues()` 与 `votedIssues()`
pub struct UserIssuesFunction {
    relation: Relation,
}

impl UserIssuesFunction {
    pub fn watched() -> Self {
        UserIssuesFunction { relation: Relation::Watched }
    }

    pub fn voted() -> Self {
        UserIssuesFunction { relation: Relation::Voted }
    }

    fn field(&self) -> SystemField {
        match self.relation {
            Relation::Watched => SystemField::Watcher,
            Relation::Voted => SystemField::Voter,
        }
    }
}

impl JqlFunction for UserIssuesFunction {
    fn name(&self) -> &str {
        match self.relation {
            Relation::Watched => "watchedIssues",
            Relation::Voted => "votedIssues",
        }
    }

    fn arity(&self) -> Arity {
        Arity::NONE
    }

    fn data_type(&self) -> FunctionDataType {
        FunctionDataType::Issue
    }

    fn is_list(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &QueryContext<'_>, call: &FunctionCall, _field: &FieldDescriptor) -> MessageSet {
        let mut messages = MessageSet::new();
        let features = &ctx.config.features;
        let disabled = match self.relation {
            Relation::Watched if !features.watching => Some("watching issues"),
            Relation::Voted if !features.voting => Some("voting on issues"),
            _ => None,
        };
        if let Some(feature) = disabled {
            messages.add_error(
                MessageKind::FunctionArgument,
                format!("Function '{}' cannot be called as {} is currently disabled.", call.name, feature),
            );
        } else if ctx.user.is_none() {
            messages.add_error(
                MessageKind::FunctionArgument,
                format!("Function '{}' cannot be called as anonymous user.", call.name),
            );
        }
        messages
    }

    fn values(&self, ctx: &QueryContext<'_>, _call: &FunctionCall, _field: &FieldDescriptor) -> Vec<QueryLiteral> {
        let Some(user) = ctx.user else { return Vec::new() };
        let docs = ctx.index.term(self.field().into(), &user.to_lowercase());
        visible_keys(ctx, docs.iter().filter_map(|doc| ctx.index.issue(doc)))
    }
}

/// `issueHistory()`: 当前用户最近浏览过的 issue
pub struct IssueHistoryFunction;

impl JqlFunction for IssueHistoryFunction {
    fn name(&self) -> &str {
        "issueHistory"
    }

    fn arity(&self) -> Arity {
        Arity::NONE
    }

    fn data_type(&self) -> FunctionDataType {
        FunctionDataType::Issue
    }

    fn is_list(&self) -> bool {
        true
    }

    fn values(&self, ctx: &QueryContext<'_>, _call: &FunctionCall, _field: &FieldDescriptor) -> Vec<QueryLiteral> {
        let Some(user) = ctx.user.and_then(|u| ctx.directory.user(u)) else {
            return Vec::new();
        };
        visible_keys(ctx, user.viewed_issues.iter().filter_map(|key| ctx.index.issue_by_key(key)))
    }
}

/// `linkedIssues(key[, linkType...])`
///
/// 链接类型参数可以是类型名称 (两个方向都算), 出向描述或入向描述.
pub struct LinkedIssuesFunction;

impl LinkedIssuesFunction {
    fn link_matches(ctx: &QueryContext<'_>, filters: &[String], link_type: u64, direction: LinkDirection) -> bool {
        if filters.is_empty() {
            return true;
        }
        let Some(link) = ctx.directory.link_types().iter().find(|t| t.id == link_type) else {
            return false;
        };
        filters.iter().any(|filter| {
            link.name.eq_ignore_ascii_case(filter)
                || (direction == LinkDirection::Outward && link.outward.eq_ignore_ascii_case(filter))
                || (direction == LinkDirection::Inward && link.inward.eq_ignore_ascii_case(filter))
        })
    }
}

impl JqlFunction for LinkedIssuesFunction {
    fn name(&self) -> &str {
        "linkedIssues"
    }

    fn arity(&self) -> Arity {
        Arity::at_least(1)
    }

    fn data_type(&self) -> FunctionDataType {
        FunctionDataType::Issue
    }

    fn is_list(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &QueryContext<'_>, call: &FunctionCall, _field: &FieldDescriptor) -> MessageSet {
        let mut messages = MessageSet::new();
        let key = &call.args[0];
        let visible = ctx
            .index
            .issue_by_key(key)
            .is_some_and(|issue| ctx.directory.can_see_issue(ctx.user, issue));
        if !visible {
            messages.add_error(
                MessageKind::FunctionArgument,
                format!("Issue '{}' could not be found in function '{}'.", key, call.name),
            );
        }
        for filter in &call.args[1..] {
            let known = ctx.directory.link_types().iter().any(|t| {
                t.name.eq_ignore_ascii_case(filter)
                    || t.inward.eq_ignore_ascii_case(filter)
                    || t.outward.eq_ignore_ascii_case(filter)
            });
            if !known {
                messages.add_error(
                    MessageKind::FunctionArgument,
                    format!("Issue link type '{}' could not be found in function '{}'.", filter, call.name),
                );
            }
        }
        messages
    }

    fn values(&self, ctx: &QueryContext<'_>, call: &FunctionCall, _field: &FieldDescriptor) -> Vec<QueryLiteral> {
        let Some(source) = call.args.first().and_then(|key| ctx.index.issue_by_key(key)) else {
            return Vec::new();
        };
        if !ctx.directory.can_see_issue(ctx.user, source) {
            return Vec::new();
        }
        let filters = &call.args[1..];
        let targets = source
            .links
            .iter()
            .filter(|link| Self::link_matches(ctx, filters, link.link_type, link.direction))
            .filter_map(|link| ctx.index.issue_by_key(&link.target));
        let mut keys = visible_keys(ctx, targets);
        keys.dedup();
        keys
    }
}
