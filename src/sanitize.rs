//! 展示前清理查询: 函数参数中用户不可见的项目改写为数字 id
//!
//! 只影响展示, 执行时仍使用原查询.

use tracing::debug;

use crate::ast::{Clause, FunctionCall, HistoryPredicate, Operand, Query};
use crate::directory::Directory;
use crate::functions::{FunctionDataType, FunctionRegistry};

pub struct Sanitizer<'a> {
    directory: &'a dyn Directory,
    functions: &'a FunctionRegistry,
    user: Option<&'a str>,
}

impl<'a> Sanitizer<'a> {
    pub fn new(directory: &'a dyn Directory, functions: &'a FunctionRegistry, user: Option<&'a str>) -> Self {
        Sanitizer { directory, functions, user }
    }

    pub fn sanitize(&self, query: &Query) -> Query {
        Query {
            where_clause: query.where_clause.as_ref().map(|c| self.clause(c)),
            order_by: query.order_by.clone(),
        }
    }

    fn clause(&self, clause: &Clause) -> Clause {
        match clause {
            Clause::And(children) => Clause::And(children.iter().map(|c| self.clause(c)).collect()),
            Clause::Or(children) => Clause::Or(children.iter().map(|c| self.clause(c)).collect()),
            Clause::Not(child) => Clause::Not(Box::new(self.clause(child))),
            Clause::Terminal(terminal) => {
                let mut terminal = terminal.clone();
                terminal.operand = self.operand(&terminal.operand);
                Clause::Terminal(terminal)
            }
            Clause::Was(was) => {
                let mut was = was.clone();
                was.operand = self.operand(&was.operand);
                was.predicates = self.predicates(&was.predicates);
                Clause::Was(was)
            }
            Clause::Changed(changed) => {
                let mut changed = changed.clone();
                changed.predicates = self.predicates(&changed.predicates);
                Clause::Changed(changed)
            }
        }
    }

    fn predicates(&self, predicates: &[HistoryPredicate]) -> Vec<HistoryPredicate> {
        predicates
            .iter()
            .map(|p| HistoryPredicate { kind: p.kind, operand: self.operand(&p.operand) })
            .collect()
    }

    fn operand(&self, operand: &Operand) -> Operand {
        match operand {
            Operand::Multi(items) => Operand::Multi(items.iter().map(|o| self.operand(o)).collect()),
            Operand::Function(call) if self.takes_projects(call) => Operand::Function(FunctionCall {
                name: call.name.clone(),
                args: call.args.iter().map(|arg| self.argument(arg)).collect(),
            }),
            other => other.clone(),
        }
    }

    fn takes_projects(&self, call: &FunctionCall) -> bool {
        self.functions
            .get(&call.name)
            .is_some_and(|f| f.data_type() == FunctionDataType::Version)
    }

    /// 与函数解析项目参数的顺序相同, 但不检查权限
    fn argument(&self, arg: &str) -> String {
        let dir = self.directory;
        let project = dir
            .project_by_key(arg)
            .or_else(|| dir.projects().iter().find(|p| p.name.eq_ignore_ascii_case(arg)))
            .or_else(|| arg.trim().parse().ok().and_then(|id| dir.project(id)));
        match project {
            Some(project) if !dir.can_browse(self.user, project) => {
                debug!(project = project.id, "sanitized invisible project argument");
                project.id.to_string()
            }
            _ => arg.to_string(),
        }
    }
}
