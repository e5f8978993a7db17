//! 在位图索引上执行查询计划, 并对结果排序

use std::cmp::Ordering;

use roaring::RoaringBitmap;
use tracing::trace;

use crate::ast::SortOrder;
use crate::field::{FieldDescriptor, FieldKey, SystemField};
use crate::functions::QueryContext;
use crate::index::{number_key, DocId, FieldHistory};
use crate::model::{split_key, CustomValue, Id, Issue};
use crate::planner::{HistoryMode, HistoryPlan, Plan};
use crate::validator::ResolvedSort;

/// 排序键. 同一排序字段产生的键总是同一种
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Number(i64),
    Text(String),
    /// 项目 key 与序号
    Key(String, u64),
}

pub struct Evaluator<'a> {
    ctx: QueryContext<'a>,
    visible: RoaringBitmap,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: QueryContext<'a>) -> Self {
        let visible = ctx.index.visible(ctx.directory, ctx.user);
        Evaluator { ctx, visible }
    }

    /// 用户可以看到的全部 issue
    pub fn visible(&self) -> &RoaringBitmap {
        &self.visible
    }

    /// 执行计划, 结果只包含用户可见的 issue
    pub fn eval(&self, plan: &Plan) -> RoaringBitmap {
        let mut docs = self.run(plan);
        docs &= &self.visible;
        docs
    }

    fn run(&self, plan: &Plan) -> RoaringBitmap {
        let index = self.ctx.index;
        match plan {
            Plan::All => self.visible.clone(),
            Plan::Nothing => RoaringBitmap::new(),
            Plan::Terms { field, terms } => {
                let mut docs = RoaringBitmap::new();
                for term in terms {
                    docs |= index.term(*field, term);
                }
                docs
            }
            Plan::Range { field, lower, upper } => index.range(*field, *lower, *upper),
            Plan::Present(field) => index.present(*field),
            Plan::Text { field, query } => {
                index.texts(*field).filter(|(_, tokens)| query.matches(tokens)).map(|(doc, _)| doc).collect()
            }
            Plan::Comments(query) => index
                .comments()
                .iter()
                .filter(|c| self.can_see_comment(c.group.as_deref()) && query.matches(&c.tokens))
                .map(|c| c.doc)
                .collect(),
            Plan::History(history) => self.history(history),
            Plan::And(children) => {
                let mut children = children.iter();
                let Some(first) = children.next() else { return self.visible.clone() };
                let mut docs = self.run(first);
                for child in children {
                    if docs.is_empty() {
                        trace!("and short-circuited");
                        break;
                    }
                    docs &= self.run(child);
                }
                docs
            }
            Plan::Or(children) => {
                let mut docs = RoaringBitmap::new();
                for child in children {
                    docs |= self.run(child);
                }
                docs
            }
            Plan::Not(child) => {
                let mut docs = self.visible.clone();
                if !docs.is_empty() {
                    docs -= self.run(child);
                }
                docs
            }
        }
    }

    fn can_see_comment(&self, group: Option<&str>) -> bool {
        match (group, self.ctx.user) {
            (None, _) => true,
            (Some(group), Some(user)) => self.ctx.directory.is_member(user, group),
            (Some(_), None) => false,
        }
    }

    fn history(&self, plan: &HistoryPlan) -> RoaringBitmap {
        self.ctx
            .index
            .history(plan.field)
            .filter(|(doc, history)| self.visible.contains(*doc) && history_matches(plan, history))
            .map(|(doc, _)| doc)
            .collect()
    }

    /// 按 ORDER BY 排序; 最后按 issue key 降序
    pub fn order(&self, docs: &RoaringBitmap, sorts: &[ResolvedSort]) -> Vec<DocId> {
        let mut rows: Vec<(DocId, Vec<Option<SortKey>>, Option<SortKey>)> = docs
            .iter()
            .filter_map(|doc| {
                let issue = self.ctx.index.issue(doc)?;
                let keys = sorts.iter().map(|s| self.sort_key(&s.descriptor, issue)).collect();
                Some((doc, keys, key_of(issue)))
            })
            .collect();
        let orders: Vec<SortOrder> = sorts.iter().map(default_order).collect();
        rows.sort_by(|a, b| {
            for (i, order) in orders.iter().enumerate() {
                let ordering = match order {
                    SortOrder::Asc => compare_asc(&a.1[i], &b.1[i]),
                    SortOrder::Desc => compare_asc(&a.1[i], &b.1[i]).reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            b.2.cmp(&a.2)
        });
        rows.into_iter().map(|(doc, _, _)| doc).collect()
    }

    fn sort_key(&self, descriptor: &FieldDescriptor, issue: &Issue) -> Option<SortKey> {
        match descriptor.key {
            FieldKey::System(field) => self.system_key(field, issue),
            FieldKey::Custom(id) => self.custom_key(id, issue),
        }
    }

    fn system_key(&self, field: SystemField, issue: &Issue) -> Option<SortKey> {
        let dir = self.ctx.directory;
        let name = |name: &str| SortKey::Text(name.to_lowercase());
        let millis = |at: chrono::DateTime<chrono::Utc>| SortKey::Number(at.timestamp_millis());
        use SystemField as S;
        match field {
            S::Project => dir.project(issue.project).map(|p| name(&p.name)),
            S::IssueType => dir.issue_types().iter().find(|t| t.id == issue.issue_type).map(|t| name(&t.name)),
            S::Status => dir.statuses().iter().find(|s| s.id == issue.status).map(|s| name(&s.name)),
            S::Priority => issue.priority.and_then(|id| dir.priority(id)).map(|p| SortKey::Number(p.sequence)),
            S::Resolution => issue
                .resolution
                .and_then(|id| dir.resolutions().iter().find(|r| r.id == id))
                .map(|r| SortKey::Number(r.sequence)),
            S::Assignee => issue.assignee.as_deref().map(name),
            S::Reporter => issue.reporter.as_deref().map(name),
            S::Summary => Some(name(&issue.summary)),
            S::Description => issue.description.as_deref().map(name),
            S::Environment => issue.environment.as_deref().map(name),
            S::Created => Some(millis(issue.created)),
            S::Updated => Some(millis(issue.updated)),
            S::Resolved => issue.resolved.map(millis),
            S::Due => issue.due.map(|d| millis(crate::date::start_of_day(d))),
            S::AffectedVersion => self.version_key(&issue.affected_versions),
            S::FixVersion => self.version_key(&issue.fix_versions),
            S::Component => dir
                .components()
                .iter()
                .filter(|c| issue.components.contains(&c.id))
                .map(|c| name(&c.name))
                .min(),
            S::Labels => issue.labels.iter().map(|l| name(l)).min(),
            S::IssueKey => key_of(issue),
            S::Votes => Some(SortKey::Number(issue.voters.len() as i64)),
            S::Watchers => Some(SortKey::Number(issue.watchers.len() as i64)),
            S::OriginalEstimate => issue.original_estimate.map(SortKey::Number),
            S::RemainingEstimate => issue.remaining_estimate.map(SortKey::Number),
            S::TimeSpent => issue.time_spent.map(SortKey::Number),
            S::WorkRatio => issue.work_ratio().map(SortKey::Number),
            S::Level => issue
                .security_level
                .and_then(|id| dir.security_levels().iter().find(|l| l.id == id))
                .map(|l| name(&l.name)),
            _ => None,
        }
    }

    /// 多值字段取最小的键
    fn version_key(&self, ids: &[Id]) -> Option<SortKey> {
        ids.iter()
            .filter_map(|id| self.ctx.directory.version(*id))
            .map(|v| SortKey::Number(v.sequence))
            .min()
    }

    fn custom_key(&self, id: Id, issue: &Issue) -> Option<SortKey> {
        let value = issue.custom_values.get(&id)?;
        let text = |s: &str| SortKey::Text(s.to_lowercase());
        match value {
            CustomValue::Text(s) | CustomValue::Url(s) => Some(text(s)),
            CustomValue::Number(n) => Some(SortKey::Number(number_key(*n))),
            CustomValue::Date(d) => Some(SortKey::Number(crate::date::start_of_day(*d).timestamp_millis())),
            CustomValue::DateTime(at) => Some(SortKey::Number(at.timestamp_millis())),
            CustomValue::Options(ids) => {
                let definition = self.ctx.directory.custom_field(id)?;
                ids.iter().filter_map(|o| definition.option(*o)).map(|o| text(&o.value)).min()
            }
            CustomValue::Users(names) | CustomValue::Groups(names) | CustomValue::Labels(names) => {
                names.iter().map(|n| text(n)).min()
            }
            CustomValue::Versions(ids) => self.version_key(ids),
            CustomValue::Project(project) => self.ctx.directory.project(*project).map(|p| text(&p.name)),
        }
    }
}

fn key_of(issue: &Issue) -> Option<SortKey> {
    split_key(&issue.key).map(|(project, number)| SortKey::Key(project.to_uppercase(), number))
}

/// 日期字段默认降序
fn default_order(sort: &ResolvedSort) -> SortOrder {
    sort.order.unwrap_or(if sort.descriptor.kind.is_date() { SortOrder::Desc } else { SortOrder::Asc })
}

/// 升序时没有取值的排在最后
fn compare_asc(a: &Option<SortKey>, b: &Option<SortKey>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn by_matches(by: &Option<std::collections::BTreeSet<String>>, author: Option<&str>) -> bool {
    match by {
        None => true,
        Some(users) => author.is_some_and(|a| users.contains(a)),
    }
}

/// WAS: 某段取值区间与窗口重叠. CHANGED: 窗口内有一条满足全部条件的变更
fn history_matches(plan: &HistoryPlan, history: &FieldHistory) -> bool {
    match &plan.mode {
        HistoryMode::Was(values) => history.intervals.iter().any(|interval| {
            interval.start < plan.end
                && interval.end > plan.start
                && values.intersects(&interval.values)
                && by_matches(&plan.by, interval.author.as_deref())
        }),
        HistoryMode::Changed { from, to } => history.changes.iter().any(|change| {
            change.at >= plan.start
                && change.at < plan.end
                && from.as_ref().map_or(true, |f| f.contains(change.from.as_deref()))
                && to.as_ref().map_or(true, |t| t.contains(change.to.as_deref()))
                && by_matches(&plan.by, change.author.as_deref())
        }),
    }
}
