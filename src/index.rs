//! 只读的 issue 索引
//!
//! 每个 issue 按在输入中的位置获得一个 `DocId`. 等值字段保存为
//! "规范取值 -> 位图" 的倒排表, 数值与日期字段保存为有序的
//! `BTreeMap<i64, RoaringBitmap>`, 文本字段保存分词结果.
//! 历史字段在构建时还原出每段取值区间, 供 WAS/CHANGED 使用.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use roaring::RoaringBitmap;
use tracing::debug;

use crate::directory::Directory;
use crate::field::{FieldKey, SystemField};
use crate::functions::no_child_term;
use crate::model::{CustomFieldDefinition, CustomFieldType, CustomValue, Id, Issue};
use crate::text;

pub type DocId = u32;

/// 数值自定义字段的保序编码: 浮点数的大小顺序与编码后 i64 的顺序一致
pub fn number_key(value: f64) -> i64 {
    if value == 0.0 {
        return 0;
    }
    let bits = value.to_bits() as i64;
    if bits < 0 {
        bits ^ i64::MAX
    } else {
        bits
    }
}

/// 问题 key 的数值编码: 高 32 位为项目 id, 低 32 位为序号
pub fn issue_key_code(project: Id, number: u64) -> i64 {
    ((project as i64) << 32) | (number as i64 & 0xFFFF_FFFF)
}

/// 一段取值区间 `[start, end)`, 毫秒时间戳
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub values: Vec<String>,
    pub start: i64,
    pub end: i64,
    /// 造成这段取值的操作人; 初始取值记为报告人
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub from: Option<String>,
    pub to: Option<String>,
    pub author: Option<String>,
    pub at: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldHistory {
    pub intervals: Vec<Interval>,
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone)]
pub struct IndexedComment {
    pub doc: DocId,
    pub group: Option<String>,
    pub tokens: Vec<String>,
}

/// 支持历史查询的字段
pub const HISTORY_FIELDS: [SystemField; 6] = [
    SystemField::Status,
    SystemField::Priority,
    SystemField::Resolution,
    SystemField::Assignee,
    SystemField::Reporter,
    SystemField::FixVersion,
];

#[derive(Debug, Default)]
pub struct IssueIndex {
    issues: Vec<Issue>,
    all: RoaringBitmap,
    by_key: HashMap<String, DocId>,
    terms: HashMap<FieldKey, HashMap<String, RoaringBitmap>>,
    present: HashMap<FieldKey, RoaringBitmap>,
    numeric: HashMap<FieldKey, BTreeMap<i64, RoaringBitmap>>,
    texts: HashMap<FieldKey, BTreeMap<DocId, Vec<String>>>,
    comments: Vec<IndexedComment>,
    history: HashMap<SystemField, BTreeMap<DocId, FieldHistory>>,
}

impl IssueIndex {
    /// 构建索引. 目录用于查找项目分类
    pub fn build(issues: Vec<Issue>, directory: &dyn Directory) -> Self {
        let mut index = IssueIndex::default();
        for (position, issue) in issues.iter().enumerate() {
            let doc = position as DocId;
            index.all.insert(doc);
            index.by_key.insert(issue.key.to_uppercase(), doc);
            index.add_issue(doc, issue, directory);
        }
        index.issues = issues;
        debug!(issues = index.issues.len(), fields = index.present.len(), "built issue index");
        index
    }

    fn add_issue(&mut self, doc: DocId, issue: &Issue, directory: &dyn Directory) {
        use SystemField as S;

        self.add_term(S::Project.into(), doc, issue.project.to_string());
        self.add_term(S::IssueType.into(), doc, issue.issue_type.to_string());
        self.add_term(S::Status.into(), doc, issue.status.to_string());
        if let Some(priority) = issue.priority {
            self.add_term(S::Priority.into(), doc, priority.to_string());
        }
        if let Some(resolution) = issue.resolution {
            self.add_term(S::Resolution.into(), doc, resolution.to_string());
        }
        if let Some(assignee) = &issue.assignee {
            self.add_term(S::Assignee.into(), doc, assignee.to_lowercase());
        }
        if let Some(reporter) = &issue.reporter {
            self.add_term(S::Reporter.into(), doc, reporter.to_lowercase());
        }

        self.add_text(S::Summary.into(), doc, Some(&issue.summary));
        self.add_text(S::Description.into(), doc, issue.description.as_deref());
        self.add_text(S::Environment.into(), doc, issue.environment.as_deref());
        for comment in &issue.comments {
            self.comments.push(IndexedComment {
                doc,
                group: comment.group.clone(),
                tokens: text::tokenize(&comment.body),
            });
            self.present.entry(S::Comment.into()).or_default().insert(doc);
        }

        self.add_number(S::Created.into(), doc, issue.created.timestamp_millis());
        self.add_number(S::Updated.into(), doc, issue.updated.timestamp_millis());
        if let Some(due) = issue.due {
            self.add_number(S::Due.into(), doc, crate::date::start_of_day(due).timestamp_millis());
        }
        if let Some(resolved) = issue.resolved {
            self.add_number(S::Resolved.into(), doc, resolved.timestamp_millis());
        }

        for id in &issue.affected_versions {
            self.add_term(S::AffectedVersion.into(), doc, id.to_string());
        }
        for id in &issue.fix_versions {
            self.add_term(S::FixVersion.into(), doc, id.to_string());
        }
        for id in &issue.components {
            self.add_term(S::Component.into(), doc, id.to_string());
        }
        for label in &issue.labels {
            self.add_term(S::Labels.into(), doc, label.clone());
        }

        self.add_term(S::IssueKey.into(), doc, issue.key.to_uppercase());
        self.add_number(S::IssueKey.into(), doc, issue_key_code(issue.project, issue.number()));
        if let Some(parent) = &issue.parent {
            self.add_term(S::Parent.into(), doc, parent.to_uppercase());
        }

        self.add_number(S::Votes.into(), doc, issue.voters.len() as i64);
        for voter in &issue.voters {
            self.add_term(S::Voter.into(), doc, voter.to_lowercase());
        }
        self.add_number(S::Watchers.into(), doc, issue.watchers.len() as i64);
        for watcher in &issue.watchers {
            self.add_term(S::Watcher.into(), doc, watcher.to_lowercase());
        }

        if let Some(minutes) = issue.original_estimate {
            self.add_number(S::OriginalEstimate.into(), doc, minutes);
        }
        if let Some(minutes) = issue.remaining_estimate {
            self.add_number(S::RemainingEstimate.into(), doc, minutes);
        }
        if let Some(minutes) = issue.time_spent {
            self.add_number(S::TimeSpent.into(), doc, minutes);
        }
        if let Some(ratio) = issue.work_ratio() {
            self.add_number(S::WorkRatio.into(), doc, ratio);
        }

        if let Some(level) = issue.security_level {
            self.add_term(S::Level.into(), doc, level.to_string());
        }
        if let Some(category) = directory.project(issue.project).and_then(|p| p.category) {
            self.add_term(S::Category.into(), doc, category.to_string());
        }
        if issue.attachments > 0 {
            self.present.entry(S::Attachments.into()).or_default().insert(doc);
        }

        for (id, value) in &issue.custom_values {
            self.add_custom(FieldKey::Custom(*id), doc, value);
            if let (Some(definition), CustomValue::Options(ids)) = (directory.custom_field(*id), value) {
                if definition.field_type == CustomFieldType::Cascade {
                    self.add_cascade_parents(FieldKey::Custom(*id), doc, definition, ids);
                }
            }
        }

        for field in HISTORY_FIELDS {
            let history = build_history(field, issue);
            self.history.entry(field).or_default().insert(doc, history);
        }
    }

    fn add_custom(&mut self, key: FieldKey, doc: DocId, value: &CustomValue) {
        match value {
            CustomValue::Text(text) => self.add_text(key, doc, Some(text)),
            CustomValue::Number(n) => self.add_number(key, doc, number_key(*n)),
            CustomValue::Date(date) => self.add_number(key, doc, crate::date::start_of_day(*date).timestamp_millis()),
            CustomValue::DateTime(at) => self.add_number(key, doc, at.timestamp_millis()),
            CustomValue::Options(ids) | CustomValue::Versions(ids) => {
                for id in ids {
                    self.add_term(key, doc, id.to_string());
                }
            }
            CustomValue::Users(names) | CustomValue::Groups(names) => {
                for name in names {
                    self.add_term(key, doc, name.to_lowercase());
                }
            }
            CustomValue::Project(id) => self.add_term(key, doc, id.to_string()),
            CustomValue::Url(url) => self.add_term(key, doc, url.clone()),
            CustomValue::Labels(labels) => {
                for label in labels {
                    self.add_term(key, doc, label.clone());
                }
            }
        }
    }

    /// 只选了父选项的级联取值额外记一个词项, 供 `cascadeOption(parent, none)` 使用
    fn add_cascade_parents(&mut self, key: FieldKey, doc: DocId, definition: &CustomFieldDefinition, ids: &[Id]) {
        for id in ids {
            let is_parent = definition.option(*id).is_some_and(|o| o.parent.is_none());
            let has_child = ids.iter().any(|other| definition.option(*other).is_some_and(|o| o.parent == Some(*id)));
            if is_parent && !has_child {
                self.add_term(key, doc, no_child_term(*id));
            }
        }
    }

    fn add_term(&mut self, key: FieldKey, doc: DocId, term: String) {
        self.terms.entry(key).or_default().entry(term).or_default().insert(doc);
        self.present.entry(key).or_default().insert(doc);
    }

    fn add_number(&mut self, key: FieldKey, doc: DocId, value: i64) {
        self.numeric.entry(key).or_default().entry(value).or_default().insert(doc);
        self.present.entry(key).or_default().insert(doc);
    }

    fn add_text(&mut self, key: FieldKey, doc: DocId, value: Option<&str>) {
        let Some(value) = value.filter(|v| !v.trim().is_empty()) else { return };
        self.texts.entry(key).or_default().insert(doc, text::tokenize(value));
        self.present.entry(key).or_default().insert(doc);
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn all(&self) -> &RoaringBitmap {
        &self.all
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn issue(&self, doc: DocId) -> Option<&Issue> {
        self.issues.get(doc as usize)
    }

    pub fn doc_by_key(&self, key: &str) -> Option<DocId> {
        self.by_key.get(&key.to_uppercase()).copied()
    }

    pub fn issue_by_key(&self, key: &str) -> Option<&Issue> {
        self.doc_by_key(key).and_then(|doc| self.issue(doc))
    }

    /// 字段包含该规范取值的文档
    pub fn term(&self, key: FieldKey, term: &str) -> RoaringBitmap {
        self.terms
            .get(&key)
            .and_then(|terms| terms.get(term))
            .cloned()
            .unwrap_or_default()
    }

    /// 字段有取值的文档
    pub fn present(&self, key: FieldKey) -> RoaringBitmap {
        self.present.get(&key).cloned().unwrap_or_default()
    }

    /// 数值落在区间内的文档
    pub fn range(&self, key: FieldKey, lower: Bound<i64>, upper: Bound<i64>) -> RoaringBitmap {
        let mut result = RoaringBitmap::new();
        let Some(values) = self.numeric.get(&key) else { return result };
        if let (Bound::Included(l) | Bound::Excluded(l), Bound::Included(u) | Bound::Excluded(u)) = (lower, upper) {
            if l > u {
                return result;
            }
        }
        if let (Bound::Excluded(l), Bound::Excluded(u)) = (lower, upper) {
            if l == u {
                return result;
            }
        }
        for (_, docs) in values.range((lower, upper)) {
            result |= docs;
        }
        result
    }

    /// 文本字段的分词结果
    pub fn texts(&self, key: FieldKey) -> impl Iterator<Item = (DocId, &[String])> + '_ {
        self.texts
            .get(&key)
            .into_iter()
            .flat_map(|docs| docs.iter().map(|(doc, tokens)| (*doc, tokens.as_slice())))
    }

    pub fn comments(&self) -> &[IndexedComment] {
        &self.comments
    }

    pub fn history(&self, field: SystemField) -> impl Iterator<Item = (DocId, &FieldHistory)> + '_ {
        self.history
            .get(&field)
            .into_iter()
            .flat_map(|docs| docs.iter().map(|(doc, history)| (*doc, history)))
    }

    /// 用户可以看到的 issue
    pub fn visible(&self, directory: &dyn Directory, user: Option<&str>) -> RoaringBitmap {
        self.issues
            .iter()
            .enumerate()
            .filter(|(_, issue)| directory.can_see_issue(user, issue))
            .map(|(doc, _)| doc as DocId)
            .collect()
    }

    pub fn keys(&self, docs: &RoaringBitmap) -> Vec<String> {
        docs.iter().filter_map(|doc| self.issue(doc)).map(|i| i.key.clone()).collect()
    }
}

fn history_name(field: SystemField) -> &'static str {
    match field {
        SystemField::Status => "status",
        SystemField::Priority => "priority",
        SystemField::Resolution => "resolution",
        SystemField::Assignee => "assignee",
        SystemField::Reporter => "reporter",
        _ => "fixversion",
    }
}

fn current_values(field: SystemField, issue: &Issue) -> Vec<String> {
    match field {
        SystemField::Status => vec![issue.status.to_string()],
        SystemField::Priority => issue.priority.map(|p| p.to_string()).into_iter().collect(),
        SystemField::Resolution => issue.resolution.map(|r| r.to_string()).into_iter().collect(),
        SystemField::Assignee => issue.assignee.iter().map(|u| u.to_lowercase()).collect(),
        SystemField::Reporter => issue.reporter.iter().map(|u| u.to_lowercase()).collect(),
        _ => issue.fix_versions.iter().map(|v| v.to_string()).collect(),
    }
}

/// 从当前取值出发, 按时间倒序撤销每条变更, 还原各段取值区间
fn build_history(field: SystemField, issue: &Issue) -> FieldHistory {
    let is_user = matches!(field, SystemField::Assignee | SystemField::Reporter);
    let multi = field == SystemField::FixVersion;
    let canonical = |value: &Option<String>| {
        value.as_ref().map(|v| if is_user { v.to_lowercase() } else { v.clone() })
    };

    let mut changes: Vec<Change> = issue
        .changes
        .iter()
        .filter(|c| c.field.replace(' ', "").eq_ignore_ascii_case(history_name(field)))
        .map(|c| Change {
            from: canonical(&c.from),
            to: canonical(&c.to),
            author: c.author.as_ref().map(|a| a.to_lowercase()),
            at: c.at.timestamp_millis(),
        })
        .collect();
    changes.sort_by_key(|c| c.at);

    let mut values = current_values(field, issue);
    let mut end = i64::MAX;
    let mut intervals = Vec::with_capacity(changes.len() + 1);
    for change in changes.iter().rev() {
        intervals.push(Interval { values: values.clone(), start: change.at, end, author: change.author.clone() });
        end = change.at;
        if multi {
            if let Some(to) = &change.to {
                values.retain(|v| v != to);
            }
            if let Some(from) = &change.from {
                if !values.contains(from) {
                    values.push(from.clone());
                }
            }
        } else {
            values = change.from.iter().cloned().collect();
        }
    }
    intervals.push(Interval {
        values,
        start: issue.created.timestamp_millis(),
        end,
        author: issue.reporter.as_ref().map(|r| r.to_lowercase()),
    });
    intervals.reverse();
    FieldHistory { intervals, changes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::model::ChangeItem;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn sample() -> IssueIndex {
        let mut first = Issue::new(1, "ONE-1", 1, 1, 3, at(1));
        first.summary = "Login page broken".into();
        first.assignee = Some("Fred".into());
        first.reporter = Some("admin".into());
        first.fix_versions = vec![10, 11];
        first.voters = vec!["a".into(), "b".into()];
        first.custom_values.insert(500, CustomValue::Number(-2.5));
        first.changes = vec![
            ChangeItem { field: "status".into(), from: Some("1".into()), to: Some("2".into()), author: Some("Bob".into()), at: at(2) },
            ChangeItem { field: "Status".into(), from: Some("2".into()), to: Some("3".into()), author: Some("fred".into()), at: at(5) },
        ];
        let mut second = Issue::new(2, "ONE-12", 1, 1, 1, at(3));
        second.custom_values.insert(500, CustomValue::Number(4.0));
        IssueIndex::build(vec![first, second], &InMemoryDirectory::default())
    }

    #[test]
    fn test_terms_and_presence() {
        let index = sample();
        assert_eq!(index.len(), 2);
        assert_eq!(index.term(SystemField::Assignee.into(), "fred").len(), 1);
        assert_eq!(index.term(SystemField::FixVersion.into(), "11").iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(index.present(SystemField::Assignee.into()).len(), 1);
        assert_eq!(index.present(SystemField::Votes.into()).len(), 2);
        assert_eq!(index.doc_by_key("one-12"), Some(1));
    }

    #[test]
    fn test_ranges() {
        let index = sample();
        let votes = index.range(SystemField::Votes.into(), Bound::Included(1), Bound::Unbounded);
        assert_eq!(votes.iter().collect::<Vec<_>>(), vec![0]);
        let key = SystemField::IssueKey.into();
        let below = index.range(key, Bound::Included(issue_key_code(1, 0)), Bound::Excluded(issue_key_code(1, 12)));
        assert_eq!(below.iter().collect::<Vec<_>>(), vec![0]);
        let numbers = index.range(FieldKey::Custom(500), Bound::Unbounded, Bound::Excluded(number_key(0.0)));
        assert_eq!(numbers.iter().collect::<Vec<_>>(), vec![0]);
        assert!(index.range(key, Bound::Included(5), Bound::Included(1)).is_empty());
    }

    #[test]
    fn test_number_key_is_monotone() {
        let values = [-100.5, -2.0, -0.5, 0.0, 0.25, 3.0, 1e9];
        for pair in values.windows(2) {
            assert!(number_key(pair[0]) < number_key(pair[1]), "{:?}", pair);
        }
        assert_eq!(number_key(-0.0), number_key(0.0));
    }

    #[test]
    fn test_history_intervals() {
        let index = sample();
        let (_, history) = index.history(SystemField::Status).next().unwrap();
        let values: Vec<_> = history.intervals.iter().map(|i| i.values.clone()).collect();
        assert_eq!(values, vec![vec!["1".to_string()], vec!["2".to_string()], vec!["3".to_string()]]);
        assert_eq!(history.intervals[0].author.as_deref(), Some("admin"));
        assert_eq!(history.intervals[1].author.as_deref(), Some("bob"));
        assert_eq!(history.intervals[2].end, i64::MAX);
        assert_eq!(history.changes.len(), 2);

        // 没有变更记录时只有一段当前取值
        let (_, fix) = index.history(SystemField::FixVersion).next().unwrap();
        assert_eq!(fix.intervals.len(), 1);
        assert_eq!(fix.intervals[0].values, vec!["10".to_string(), "11".to_string()]);
    }

    #[test]
    fn test_texts() {
        let index = sample();
        let texts: Vec<_> = index.texts(SystemField::Summary.into()).collect();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].1, ["login", "page", "broken"]);
        assert!(index.present(SystemField::Description.into()).is_empty());
    }
}
