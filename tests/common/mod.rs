#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use jql_engine::model::{ChangeItem, Comment, CustomFieldDefinition, CustomFieldType, CustomValue, FieldContext, Issue};
use jql_engine::{sample, EngineConfig, InMemoryDirectory, IssueIndex, SearchService};

pub const NUMBER_FIELD: u64 = 10040;

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 10, 0, 0).unwrap()
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 15, 13, 30, 0).unwrap()
}

/// 演示目录加上一个名为 "number" 的数字字段
pub fn directory() -> InMemoryDirectory {
    let mut dir = sample::directory();
    dir.custom_fields.push(CustomFieldDefinition {
        id: NUMBER_FIELD,
        name: "number".into(),
        field_type: CustomFieldType::Number,
        context: FieldContext::Global,
        options: vec![],
        searchable: true,
    });
    dir
}

fn change(from: &str, to: &str, author: &str, when: DateTime<Utc>) -> ChangeItem {
    ChangeItem {
        field: "status".into(),
        from: Some(from.into()),
        to: Some(to.into()),
        author: Some(author.into()),
        at: when,
    }
}

/// HSP-1..3 对所有人可见; MKY 项目只有 developers 组 (admin, barney) 可见
pub fn issues() -> Vec<Issue> {
    let mut hsp1 = Issue::new(1, "HSP-1", 1, 1, 1, at(2024, 1, 10));
    hsp1.priority = Some(3);
    hsp1.assignee = Some("fred".into());
    hsp1.reporter = Some("admin".into());
    hsp1.summary = "Login page broken".into();
    hsp1.fix_versions = vec![10];
    hsp1.components = vec![1];
    hsp1.labels = vec!["backend".into()];
    hsp1.voters = vec!["admin".into()];
    hsp1.watchers = vec!["fred".into()];
    hsp1.due = NaiveDate::from_ymd_opt(2024, 6, 1);
    hsp1.custom_values.insert(sample::SEVERITY_FIELD, CustomValue::Options(vec![1]));
    hsp1.custom_values.insert(NUMBER_FIELD, CustomValue::Number(9.0));

    let mut hsp2 = Issue::new(2, "HSP-2", 1, 2, 3, at(2024, 2, 10));
    hsp2.priority = Some(1);
    hsp2.assignee = Some("admin".into());
    hsp2.reporter = Some("fred".into());
    hsp2.summary = "Upgrade database driver".into();
    hsp2.description = Some("the driver is old".into());
    hsp2.fix_versions = vec![12];
    hsp2.changes = vec![change("1", "3", "admin", at(2024, 2, 12))];
    hsp2.custom_values.insert(NUMBER_FIELD, CustomValue::Number(4.0));

    let mut hsp3 = Issue::new(3, "HSP-3", 1, 1, 5, at(2024, 3, 10));
    hsp3.priority = Some(4);
    hsp3.resolution = Some(1);
    hsp3.resolved = Some(at(2024, 3, 15));
    hsp3.reporter = Some("fred".into());
    hsp3.summary = "Crash on save".into();
    hsp3.fix_versions = vec![11];
    hsp3.changes = vec![change("1", "3", "fred", at(2024, 3, 11)), change("3", "5", "fred", at(2024, 3, 15))];
    hsp3.comments = vec![Comment {
        author: "admin".into(),
        body: "root cause is the cache".into(),
        group: Some("developers".into()),
    }];

    let mut mky1 = Issue::new(4, "MKY-1", 2, 3, 1, at(2024, 1, 20));
    mky1.priority = Some(3);
    mky1.assignee = Some("barney".into());
    mky1.reporter = Some("barney".into());
    mky1.summary = "Banana count wrong".into();
    mky1.fix_versions = vec![20];
    mky1.custom_values.insert(sample::NOTES_FIELD, CustomValue::Text("needs more bananas".into()));

    let mut mky2 = Issue::new(5, "MKY-2", 2, 1, 1, at(2024, 4, 1));
    mky2.assignee = Some("admin".into());
    mky2.summary = "Secret monkey business".into();
    mky2.security_level = Some(1);

    vec![hsp1, hsp2, hsp3, mky1, mky2]
}

pub fn service_with(directory: InMemoryDirectory, issues: Vec<Issue>, config: EngineConfig) -> SearchService {
    let index = IssueIndex::build(issues, &directory);
    SearchService::new(Arc::new(directory), Arc::new(index), config).with_now(now())
}

pub fn setup() -> SearchService {
    setup_with(EngineConfig::default())
}

pub fn setup_with(config: EngineConfig) -> SearchService {
    service_with(directory(), issues(), config)
}

/// 搜索必须成功, 返回有序的 key
pub fn keys(service: &SearchService, jql: &str, user: Option<&str>) -> Vec<String> {
    let response = service.search(jql, user);
    assert_eq!(response.status, 200, "{}: {:?}", jql, response.errors);
    response.keys
}

pub fn key_set(service: &SearchService, jql: &str, user: Option<&str>) -> BTreeSet<String> {
    keys(service, jql, user).into_iter().collect()
}
