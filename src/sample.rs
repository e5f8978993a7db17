//! 演示数据: REPL 与基准测试使用的一个小型项目目录和一批 issue

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, TimeZone, Utc};

use crate::directory::InMemoryDirectory;
use crate::model::{
    ChangeItem, Comment, Component, CustomFieldDefinition, CustomFieldOption, CustomFieldType, CustomValue,
    FieldContext, Group, Issue, IssueLink, IssueType, LinkDirection, LinkType, Priority, Project,
    ProjectCategory, Resolution, SecurityLevel, Status, User, Version,
};

pub const SEVERITY_FIELD: u64 = 10010;
pub const STORY_POINTS_FIELD: u64 = 10020;
pub const NOTES_FIELD: u64 = 10030;

fn user(name: &str, full_name: &str) -> User {
    User {
        name: name.to_string(),
        full_name: full_name.to_string(),
        email: format!("{}@example.com", name),
        viewed_issues: Vec::new(),
    }
}

fn version(id: u64, project: u64, name: &str, sequence: i64, released: bool) -> Version {
    Version { id, project, name: name.to_string(), sequence, released, archived: false, release_date: None }
}

pub fn directory() -> InMemoryDirectory {
    let mut admin = user("admin", "Administrator");
    admin.viewed_issues = vec!["HSP-3".into(), "MKY-1".into()];
    InMemoryDirectory {
        projects: vec![
            Project { id: 1, key: "HSP".into(), name: "homosapien".into(), category: Some(1), browse_groups: vec![] },
            Project {
                id: 2,
                key: "MKY".into(),
                name: "monkey".into(),
                category: Some(1),
                browse_groups: vec!["developers".into()],
            },
        ],
        categories: vec![ProjectCategory { id: 1, name: "Primates".into() }],
        versions: vec![
            version(10, 1, "1.0", 1, true),
            version(11, 1, "1.1", 2, true),
            version(12, 1, "2.0", 3, false),
            version(20, 2, "m1", 1, true),
            version(21, 2, "m2", 2, false),
        ],
        components: vec![
            Component { id: 1, project: 1, name: "Backend".into() },
            Component { id: 2, project: 1, name: "Frontend".into() },
            Component { id: 3, project: 2, name: "Bananas".into() },
        ],
        issue_types: vec![
            IssueType { id: 1, name: "Bug".into(), subtask: false },
            IssueType { id: 2, name: "Task".into(), subtask: false },
            IssueType { id: 3, name: "Improvement".into(), subtask: false },
            IssueType { id: 5, name: "Sub-task".into(), subtask: true },
        ],
        statuses: vec![
            Status { id: 1, name: "Open".into() },
            Status { id: 3, name: "In Progress".into() },
            Status { id: 5, name: "Resolved".into() },
            Status { id: 6, name: "Closed".into() },
        ],
        priorities: vec![
            Priority { id: 1, name: "Blocker".into(), sequence: 1 },
            Priority { id: 2, name: "Critical".into(), sequence: 2 },
            Priority { id: 3, name: "Major".into(), sequence: 3 },
            Priority { id: 4, name: "Minor".into(), sequence: 4 },
            Priority { id: 5, name: "Trivial".into(), sequence: 5 },
        ],
        resolutions: vec![
            Resolution { id: 1, name: "Fixed".into(), sequence: 1 },
            Resolution { id: 2, name: "Won't Fix".into(), sequence: 2 },
            Resolution { id: 3, name: "Duplicate".into(), sequence: 3 },
        ],
        security_levels: vec![SecurityLevel {
            id: 1,
            name: "Internal".into(),
            users: vec![],
            groups: vec!["developers".into()],
        }],
        link_types: vec![LinkType { id: 1, name: "Blocks".into(), inward: "is blocked by".into(), outward: "blocks".into() }],
        users: vec![admin, user("fred", "Fred Normal"), user("barney", "Barney Rubble")],
        groups: vec![
            Group { name: "developers".into(), members: vec!["admin".into(), "barney".into()] },
            Group { name: "jira-users".into(), members: vec!["admin".into(), "barney".into(), "fred".into()] },
        ],
        custom_fields: vec![
            CustomFieldDefinition {
                id: SEVERITY_FIELD,
                name: "Severity".into(),
                field_type: CustomFieldType::Select,
                context: FieldContext::Global,
                options: vec![
                    CustomFieldOption { id: 1, value: "High".into(), parent: None },
                    CustomFieldOption { id: 2, value: "Medium".into(), parent: None },
                    CustomFieldOption { id: 3, value: "Low".into(), parent: None },
                ],
                searchable: true,
            },
            CustomFieldDefinition {
                id: STORY_POINTS_FIELD,
                name: "Story Points".into(),
                field_type: CustomFieldType::Number,
                context: FieldContext::Global,
                options: vec![],
                searchable: true,
            },
            CustomFieldDefinition {
                id: NOTES_FIELD,
                name: "Notes".into(),
                field_type: CustomFieldType::FreeText,
                context: FieldContext::Scoped { projects: vec![2], issue_types: vec![] },
                options: vec![],
                searchable: true,
            },
        ],
    }
}

const SUMMARIES: [&str; 6] = [
    "Login page throws an error",
    "Upgrade the database driver",
    "Improve search performance",
    "Crash when saving a filter",
    "Document the release process",
    "Banana inventory is out of date",
];

/// 生成 `count` 个 issue, 取值按序号轮换, 结果是确定的
pub fn issues(count: usize) -> Vec<Issue> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).single().unwrap_or_default();
    let users = ["admin", "fred", "barney"];
    let mut per_project = [0u64; 2];
    (0..count)
        .map(|i| {
            let project = if i % 4 == 3 { 2 } else { 1 };
            let slot = (project - 1) as usize;
            per_project[slot] += 1;
            let key = format!("{}-{}", if project == 1 { "HSP" } else { "MKY" }, per_project[slot]);
            let created = base + Duration::hours(i as i64 * 13);
            let mut issue = Issue::new(i as u64 + 1, &key, project, [1, 2, 3][i % 3], 1, created);
            issue.summary = SUMMARIES[i % SUMMARIES.len()].to_string();
            issue.priority = Some((i % 5) as u64 + 1);
            issue.reporter = Some(users[i % 3].to_string());
            issue.assignee = (i % 4 != 1).then(|| users[(i + 1) % 3].to_string());
            issue.updated = created + Duration::days(2);
            issue.due = NaiveDate::from_ymd_opt(2024, 6, 1 + (i % 28) as u32);
            issue.labels = if i % 2 == 0 { vec!["backend".into()] } else { vec!["ui".into(), "ux".into()] };
            issue.voters = users.iter().take(i % 3).map(|u| u.to_string()).collect();
            issue.watchers = vec![users[i % 3].to_string()];
            if project == 1 {
                issue.fix_versions = vec![[10, 11, 12][i % 3]];
                issue.components = vec![(i % 2) as u64 + 1];
            } else {
                issue.fix_versions = vec![20];
                issue.components = vec![3];
                issue.security_level = (i % 8 == 7).then_some(1);
            }
            if i % 3 == 0 {
                issue.original_estimate = Some(480);
                issue.time_spent = Some(60 * (i % 8) as i64);
                issue.remaining_estimate = Some(480 - 60 * (i % 8) as i64);
            }
            if i % 5 == 0 {
                issue.description = Some("Steps to reproduce are attached".into());
                issue.attachments = 1;
            }
            issue.comments = vec![Comment {
                author: users[i % 3].to_string(),
                body: if i % 2 == 0 { "Looks like a regression".into() } else { "Working on it".into() },
                group: (i % 6 == 0).then(|| "developers".to_string()),
            }];
            if i % 3 == 2 {
                issue.status = 5;
                issue.resolution = Some(1);
                issue.resolved = Some(created + Duration::days(3));
                issue.changes = vec![
                    ChangeItem {
                        field: "status".into(),
                        from: Some("1".into()),
                        to: Some("3".into()),
                        author: issue.assignee.clone(),
                        at: created + Duration::days(1),
                    },
                    ChangeItem {
                        field: "status".into(),
                        from: Some("3".into()),
                        to: Some("5".into()),
                        author: issue.assignee.clone(),
                        at: created + Duration::days(3),
                    },
                ];
            }
            if i > 0 && i % 7 == 0 {
                issue.links = vec![IssueLink {
                    link_type: 1,
                    target: format!("HSP-{}", 1 + i % 5),
                    direction: LinkDirection::Outward,
                }];
            }
            let mut custom = BTreeMap::new();
            custom.insert(SEVERITY_FIELD, CustomValue::Options(vec![(i % 3) as u64 + 1]));
            custom.insert(STORY_POINTS_FIELD, CustomValue::Number((i % 8) as f64));
            if project == 2 {
                custom.insert(NOTES_FIELD, CustomValue::Text("needs more bananas".into()));
            }
            issue.custom_values = custom;
            issue
        })
        .collect()
}
