//! 外部目录服务: 项目与常量查找, 用户与用户组, 以及可见性判断
//!
//! 引擎只通过 [`Directory`] 读取这些数据. [`InMemoryDirectory`] 是随 crate
//! 提供的内存实现, 供测试, 基准测试与 REPL 使用.

use serde::{Deserialize, Serialize};

use crate::model::{
    Comment, Component, CustomFieldDefinition, Group, Id, Issue, IssueType, LinkType, Priority,
    Project, ProjectCategory, Resolution, SecurityLevel, Status, User, Version,
};

fn same(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// 目录服务接口. 实现只需提供各类实体的切片, 查找与权限判断都有默认实现.
pub trait Directory: Send + Sync {
    fn projects(&self) -> &[Project];
    fn categories(&self) -> &[ProjectCategory];
    fn versions(&self) -> &[Version];
    fn components(&self) -> &[Component];
    fn issue_types(&self) -> &[IssueType];
    fn statuses(&self) -> &[Status];
    fn priorities(&self) -> &[Priority];
    fn resolutions(&self) -> &[Resolution];
    fn security_levels(&self) -> &[SecurityLevel];
    fn link_types(&self) -> &[LinkType];
    fn users(&self) -> &[User];
    fn groups(&self) -> &[Group];
    fn custom_fields(&self) -> &[CustomFieldDefinition];

    fn project(&self, id: Id) -> Option<&Project> {
        self.projects().iter().find(|p| p.id == id)
    }

    fn project_by_key(&self, key: &str) -> Option<&Project> {
        self.projects().iter().find(|p| same(&p.key, key))
    }

    fn version(&self, id: Id) -> Option<&Version> {
        self.versions().iter().find(|v| v.id == id)
    }

    fn priority(&self, id: Id) -> Option<&Priority> {
        self.priorities().iter().find(|p| p.id == id)
    }

    fn custom_field(&self, id: Id) -> Option<&CustomFieldDefinition> {
        self.custom_fields().iter().find(|f| f.id == id)
    }

    /// 按登录名精确查找 (大小写不敏感)
    fn user(&self, name: &str) -> Option<&User> {
        self.users().iter().find(|u| same(&u.name, name))
    }

    /// 按登录名, 全名或邮箱查找用户. 登录名优先
    fn find_users(&self, text: &str) -> Vec<&User> {
        if let Some(user) = self.user(text) {
            return vec![user];
        }
        self.users()
            .iter()
            .filter(|u| same(&u.full_name, text) || same(&u.email, text))
            .collect()
    }

    fn group(&self, name: &str) -> Option<&Group> {
        self.groups().iter().find(|g| same(&g.name, name))
    }

    fn is_member(&self, user: &str, group: &str) -> bool {
        self.group(group)
            .map(|g| g.members.iter().any(|m| same(m, user)))
            .unwrap_or(false)
    }

    /// 匿名用户 (`None`) 只能浏览对任何人开放的项目
    fn can_browse(&self, user: Option<&str>, project: &Project) -> bool {
        if project.browse_groups.is_empty() {
            return true;
        }
        match user {
            Some(user) => project.browse_groups.iter().any(|g| self.is_member(user, g)),
            None => false,
        }
    }

    /// 项目浏览权限加上安全级别
    fn can_see_issue(&self, user: Option<&str>, issue: &Issue) -> bool {
        let browsable = self.project(issue.project).map(|p| self.can_browse(user, p)).unwrap_or(false);
        if !browsable {
            return false;
        }
        let Some(level_id) = issue.security_level else {
            return true;
        };
        let Some(user) = user else {
            return false;
        };
        match self.security_levels().iter().find(|l| l.id == level_id) {
            Some(level) => {
                level.users.iter().any(|u| same(u, user))
                    || level.groups.iter().any(|g| self.is_member(user, g))
            }
            None => false,
        }
    }

    fn can_see_comment(&self, user: Option<&str>, comment: &Comment) -> bool {
        match (&comment.group, user) {
            (None, _) => true,
            (Some(group), Some(user)) => self.is_member(user, group),
            (Some(_), None) => false,
        }
    }

    fn visible_projects(&self, user: Option<&str>) -> Vec<&Project> {
        self.projects().iter().filter(|p| self.can_browse(user, p)).collect()
    }
}

/// 内存目录, 可从 JSON 反序列化
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryDirectory {
    pub projects: Vec<Project>,
    pub categories: Vec<ProjectCategory>,
    pub versions: Vec<Version>,
    pub components: Vec<Component>,
    pub issue_types: Vec<IssueType>,
    pub statuses: Vec<Status>,
    pub priorities: Vec<Priority>,
    pub resolutions: Vec<Resolution>,
    pub security_levels: Vec<SecurityLevel>,
    pub link_types: Vec<LinkType>,
    pub users: Vec<User>,
    pub groups: Vec<Group>,
    pub custom_fields: Vec<CustomFieldDefinition>,
}

impl Directory for InMemoryDirectory {
    fn projects(&self) -> &[Project] {
        &self.projects
    }
    fn categories(&self) -> &[ProjectCategory] {
        &self.categories
    }
    fn versions(&self) -> &[Version] {
        &self.versions
    }
    fn components(&self) -> &[Component] {
        &self.components
    }
    fn issue_types(&self) -> &[IssueType] {
        &self.issue_types
    }
    fn statuses(&self) -> &[Status] {
        &self.statuses
    }
    fn priorities(&self) -> &[Priority] {
        &self.priorities
    }
    fn resolutions(&self) -> &[Resolution] {
        &self.resolutions
    }
    fn security_levels(&self) -> &[SecurityLevel] {
        &self.security_levels
    }
    fn link_types(&self) -> &[LinkType] {
        &self.link_types
    }
    fn users(&self) -> &[User] {
        &self.users
    }
    fn groups(&self) -> &[Group] {
        &self.groups
    }
    fn custom_fields(&self) -> &[CustomFieldDefinition] {
        &self.custom_fields
    }
}
