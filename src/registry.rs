//! 字段注册表: 把查询中的字段名解析为候选字段描述

use tracing::trace;

use crate::config::FeatureToggles;
use crate::context::SearchContext;
use crate::directory::Directory;
use crate::field::{custom_descriptor, system_fields, FieldDescriptor, FieldKey, SystemField};
use crate::model::{CustomFieldDefinition, FieldContext, Id};

/// 解析 `cf[123]` 形式的字段名 (大小写不敏感)
pub fn custom_field_id(name: &str) -> Option<Id> {
    let lower = name.trim().to_ascii_lowercase();
    let inner = lower.strip_prefix("cf[")?.strip_suffix(']')?.trim();
    if inner.is_empty() || !inner.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    inner.parse().ok()
}

#[derive(Debug, Clone)]
pub struct FieldRegistry {
    system: Vec<FieldDescriptor>,
    custom: Vec<FieldDescriptor>,
    features: FeatureToggles,
}

impl FieldRegistry {
    pub fn new(features: FeatureToggles, definitions: &[CustomFieldDefinition]) -> Self {
        FieldRegistry {
            system: system_fields(&features),
            custom: definitions.iter().map(custom_descriptor).collect(),
            features,
        }
    }

    pub fn from_directory(features: FeatureToggles, directory: &dyn Directory) -> Self {
        Self::new(features, directory.custom_fields())
    }

    pub fn features(&self) -> &FeatureToggles {
        &self.features
    }

    pub fn system_fields(&self) -> &[FieldDescriptor] {
        &self.system
    }

    pub fn custom_fields(&self) -> &[FieldDescriptor] {
        &self.custom
    }

    pub fn get(&self, key: FieldKey) -> Option<&FieldDescriptor> {
        self.system.iter().chain(self.custom.iter()).find(|f| f.key == key)
    }

    /// 启用的系统字段
    pub fn system(&self, field: SystemField) -> Option<&FieldDescriptor> {
        self.get(FieldKey::System(field))
    }

    /// 自定义字段对用户可见: 可搜索, 且全局配置或配置在用户可浏览的项目上
    pub fn is_visible(&self, field: &FieldDescriptor, user: Option<&str>, directory: &dyn Directory) -> bool {
        if !field.searchable {
            return false;
        }
        match &field.context {
            FieldContext::Global => true,
            FieldContext::Scoped { projects, .. } if projects.is_empty() => true,
            FieldContext::Scoped { projects, .. } => projects
                .iter()
                .filter_map(|id| directory.project(*id))
                .any(|p| directory.can_browse(user, p)),
        }
    }

    /// 按名称解析字段, 返回按 `FieldKey` 去重后的候选列表
    pub fn resolve(
        &self,
        name: &str,
        user: Option<&str>,
        directory: &dyn Directory,
        context: &SearchContext,
    ) -> Vec<&FieldDescriptor> {
        if let Some(id) = custom_field_id(name) {
            return self
                .custom
                .iter()
                .filter(|f| f.custom_id() == Some(id) && self.is_visible(f, user, directory))
                .collect();
        }

        let system: Vec<&FieldDescriptor> = self.system.iter().filter(|f| f.matches_name(name)).collect();
        if !system.is_empty() {
            return system;
        }

        let lower = name.to_lowercase();
        let visible: Vec<&FieldDescriptor> = self
            .custom
            .iter()
            .filter(|f| f.name.to_lowercase() == lower)
            .filter(|f| custom_field_id(&f.name).is_none())
            .filter(|f| self.is_visible(f, user, directory))
            .collect();

        let mut candidates = if context.is_global() {
            visible
        } else {
            let narrowed: Vec<&FieldDescriptor> =
                visible.iter().copied().filter(|f| context.applies_to(&f.context)).collect();
            if narrowed.is_empty() {
                visible
            } else {
                narrowed
            }
        };

        let mut seen = Vec::new();
        candidates.retain(|f| {
            if seen.contains(&f.key) {
                false
            } else {
                seen.push(f.key);
                true
            }
        });
        trace!(field = name, candidates = candidates.len(), "resolved field name");
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::model::{CustomFieldType, Project};

    fn definition(id: Id, name: &str, context: FieldContext) -> CustomFieldDefinition {
        CustomFieldDefinition {
            id,
            name: name.into(),
            field_type: CustomFieldType::FreeText,
            context,
            options: vec![],
            searchable: true,
        }
    }

    fn directory() -> InMemoryDirectory {
        InMemoryDirectory {
            projects: vec![
                Project { id: 1, key: "ONE".into(), name: "One".into(), category: None, browse_groups: vec![] },
                Project { id: 2, key: "TWO".into(), name: "Two".into(), category: None, browse_groups: vec![] },
                Project {
                    id: 3,
                    key: "HID".into(),
                    name: "Hidden".into(),
                    category: None,
                    browse_groups: vec!["admins".into()],
                },
            ],
            custom_fields: vec![
                definition(100, "Notes", FieldContext::Scoped { projects: vec![1], issue_types: vec![] }),
                definition(101, "Notes", FieldContext::Scoped { projects: vec![2], issue_types: vec![] }),
                definition(102, "Secret", FieldContext::Scoped { projects: vec![3], issue_types: vec![] }),
                definition(103, "cf[100]", FieldContext::Global),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_custom_field_id() {
        assert_eq!(custom_field_id("cf[10010]"), Some(10010));
        assert_eq!(custom_field_id("CF[5]"), Some(5));
        assert_eq!(custom_field_id("cf[]"), None);
        assert_eq!(custom_field_id("cf[-1]"), None);
        assert_eq!(custom_field_id("cf10"), None);
    }

    #[test]
    fn test_system_fields_and_aliases() {
        let dir = directory();
        let registry = FieldRegistry::from_directory(FeatureToggles::default(), &dir);
        let ctx = SearchContext::global();
        let fields = registry.resolve("TYPE", None, &dir, &ctx);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].key, FieldKey::System(SystemField::IssueType));
        assert_eq!(registry.resolve("resolutiondate", None, &dir, &ctx).len(), 1);
        assert!(registry.resolve("nonsense", None, &dir, &ctx).is_empty());
    }

    #[test]
    fn test_disabled_fields_do_not_resolve() {
        let dir = directory();
        let features = FeatureToggles { subtasks: false, ..FeatureToggles::default() };
        let registry = FieldRegistry::from_directory(features, &dir);
        assert!(registry.resolve("parent", None, &dir, &SearchContext::global()).is_empty());
    }

    #[test]
    fn test_collisions_and_context_narrowing() {
        let dir = directory();
        let registry = FieldRegistry::from_directory(FeatureToggles::default(), &dir);
        let all = registry.resolve("notes", None, &dir, &SearchContext::global());
        assert_eq!(all.len(), 2);

        let ctx = SearchContext::for_projects([2]);
        let narrowed = registry.resolve("Notes", None, &dir, &ctx);
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].custom_id(), Some(101));

        // 收窄后为空时保留全部可见字段
        let ctx = SearchContext::for_projects([3]);
        assert_eq!(registry.resolve("Notes", None, &dir, &ctx).len(), 2);
    }

    #[test]
    fn test_visibility_and_id_form() {
        let dir = directory();
        let registry = FieldRegistry::from_directory(FeatureToggles::default(), &dir);
        let ctx = SearchContext::global();
        assert!(registry.resolve("Secret", None, &dir, &ctx).is_empty());
        assert!(registry.resolve("cf[102]", None, &dir, &ctx).is_empty());
        assert_eq!(registry.resolve("cf[100]", None, &dir, &ctx)[0].custom_id(), Some(100));
        // 名为 cf[100] 的字段不能按名称找到
        assert!(registry.resolve("cf[103]", None, &dir, &ctx).len() == 1);
    }
}
