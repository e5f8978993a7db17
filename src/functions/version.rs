use crate::ast::FunctionCall;
use crate::error::MessageSet;
use crate::field::FieldDescriptor;
use crate::model::{Id, Version};
use crate::operand::QueryLiteral;

use super::{resolve_project, validate_projects, Arity, FunctionDataType, JqlFunction, QueryContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelection {
    LatestReleased,
    EarliestUnreleased,
    Released,
    Unreleased,
}

/// 版本函数. 不带参数时作用于用户可浏览的全部项目; 已归档的版本不参与
pub struct VersionFunction {
    selection: VersionSelection,
}

impl VersionFunction {
    pub fn new(selection: VersionSelection) -> Self {
        VersionFunction { selection }
    }

    fn projects(&self, ctx: &QueryContext<'_>, call: &FunctionCall) -> Vec<Id> {
        if call.args.is_empty() {
            ctx.directory.visible_projects(ctx.user).iter().map(|p| p.id).collect()
        } else {
            call.args
                .iter()
                .filter_map(|arg| resolve_project(ctx.directory, ctx.user, arg))
                .map(|p| p.id)
                .collect()
        }
    }

    fn select<'v>(&self, versions: Vec<&'v Version>) -> Vec<&'v Version> {
        let released = |v: &&Version| v.released;
        let mut chosen: Vec<&Version> = match self.selection {
            VersionSelection::LatestReleased => {
                versions.into_iter().filter(released).max_by_key(|v| v.sequence).into_iter().collect()
            }
            VersionSelection::EarliestUnreleased => {
                versions.into_iter().filter(|v| !v.released).min_by_key(|v| v.sequence).into_iter().collect()
            }
            VersionSelection::Released => versions.into_iter().filter(released).collect(),
            VersionSelection::Unreleased => versions.into_iter().filter(|v| !v.released).collect(),
        };
        chosen.sort_by_key(|v| v.sequence);
        chosen
    }
}

impl JqlFunction for VersionFunction {
    fn name(&self) -> &str {
        match self.selection {
            VersionSelection::LatestReleased => "latestReleasedVersion",
            VersionSelection::EarliestUnreleased => "earliestUnreleasedVersion",
            VersionSelection::Released => "releasedVersions",
            VersionSelection::Unreleased => "unreleasedVersions",
        }
    }

    fn arity(&self) -> Arity {
        Arity::at_least(0)
    }

    fn data_type(&self) -> FunctionDataType {
        FunctionDataType::Version
    }

    /// latest/earliest 按单值使用; 作用于多个项目时每个项目各产生一个版本
    fn is_list(&self) -> bool {
        matches!(self.selection, VersionSelection::Released | VersionSelection::Unreleased)
    }

    fn validate(&self, ctx: &QueryContext<'_>, call: &FunctionCall, _field: &FieldDescriptor) -> MessageSet {
        validate_projects(ctx, call)
    }

    fn values(&self, ctx: &QueryContext<'_>, call: &FunctionCall, _field: &FieldDescriptor) -> Vec<QueryLiteral> {
        let mut values = Vec::new();
        for project in self.projects(ctx, call) {
            let versions: Vec<&Version> = ctx
                .directory
                .versions()
                .iter()
                .filter(|v| v.project == project && !v.archived)
                .collect();
            values.extend(self.select(versions).into_iter().map(|v| QueryLiteral::number(v.id as i64)));
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::field::SystemField;

    fn ids(values: Vec<QueryLiteral>) -> Vec<String> {
        values.iter().map(|v| v.text()).collect()
    }

    #[test]
    fn test_version_selection() {
        let (dir, config) = (directory(), config());
        let index = index(&dir);
        let ctx = context(None, &dir, &index, &config);
        let field = field(SystemField::FixVersion);

        let latest = VersionFunction::new(VersionSelection::LatestReleased);
        assert_eq!(ids(latest.values(&ctx, &call("latestReleasedVersion", &["HSP"]), &field)), vec!["11"]);
        let earliest = VersionFunction::new(VersionSelection::EarliestUnreleased);
        assert_eq!(ids(earliest.values(&ctx, &call("earliestUnreleasedVersion", &["hsp"]), &field)), vec!["12"]);
        let released = VersionFunction::new(VersionSelection::Released);
        assert_eq!(ids(released.values(&ctx, &call("releasedVersions", &[]), &field)), vec!["10", "11"]);
        let unreleased = VersionFunction::new(VersionSelection::Unreleased);
        assert_eq!(ids(unreleased.values(&ctx, &call("unreleasedVersions", &["1"]), &field)), vec!["12", "13"]);
    }

    #[test]
    fn test_invisible_project_argument() {
        let (dir, config) = (directory(), config());
        let index = index(&dir);
        let field = field(SystemField::FixVersion);
        let released = VersionFunction::new(VersionSelection::Released);

        let anonymous = context(None, &dir, &index, &config);
        let messages = released.validate(&anonymous, &call("releasedVersions", &["MKY"]), &field);
        assert_eq!(
            messages.error_texts(),
            vec!["Could not resolve the project 'MKY' provided to function 'releasedVersions'."]
        );

        let admin = context(Some("admin"), &dir, &index, &config);
        assert!(released.validate(&admin, &call("releasedVersions", &["MKY"]), &field).is_empty());
    }
}
