use crate::ast::FunctionCall;
use crate::error::{MessageKind, MessageSet};
use crate::field::{FieldDescriptor, ValueKind};
use crate::model::{CustomFieldDefinition, CustomFieldOption, Id};
use crate::operand::QueryLiteral;

use super::{Arity, FunctionDataType, JqlFunction, QueryContext};

/// 级联选择中 "只有父选项, 没有子选项" 的索引词项
pub fn no_child_term(parent: Id) -> String {
    format!("{}:none", parent)
}

fn option_matches(option: &CustomFieldOption, arg: &str) -> bool {
    option.value.eq_ignore_ascii_case(arg) || option.id.to_string() == arg.trim()
}

/// `cascadeOption(parent[, child | none])`
pub struct CascadeOption;

impl CascadeOption {
    fn definition<'a>(ctx: &QueryContext<'a>, field: &FieldDescriptor) -> Option<&'a CustomFieldDefinition> {
        if field.kind != ValueKind::Cascade {
            return None;
        }
        field.custom_id().and_then(|id| ctx.directory.custom_field(id))
    }

    fn parents<'d>(definition: &'d CustomFieldDefinition, arg: &str) -> Vec<&'d CustomFieldOption> {
        definition.options.iter().filter(|o| o.parent.is_none() && option_matches(o, arg)).collect()
    }

    fn children<'d>(definition: &'d CustomFieldDefinition, parents: &[&CustomFieldOption], arg: &str) -> Vec<&'d CustomFieldOption> {
        definition
            .options
            .iter()
            .filter(|o| o.parent.is_some_and(|p| parents.iter().any(|parent| parent.id == p)))
            .filter(|o| option_matches(o, arg))
            .collect()
    }
}

impl JqlFunction for CascadeOption {
    fn name(&self) -> &str {
        "cascadeOption"
    }

    fn arity(&self) -> Arity {
        Arity::between(1, 2)
    }

    fn data_type(&self) -> FunctionDataType {
        FunctionDataType::Option
    }

    fn is_list(&self) -> bool {
        false
    }

    fn validate(&self, ctx: &QueryContext<'_>, call: &FunctionCall, field: &FieldDescriptor) -> MessageSet {
        let mut messages = MessageSet::new();
        let Some(definition) = Self::definition(ctx, field) else {
            messages.add_error(
                MessageKind::FunctionArgument,
                format!("Function '{}' can only be used with cascading select fields.", call.name),
            );
            return messages;
        };
        let parent_arg = &call.args[0];
        let parents = Self::parents(definition, parent_arg);
        if parents.is_empty() {
            messages.add_error(
                MessageKind::FunctionArgument,
                format!(
                    "The option '{}' specified in function '{}' is not a valid parent option.",
                    parent_arg, call.name
                ),
            );
            return messages;
        }
        if let Some(child_arg) = call.args.get(1) {
            if !child_arg.eq_ignore_ascii_case("none") && Self::children(definition, &parents, child_arg).is_empty() {
                messages.add_error(
                    MessageKind::FunctionArgument,
                    format!(
                        "The option '{}' specified in function '{}' is not a child of option '{}'.",
                        child_arg, call.name, parent_arg
                    ),
                );
            }
        }
        messages
    }

    fn values(&self, ctx: &QueryContext<'_>, call: &FunctionCall, field: &FieldDescriptor) -> Vec<QueryLiteral> {
        let Some(definition) = Self::definition(ctx, field) else { return Vec::new() };
        let Some(parent_arg) = call.args.first() else { return Vec::new() };
        let parents = Self::parents(definition, parent_arg);
        match call.args.get(1) {
            None => parents.iter().map(|o| QueryLiteral::number(o.id as i64)).collect(),
            Some(child) if child.eq_ignore_ascii_case("none") => {
                parents.iter().map(|o| QueryLiteral::string(no_child_term(o.id))).collect()
            }
            Some(child) => Self::children(definition, &parents, child)
                .iter()
                .map(|o| QueryLiteral::number(o.id as i64))
                .collect(),
        }
    }
}

/// `standardIssueTypes()` 与 `subtaskIssueTypes()`
pub struct IssueTypesFunction {
    subtask: bool,
}

impl IssueTypesFunction {
    pub fn standard() -> Self {
        IssueTypesFunction { subtask: false }
    }

    pub fn subtask() -> Self {
        IssueTypesFunction { subtask: true }
    }
}

impl JqlFunction for IssueTypesFunction {
    fn name(&self) -> &str {
        if self.subtask {
            "subtaskIssueTypes"
        } else {
            "standardIssueTypes"
        }
    }

    fn arity(&self) -> Arity {
        Arity::NONE
    }

    fn data_type(&self) -> FunctionDataType {
        FunctionDataType::IssueType
    }

    fn is_list(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &QueryContext<'_>, call: &FunctionCall, _field: &FieldDescriptor) -> MessageSet {
        let mut messages = MessageSet::new();
        if self.subtask && !ctx.config.features.subtasks {
            messages.add_error(
                MessageKind::FunctionArgument,
                format!("Function '{}' is invalid as sub-tasks are currently disabled.", call.name),
            );
        }
        messages
    }

    fn values(&self, ctx: &QueryContext<'_>, _call: &FunctionCall, _field: &FieldDescriptor) -> Vec<QueryLiteral> {
        ctx.directory
            .issue_types()
            .iter()
            .filter(|t| t.subtask == self.subtask)
            .map(|t| QueryLiteral::number(t.id as i64))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::config::EngineConfig;
    use crate::field::{custom_descriptor, SystemField};
    use crate::model::{CustomFieldType, FieldContext};

    fn cascade() -> CustomFieldDefinition {
        let option = |id, value: &str, parent| CustomFieldOption { id, value: value.into(), parent };
        CustomFieldDefinition {
            id: 300,
            name: "Location".into(),
            field_type: CustomFieldType::Cascade,
            context: FieldContext::Global,
            options: vec![
                option(1, "Europe", None),
                option(2, "Paris", Some(1)),
                option(3, "Asia", None),
                option(4, "Tokyo", Some(3)),
            ],
            searchable: true,
        }
    }

    #[test]
    fn test_cascade_option_values() {
        let mut dir = directory();
        dir.custom_fields = vec![cascade()];
        let index = index(&dir);
        let config = config();
        let ctx = context(None, &dir, &index, &config);
        let field = custom_descriptor(&cascade());

        let parent = CascadeOption.values(&ctx, &call("cascadeOption", &["europe"]), &field);
        assert_eq!(parent, vec![QueryLiteral::number(1)]);
        let child = CascadeOption.values(&ctx, &call("cascadeOption", &["Europe", "Paris"]), &field);
        assert_eq!(child, vec![QueryLiteral::number(2)]);
        let none = CascadeOption.values(&ctx, &call("cascadeOption", &["3", "None"]), &field);
        assert_eq!(none, vec![QueryLiteral::string("3:none")]);
    }

    #[test]
    fn test_cascade_option_validation() {
        let mut dir = directory();
        dir.custom_fields = vec![cascade()];
        let index = index(&dir);
        let config = config();
        let ctx = context(None, &dir, &index, &config);
        let field = custom_descriptor(&cascade());

        let messages = CascadeOption.validate(&ctx, &call("cascadeOption", &["Paris"]), &field);
        assert_eq!(
            messages.error_texts(),
            vec!["The option 'Paris' specified in function 'cascadeOption' is not a valid parent option."]
        );
        let messages = CascadeOption.validate(&ctx, &call("cascadeOption", &["Europe", "Tokyo"]), &field);
        assert_eq!(
            messages.error_texts(),
            vec!["The option 'Tokyo' specified in function 'cascadeOption' is not a child of option 'Europe'."]
        );
        let component = super::super::testing::field(SystemField::Component);
        let wrong_field = CascadeOption.validate(&ctx, &call("cascadeOption", &["Europe"]), &component);
        assert!(wrong_field.has_errors());
    }

    #[test]
    fn test_issue_type_functions() {
        let (dir, config) = (directory(), config());
        let index = index(&dir);
        let ctx = context(None, &dir, &index, &config);
        let field = field(SystemField::IssueType);
        assert_eq!(IssueTypesFunction::standard().values(&ctx, &call("standardIssueTypes", &[]), &field), vec![QueryLiteral::number(1)]);
        assert_eq!(IssueTypesFunction::subtask().values(&ctx, &call("subtaskIssueTypes", &[]), &field), vec![QueryLiteral::number(5)]);

        let mut disabled = EngineConfig::default();
        disabled.features.subtasks = false;
        let ctx = context(None, &dir, &index, &disabled);
        let messages = IssueTypesFunction::subtask().validate(&ctx, &call("subtaskIssueTypes", &[]), &field);
        assert_eq!(
            messages.error_texts(),
            vec!["Function 'subtaskIssueTypes' is invalid as sub-tasks are currently disabled."]
        );
    }
}
