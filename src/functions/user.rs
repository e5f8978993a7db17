use crate::ast::FunctionCall;
use crate::error::{MessageKind, MessageSet};
use crate::field::FieldDescriptor;
use crate::operand::QueryLiteral;

use super::{Arity, FunctionDataType, JqlFunction, QueryContext};

/// `currentUser()`: 当前登录用户, 匿名时没有取值
pub struct CurrentUserFunction;

impl JqlFunction for CurrentUserFunction {
    fn name(&self) -> &str {
        "currentUser"
    }

    fn arity(&self) -> Arity {
        Arity::NONE
    }

    fn data_type(&self) -> FunctionDataType {
        FunctionDataType::User
    }

    fn is_list(&self) -> bool {
        false
    }

    fn values(&self, ctx: &QueryContext<'_>, _call: &FunctionCall, _field: &FieldDescriptor) -> Vec<QueryLiteral> {
        ctx.user.map(QueryLiteral::string).into_iter().collect()
    }
}

/// `membersOf(group)`: 用户组的全部成员
pub struct MembersOfFunction;

impl JqlFunction for MembersOfFunction {
    fn name(&self) -> &str {
        "membersOf"
    }

    fn arity(&self) -> Arity {
        Arity::exactly(1)
    }

    fn data_type(&self) -> FunctionDataType {
        FunctionDataType::User
    }

    fn is_list(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &QueryContext<'_>, call: &FunctionCall, _field: &FieldDescriptor) -> MessageSet {
        let mut messages = MessageSet::new();
        let group = &call.args[0];
        if ctx.directory.group(group).is_none() {
            messages.add_error(
                MessageKind::FunctionArgument,
                format!(
                    "Function '{}' can not generate a list of usernames for group '{}'; the group does not exist.",
                    call.name, group
                ),
            );
        }
        messages
    }

    fn values(&self, ctx: &QueryContext<'_>, call: &FunctionCall, _field: &FieldDescriptor) -> Vec<QueryLiteral> {
        let Some(group) = call.args.first().and_then(|g| ctx.directory.group(g)) else {
            return Vec::new();
        };
        group.members.iter().map(|m| QueryLiteral::string(m.to_lowercase())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::field::SystemField;

    #[test]
    fn test_current_user() {
        let (dir, config) = (directory(), config());
        let index = index(&dir);
        let field = field(SystemField::Assignee);
        let ctx = context(Some("fred"), &dir, &index, &config);
        let values = CurrentUserFunction.values(&ctx, &call("currentUser", &[]), &field);
        assert_eq!(values, vec![QueryLiteral::string("fred")]);

        let anonymous = context(None, &dir, &index, &config);
        assert!(CurrentUserFunction.values(&anonymous, &call("currentUser", &[]), &field).is_empty());
    }

    #[test]
    fn test_members_of() {
        let (dir, config) = (directory(), config());
        let index = index(&dir);
        let field = field(SystemField::Assignee);
        let ctx = context(None, &dir, &index, &config);

        let good = call("membersOf", &["Developers"]);
        assert!(MembersOfFunction.validate(&ctx, &good, &field).is_empty());
        assert_eq!(MembersOfFunction.values(&ctx, &good, &field), vec![QueryLiteral::string("admin")]);

        let bad = call("membersOf", &["nobody"]);
        let messages = MembersOfFunction.validate(&ctx, &bad, &field);
        assert_eq!(
            messages.error_texts(),
            vec!["Function 'membersOf' can not generate a list of usernames for group 'nobody'; the group does not exist."]
        );
    }
}
