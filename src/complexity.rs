//! 复杂度检查: 执行前估算查询展开后的项数

use tracing::info;

use crate::error::{JqlError, MessageKind, MessageSet, Result};
use crate::validator::ValidatedQuery;

pub const TOO_COMPLEX: &str = "The JQL query is too complex to be executed. Please refine your query.";

/// 所有叶子子句的展开项数之和
pub fn fan_out(query: &ValidatedQuery) -> usize {
    query.clauses().iter().map(|c| c.fan_out()).sum()
}

/// 超过上限时拒绝执行
pub fn check(query: &ValidatedQuery, max_terms: usize) -> Result<usize> {
    let total = fan_out(query);
    if total > max_terms {
        info!(total, max_terms, "query rejected as too complex");
        let mut messages = MessageSet::new();
        messages.add_error(MessageKind::TooComplex, TOO_COMPLEX);
        return Err(JqlError::Rejected(messages));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::testing::{config, context, directory, index};
    use crate::functions::FunctionRegistry;
    use crate::parser::parse;
    use crate::registry::FieldRegistry;
    use crate::validator::{QueryOrigin, Validator};

    fn validated(jql: &str) -> ValidatedQuery {
        let dir = directory();
        let index = index(&dir);
        let config = config();
        let fields = FieldRegistry::from_directory(config.features, &dir);
        let functions = FunctionRegistry::with_builtins();
        let ctx = context(Some("admin"), &dir, &index, &config);
        Validator::new(ctx, &fields, &functions).validate(parse(jql).unwrap(), QueryOrigin::Fresh).unwrap()
    }

    #[test]
    fn test_fan_out_counts_values() {
        assert_eq!(fan_out(&validated("assignee in (admin, fred) AND votes > 1")), 3);
        assert_eq!(fan_out(&validated("assignee is EMPTY")), 1);
        assert_eq!(fan_out(&validated("")), 0);
    }

    #[test]
    fn test_limit() {
        let query = validated("assignee in (admin, fred) OR reporter = admin");
        assert_eq!(check(&query, 3).unwrap(), 3);
        let err = check(&query, 2).unwrap_err();
        assert_eq!(err.messages(), vec![TOO_COMPLEX.to_string()]);
        assert_eq!(err.status_code(), 400);
    }
}
