use chrono::{DateTime, Utc};

use crate::ast::FunctionCall;
use crate::date::{parse_offset, Boundary};
use crate::error::{MessageKind, MessageSet};
use crate::field::FieldDescriptor;
use crate::operand::QueryLiteral;

use super::{Arity, FunctionDataType, JqlFunction, QueryContext};

/// `now()`: 当前时间的毫秒时间戳
pub struct NowFunction;

impl JqlFunction for NowFunction {
    fn name(&self) -> &str {
        "now"
    }

    fn arity(&self) -> Arity {
        Arity::NONE
    }

    fn data_type(&self) -> FunctionDataType {
        FunctionDataType::Date
    }

    fn is_list(&self) -> bool {
        false
    }

    fn values(&self, ctx: &QueryContext<'_>, _call: &FunctionCall, _field: &FieldDescriptor) -> Vec<QueryLiteral> {
        vec![QueryLiteral::number(ctx.now.timestamp_millis())]
    }
}

/// `startOfDay([offset])` 一类的日期边界函数
pub struct DateBoundaryFunction {
    name: &'static str,
    boundary: Boundary,
}

impl DateBoundaryFunction {
    pub fn new(name: &'static str, boundary: Boundary) -> Self {
        DateBoundaryFunction { name, boundary }
    }

    /// 先平移再取边界, 例如 startOfMonth(-1M) 为上个月的第一天. 超出日历范围时为 None
    fn instant(&self, now: DateTime<Utc>, call: &FunctionCall) -> Option<DateTime<Utc>> {
        let shifted = match call.args.first() {
            Some(arg) => parse_offset(arg)?.apply(now)?,
            None => now,
        };
        self.boundary.apply(shifted)
    }
}

impl JqlFunction for DateBoundaryFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> Arity {
        Arity::between(0, 1)
    }

    fn data_type(&self) -> FunctionDataType {
        FunctionDataType::Date
    }

    fn is_list(&self) -> bool {
        false
    }

    fn validate(&self, ctx: &QueryContext<'_>, call: &FunctionCall, _field: &FieldDescriptor) -> MessageSet {
        let mut messages = MessageSet::new();
        if !call.args.is_empty() && self.instant(ctx.now, call).is_none() {
            messages.add_error(
                MessageKind::FunctionArgument,
                format!(
                    "Duration for function '{}' should have the format (+/-)n(yMwdm), e.g -1M for 1 month earlier.",
                    call.name
                ),
            );
        }
        messages
    }

    fn values(&self, ctx: &QueryContext<'_>, call: &FunctionCall, _field: &FieldDescriptor) -> Vec<QueryLiteral> {
        self.instant(ctx.now, call)
            .map(|instant| QueryLiteral::number(instant.timestamp_millis()))
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::super::testing::*;
    use super::*;
    use crate::field::SystemField;

    fn millis(y: i32, m: u32, d: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap().timestamp_millis()
    }

    #[test]
    fn test_boundaries_with_offsets() {
        let (dir, config) = (directory(), config());
        let index = index(&dir);
        let ctx = context(None, &dir, &index, &config);
        let field = field(SystemField::Created);

        let start = DateBoundaryFunction::new("startOfDay", Boundary::StartOfDay);
        assert_eq!(start.values(&ctx, &call("startOfDay", &[]), &field), vec![QueryLiteral::number(millis(2024, 5, 15))]);
        assert_eq!(start.values(&ctx, &call("startOfDay", &["-1d"]), &field), vec![QueryLiteral::number(millis(2024, 5, 14))]);

        let month = DateBoundaryFunction::new("startOfMonth", Boundary::StartOfMonth);
        assert_eq!(month.values(&ctx, &call("startOfMonth", &["-1M"]), &field), vec![QueryLiteral::number(millis(2024, 4, 1))]);

        let now = NowFunction.values(&ctx, &call("now", &[]), &field);
        assert_eq!(now, vec![QueryLiteral::number(ctx.now.timestamp_millis())]);
    }

    #[test]
    fn test_bad_offset() {
        let (dir, config) = (directory(), config());
        let index = index(&dir);
        let ctx = context(None, &dir, &index, &config);
        let start = DateBoundaryFunction::new("startOfWeek", Boundary::StartOfWeek);
        let messages = start.validate(&ctx, &call("startOfWeek", &["soon"]), &field(SystemField::Created));
        assert!(messages.has_errors());
        assert!(start.validate(&ctx, &call("startOfWeek", &["+2w"]), &field(SystemField::Created)).is_empty());
    }

    #[test]
    fn test_offset_outside_calendar() {
        let (dir, config) = (directory(), config());
        let index = index(&dir);
        let ctx = context(None, &dir, &index, &config);
        let start = DateBoundaryFunction::new("startOfDay", Boundary::StartOfDay);
        let overflow = call("startOfDay", &["-99999999999y"]);
        let messages = start.validate(&ctx, &overflow, &field(SystemField::Due));
        assert_eq!(
            messages.error_texts(),
            vec!["Duration for function 'startOfDay' should have the format (+/-)n(yMwdm), e.g -1M for 1 month earlier."]
        );
        assert!(start.values(&ctx, &overflow, &field(SystemField::Due)).is_empty());
    }
}
