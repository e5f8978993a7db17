//! 操作数展开: 把字面量, 列表与函数调用展开为扁平的取值列表

use std::fmt;

use crate::ast::{FunctionCall, Literal, Operand};
use crate::error::{MessageKind, MessageSet};
use crate::field::FieldDescriptor;
use crate::functions::{FunctionRegistry, QueryContext};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    String(String),
    Number(i64),
    Empty,
}

/// 展开后的单个取值. 由函数产生时记录函数名, 用于错误消息
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryLiteral {
    pub value: LiteralValue,
    pub function: Option<String>,
}

impl QueryLiteral {
    pub fn string(s: impl Into<String>) -> Self {
        QueryLiteral { value: LiteralValue::String(s.into()), function: None }
    }

    pub fn number(n: i64) -> Self {
        QueryLiteral { value: LiteralValue::Number(n), function: None }
    }

    pub fn empty() -> Self {
        QueryLiteral { value: LiteralValue::Empty, function: None }
    }

    pub fn from_function(mut self, name: &str) -> Self {
        self.function = Some(name.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.value == LiteralValue::Empty
    }

    pub fn text(&self) -> String {
        match &self.value {
            LiteralValue::String(s) => s.clone(),
            LiteralValue::Number(n) => n.to_string(),
            LiteralValue::Empty => String::new(),
        }
    }
}

impl From<&Literal> for QueryLiteral {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::String(s) => QueryLiteral::string(s.clone()),
            Literal::Number(n) => QueryLiteral::number(*n),
        }
    }
}

/// 消息中的取值: 字符串加单引号, 数字原样输出
impl fmt::Display for QueryLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            LiteralValue::String(s) => write!(f, "'{}'", s),
            LiteralValue::Number(n) => write!(f, "{}", n),
            LiteralValue::Empty => f.write_str("EMPTY"),
        }
    }
}

/// 操作数是否只有一个取值 (函数按其是否返回列表判断)
pub fn is_list_operand(operand: &Operand, functions: &FunctionRegistry) -> bool {
    match operand {
        Operand::Multi(_) => true,
        Operand::Function(call) => functions.get(&call.name).map(|f| f.is_list()).unwrap_or(false),
        Operand::Single(_) | Operand::Empty => false,
    }
}

/// 展开操作数. 未知函数不产生取值 (校验阶段已经报错)
pub fn literals(
    ctx: &QueryContext<'_>,
    functions: &FunctionRegistry,
    operand: &Operand,
    field: &FieldDescriptor,
) -> Vec<QueryLiteral> {
    let mut out = Vec::new();
    collect(ctx, functions, operand, field, &mut out);
    out
}

fn collect(
    ctx: &QueryContext<'_>,
    functions: &FunctionRegistry,
    operand: &Operand,
    field: &FieldDescriptor,
    out: &mut Vec<QueryLiteral>,
) {
    match operand {
        Operand::Single(literal) => out.push(literal.into()),
        Operand::Empty => out.push(QueryLiteral::empty()),
        Operand::Multi(items) => {
            for item in items {
                collect(ctx, functions, item, field, out);
            }
        }
        Operand::Function(call) => {
            if let Some(function) = functions.get(&call.name) {
                let name = function.name().to_string();
                out.extend(function.values(ctx, call, field).into_iter().map(|l| l.from_function(&name)));
            }
        }
    }
}

/// 校验操作数中出现的所有函数调用: 是否存在, 参数个数, 以及函数自身的校验
pub fn validate_functions(
    ctx: &QueryContext<'_>,
    functions: &FunctionRegistry,
    operand: &Operand,
    field: &FieldDescriptor,
) -> MessageSet {
    let mut messages = MessageSet::new();
    match operand {
        Operand::Multi(items) => {
            for item in items {
                messages.add_all(validate_functions(ctx, functions, item, field));
            }
        }
        Operand::Function(call) => validate_call(ctx, functions, call, field, &mut messages),
        Operand::Single(_) | Operand::Empty => {}
    }
    messages
}

fn validate_call(
    ctx: &QueryContext<'_>,
    functions: &FunctionRegistry,
    call: &FunctionCall,
    field: &FieldDescriptor,
    messages: &mut MessageSet,
) {
    let Some(function) = functions.get(&call.name) else {
        messages.add_error(
            MessageKind::FunctionNotFound,
            format!("Unable to find JQL function '{}()'.", call.name),
        );
        return;
    };
    let arity = function.arity();
    if !arity.accepts(call.args.len()) {
        messages.add_error(MessageKind::FunctionArity, arity.message(function.name(), call.args.len()));
        return;
    }
    messages.add_all(function.validate(ctx, call, field));
}
