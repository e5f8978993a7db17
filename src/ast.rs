//! JQL 的抽象语法树
//!
//! `Display` 实现输出规范化的 JQL 文本, 重新解析后得到完全相同的语法树.

use std::borrow::Cow;
use std::fmt;

use crate::lexer::quote_if_needed;

/// AST 的根节点, 代表一个完整的查询语句
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    /// 条件部分, 空查询时为 None
    pub where_clause: Option<Clause>,
    pub order_by: Option<OrderBy>,
}

/// 布尔表达式树的一个节点
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    And(Vec<Clause>),
    Or(Vec<Clause>),
    Not(Box<Clause>),
    Terminal(TerminalClause),
    Was(WasClause),
    Changed(ChangedClause),
}

/// 叶子节点: `field operator operand`
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalClause {
    pub field: String,
    pub operator: Operator,
    pub operand: Operand,
}

/// 历史查询: `status WAS Open BY fred`
#[derive(Debug, Clone, PartialEq)]
pub struct WasClause {
    pub field: String,
    pub operator: Operator,
    pub operand: Operand,
    pub predicates: Vec<HistoryPredicate>,
}

/// 变更查询: `status CHANGED FROM Open TO Closed`
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedClause {
    pub field: String,
    pub predicates: Vec<HistoryPredicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPredicate {
    pub kind: PredicateKind,
    /// DURING 的操作数是两个元素的列表
    pub operand: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateKind {
    After,
    Before,
    On,
    During,
    By,
    From,
    To,
}

/// 运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    Equals,            // =
    NotEquals,         // !=
    Like,              // ~
    NotLike,           // !~
    LessThan,          // <
    LessThanEquals,    // <=
    GreaterThan,       // >
    GreaterThanEquals, // >=
    In,
    NotIn,
    Is,
    IsNot,
    Was,
    WasNot,
    WasIn,
    WasNotIn,
    Changed,
}

impl Operator {
    pub const ALL: [Operator; 17] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::Like,
        Operator::NotLike,
        Operator::LessThan,
        Operator::LessThanEquals,
        Operator::GreaterThan,
        Operator::GreaterThanEquals,
        Operator::In,
        Operator::NotIn,
        Operator::Is,
        Operator::IsNot,
        Operator::Was,
        Operator::WasNot,
        Operator::WasIn,
        Operator::WasNotIn,
        Operator::Changed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::Like => "~",
            Operator::NotLike => "!~",
            Operator::LessThan => "<",
            Operator::LessThanEquals => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanEquals => ">=",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Is => "is",
            Operator::IsNot => "is not",
            Operator::Was => "was",
            Operator::WasNot => "was not",
            Operator::WasIn => "was in",
            Operator::WasNotIn => "was not in",
            Operator::Changed => "changed",
        }
    }

    /// 需要列表操作数的运算符
    pub fn is_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn | Operator::WasIn | Operator::WasNotIn)
    }

    /// 只接受 EMPTY 的运算符
    pub fn is_empty_only(&self) -> bool {
        matches!(self, Operator::Is | Operator::IsNot)
    }

    pub fn is_history(&self) -> bool {
        matches!(
            self,
            Operator::Was | Operator::WasNot | Operator::WasIn | Operator::WasNotIn | Operator::Changed
        )
    }

    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            Operator::LessThan
                | Operator::LessThanEquals
                | Operator::GreaterThan
                | Operator::GreaterThanEquals
        )
    }

    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            Operator::NotEquals
                | Operator::NotLike
                | Operator::NotIn
                | Operator::IsNot
                | Operator::WasNot
                | Operator::WasNotIn
        )
    }

    /// 去掉否定后的运算符, 例如 `!=` 对应 `=`
    pub fn positive(&self) -> Operator {
        match self {
            Operator::NotEquals => Operator::Equals,
            Operator::NotLike => Operator::Like,
            Operator::NotIn => Operator::In,
            Operator::IsNot => Operator::Is,
            Operator::WasNot => Operator::Was,
            Operator::WasNotIn => Operator::WasIn,
            other => *other,
        }
    }
}

/// 字面量值
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    String(String),
    Number(i64),
}

impl Literal {
    pub fn as_text(&self) -> String {
        match self {
            Literal::String(s) => s.clone(),
            Literal::Number(n) => n.to_string(),
        }
    }
}

/// 函数调用, 参数一律按字符串保存
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<String>,
}

/// 子句右侧的操作数
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Single(Literal),
    Multi(Vec<Operand>),
    Function(FunctionCall),
    Empty,
}

impl Operand {
    pub fn string(s: impl Into<String>) -> Self {
        Operand::Single(Literal::String(s.into()))
    }

    pub fn number(n: i64) -> Self {
        Operand::Single(Literal::Number(n))
    }

    pub fn function(name: impl Into<String>, args: &[&str]) -> Self {
        Operand::Function(FunctionCall {
            name: name.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSort {
    pub field: String,
    pub order: Option<SortOrder>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderBy {
    pub sorts: Vec<SearchSort>,
}

impl Clause {
    pub fn terminal(field: impl Into<String>, operator: Operator, operand: Operand) -> Self {
        Clause::Terminal(TerminalClause { field: field.into(), operator, operand })
    }

    /// The field a leaf clause refers to.
    pub fn field(&self) -> Option<&str> {
        match self {
            Clause::Terminal(t) => Some(&t.field),
            Clause::Was(w) => Some(&w.field),
            Clause::Changed(c) => Some(&c.field),
            _ => None,
        }
    }

    /// 深度优先遍历所有节点
    pub fn visit<'c, F: FnMut(&'c Clause)>(&'c self, f: &mut F) {
        f(self);
        match self {
            Clause::And(children) | Clause::Or(children) => {
                for child in children {
                    child.visit(f);
                }
            }
            Clause::Not(child) => child.visit(f),
            _ => {}
        }
    }

    /// 按源码顺序收集所有叶子子句
    pub fn terminals(&self) -> Vec<&TerminalClause> {
        let mut out = Vec::new();
        self.visit(&mut |c| {
            if let Clause::Terminal(t) = c {
                out.push(t);
            }
        });
        out
    }

    fn is_compound(&self) -> bool {
        matches!(self, Clause::And(_) | Clause::Or(_))
    }
}

/// `cf[id]` 形式的字段名原样输出, 其余按需加引号
fn field_text(name: &str) -> Cow<'_, str> {
    match crate::registry::custom_field_id(name) {
        Some(id) if format!("cf[{}]", id) == name => Cow::Borrowed(name),
        _ => quote_if_needed(name),
    }
}

fn argument_text(arg: &str) -> Cow<'_, str> {
    match arg.parse::<i64>() {
        Ok(n) if n.to_string() == arg => Cow::Borrowed(arg),
        _ => quote_if_needed(arg),
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => f.write_str(&quote_if_needed(s)),
            Literal::Number(n) => write!(f, "{}", n),
        }
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = quote_if_needed(&self.name);
        let args: Vec<_> = self.args.iter().map(|a| argument_text(a)).collect();
        write!(f, "{}({})", name, args.join(", "))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Single(literal) => write!(f, "{}", literal),
            Operand::Multi(values) => {
                let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "({})", items.join(", "))
            }
            Operand::Function(call) => write!(f, "{}", call),
            Operand::Empty => f.write_str("EMPTY"),
        }
    }
}

impl fmt::Display for PredicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PredicateKind::After => "AFTER",
            PredicateKind::Before => "BEFORE",
            PredicateKind::On => "ON",
            PredicateKind::During => "DURING",
            PredicateKind::By => "BY",
            PredicateKind::From => "FROM",
            PredicateKind::To => "TO",
        };
        f.write_str(s)
    }
}

impl fmt::Display for HistoryPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.operand)
    }
}

fn write_child(f: &mut fmt::Formatter<'_>, child: &Clause, parenthesize: bool) -> fmt::Result {
    if parenthesize {
        write!(f, "({})", child)
    } else {
        write!(f, "{}", child)
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::And(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" AND ")?;
                    }
                    write_child(f, child, child.is_compound())?;
                }
                Ok(())
            }
            Clause::Or(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" OR ")?;
                    }
                    write_child(f, child, matches!(child, Clause::Or(_)))?;
                }
                Ok(())
            }
            Clause::Not(child) => {
                f.write_str("NOT ")?;
                write_child(f, child, child.is_compound())
            }
            Clause::Terminal(t) => write!(f, "{} {} {}", field_text(&t.field), t.operator, t.operand),
            Clause::Was(w) => {
                write!(f, "{} {} {}", field_text(&w.field), w.operator, w.operand)?;
                for p in &w.predicates {
                    write!(f, " {}", p)?;
                }
                Ok(())
            }
            Clause::Changed(c) => {
                write!(f, "{} {}", field_text(&c.field), Operator::Changed)?;
                for p in &c.predicates {
                    write!(f, " {}", p)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ORDER BY ")?;
        for (i, sort) in self.sorts.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&field_text(&sort.field))?;
            match sort.order {
                Some(SortOrder::Asc) => f.write_str(" ASC")?,
                Some(SortOrder::Desc) => f.write_str(" DESC")?,
                None => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.where_clause, &self.order_by) {
            (Some(clause), Some(order)) => write!(f, "{} {}", clause, order),
            (Some(clause), None) => write!(f, "{}", clause),
            (None, Some(order)) => write!(f, "{}", order),
            (None, None) => Ok(()),
        }
    }
}
