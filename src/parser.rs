//! JQL 的语法分析器
//!
//! ## 解析流程图
//!
//! ```text
//! parse()
//!   ├─ 条件部分 (可选)
//!   │   └─ parse_or_expression()
//!   │        └─ parse_and_expression()
//!   │             └─ parse_not_expression()
//!   │                  └─ parse_primary_expression()
//!   │                       ├─ "(" → 分组表达式 (递归调用 parse_or_expression)
//!   │                       └─ parse_terminal()
//!   │                            ├─ parse_field_name()  (word / "quoted" / cf[123])
//!   │                            ├─ CHANGED → parse_predicates()
//!   │                            └─ parse_operator() → parse_operand() → [parse_predicates()]
//!   │
//!   └─ ORDER BY 部分 (可选)
//!        └─ parse_order_by()
//! ```
//!
//! ## 语法优先级（从高到低）
//!
//! 1. **括号分组** `(expression)`
//! 2. **NOT操作** `NOT expression`, `!expression`
//! 3. **叶子子句** `field = value`, `field in (a, b)`, `field was x BY fred`
//! 4. **AND操作** `expr1 AND expr2`, `&`, `&&`
//! 5. **OR操作** `expr1 OR expr2`, `|`, `||`
//!
//! 同一括号层级内连续的 AND (或 OR) 会被展平为一个 n 元节点.
//!
//! ## 解析示例
//!
//! ```text
//! project = HSP AND (status = Open OR priority in (Major, Blocker))
//! assignee = currentUser() ORDER BY created DESC, key
//! status changed FROM Open TO Closed BY fred DURING ("2024/01/01", "2024/02/01")
//! cf[10010] is not EMPTY
//! ```
//!
//! 出错即停止, 不做错误恢复.

use crate::ast::{
    ChangedClause, Clause, FunctionCall, HistoryPredicate, Literal, Operand, Operator, OrderBy,
    PredicateKind, Query, SearchSort, SortOrder, TerminalClause, WasClause,
};
use crate::error::{JqlError, Result, SyntaxErrorKind};
use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};

const VALID_OPERATORS: &str =
    "'=', '!=', '~', '<=', '>=', '>', '<', '!~', 'is', 'in', 'was', 'changed'";

/// 解析一段完整的 JQL 文本
pub fn parse(input: &str) -> Result<Query> {
    let tokens = tokenize(input)?;
    Parser::new(&tokens).parse()
}

pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
}

/// Token text as quoted back in messages, newlines flattened to spaces.
fn shown(token: &Token<'_>) -> String {
    token.display_text().replace(['\r', '\n'], " ")
}

/// 构造 "Expecting X but got 'T'." / "Expecting X before the end of the query." 错误
fn expecting(kind: SyntaxErrorKind, what: &str, token: Option<&Token<'_>>) -> JqlError {
    match token {
        Some(t) => JqlError::parse(
            kind,
            format!("Expecting {} but got '{}'.", what, shown(t)),
            Some(t.position()),
        ),
        None => JqlError::parse(
            kind,
            format!("Expecting {} before the end of the query.", what),
            None,
        ),
    }
}

fn need_logical_operator(token: &Token<'_>) -> JqlError {
    expecting(SyntaxErrorKind::NeedLogicalOperator, "either 'OR' or 'AND'", Some(token))
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        Self { tokens, position: 0 }
    }

    /// 返回当前 token，不推进位置
    fn peek(&self) -> Option<&'a Token<'a>> {
        self.tokens.get(self.position)
    }

    /// 返回当前 token 并推进位置
    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    /// 检查当前 token 是否匹配给定类型
    fn match_token(&self, kind: &TokenKind<'_>) -> bool {
        match self.peek() {
            Some(token) => std::mem::discriminant(&token.kind) == std::mem::discriminant(kind),
            None => false,
        }
    }

    /// 期望特定类型的 token 并推进，否则返回错误
    fn expect(&mut self, expected: TokenKind<'_>, label: &str) -> Result<&'a Token<'a>> {
        if self.match_token(&expected) {
            if let Some(token) = self.advance() {
                return Ok(token);
            }
        }
        Err(expecting(SyntaxErrorKind::ExpectedText, &format!("'{}'", label), self.peek()))
    }

    pub fn parse(&mut self) -> Result<Query> {
        let where_clause = match self.peek() {
            None => None,
            Some(token) if token.kind == TokenKind::Order => None,
            Some(_) => Some(self.parse_or_expression()?),
        };

        let order_by = if self.match_token(&TokenKind::Order) {
            Some(self.parse_order_by()?)
        } else {
            None
        };

        if let Some(token) = self.peek() {
            return Err(need_logical_operator(token));
        }

        Ok(Query { where_clause, order_by })
    }

    /// 解析OR表达式 (最低优先级)
    ///
    /// 语法: `and_expr (OR and_expr)*`
    fn parse_or_expression(&mut self) -> Result<Clause> {
        let mut clauses = vec![self.parse_and_expression()?];
        while self.match_token(&TokenKind::Or) {
            self.advance(); // 消费 OR
            clauses.push(self.parse_and_expression()?);
        }
        Ok(if clauses.len() == 1 { clauses.remove(0) } else { Clause::Or(clauses) })
    }

    /// 解析AND表达式
    ///
    /// 语法: `not_expr (AND not_expr)*`
    fn parse_and_expression(&mut self) -> Result<Clause> {
        let mut clauses = vec![self.parse_not_expression()?];
        while self.match_token(&TokenKind::And) {
            self.advance(); // 消费 AND
            clauses.push(self.parse_not_expression()?);
        }
        Ok(if clauses.len() == 1 { clauses.remove(0) } else { Clause::And(clauses) })
    }

    /// 解析NOT表达式
    ///
    /// 语法: `NOT* primary_expr`
    fn parse_not_expression(&mut self) -> Result<Clause> {
        if self.match_token(&TokenKind::Not) {
            self.advance(); // 消费 NOT
            let expr = self.parse_not_expression()?; // 允许 NOT 链式调用
            Ok(Clause::Not(Box::new(expr)))
        } else {
            self.parse_primary_expression()
        }
    }

    /// 解析基础表达式 (最高优先级)
    fn parse_primary_expression(&mut self) -> Result<Clause> {
        if !self.match_token(&TokenKind::LParen) {
            return self.parse_terminal();
        }
        self.advance(); // 消费 (
        let expr = self.parse_or_expression()?;
        match self.peek() {
            Some(token) if token.kind == TokenKind::RParen => {
                self.advance();
                Ok(expr)
            }
            Some(token) => Err(need_logical_operator(token)),
            None => Err(expecting(SyntaxErrorKind::ExpectedText, "')'", None)),
        }
    }

    fn parse_terminal(&mut self) -> Result<Clause> {
        let field = self.parse_field_name()?;

        if self.match_token(&TokenKind::Changed) {
            self.advance();
            let predicates = self.parse_predicates(true)?;
            return Ok(Clause::Changed(ChangedClause { field, predicates }));
        }

        let operator = self.parse_operator()?;
        let operand = self.parse_operand()?;
        if operator.is_history() {
            let predicates = self.parse_predicates(false)?;
            Ok(Clause::Was(WasClause { field, operator, operand, predicates }))
        } else {
            Ok(Clause::Terminal(TerminalClause { field, operator, operand }))
        }
    }

    /// 字段名: 单词, 引号字符串, 数字或 `cf[id]`
    fn parse_field_name(&mut self) -> Result<String> {
        let Some(token) = self.advance() else {
            return Err(expecting(SyntaxErrorKind::BadFieldName, "a field name", None));
        };
        match &token.kind {
            TokenKind::Word(name) => Ok(name.to_string()),
            TokenKind::Quoted(name) if name.is_empty() => Err(JqlError::parse(
                SyntaxErrorKind::EmptyFieldName,
                "The field name in the query is empty.".to_string(),
                Some(token.position()),
            )),
            TokenKind::Quoted(name) => Ok(name.to_string()),
            TokenKind::Number(_) => Ok(token.text.to_string()),
            TokenKind::Cf => self.parse_custom_field_id(),
            TokenKind::LBracket => Err(JqlError::parse(
                SyntaxErrorKind::BadFieldName,
                "Expecting a field name but got '['. Did you mean 'cf['?".to_string(),
                Some(token.position()),
            )),
            _ => Err(expecting(SyntaxErrorKind::BadFieldName, "a field name", Some(token))),
        }
    }

    /// `cf[ 0005 ]` 规范化为 `cf[5]`
    fn parse_custom_field_id(&mut self) -> Result<String> {
        self.expect(TokenKind::LBracket, "[")?;
        let id = match self.peek() {
            Some(Token { kind: TokenKind::Number(n), .. }) if *n >= 0 => *n,
            other => {
                return Err(expecting(SyntaxErrorKind::BadCustomFieldId, "a custom field id", other))
            }
        };
        self.advance();
        self.expect(TokenKind::RBracket, "]")?;
        Ok(format!("cf[{}]", id))
    }

    fn parse_operator(&mut self) -> Result<Operator> {
        let Some(token) = self.advance() else {
            return Err(JqlError::parse(
                SyntaxErrorKind::BadOperator,
                format!(
                    "Expecting operator before the end of the query. Valid operators include: {}.",
                    VALID_OPERATORS
                ),
                None,
            ));
        };
        let operator = match &token.kind {
            TokenKind::Eq => Operator::Equals,
            TokenKind::NotEq => Operator::NotEquals,
            TokenKind::Like => Operator::Like,
            TokenKind::NotLike => Operator::NotLike,
            TokenKind::Lt => Operator::LessThan,
            TokenKind::Lte => Operator::LessThanEquals,
            TokenKind::Gt => Operator::GreaterThan,
            TokenKind::Gte => Operator::GreaterThanEquals,
            TokenKind::In => Operator::In,
            TokenKind::Not => {
                self.expect(TokenKind::In, "IN")?;
                Operator::NotIn
            }
            TokenKind::Is => {
                if self.consume_not_word()? {
                    Operator::IsNot
                } else {
                    Operator::Is
                }
            }
            TokenKind::Was => {
                let negated = self.consume_not_word()?;
                let list = self.match_token(&TokenKind::In);
                if list {
                    self.advance();
                }
                match (negated, list) {
                    (false, false) => Operator::Was,
                    (true, false) => Operator::WasNot,
                    (false, true) => Operator::WasIn,
                    (true, true) => Operator::WasNotIn,
                }
            }
            _ => {
                return Err(JqlError::parse(
                    SyntaxErrorKind::BadOperator,
                    format!(
                        "Expecting operator but got '{}'. Valid operators include: {}.",
                        shown(token),
                        VALID_OPERATORS
                    ),
                    Some(token.position()),
                ))
            }
        };
        Ok(operator)
    }

    /// IS/WAS 之后只接受单词 NOT, 不接受 `!`
    fn consume_not_word(&mut self) -> Result<bool> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Not => {
                if token.text == "!" {
                    return Err(expecting(SyntaxErrorKind::ExpectedText, "'NOT'", Some(token)));
                }
                self.advance();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// 语法: `EMPTY | value | list | function`
    fn parse_operand(&mut self) -> Result<Operand> {
        let Some(token) = self.peek() else {
            return Err(expecting(SyntaxErrorKind::BadOperand, "either a value, list or function", None));
        };
        match &token.kind {
            TokenKind::Empty => {
                self.advance();
                Ok(Operand::Empty)
            }
            TokenKind::LParen => self.parse_list(),
            TokenKind::Word(value) | TokenKind::Quoted(value) => {
                self.advance();
                if self.match_token(&TokenKind::LParen) {
                    if value.is_empty() {
                        return Err(JqlError::parse(
                            SyntaxErrorKind::EmptyFunctionName,
                            "The function name in the query is empty.".to_string(),
                            Some(token.position()),
                        ));
                    }
                    self.parse_function(value.to_string())
                } else {
                    Ok(Operand::Single(Literal::String(value.to_string())))
                }
            }
            TokenKind::Number(n) => {
                self.advance();
                Ok(Operand::Single(Literal::Number(*n)))
            }
            _ => Err(expecting(SyntaxErrorKind::BadOperand, "either a value, list or function", Some(token))),
        }
    }

    /// 语法: `( operand (, operand)* )`
    fn parse_list(&mut self) -> Result<Operand> {
        self.expect(TokenKind::LParen, "(")?;
        let mut values = Vec::new();
        loop {
            values.push(self.parse_operand()?);
            if self.close_or_continue()? {
                break;
            }
        }
        Ok(Operand::Multi(values))
    }

    /// 语法: `name ( [arg (, arg)*] )`, 参数一律按字符串保存
    fn parse_function(&mut self, name: String) -> Result<Operand> {
        self.expect(TokenKind::LParen, "(")?;
        let mut args = Vec::new();
        if self.match_token(&TokenKind::RParen) {
            self.advance();
            return Ok(Operand::Function(FunctionCall { name, args }));
        }
        loop {
            let token = self.peek();
            let arg = match token.map(|t| (&t.kind, t)) {
                Some((TokenKind::Word(s), _)) | Some((TokenKind::Quoted(s), _)) => s.to_string(),
                Some((TokenKind::Number(_), t)) => t.text.to_string(),
                _ => return Err(expecting(SyntaxErrorKind::BadFunctionArgument, "a function argument", token)),
            };
            self.advance();
            args.push(arg);
            if self.close_or_continue()? {
                break;
            }
        }
        Ok(Operand::Function(FunctionCall { name, args }))
    }

    /// 列表元素之后: `)` 结束返回 true, `,` 继续返回 false
    fn close_or_continue(&mut self) -> Result<bool> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::RParen => {
                self.advance();
                Ok(true)
            }
            Some(token) if token.kind == TokenKind::Comma => {
                self.advance();
                Ok(false)
            }
            other => Err(expecting(SyntaxErrorKind::ExpectedText, "either ')' or ','", other)),
        }
    }

    /// 历史谓词. CHANGED 额外支持 FROM/TO
    fn parse_predicates(&mut self, changed: bool) -> Result<Vec<HistoryPredicate>> {
        let mut predicates = Vec::new();
        while let Some(token) = self.peek() {
            let kind = match &token.kind {
                TokenKind::After => PredicateKind::After,
                TokenKind::Before => PredicateKind::Before,
                TokenKind::On => PredicateKind::On,
                TokenKind::By => PredicateKind::By,
                TokenKind::From if changed => PredicateKind::From,
                TokenKind::To if changed => PredicateKind::To,
                TokenKind::Word(w) if w.eq_ignore_ascii_case("during") => PredicateKind::During,
                _ => break,
            };
            self.advance();
            let operand = if kind == PredicateKind::During {
                self.expect(TokenKind::LParen, "(")?;
                let start = self.parse_operand()?;
                self.expect(TokenKind::Comma, ",")?;
                let end = self.parse_operand()?;
                self.expect(TokenKind::RParen, ")")?;
                Operand::Multi(vec![start, end])
            } else {
                self.parse_operand()?
            };
            predicates.push(HistoryPredicate { kind, operand });
        }
        Ok(predicates)
    }

    /// 语法: `ORDER BY field [ASC|DESC] (, field [ASC|DESC])*`
    fn parse_order_by(&mut self) -> Result<OrderBy> {
        self.expect(TokenKind::Order, "order")?;
        self.expect(TokenKind::By, "by")?;
        let mut sorts = Vec::new();
        loop {
            let field = self.parse_field_name()?;
            let order = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Asc) => Some(SortOrder::Asc),
                Some(TokenKind::Desc) => Some(SortOrder::Desc),
                _ => None,
            };
            if order.is_some() {
                self.advance();
            }
            sorts.push(SearchSort { field, order });

            match self.peek() {
                None => break,
                Some(token) if token.kind == TokenKind::Comma => {
                    self.advance();
                }
                Some(token) if order.is_none() => {
                    return Err(expecting(SyntaxErrorKind::BadSortOrder, "either 'ASC' or 'DESC'", Some(token)))
                }
                Some(token) => return Err(expecting(SyntaxErrorKind::ExpectedText, "','", Some(token))),
            }
        }
        Ok(OrderBy { sorts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Position;

    fn parse_error(input: &str) -> (String, Option<Position>) {
        let err = parse(input).unwrap_err();
        (err.to_string(), err.position())
    }

    fn where_clause(input: &str) -> Clause {
        parse(input).unwrap().where_clause.unwrap()
    }

    #[test]
    fn test_simple_clause() {
        let clause = where_clause("priority = Major");
        assert_eq!(clause, Clause::terminal("priority", Operator::Equals, Operand::string("Major")));
    }

    #[test]
    fn test_empty_and_order_only_queries() {
        assert_eq!(parse("").unwrap(), Query::default());
        assert_eq!(parse("   \n ").unwrap(), Query::default());

        let query = parse("ORDER BY created DESC, key").unwrap();
        assert!(query.where_clause.is_none());
        let sorts = query.order_by.unwrap().sorts;
        assert_eq!(sorts.len(), 2);
        assert_eq!(sorts[0], SearchSort { field: "created".into(), order: Some(SortOrder::Desc) });
        assert_eq!(sorts[1], SearchSort { field: "key".into(), order: None });
    }

    #[test]
    fn test_precedence_and_flattening() {
        let clause = where_clause("a = 1 OR b = 2 AND c = 3 AND d = 4 OR e = 5");
        let Clause::Or(children) = clause else { panic!("expected OR") };
        assert_eq!(children.len(), 3);
        assert!(matches!(&children[1], Clause::And(inner) if inner.len() == 3));

        // 括号保留嵌套
        let clause = where_clause("a = 1 AND (b = 2 AND c = 3)");
        let Clause::And(children) = clause else { panic!("expected AND") };
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[1], Clause::And(_)));
    }

    #[test]
    fn test_symbol_aliases() {
        let words = where_clause("NOT a = 1 AND b = 2 OR c = 3");
        let symbols = where_clause("!a = 1 && b = 2 | c = 3");
        assert_eq!(words, symbols);
        assert_eq!(where_clause("a = 1 & b = 2"), where_clause("a = 1 and b = 2"));
        assert_eq!(where_clause("a = 1 || b = 2"), where_clause("a = 1 or b = 2"));
    }

    #[test]
    fn test_not_chain() {
        let clause = where_clause("NOT NOT a = 1");
        let Clause::Not(inner) = clause else { panic!("expected NOT") };
        assert!(matches!(*inner, Clause::Not(_)));
    }

    #[test]
    fn test_all_operators() {
        let cases = [
            ("a = b", Operator::Equals),
            ("a != b", Operator::NotEquals),
            ("a ~ b", Operator::Like),
            ("a !~ b", Operator::NotLike),
            ("a < b", Operator::LessThan),
            ("a <= b", Operator::LessThanEquals),
            ("a > b", Operator::GreaterThan),
            ("a >= b", Operator::GreaterThanEquals),
            ("a in (b)", Operator::In),
            ("a not in (b)", Operator::NotIn),
            ("a is EMPTY", Operator::Is),
            ("a is not EMPTY", Operator::IsNot),
        ];
        for (input, expected) in cases {
            match where_clause(input) {
                Clause::Terminal(t) => assert_eq!(t.operator, expected, "{}", input),
                other => panic!("unexpected {:?}", other),
            }
        }

        let history = [
            ("a was b", Operator::Was),
            ("a was not b", Operator::WasNot),
            ("a was in (b)", Operator::WasIn),
            ("a was not in (b)", Operator::WasNotIn),
        ];
        for (input, expected) in history {
            match where_clause(input) {
                Clause::Was(w) => assert_eq!(w.operator, expected, "{}", input),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_operands() {
        let clause = where_clause("a in (b, 12, EMPTY, f(x, 3), (c))");
        let Clause::Terminal(t) = clause else { panic!() };
        assert_eq!(
            t.operand,
            Operand::Multi(vec![
                Operand::string("b"),
                Operand::number(12),
                Operand::Empty,
                Operand::function("f", &["x", "3"]),
                Operand::Multi(vec![Operand::string("c")]),
            ])
        );

        let Clause::Terminal(t) = where_clause("a = NULL") else { panic!() };
        assert_eq!(t.operand, Operand::Empty);
        let Clause::Terminal(t) = where_clause("a = \"12\"") else { panic!() };
        assert_eq!(t.operand, Operand::string("12"));
        let Clause::Terminal(t) = where_clause("a = currentUser()") else { panic!() };
        assert_eq!(t.operand, Operand::function("currentUser", &[]));
    }

    #[test]
    fn test_custom_field_reference() {
        let Clause::Terminal(t) = where_clause("cf[ 0005 ] = x") else { panic!() };
        assert_eq!(t.field, "cf[5]");
        let Clause::Terminal(t) = where_clause("CF[10010] = x") else { panic!() };
        assert_eq!(t.field, "cf[10010]");
        let Clause::Terminal(t) = where_clause("'cf[10010]' = x") else { panic!() };
        assert_eq!(t.field, "cf[10010]");
    }

    #[test]
    fn test_history_predicates() {
        let clause = where_clause(
            "status was Open BY fred AFTER '2024/01/01' DURING ('2024/01/01', '2024/02/01')",
        );
        let Clause::Was(w) = clause else { panic!("expected WAS") };
        let kinds: Vec<_> = w.predicates.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PredicateKind::By, PredicateKind::After, PredicateKind::During]);
        assert_eq!(
            w.predicates[2].operand,
            Operand::Multi(vec![Operand::string("2024/01/01"), Operand::string("2024/02/01")])
        );

        let clause = where_clause("status changed FROM Open TO Closed ON now()");
        let Clause::Changed(c) = clause else { panic!("expected CHANGED") };
        let kinds: Vec<_> = c.predicates.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PredicateKind::From, PredicateKind::To, PredicateKind::On]);

        // FROM 只能跟在 CHANGED 之后
        let (message, _) = parse_error("status was Open FROM Closed");
        assert_eq!(message, "Expecting either 'OR' or 'AND' but got 'FROM'. (line 1, character 17)");
        let (message, _) = parse_error("status = Open BY fred");
        assert_eq!(message, "Expecting either 'OR' or 'AND' but got 'BY'. (line 1, character 15)");
    }

    #[test]
    fn test_operator_errors() {
        let (message, position) = parse_error("priority Major");
        assert_eq!(
            message,
            "Expecting operator but got 'Major'. Valid operators include: '=', '!=', '~', '<=', '>=', '>', '<', '!~', 'is', 'in', 'was', 'changed'. (line 1, character 10)"
        );
        assert_eq!(position, Some(Position::new(1, 10)));

        let (message, position) = parse_error("priority");
        assert_eq!(
            message,
            "Expecting operator before the end of the query. Valid operators include: '=', '!=', '~', '<=', '>=', '>', '<', '!~', 'is', 'in', 'was', 'changed'."
        );
        assert_eq!(position, None);

        let (message, _) = parse_error("a is ! EMPTY");
        assert_eq!(message, "Expecting 'NOT' but got '!'. (line 1, character 6)");
        let (message, _) = parse_error("a not (b)");
        assert_eq!(message, "Expecting 'IN' but got '('. (line 1, character 7)");
    }

    #[test]
    fn test_field_errors() {
        let (message, _) = parse_error("= b");
        assert_eq!(message, "Expecting a field name but got '='. (line 1, character 1)");
        let (message, _) = parse_error("a = b AND");
        assert_eq!(message, "Expecting a field name before the end of the query.");
        let (message, _) = parse_error("[10000] = b");
        assert_eq!(message, "Expecting a field name but got '['. Did you mean 'cf['? (line 1, character 1)");
        let (message, _) = parse_error("'' = b");
        assert_eq!(message, "The field name in the query is empty. (line 1, character 1)");
        let (message, _) = parse_error("cf[abc] = b");
        assert_eq!(message, "Expecting a custom field id but got 'abc'. (line 1, character 4)");
        let (message, _) = parse_error("cf[-1] = b");
        assert_eq!(message, "Expecting a custom field id but got '-1'. (line 1, character 4)");
        let (message, _) = parse_error("cf 10 = b");
        assert_eq!(message, "Expecting '[' but got '10'. (line 1, character 4)");
        let (message, _) = parse_error("cf[10 = b");
        assert_eq!(message, "Expecting ']' but got '='. (line 1, character 7)");
    }

    #[test]
    fn test_operand_errors() {
        let (message, _) = parse_error("a = ");
        assert_eq!(message, "Expecting either a value, list or function before the end of the query.");
        let (message, _) = parse_error("a = )");
        assert_eq!(message, "Expecting either a value, list or function but got ')'. (line 1, character 5)");
        let (message, _) = parse_error("a in (b c)");
        assert_eq!(message, "Expecting either ')' or ',' but got 'c'. (line 1, character 9)");
        let (message, _) = parse_error("a in (b, c");
        assert_eq!(message, "Expecting either ')' or ',' before the end of the query.");
        let (message, _) = parse_error("a = func(a, )");
        assert_eq!(message, "Expecting a function argument but got ')'. (line 1, character 13)");
        let (message, _) = parse_error("a = \"\"()");
        assert_eq!(message, "The function name in the query is empty. (line 1, character 5)");
    }

    #[test]
    fn test_logical_operator_errors() {
        let (message, _) = parse_error("a = b c = d");
        assert_eq!(message, "Expecting either 'OR' or 'AND' but got 'c'. (line 1, character 7)");
        let (message, _) = parse_error("(a = b c = d)");
        assert_eq!(message, "Expecting either 'OR' or 'AND' but got 'c'. (line 1, character 8)");
        let (message, _) = parse_error("(a = b");
        assert_eq!(message, "Expecting ')' before the end of the query.");
        let (message, _) = parse_error("a = b)");
        assert_eq!(message, "Expecting either 'OR' or 'AND' but got ')'. (line 1, character 6)");
    }

    #[test]
    fn test_order_by_errors() {
        let (message, _) = parse_error("a = b ORDER c");
        assert_eq!(message, "Expecting 'by' but got 'c'. (line 1, character 13)");
        let (message, _) = parse_error("ORDER BY a b");
        assert_eq!(message, "Expecting either 'ASC' or 'DESC' but got 'b'. (line 1, character 12)");
        let (message, _) = parse_error("ORDER BY a ASC b");
        assert_eq!(message, "Expecting ',' but got 'b'. (line 1, character 16)");
        let (message, _) = parse_error("ORDER BY");
        assert_eq!(message, "Expecting a field name before the end of the query.");
    }

    #[test]
    fn test_error_position_on_second_line() {
        let (message, position) = parse_error("a = b\nAND = c");
        assert_eq!(message, "Expecting a field name but got '='. (line 2, character 5)");
        assert_eq!(position, Some(Position::new(2, 5)));
    }

    #[test]
    fn test_lex_errors_surface_through_parse() {
        let (message, _) = parse_error("comment ~ 'test");
        assert_eq!(message, "The quoted string 'test' has not been completed. (line 1, character 11)");
    }

    #[test]
    fn test_display_round_trip() {
        let inputs = [
            "project = HSP AND (status = Open OR priority in (Major, Blocker))",
            "NOT (a = 1 OR b = 2) AND NOT c = 3",
            "a = 1 AND (b = 2 AND c = 3)",
            "(a = 1 OR b = 2) OR c = 3",
            "summary ~ \"hello world\" ORDER BY created DESC, key",
            "cf[10010] is not EMPTY",
            "\"cf[10010]\" = \"with space\"",
            "\"number\" = echo(9, none)",
            "status changed FROM Open TO Closed BY fred DURING (\"2024/01/01\", \"2024/02/01\")",
            "assignee was not in (fred, EMPTY) BEFORE -1d",
            "a = \"12\" AND b = 12 AND \"and\" = \"or\"",
            "ORDER BY \"by\" ASC",
            "a = \"line\\nbreak\"",
        ];
        for input in inputs {
            let query = parse(input).unwrap();
            let printed = query.to_string();
            let reparsed = parse(&printed).unwrap_or_else(|e| panic!("{}: {}", printed, e));
            assert_eq!(query, reparsed, "{} -> {}", input, printed);
        }
    }

    #[test]
    fn test_display_format() {
        let query = parse("a=1 and (b = x or c in (1,2)) order by d desc").unwrap();
        assert_eq!(query.to_string(), "a = 1 AND (b = x OR c in (1, 2)) ORDER BY d DESC");
    }
}
