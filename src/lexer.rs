//! JQL 的词法分析器
//!
//! 词法分析器是惰性的: 每次调用 `next()` 产出一个 token 或一个带位置的错误.
//! 出错后迭代器即结束. `Lexer` 可以 `clone()` 以便从头重新扫描.

use std::borrow::Cow;
use std::collections::HashSet;

use lazy_static::lazy_static;

use crate::error::{display_char, escape_char, JqlError, Position, Result, SyntaxErrorKind};
use crate::token::{Span, Token, TokenKind};

lazy_static! {
    /// 保留字: 未加引号时不能作为字段名或值使用
    static ref RESERVED_WORDS: HashSet<&'static str> = [
        "abort", "access", "add", "after", "alias", "all", "alter", "and", "any", "as", "asc",
        "audit", "avg", "before", "begin", "between", "boolean", "break", "by", "byte", "catch",
        "cf", "changed", "char", "character", "check", "checkpoint", "collate", "collation",
        "column", "commit", "connect", "continue", "count", "create", "current", "date",
        "decimal", "declare", "decrement", "default", "defaults", "define", "delete",
        "delimiter", "desc", "difference", "distinct", "divide", "do", "double", "drop", "else",
        "empty", "encoding", "end", "equals", "escape", "exclusive", "exec", "execute", "exists",
        "explain", "false", "fetch", "file", "field", "first", "float", "for", "from",
        "function", "go", "goto", "grant", "greater", "group", "having", "identified", "if",
        "immediate", "in", "increment", "index", "initial", "inner", "inout", "input", "insert",
        "int", "integer", "intersect", "intersection", "into", "is", "isempty", "isnull", "join",
        "last", "left", "less", "like", "limit", "lock", "long", "max", "min", "minus", "mode",
        "modify", "modulo", "more", "multiply", "next", "noaudit", "not", "notin", "nowait",
        "null", "number", "object", "of", "on", "option", "or", "order", "outer", "output",
        "power", "previous", "prior", "privileges", "public", "raise", "raw", "remainder",
        "rename", "resource", "return", "returns", "revoke", "right", "row", "rowid", "rownum",
        "rows", "select", "session", "set", "share", "size", "sqrt", "start", "strict",
        "string", "subtract", "sum", "synonym", "table", "then", "to", "trans", "transaction",
        "trigger", "true", "uid", "union", "unique", "update", "user", "validate", "values",
        "view", "was", "when", "whenever", "where", "while", "with",
    ]
    .into_iter()
    .collect();
}

/// 未加引号时需要转义的保留字符
const RESERVED_CHARS: &[char] = &['{', '}', '*', '/', '%', '+', '^', '$', '#', '@', '?', ';'];

/// 结束一个单词的语法字符
const DELIMITERS: &[char] = &['(', ')', '[', ']', ',', '=', '!', '<', '>', '~', '&', '|', '"', '\''];

pub fn is_reserved_word(word: &str) -> bool {
    RESERVED_WORDS.contains(word.to_ascii_lowercase().as_str())
}

pub fn is_reserved_char(c: char) -> bool {
    RESERVED_CHARS.contains(&c)
}

/// 控制字符与 Unicode 非字符在任何位置都不允许出现
pub fn is_illegal_char(c: char) -> bool {
    matches!(
        c as u32,
        0x00..=0x08 | 0x0B | 0x0C | 0x0E..=0x1F | 0x7F..=0x9F | 0xFDD0..=0xFDEF | 0xFFFE | 0xFFFF
    )
}

fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r') || (c.is_whitespace() && !is_illegal_char(c))
}

fn is_word_char(c: char) -> bool {
    !is_separator(c) && !DELIMITERS.contains(&c) && !is_reserved_char(c) && !is_illegal_char(c) && c != '\\'
}

fn is_integer_text(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn keyword(word: &str) -> Option<TokenKind<'static>> {
    let kind = match word.to_ascii_lowercase().as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "in" => TokenKind::In,
        "is" => TokenKind::Is,
        "empty" | "null" => TokenKind::Empty,
        "order" => TokenKind::Order,
        "by" => TokenKind::By,
        "asc" => TokenKind::Asc,
        "desc" => TokenKind::Desc,
        "was" => TokenKind::Was,
        "changed" => TokenKind::Changed,
        "cf" => TokenKind::Cf,
        "on" => TokenKind::On,
        "before" => TokenKind::Before,
        "after" => TokenKind::After,
        "from" => TokenKind::From,
        "to" => TokenKind::To,
        _ => return None,
    };
    Some(kind)
}

/// 判断一个值在序列化为 JQL 时是否必须加引号
pub fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || !value.chars().all(is_word_char)
        || is_reserved_word(value)
        || keyword(value).is_some()
        || is_integer_text(value)
}

/// 以双引号包裹并转义一个字符串值
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if is_illegal_char(c) => out.push_str(&escape_char(c)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// 按需加引号
pub fn quote_if_needed(value: &str) -> Cow<'_, str> {
    if needs_quotes(value) {
        Cow::Owned(quote(value))
    } else {
        Cow::Borrowed(value)
    }
}

/// 一次性扫描全部 token
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>> {
    Lexer::new(input).collect()
}

#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    input: &'a str,
    /// 输入字符串中的当前位置（字节索引）
    position: usize,
    line: usize,
    column: usize,
    failed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0, line: 0, column: 0, failed: false }
    }

    /// 返回当前位置的字符，不推进位置
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// 推进位置一个字符并返回该字符, 同时维护行列号
    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        match c {
            '\n' => {
                self.line += 1;
                self.column = 0;
            }
            '\r' if self.peek() != Some('\n') => {
                self.line += 1;
                self.column = 0;
            }
            _ => self.column += 1,
        }
        Some(c)
    }

    fn here(&self) -> Position {
        Position::new(self.line + 1, self.column + 1)
    }

    /// 跳过空白字符
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if is_separator(c) {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind<'a>, start: usize, line: usize, column: usize) -> Token<'a> {
        Token {
            kind,
            text: &self.input[start..self.position],
            span: Span::located(start, self.position, line, column),
        }
    }

    /// 读取一个转义序列, 反斜杠尚未被消费
    fn read_escape(&mut self) -> Result<char> {
        let at = self.here();
        self.bump();
        let illegal = |sequence: String| {
            JqlError::lex(
                SyntaxErrorKind::IllegalEscape,
                format!("The escape sequence '{}' in the JQL query is not valid.", sequence),
                at,
            )
        };
        let Some(c) = self.bump() else {
            return Err(illegal("\\".to_string()));
        };
        match c {
            't' => Ok('\t'),
            'n' => Ok('\n'),
            'r' => Ok('\r'),
            '\\' | '\'' | '"' | ' ' => Ok(c),
            'u' => {
                let mut digits = String::new();
                while digits.len() < 4 {
                    match self.peek() {
                        Some(d) if d.is_ascii_hexdigit() => {
                            digits.push(d);
                            self.bump();
                        }
                        Some(d) => {
                            self.bump();
                            return Err(illegal(format!("\\u{}{}", digits, d)));
                        }
                        None => return Err(illegal(format!("\\u{}", digits))),
                    }
                }
                u32::from_str_radix(&digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| illegal(format!("\\u{}", digits)))
            }
            other => Err(illegal(format!("\\{}", other))),
        }
    }

    /// 读取引号包围的字符串字面量, 开始引号尚未被消费
    fn read_quoted(&mut self, quote: char, start: usize) -> Result<Token<'a>> {
        let (line, column) = (self.line, self.column);
        let opened_at = self.here();
        self.bump();
        let content_start = self.position;
        let mut owned: Option<String> = None;

        loop {
            match self.peek() {
                None => {
                    let partial = owned
                        .unwrap_or_else(|| self.input[content_start..].to_string())
                        .replace("\r\n", " ")
                        .replace(['\n', '\r'], " ");
                    return Err(JqlError::lex(
                        SyntaxErrorKind::UnfinishedString,
                        format!("The quoted string '{}' has not been completed.", partial),
                        opened_at,
                    ));
                }
                Some(c) if c == quote => {
                    let content_end = self.position;
                    self.bump();
                    let value = match owned {
                        Some(s) => Cow::Owned(s),
                        None => Cow::Borrowed(&self.input[content_start..content_end]),
                    };
                    return Ok(self.token(TokenKind::Quoted(value), start, line, column));
                }
                Some('\\') => {
                    if owned.is_none() {
                        owned = Some(self.input[content_start..self.position].to_string());
                    }
                    let decoded = self.read_escape()?;
                    if let Some(buffer) = owned.as_mut() {
                        buffer.push(decoded);
                    }
                }
                Some(c) if c == '\t' || is_illegal_char(c) => {
                    return Err(self.illegal_character(c));
                }
                Some(c) => {
                    self.bump();
                    if let Some(buffer) = owned.as_mut() {
                        buffer.push(c);
                    }
                }
            }
        }
    }

    /// 读取未加引号的单词: 字段名、值、关键字或数字
    fn read_word(&mut self, start: usize) -> Result<Token<'a>> {
        let (line, column) = (self.line, self.column);
        let at = self.here();
        let mut owned: Option<String> = None;

        loop {
            match self.peek() {
                Some('\\') => {
                    if owned.is_none() {
                        owned = Some(self.input[start..self.position].to_string());
                    }
                    let decoded = self.read_escape()?;
                    if let Some(buffer) = owned.as_mut() {
                        buffer.push(decoded);
                    }
                }
                Some(c) if is_word_char(c) => {
                    self.bump();
                    if let Some(buffer) = owned.as_mut() {
                        buffer.push(c);
                    }
                }
                _ => break,
            }
        }

        if let Some(decoded) = owned {
            return Ok(self.token(TokenKind::Word(Cow::Owned(decoded)), start, line, column));
        }

        let word = &self.input[start..self.position];
        if is_integer_text(word) {
            return match word.parse::<i64>() {
                Ok(n) => Ok(self.token(TokenKind::Number(n), start, line, column)),
                Err(_) => Err(JqlError::lex(
                    SyntaxErrorKind::IllegalNumber,
                    format!(
                        "'{}' is not a valid number. Numbers must be between {} and {}.",
                        word,
                        i64::MIN,
                        i64::MAX
                    ),
                    at,
                )),
            };
        }
        if let Some(kind) = keyword(word) {
            return Ok(self.token(kind, start, line, column));
        }
        if is_reserved_word(word) {
            return Err(JqlError::lex(
                SyntaxErrorKind::ReservedWord,
                format!(
                    "'{}' is a reserved JQL word. You must surround it in quotation marks to use it in a query.",
                    word
                ),
                at,
            ));
        }
        Ok(self.token(TokenKind::Word(Cow::Borrowed(word)), start, line, column))
    }

    fn reserved_character(&self, c: char) -> JqlError {
        JqlError::lex(
            SyntaxErrorKind::ReservedCharacter,
            format!(
                "The character '{}' is a reserved JQL character. You must enclose it in a string or use the escape '{}' instead.",
                display_char(c),
                escape_char(c)
            ),
            self.here(),
        )
    }

    fn illegal_character(&self, c: char) -> JqlError {
        JqlError::lex(
            SyntaxErrorKind::IllegalCharacter,
            format!(
                "The character '{}' is not valid in a JQL query. You must escape it using '{}' instead.",
                display_char(c),
                escape_char(c)
            ),
            self.here(),
        )
    }

    fn scan(&mut self) -> Option<Result<Token<'a>>> {
        self.skip_whitespace();
        let start = self.position;
        let (line, column) = (self.line, self.column);
        let c = self.peek()?;

        let single = |lexer: &mut Self, kind: TokenKind<'a>| -> Result<Token<'a>> {
            lexer.bump();
            Ok(lexer.token(kind, start, line, column))
        };

        let result = match c {
            '(' => single(self, TokenKind::LParen),
            ')' => single(self, TokenKind::RParen),
            '[' => single(self, TokenKind::LBracket),
            ']' => single(self, TokenKind::RBracket),
            ',' => single(self, TokenKind::Comma),
            '=' => single(self, TokenKind::Eq),
            '~' => single(self, TokenKind::Like),
            '!' => {
                self.bump();
                let kind = match self.peek() {
                    Some('=') => {
                        self.bump();
                        TokenKind::NotEq
                    }
                    Some('~') => {
                        self.bump();
                        TokenKind::NotLike
                    }
                    _ => TokenKind::Not,
                };
                Ok(self.token(kind, start, line, column))
            }
            '<' | '>' => {
                self.bump();
                let with_eq = self.peek() == Some('=');
                if with_eq {
                    self.bump();
                }
                let kind = match (c, with_eq) {
                    ('<', true) => TokenKind::Lte,
                    ('<', false) => TokenKind::Lt,
                    (_, true) => TokenKind::Gte,
                    _ => TokenKind::Gt,
                };
                Ok(self.token(kind, start, line, column))
            }
            '&' | '|' => {
                self.bump();
                if self.peek() == Some(c) {
                    self.bump();
                }
                let kind = if c == '&' { TokenKind::And } else { TokenKind::Or };
                Ok(self.token(kind, start, line, column))
            }
            '"' | '\'' => self.read_quoted(c, start),
            c if is_reserved_char(c) => Err(self.reserved_character(c)),
            c if is_illegal_char(c) => Err(self.illegal_character(c)),
            _ => self.read_word(start),
        };
        Some(result)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.scan();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        Lexer::new(input).map(|t| t.unwrap().kind).collect()
    }

    fn lex_error(input: &str) -> JqlError {
        tokenize(input).unwrap_err()
    }

    fn word(s: &str) -> TokenKind<'_> {
        TokenKind::Word(Cow::Borrowed(s))
    }

    fn quoted(s: &str) -> TokenKind<'_> {
        TokenKind::Quoted(Cow::Borrowed(s))
    }

    #[test]
    fn test_simple_clause() {
        let mut lexer = Lexer::new("status = Open");
        assert_eq!(lexer.next().unwrap().unwrap().kind, word("status"));
        assert_eq!(lexer.next().unwrap().unwrap().kind, TokenKind::Eq);
        assert_eq!(lexer.next().unwrap().unwrap().kind, word("Open"));
        assert!(lexer.next().is_none());
    }

    #[test]
    fn test_all_operators_and_punctuation() {
        let input = "!= = ~ !~ > < >= <= ( ) [ ] , ! & && | ||";
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::NotEq, TokenKind::Eq, TokenKind::Like, TokenKind::NotLike,
                TokenKind::Gt, TokenKind::Lt, TokenKind::Gte, TokenKind::Lte,
                TokenKind::LParen, TokenKind::RParen, TokenKind::LBracket, TokenKind::RBracket,
                TokenKind::Comma, TokenKind::Not, TokenKind::And, TokenKind::And,
                TokenKind::Or, TokenKind::Or,
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let input = "AND or nOt is IN Empty NULL order BY asc DESC was changed CF on before after from to";
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::And, TokenKind::Or, TokenKind::Not, TokenKind::Is, TokenKind::In,
                TokenKind::Empty, TokenKind::Empty, TokenKind::Order, TokenKind::By,
                TokenKind::Asc, TokenKind::Desc, TokenKind::Was, TokenKind::Changed,
                TokenKind::Cf, TokenKind::On, TokenKind::Before, TokenKind::After,
                TokenKind::From, TokenKind::To,
            ]
        );
    }

    #[test]
    fn test_numbers_and_strings() {
        let input = r#"12345 -12345 "12345" 12345a -29202- one-1 -78a 'hello world'"#;
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::Number(12345),
                TokenKind::Number(-12345),
                quoted("12345"),
                word("12345a"),
                word("-29202-"),
                word("one-1"),
                word("-78a"),
                quoted("hello world"),
            ]
        );
    }

    #[test]
    fn test_number_boundaries() {
        assert_eq!(kinds("9223372036854775807"), vec![TokenKind::Number(i64::MAX)]);
        assert_eq!(kinds("-9223372036854775808"), vec![TokenKind::Number(i64::MIN)]);

        let err = lex_error("a = 9223372036854775808");
        assert_eq!(err.syntax_kind(), Some(SyntaxErrorKind::IllegalNumber));
        assert_eq!(
            err.to_string(),
            "'9223372036854775808' is not a valid number. Numbers must be between \
             -9223372036854775808 and 9223372036854775807. (line 1, character 5)"
        );
    }

    #[test]
    fn test_escapes() {
        assert_eq!(
            kinds(r#"prior\'ty priority\ ty "a\"b" 'c\td' \u2EE5"#),
            vec![
                TokenKind::Word(Cow::Owned("prior'ty".to_string())),
                TokenKind::Word(Cow::Owned("priority ty".to_string())),
                TokenKind::Quoted(Cow::Owned("a\"b".to_string())),
                TokenKind::Quoted(Cow::Owned("c\td".to_string())),
                TokenKind::Word(Cow::Owned("\u{2EE5}".to_string())),
            ]
        );
    }

    #[test]
    fn test_illegal_escapes() {
        let cases = [
            (r"test = case\k", "\\k"),
            (r"\u278q", "\\u278q"),
            (r"\u-", "\\u-"),
            (r"\uz", "\\uz"),
        ];
        for (input, sequence) in cases {
            let err = lex_error(input);
            assert_eq!(err.syntax_kind(), Some(SyntaxErrorKind::IllegalEscape), "{}", input);
            assert!(
                err.to_string().starts_with(&format!(
                    "The escape sequence '{}' in the JQL query is not valid.",
                    sequence
                )),
                "{}",
                err
            );
        }
    }

    #[test]
    fn test_unterminated_string() {
        let err = lex_error("comment ~ 'test");
        assert_eq!(
            err.to_string(),
            "The quoted string 'test' has not been completed. (line 1, character 11)"
        );

        let err = lex_error("what = hrejw'ewjrhejkw");
        assert_eq!(
            err.to_string(),
            "The quoted string 'ewjrhejkw' has not been completed. (line 1, character 13)"
        );

        let err = lex_error("priority = \"");
        assert_eq!(err.syntax_kind(), Some(SyntaxErrorKind::UnfinishedString));
        assert!(err.to_string().starts_with("The quoted string '' has not been completed."));

        let err = lex_error("a = 'one\ntwo");
        assert!(err.to_string().starts_with("The quoted string 'one two' has not been completed."));
    }

    #[test]
    fn test_newline_allowed_in_quotes_and_tracked() {
        assert_eq!(kinds("'a\nb'"), vec![quoted("a\nb")]);

        let err = lex_error("a = b\nAND c = #");
        assert_eq!(err.position(), Some(Position::new(2, 9)));
    }

    #[test]
    fn test_reserved_characters() {
        for c in RESERVED_CHARS {
            let input = format!("a = b{}", c);
            let err = lex_error(&input);
            assert_eq!(err.syntax_kind(), Some(SyntaxErrorKind::ReservedCharacter), "{}", input);
            assert_eq!(err.position(), Some(Position::new(1, 6)));
        }
        // 引号内允许出现保留字符
        assert_eq!(kinds("'{}*/%+^$#@?;'"), vec![quoted("{}*/%+^$#@?;")]);
        assert_eq!(
            lex_error("a = #").to_string(),
            "The character '#' is a reserved JQL character. You must enclose it in a string or use \
             the escape '\\u0023' instead. (line 1, character 5)"
        );
    }

    #[test]
    fn test_illegal_characters() {
        let err = lex_error("a = b\u{0007}");
        assert_eq!(err.syntax_kind(), Some(SyntaxErrorKind::IllegalCharacter));
        assert!(err.to_string().starts_with("The character 'U+0007' is not valid"));

        let err = lex_error("a = 'b\tc'");
        assert!(err.to_string().contains("'TAB'"));
        assert!(err.to_string().contains("'\\t'"));

        let err = lex_error("a = '\u{ffff}'");
        assert!(err.to_string().contains("'U+FFFF'"));

        // 引号外的 TAB 是普通空白
        assert_eq!(kinds("a\t=\tb"), vec![word("a"), TokenKind::Eq, word("b")]);
    }

    #[test]
    fn test_reserved_words() {
        let err = lex_error("pri notin (x)");
        assert_eq!(err.syntax_kind(), Some(SyntaxErrorKind::ReservedWord));
        assert_eq!(
            err.to_string(),
            "'notin' is a reserved JQL word. You must surround it in quotation marks to use it in \
             a query. (line 1, character 5)"
        );
        assert_eq!(kinds("'select'"), vec![quoted("select")]);
    }

    #[test]
    fn test_restartable() {
        let lexer = Lexer::new("a = b");
        let first: Vec<_> = lexer.clone().map(|t| t.unwrap().kind).collect();
        let second: Vec<_> = lexer.map(|t| t.unwrap().kind).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_quoting_for_output() {
        assert!(!needs_quotes("Open"));
        assert!(needs_quotes("In Progress"));
        assert!(needs_quotes(""));
        assert!(needs_quotes("123"));
        assert!(needs_quotes("and"));
        assert!(needs_quotes("select"));
        assert!(needs_quotes("a#b"));
        assert_eq!(quote("say \"hi\"\n"), r#""say \"hi\"\n""#);
        assert_eq!(quote_if_needed("one-1"), "one-1");
    }
}
