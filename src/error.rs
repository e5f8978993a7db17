//! 错误与消息定义
//!
//! 语法阶段 (词法/语法分析) 的错误立即中止, 通过 [`JqlError`] 返回;
//! 语义校验阶段会累积多条 [`Message`], 汇总为 [`MessageSet`].

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, JqlError>;

/// 1-based position of a token in the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

impl Position {
    pub fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(line {}, character {})", self.line, self.character)
    }
}

fn position_suffix(position: &Option<Position>) -> String {
    match position {
        Some(p) => format!(" {}", p),
        None => String::new(),
    }
}

/// 语法错误的种类, 便于调用方按类型区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SyntaxErrorKind {
    UnfinishedString,
    IllegalEscape,
    ReservedCharacter,
    IllegalCharacter,
    ReservedWord,
    IllegalNumber,
    BadFieldName,
    BadCustomFieldId,
    BadOperator,
    BadOperand,
    BadFunctionArgument,
    NeedLogicalOperator,
    ExpectedText,
    BadSortOrder,
    EmptyFieldName,
    EmptyFunctionName,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JqlError {
    #[error("{message}{}", position_suffix(.position))]
    Lex {
        kind: SyntaxErrorKind,
        message: String,
        position: Option<Position>,
    },
    #[error("{message}{}", position_suffix(.position))]
    Parse {
        kind: SyntaxErrorKind,
        message: String,
        position: Option<Position>,
    },
    /// 语义校验失败, 查询不会被执行
    #[error("{0}")]
    Rejected(MessageSet),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl JqlError {
    pub(crate) fn lex(kind: SyntaxErrorKind, message: String, position: Position) -> Self {
        JqlError::Lex { kind, message, position: Some(position) }
    }

    pub(crate) fn parse(kind: SyntaxErrorKind, message: String, position: Option<Position>) -> Self {
        JqlError::Parse { kind, message, position }
    }

    /// HTTP status the REST layer answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            JqlError::Lex { .. } | JqlError::Parse { .. } | JqlError::Rejected(_) => 400,
            JqlError::Config(_) => 500,
        }
    }

    pub fn syntax_kind(&self) -> Option<SyntaxErrorKind> {
        match self {
            JqlError::Lex { kind, .. } | JqlError::Parse { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            JqlError::Lex { position, .. } | JqlError::Parse { position, .. } => *position,
            _ => None,
        }
    }

    /// All user facing error lines, in reporting order.
    pub fn messages(&self) -> Vec<String> {
        match self {
            JqlError::Rejected(set) => set.errors().iter().map(|m| m.text.clone()).collect(),
            other => vec![other.to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

/// 语义消息的稳定类型标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MessageKind {
    FieldNotFound,
    FieldNotSortable,
    HistoryNotSupported,
    OperatorNotSupported,
    OperandNotSupported,
    EmptyNotSupported,
    EmptyStringNotSupported,
    ValueNotFound,
    IdNotFound,
    InvalidValue,
    InvalidTextQuery,
    FunctionNotFound,
    FunctionArity,
    FunctionArgument,
    TooComplex,
}

impl MessageKind {
    /// Kinds that a stored query reports as warnings until it is run again.
    pub fn downgrades_when_stored(&self) -> bool {
        matches!(
            self,
            MessageKind::FieldNotFound | MessageKind::ValueNotFound | MessageKind::IdNotFound
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Message {
    pub severity: Severity,
    pub kind: MessageKind,
    pub text: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// 有序且去重的错误/警告集合
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessageSet {
    errors: Vec<Message>,
    warnings: Vec<Message>,
}

impl MessageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, kind: MessageKind, text: impl Into<String>) {
        self.add(Message { severity: Severity::Error, kind, text: text.into() });
    }

    pub fn add_warning(&mut self, kind: MessageKind, text: impl Into<String>) {
        self.add(Message { severity: Severity::Warning, kind, text: text.into() });
    }

    pub fn add(&mut self, message: Message) {
        let bucket = match message.severity {
            Severity::Error => &mut self.errors,
            Severity::Warning => &mut self.warnings,
        };
        if !bucket.iter().any(|m| m.text == message.text) {
            bucket.push(message);
        }
    }

    pub fn add_all(&mut self, other: MessageSet) {
        for m in other.errors.into_iter().chain(other.warnings) {
            self.add(m);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn errors(&self) -> &[Message] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Message] {
        &self.warnings
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn error_texts(&self) -> Vec<&str> {
        self.errors.iter().map(|m| m.text.as_str()).collect()
    }

    pub fn warning_texts(&self) -> Vec<&str> {
        self.warnings.iter().map(|m| m.text.as_str()).collect()
    }

    pub fn truncate_errors(&mut self, max: usize) {
        self.errors.truncate(max);
    }

    /// 已保存的查询加载时, 将"不存在"一类错误降级为警告
    pub fn downgraded_for_stored_query(self) -> MessageSet {
        let mut result = MessageSet::new();
        for mut m in self.errors {
            if m.kind.downgrades_when_stored() {
                m.severity = Severity::Warning;
            }
            result.add(m);
        }
        for m in self.warnings {
            result.add(m);
        }
        result
    }
}

impl fmt::Display for MessageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<&str> = self.error_texts();
        f.write_str(&lines.join("\n"))
    }
}

/// Printable form of a character inside an error message.
pub fn display_char(c: char) -> String {
    if c == '\t' {
        "TAB".to_string()
    } else if c.is_control() || c.is_whitespace() || is_noncharacter(c) {
        format!("U+{:04X}", c as u32)
    } else {
        c.to_string()
    }
}

/// The escape sequence a user could type instead of the raw character.
pub fn escape_char(c: char) -> String {
    match c {
        '\t' => "\\t".to_string(),
        '\n' => "\\n".to_string(),
        '\r' => "\\r".to_string(),
        _ => format!("\\u{:04x}", c as u32),
    }
}

fn is_noncharacter(c: char) -> bool {
    matches!(c as u32, 0xFDD0..=0xFDEF | 0xFFFE | 0xFFFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_suffix_in_display() {
        let err = JqlError::lex(
            SyntaxErrorKind::UnfinishedString,
            "The quoted string 'test' has not been completed.".to_string(),
            Position::new(1, 11),
        );
        assert_eq!(
            err.to_string(),
            "The quoted string 'test' has not been completed. (line 1, character 11)"
        );
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_message_set_deduplicates() {
        let mut set = MessageSet::new();
        set.add_error(MessageKind::FieldNotFound, "a");
        set.add_error(MessageKind::FieldNotFound, "a");
        set.add_warning(MessageKind::ValueNotFound, "b");
        assert_eq!(set.error_count(), 1);
        assert_eq!(set.warning_texts(), vec!["b"]);
    }

    #[test]
    fn test_stored_query_downgrade() {
        let mut set = MessageSet::new();
        set.add_error(MessageKind::FieldNotFound, "gone");
        set.add_error(MessageKind::InvalidValue, "bad date");
        let set = set.downgraded_for_stored_query();
        assert_eq!(set.error_texts(), vec!["bad date"]);
        assert_eq!(set.warning_texts(), vec!["gone"]);
    }

    #[test]
    fn test_char_display() {
        assert_eq!(display_char('a'), "a");
        assert_eq!(display_char('\t'), "TAB");
        assert_eq!(display_char('\n'), "U+000A");
        assert_eq!(display_char('\u{ffff}'), "U+FFFF");
        assert_eq!(escape_char('a'), "\\u0061");
        assert_eq!(escape_char('\n'), "\\n");
        assert_eq!(escape_char('\u{ffff}'), "\\uffff");
    }
}
