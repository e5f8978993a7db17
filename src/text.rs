//! 全文检索: 分词与 `~` 运算符的文本查询语法
//!
//! 支持词项, 引号短语, `+`/`-` 修饰, `AND`/`OR`/`NOT`, 括号分组以及
//! 结尾的 `*` 前缀通配. 不计算相关度, 只判断是否命中.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref RANGE: Regex = Regex::new(r"[\[{][^\]}]*\bTO\b[^\]}]*[\]}]").unwrap();
}

/// 把文本切分为小写词项, 非字母数字字符作为分隔符
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextQuery {
    Term(String),
    /// `abc*`
    Prefix(String),
    /// 含有中间通配符 `*` 或 `?` 的词项
    Wildcard(String),
    /// 连续出现的词项; 为空时不命中任何文本
    Phrase(Vec<String>),
    And(Vec<TextQuery>),
    Or(Vec<TextQuery>),
    Not(Box<TextQuery>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextQueryError {
    Empty,
    InvalidStart,
    Range,
    Unparsable,
}

impl TextQuery {
    pub fn parse(input: &str) -> Result<TextQuery, TextQueryError> {
        if input.trim().is_empty() {
            return Err(TextQueryError::Empty);
        }
        if RANGE.is_match(input) {
            return Err(TextQueryError::Range);
        }
        let items = lex(input)?;
        let mut parser = TextParser { items: &items, position: 0 };
        let query = parser.parse_or()?;
        if parser.position < items.len() {
            return Err(TextQueryError::Unparsable);
        }
        Ok(query)
    }

    /// 判断一段已分词的文本是否命中
    pub fn matches(&self, tokens: &[String]) -> bool {
        match self {
            TextQuery::Term(term) => tokens.iter().any(|t| t == term),
            TextQuery::Prefix(stem) => tokens.iter().any(|t| t.starts_with(stem.as_str())),
            TextQuery::Wildcard(pattern) => tokens.iter().any(|t| glob_match(pattern, t)),
            TextQuery::Phrase(words) => {
                !words.is_empty() && tokens.windows(words.len()).any(|w| w == words.as_slice())
            }
            TextQuery::And(children) => children.iter().all(|c| c.matches(tokens)),
            TextQuery::Or(children) => children.iter().any(|c| c.matches(tokens)),
            TextQuery::Not(child) => !child.matches(tokens),
        }
    }

    /// 查询中必须出现的某个词项, 用于从倒排表预筛选候选文档
    pub fn required_term(&self) -> Option<&str> {
        match self {
            TextQuery::Term(term) => Some(term),
            TextQuery::Phrase(words) => words.first().map(|w| w.as_str()),
            TextQuery::And(children) => children.iter().find_map(|c| c.required_term()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Word(String),
    Phrase(String),
    And,
    Or,
    Not,
    Required,
    Open,
    Close,
}

fn lex(input: &str) -> Result<Vec<Item>, TextQueryError> {
    let chars: Vec<char> = input.chars().collect();
    let mut items = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '"' => {
                let end = chars[i + 1..].iter().position(|&c| c == '"').ok_or(TextQueryError::Unparsable)?;
                items.push(Item::Phrase(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '(' => {
                items.push(Item::Open);
                i += 1;
            }
            ')' => {
                items.push(Item::Close);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                items.push(Item::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                items.push(Item::Or);
                i += 2;
            }
            '+' | '-' | '!' => {
                // 修饰符必须紧贴后面的词项
                match chars.get(i + 1) {
                    Some(next) if !next.is_whitespace() => {
                        items.push(if c == '+' { Item::Required } else { Item::Not });
                        i += 1;
                    }
                    _ => return Err(TextQueryError::Unparsable),
                }
            }
            _ => {
                let start = i;
                while i < chars.len() && !chars[i].is_whitespace() && !matches!(chars[i], '"' | '(' | ')') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                items.push(match word.as_str() {
                    "AND" => Item::And,
                    "OR" => Item::Or,
                    "NOT" => Item::Not,
                    _ => Item::Word(word),
                });
            }
        }
    }
    Ok(items)
}

struct TextParser<'a> {
    items: &'a [Item],
    position: usize,
}

impl<'a> TextParser<'a> {
    fn peek(&self) -> Option<&'a Item> {
        self.items.get(self.position)
    }

    fn parse_or(&mut self) -> Result<TextQuery, TextQueryError> {
        let mut children = vec![self.parse_and()?];
        while self.peek() == Some(&Item::Or) {
            self.position += 1;
            children.push(self.parse_and()?);
        }
        Ok(if children.len() == 1 { children.remove(0) } else { TextQuery::Or(children) })
    }

    fn parse_and(&mut self) -> Result<TextQuery, TextQueryError> {
        let mut children = vec![self.parse_unary()?];
        loop {
            match self.peek() {
                Some(Item::And) => {
                    self.position += 1;
                    children.push(self.parse_unary()?);
                }
                Some(Item::Or) | Some(Item::Close) | None => break,
                Some(_) => children.push(self.parse_unary()?),
            }
        }
        Ok(if children.len() == 1 { children.remove(0) } else { TextQuery::And(children) })
    }

    fn parse_unary(&mut self) -> Result<TextQuery, TextQueryError> {
        match self.peek() {
            Some(Item::Not) => {
                self.position += 1;
                Ok(TextQuery::Not(Box::new(self.parse_unary()?)))
            }
            Some(Item::Required) => {
                self.position += 1;
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<TextQuery, TextQueryError> {
        let item = self.peek().ok_or(TextQueryError::Unparsable)?;
        self.position += 1;
        match item {
            Item::Open => {
                let inner = self.parse_or()?;
                if self.peek() != Some(&Item::Close) {
                    return Err(TextQueryError::Unparsable);
                }
                self.position += 1;
                Ok(inner)
            }
            Item::Phrase(text) => Ok(TextQuery::Phrase(tokenize(text))),
            Item::Word(word) => word_query(word),
            _ => Err(TextQueryError::Unparsable),
        }
    }
}

fn word_query(word: &str) -> Result<TextQuery, TextQueryError> {
    if word.starts_with('*') || word.starts_with('?') {
        return Err(TextQueryError::InvalidStart);
    }
    let lower = word.to_lowercase();
    if let Some(stem) = lower.strip_suffix('*') {
        if !stem.contains(['*', '?']) && stem.chars().all(char::is_alphanumeric) {
            return Ok(TextQuery::Prefix(stem.to_string()));
        }
    }
    if lower.contains(['*', '?']) {
        return Ok(TextQuery::Wildcard(lower));
    }
    let mut tokens = tokenize(word);
    Ok(if tokens.len() == 1 { TextQuery::Term(tokens.remove(0)) } else { TextQuery::Phrase(tokens) })
}

/// `*` 匹配任意个字符, `?` 匹配单个字符
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}
