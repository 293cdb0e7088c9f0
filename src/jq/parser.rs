use serde_json::{Number, Value};

use super::JqError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Filter {
    Identity,
    Literal(Value),
    Field {
        target: Box<Filter>,
        name: String,
    },
    Index {
        target: Box<Filter>,
        index: Box<Filter>,
    },
    Iterate(Box<Filter>),
    /// `f?`: errors raised by `f` produce no output.
    Try(Box<Filter>),
    Pipe(Box<Filter>, Box<Filter>),
    Comma(Box<Filter>, Box<Filter>),
    Compare(CompareOp, Box<Filter>, Box<Filter>),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Call(String, Vec<Filter>),
    Array(Option<Box<Filter>>),
    Object(Vec<(ObjectKey, Filter)>),
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum ObjectKey {
    Literal(String),
    Computed(Filter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Dot,
    Ident(String),
    Str(String),
    Num(Value),
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Pipe,
    Comma,
    Colon,
    Semicolon,
    Question,
    Compare(CompareOp),
}

fn lex(source: &str) -> Result<Vec<Token>, JqError> {
    let chars = source.chars().collect::<Vec<_>>();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        let next = chars.get(pos + 1).copied();
        match c {
            ' ' | '\t' | '\n' | '\r' => pos += 1,
            '#' => {
                while pos < chars.len() && chars[pos] != '\n' {
                    pos += 1;
                }
            }
            '.' if next == Some('.') => {
                return Err(JqError::Compile(
                    "recursive descent `..` is not supported".to_string(),
                ));
            }
            '.' => {
                tokens.push(Token::Dot);
                pos += 1;
            }
            '[' => push(&mut tokens, &mut pos, Token::LBracket),
            ']' => push(&mut tokens, &mut pos, Token::RBracket),
            '(' => push(&mut tokens, &mut pos, Token::LParen),
            ')' => push(&mut tokens, &mut pos, Token::RParen),
            '{' => push(&mut tokens, &mut pos, Token::LBrace),
            '}' => push(&mut tokens, &mut pos, Token::RBrace),
            '|' => push(&mut tokens, &mut pos, Token::Pipe),
            ',' => push(&mut tokens, &mut pos, Token::Comma),
            ':' => push(&mut tokens, &mut pos, Token::Colon),
            ';' => push(&mut tokens, &mut pos, Token::Semicolon),
            '?' => push(&mut tokens, &mut pos, Token::Question),
            '=' if next == Some('=') => {
                tokens.push(Token::Compare(CompareOp::Eq));
                pos += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Compare(CompareOp::Ne));
                pos += 2;
            }
            '<' | '>' => {
                let op = match (c, next == Some('=')) {
                    ('<', true) => CompareOp::Le,
                    ('<', false) => CompareOp::Lt,
                    (_, true) => CompareOp::Ge,
                    (_, false) => CompareOp::Gt,
                };
                tokens.push(Token::Compare(op));
                pos += if next == Some('=') { 2 } else { 1 };
            }
            '"' => {
                let (text, end) = lex_string(&chars, pos + 1)?;
                tokens.push(Token::Str(text));
                pos = end;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = pos;
                pos += 1;
                while pos < chars.len()
                    && (chars[pos].is_ascii_digit()
                        || chars[pos] == '.'
                        || chars[pos] == 'e'
                        || chars[pos] == 'E'
                        || ((chars[pos] == '-' || chars[pos] == '+')
                            && matches!(chars[pos - 1], 'e' | 'E')))
                {
                    pos += 1;
                }
                let raw = chars[start..pos].iter().collect::<String>();
                tokens.push(Token::Num(number(&raw)?));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_ascii_alphanumeric() || chars[pos] == '_')
                {
                    pos += 1;
                }
                tokens.push(Token::Ident(chars[start..pos].iter().collect()));
            }
            other => {
                return Err(JqError::Compile(format!(
                    "unexpected character '{other}' at position {pos}"
                )));
            }
        }
    }

    Ok(tokens)
}

fn push(tokens: &mut Vec<Token>, pos: &mut usize, token: Token) {
    tokens.push(token);
    *pos += 1;
}

fn lex_string(chars: &[char], mut pos: usize) -> Result<(String, usize), JqError> {
    let mut text = String::new();
    while pos < chars.len() {
        match chars[pos] {
            '"' => return Ok((text, pos + 1)),
            '\\' => {
                let escaped = chars
                    .get(pos + 1)
                    .ok_or_else(|| JqError::Compile("unterminated string".to_string()))?;
                match escaped {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    '"' | '\\' | '/' => text.push(*escaped),
                    'u' => {
                        let hex = chars
                            .get(pos + 2..pos + 6)
                            .map(|digits| digits.iter().collect::<String>())
                            .ok_or_else(|| JqError::Compile("invalid \\u escape".to_string()))?;
                        let decoded = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| JqError::Compile(format!("invalid \\u{hex} escape")))?;
                        text.push(decoded);
                        pos += 4;
                    }
                    '(' => {
                        return Err(JqError::Compile(
                            "string interpolation is not supported".to_string(),
                        ));
                    }
                    other => {
                        return Err(JqError::Compile(format!("invalid escape \\{other}")));
                    }
                }
                pos += 2;
            }
            c => {
                text.push(c);
                pos += 1;
            }
        }
    }
    Err(JqError::Compile("unterminated string".to_string()))
}

fn number(raw: &str) -> Result<Value, JqError> {
    if let Ok(integer) = raw.parse::<i64>() {
        return Ok(Value::from(integer));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| JqError::Compile(format!("invalid number {raw}")))
}

pub(super) fn parse(source: &str) -> Result<Filter, JqError> {
    let tokens = lex(source)?;
    if tokens.is_empty() {
        return Err(JqError::Compile("empty query".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let filter = parser.pipe()?;
    match parser.peek() {
        None => Ok(filter),
        Some(token) => Err(JqError::Compile(format!("unexpected token {token:?}"))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), JqError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(JqError::Compile(format!(
                "expected {expected:?}, found {:?}",
                self.peek()
            )))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// `a | b`, right associative and loosest.
    fn pipe(&mut self) -> Result<Filter, JqError> {
        let left = self.comma()?;
        if self.eat(&Token::Pipe) {
            let right = self.pipe()?;
            return Ok(Filter::Pipe(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn comma(&mut self) -> Result<Filter, JqError> {
        let mut left = self.or()?;
        while self.eat(&Token::Comma) {
            let right = self.or()?;
            left = Filter::Comma(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn or(&mut self) -> Result<Filter, JqError> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            let right = self.and()?;
            left = Filter::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Filter, JqError> {
        let mut left = self.comparison()?;
        while self.eat_keyword("and") {
            let right = self.comparison()?;
            left = Filter::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Filter, JqError> {
        let left = self.postfix()?;
        if let Some(Token::Compare(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.postfix()?;
            if matches!(self.peek(), Some(Token::Compare(_))) {
                return Err(JqError::Compile(
                    "comparison operators are not associative".to_string(),
                ));
            }
            return Ok(Filter::Compare(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn postfix(&mut self) -> Result<Filter, JqError> {
        let mut filter = self.term()?;
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(Token::Dot), Some(Token::Ident(_) | Token::Str(_) | Token::LBracket)) => {
                    self.pos += 1;
                    filter = self.suffix(filter)?;
                }
                (Some(Token::LBracket), _) => filter = self.suffix(filter)?,
                (Some(Token::Question), _) => {
                    self.pos += 1;
                    filter = Filter::Try(Box::new(filter));
                }
                _ => return Ok(filter),
            }
        }
    }

    /// A field name, string key, or bracket suffix applied to `target`.
    fn suffix(&mut self, target: Filter) -> Result<Filter, JqError> {
        match self.advance() {
            Some(Token::Ident(name) | Token::Str(name)) => Ok(Filter::Field {
                target: Box::new(target),
                name,
            }),
            Some(Token::LBracket) => {
                if self.eat(&Token::RBracket) {
                    return Ok(Filter::Iterate(Box::new(target)));
                }
                let index = self.pipe()?;
                self.expect(&Token::RBracket)?;
                Ok(Filter::Index {
                    target: Box::new(target),
                    index: Box::new(index),
                })
            }
            other => Err(JqError::Compile(format!("unexpected token {other:?}"))),
        }
    }

    fn term(&mut self) -> Result<Filter, JqError> {
        match self.advance() {
            Some(Token::Dot) => match self.peek() {
                Some(Token::Ident(_) | Token::Str(_) | Token::LBracket) => {
                    self.suffix(Filter::Identity)
                }
                _ => Ok(Filter::Identity),
            },
            Some(Token::Num(value)) => Ok(Filter::Literal(value)),
            Some(Token::Str(text)) => Ok(Filter::Literal(Value::String(text))),
            Some(Token::LParen) => {
                let inner = self.pipe()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                if self.eat(&Token::RBracket) {
                    return Ok(Filter::Array(None));
                }
                let inner = self.pipe()?;
                self.expect(&Token::RBracket)?;
                Ok(Filter::Array(Some(Box::new(inner))))
            }
            Some(Token::LBrace) => self.object(),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Filter::Literal(Value::Bool(true))),
                "false" => Ok(Filter::Literal(Value::Bool(false))),
                "null" => Ok(Filter::Literal(Value::Null)),
                _ => self.call(name),
            },
            other => Err(JqError::Compile(format!("unexpected token {other:?}"))),
        }
    }

    fn call(&mut self, name: String) -> Result<Filter, JqError> {
        let mut args = Vec::new();
        if self.eat(&Token::LParen) {
            loop {
                args.push(self.pipe()?);
                if self.eat(&Token::Semicolon) {
                    continue;
                }
                self.expect(&Token::RParen)?;
                break;
            }
        }

        let arity_ok = match name.as_str() {
            "length" | "keys" | "empty" | "not" | "halt" => args.is_empty(),
            "select" | "map" => args.len() == 1,
            "halt_error" => args.len() <= 1,
            _ => {
                return Err(JqError::Compile(format!(
                    "{name}/{} is not defined",
                    args.len()
                )));
            }
        };
        if !arity_ok {
            return Err(JqError::Compile(format!(
                "{name}/{} is not defined",
                args.len()
            )));
        }
        Ok(Filter::Call(name, args))
    }

    fn object(&mut self) -> Result<Filter, JqError> {
        let mut entries = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(Filter::Object(entries));
        }
        loop {
            let key = match self.advance() {
                Some(Token::Ident(name) | Token::Str(name)) => ObjectKey::Literal(name),
                Some(Token::LParen) => {
                    let computed = self.pipe()?;
                    self.expect(&Token::RParen)?;
                    ObjectKey::Computed(computed)
                }
                other => {
                    return Err(JqError::Compile(format!(
                        "unexpected object key {other:?}"
                    )));
                }
            };

            let value = if self.eat(&Token::Colon) {
                self.object_value()?
            } else {
                match &key {
                    ObjectKey::Literal(name) => Filter::Field {
                        target: Box::new(Filter::Identity),
                        name: name.clone(),
                    },
                    ObjectKey::Computed(_) => {
                        return Err(JqError::Compile(
                            "computed object keys need a value".to_string(),
                        ));
                    }
                }
            };
            entries.push((key, value));

            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(&Token::RBrace)?;
            return Ok(Filter::Object(entries));
        }
    }

    /// Object values may pipe but not use a bare comma.
    fn object_value(&mut self) -> Result<Filter, JqError> {
        let left = self.or()?;
        if self.eat(&Token::Pipe) {
            let right = self.object_value()?;
            return Ok(Filter::Pipe(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }
}
