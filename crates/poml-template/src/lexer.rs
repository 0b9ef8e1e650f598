//! Tokenizer for template expressions.

use serde_json::Value;

use crate::ast::CmpOp;
use crate::error::{ExprError, Result};

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Str(String),
    Int(i64),
    Float(f64),
    Ident(String),
    /// A JSON array or object literal, parsed eagerly.
    Json(Value),
    /// A bracketed list that is not valid JSON, e.g. `['a', 'b']`.
    StrList(Vec<String>),
    Dot,
    OrOr,
    Question,
    Colon,
    Bang,
    Plus,
    LParen,
    RParen,
    Cmp(CmpOp),
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Str(s) => format!("string '{}'", s),
            Token::Int(n) => format!("number {}", n),
            Token::Float(n) => format!("number {}", n),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Json(_) => "JSON literal".to_string(),
            Token::StrList(_) => "list literal".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::OrOr => "'||'".to_string(),
            Token::Question => "'?'".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Bang => "'!'".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Cmp(op) => format!("'{}'", op),
        }
    }
}

/// A token with its byte offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub pos: usize,
}

pub(crate) struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    /// Set right after a `.` so `items.0.1` lexes as two indices, not a float.
    after_dot: bool,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            after_dot: false,
        }
    }

    pub(crate) fn tokenize(mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();
        while let Some(spanned) = self.next_token()? {
            self.after_dot = spanned.token == Token::Dot;
            tokens.push(spanned);
        }
        Ok(tokens)
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn next_token(&mut self) -> Result<Option<Spanned>> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(ch) = self.peek_char() else {
            return Ok(None);
        };

        let token = match ch {
            '\'' | '"' => self.lex_string(ch)?,
            '[' | '{' => self.lex_bracketed(ch)?,
            '0'..='9' => self.lex_number()?,
            '-' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => self.lex_number()?,
            c if is_ident_start(c) => self.lex_ident(),
            '.' => self.single(Token::Dot),
            '?' => self.single(Token::Question),
            ':' => self.single(Token::Colon),
            '+' => self.single(Token::Plus),
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '|' if self.peek_second() == Some('|') => self.double(Token::OrOr),
            '=' if self.peek_second() == Some('=') => self.double(Token::Cmp(CmpOp::Eq)),
            '!' if self.peek_second() == Some('=') => self.double(Token::Cmp(CmpOp::Ne)),
            '!' => self.single(Token::Bang),
            '>' if self.peek_second() == Some('=') => self.double(Token::Cmp(CmpOp::Gte)),
            '<' if self.peek_second() == Some('=') => self.double(Token::Cmp(CmpOp::Lte)),
            '>' => self.single(Token::Cmp(CmpOp::Gt)),
            '<' => self.single(Token::Cmp(CmpOp::Lt)),
            other => {
                return Err(ExprError::UnexpectedChar {
                    pos: start,
                    found: other,
                })
            }
        };

        Ok(Some(Spanned { token, pos: start }))
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.pos += 1;
        token
    }

    fn double(&mut self, token: Token) -> Token {
        self.pos += 2;
        token
    }

    fn lex_string(&mut self, quote: char) -> Result<Token> {
        let start = self.pos;
        self.pos += quote.len_utf8();
        let mut out = String::new();
        let mut chars = self.src[self.pos..].char_indices();

        while let Some((offset, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                c if c == quote => {
                    self.pos += offset + c.len_utf8();
                    return Ok(Token::Str(out));
                }
                c => out.push(c),
            }
        }

        Err(ExprError::UnterminatedString { pos: start })
    }

    fn lex_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let bytes = self.src.as_bytes();
        let mut end = start;
        if bytes[end] == b'-' {
            end += 1;
        }
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }

        let is_float = !self.after_dot
            && end + 1 < bytes.len()
            && bytes[end] == b'.'
            && bytes[end + 1].is_ascii_digit();
        if is_float {
            end += 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }

        let literal = &self.src[start..end];
        self.pos = end;
        if is_float {
            literal
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|_| ExprError::InvalidNumber {
                    literal: literal.to_string(),
                })
        } else {
            literal
                .parse::<i64>()
                .map(Token::Int)
                .map_err(|_| ExprError::InvalidNumber {
                    literal: literal.to_string(),
                })
        }
    }

    fn lex_ident(&mut self) -> Token {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if !is_ident_continue(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        Token::Ident(self.src[start..self.pos].to_string())
    }

    /// Lexes `[...]` or `{...}`: JSON first, then a loose string list.
    fn lex_bracketed(&mut self, open: char) -> Result<Token> {
        let start = self.pos;
        let rest = &self.src[start..];
        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            self.pos = start + stream.byte_offset();
            return Ok(Token::Json(value));
        }

        if open != '[' {
            return Err(ExprError::UnexpectedChar {
                pos: start,
                found: open,
            });
        }

        let Some(close) = rest.find(']') else {
            return Err(ExprError::UnexpectedEnd { expected: "']'" });
        };
        let items = parse_string_list(&rest[1..close]);
        self.pos = start + close + 1;
        Ok(Token::StrList(items))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Splits a loose list body (`'a', "b", c`) into its string items.
fn parse_string_list(body: &str) -> Vec<String> {
    body.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let quoted = item.len() >= 2
                && ((item.starts_with('\'') && item.ends_with('\''))
                    || (item.starts_with('"') && item.ends_with('"')));
            if quoted {
                item[1..item.len() - 1].to_string()
            } else {
                item.to_string()
            }
        })
        .collect()
}
