//! Recursive-descent parser for template expressions.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr       := ternary ( "||" ternary )*
//! ternary    := comparison ( "?" expr ":" expr )?
//! comparison := unary ( cmp-op unary )?
//! unary      := "!" unary | primary
//! primary    := string | number | true | false | null
//!             | json-literal | string-list
//!             | path ( "+" integer )? | "(" expr ")"
//! path       := ident ( "." ( ident | integer ) )*
//! ```

use serde_json::Value;

use crate::ast::{Expr, VarPath};
use crate::error::{ExprError, Result};
use crate::lexer::{Lexer, Spanned, Token};

/// Parses an expression string into an [`Expr`].
///
/// # Errors
///
/// Returns an [`ExprError`] when the source is empty, contains characters
/// outside the grammar, or leaves trailing input.
///
/// ```rust
/// use poml_template::{parse_expression, Expr};
///
/// let expr = parse_expression("count > 3 ? 'many' : 'few'").unwrap();
/// assert!(matches!(expr, Expr::Ternary { .. }));
/// ```
pub fn parse_expression(src: &str) -> Result<Expr> {
    let tokens = Lexer::new(src).tokenize()?;
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    match parser.peek() {
        Some(extra) => Err(ExprError::TrailingInput { pos: extra.pos }),
        None => Ok(expr),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek_token() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, expected: &'static str) -> Result<()> {
        match self.advance() {
            Some(spanned) if &spanned.token == token => Ok(()),
            Some(spanned) => Err(ExprError::UnexpectedToken {
                pos: spanned.pos,
                found: spanned.token.describe(),
            }),
            None => Err(ExprError::UnexpectedEnd { expected }),
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut left = self.ternary()?;
        while self.eat(&Token::OrOr) {
            let right = self.ternary()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn ternary(&mut self) -> Result<Expr> {
        let cond = self.comparison()?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }
        let then = self.expr()?;
        self.expect(&Token::Colon, "':'")?;
        let otherwise = self.expr()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.unary()?;
        if let Some(Token::Cmp(op)) = self.peek_token() {
            let op = *op;
            self.pos += 1;
            let right = self.unary()?;
            return Ok(Expr::Compare {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Bang) {
            let inner = self.unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        let Some(spanned) = self.advance() else {
            return Err(ExprError::UnexpectedEnd {
                expected: "a value",
            });
        };

        match spanned.token {
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Int(n) => Ok(Expr::Literal(Value::from(n))),
            Token::Float(n) => Ok(Expr::Literal(
                serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            )),
            Token::Json(value) => Ok(Expr::Literal(value)),
            Token::StrList(items) => Ok(Expr::Literal(Value::Array(
                items.into_iter().map(Value::String).collect(),
            ))),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(name) => self.path_or_keyword(name),
            other => Err(ExprError::UnexpectedToken {
                pos: spanned.pos,
                found: other.describe(),
            }),
        }
    }

    fn path_or_keyword(&mut self, root: String) -> Result<Expr> {
        let is_single = self.peek_token() != Some(&Token::Dot);
        if is_single {
            match root.as_str() {
                "true" => return Ok(Expr::Literal(Value::Bool(true))),
                "false" => return Ok(Expr::Literal(Value::Bool(false))),
                "null" | "nil" => return Ok(Expr::Literal(Value::Null)),
                _ => {}
            }
        }

        let mut path = VarPath::new(root);
        while self.eat(&Token::Dot) {
            match self.advance() {
                Some(Spanned {
                    token: Token::Ident(segment),
                    ..
                }) => path.push(segment),
                Some(Spanned {
                    token: Token::Int(index),
                    ..
                }) if index >= 0 => path.push(index.to_string()),
                Some(spanned) => {
                    return Err(ExprError::UnexpectedToken {
                        pos: spanned.pos,
                        found: spanned.token.describe(),
                    })
                }
                None => {
                    return Err(ExprError::UnexpectedEnd {
                        expected: "a path segment",
                    })
                }
            }
        }

        if self.eat(&Token::Plus) {
            return match self.advance() {
                Some(Spanned {
                    token: Token::Int(by),
                    ..
                }) => Ok(Expr::Increment { path, by }),
                Some(spanned) => Err(ExprError::UnexpectedToken {
                    pos: spanned.pos,
                    found: spanned.token.describe(),
                }),
                None => Err(ExprError::UnexpectedEnd {
                    expected: "an integer",
                }),
            };
        }

        Ok(Expr::Path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CmpOp;
    use serde_json::json;

    fn path(segments: &[&str]) -> VarPath {
        let mut path = VarPath::new(segments[0].to_string());
        for segment in &segments[1..] {
            path.push(segment.to_string());
        }
        path
    }

    #[test]
    fn parse_literals() {
        assert_eq!(parse_expression("'hi'").unwrap(), Expr::Literal(json!("hi")));
        assert_eq!(parse_expression("42").unwrap(), Expr::Literal(json!(42)));
        assert_eq!(parse_expression("1.5").unwrap(), Expr::Literal(json!(1.5)));
        assert_eq!(parse_expression("true").unwrap(), Expr::Literal(json!(true)));
        assert_eq!(parse_expression("null").unwrap(), Expr::Literal(json!(null)));
    }

    #[test]
    fn parse_dotted_path() {
        assert_eq!(
            parse_expression("user.profile.name").unwrap(),
            Expr::Path(path(&["user", "profile", "name"]))
        );
        assert_eq!(
            parse_expression("items.0").unwrap(),
            Expr::Path(path(&["items", "0"]))
        );
    }

    #[test]
    fn keyword_segment_inside_path_is_a_key() {
        assert_eq!(
            parse_expression("flags.true").unwrap(),
            Expr::Path(path(&["flags", "true"]))
        );
    }

    #[test]
    fn parse_increment() {
        assert_eq!(
            parse_expression("loop.index0 + 1").unwrap(),
            Expr::Increment {
                path: path(&["loop", "index0"]),
                by: 1
            }
        );
    }

    #[test]
    fn parse_comparison() {
        assert_eq!(
            parse_expression("5 > 3").unwrap(),
            Expr::Compare {
                left: Box::new(Expr::Literal(json!(5))),
                op: CmpOp::Gt,
                right: Box::new(Expr::Literal(json!(3))),
            }
        );
    }

    #[test]
    fn or_binds_looser_than_ternary() {
        let expr = parse_expression("a || b ? c : d").unwrap();
        match expr {
            Expr::Or(left, right) => {
                assert_eq!(*left, Expr::Path(path(&["a"])));
                assert!(matches!(*right, Expr::Ternary { .. }));
            }
            other => panic!("expected Or, got {:?}", other),
        }
    }

    #[test]
    fn parse_not_and_parens() {
        let expr = parse_expression("!(a == 1)").unwrap();
        assert!(matches!(expr, Expr::Not(inner) if matches!(*inner, Expr::Compare { .. })));
    }

    #[test]
    fn parse_errors() {
        assert_eq!(parse_expression("   "), Err(ExprError::Empty));
        assert!(matches!(
            parse_expression("a b"),
            Err(ExprError::TrailingInput { pos: 2 })
        ));
        assert!(matches!(
            parse_expression("a ? b"),
            Err(ExprError::UnexpectedEnd { .. })
        ));
        assert!(matches!(
            parse_expression("a + b"),
            Err(ExprError::UnexpectedToken { .. })
        ));
    }
}
