//! Expression language shared by the bundled backends
//!
//! A small, debugger-flavoured subset of C expressions:
//!
//! ```text
//! expr    := '*' expr | '(' type ')' expr | postfix
//! postfix := primary ( '[' int ']' | '.' name | '->' name )*
//! primary := number | name | '$' name | '(' expr ')'
//! type    := name+ '*'*
//! ```
//!
//! Numbers are `VALUE`s; decimal or `0x` hex. A parenthesized type is a cast
//! only when something that can start an expression follows the closing
//! parenthesis, so `(x)[0]` indexes and `(VALUE *)0x10` casts.

use crate::backend::{Backend, Field, TargetValue};
use crate::error::EvalError;

/// Parsed expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Integer literal
    Number(u64),

    /// Symbol or convenience variable (`$name` keeps its `$`)
    Symbol(String),

    /// `*expr`
    Deref(Box<Expr>),

    /// `(type) expr`
    Cast {
        /// Type spelling, e.g. `struct RString *`
        ty: String,
        /// Operand
        expr: Box<Expr>,
    },

    /// `expr[index]`
    Index(Box<Expr>, i64),

    /// `expr.field` or `expr->field`
    Member {
        /// Operand
        base: Box<Expr>,
        /// Member name, possibly dotted into nested unions
        field: String,
        /// Written with `->`
        arrow: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(u64),
    Name(String),
    Star,
    Minus,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Arrow,
}

impl Token {
    fn starts_expr(&self) -> bool {
        matches!(
            self,
            Token::Number(_) | Token::Name(_) | Token::Star | Token::LParen
        )
    }
}

fn syntax(expression: &str, message: impl Into<String>) -> EvalError {
    EvalError::Syntax {
        expression: expression.to_string(),
        message: message.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(parse_number(source, &source[start..end])?));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut end = start + c.len_utf8();
                chars.next();
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Name(source[start..end].to_string()));
            }
            '-' => {
                chars.next();
                if chars.peek().map(|&(_, c)| c) == Some('>') {
                    chars.next();
                    tokens.push(Token::Arrow);
                } else {
                    tokens.push(Token::Minus);
                }
            }
            _ => {
                chars.next();
                tokens.push(match c {
                    '*' => Token::Star,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '.' => Token::Dot,
                    other => return Err(syntax(source, format!("unexpected character '{}'", other))),
                });
            }
        }
    }
    Ok(tokens)
}

fn parse_number(source: &str, text: &str) -> Result<u64, EvalError> {
    let cleaned = text.replace('_', "");
    let parsed = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse::<u64>(),
    };
    parsed.map_err(|_| syntax(source, format!("invalid number '{}'", text)))
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), EvalError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            _ => Err(syntax(self.source, format!("expected {}", what))),
        }
    }

    fn name(&mut self) -> Result<String, EvalError> {
        match self.next() {
            Some(Token::Name(name)) if !name.starts_with('$') => Ok(name),
            _ => Err(syntax(self.source, "expected member name")),
        }
    }

    fn expr(&mut self) -> Result<Expr, EvalError> {
        match self.peek() {
            Some(Token::Star) => {
                self.next();
                Ok(Expr::Deref(Box::new(self.expr()?)))
            }
            Some(Token::LParen) => match self.cast_type() {
                Some((ty, len)) => {
                    self.pos += len;
                    Ok(Expr::Cast {
                        ty,
                        expr: Box::new(self.expr()?),
                    })
                }
                None => self.postfix(),
            },
            _ => self.postfix(),
        }
    }

    /// If the tokens at the cursor are `( type )` followed by an operand,
    /// the type spelling and the number of tokens it spans.
    fn cast_type(&self) -> Option<(String, usize)> {
        let mut words = Vec::new();
        let mut stars = 0;
        let mut offset = 1;
        loop {
            match self.peek_at(offset)? {
                Token::Name(name) if stars == 0 && !name.starts_with('$') => words.push(name.clone()),
                Token::Star => stars += 1,
                Token::RParen => break,
                _ => return None,
            }
            offset += 1;
        }
        if words.is_empty() || !self.peek_at(offset + 1)?.starts_expr() {
            return None;
        }
        let mut ty = words.join(" ");
        if stars > 0 {
            ty.push(' ');
            ty.push_str(&"*".repeat(stars));
        }
        Some((ty, offset + 1))
    }

    fn postfix(&mut self) -> Result<Expr, EvalError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::LBracket) => {
                    self.next();
                    let negative = if self.peek() == Some(&Token::Minus) {
                        self.next();
                        true
                    } else {
                        false
                    };
                    let index = match self.next() {
                        Some(Token::Number(n)) => i64::try_from(n)
                            .map_err(|_| syntax(self.source, "index out of range"))?,
                        _ => return Err(syntax(self.source, "expected index")),
                    };
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), if negative { -index } else { index });
                }
                Some(Token::Dot) | Some(Token::Arrow) => {
                    let arrow = self.next() == Some(Token::Arrow);
                    let field = self.name()?;
                    expr = Expr::Member {
                        base: Box::new(expr),
                        field,
                        arrow,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Name(name)) => Ok(Expr::Symbol(name)),
            Some(Token::LParen) => {
                let expr = self.expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            Some(token) => Err(syntax(self.source, format!("unexpected token {:?}", token))),
            None => Err(syntax(self.source, "unexpected end of expression")),
        }
    }
}

/// Parse an expression.
pub fn parse(source: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(syntax(source, "empty expression"));
    }
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let expr = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(syntax(source, "trailing input"));
    }
    Ok(expr)
}

/// Evaluate a parsed expression.
///
/// `symbols` resolves names; the typed operations go through the backend.
pub fn evaluate(
    expr: &Expr,
    backend: &dyn Backend,
    symbols: &dyn Fn(&str) -> Result<TargetValue, EvalError>,
) -> Result<TargetValue, EvalError> {
    match expr {
        Expr::Number(n) => Ok(TargetValue::scalar(backend.lookup_type("VALUE")?, *n)),
        Expr::Symbol(name) => symbols(name),
        Expr::Deref(inner) => backend.dereference(&evaluate(inner, backend, symbols)?),
        Expr::Cast { ty, expr } => {
            let value = evaluate(expr, backend, symbols)?;
            backend.cast(&value, &backend.lookup_type(ty)?)
        }
        Expr::Index(base, index) => {
            let value = evaluate(base, backend, symbols)?;
            backend.field_access(&value, Field::Index(*index))
        }
        Expr::Member { base, field, arrow } => {
            // `p->as.heap.ptr` names one flattened member, not three.
            if let (false, Expr::Member { base: inner, field: outer, arrow: inner_arrow }) =
                (*arrow, base.as_ref())
            {
                let joined = Expr::Member {
                    base: inner.clone(),
                    field: format!("{}.{}", outer, field),
                    arrow: *inner_arrow,
                };
                match evaluate(&joined, backend, symbols) {
                    Err(EvalError::UnknownField { .. }) => {}
                    other => return other,
                }
            }
            let value = evaluate(base, backend, symbols)?;
            if *arrow {
                backend.dereference(&value)?.member(field)
            } else {
                backend.field_access(&value, Field::Name(field))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Box<Expr> {
        Box::new(Expr::Symbol(name.to_string()))
    }

    #[test]
    fn test_parse_number_forms() {
        assert_eq!(parse("42").unwrap(), Expr::Number(42));
        assert_eq!(parse("0x2a").unwrap(), Expr::Number(42));
        assert_eq!(parse("0x7f00_0000").unwrap(), Expr::Number(0x7f00_0000));
    }

    #[test]
    fn test_parse_postfix_chain() {
        assert_eq!(
            parse("$ec->cfp->sp[-1]").unwrap(),
            Expr::Index(
                Box::new(Expr::Member {
                    base: Box::new(Expr::Member {
                        base: sym("$ec"),
                        field: "cfp".to_string(),
                        arrow: true,
                    }),
                    field: "sp".to_string(),
                    arrow: true,
                }),
                -1
            )
        );
    }

    #[test]
    fn test_parse_cast() {
        assert_eq!(
            parse("(struct RString *)0x1000").unwrap(),
            Expr::Cast {
                ty: "struct RString *".to_string(),
                expr: Box::new(Expr::Number(0x1000)),
            }
        );
    }

    #[test]
    fn test_parenthesized_name_is_not_cast() {
        assert_eq!(
            parse("(ary)[2]").unwrap(),
            Expr::Index(sym("ary"), 2)
        );
    }

    #[test]
    fn test_deref_cast() {
        assert_eq!(
            parse("*(VALUE *)16").unwrap(),
            Expr::Deref(Box::new(Expr::Cast {
                ty: "VALUE *".to_string(),
                expr: Box::new(Expr::Number(16)),
            }))
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(parse(""), Err(EvalError::Syntax { .. })));
        assert!(matches!(parse("a["), Err(EvalError::Syntax { .. })));
        assert!(matches!(parse("a b"), Err(EvalError::Syntax { .. })));
        assert!(matches!(parse("a + b"), Err(EvalError::Syntax { .. })));
        assert!(matches!(parse("0xzz"), Err(EvalError::Syntax { .. })));
    }
}
