//! Tokenizer and recursive-descent parser for the expression grammar.
//!
//! ```text
//! expr     := or
//! or       := and ( "||" and )*
//! and      := equality ( "&&" equality )*
//! equality := unary ( ("==" | "!=") unary )*
//! unary    := "!" unary | postfix
//! postfix  := primary ( "." ident | "[" expr "]" )*
//! primary  := number | string | true | false | null | ident | "(" expr ")"
//! ```

use serde_json::Value;

use super::ast::{BinaryOp, Expr};
use super::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(Value),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Bang,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
}

fn syntax(offset: usize, message: impl Into<String>) -> ExpressionError {
    ExpressionError::Syntax {
        offset,
        message: message.into(),
    }
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, c)| c);
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push((offset, Token::Dot));
                i += 1;
            }
            '[' => {
                tokens.push((offset, Token::LBracket));
                i += 1;
            }
            ']' => {
                tokens.push((offset, Token::RBracket));
                i += 1;
            }
            '(' => {
                tokens.push((offset, Token::LParen));
                i += 1;
            }
            ')' => {
                tokens.push((offset, Token::RParen));
                i += 1;
            }
            '!' if next == Some('=') => {
                // `!==` is accepted as `!=`
                let len = if chars.get(i + 2).map(|&(_, c)| c) == Some('=') { 3 } else { 2 };
                tokens.push((offset, Token::NotEq));
                i += len;
            }
            '!' => {
                tokens.push((offset, Token::Bang));
                i += 1;
            }
            '=' if next == Some('=') => {
                let len = if chars.get(i + 2).map(|&(_, c)| c) == Some('=') { 3 } else { 2 };
                tokens.push((offset, Token::EqEq));
                i += len;
            }
            '&' if next == Some('&') => {
                tokens.push((offset, Token::AndAnd));
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push((offset, Token::OrOr));
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        None => return Err(syntax(offset, "unterminated string literal")),
                        Some(&(_, ch)) if ch == quote => break,
                        Some(&(esc_at, '\\')) => {
                            let escaped = chars
                                .get(j + 1)
                                .map(|&(_, ch)| ch)
                                .ok_or_else(|| syntax(esc_at, "dangling escape"))?;
                            value.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                other => other,
                            });
                            j += 2;
                        }
                        Some(&(_, ch)) => {
                            value.push(ch);
                            j += 1;
                        }
                    }
                }
                tokens.push((offset, Token::Str(value)));
                i = j + 1;
            }
            c if c.is_ascii_digit() => {
                let mut j = i;
                while j < chars.len() && (chars[j].1.is_ascii_digit() || chars[j].1 == '.') {
                    j += 1;
                }
                let end = chars.get(j).map(|&(o, _)| o).unwrap_or(src.len());
                let text = &src[offset..end];
                let number: serde_json::Number = text
                    .parse()
                    .map_err(|_| syntax(offset, format!("invalid number `{text}`")))?;
                tokens.push((offset, Token::Num(Value::Number(number))));
                i = j;
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut j = i;
                while j < chars.len()
                    && (chars[j].1.is_alphanumeric() || chars[j].1 == '_' || chars[j].1 == '$')
                {
                    j += 1;
                }
                let end = chars.get(j).map(|&(o, _)| o).unwrap_or(src.len());
                tokens.push((offset, Token::Ident(src[offset..end].to_string())));
                i = j;
            }
            other => return Err(syntax(offset, format!("unexpected character `{other}`"))),
        }
    }

    Ok(tokens)
}

/// Deepest nesting of `(`, `[` and `!` a single expression may use.
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ExpressionError> {
        let offset = self.offset();
        match self.bump() {
            Some(t) if t == expected => Ok(()),
            _ => Err(syntax(offset, format!("expected {what}"))),
        }
    }

    /// Runs `f` one nesting level deeper.
    fn nested<T>(
        &mut self,
        offset: usize,
        f: impl FnOnce(&mut Self) -> Result<T, ExpressionError>,
    ) -> Result<T, ExpressionError> {
        if self.depth >= MAX_DEPTH {
            return Err(syntax(offset, format!("nesting deeper than {MAX_DEPTH} levels")));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.bump();
            let right = self.and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.equality()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.bump();
            let right = self.equality()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.unary()?;
            left = binary(op, left, right);
        }
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == Some(&Token::Bang) {
            let offset = self.offset();
            self.bump();
            let operand = self.nested(offset, Self::unary)?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.bump();
                    let offset = self.offset();
                    match self.bump() {
                        Some(Token::Ident(property)) => {
                            expr = Expr::Member {
                                object: Box::new(expr),
                                property,
                            };
                        }
                        _ => return Err(syntax(offset, "expected property name after `.`")),
                    }
                }
                Some(Token::LBracket) => {
                    let offset = self.offset();
                    self.bump();
                    let index = self.nested(offset, Self::or)?;
                    self.expect(Token::RBracket, "`]`")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Token::LParen) => return Err(ExpressionError::CallNotAllowed(self.offset())),
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let offset = self.offset();
        match self.bump() {
            Some(Token::Num(n)) => Ok(Expr::Literal(n)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" | "undefined" => Expr::Literal(Value::Null),
                _ => Expr::Identifier(name),
            }),
            Some(Token::LParen) => self.nested(offset, |p| {
                let inner = p.or()?;
                p.expect(Token::RParen, "`)`")?;
                Ok(inner)
            }),
            Some(_) => Err(syntax(offset, "unexpected token")),
            None => Err(syntax(offset, "unexpected end of expression")),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Parse a complete expression.
pub fn parse(src: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: src.len(),
        depth: 0,
    };
    let expr = parser.or()?;
    if parser.pos < parser.tokens.len() {
        return Err(syntax(parser.offset(), "unexpected trailing input"));
    }
    Ok(expr)
}
