//! `${...}` template strings.

use super::{parser, stringify, Bindings, Expr, ExpressionError};

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Text(String),
    Expr(Expr),
}

/// A parsed template: literal text interleaved with expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(src: &str) -> Result<Self, ExpressionError> {
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut rest = src;
        let mut base = 0;

        while let Some(start) = rest.find("${") {
            text.push_str(&rest[..start]);
            let body_start = start + 2;
            let body_len = closing_brace(&rest[body_start..])
                .ok_or(ExpressionError::Unterminated(base + start))?;
            let body = &rest[body_start..body_start + body_len];

            if !text.is_empty() {
                parts.push(Part::Text(std::mem::take(&mut text)));
            }
            let expr = parser::parse(body).map_err(|e| shift(e, base + body_start))?;
            parts.push(Part::Expr(expr));

            let consumed = body_start + body_len + 1;
            base += consumed;
            rest = &rest[consumed..];
        }
        text.push_str(rest);
        if !text.is_empty() {
            parts.push(Part::Text(text));
        }

        Ok(Self { parts })
    }

    /// True when the template contains no expressions.
    pub fn is_static(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Text(_)))
    }

    pub fn render(&self, bindings: &Bindings) -> Result<String, ExpressionError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(t) => out.push_str(t),
                Part::Expr(e) => out.push_str(&stringify(&e.evaluate(bindings)?)),
            }
        }
        Ok(out)
    }
}

/// Byte length of the expression body before its closing `}`, skipping
/// braces inside string literals.
fn closing_brace(body: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '}' => return Some(i),
            None => {}
        }
    }
    None
}

fn shift(err: ExpressionError, by: usize) -> ExpressionError {
    match err {
        ExpressionError::Syntax { offset, message } => ExpressionError::Syntax {
            offset: offset + by,
            message,
        },
        ExpressionError::CallNotAllowed(offset) => ExpressionError::CallNotAllowed(offset + by),
        other => other,
    }
}
