//! Recursive-descent parser for descriptor strings.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! sum     := product (('+' | '-') product)*
//! product := unary (('*' | '/') unary)*
//! unary   := '-' unary | power
//! power   := atom ('^' unary)?
//! atom    := number | ident | ident '(' sum ')' | '(' sum ')' | '(' sum '+' $C ')'
//! ```
//!
//! The placeholder is only legal as the trailing addend of a parenthesized
//! group, which is exactly how the printer emits a shifted term.

use crate::error::{FormulabError, Result};
use crate::types::{BinaryOp, Descriptor, UnaryOp, PLACEHOLDER};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Placeholder,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => {
                i += 1;
            }
            '+' | '-' | '*' | '/' | '^' | '(' | ')' => {
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '^' => Token::Caret,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                });
                i += 1;
            }
            '$' => {
                let end = i + PLACEHOLDER.len();
                let candidate: String = chars[i..end.min(chars.len())].iter().collect();
                if candidate != PLACEHOLDER {
                    return Err(FormulabError::parse(source, format!("bad token at offset {}", i)));
                }
                tokens.push(Token::Placeholder);
                i = end;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| FormulabError::parse(source, format!("bad number '{}'", text)))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(FormulabError::parse(
                    source,
                    format!("unexpected character '{}'", other),
                ));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error(&self, message: impl Into<String>) -> FormulabError {
        FormulabError::parse(self.source, message)
    }

    fn expect_rparen(&mut self) -> Result<()> {
        match self.next() {
            Some(Token::RParen) => Ok(()),
            Some(other) => Err(self.error(format!("expected ')', found {:?}", other))),
            None => Err(self.error("unbalanced parenthesis")),
        }
    }

    fn parse_sum(&mut self, in_group: bool) -> Result<Descriptor> {
        let mut lhs = self.parse_product()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    if self.peek() == Some(&Token::Placeholder) {
                        self.pos += 1;
                        if !in_group || self.peek() != Some(&Token::RParen) {
                            return Err(self.error(
                                "placeholder must be the last addend of a parenthesized group",
                            ));
                        }
                        return Ok(Descriptor::shifted(lhs));
                    }
                    let rhs = self.parse_product()?;
                    lhs = Descriptor::binary(BinaryOp::Add, lhs, rhs);
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    let rhs = self.parse_product()?;
                    lhs = Descriptor::binary(BinaryOp::Sub, lhs, rhs);
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parse_product(&mut self) -> Result<Descriptor> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Descriptor::binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> Result<Descriptor> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            let operand = self.parse_unary()?;
            return Ok(Descriptor::unary(UnaryOp::Neg, operand));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Descriptor> {
        let base = self.parse_atom()?;
        if self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            let exponent = self.parse_unary()?;
            return Ok(Descriptor::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Descriptor> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Descriptor::Literal(value)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    let op = UnaryOp::from_function_name(&name)
                        .ok_or_else(|| self.error(format!("unknown function '{}'", name)))?;
                    self.pos += 1;
                    let argument = self.parse_sum(false)?;
                    self.expect_rparen()?;
                    Ok(Descriptor::unary(op, argument))
                } else {
                    Ok(Descriptor::Leaf(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.parse_sum(true)?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Some(Token::Placeholder) => Err(self.error("placeholder outside a shifted group")),
            Some(other) => Err(self.error(format!("unexpected token {:?}", other))),
            None => Err(self.error("unexpected end of input")),
        }
    }
}

/// Whether `name` can stand as a variable in descriptor strings.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// Parse a descriptor string into its AST.
pub fn parse_descriptor(source: &str) -> Result<Descriptor> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(FormulabError::parse(source, "empty descriptor"));
    }

    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let descriptor = parser.parse_sum(false)?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error(format!("trailing input at token {}", parser.pos)));
    }
    if descriptor.placeholder_count() > 1 {
        return Err(parser.error("a descriptor may carry at most one placeholder"));
    }
    Ok(descriptor)
}

impl std::str::FromStr for Descriptor {
    type Err = FormulabError;

    fn from_str(s: &str) -> Result<Self> {
        parse_descriptor(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PrimitiveMatrix;
    use ndarray::Array2;

    const UNARY_OPS: [UnaryOp; 10] = [
        UnaryOp::Neg,
        UnaryOp::Log,
        UnaryOp::Sqrt,
        UnaryOp::Abs,
        UnaryOp::Sin,
        UnaryOp::Cos,
        UnaryOp::Exp,
        UnaryOp::Square,
        UnaryOp::Cube,
        UnaryOp::Inverse,
    ];

    fn close(a: f64, b: f64) -> bool {
        a == b || (a.is_nan() && b.is_nan()) || (a - b).abs() <= 1e-9 * a.abs().max(1.0)
    }

    #[test]
    fn test_parse_shifted_log() {
        let d = parse_descriptor("log((x2+$C))").unwrap();
        assert_eq!(
            d,
            Descriptor::unary(UnaryOp::Log, Descriptor::shifted(Descriptor::leaf("x2")))
        );
        assert_eq!(d.to_string(), "log((x2+$C))");
    }

    #[test]
    fn test_precedence() {
        let d = parse_descriptor("a+b*c^2").unwrap();
        let expected = Descriptor::binary(
            BinaryOp::Add,
            Descriptor::leaf("a"),
            Descriptor::binary(
                BinaryOp::Mul,
                Descriptor::leaf("b"),
                Descriptor::binary(BinaryOp::Pow, Descriptor::leaf("c"), Descriptor::Literal(2.0)),
            ),
        );
        assert_eq!(d, expected);
    }

    #[test]
    fn test_nested_parentheses_and_scientific_literals() {
        let d = parse_descriptor("((((x))))*1.5e-3").unwrap();
        assert_eq!(
            d,
            Descriptor::binary(BinaryOp::Mul, Descriptor::leaf("x"), Descriptor::Literal(1.5e-3))
        );
    }

    #[test]
    fn test_printed_forms_reparse() {
        for source in ["(a*b)", "log(abs((-x+$C)))", "sqrt((x1+$C))", "(exp(a)/b)", "-a"] {
            let d = parse_descriptor(source).unwrap();
            assert_eq!(d.to_string(), source);
        }
    }

    #[test]
    fn test_placeholder_misuse_is_rejected() {
        assert!(parse_descriptor("log(x+$C)").is_err());
        assert!(parse_descriptor("($C+x)").is_err());
        assert!(parse_descriptor("((a+$C)*(b+$C))").is_err());
        assert!(parse_descriptor("$X").is_err());
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(parse_descriptor("").is_err());
        assert!(parse_descriptor("(a+b").is_err());
        assert!(parse_descriptor("a b").is_err());
        assert!(parse_descriptor("foo(a)").is_err());
        assert!(parse_descriptor("a#b").is_err());
    }

    #[test]
    fn test_nested_unary_chains_reparse_to_same_values() {
        let values = Array2::from_shape_vec((2, 1), vec![0.5, 1.5]).unwrap();
        let p = PrimitiveMatrix::new(vec!["x".into()], values).unwrap();
        for a in UNARY_OPS {
            for b in UNARY_OPS {
                for c in UNARY_OPS {
                    let d = Descriptor::unary(
                        c,
                        Descriptor::unary(b, Descriptor::unary(a, Descriptor::leaf("x"))),
                    );
                    let name = d.to_string();
                    let direct = d.evaluate(&p, None).unwrap();
                    let reparsed = parse_descriptor(&name).unwrap().evaluate(&p, None).unwrap();
                    for (u, v) in direct.iter().zip(reparsed.iter()) {
                        assert!(close(*u, *v), "{}: {} vs {}", name, u, v);
                    }
                }
            }
        }
    }

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("x2"));
        assert!(is_identifier("_temp_K"));
        assert!(!is_identifier("temp.K"));
        assert!(!is_identifier("2x"));
        assert!(!is_identifier("a b"));
        assert!(!is_identifier(""));
    }
}
