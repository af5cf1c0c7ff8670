// SPDX-License-Identifier: MIT

//! Guard expression parser
//!
//! Precedence, lowest first: `or`, `and`, `not`, comparison. Parentheses group.

use super::ast::{CompareOp, Expression, Literal};
use crate::adk::error::ConditionError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Op(CompareOp),
    And,
    Or,
    Not,
    True,
    False,
    Null,
    LParen,
    RParen,
}

/// Parse a guard expression string into an AST
pub fn parse(input: &str) -> Result<Expression, ConditionError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ConditionError::Empty);
    }

    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        source: input,
    };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.syntax_error());
    }
    Ok(expr)
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| ConditionError::Literal(chars[i..].iter().collect()))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '=' | '!' | '>' | '<' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (CompareOp::Eq, 2),
                    ('!', Some('=')) => (CompareOp::NotEq, 2),
                    ('>', Some('=')) => (CompareOp::Gte, 2),
                    ('<', Some('=')) => (CompareOp::Lte, 2),
                    ('>', _) => (CompareOp::Gt, 1),
                    ('<', _) => (CompareOp::Lt, 1),
                    _ => return Err(ConditionError::Syntax(input.to_string())),
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| ConditionError::Literal(text.clone()))?;
                tokens.push(Token::Num(n));
            }
            // `-` may appear inside an identifier (`data-fetch.output`) but never starts one
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '.' | '-'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "contains" => Token::Op(CompareOp::Contains),
                    _ => Token::Ident(word),
                });
            }
            _ => return Err(ConditionError::Syntax(input.to_string())),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn syntax_error(&self) -> ConditionError {
        ConditionError::Syntax(self.source.to_string())
    }

    fn parse_or(&mut self) -> Result<Expression, ConditionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, ConditionError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Expression::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression, ConditionError> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ConditionError::Unbalanced(self.source.to_string())),
                }
            }
            Some(Token::True) => Ok(Expression::True),
            Some(Token::False) => Ok(Expression::False),
            Some(Token::Ident(path)) => match self.peek() {
                Some(Token::Op(op)) => {
                    let op = *op;
                    self.pos += 1;
                    let value = self.parse_literal()?;
                    Ok(Expression::Compare { path, op, value })
                }
                _ => Ok(Expression::Truthy(path)),
            },
            Some(Token::RParen) => Err(ConditionError::Unbalanced(self.source.to_string())),
            _ => Err(self.syntax_error()),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, ConditionError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Literal::String(s)),
            Some(Token::Num(n)) => Ok(Literal::Number(n)),
            Some(Token::True) => Ok(Literal::Boolean(true)),
            Some(Token::False) => Ok(Literal::Boolean(false)),
            Some(Token::Null) => Ok(Literal::Null),
            Some(other) => Err(ConditionError::Literal(format!("{:?}", other))),
            None => Err(ConditionError::Literal(self.source.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(path: &str, op: CompareOp, value: Literal) -> Expression {
        Expression::Compare {
            path: path.to_string(),
            op,
            value,
        }
    }

    #[test]
    fn test_parse_simple_equality() {
        assert_eq!(
            parse("intent == 'search'").unwrap(),
            cmp("intent", CompareOp::Eq, Literal::String("search".into()))
        );
    }

    #[test]
    fn test_parse_hyphenated_node_ids() {
        assert_eq!(
            parse("data-fetch.output == 'x'").unwrap(),
            cmp("data-fetch.output", CompareOp::Eq, Literal::String("x".into()))
        );
        assert_eq!(
            parse("pre-check.retries > -1").unwrap(),
            cmp("pre-check.retries", CompareOp::Gt, Literal::Number(-1.0))
        );
    }

    #[test]
    fn test_parse_operators() {
        assert_eq!(
            parse("status != \"done\"").unwrap(),
            cmp("status", CompareOp::NotEq, Literal::String("done".into()))
        );
        assert_eq!(
            parse("score >= 5").unwrap(),
            cmp("score", CompareOp::Gte, Literal::Number(5.0))
        );
        assert_eq!(
            parse("delta < -0.5").unwrap(),
            cmp("delta", CompareOp::Lt, Literal::Number(-0.5))
        );
        assert_eq!(
            parse("tags contains 'bug'").unwrap(),
            cmp("tags", CompareOp::Contains, Literal::String("bug".into()))
        );
        assert_eq!(
            parse("result == null").unwrap(),
            cmp("result", CompareOp::Eq, Literal::Null)
        );
    }

    #[test]
    fn test_parse_dotted_path() {
        assert_eq!(
            parse("classify.output.intent == 'technical'").unwrap(),
            cmp(
                "classify.output.intent",
                CompareOp::Eq,
                Literal::String("technical".into())
            )
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a == 1 or b == 2 and c == 3").unwrap();
        assert_eq!(
            expr,
            Expression::Or(
                Box::new(cmp("a", CompareOp::Eq, Literal::Number(1.0))),
                Box::new(Expression::And(
                    Box::new(cmp("b", CompareOp::Eq, Literal::Number(2.0))),
                    Box::new(cmp("c", CompareOp::Eq, Literal::Number(3.0))),
                )),
            )
        );
    }

    #[test]
    fn test_parentheses_and_not() {
        let expr = parse("not (a == 1 or b)").unwrap();
        assert_eq!(
            expr,
            Expression::Not(Box::new(Expression::Or(
                Box::new(cmp("a", CompareOp::Eq, Literal::Number(1.0))),
                Box::new(Expression::Truthy("b".into())),
            )))
        );
    }

    #[test]
    fn test_operator_inside_string_is_literal() {
        assert_eq!(
            parse("note == 'a and b'").unwrap(),
            cmp("note", CompareOp::Eq, Literal::String("a and b".into()))
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse("true").unwrap(), Expression::True);
        assert_eq!(parse(" false ").unwrap(), Expression::False);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("   "), Err(ConditionError::Empty));
        assert!(matches!(
            parse("(a == 1"),
            Err(ConditionError::Unbalanced(_))
        ));
        assert!(matches!(parse("a == "), Err(ConditionError::Literal(_))));
        assert!(matches!(parse("a = 1"), Err(ConditionError::Syntax(_))));
        assert!(parse("a == 'unterminated").is_err());
        assert!(parse("a == 1 b == 2").is_err());
    }
}
