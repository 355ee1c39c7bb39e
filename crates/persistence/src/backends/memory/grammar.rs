//! Search query grammar parser and evaluator.
//!
//! # Grammar
//!
//! ```text
//! query       = or_expr
//! or_expr     = and_expr ("OR" and_expr)*
//! and_expr    = not_expr ("AND" not_expr)*
//! not_expr    = "NOT" primary / primary
//! primary     = "(" query ")" / comparison
//! comparison  = target SP op SP value
//! target      = field / "distance(" field "," "geopoint(" lat "," lon "))"
//! op          = "=" / "!=" / "<" / "<=" / ">" / ">="
//! value       = quoted-string / number / timestamp / atom
//! ```
//!
//! Keywords are case-insensitive. Quoted strings support `\"` and `\\`
//! escapes.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::query::Operator;
use crate::types::{FieldMap, FieldValue, GeoPoint};

/// Left-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchTarget {
    /// A document field.
    Field(String),
    /// Distance in meters from a field's geo-point to a fixed point.
    Distance {
        /// The geo-point field.
        field: String,
        /// The fixed point.
        center: GeoPoint,
    },
}

/// A parsed search expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchExpr {
    /// `target op value`.
    Comparison {
        /// What is compared.
        target: SearchTarget,
        /// The operator; never IN.
        op: Operator,
        /// The literal.
        value: FieldValue,
    },
    /// Both sides hold.
    And(Box<SearchExpr>, Box<SearchExpr>),
    /// Either side holds.
    Or(Box<SearchExpr>, Box<SearchExpr>),
    /// The inner expression does not hold.
    Not(Box<SearchExpr>),
}

impl SearchExpr {
    /// Evaluates the expression against a document's fields.
    pub fn matches(&self, fields: &FieldMap) -> bool {
        match self {
            SearchExpr::And(left, right) => left.matches(fields) && right.matches(fields),
            SearchExpr::Or(left, right) => left.matches(fields) || right.matches(fields),
            SearchExpr::Not(inner) => !inner.matches(fields),
            SearchExpr::Comparison { target, op, value } => match target {
                SearchTarget::Field(name) => match fields.get(name) {
                    Some(FieldValue::List(items)) => {
                        items.iter().any(|item| compare_matches(item, *op, value))
                    }
                    Some(stored) => compare_matches(stored, *op, value),
                    None => false,
                },
                SearchTarget::Distance { field, center } => match fields.get(field) {
                    Some(FieldValue::GeoPoint(point)) => {
                        let meters = FieldValue::Float(point.distance_meters(center));
                        compare_matches(&meters, *op, value)
                    }
                    _ => false,
                },
            },
        }
    }
}

fn compare_matches(stored: &FieldValue, op: Operator, literal: &FieldValue) -> bool {
    stored
        .compare(literal)
        .is_some_and(|ordering: Ordering| op.accepts(ordering))
}

/// Search query parse error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParseError {
    /// What went wrong.
    pub message: String,
    /// Byte offset into the query string.
    pub position: usize,
}

impl fmt::Display for SearchParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "search query parse error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for SearchParseError {}

/// Recursive-descent parser for search query strings.
pub struct SearchParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> SearchParser<'a> {
    /// Creates a parser over `input`.
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Parses a complete query string.
    pub fn parse(input: &str) -> Result<SearchExpr, SearchParseError> {
        let mut parser = SearchParser::new(input);
        let expr = parser.parse_or_expr()?;
        parser.skip_whitespace();
        if parser.pos < parser.input.len() {
            return Err(parser.error(format!(
                "unexpected input after expression: '{}'",
                parser.rest()
            )));
        }
        Ok(expr)
    }

    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn error(&self, message: impl Into<String>) -> SearchParseError {
        SearchParseError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn consume(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn expect(&mut self, expected: char) -> Result<(), SearchParseError> {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.consume();
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", expected)))
        }
    }

    /// Consumes `keyword` if it is next and ends at a word boundary.
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let rest = self.rest();
        let Some(head) = rest.get(..keyword.len()) else {
            return false;
        };
        if !head.eq_ignore_ascii_case(keyword) {
            return false;
        }
        let boundary = rest[keyword.len()..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric() && c != '_');
        if boundary {
            self.pos += keyword.len();
        }
        boundary
    }

    fn parse_or_expr(&mut self) -> Result<SearchExpr, SearchParseError> {
        let mut left = self.parse_and_expr()?;
        loop {
            self.skip_whitespace();
            if self.eat_keyword("OR") {
                let right = self.parse_and_expr()?;
                left = SearchExpr::Or(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_and_expr(&mut self) -> Result<SearchExpr, SearchParseError> {
        let mut left = self.parse_not_expr()?;
        loop {
            self.skip_whitespace();
            if self.eat_keyword("AND") {
                let right = self.parse_not_expr()?;
                left = SearchExpr::And(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_not_expr(&mut self) -> Result<SearchExpr, SearchParseError> {
        self.skip_whitespace();
        if self.eat_keyword("NOT") {
            let inner = self.parse_primary()?;
            Ok(SearchExpr::Not(Box::new(inner)))
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> Result<SearchExpr, SearchParseError> {
        self.skip_whitespace();
        if self.peek() == Some('(') {
            self.consume();
            let expr = self.parse_or_expr()?;
            self.expect(')')?;
            Ok(expr)
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<SearchExpr, SearchParseError> {
        let target = self.parse_target()?;
        self.skip_whitespace();
        let op = self.parse_operator()?;
        self.skip_whitespace();
        let value = self.parse_value()?;
        Ok(SearchExpr::Comparison { target, op, value })
    }

    fn parse_identifier(&mut self) -> Result<String, SearchParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                self.consume();
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(self.error("expected field name"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_target(&mut self) -> Result<SearchTarget, SearchParseError> {
        let name = self.parse_identifier()?;
        if name != "distance" || self.peek() != Some('(') {
            return Ok(SearchTarget::Field(name));
        }

        self.consume();
        let field = self.parse_identifier()?;
        self.expect(',')?;
        let function = self.parse_identifier()?;
        if function != "geopoint" {
            return Err(self.error(format!("expected geopoint, found '{}'", function)));
        }
        self.expect('(')?;
        let latitude = self.parse_number()?;
        self.expect(',')?;
        let longitude = self.parse_number()?;
        self.expect(')')?;
        self.expect(')')?;

        Ok(SearchTarget::Distance {
            field,
            center: GeoPoint::new(latitude, longitude),
        })
    }

    fn parse_number(&mut self) -> Result<f64, SearchParseError> {
        self.skip_whitespace();
        let token = self.parse_token();
        token
            .parse()
            .map_err(|_| self.error(format!("expected number, found '{}'", token)))
    }

    fn parse_operator(&mut self) -> Result<Operator, SearchParseError> {
        let rest = self.rest();
        let (op, len) = if rest.starts_with("!=") {
            (Operator::Ne, 2)
        } else if rest.starts_with("<=") {
            (Operator::Le, 2)
        } else if rest.starts_with(">=") {
            (Operator::Ge, 2)
        } else if rest.starts_with('<') {
            (Operator::Lt, 1)
        } else if rest.starts_with('>') {
            (Operator::Gt, 1)
        } else if rest.starts_with('=') || rest.starts_with(':') {
            (Operator::Eq, 1)
        } else {
            return Err(self.error("expected comparison operator"));
        };
        self.pos += len;
        Ok(op)
    }

    /// Reads an unquoted token up to whitespace, a comma or a parenthesis.
    fn parse_token(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == ',' {
                break;
            }
            self.consume();
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_value(&mut self) -> Result<FieldValue, SearchParseError> {
        if self.peek() == Some('"') {
            return self.parse_quoted_string().map(FieldValue::Text);
        }

        let token = self.parse_token();
        if token.is_empty() {
            return Err(self.error("expected value"));
        }
        if let Ok(integer) = token.parse::<i64>() {
            return Ok(FieldValue::Integer(integer));
        }
        if let Ok(number) = token.parse::<f64>() {
            return Ok(FieldValue::Float(number));
        }
        if let Ok(timestamp) = DateTime::parse_from_rfc3339(&token) {
            return Ok(FieldValue::DateTime(timestamp.with_timezone(&Utc)));
        }
        Ok(FieldValue::Text(token))
    }

    fn parse_quoted_string(&mut self) -> Result<String, SearchParseError> {
        self.consume();
        let mut value = String::new();
        loop {
            match self.consume() {
                Some('"') => return Ok(value),
                Some('\\') => match self.consume() {
                    Some(escaped) => value.push(escaped),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) => value.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }
}
