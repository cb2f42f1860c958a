//! Response generation for admitted events
//!
//! The built-in responder answers simple arithmetic questions and greetings,
//! and acknowledges everything else. Anything smarter plugs in behind the
//! same trait.

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::error::Result;
use crate::event::InboundEvent;

/// Response-generation collaborator, invoked only for admitted events
#[async_trait]
pub trait Responder: Send + Sync {
    /// Produce a reply for the event. Errors surface to the user as a fixed
    /// apology message, never as a crash.
    async fn respond(&self, event: &InboundEvent) -> Result<String>;
}

/// Built-in rule-based responder: arithmetic, greetings, echo fallback
pub struct AutoResponder {
    math_trigger: Regex,
    greetings: Vec<&'static str>,
}

impl AutoResponder {
    pub fn new() -> Self {
        Self {
            // "cuánto es 2+2" / "how much is 2+2"
            math_trigger: Regex::new(r"(?i)(?:cu[aá]nto\s+es|how\s+much\s+is)\s+(.+)")
                .expect("static regex"),
            greetings: vec![
                "hola",
                "buenos días",
                "buenas tardes",
                "buenas noches",
                "hello",
                "hi",
                "good morning",
            ],
        }
    }

    fn reply_to(&self, text: &str) -> String {
        if let Some(captures) = self.math_trigger.captures(text) {
            debug!("math question detected");
            return self.answer_math(&captures[1]);
        }

        let lowered = text.to_lowercase();
        if self.greetings.iter().any(|g| lowered.contains(g)) {
            return "Hello! How can I help you?".to_string();
        }

        format!("I received your message: '{text}'. How can I help you?")
    }

    fn answer_math(&self, raw: &str) -> String {
        // Strip everything but digits, operators, parens and dots.
        let expr: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit() || "+-*/(). ".contains(*c))
            .filter(|c| !c.is_whitespace())
            .collect();

        if expr.is_empty() {
            return "Please use only numbers and basic operators (+, -, *, /)".to_string();
        }

        match eval_expression(&expr) {
            Ok(value) => {
                let formatted = if value.fract() == 0.0 && value.abs() < 1e15 {
                    format!("{}", value as i64)
                } else {
                    format!("{:.2}", value)
                };
                format!("The result of {expr} is {formatted}")
            }
            Err(_) => {
                "Sorry, I couldn't solve that operation. Please check it is a valid \
                 expression (for example: 2+2 or 3*4)"
                    .to_string()
            }
        }
    }
}

impl Default for AutoResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Responder for AutoResponder {
    async fn respond(&self, event: &InboundEvent) -> Result<String> {
        let text = event.text_content().unwrap_or_default().trim();
        Ok(self.reply_to(text))
    }
}

/// Evaluate a sanitized arithmetic expression (+, -, *, /, parentheses).
fn eval_expression(expr: &str) -> std::result::Result<f64, ParseError> {
    let tokens: Vec<char> = expr.chars().collect();
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        return Err(ParseError);
    }
    if !value.is_finite() {
        return Err(ParseError);
    }
    Ok(value)
}

#[derive(Debug)]
struct ParseError;

struct Parser {
    tokens: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn expression(&mut self) -> std::result::Result<f64, ParseError> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.bump();
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> std::result::Result<f64, ParseError> {
        let mut value = self.factor()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.bump();
            let rhs = self.factor()?;
            value = if op == '*' { value * rhs } else { value / rhs };
        }
        Ok(value)
    }

    fn factor(&mut self) -> std::result::Result<f64, ParseError> {
        match self.peek() {
            Some('(') => {
                self.bump();
                let value = self.expression()?;
                if self.bump() != Some(')') {
                    return Err(ParseError);
                }
                Ok(value)
            }
            Some('-') => {
                self.bump();
                Ok(-self.factor()?)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            _ => Err(ParseError),
        }
    }

    fn number(&mut self) -> std::result::Result<f64, ParseError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                self.bump();
            } else {
                break;
            }
        }
        let literal: String = self.tokens[start..self.pos].iter().collect();
        literal.parse().map_err(|_| ParseError)
    }
}
