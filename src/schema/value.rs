use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A dynamic value stored in the story context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Declared but not yet set.
    Null,
    String(String),
    Number(f64),
    List(Vec<String>),
    Map(BTreeMap<String, Value>),
}

/// Conjunction used when a list is rendered as natural language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Conjunction {
    #[default]
    And,
    Or,
}

impl Conjunction {
    pub fn word(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns true if the value is a list holding `item`, or a string equal
    /// to it. Comparison ignores ASCII case.
    pub fn includes(&self, item: &str) -> bool {
        match self {
            Self::List(items) => items.iter().any(|i| i.eq_ignore_ascii_case(item)),
            Self::String(s) => s.eq_ignore_ascii_case(item),
            _ => false,
        }
    }

    /// Render this value as text for a spoken message.
    pub fn render(&self, conj: Conjunction) -> String {
        match self {
            Self::Null => String::new(),
            Self::String(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::List(items) => join_natural(items, conj),
            Self::Map(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{} {}", k, v.render(conj)))
                    .collect();
                join_natural(&parts, conj)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("nothing"),
            other => f.write_str(&other.render(Conjunction::And)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

impl From<&[&str]> for Value {
    fn from(items: &[&str]) -> Self {
        Self::List(items.iter().map(|s| s.to_string()).collect())
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Join items the way a person would say them: "a", "a and b",
/// "a, b, and c".
pub fn join_natural<S: AsRef<str>>(items: &[S], conj: Conjunction) -> String {
    match items {
        [] => String::new(),
        [only] => only.as_ref().to_string(),
        [first, second] => format!("{} {} {}", first.as_ref(), conj.word(), second.as_ref()),
        [init @ .., last] => {
            let mut parts: Vec<String> = init.iter().map(|s| s.as_ref().to_string()).collect();
            parts.push(format!("{} {}", conj.word(), last.as_ref()));
            parts.join(", ")
        }
    }
}
