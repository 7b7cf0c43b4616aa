//! Message templates with `{key}` placeholders resolved against the context.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::context::StoryContext;
use crate::schema::value::Conjunction;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    #[error("template parse error in '{template}': {reason}")]
    Parse { template: String, reason: String },
    #[error("context key '{0}' is not set")]
    MissingKey(String),
}

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSegment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// Context reference: `{key}`, `{player.name}` or `{menu|or}`.
    ContextRef { key: String, conj: Conjunction },
}

/// A parsed template. Serializes as its source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Template {
    source: String,
    segments: Vec<TemplateSegment>,
}

impl Template {
    /// Parse a template string.
    ///
    /// Syntax:
    /// - `{key}` or `{key.sub}` → context value, lists joined with "and"
    /// - `{key|or}` → lists joined with "or"
    /// - `{{` / `}}` → literal braces
    pub fn parse(input: &str) -> Result<Template, TemplateError> {
        let err = |reason: &str| TemplateError::Parse {
            template: input.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            match chars[i] {
                '{' if i + 1 < len && chars[i + 1] == '{' => {
                    literal_buf.push('{');
                    i += 2;
                }
                '{' => {
                    if !literal_buf.is_empty() {
                        segments.push(TemplateSegment::Literal(std::mem::take(&mut literal_buf)));
                    }

                    let start = i + 1;
                    let mut end = start;
                    while end < len && chars[end] != '}' {
                        if chars[end] == '{' {
                            return Err(err("nested braces are not allowed"));
                        }
                        end += 1;
                    }
                    if end == len {
                        return Err(err("unclosed brace"));
                    }

                    let content: String = chars[start..end].iter().collect();
                    segments.push(Self::parse_ref(content.trim()).ok_or_else(|| {
                        err(&format!("invalid placeholder '{{{}}}'", content))
                    })?);
                    i = end + 1;
                }
                '}' if i + 1 < len && chars[i + 1] == '}' => {
                    literal_buf.push('}');
                    i += 2;
                }
                '}' => return Err(err("unmatched closing brace")),
                c => {
                    literal_buf.push(c);
                    i += 1;
                }
            }
        }

        if !literal_buf.is_empty() {
            segments.push(TemplateSegment::Literal(literal_buf));
        }

        Ok(Template {
            source: input.to_string(),
            segments,
        })
    }

    fn parse_ref(content: &str) -> Option<TemplateSegment> {
        let (key, conj) = match content.split_once('|') {
            Some((key, conj)) => match conj.trim() {
                "and" => (key.trim(), Conjunction::And),
                "or" => (key.trim(), Conjunction::Or),
                _ => return None,
            },
            None => (content, Conjunction::And),
        };
        if key.is_empty() || key.split('.').any(str::is_empty) {
            return None;
        }
        Some(TemplateSegment::ContextRef {
            key: key.to_string(),
            conj,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[TemplateSegment] {
        &self.segments
    }

    /// Every placeholder key in the template, in order of appearance.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|seg| match seg {
            TemplateSegment::ContextRef { key, .. } => Some(key.as_str()),
            TemplateSegment::Literal(_) => None,
        })
    }

    /// Render against `context`. `resolve` maps a placeholder name to the
    /// context path it reads (identity unless the node binds it).
    pub fn render<'a, F>(&'a self, context: &StoryContext, resolve: F) -> Result<String, TemplateError>
    where
        F: Fn(&'a str) -> &'a str,
    {
        let mut out = String::with_capacity(self.source.len());
        for seg in &self.segments {
            match seg {
                TemplateSegment::Literal(text) => out.push_str(text),
                TemplateSegment::ContextRef { key, conj } => {
                    let path = resolve(key);
                    let value = context
                        .lookup(path)
                        .ok_or_else(|| TemplateError::MissingKey(path.to_string()))?;
                    out.push_str(&value.render(*conj));
                }
            }
        }
        Ok(out)
    }
}

impl TryFrom<String> for Template {
    type Error = TemplateError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Template::parse(&source)
    }
}

impl From<Template> for String {
    fn from(template: Template) -> Self {
        template.source
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::value::Value;

    fn movie_context() -> StoryContext {
        let mut ctx = StoryContext::new();
        ctx.insert("name", "Ana");
        ctx.insert("menu", Value::from(&["soda", "popcorn", "candy"][..]));
        ctx
    }

    #[test]
    fn parse_literal_only() {
        let t = Template::parse("Hello, world.").unwrap();
        assert_eq!(
            t.segments(),
            &[TemplateSegment::Literal("Hello, world.".to_string())]
        );
    }

    #[test]
    fn parse_context_ref() {
        let t = Template::parse("Where would you like to go {name}?").unwrap();
        assert_eq!(t.segments().len(), 3);
        assert_eq!(
            t.segments()[1],
            TemplateSegment::ContextRef {
                key: "name".to_string(),
                conj: Conjunction::And
            }
        );
    }

    #[test]
    fn parse_or_conjunction() {
        let t = Template::parse("We can see the {exhibits|or}.").unwrap();
        assert!(matches!(
            &t.segments()[1],
            TemplateSegment::ContextRef { key, conj: Conjunction::Or } if key == "exhibits"
        ));
    }

    #[test]
    fn parse_conjunction_with_spaces() {
        let t = Template::parse("We have {menu | or}.").unwrap();
        assert!(matches!(
            &t.segments()[1],
            TemplateSegment::ContextRef { key, conj: Conjunction::Or } if key == "menu"
        ));
        assert!(Template::parse("We have { menu |and }.").is_ok());
    }

    #[test]
    fn parse_escaped_braces() {
        let t = Template::parse("Use {{braces}} here.").unwrap();
        assert_eq!(
            t.segments(),
            &[TemplateSegment::Literal("Use {braces} here.".to_string())]
        );
        assert_eq!(t.keys().count(), 0);
    }

    #[test]
    fn parse_errors() {
        assert!(Template::parse("Bad {} here").is_err());
        assert!(Template::parse("Bad {outer{inner}} here").is_err());
        assert!(Template::parse("Bad {unclosed here").is_err());
        assert!(Template::parse("Bad } here").is_err());
        assert!(Template::parse("Bad {menu|xor} here").is_err());
        assert!(Template::parse("Bad {player.} here").is_err());
    }

    #[test]
    fn keys_in_order() {
        let t = Template::parse("{name} wants {menu} and {player.name}").unwrap();
        let keys: Vec<&str> = t.keys().collect();
        assert_eq!(keys, vec!["name", "menu", "player.name"]);
    }

    #[test]
    fn render_lists_naturally() {
        let ctx = movie_context();
        let t = Template::parse("What can I get for you {name}? We have {menu}.").unwrap();
        assert_eq!(
            t.render(&ctx, |k| k).unwrap(),
            "What can I get for you Ana? We have soda, popcorn, and candy."
        );

        let t = Template::parse("Soda {menu|or}?").unwrap();
        assert_eq!(t.render(&ctx, |k| k).unwrap(), "Soda soda, popcorn, or candy?");
    }

    #[test]
    fn render_through_binding() {
        let ctx = movie_context();
        let t = Template::parse("Hi {guest}.").unwrap();
        let out = t
            .render(&ctx, |k| if k == "guest" { "name" } else { k })
            .unwrap();
        assert_eq!(out, "Hi Ana.");
    }

    #[test]
    fn render_missing_key_fails() {
        let ctx = StoryContext::new();
        let t = Template::parse("Hello {town}").unwrap();
        assert_eq!(
            t.render(&ctx, |k| k),
            Err(TemplateError::MissingKey("town".to_string()))
        );
    }

    #[test]
    fn ron_round_trip() {
        let t = Template::parse("Here's your {bought}.").unwrap();
        let serialized = ron::to_string(&t).unwrap();
        let deserialized: Template = ron::from_str(&serialized).unwrap();
        assert_eq!(deserialized, t);
    }
}
