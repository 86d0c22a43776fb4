//! Message templates: locale selection and `{{field}}` substitution.
//!
//! Placeholders are `{{path}}` or `{{{path}}}`, where `path` is a dotted lookup
//! into the event data (`citizen.name`, `items.0`). Output is plain text with
//! no escaping. Unknown paths render as the empty string.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::FALLBACK_LOCALE;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\{?\s*([A-Za-z0-9_$@.\-]+)\s*\}?\}\}").expect("placeholder regex is valid")
});

/// A template document: locale → template text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "templates", default)]
    pub locale_map: HashMap<String, String>,
}

impl Template {
    /// Text for `locale`, falling back to the default locale.
    pub fn text_for(&self, locale: &str) -> Option<&str> {
        [locale, FALLBACK_LOCALE]
            .into_iter()
            .find_map(|candidate| self.locale_map.get(candidate))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Field(Vec<String>),
}

/// A parsed template ready to render against event data.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    segments: Vec<Segment>,
}

impl CompiledTemplate {
    pub fn compile(text: &str) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(text) {
            let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Literal(text[last..whole.start()].to_string()));
            }
            segments.push(Segment::Field(
                path.as_str()
                    .split('.')
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect(),
            ));
            last = whole.end();
        }
        if last < text.len() {
            segments.push(Segment::Literal(text[last..].to_string()));
        }

        Self { segments }
    }

    /// Render against `data`. Never fails; missing fields become "".
    pub fn render(&self, data: &Map<String, Value>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(path) => {
                    if let Some(value) = lookup(data, path) {
                        out.push_str(&display(value));
                    }
                }
            }
        }
        out
    }

    /// Dotted paths referenced by the template, in order of appearance.
    pub fn fields(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Field(path) => Some(path.join(".")),
                Segment::Literal(_) => None,
            })
            .collect()
    }
}

/// Compile and render in one step.
pub fn render(text: &str, data: &Map<String, Value>) -> String {
    CompiledTemplate::compile(text).render(data)
}

fn lookup<'a>(data: &'a Map<String, Value>, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = data.get(first)?;
    for part in rest {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn display(value: &Value) -> String {
    match value {
        Value::Null | Value::Object(_) => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(","),
    }
}
