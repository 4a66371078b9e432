//! Field extraction: one value (or list of values) read from an HTML element
//! or a JSON object, post-processed by a chain of [`Transform`]s.
//!
//! In configuration files a field may be written as a bare selector or path:
//!
//! ```toml
//! title = "h3 a"
//! cover = { selector = "img", attrs = ["data-src", "src"] }
//! key = { selector = "a", attrs = ["href"], transforms = [{ op = "last_segment" }] }
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::trace;

use crate::{
    error::Result,
    net::{html, json},
};

/// A string post-processing step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Transform {
    Trim,
    /// Last non-empty path segment, ignoring the query string
    LastSegment,
    /// Path segment at `index`, ignoring scheme and host
    Segment { index: usize },
    /// Text after the first occurrence, unchanged when absent
    After { text: String },
    /// Text before the first occurrence, unchanged when absent
    Before { text: String },
    StripPrefix { text: String },
    StripSuffix { text: String },
    /// Capture group of the first match. No match drops the value.
    Regex {
        pattern: String,
        #[serde(default = "default_group")]
        group: usize,
    },
    Replace { from: String, to: String },
    Lowercase,
    TitleCase,
    /// The address inside a CSS `url(...)` value
    CssUrl,
}

fn default_group() -> usize {
    1
}

static PATTERNS: Lazy<RwLock<HashMap<String, Regex>>> = Lazy::new(Default::default);

/// Compiles a regular expression once per process.
pub(crate) fn pattern(source: &str) -> Result<Regex> {
    if let Some(cached) = PATTERNS.read().ok().and_then(|cache| cache.get(source).cloned()) {
        return Ok(cached);
    }
    let compiled = Regex::new(source)?;
    if let Ok(mut cache) = PATTERNS.write() {
        cache.insert(source.to_string(), compiled.clone());
    }
    Ok(compiled)
}

impl Transform {
    pub fn apply(&self, value: String) -> Option<String> {
        let out = match self {
            Transform::Trim => value.trim().to_string(),
            Transform::LastSegment => path_segments(&value).last()?.to_string(),
            Transform::Segment { index } => path_segments(&value).nth(*index)?.to_string(),
            Transform::After { text } => match value.split_once(text.as_str()) {
                Some((_, rest)) => rest.to_string(),
                None => value,
            },
            Transform::Before { text } => match value.split_once(text.as_str()) {
                Some((head, _)) => head.to_string(),
                None => value,
            },
            Transform::StripPrefix { text } => match value.strip_prefix(text.as_str()) {
                Some(rest) => rest.to_string(),
                None => value,
            },
            Transform::StripSuffix { text } => match value.strip_suffix(text.as_str()) {
                Some(rest) => rest.to_string(),
                None => value,
            },
            Transform::Regex { pattern, group } => {
                let re = self::pattern(pattern).ok()?;
                re.captures(&value)?.get(*group)?.as_str().to_string()
            }
            Transform::Replace { from, to } => value.replace(from.as_str(), to),
            Transform::Lowercase => value.to_lowercase(),
            Transform::TitleCase => title_case(&value),
            Transform::CssUrl => css_url(&value)?,
        };
        Some(out)
    }

    pub fn validate(&self) -> Result<()> {
        if let Transform::Regex { pattern, group } = self {
            let re = self::pattern(pattern)?;
            if *group >= re.captures_len() {
                return Err(crate::Error::config(format!(
                    "pattern `{pattern}` has no capture group {group}"
                )));
            }
        }
        Ok(())
    }
}

fn path_segments(value: &str) -> impl Iterator<Item = &str> {
    let value = value.split(['?', '#']).next().unwrap_or_default();
    let path = match value.find("://") {
        Some(i) => value[i + 3..].split_once('/').map(|(_, p)| p).unwrap_or_default(),
        None => value,
    };
    path.split('/').filter(|s| !s.is_empty())
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn css_url(value: &str) -> Option<String> {
    let start = value.find("url(")? + 4;
    let rest = &value[start..];
    let end = rest.find(')')?;
    let inner = rest[..end].trim().trim_matches(|c| c == '\'' || c == '"');
    (!inner.is_empty()).then(|| inner.to_string())
}

/// Applies transforms, trims and drops empty or ignored values.
fn finish(raw: String, transforms: &[Transform], ignore: &[String]) -> Option<String> {
    let value = transforms
        .iter()
        .try_fold(raw, |value, transform| transform.apply(value))?;
    let value = value.trim();
    if value.is_empty() || ignore.iter().any(|i| i.to_lowercase() == value.to_lowercase()) {
        return None;
    }
    Some(value.to_string())
}

/// A value read from an HTML element.
///
/// With no selector the scope element itself is read. With no attributes the
/// element text is read; otherwise attributes are tried in order and the
/// pseudo-attribute `text` stands for the element text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FieldDef")]
pub struct Field {
    pub selector: Option<String>,
    pub attrs: Vec<String>,
    pub transforms: Vec<Transform>,
    /// Values treated as missing, compared case-insensitively
    pub ignore: Vec<String>,
    /// Tried when this field yields nothing
    pub fallback: Option<Box<Field>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldDef {
    Css(String),
    Full {
        selector: Option<String>,
        #[serde(default)]
        attrs: Vec<String>,
        #[serde(default)]
        transforms: Vec<Transform>,
        #[serde(default)]
        ignore: Vec<String>,
        fallback: Option<Box<Field>>,
    },
}

impl From<FieldDef> for Field {
    fn from(def: FieldDef) -> Self {
        match def {
            FieldDef::Css(selector) => Field::css(selector),
            FieldDef::Full {
                selector,
                attrs,
                transforms,
                ignore,
                fallback,
            } => Field {
                selector,
                attrs,
                transforms,
                ignore,
                fallback,
            },
        }
    }
}

impl Field {
    /// Text of the first element matching `selector`.
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            ..Default::default()
        }
    }

    /// First non-empty attribute out of `attrs` on elements matching
    /// `selector`.
    pub fn attr(selector: impl Into<String>, attrs: &[&str]) -> Self {
        Self {
            selector: Some(selector.into()),
            attrs: attrs.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn with_fallback(mut self, fallback: Field) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// First usable value below `scope`.
    pub fn first(&self, scope: ElementRef) -> Option<String> {
        self.elements(scope)
            .into_iter()
            .find_map(|el| self.read(el))
            .or_else(|| self.fallback.as_ref()?.first(scope))
    }

    /// Every usable value below `scope`, in document order.
    pub fn all(&self, scope: ElementRef) -> Vec<String> {
        let values: Vec<String> = self
            .elements(scope)
            .into_iter()
            .filter_map(|el| self.read(el))
            .collect();
        match &self.fallback {
            Some(fallback) if values.is_empty() => fallback.all(scope),
            _ => values,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(css) = &self.selector {
            html::selector(css)?;
        }
        for transform in &self.transforms {
            transform.validate()?;
        }
        if let Some(fallback) = &self.fallback {
            fallback.validate()?;
        }
        Ok(())
    }

    fn elements<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        let Some(css) = &self.selector else {
            return vec![scope];
        };
        match html::selector(css) {
            Ok(sel) => scope.select(&sel).collect(),
            Err(_) => {
                trace!(selector = %css, "skipping field with invalid selector");
                Vec::new()
            }
        }
    }

    fn read(&self, element: ElementRef) -> Option<String> {
        let raw = if self.attrs.is_empty() {
            html::text_of(element)
        } else {
            self.attrs.iter().find_map(|attr| {
                let value = if attr == "text" {
                    html::text_of(element)
                } else {
                    element.value().attr(attr)?.trim().to_string()
                };
                (!value.is_empty()).then_some(value)
            })?
        };
        finish(raw, &self.transforms, &self.ignore)
    }
}

/// A value read from a JSON object by path.
///
/// Paths follow [`net::json::select_all`](crate::net::json::select_all):
/// dot notation with `*` wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "JsonFieldDef")]
pub struct JsonField {
    pub path: String,
    pub transforms: Vec<Transform>,
    pub ignore: Vec<String>,
    pub fallback: Option<Box<JsonField>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonFieldDef {
    Path(String),
    Full {
        path: String,
        #[serde(default)]
        transforms: Vec<Transform>,
        #[serde(default)]
        ignore: Vec<String>,
        fallback: Option<Box<JsonField>>,
    },
}

impl From<JsonFieldDef> for JsonField {
    fn from(def: JsonFieldDef) -> Self {
        match def {
            JsonFieldDef::Path(path) => JsonField::path(path),
            JsonFieldDef::Full {
                path,
                transforms,
                ignore,
                fallback,
            } => JsonField {
                path,
                transforms,
                ignore,
                fallback,
            },
        }
    }
}

impl JsonField {
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn first(&self, value: &Value) -> Option<String> {
        json::select_all(value, &self.path)
            .into_iter()
            .find_map(|v| finish(json::to_text(v)?, &self.transforms, &self.ignore))
            .or_else(|| self.fallback.as_ref()?.first(value))
    }

    pub fn all(&self, value: &Value) -> Vec<String> {
        let values: Vec<String> = json::select_all(value, &self.path)
            .into_iter()
            .filter_map(|v| finish(json::to_text(v)?, &self.transforms, &self.ignore))
            .collect();
        match &self.fallback {
            Some(fallback) if values.is_empty() => fallback.all(value),
            _ => values,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for transform in &self.transforms {
            transform.validate()?;
        }
        if let Some(fallback) = &self.fallback {
            fallback.validate()?;
        }
        Ok(())
    }
}
