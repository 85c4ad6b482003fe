//! Placeholder templates for case files.
//!
//! A template is ordinary file text containing `{{ name }}` placeholders,
//! optionally followed by one filter: `{{ nu | scientific(4) }}`.
//!
//! | Filter          | Output for `1.5e-5`  |
//! |-----------------|----------------------|
//! | *(none)*        | `1.5e-5`             |
//! | `scientific`    | `1.500e-5`           |
//! | `scientific(1)` | `1.5e-5`             |
//! | `vector`        | `(1.5e-5 0 0)`       |
//! | `foam_bool`     | `yes` (zero → `no`)  |
//!
//! Rendering is strict in both directions: every placeholder needs a value and
//! every value needs a placeholder.
//!
//! Templates can also be cut from an existing case file by turning literal
//! values into placeholders ([`Template::from_case_file`]), and checked for
//! required placeholders without rendering ([`Template::check_placeholders`]).

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::TemplateError;
use crate::space::is_identifier;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Default digits after the decimal point for `scientific`
pub const DEFAULT_SCIENTIFIC_PRECISION: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Scientific(usize),
    Vector,
    FoamBool,
}

impl Filter {
    fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "scientific" => Ok(Filter::Scientific(DEFAULT_SCIENTIFIC_PRECISION)),
            "vector" => Ok(Filter::Vector),
            "foam_bool" => Ok(Filter::FoamBool),
            _ => {
                let precision = raw
                    .strip_prefix("scientific(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| format!("unknown filter '{raw}'"))?;
                precision
                    .trim()
                    .parse()
                    .map(Filter::Scientific)
                    .map_err(|_| format!("invalid precision in '{raw}'"))
            }
        }
    }

    fn apply(self, value: f64) -> String {
        match self {
            Filter::Scientific(precision) => format!("{value:.precision$e}"),
            Filter::Vector => format!("({} 0 0)", format_value(value)),
            Filter::FoamBool => String::from(if value != 0.0 { "yes" } else { "no" }),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Scientific(DEFAULT_SCIENTIFIC_PRECISION) => f.write_str("scientific"),
            Filter::Scientific(precision) => write!(f, "scientific({precision})"),
            Filter::Vector => f.write_str("vector"),
            Filter::FoamBool => f.write_str("foam_bool"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Placeholder { name: String, filter: Option<Filter> },
}

/// A parsed template, ready to be rendered any number of times
#[derive(Debug, Clone)]
pub struct Template {
    file: PathBuf,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template text; `file` is used in error messages only.
    pub fn parse(file: impl Into<PathBuf>, source: &str) -> Result<Self, TemplateError> {
        let file = file.into();
        let mut segments = Vec::new();
        let mut rest = source;
        let mut line = 1;

        while let Some(start) = rest.find(OPEN) {
            let (text, tail) = rest.split_at(start);
            line += text.matches('\n').count();
            if !text.is_empty() {
                segments.push(Segment::Text(text.to_string()));
            }

            let body_and_rest = &tail[OPEN.len()..];
            let syntax = |message: String| TemplateError::Syntax {
                file: file.clone(),
                line,
                message,
            };
            let end = body_and_rest
                .find(CLOSE)
                .ok_or_else(|| syntax("unterminated placeholder".to_string()))?;
            let body = &body_and_rest[..end];
            if body.contains('\n') {
                return Err(syntax("placeholder spans multiple lines".to_string()));
            }

            let mut parts = body.split('|').map(str::trim);
            let name = parts.next().unwrap_or_default();
            if !is_identifier(name) {
                return Err(syntax(format!("invalid placeholder name '{name}'")));
            }
            let filter = parts.next().map(Filter::parse).transpose().map_err(syntax)?;
            if parts.next().is_some() {
                return Err(syntax("at most one filter is allowed".to_string()));
            }

            segments.push(Segment::Placeholder {
                name: name.to_string(),
                filter,
            });
            rest = &body_and_rest[end + CLOSE.len()..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }
        Ok(Self { file, segments })
    }

    /// Read and parse a template file
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let source = fs::read_to_string(path).map_err(|source| TemplateError::MissingTemplate {
            file: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &source)
    }

    /// Template from an existing case file, replacing each `(value, name)`
    /// literal with `{{ name }}`.
    pub fn from_case_file(path: &Path, replacements: &[(&str, &str)]) -> Result<Self, TemplateError> {
        let text = fs::read_to_string(path).map_err(|source| TemplateError::MissingTemplate {
            file: path.to_path_buf(),
            source,
        })?;
        Self::from_case_text(path, &text, replacements)
    }

    /// Replace literal values in `text` with placeholders.
    ///
    /// A value only matches as a whole token, so `0.3` leaves `10.35` alone.
    /// Every value must occur at least once.
    pub fn from_case_text(
        file: impl Into<PathBuf>,
        text: &str,
        replacements: &[(&str, &str)],
    ) -> Result<Self, TemplateError> {
        let file = file.into();
        let mut text = text.to_string();
        for (value, name) in replacements {
            let (replaced, count) = replace_token(&text, value.trim(), &format!("{OPEN} {name} {CLOSE}"));
            if count == 0 {
                return Err(TemplateError::ValueNotFound {
                    file,
                    value: value.to_string(),
                });
            }
            tracing::debug!(file = %file.display(), value, name, count, "replaced value with placeholder");
            text = replaced;
        }
        Self::parse(file, &text)
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Fail with every name in `required` that has no placeholder
    pub fn check_placeholders<'a, I>(&self, required: I) -> Result<(), TemplateError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present = self.placeholders();
        let mut missing: Vec<String> = Vec::new();
        for name in required {
            if !present.contains(name) && !missing.iter().any(|m| m == name) {
                missing.push(name.to_string());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TemplateError::MissingPlaceholders {
                file: self.file.clone(),
                names: missing,
            })
        }
    }

    /// Distinct placeholder names
    pub fn placeholders(&self) -> BTreeSet<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder { name, .. } => Some(name.as_str()),
                Segment::Text(_) => None,
            })
            .collect()
    }

    /// Substitute all values in one pass.
    ///
    /// # Errors
    /// `UndefinedPlaceholder` for the first placeholder without a value, then
    /// `UnusedParameter` for the first value without a placeholder.
    pub fn render(&self, values: &[(&str, f64)]) -> Result<String, TemplateError> {
        let lookup: FxHashMap<&str, f64> = values.iter().copied().collect();
        let mut used = FxHashSet::default();
        let mut out = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder { name, filter } => {
                    let value = *lookup.get(name.as_str()).ok_or_else(|| {
                        TemplateError::UndefinedPlaceholder {
                            file: self.file.clone(),
                            name: name.clone(),
                        }
                    })?;
                    used.insert(name.as_str());
                    match filter {
                        Some(filter) => out.push_str(&filter.apply(value)),
                        None => out.push_str(&format_value(value)),
                    }
                }
            }
        }

        if let Some((name, _)) = values.iter().find(|(name, _)| !used.contains(name)) {
            return Err(TemplateError::UnusedParameter {
                file: self.file.clone(),
                name: name.to_string(),
            });
        }
        Ok(out)
    }
}

/// Template source text, placeholders in canonical `{{ name | filter }}` form
impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => f.write_str(text)?,
                Segment::Placeholder { name, filter: None } => write!(f, "{OPEN} {name} {CLOSE}")?,
                Segment::Placeholder {
                    name,
                    filter: Some(filter),
                } => write!(f, "{OPEN} {name} | {filter} {CLOSE}")?,
            }
        }
        Ok(())
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_')
}

/// Replace whole-token occurrences of `value`; returns the text and the count
fn replace_token(text: &str, value: &str, with: &str) -> (String, usize) {
    if value.is_empty() {
        return (text.to_string(), 0);
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut count = 0;
    for (start, matched) in text.match_indices(value) {
        let end = start + matched.len();
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        if before.is_some_and(is_token_char) || after.is_some_and(is_token_char) {
            continue;
        }
        out.push_str(&text[last..start]);
        out.push_str(with);
        last = end;
        count += 1;
    }
    out.push_str(&text[last..]);
    (out, count)
}

/// Shortest round-trip decimal form, exponent notation for very small or large magnitudes
pub fn format_value(value: f64) -> String {
    let magnitude = value.abs();
    if value != 0.0 && magnitude.is_finite() && !(1e-4..1e16).contains(&magnitude) {
        format!("{value:e}")
    } else {
        format!("{value}")
    }
}
