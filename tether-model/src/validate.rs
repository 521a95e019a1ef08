//! Rule evaluation and error messages.

use crate::schema::{FieldSpec, Format, Rule, RuleType};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};
use tether_core::Value;
use tracing::debug;

/// A custom string check.
pub type FormatCheck = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Why a value failed its rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Required,
    Type,
    Equals,
    Min,
    Max,
    Format,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Required => "required",
            ErrorKind::Type => "type",
            ErrorKind::Equals => "equals",
            ErrorKind::Min => "min",
            ErrorKind::Max => "max",
            ErrorKind::Format => "format",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluates a [`Rule`] against a value.
pub trait RuleEvaluator: Send + Sync {
    fn evaluate(&self, rule: &Rule, value: &Value) -> Result<(), ErrorKind>;
}

/// Named format checks.
#[derive(Clone, Default)]
pub struct Formats {
    checks: HashMap<String, FormatCheck>,
}

impl Formats {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in `email`, `ip` and `url` checks.
    pub fn standard() -> Self {
        let mut formats = Self::new();
        formats.register("email", is_email);
        formats.register("ip", |s| s.parse::<IpAddr>().is_ok());
        formats.register("url", is_url);
        formats
    }

    pub fn register<F>(&mut self, name: impl Into<String>, check: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.checks.insert(name.into(), Arc::new(check));
    }

    /// Runs the named check. `None` if no check is registered under `name`.
    pub fn check(&self, name: &str, value: &str) -> Option<bool> {
        self.checks.get(name).map(|check| check(value))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.checks.contains_key(name)
    }
}

impl fmt::Debug for Formats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.checks.keys().collect();
        names.sort();
        f.debug_struct("Formats").field("names", &names).finish()
    }
}

fn is_email(s: &str) -> bool {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(s))
}

fn is_url(s: &str) -> bool {
    static URL: OnceLock<Option<Regex>> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r"^(https?|ftp)://[^\s/$.?#][^\s]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(s))
}

/// The default evaluator.
///
/// Blank values (null or `""`) pass unless the rule is `required`. Then, in
/// order: type, equality, and either length/format (strings) or magnitude
/// (everything else) are checked, and the first failure is reported.
#[derive(Debug, Clone)]
pub struct StandardEvaluator {
    formats: Formats,
}

impl StandardEvaluator {
    pub fn new() -> Self {
        Self {
            formats: Formats::standard(),
        }
    }

    pub fn with_formats(formats: Formats) -> Self {
        Self { formats }
    }

    /// Registers an extra named format.
    pub fn with_format<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.formats.register(name, check);
        self
    }

    pub fn formats(&self) -> &Formats {
        &self.formats
    }

    fn check_format(&self, format: &Format, value: &str) -> bool {
        match format {
            Format::Named(name) => self.formats.check(name, value).unwrap_or_else(|| {
                debug!(format = %name, "unknown format, skipping check");
                true
            }),
            Format::Pattern(re) => re.is_match(value),
            Format::Check(check) => check(value),
        }
    }
}

impl Default for StandardEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEvaluator for StandardEvaluator {
    fn evaluate(&self, rule: &Rule, value: &Value) -> Result<(), ErrorKind> {
        if value.is_blank() {
            return if rule.required {
                Err(ErrorKind::Required)
            } else {
                Ok(())
            };
        }
        if let Some(kind) = rule.kind {
            if !type_matches(kind, value) {
                return Err(ErrorKind::Type);
            }
        }
        if let Some(equals) = &rule.equals {
            return if equals.matches(value) {
                Ok(())
            } else {
                Err(ErrorKind::Equals)
            };
        }

        if let Value::String(s) = value {
            let len = s.chars().count() as f64;
            check_bounds(rule, len)?;
            if rule.format.iter().any(|f| !self.check_format(f, s)) {
                return Err(ErrorKind::Format);
            }
            return Ok(());
        }

        let magnitude = match value {
            Value::List(items) => Some(items.len() as f64),
            other => other.as_f64(),
        };
        match magnitude {
            Some(m) => check_bounds(rule, m),
            None => Ok(()),
        }
    }
}

fn type_matches(kind: RuleType, value: &Value) -> bool {
    match kind {
        RuleType::String => matches!(value, Value::String(_)),
        RuleType::Int => value.as_i64().is_some(),
        RuleType::Float => value.is_number(),
        RuleType::Bool => matches!(value, Value::Bool(_)),
        RuleType::Date => matches!(value, Value::Date(_)),
        RuleType::Array => matches!(value, Value::List(_)),
        RuleType::Model => matches!(value, Value::Entity(_)),
    }
}

fn check_bounds(rule: &Rule, measure: f64) -> Result<(), ErrorKind> {
    if rule.min.is_some_and(|min| measure < min) {
        return Err(ErrorKind::Min);
    }
    if rule.max.is_some_and(|max| measure > max) {
        return Err(ErrorKind::Max);
    }
    Ok(())
}

/// Human-readable message for a recorded error.
pub fn format_error_message(field: Option<&FieldSpec>, error: ErrorKind) -> String {
    let title = field
        .and_then(|f| f.title.as_deref())
        .unwrap_or("This field");
    let rule = field.and_then(|f| f.rule.as_ref());

    if error == ErrorKind::Format {
        if let Some(instructions) = field.and_then(|f| f.instructions.as_deref()) {
            return instructions.to_string();
        }
    }

    let is_string = rule.is_some_and(|r| r.kind == Some(RuleType::String));
    let (len, chars) = if is_string {
        ("The length of ", " characters")
    } else {
        ("", "")
    };

    match (error, rule) {
        (ErrorKind::Required, _) => format!("{title} is required"),
        (ErrorKind::Min, Some(Rule { min: Some(min), .. })) => {
            format!("{len}{title} must be greater than or equal to {min}{chars}")
        }
        (ErrorKind::Max, Some(Rule { max: Some(max), .. })) => {
            format!("{len}{title} must be less than or equal to {max}{chars}")
        }
        (ErrorKind::Format, Some(rule)) => match rule.format_name() {
            Some(name) => format!("{title} is not a valid {name}"),
            None => format!("{title} is not valid"),
        },
        _ => format!("{title} is not valid"),
    }
}
