use crate::handler::EntityHandler;
use crate::validate::{FormatCheck, RuleEvaluator, StandardEvaluator};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{Attributes, Value};

/// Declares an entity type: its id attribute, defaults, per-field metadata
/// and how validation is scheduled.
///
/// Schemas are shared between entities behind an `Arc`.
#[derive(Clone)]
pub struct EntitySchema {
    /// Attribute holding the persisted identifier.
    pub id_key: String,
    /// Attributes every new entity starts with. Input data wins on conflict.
    pub defaults: Attributes,
    pub fields: BTreeMap<String, FieldSpec>,
    /// Base URL for entities that do not belong to a set.
    pub url_root: Option<String>,
    pub validation: ValidationPolicy,
    pub evaluator: Arc<dyn RuleEvaluator>,
    pub handler: Option<Arc<dyn EntityHandler>>,
}

impl EntitySchema {
    pub fn new() -> Self {
        Self {
            id_key: "id".to_string(),
            defaults: Attributes::new(),
            fields: BTreeMap::new(),
            url_root: None,
            validation: ValidationPolicy::default(),
            evaluator: Arc::new(StandardEvaluator::new()),
            handler: None,
        }
    }

    pub fn with_id_key(mut self, key: impl Into<String>) -> Self {
        self.id_key = key.into();
        self
    }

    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, field: FieldSpec) -> Self {
        self.fields.insert(key.into(), field);
        self
    }

    pub fn with_url_root(mut self, url: impl Into<String>) -> Self {
        self.url_root = Some(url.into());
        self
    }

    pub fn with_validation(mut self, policy: ValidationPolicy) -> Self {
        self.validation = policy;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn RuleEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn EntityHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.get(key)
    }

    /// Wraps the schema for sharing.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Default for EntitySchema {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("id_key", &self.id_key)
            .field("defaults", &self.defaults)
            .field("fields", &self.fields)
            .field("url_root", &self.url_root)
            .field("validation", &self.validation)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// When an entity re-validates after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationPolicy {
    /// Validate synchronously inside `set`/`unset`.
    #[default]
    Immediate,
    /// Validate once edits have been quiet for the given duration. Each edit
    /// restarts the timer; a completed sync cancels it.
    Debounced(Duration),
    /// Only validate on an explicit [`Entity::validate`](crate::Entity::validate).
    Disabled,
}

/// Display and validation metadata for one attribute.
#[derive(Debug, Clone, Default)]
pub struct FieldSpec {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    /// Replaces the generated message for `format` errors.
    pub instructions: Option<String>,
    pub rule: Option<Rule>,
    /// Allowed values. Used as the rule's `equals` when it has none.
    pub choices: Option<Equals>,
    pub encoding: Option<Encoding>,
}

impl FieldSpec {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_rule(rule: Rule) -> Self {
        Self {
            rule: Some(rule),
            ..Self::default()
        }
    }

    /// Shorthand for an optional string field.
    pub fn string() -> Self {
        Self::with_rule(Rule::new(RuleType::String))
    }

    /// Shorthand for a required string field.
    pub fn required_string() -> Self {
        Self::with_rule(Rule::new(RuleType::String).required())
    }

    /// Shorthand for an integer field decoded from input text.
    pub fn int() -> Self {
        Self::with_rule(Rule::new(RuleType::Int)).encoding(Encoding::Int)
    }

    /// Shorthand for a float field decoded from input text.
    pub fn float() -> Self {
        Self::with_rule(Rule::new(RuleType::Float)).encoding(Encoding::Float)
    }

    /// Shorthand for a boolean field.
    pub fn bool() -> Self {
        Self::with_rule(Rule::new(RuleType::Bool))
    }

    /// Shorthand for a calendar date field (`yyyy-mm-dd` on the wire).
    pub fn date() -> Self {
        Self::with_rule(Rule::new(RuleType::Date)).encoding(Encoding::Date)
    }

    /// Shorthand for a timestamp field (ISO-8601 on the wire).
    pub fn datetime() -> Self {
        Self::with_rule(Rule::new(RuleType::Date)).encoding(Encoding::DateTime)
    }

    /// Shorthand for a string field limited to fixed choices.
    pub fn choice<I, V>(choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            choices: Some(Equals::one_of(choices)),
            ..Self::with_rule(Rule::new(RuleType::String))
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.instructions = Some(text.into());
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn choices(mut self, choices: Equals) -> Self {
        self.choices = Some(choices);
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// The rule to evaluate, with `choices` folded in as `equals` when the
    /// rule does not constrain equality itself.
    pub fn effective_rule(&self) -> Option<Rule> {
        let mut rule = self.rule.clone()?;
        if rule.equals.is_none() {
            rule.equals = self.choices.clone();
        }
        Some(rule)
    }
}

/// The value type a rule expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    String,
    Int,
    Float,
    Bool,
    Date,
    Array,
    /// An embedded entity.
    Model,
}

/// A declarative validation rule.
#[derive(Debug, Clone, Default)]
pub struct Rule {
    pub required: bool,
    /// Expected type. `None` accepts any type.
    pub kind: Option<RuleType>,
    /// Every listed format must match. Only checked for strings.
    pub format: Vec<Format>,
    pub equals: Option<Equals>,
    /// Minimum length for strings and lists, minimum magnitude otherwise.
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Rule {
    pub fn new(kind: RuleType) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn equals(mut self, equals: Equals) -> Self {
        self.equals = Some(equals);
        self
    }

    /// Adds a format looked up by name in the evaluator's registry.
    pub fn format(mut self, name: impl Into<String>) -> Self {
        self.format.push(Format::Named(name.into()));
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.format.push(Format::Pattern(pattern));
        self
    }

    pub fn check<F>(mut self, check: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.format.push(Format::Check(Arc::new(check)));
        self
    }

    /// The format name, when the rule has exactly one named format.
    pub fn format_name(&self) -> Option<&str> {
        match self.format.as_slice() {
            [Format::Named(name)] => Some(name),
            _ => None,
        }
    }
}

/// An equality constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Equals {
    /// The value must equal this one.
    Scalar(Value),
    /// The value must be one of these.
    OneOf(Vec<Value>),
    /// The value, as text, must be a key of this map. The map values are
    /// display labels.
    Keys(BTreeMap<String, Value>),
}

impl Equals {
    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Equals::OneOf(values.into_iter().map(Into::into).collect())
    }

    pub fn keys<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Equals::Keys(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Equals::Scalar(expected) => expected == value,
            Equals::OneOf(values) => values.iter().any(|v| v == value),
            Equals::Keys(map) => map.contains_key(&value.to_string()),
        }
    }
}

/// A string format check.
#[derive(Clone)]
pub enum Format {
    /// Looked up in the evaluator's [`Formats`](crate::Formats) registry.
    Named(String),
    Pattern(Regex),
    Check(FormatCheck),
}

impl fmt::Debug for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Format::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Format::Check(_) => f.write_str("Check(..)"),
        }
    }
}

/// How an attribute is converted to and from input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    /// `yyyy-mm-dd`
    #[serde(rename = "date")]
    Date,
    /// `hh:mm`
    #[serde(rename = "time")]
    Time,
    /// ISO-8601 with milliseconds and `Z`.
    #[serde(rename = "datetime")]
    DateTime,
    /// `yyyy-mm-ddThh:mm:ss`
    #[serde(rename = "datetime-local")]
    DateTimeLocal,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "float")]
    Float,
}

impl Encoding {
    /// Numeric encodings only translate user input; they never apply to JSON.
    pub const fn is_input_only(&self) -> bool {
        matches!(self, Encoding::Number | Encoding::Int | Encoding::Float)
    }
}
