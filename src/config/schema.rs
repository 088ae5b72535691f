//! Declarative schema descriptions for feature configuration sections.
//!
//! A [`Schema`] is a plain value: features build one in
//! [`Feature::schema`](crate::features::Feature::schema) and the validator
//! walks a YAML subtree against it, collecting every [`Violation`] instead of
//! stopping at the first.
use regex::Regex;
use serde_yaml::{Mapping, Value};

/// Upper bound on branch pattern length, to keep regex compilation cheap.
pub const MAX_PATTERN_LENGTH: usize = 1000;

/// Structural description of a YAML subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schema {
    /// Accept anything.
    Any,
    /// Only `null` / `~`.
    Null,
    /// `true` or `false`.
    Bool,
    /// Integer within an inclusive range.
    Int {
        /// Smallest accepted value.
        min: i64,
        /// Largest accepted value.
        max: i64,
    },
    /// Any string.
    Str,
    /// A string that is not empty or whitespace.
    NonEmptyStr,
    /// A `local@domain.tld` address.
    Email,
    /// A branch-matching regular expression (non-empty, bounded, compilable).
    BranchPattern,
    /// A string matching `pattern` in full; `description` names it in errors.
    Matches {
        /// Regular expression the whole value must match.
        pattern: &'static str,
        /// Human-readable name of the accepted format.
        description: &'static str,
    },
    /// One of a fixed set of strings.
    Enum(&'static [&'static str]),
    /// A list whose items all match the inner schema.
    Seq(Box<Self>),
    /// A mapping with a fixed set of known keys. Unknown keys are rejected.
    Map(Vec<Field>),
    /// A mapping with arbitrary string keys and uniform values.
    MapOf(Box<Self>),
    /// The inner schema, or `null`.
    Nullable(Box<Self>),
}

/// One key of a [`Schema::Map`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Key name.
    pub key: &'static str,
    /// Schema of the value.
    pub schema: Schema,
    /// Whether the key must be present.
    pub required: bool,
}

impl Field {
    /// A key that must be present.
    #[must_use]
    pub const fn required(key: &'static str, schema: Schema) -> Self {
        Self {
            key,
            schema,
            required: true,
        }
    }

    /// A key that may be omitted.
    #[must_use]
    pub const fn optional(key: &'static str, schema: Schema) -> Self {
        Self {
            key,
            schema,
            required: false,
        }
    }
}

/// A single problem found while validating a subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted key path of the offending node.
    pub path: String,
    /// What was wrong with it.
    pub message: String,
}

impl Schema {
    /// Fixed-key mapping.
    #[must_use]
    pub fn map(fields: impl IntoIterator<Item = Field>) -> Self {
        Self::Map(fields.into_iter().collect())
    }

    /// Free-key mapping with uniform values.
    #[must_use]
    pub fn map_of(values: Self) -> Self {
        Self::MapOf(Box::new(values))
    }

    /// List of uniform items.
    #[must_use]
    pub fn seq(items: Self) -> Self {
        Self::Seq(Box::new(items))
    }

    /// The given schema, or `null`.
    #[must_use]
    pub fn nullable(inner: Self) -> Self {
        Self::Nullable(Box::new(inner))
    }

    /// Whether the schema describes a mapping (so `null` means "empty").
    #[must_use]
    pub const fn is_mapping(&self) -> bool {
        matches!(self, Self::Map(_) | Self::MapOf(_))
    }

    /// Validate `value`, reporting violations relative to `path`.
    #[must_use]
    pub fn validate(&self, value: &Value, path: &str) -> Vec<Violation> {
        let mut out = Vec::new();
        self.check(value, path, &mut out);
        out
    }

    fn check(&self, value: &Value, path: &str, out: &mut Vec<Violation>) {
        match (self, value) {
            (Self::Any, _)
            | (Self::Nullable(_) | Self::Null | Self::MapOf(_), Value::Null)
            | (Self::Bool, Value::Bool(_))
            | (Self::Str, Value::String(_)) => {}
            (Self::Nullable(inner), other) => inner.check(other, path, out),
            (Self::Int { min, max }, Value::Number(n)) => match n.as_i64() {
                Some(i) if (*min..=*max).contains(&i) => {}
                Some(i) => push(out, path, format!("{i} is outside {min}..={max}")),
                None => push(out, path, format!("expected an integer, found {n}")),
            },
            (Self::NonEmptyStr, Value::String(s)) => {
                if s.trim().is_empty() {
                    push(out, path, "must not be empty");
                }
            }
            (Self::Email, Value::String(s)) => {
                if !is_email(s) {
                    push(out, path, format!("'{s}' is not a valid e-mail address"));
                }
            }
            (Self::BranchPattern, Value::String(s)) => {
                if let Err(message) = check_branch_pattern(s) {
                    push(out, path, message);
                }
            }
            (
                Self::Matches {
                    pattern,
                    description,
                },
                Value::String(s),
            ) => {
                let anchored = format!("^(?:{pattern})$");
                match Regex::new(&anchored) {
                    Ok(re) if re.is_match(s) => {}
                    Ok(_) => push(out, path, format!("'{s}' is not {description}")),
                    Err(e) => push(out, path, format!("schema pattern does not compile: {e}")),
                }
            }
            (Self::Enum(options), Value::String(s)) => {
                if !options.contains(&s.as_str()) {
                    push(
                        out,
                        path,
                        format!("'{s}' is not one of: {}", options.join(", ")),
                    );
                }
            }
            (Self::Seq(item), Value::Sequence(items)) => {
                for (i, v) in items.iter().enumerate() {
                    item.check(v, &format!("{path}[{i}]"), out);
                }
            }
            (Self::Map(fields), Value::Null) => check_fields(fields, &Mapping::new(), path, out),
            (Self::Map(fields), Value::Mapping(map)) => check_fields(fields, map, path, out),
            (Self::MapOf(inner), Value::Mapping(map)) => {
                for (k, v) in map {
                    match k.as_str() {
                        Some(key) => inner.check(v, &child(path, key), out),
                        None => push(out, path, format!("keys must be strings, found {}", kind(k))),
                    }
                }
            }
            (expected, found) => push(
                out,
                path,
                format!("expected {}, found {}", expected.describe(), kind(found)),
            ),
        }
    }

    /// Short description used in "expected …" messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Any => "any value".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool => "a boolean".to_string(),
            Self::Int { .. } => "an integer".to_string(),
            Self::Str | Self::NonEmptyStr => "a string".to_string(),
            Self::Email => "an e-mail address".to_string(),
            Self::BranchPattern => "a branch pattern".to_string(),
            Self::Matches { description, .. } => (*description).to_string(),
            Self::Enum(options) => format!("one of {}", options.join(", ")),
            Self::Seq(_) => "a list".to_string(),
            Self::Map(_) | Self::MapOf(_) => "a mapping".to_string(),
            Self::Nullable(inner) => format!("{} or null", inner.describe()),
        }
    }
}

fn check_fields(fields: &[Field], map: &Mapping, path: &str, out: &mut Vec<Violation>) {
    for (k, v) in map {
        let Some(key) = k.as_str() else {
            push(out, path, format!("keys must be strings, found {}", kind(k)));
            continue;
        };
        match fields.iter().find(|f| f.key == key) {
            Some(field) => field.schema.check(v, &child(path, key), out),
            None => {
                let known = fields.iter().map(|f| f.key).collect::<Vec<_>>().join(", ");
                push(
                    out,
                    &child(path, key),
                    format!("unexpected key (allowed: {known})"),
                );
            }
        }
    }
    for field in fields.iter().filter(|f| f.required) {
        if !map.contains_key(field.key) {
            push(out, &child(path, field.key), "required key is missing");
        }
    }
}

fn push(out: &mut Vec<Violation>, path: &str, message: impl Into<String>) {
    out.push(Violation {
        path: path.to_string(),
        message: message.into(),
    });
}

/// Join a dotted path and a key.
#[must_use]
pub fn child(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Describe the kind of a YAML node for error messages.
#[must_use]
pub const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !s.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Compile a branch pattern the way branch rules are matched: anchored at the
/// start of the branch name, unanchored at the end.
///
/// # Errors
///
/// Returns the regex compilation error for invalid patterns.
pub fn compile_branch_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})"))
}

fn check_branch_pattern(raw: &str) -> Result<(), String> {
    let pattern = raw.trim();
    if pattern.is_empty() {
        return Err("pattern cannot be empty".to_string());
    }
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(format!(
            "pattern too long ({} chars), maximum {MAX_PATTERN_LENGTH}",
            pattern.len()
        ));
    }
    compile_branch_pattern(pattern)
        .map(|_| ())
        .map_err(|e| format!("invalid regex pattern: {e}"))
}
