//! Property sources and placeholder resolution.

use std::fmt;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::config::ContextSettings;
use crate::error::{DiError, DiResult};

/// Name of the singleton holding a snapshot of the context environment.
pub const ENVIRONMENT_BEAN_NAME: &str = "environment";

const PLACEHOLDER: &str = r"\$\{([^}:]+)(?::([^}]*))?\}";

/// One source of string properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertySource {
    /// Fixed key/value pairs
    Map {
        name: String,
        values: IndexMap<String, String>,
    },
    /// Process environment, read at lookup time. `db.url` is looked up as
    /// `<prefix>db.url` and `<prefix>DB_URL`.
    SystemEnvironment { prefix: String },
}

impl PropertySource {
    pub fn map<I, K, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        PropertySource::Map {
            name: name.into(),
            values: values.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn system_environment(prefix: impl Into<String>) -> Self {
        PropertySource::SystemEnvironment { prefix: prefix.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            PropertySource::Map { name, .. } => name,
            PropertySource::SystemEnvironment { .. } => "systemEnvironment",
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match self {
            PropertySource::Map { values, .. } => values.get(key).cloned(),
            PropertySource::SystemEnvironment { prefix } => {
                let upper = key.replace(['.', '-'], "_").to_uppercase();
                std::env::var(format!("{prefix}{key}"))
                    .or_else(|_| std::env::var(format!("{prefix}{upper}")))
                    .ok()
            }
        }
    }
}

/// Ordered property sources; the first source holding a key wins.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{Environment, PropertySource};
///
/// let mut env = Environment::new();
/// env.add_last(PropertySource::map("defaults", [("port", "8080"), ("host", "localhost")]));
/// env.add_first(PropertySource::map("overrides", [("port", "9090")]));
///
/// assert_eq!(env.property("port").as_deref(), Some("9090"));
/// assert_eq!(env.resolve_placeholders("http://${host}:${port}/${path:index}"), "http://localhost:9090/index");
///
/// env.set_required_properties(["host", "user"]);
/// assert!(env.validate_required_properties().is_err());
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Environment {
    sources: Vec<PropertySource>,
    required: Vec<String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inline properties first, then prefixed environment variables when a
    /// prefix is configured.
    pub fn from_settings(settings: &ContextSettings) -> Self {
        let mut env = Self::new();
        env.add_last(PropertySource::Map {
            name: "contextProperties".to_string(),
            values: settings.properties.clone(),
        });
        if let Some(prefix) = &settings.env_prefix {
            env.add_last(PropertySource::system_environment(prefix.clone()));
        }
        env.set_required_properties(settings.required_properties.iter().cloned());
        env
    }

    pub fn add_first(&mut self, source: PropertySource) {
        self.sources.insert(0, source);
    }

    pub fn add_last(&mut self, source: PropertySource) {
        self.sources.push(source);
    }

    /// Appends the sources of `parent` this environment does not already
    /// hold; own sources keep precedence.
    pub fn merge(&mut self, parent: &Environment) {
        for source in &parent.sources {
            if !self.sources.contains(source) {
                self.sources.push(source.clone());
            }
        }
    }

    pub fn property_sources(&self) -> &[PropertySource] {
        &self.sources
    }

    pub fn property(&self, key: &str) -> Option<String> {
        self.sources.iter().find_map(|source| source.get(key))
    }

    pub fn property_or(&self, key: &str, default: &str) -> String {
        self.property(key).unwrap_or_else(|| default.to_string())
    }

    pub fn contains_property(&self, key: &str) -> bool {
        self.property(key).is_some()
    }

    pub fn required_property(&self, key: &str) -> DiResult<String> {
        self.property(key)
            .ok_or_else(|| DiError::Configuration(format!("Required key '{key}' not found")))
    }

    pub fn set_required_properties<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = keys.into_iter().map(Into::into).collect();
    }

    /// Fails listing every required key that does not resolve.
    pub fn validate_required_properties(&self) -> DiResult<()> {
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|key| !self.contains_property(key))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(DiError::Configuration(format!(
            "The following properties were declared as required but could not be resolved: [{}]",
            missing.join(", ")
        )))
    }

    /// Resolves `${key}` and `${key:default}`; unresolvable placeholders
    /// stay as they are.
    pub fn resolve_placeholders(&self, text: &str) -> String {
        resolve_placeholders_with(text, |key| self.property(key), true).unwrap_or_else(|_| text.to_string())
    }

    /// Like [`resolve_placeholders`](Self::resolve_placeholders) but fails on
    /// a placeholder without value or default.
    pub fn resolve_required_placeholders(&self, text: &str) -> DiResult<String> {
        resolve_placeholders_with(text, |key| self.property(key), false)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("sources", &self.sources.iter().map(PropertySource::name).collect::<Vec<_>>())
            .field("required", &self.required)
            .finish()
    }
}

fn placeholder_pattern() -> DiResult<&'static Regex> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(pattern) = PATTERN.get() {
        return Ok(pattern);
    }
    let compiled = Regex::new(PLACEHOLDER).map_err(|e| DiError::Configuration(e.to_string()))?;
    Ok(PATTERN.get_or_init(|| compiled))
}

/// Replaces placeholders using `lookup`. Resolved values are themselves
/// resolved; a key that refers back to itself is an error.
pub(crate) fn resolve_placeholders_with(
    text: &str,
    lookup: impl Fn(&str) -> Option<String>,
    ignore_unresolvable: bool,
) -> DiResult<String> {
    resolve_nested(text, &lookup, ignore_unresolvable, &mut Vec::new())
}

fn resolve_nested(
    text: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
    ignore_unresolvable: bool,
    visiting: &mut Vec<String>,
) -> DiResult<String> {
    let pattern = placeholder_pattern()?;
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for captures in pattern.captures_iter(text) {
        let (Some(whole), Some(key)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        last = whole.end();

        let key = key.as_str().trim();
        if visiting.iter().any(|k| k == key) {
            return Err(DiError::Configuration(format!(
                "Circular placeholder reference '{key}' in property definitions"
            )));
        }
        match lookup(key) {
            Some(value) => {
                visiting.push(key.to_string());
                let resolved = resolve_nested(&value, lookup, ignore_unresolvable, visiting)?;
                visiting.pop();
                out.push_str(&resolved);
            }
            None => match captures.get(2) {
                Some(default) => out.push_str(default.as_str()),
                None if ignore_unresolvable => out.push_str(whole.as_str()),
                None => {
                    return Err(DiError::Configuration(format!(
                        "Could not resolve placeholder '{key}' in value \"{text}\""
                    )))
                }
            },
        }
    }
    out.push_str(&text[last..]);
    Ok(out)
}
