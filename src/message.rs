//! Message lookup with argument substitution.

use std::fmt;
use std::sync::OnceLock;

use indexmap::IndexMap;
use parking_lot::RwLock;
use regex::{Captures, Regex};

use crate::error::{DiError, DiResult};

/// Name of the message source singleton.
pub const MESSAGE_SOURCE_BEAN_NAME: &str = "messageSource";

/// Resolves message codes to text.
pub trait MessageSource: Send + Sync {
    /// Message for `code` with `{0}`, `{1}`.. replaced by `args`; `default`
    /// is used (and formatted) when the code is unknown.
    fn message(&self, code: &str, args: &[&dyn fmt::Display], default: Option<&str>) -> DiResult<String>;
}

/// In-memory message source.
///
/// The context registers an empty one under `messageSource` when no such
/// bean is defined.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{MessageSource, StaticMessageSource};
///
/// let messages = StaticMessageSource::new().with_message("greeting", "Hello, {0}! You have {1} messages.");
/// assert_eq!(
///     messages.message("greeting", &[&"Ada", &3], None).unwrap(),
///     "Hello, Ada! You have 3 messages."
/// );
/// assert_eq!(messages.message("missing", &[], Some("n/a")).unwrap(), "n/a");
/// assert!(messages.message("missing", &[], None).is_err());
/// ```
#[derive(Default)]
pub struct StaticMessageSource {
    messages: RwLock<IndexMap<String, String>>,
    use_code_as_default: bool,
}

impl StaticMessageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(self, code: impl Into<String>, template: impl Into<String>) -> Self {
        self.add_message(code, template);
        self
    }

    /// Unknown codes without a default resolve to the code itself.
    pub fn use_code_as_default_message(mut self, enabled: bool) -> Self {
        self.use_code_as_default = enabled;
        self
    }

    pub fn add_message(&self, code: impl Into<String>, template: impl Into<String>) {
        self.messages.write().insert(code.into(), template.into());
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

impl MessageSource for StaticMessageSource {
    fn message(&self, code: &str, args: &[&dyn fmt::Display], default: Option<&str>) -> DiResult<String> {
        if let Some(template) = self.messages.read().get(code) {
            return format_message(template, args);
        }
        if let Some(default) = default {
            return format_message(default, args);
        }
        if self.use_code_as_default {
            return Ok(code.to_string());
        }
        Err(DiError::Configuration(format!("No message found under code '{code}'")))
    }
}

impl fmt::Debug for StaticMessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticMessageSource")
            .field("codes", &self.messages.read().keys().collect::<Vec<_>>())
            .field("use_code_as_default", &self.use_code_as_default)
            .finish()
    }
}

fn argument_pattern() -> DiResult<&'static Regex> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(pattern) = PATTERN.get() {
        return Ok(pattern);
    }
    let compiled = Regex::new(r"\{(\d+)\}").map_err(|e| DiError::Configuration(e.to_string()))?;
    Ok(PATTERN.get_or_init(|| compiled))
}

/// `{n}` becomes the n-th argument; indices without an argument stay as
/// written.
fn format_message(template: &str, args: &[&dyn fmt::Display]) -> DiResult<String> {
    if args.is_empty() {
        return Ok(template.to_string());
    }
    let pattern = argument_pattern()?;
    let formatted = pattern.replace_all(template, |caps: &Captures<'_>| {
        caps.get(1)
            .and_then(|index| index.as_str().parse::<usize>().ok())
            .and_then(|index| args.get(index))
            .map(|arg| arg.to_string())
            .unwrap_or_else(|| caps.get(0).map_or_else(String::new, |m| m.as_str().to_string()))
    });
    Ok(formatted.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_and_out_of_range_arguments() {
        let messages = StaticMessageSource::new().with_message("echo", "{0}-{0} {2}");
        assert_eq!(messages.message("echo", &[&"a"], None).unwrap(), "a-a {2}");
    }

    #[test]
    fn default_is_formatted() {
        let messages = StaticMessageSource::new();
        assert_eq!(messages.message("x", &[&7], Some("value {0}")).unwrap(), "value 7");
    }

    #[test]
    fn code_as_default() {
        let messages = StaticMessageSource::new().use_code_as_default_message(true);
        assert_eq!(messages.message("some.code", &[], None).unwrap(), "some.code");
        assert!(messages.is_empty());
    }
}
