//! Context and proxy settings.
//!
//! Settings can be built in code or, with the `config` feature (on by
//! default), loaded from JSON.

use indexmap::IndexMap;
#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "config")]
use crate::error::{DiError, DiResult};

/// Settings for the auto-proxy creator.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::ProxySettings;
///
/// let settings = ProxySettings::default().expose_proxy(true);
/// assert!(settings.expose_proxy);
/// assert!(settings.apply_common_interceptors_first);
/// assert!(!settings.proxy_target_class);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ProxySettings {
    /// Proxy the concrete type even when an interface binding exists
    pub proxy_target_class: bool,
    /// Make the proxy reachable through `AopContext` during calls
    pub expose_proxy: bool,
    /// Reject advisor changes on created proxies
    pub frozen: bool,
    /// Common interceptors run before bean-specific advisors
    pub apply_common_interceptors_first: bool,
    /// Bean names of advisors or advice applied to every proxied bean
    pub interceptor_names: Vec<String>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            proxy_target_class: false,
            expose_proxy: false,
            frozen: false,
            apply_common_interceptors_first: true,
            interceptor_names: Vec::new(),
        }
    }
}

impl ProxySettings {
    pub fn proxy_target_class(mut self, value: bool) -> Self {
        self.proxy_target_class = value;
        self
    }

    pub fn expose_proxy(mut self, value: bool) -> Self {
        self.expose_proxy = value;
        self
    }

    pub fn frozen(mut self, value: bool) -> Self {
        self.frozen = value;
        self
    }

    pub fn apply_common_interceptors_first(mut self, value: bool) -> Self {
        self.apply_common_interceptors_first = value;
        self
    }

    pub fn interceptor(mut self, bean_name: impl Into<String>) -> Self {
        self.interceptor_names.push(bean_name.into());
        self
    }
}

/// Settings for an [`ApplicationContext`](crate::ApplicationContext).
///
/// # Examples
///
/// ```rust
/// # #[cfg(feature = "config")]
/// # {
/// use ferrous_context::ContextSettings;
///
/// let settings = ContextSettings::from_json_str(r#"{
///     "display_name": "orders",
///     "required_properties": ["db.url"],
///     "properties": { "db.url": "postgres://localhost" },
///     "proxy": { "expose_proxy": true }
/// }"#).unwrap();
///
/// assert_eq!(settings.display_name, "orders");
/// assert!(settings.allow_circular_references);
/// assert!(settings.proxy.unwrap().expose_proxy);
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ContextSettings {
    pub display_name: String,
    pub allow_bean_definition_overriding: bool,
    pub allow_circular_references: bool,
    /// Keys that must resolve before any bean is created
    pub required_properties: Vec<String>,
    /// Inline property source, consulted before environment variables
    pub properties: IndexMap<String, String>,
    /// Environment variables with this prefix become properties; `None`
    /// disables the environment source
    pub env_prefix: Option<String>,
    /// Enables auto-proxying when present
    pub proxy: Option<ProxySettings>,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            display_name: "application".to_string(),
            allow_bean_definition_overriding: true,
            allow_circular_references: true,
            required_properties: Vec::new(),
            properties: IndexMap::new(),
            env_prefix: None,
            proxy: None,
        }
    }
}

#[cfg(feature = "config")]
impl ContextSettings {
    pub fn from_json_str(json: &str) -> DiResult<Self> {
        serde_json::from_str(json).map_err(|e| DiError::Configuration(format!("Invalid context settings: {e}")))
    }

    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> DiResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DiError::Configuration(format!("Cannot read context settings from {}: {e}", path.display()))
        })?;
        Self::from_json_str(&content)
    }

    pub fn to_json(&self) -> DiResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| DiError::Configuration(e.to_string()))
    }
}

#[cfg(all(test, feature = "config"))]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_fields_take_defaults() {
        let settings = ContextSettings::from_json_str("{}").unwrap();
        assert_eq!(settings, ContextSettings::default());
    }

    #[test]
    fn proxy_settings_keep_common_first_default() {
        let settings = ContextSettings::from_json_str(r#"{"proxy": {"interceptor_names": ["audit"]}}"#).unwrap();
        let proxy = settings.proxy.unwrap();
        assert!(proxy.apply_common_interceptors_first);
        assert_eq!(proxy.interceptor_names, vec!["audit"]);
    }

    #[test]
    fn malformed_json_is_a_configuration_error() {
        assert!(matches!(
            ContextSettings::from_json_str("{not json"),
            Err(DiError::Configuration(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"display_name": "from-file", "allow_circular_references": false}}"#).unwrap();

        let settings = ContextSettings::from_json_file(file.path()).unwrap();
        assert_eq!(settings.display_name, "from-file");
        assert!(!settings.allow_circular_references);
    }

    #[test]
    fn json_round_trip_keeps_property_order() {
        let mut settings = ContextSettings::default();
        settings.properties.insert("b".into(), "2".into());
        settings.properties.insert("a".into(), "1".into());
        let json = settings.to_json().unwrap();
        let back = ContextSettings::from_json_str(&json).unwrap();
        assert_eq!(back.properties.keys().collect::<Vec<_>>(), vec!["b", "a"]);
    }
}
