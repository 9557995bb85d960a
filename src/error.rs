//! Error types for the bean container.

use thiserror::Error;

/// Container errors
///
/// Represents the failure conditions that can occur while registering
/// definitions, refreshing a context, creating beans or invoking advised
/// methods through a proxy.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{ApplicationContext, BeanLookup, DiError};
///
/// // Accessing a context before refresh fails fast
/// let context = ApplicationContext::builder().build();
/// match context.get_bean("anything") {
///     Err(DiError::LifecycleState(msg)) => assert!(msg.contains("not been refreshed")),
///     _ => unreachable!(),
/// }
/// ```
///
/// ```rust
/// use ferrous_context::DiError;
///
/// let circular = DiError::Circular(vec!["a".into(), "b".into(), "a".into()]);
/// assert_eq!(circular.to_string(), "Circular reference: a -> b -> a");
/// ```
#[derive(Debug, Clone, Error)]
pub enum DiError {
    /// Bad, conflicting or rejected bean definition
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Operation invoked on a context in the wrong state
    #[error("Lifecycle error: {0}")]
    LifecycleState(String),
    /// Constructor, factory, init callback or hook failure
    #[error("Error creating bean '{bean}': {message}")]
    Instantiation { bean: String, message: String },
    /// No suitable proxy strategy for an advised bean
    #[error("Cannot create proxy for bean '{bean}': {message}")]
    ProxyCreation { bean: String, message: String },
    /// No bean definition under that name
    #[error("No bean named '{0}' is defined")]
    NotFound(String),
    /// Bean exists but is not of the requested type
    #[error("Bean '{bean}' is not of required type {expected}")]
    TypeMismatch { bean: String, expected: &'static str },
    /// Unresolvable circular reference (includes path)
    #[error("Circular reference: {}", .0.join(" -> "))]
    Circular(Vec<String>),
    /// Failure raised by an advised method or its advice
    #[error("Invocation of '{method}' failed: {message}")]
    Invocation { method: String, message: String },
}

impl DiError {
    /// Wraps a failure raised while creating `bean`.
    ///
    /// Errors that already describe a creation failure, a circular
    /// reference or a state problem pass through unchanged so the
    /// innermost cause survives nested creation.
    pub(crate) fn creating(bean: &str, err: DiError) -> DiError {
        match err {
            DiError::Instantiation { .. }
            | DiError::Circular(_)
            | DiError::LifecycleState(_)
            | DiError::ProxyCreation { .. } => err,
            other => DiError::Instantiation {
                bean: bean.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Convenience constructor for advised-method failures.
    pub fn invocation(method: impl Into<String>, message: impl Into<String>) -> DiError {
        DiError::Invocation {
            method: method.into(),
            message: message.into(),
        }
    }
}

/// Result type for container operations
///
/// A convenience alias for `Result<T, DiError>` used throughout the crate.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{DiResult, DiError};
///
/// fn lookup(found: bool) -> DiResult<&'static str> {
///     if found { Ok("bean") } else { Err(DiError::NotFound("bean".into())) }
/// }
///
/// assert!(lookup(true).is_ok());
/// assert!(matches!(lookup(false), Err(DiError::NotFound(_))));
/// ```
pub type DiResult<T> = Result<T, DiError>;
