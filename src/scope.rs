//! Bean scope and role definitions.

/// Bean scopes controlling instance caching behavior
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{ApplicationContext, BeanDefinition, BeanLookup, BeanScope};
/// use std::sync::Arc;
///
/// struct Counter;
///
/// let context = ApplicationContext::builder()
///     .definition(BeanDefinition::of::<Counter, _>("shared", |_| Ok(Counter)))
///     .definition(
///         BeanDefinition::of::<Counter, _>("fresh", |_| Ok(Counter)).scope(BeanScope::Prototype),
///     )
///     .build();
/// context.refresh().unwrap();
///
/// // Singleton: same instance on every lookup
/// let a = context.get_bean_as::<Counter>("shared").unwrap();
/// let b = context.get_bean_as::<Counter>("shared").unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// // Prototype: new instance on every lookup
/// let c = context.get_bean_as::<Counter>("fresh").unwrap();
/// let d = context.get_bean_as::<Counter>("fresh").unwrap();
/// assert!(!Arc::ptr_eq(&c, &d));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BeanScope {
    /// Single instance per bean factory, cached until the context closes
    ///
    /// Singletons are created eagerly at the end of refresh unless marked
    /// lazy, and are destroyed in reverse dependency order on close.
    #[default]
    Singleton,
    /// New instance per lookup, never cached
    ///
    /// Prototype beans go through the full post-processor chain on every
    /// lookup but the container does not track or destroy them.
    Prototype,
}

/// Role hint for a bean definition.
///
/// Infrastructure beans are ignored by diagnostics that target user beans,
/// such as the check for beans created before every post-processor was
/// registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BeanRole {
    /// A user-defined bean
    #[default]
    Application,
    /// Supporting part of a larger configuration
    Support,
    /// Purely internal container machinery
    Infrastructure,
}
