//! Lookup traits shared by the factory, the creation context and the
//! application context.

use std::sync::Arc;

use crate::definition::AnyArc;
use crate::error::{DiError, DiResult};

/// Named bean lookup with typed helpers.
///
/// Implemented by [`BeanFactory`](crate::BeanFactory),
/// [`BeanContext`](crate::BeanContext) and
/// [`ApplicationContext`](crate::ApplicationContext). Concrete beans are
/// stored as `T`; trait-object beans as `Arc<dyn Trait>`, so use
/// [`get_bean_as`](Self::get_bean_as) for the former and
/// [`get_bean_trait`](Self::get_bean_trait) for the latter.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{ApplicationContext, BeanDefinition, BeanLookup, DiError};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
/// impl Greeter for English {
///     fn greet(&self) -> String { "hello".into() }
/// }
///
/// let context = ApplicationContext::builder()
///     .definition(BeanDefinition::of::<u16, _>("port", |_| Ok(8080)))
///     .definition(BeanDefinition::trait_object::<dyn Greeter, _>("greeter", |_| {
///         Ok(Arc::new(English) as Arc<dyn Greeter>)
///     }))
///     .build();
/// context.refresh().unwrap();
///
/// assert_eq!(*context.get_bean_as::<u16>("port").unwrap(), 8080);
/// assert_eq!(context.get_bean_trait::<dyn Greeter>("greeter").unwrap().greet(), "hello");
/// assert!(matches!(
///     context.get_bean_as::<String>("port"),
///     Err(DiError::TypeMismatch { .. })
/// ));
/// ```
pub trait BeanLookup {
    /// Type-erased bean; creates it if needed.
    fn get_bean(&self, name: &str) -> DiResult<AnyArc>;

    fn contains_bean(&self, name: &str) -> bool;

    /// Bean stored as the concrete type `T`.
    fn get_bean_as<T>(&self, name: &str) -> DiResult<Arc<T>>
    where
        Self: Sized,
        T: Send + Sync + 'static,
    {
        self.get_bean(name)?
            .downcast::<T>()
            .map_err(|_| DiError::TypeMismatch {
                bean: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Bean stored as `Arc<I>`.
    fn get_bean_trait<I>(&self, name: &str) -> DiResult<Arc<I>>
    where
        Self: Sized,
        I: ?Sized + Send + Sync + 'static,
    {
        let any = self.get_bean(name)?;
        any.downcast_ref::<Arc<I>>()
            .cloned()
            .ok_or_else(|| DiError::TypeMismatch {
                bean: name.to_string(),
                expected: std::any::type_name::<I>(),
            })
    }
}
