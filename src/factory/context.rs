//! Creation context handed to bean constructors and populate callbacks.

use std::str::FromStr;

use crate::definition::{AnyArc, BeanDefinition, PropertyValue};
use crate::error::{DiError, DiResult};
use crate::factory::{transformed_name, BeanFactory, BeanLookup};

/// Access to the factory and the definition while a bean is being built.
///
/// Every lookup made through the context records the bean being built as a
/// dependent of the bean looked up, which orders destruction.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{ApplicationContext, BeanDefinition, BeanLookup, PropertyValue};
///
/// struct Pool { size: usize, url: String }
///
/// let context = ApplicationContext::builder()
///     .definition(BeanDefinition::of::<String, _>("url", |_| Ok("postgres://db".to_string())))
///     .definition(
///         BeanDefinition::of::<Pool, _>("pool", |ctx| {
///             Ok(Pool {
///                 size: ctx.arg_parsed(0)?,
///                 url: ctx.get_bean_as::<String>(ctx.property_ref("url")?)?.to_string(),
///             })
///         })
///         .arg(PropertyValue::text("8"))
///         .property("url", PropertyValue::reference("url")),
///     )
///     .build();
/// context.refresh().unwrap();
///
/// let pool = context.get_bean_as::<Pool>("pool").unwrap();
/// assert_eq!(pool.size, 8);
/// assert_eq!(pool.url, "postgres://db");
/// ```
pub struct BeanContext<'a> {
    factory: &'a BeanFactory,
    definition: &'a BeanDefinition,
}

impl<'a> BeanContext<'a> {
    pub(crate) fn new(factory: &'a BeanFactory, definition: &'a BeanDefinition) -> Self {
        Self { factory, definition }
    }

    pub fn bean_name(&self) -> &'a str {
        &self.definition.name
    }

    pub fn factory(&self) -> &'a BeanFactory {
        self.factory
    }

    pub fn definition(&self) -> &'a BeanDefinition {
        self.definition
    }

    // ----- Constructor arguments -----

    pub fn arg(&self, index: usize) -> DiResult<&'a PropertyValue> {
        self.definition.constructor_args.get(index).ok_or_else(|| {
            DiError::Configuration(format!(
                "Bean '{}' has no constructor argument at index {index}",
                self.definition.name
            ))
        })
    }

    pub fn arg_text(&self, index: usize) -> DiResult<&'a str> {
        let what = format!("constructor argument {index}");
        self.text_of(self.arg(index)?, &what)
    }

    pub fn arg_parsed<T: FromStr>(&self, index: usize) -> DiResult<T> {
        let what = format!("constructor argument {index}");
        self.parse(self.arg_text(index)?, &what)
    }

    pub fn arg_bean(&self, index: usize) -> DiResult<AnyArc> {
        match self.arg(index)? {
            PropertyValue::Ref(bean) => self.get_bean(bean),
            PropertyValue::Text(_) => Err(self.not_a_reference(&format!("constructor argument {index}"))),
        }
    }

    // ----- Properties -----

    pub fn has_property(&self, name: &str) -> bool {
        self.definition.property_values.iter().any(|(n, _)| n == name)
    }

    pub fn property(&self, name: &str) -> DiResult<&'a PropertyValue> {
        self.definition
            .property_values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| {
                DiError::Configuration(format!(
                    "Bean '{}' has no property '{name}'",
                    self.definition.name
                ))
            })
    }

    pub fn property_text(&self, name: &str) -> DiResult<&'a str> {
        self.text_of(self.property(name)?, &format!("property '{name}'"))
    }

    pub fn property_parsed<T: FromStr>(&self, name: &str) -> DiResult<T> {
        self.parse(self.property_text(name)?, &format!("property '{name}'"))
    }

    /// Name of the bean a reference property points at.
    pub fn property_ref(&self, name: &str) -> DiResult<&'a str> {
        match self.property(name)? {
            PropertyValue::Ref(bean) => Ok(bean),
            PropertyValue::Text(_) => Err(self.not_a_reference(&format!("property '{name}'"))),
        }
    }

    pub fn property_bean(&self, name: &str) -> DiResult<AnyArc> {
        let bean = self.property_ref(name)?;
        self.get_bean(bean)
    }

    fn text_of(&self, value: &'a PropertyValue, what: &str) -> DiResult<&'a str> {
        match value {
            PropertyValue::Text(text) => Ok(text),
            PropertyValue::Ref(bean) => Err(DiError::Configuration(format!(
                "{what} of bean '{}' is a reference to '{bean}', not a value",
                self.definition.name
            ))),
        }
    }

    fn parse<T: FromStr>(&self, text: &str, what: &str) -> DiResult<T> {
        text.trim().parse::<T>().map_err(|_| {
            DiError::Configuration(format!(
                "Cannot convert {what} of bean '{}' value '{text}' to {}",
                self.definition.name,
                std::any::type_name::<T>()
            ))
        })
    }

    fn not_a_reference(&self, what: &str) -> DiError {
        DiError::Configuration(format!(
            "{what} of bean '{}' is a value, not a bean reference",
            self.definition.name
        ))
    }
}

impl BeanLookup for BeanContext<'_> {
    fn get_bean(&self, name: &str) -> DiResult<AnyArc> {
        let bean = self.factory.get_bean(name)?;
        self.factory
            .register_dependent_bean(transformed_name(name), &self.definition.name);
        Ok(bean)
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.factory.contains_bean(name)
    }
}
