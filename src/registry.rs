//! Bean definition registry.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::definition::BeanDefinition;
use crate::error::{DiError, DiResult};

/// Mutable view of the bean definitions handed to registry post-processors.
///
/// Implemented by [`BeanFactory`](crate::BeanFactory) while its
/// configuration is still open. Writes through this trait are visible to the
/// post-processor delegate immediately, so a processor registered here is
/// discovered within the same refresh.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{BeanDefinition, BeanDefinitionRegistry, BeanFactory};
///
/// let factory = BeanFactory::new();
/// let registry = factory.as_registry().unwrap();
/// registry
///     .register_bean_definition(BeanDefinition::of::<u32, _>("answer", |_| Ok(42)))
///     .unwrap();
///
/// assert!(registry.contains_bean_definition("answer"));
/// assert_eq!(registry.bean_definition_names(), vec!["answer".to_string()]);
/// ```
pub trait BeanDefinitionRegistry: Send + Sync {
    /// Registers a definition; replaces an existing one when overriding is
    /// allowed.
    fn register_bean_definition(&self, definition: BeanDefinition) -> DiResult<()>;

    fn remove_bean_definition(&self, name: &str) -> DiResult<BeanDefinition>;

    /// Snapshot of a definition.
    fn bean_definition(&self, name: &str) -> Option<BeanDefinition>;

    fn contains_bean_definition(&self, name: &str) -> bool;

    /// Definition names in registration order.
    fn bean_definition_names(&self) -> Vec<String>;

    fn bean_definition_count(&self) -> usize;
}

/// Insertion-ordered definition storage behind the factory lock.
#[derive(Debug)]
pub(crate) struct DefinitionMap {
    definitions: IndexMap<String, Arc<BeanDefinition>>,
    allow_overriding: bool,
    frozen: bool,
}

impl DefinitionMap {
    pub(crate) fn new(allow_overriding: bool) -> Self {
        Self {
            definitions: IndexMap::new(),
            allow_overriding,
            frozen: false,
        }
    }

    pub(crate) fn insert(&mut self, definition: BeanDefinition) -> DiResult<()> {
        self.check_writable(&definition.name)?;
        if definition.name.is_empty() || definition.name.starts_with('&') {
            return Err(DiError::Configuration(format!(
                "Invalid bean name '{}': names must be non-empty and must not start with '&'",
                definition.name
            )));
        }

        if let Some(existing) = self.definitions.get_mut(&definition.name) {
            if !self.allow_overriding {
                return Err(DiError::Configuration(format!(
                    "Cannot register bean definition for bean '{}': there is already a definition bound",
                    definition.name
                )));
            }
            tracing::debug!(bean = %definition.name, "overriding bean definition");
            *existing = Arc::new(definition);
            return Ok(());
        }

        self.definitions.insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    pub(crate) fn remove(&mut self, name: &str) -> DiResult<BeanDefinition> {
        self.check_writable(name)?;
        self.definitions
            .shift_remove(name)
            .map(Arc::unwrap_or_clone)
            .ok_or_else(|| DiError::NotFound(name.to_string()))
    }

    pub(crate) fn modify(&mut self, name: &str, f: impl FnOnce(&mut BeanDefinition)) -> DiResult<()> {
        self.check_writable(name)?;
        let slot = self
            .definitions
            .get_mut(name)
            .ok_or_else(|| DiError::NotFound(name.to_string()))?;
        let definition = Arc::make_mut(slot);
        f(definition);
        // The name is the map key and must not drift.
        definition.name = name.to_string();
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Arc<BeanDefinition>> {
        self.definitions.get(name)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.definitions.keys().cloned().collect()
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Arc<BeanDefinition>> {
        self.definitions.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.definitions.len()
    }

    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn check_writable(&self, name: &str) -> DiResult<()> {
        if self.frozen {
            return Err(DiError::Configuration(format!(
                "Bean definition registry is frozen; cannot modify definition '{name}'"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str) -> BeanDefinition {
        BeanDefinition::of::<u32, _>(name, |_| Ok(0))
    }

    #[test]
    fn keeps_registration_order() {
        let mut map = DefinitionMap::new(true);
        for name in ["c", "a", "b"] {
            map.insert(def(name)).unwrap();
        }
        assert_eq!(map.names(), vec!["c", "a", "b"]);
    }

    #[test]
    fn overriding_replaces_in_place_when_allowed() {
        let mut map = DefinitionMap::new(true);
        map.insert(def("a")).unwrap();
        map.insert(def("b")).unwrap();
        map.insert(def("a").lazy(true)).unwrap();
        assert_eq!(map.names(), vec!["a", "b"]);
        assert!(map.get("a").unwrap().is_lazy());
    }

    #[test]
    fn overriding_rejected_when_disallowed() {
        let mut map = DefinitionMap::new(false);
        map.insert(def("a")).unwrap();
        assert!(matches!(map.insert(def("a")), Err(DiError::Configuration(_))));
    }

    #[test]
    fn frozen_map_rejects_writes() {
        let mut map = DefinitionMap::new(true);
        map.insert(def("a")).unwrap();
        map.freeze();
        assert!(matches!(map.insert(def("b")), Err(DiError::Configuration(_))));
        assert!(matches!(map.remove("a"), Err(DiError::Configuration(_))));
        assert!(matches!(map.modify("a", |d| d.set_lazy(true)), Err(DiError::Configuration(_))));
        assert!(map.contains("a"));
    }

    #[test]
    fn rejects_factory_prefixed_names() {
        let mut map = DefinitionMap::new(true);
        assert!(map.insert(def("&tool")).is_err());
        assert!(map.insert(def("")).is_err());
    }

    #[test]
    fn modify_keeps_key_stable() {
        let mut map = DefinitionMap::new(true);
        map.insert(def("a")).unwrap();
        map.modify("a", |d| {
            *d = d.renamed("other");
            d.set_lazy(true);
        })
        .unwrap();
        assert_eq!(map.get("a").unwrap().name(), "a");
        assert!(map.get("a").unwrap().is_lazy());
    }
}
