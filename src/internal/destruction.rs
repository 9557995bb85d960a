//! Registry of disposable singletons and their dependency edges.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};

/// Destruction callback for one singleton.
pub(crate) type Disposer = Box<dyn FnOnce() + Send>;

/// Disposable singletons in registration order plus the dependent-bean map.
///
/// Beans are destroyed in reverse registration order, and every bean's
/// dependents are destroyed before the bean itself.
#[derive(Default)]
pub(crate) struct DisposableRegistry {
    disposables: IndexMap<String, Disposer>,
    dependents: HashMap<String, IndexSet<String>>,
    dependencies: HashMap<String, IndexSet<String>>,
}

impl DisposableRegistry {
    pub(crate) fn register(&mut self, name: &str, disposer: Disposer) {
        self.disposables.insert(name.to_string(), disposer);
    }

    /// Records that `dependent` uses `bean`.
    pub(crate) fn register_dependent(&mut self, bean: &str, dependent: &str) {
        if bean == dependent {
            return;
        }
        self.dependents
            .entry(bean.to_string())
            .or_default()
            .insert(dependent.to_string());
        self.dependencies
            .entry(dependent.to_string())
            .or_default()
            .insert(bean.to_string());
    }

    pub(crate) fn dependents_of(&self, bean: &str) -> Vec<String> {
        self.dependents
            .get(bean)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// True when `dependent` transitively depends on `bean`.
    pub(crate) fn is_dependent(&self, bean: &str, dependent: &str) -> bool {
        let mut seen = HashSet::new();
        self.is_dependent_inner(bean, dependent, &mut seen)
    }

    fn is_dependent_inner(&self, bean: &str, dependent: &str, seen: &mut HashSet<String>) -> bool {
        if !seen.insert(bean.to_string()) {
            return false;
        }
        let Some(direct) = self.dependents.get(bean) else {
            return false;
        };
        if direct.contains(dependent) {
            return true;
        }
        direct.iter().any(|d| self.is_dependent_inner(d, dependent, seen))
    }

    /// Names of disposable beans, last registered first.
    pub(crate) fn names_in_destruction_order(&self) -> Vec<String> {
        self.disposables.keys().rev().cloned().collect()
    }

    /// Detaches a bean: its disposer and the names of its dependents.
    pub(crate) fn take(&mut self, name: &str) -> (Option<Disposer>, Vec<String>) {
        let disposer = self.disposables.shift_remove(name);
        let dependents = self
            .dependents
            .remove(name)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        if let Some(deps) = self.dependencies.remove(name) {
            for dep in deps {
                if let Some(set) = self.dependents.get_mut(&dep) {
                    set.shift_remove(name);
                }
            }
        }
        (disposer, dependents)
    }

    pub(crate) fn clear(&mut self) {
        self.disposables.clear();
        self.dependents.clear();
        self.dependencies.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.disposables.len()
    }
}
