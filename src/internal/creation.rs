//! Thread-local tracking of beans under construction.

use std::cell::RefCell;

use crate::error::{DiError, DiResult};

const MAX_DEPTH: usize = 1024;

// Per-thread creation path, tagged with the owning factory id so two
// factories on one thread never see each other's beans.
thread_local! {
    static CREATION_TLS: RefCell<Vec<(u64, String)>> = const { RefCell::new(Vec::new()) };
}

/// RAII marker for a bean currently being constructed on this thread.
///
/// Entering a bean that is already on the path means the bean depends on
/// itself before it could be exposed early, which no creation order can
/// satisfy.
pub(crate) struct CreationGuard {
    factory: u64,
}

impl CreationGuard {
    pub(crate) fn enter(factory: u64, name: &str) -> DiResult<Self> {
        CREATION_TLS.with(|tls| {
            let mut stack = tls.borrow_mut();

            if stack.iter().any(|(f, n)| *f == factory && n == name) {
                let mut path: Vec<String> = stack
                    .iter()
                    .filter(|(f, _)| *f == factory)
                    .map(|(_, n)| n.clone())
                    .skip_while(|n| n != name)
                    .collect();
                path.push(name.to_string());
                return Err(DiError::Circular(path));
            }

            if stack.len() >= MAX_DEPTH {
                return Err(DiError::Instantiation {
                    bean: name.to_string(),
                    message: format!("creation depth exceeded {MAX_DEPTH}"),
                });
            }

            stack.push((factory, name.to_string()));
            Ok(Self { factory })
        })
    }

    /// Name of the innermost bean this thread is creating in `factory`.
    #[cfg(test)]
    pub(crate) fn current(factory: u64) -> Option<String> {
        CREATION_TLS.with(|tls| {
            tls.borrow()
                .iter()
                .rev()
                .find(|(f, _)| *f == factory)
                .map(|(_, n)| n.clone())
        })
    }
}

impl Drop for CreationGuard {
    fn drop(&mut self) {
        CREATION_TLS.with(|tls| {
            let mut stack = tls.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|(f, _)| *f == self.factory) {
                stack.remove(pos);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reentering_reports_path_from_first_occurrence() {
        let _a = CreationGuard::enter(1, "a").unwrap();
        let _b = CreationGuard::enter(1, "b").unwrap();
        let _c = CreationGuard::enter(1, "c").unwrap();
        match CreationGuard::enter(1, "b") {
            Err(DiError::Circular(path)) => assert_eq!(path, vec!["b", "c", "b"]),
            _ => panic!("expected circular error"),
        }
    }

    #[test]
    fn factories_are_isolated() {
        let _a = CreationGuard::enter(1, "a").unwrap();
        let _other = CreationGuard::enter(2, "a").unwrap();
        assert_eq!(CreationGuard::current(1).as_deref(), Some("a"));
    }

    #[test]
    fn guard_pops_on_drop() {
        {
            let _a = CreationGuard::enter(3, "a").unwrap();
        }
        assert!(CreationGuard::current(3).is_none());
        assert!(CreationGuard::enter(3, "a").is_ok());
    }
}
