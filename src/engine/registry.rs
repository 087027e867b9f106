//! The slug registry: slug → at-most-one handler binding.

use std::collections::HashMap;
use std::time::SystemTime;

use crate::channel::SessionHandle;

/// The current (slug, session) association.
#[derive(Debug, Clone)]
pub struct Binding {
    pub session: SessionHandle,
    pub bound_at: SystemTime,
}

/// Holds the single-holder mapping. All mutation goes through the engine.
#[derive(Debug, Default)]
pub struct Registry {
    bindings: HashMap<String, Binding>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slug: &str) -> Option<&Binding> {
        self.bindings.get(slug)
    }

    /// Install a binding, returning the displaced one if the slug was held.
    pub fn insert(&mut self, slug: String, binding: Binding) -> Option<Binding> {
        self.bindings.insert(slug, binding)
    }

    pub fn remove(&mut self, slug: &str) -> Option<Binding> {
        self.bindings.remove(slug)
    }

    /// Session id of the slug's current holder, if any.
    pub fn holder_id(&self, slug: &str) -> Option<u64> {
        self.bindings.get(slug).map(|b| b.session.id())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Binding)> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding() -> (Binding, u64) {
        let (session, _rx) = SessionHandle::new();
        let id = session.id();
        (
            Binding {
                session,
                bound_at: SystemTime::now(),
            },
            id,
        )
    }

    #[test]
    fn test_single_holder() {
        let mut registry = Registry::new();
        let (first, first_id) = binding();
        let (second, second_id) = binding();

        assert!(registry.insert("svc".into(), first).is_none());
        assert_eq!(registry.holder_id("svc"), Some(first_id));

        let displaced = registry.insert("svc".into(), second).unwrap();
        assert_eq!(displaced.session.id(), first_id);
        assert_eq!(registry.holder_id("svc"), Some(second_id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_clears_holder() {
        let mut registry = Registry::new();
        let (b, _) = binding();
        registry.insert("svc".into(), b);
        assert!(registry.remove("svc").is_some());
        assert_eq!(registry.holder_id("svc"), None);
        assert!(registry.is_empty());
    }
}
