//! Append-only ordered collection backing hook lists, listener lists and
//! the endpoint/adapter lists of a resource server.

use parking_lot::RwLock;

/// Ordered, append-only collection.
///
/// Registration goes through a shared reference so a registry can live inside
/// an `Arc`-shared part output. Readers work on a [`snapshot`](Self::snapshot):
/// items registered while a chain is running only become visible to the next run.
pub struct Registry<T> {
    items: RwLock<Vec<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
        }
    }
}

impl<T> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.items.read().len())
            .finish()
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item; it is iterated after everything registered before it.
    pub fn register(&self, item: T) {
        self.items.write().push(item);
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl<T: Clone> Registry<T> {
    /// Copy of the current items in insertion order.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order() {
        let reg = Registry::new();
        reg.register("b");
        reg.register("a");
        reg.register("c");
        assert_eq!(reg.snapshot(), vec!["b", "a", "c"]);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn snapshot_is_detached_from_later_registrations() {
        let reg = Registry::new();
        reg.register(1);
        let snap = reg.snapshot();
        reg.register(2);
        assert_eq!(snap, vec![1]);
        assert_eq!(reg.snapshot(), vec![1, 2]);
    }

    #[test]
    fn empty_registry() {
        let reg: Registry<u8> = Registry::default();
        assert!(reg.is_empty());
        assert!(reg.snapshot().is_empty());
    }
}
