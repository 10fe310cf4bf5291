use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Interned string id. Only meaningful for the [`Registry`](crate::Registry) that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl From<u32> for KeyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

#[derive(Debug, Default)]
struct Table {
    ids: HashMap<Arc<str>, KeyId>,
    names: Vec<Arc<str>>,
}

#[derive(Debug, Default)]
pub(crate) struct Interner {
    table: RwLock<Table>,
}

impl Interner {
    pub(crate) fn intern(&self, s: &str) -> KeyId {
        if let Some(id) = self.table.read().ids.get(s).copied() {
            return id;
        }

        let mut table = self.table.write();

        // Another writer may have won the race between the read and write lock.
        if let Some(id) = table.ids.get(s).copied() {
            return id;
        }

        let id = KeyId(table.names.len() as u32);
        let s: Arc<str> = Arc::from(s);
        table.names.push(s.clone());
        table.ids.insert(s, id);
        id
    }

    pub(crate) fn resolve(&self, id: KeyId) -> Option<Arc<str>> {
        self.table.read().names.get(id.0 as usize).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_stable_and_resolvable() {
        let interner = Interner::default();
        let a = interner.intern("scenario");
        let b = interner.intern("status");
        assert_ne!(a, b);
        assert_eq!(interner.intern("scenario"), a);
        assert_eq!(interner.resolve(b).as_deref(), Some("status"));
        assert_eq!(interner.resolve(KeyId::from(99)), None);
    }
}
