use parking_lot::RwLock;
use std::collections::HashMap;

/// Identifier for a name registered in the symbol table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Default)]
struct SymbolTableInner {
    ids: HashMap<String, SymbolId>,
    names: Vec<String>,
}

/// Interned atom and functor names.
///
/// A single table is shared by the parser, the compiler, the fact store and
/// every machine, so it sits behind a read/write lock. Arity is not part of
/// the key: `p/1` and `p/2` share the symbol `p`.
#[derive(Debug, Default)]
pub struct SymbolTable {
    inner: RwLock<SymbolTableInner>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, name: impl AsRef<str>) -> SymbolId {
        let name = name.as_ref();
        if let Some(id) = self.inner.read().ids.get(name) {
            return *id;
        }

        let mut guard = self.inner.write();
        if let Some(id) = guard.ids.get(name) {
            return *id;
        }

        let id = SymbolId(guard.names.len() as u32);
        guard.names.push(name.to_string());
        guard.ids.insert(name.to_string(), id);
        id
    }

    /// Look up a name without interning it.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.inner.read().ids.get(name).copied()
    }

    pub fn name(&self, id: SymbolId) -> Option<String> {
        self.inner.read().names.get(id.0 as usize).cloned()
    }

    /// Name of `id`, or a placeholder for ids this table never issued.
    pub fn name_or_placeholder(&self, id: SymbolId) -> String {
        self.name(id).unwrap_or_else(|| format!("${}", id.0))
    }

    pub fn len(&self) -> usize {
        self.inner.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::SymbolTable;

    #[test]
    fn interning_assigns_ids() {
        let table = SymbolTable::new();
        let id_a = table.intern("on_line");
        let id_b = table.intern("on_line");
        assert_eq!(id_a, id_b, "interning must be stable for identical names");
        assert_eq!(table.len(), 1);
        assert_eq!(table.name(id_a).as_deref(), Some("on_line"));
    }

    #[test]
    fn lookup_does_not_intern() {
        let table = SymbolTable::new();
        assert!(table.lookup("point").is_none());
        assert!(table.is_empty());
        let id = table.intern("point");
        assert_eq!(table.lookup("point"), Some(id));
    }

    #[test]
    fn placeholder_for_foreign_ids() {
        let table = SymbolTable::new();
        let foreign = super::SymbolId::from_raw(7);
        assert_eq!(table.name_or_placeholder(foreign), "$7");
    }
}
