use super::term::{Term, VariableId};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Trail stack used to undo bindings when backtracking.
///
/// Entries are recorded in binding order. Rewinding pops entries back to a
/// mark taken earlier and hands each one to the caller for unbinding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trail<K> {
    entries: Vec<K>,
}

impl<K> Default for Trail<K> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

/// A rewind was asked for a mark above the current trail length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrailUnderflow {
    pub mark: usize,
    pub len: usize,
}

impl<K: Copy> Trail<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: K) {
        self.entries.push(entry);
    }

    pub fn pop(&mut self) -> Option<K> {
        self.entries.pop()
    }

    /// Current length, used as a mark for later rewinds.
    pub fn mark(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Pop entries until the trail is `mark` long, newest first.
    pub fn rewind(
        &mut self,
        mark: usize,
        mut undo: impl FnMut(K),
    ) -> Result<(), TrailUnderflow> {
        if mark > self.entries.len() {
            return Err(TrailUnderflow { mark, len: self.entries.len() });
        }
        while self.entries.len() > mark {
            if let Some(entry) = self.entries.pop() {
                undo(entry);
            }
        }
        Ok(())
    }
}

/// The term reached by following bound links ends in a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CyclicTerm(pub VariableId);

impl fmt::Display for CyclicTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "variable _G{} is bound to a term containing itself", self.0 .0)
    }
}

impl std::error::Error for CyclicTerm {}

/// Term-level binding environment: variable id to bound term. Variables
/// missing from the map are unbound, so ids may be arbitrarily sparse.
///
/// Bindings are only made through [`Environment::bind`], which records the
/// variable on the trail, and only undone by rewinding that trail.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Environment {
    bindings: BTreeMap<VariableId, Term>,
    trail: Trail<VariableId>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, var: VariableId) -> Option<&Term> {
        self.bindings.get(&var)
    }

    pub fn is_bound(&self, var: VariableId) -> bool {
        self.lookup(var).is_some()
    }

    /// Bind an unbound variable and record it on the trail.
    pub fn bind(&mut self, var: VariableId, term: Term) {
        let previous = self.bindings.insert(var, term);
        debug_assert!(previous.is_none(), "rebinding bound variable");
        self.trail.push(var);
    }

    pub fn trail(&self) -> &Trail<VariableId> {
        &self.trail
    }

    pub fn mark(&self) -> usize {
        self.trail.mark()
    }

    /// Undo every binding made since `mark` was taken.
    pub fn undo_to(&mut self, mark: usize) -> Result<(), TrailUnderflow> {
        let bindings = &mut self.bindings;
        self.trail.rewind(mark, |var| {
            bindings.remove(&var);
        })
    }

    /// Follow bound links from `term` until an unbound variable or a
    /// non-variable term is reached.
    pub fn resolve<'a>(&'a self, mut term: &'a Term) -> &'a Term {
        while let Term::Variable(id) = term {
            match self.lookup(*id) {
                Some(bound) => term = bound,
                None => break,
            }
        }
        term
    }

    /// Apply every binding to `term`, producing a term without bound
    /// variables. Fails if a binding made without the occurs check loops
    /// back into itself.
    pub fn apply(&self, term: &Term) -> Result<Term, CyclicTerm> {
        let mut path = HashSet::new();
        self.apply_inner(term, &mut path)
    }

    fn apply_inner(
        &self,
        term: &Term,
        path: &mut HashSet<VariableId>,
    ) -> Result<Term, CyclicTerm> {
        match term {
            Term::Variable(id) => match self.lookup(*id) {
                Some(bound) => {
                    if !path.insert(*id) {
                        return Err(CyclicTerm(*id));
                    }
                    let applied = self.apply_inner(bound, path);
                    path.remove(id);
                    applied
                }
                None => Ok(term.clone()),
            },
            Term::Struct { functor, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.apply_inner(arg, path))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Term::Struct { functor: *functor, args })
            }
            Term::Atom(_) | Term::Number(_) => Ok(term.clone()),
        }
    }

    /// Number of bound variables.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bound variables in id order.
    pub fn iter(&self) -> impl Iterator<Item = (VariableId, &Term)> {
        self.bindings.iter().map(|(var, term)| (*var, term))
    }
}

#[cfg(test)]
mod tests {
    use super::{Environment, Trail, TrailUnderflow};
    use crate::data::{SymbolTable, Term, VariableId};

    #[test]
    fn bind_lookup_and_undo() {
        let table = SymbolTable::new();
        let a = Term::atom(table.intern("a"));
        let mut env = Environment::new();
        let mark = env.mark();
        env.bind(VariableId::new(3), a.clone());
        assert_eq!(env.lookup(VariableId::new(3)), Some(&a));
        assert_eq!(env.trail().len(), 1);
        env.undo_to(mark).expect("rewind");
        assert!(env.lookup(VariableId::new(3)).is_none());
        assert!(env.trail().is_empty());
    }

    #[test]
    fn resolve_follows_variable_chains() {
        let table = SymbolTable::new();
        let a = Term::atom(table.intern("a"));
        let x = Term::variable(VariableId::new(0));
        let y = Term::variable(VariableId::new(1));
        let mut env = Environment::new();
        env.bind(VariableId::new(0), y.clone());
        assert_eq!(env.resolve(&x), &y);
        env.bind(VariableId::new(1), a.clone());
        assert_eq!(env.resolve(&x), &a);
    }

    #[test]
    fn apply_detects_cycles() {
        let table = SymbolTable::new();
        let x = Term::variable(VariableId::new(0));
        let fx = Term::structure(table.intern("f"), vec![x.clone()]);
        let mut env = Environment::new();
        env.bind(VariableId::new(0), fx);
        assert!(env.apply(&x).is_err());
    }

    #[test]
    fn sparse_variable_ids_bind_without_growth() {
        let table = SymbolTable::new();
        let a = Term::atom(table.intern("a"));
        let far = VariableId::new(u32::MAX - 1);
        let mut env = Environment::new();
        env.bind(VariableId::new(2), a.clone());
        env.bind(far, Term::variable(VariableId::new(2)));
        assert_eq!(env.len(), 2);
        assert_eq!(env.resolve(&Term::variable(far)), &a);
        let order: Vec<VariableId> = env.iter().map(|(var, _)| var).collect();
        assert_eq!(order, vec![VariableId::new(2), far]);
        env.undo_to(1).expect("rewind");
        assert!(!env.is_bound(far));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn trail_rewind_rejects_marks_past_the_end() {
        let mut trail: Trail<u32> = Trail::new();
        trail.push(1);
        let err = trail.rewind(4, |_| {}).unwrap_err();
        assert_eq!(err, TrailUnderflow { mark: 4, len: 1 });
        let mut undone = Vec::new();
        trail.push(2);
        trail.rewind(0, |entry| undone.push(entry)).expect("rewind");
        assert_eq!(undone, vec![2, 1]);
    }
}
