//! Fact database contract and the in-process store.
//!
//! The machine only sees [`FactSource`]: a lazy cursor over the facts that
//! may match a goal, and an idempotent insert used at confirmed solutions.

mod store;

pub use store::FactStore;

use crate::data::{Fact, Functor, Term};

/// Position of an open query over a fact source.
///
/// A cursor only moves forward. Facts appended after it was opened are
/// still returned as long as the cursor has not passed their position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FactQuery {
    pattern: Term,
    functor: Option<Functor>,
    /// Ground first argument, used to narrow the scan.
    key: Option<Term>,
    position: usize,
}

impl FactQuery {
    pub fn new(pattern: Term) -> Self {
        let functor = pattern.functor();
        let key = pattern
            .args()
            .first()
            .filter(|arg| arg.is_ground())
            .cloned();
        Self { pattern, functor, key, position: 0 }
    }

    pub fn pattern(&self) -> &Term {
        &self.pattern
    }

    pub fn functor(&self) -> Option<Functor> {
        self.functor
    }

    pub fn key(&self) -> Option<&Term> {
        self.key.as_ref()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn advance_to(&mut self, position: usize) {
        self.position = position;
    }

    /// Cheap pre-filter: could `fact` unify with the pattern? Variables
    /// match anything; repeated variables are left to unification.
    pub fn admits(&self, fact: &Fact) -> bool {
        compatible(&self.pattern, fact.term())
    }
}

fn compatible(pattern: &Term, term: &Term) -> bool {
    match (pattern, term) {
        (Term::Variable(_), _) => true,
        (
            Term::Struct { functor: f, args: left },
            Term::Struct { functor: g, args: right },
        ) => {
            f == g
                && left.len() == right.len()
                && left.iter().zip(right).all(|(p, t)| compatible(p, t))
        }
        _ => pattern == term,
    }
}

/// Source of ground facts for the machine.
pub trait FactSource: Sync {
    /// Open a cursor over facts that may match `pattern`.
    fn query(&self, pattern: &Term) -> FactQuery {
        FactQuery::new(pattern.clone())
    }

    /// Next candidate for `query`, advancing it. `None` once exhausted.
    fn next_match(&self, query: &mut FactQuery) -> Option<Fact>;

    /// Insert `fact`. Returns `true` if it was not already present.
    fn assert(&self, fact: Fact) -> bool;

    fn contains(&self, fact: &Fact) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if any fact with this predicate was ever stored or declared.
    fn knows(&self, functor: Functor) -> bool;

    /// Iterate the candidates for `pattern`.
    fn matches(&self, pattern: &Term) -> Matches<'_, Self>
    where
        Self: Sized,
    {
        Matches { source: self, query: self.query(pattern) }
    }
}

pub struct Matches<'a, S: FactSource + ?Sized> {
    source: &'a S,
    query: FactQuery,
}

impl<S: FactSource + ?Sized> Iterator for Matches<'_, S> {
    type Item = Fact;

    fn next(&mut self) -> Option<Fact> {
        self.source.next_match(&mut self.query)
    }
}

#[cfg(test)]
mod tests {
    use super::FactQuery;
    use crate::data::{Fact, SymbolTable, Term, VariableId};

    #[test]
    fn query_picks_ground_first_argument_as_key() {
        let table = SymbolTable::new();
        let on_line = table.intern("on_line");
        let a = Term::atom(table.intern("a"));
        let x = Term::variable(VariableId::new(0));

        let keyed = FactQuery::new(Term::structure(on_line, vec![a.clone(), x.clone()]));
        assert_eq!(keyed.key(), Some(&a));
        let open = FactQuery::new(Term::structure(on_line, vec![x.clone(), a]));
        assert_eq!(open.key(), None);
        assert_eq!(open.position(), 0);
    }

    #[test]
    fn admits_respects_ground_parts() {
        let table = SymbolTable::new();
        let seg = table.intern("seg");
        let (a, b, c) = (
            Term::atom(table.intern("a")),
            Term::atom(table.intern("b")),
            Term::atom(table.intern("c")),
        );
        let x = Term::variable(VariableId::new(0));
        let query = FactQuery::new(Term::structure(seg, vec![x, b.clone()]));
        let hit = Fact::new(Term::structure(seg, vec![a.clone(), b])).unwrap();
        let miss = Fact::new(Term::structure(seg, vec![a, c])).unwrap();
        assert!(query.admits(&hit));
        assert!(!query.admits(&miss));
    }
}
