use super::{FactQuery, FactSource};
use crate::data::{Fact, Functor, SymbolTable, Term};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// In-process fact database shared by concurrent derivation attempts.
///
/// Facts are appended per predicate and never removed, so cursor positions
/// stay valid while other attempts assert new facts.
#[derive(Debug, Default)]
pub struct FactStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    by_predicate: HashMap<Functor, Vec<Fact>>,
    /// Positions in `by_predicate` keyed by ground first argument.
    first_arg: HashMap<(Functor, Term), Vec<usize>>,
    known: HashSet<Fact>,
    declared: HashSet<Functor>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding `facts`.
    pub fn with_facts(facts: impl IntoIterator<Item = Fact>) -> Self {
        let store = Self::new();
        for fact in facts {
            store.assert(fact);
        }
        store
    }

    /// Make `functor` a known predicate even while it has no facts.
    pub fn declare(&self, functor: Functor) {
        self.inner.write().declared.insert(functor);
    }

    /// Predicates with at least one fact or a declaration.
    pub fn predicates(&self) -> Vec<Functor> {
        let inner = self.inner.read();
        let mut predicates: Vec<Functor> = inner
            .by_predicate
            .keys()
            .chain(inner.declared.iter())
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        predicates.sort();
        predicates
    }

    /// Facts of one predicate in insertion order.
    pub fn facts_of(&self, functor: Functor) -> Vec<Fact> {
        self.inner
            .read()
            .by_predicate
            .get(&functor)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of every fact, grouped by predicate.
    pub fn snapshot(&self) -> Vec<Fact> {
        let inner = self.inner.read();
        let mut predicates: Vec<&Functor> = inner.by_predicate.keys().collect();
        predicates.sort();
        predicates
            .into_iter()
            .flat_map(|functor| inner.by_predicate[functor].iter().cloned())
            .collect()
    }

    /// Render every fact, one per line.
    pub fn dump(&self, symbols: &SymbolTable) -> String {
        self.snapshot()
            .iter()
            .map(|fact| format!("{}.", fact.display(symbols)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl FactSource for FactStore {
    fn next_match(&self, query: &mut FactQuery) -> Option<Fact> {
        let functor = query.functor()?;
        let inner = self.inner.read();
        let facts = inner.by_predicate.get(&functor)?;

        match query.key() {
            Some(key) => {
                let positions = inner.first_arg.get(&(functor, key.clone()))?;
                for (offset, &position) in positions.iter().enumerate().skip(query.position()) {
                    let fact = &facts[position];
                    if query.admits(fact) {
                        query.advance_to(offset + 1);
                        return Some(fact.clone());
                    }
                }
                query.advance_to(positions.len());
            }
            None => {
                for (position, fact) in facts.iter().enumerate().skip(query.position()) {
                    if query.admits(fact) {
                        query.advance_to(position + 1);
                        return Some(fact.clone());
                    }
                }
                query.advance_to(facts.len());
            }
        }
        None
    }

    fn assert(&self, fact: Fact) -> bool {
        let mut inner = self.inner.write();
        if inner.known.contains(&fact) {
            return false;
        }
        let functor = fact.functor();
        let facts = inner.by_predicate.entry(functor).or_default();
        let position = facts.len();
        facts.push(fact.clone());
        if let Some(first) = fact.args().first() {
            inner
                .first_arg
                .entry((functor, first.clone()))
                .or_default()
                .push(position);
        }
        trace!(position, "fact asserted");
        inner.known.insert(fact);
        true
    }

    fn contains(&self, fact: &Fact) -> bool {
        self.inner.read().known.contains(fact)
    }

    fn len(&self) -> usize {
        self.inner.read().known.len()
    }

    fn knows(&self, functor: Functor) -> bool {
        let inner = self.inner.read();
        inner.by_predicate.contains_key(&functor) || inner.declared.contains(&functor)
    }
}
