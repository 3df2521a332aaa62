//! Core data structures: symbols, terms, rules, binding environments and
//! the machine heap.

pub mod bindings;
pub mod heap;
pub mod rule;
pub mod symbol;
pub mod term;

pub use bindings::{CyclicTerm, Environment, Trail, TrailUnderflow};
pub use heap::{Addr, Cell, Heap, Value, VariableNames};
pub use rule::{Rule, RuleId};
pub use symbol::{SymbolId, SymbolTable};
pub use term::{Fact, Functor, Term, TermKind, VariableId};
