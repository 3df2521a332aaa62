//! A WAM-style abstract machine for forward deduction over geometric facts
//! and rules.
//!
//! Rules are compiled once into unification bytecode ([`machine`]), then
//! executed against a fact database ([`database`]) to derive new facts
//! ([`inference`]). Terms, rules and the machine heap live in [`data`].

pub mod config;
pub mod data;
pub mod database;
pub mod error;
pub mod inference;
pub mod machine;
pub mod parser;

pub use config::{EngineConfig, OccursCheck, Statistics};
pub use data::{Fact, Functor, Rule, RuleId, SymbolId, SymbolTable, Term, TermKind, VariableId};
pub use database::{FactQuery, FactSource, FactStore};
pub use error::{CompileError, ConfigError, EngineError, EngineResult, FaultKind, MachineFault, ParseError};
pub use inference::{
    Attempt, Derivation, Engine, EngineBuilder, Proposal, Saturation, Suggestion,
    SuggestionOracle, Unifier,
};
pub use machine::{Machine, Program, Solution};
pub use parser::{Parser, Source, Statement};
