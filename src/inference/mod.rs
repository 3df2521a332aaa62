//! Unification and the derivation layer on top of the machine.
//!
//! [`derive`] runs one attempt, [`attempt_all`] runs independent attempts
//! (in parallel when configured) and [`saturate`] repeats every rule until
//! nothing new is derived. [`Engine`] bundles a program with its fact store
//! and is the usual entry point; [`EngineBuilder`] loads one from source.

mod builder;
mod derivation;
mod engine;
mod oracle;
mod unify;

pub use builder::EngineBuilder;
pub use derivation::{attempt_all, derive, saturate, Attempt, Derivation, Saturation};
pub use engine::{Consultation, Engine};
pub use oracle::{Proposal, ScriptedOracle, Suggestion, SuggestionOracle};
pub use unify::{unify, Unifier};
