//! Bridge between external suggestion generators and the engine.
//!
//! An oracle proposes auxiliary rules or goals, either as terms or as text
//! in the [`crate::parser`] syntax. Proposals are normalised into
//! [`Suggestion`]s before the engine acts on them.

use crate::data::{Fact, Rule, SymbolTable, Term};
use crate::error::ParseError;
use crate::parser::{Parser, Statement};
use std::collections::VecDeque;

/// A normalised proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Suggestion {
    /// Compiled into the program like any other rule.
    Rule(Rule),
    /// Attempted against every clause of its predicate.
    Goal(Term),
}

/// A proposal as an oracle hands it over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Proposal {
    Text(String),
    Suggestion(Suggestion),
}

impl From<Suggestion> for Proposal {
    fn from(suggestion: Suggestion) -> Self {
        Proposal::Suggestion(suggestion)
    }
}

impl From<&str> for Proposal {
    fn from(text: &str) -> Self {
        Proposal::Text(text.to_string())
    }
}

impl Proposal {
    /// Turn the proposal into a [`Suggestion`].
    ///
    /// Text is parsed as one statement: `?- goal.` and bare ground terms
    /// become goals, anything with a body or a variable in the head becomes
    /// a rule. Declarations are rejected.
    pub fn normalize(self, parser: &Parser<'_>) -> Result<Suggestion, ParseError> {
        let text = match self {
            Proposal::Suggestion(suggestion) => return Ok(suggestion),
            Proposal::Text(text) => text,
        };
        match parser.parse_statement(&text)? {
            Statement::Rule(rule) => Ok(Suggestion::Rule(rule)),
            Statement::Goal(goal) => Ok(Suggestion::Goal(goal)),
            Statement::Fact(fact) => Ok(Suggestion::Goal(fact.into_term())),
            Statement::Declare(_) => Err(ParseError::new(
                1,
                1,
                "declarations are not accepted as suggestions",
            )),
        }
    }
}

/// Source of proposals, consulted with the facts known so far.
pub trait SuggestionOracle {
    fn suggest(&mut self, facts: &[Fact], symbols: &SymbolTable) -> Vec<Proposal>;
}

/// Oracle replaying fixed batches of proposals, one batch per call.
#[derive(Clone, Debug, Default)]
pub struct ScriptedOracle {
    batches: VecDeque<Vec<Proposal>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch<P: Into<Proposal>>(mut self, batch: impl IntoIterator<Item = P>) -> Self {
        self.batches.push_back(batch.into_iter().map(Into::into).collect());
        self
    }

    pub fn remaining(&self) -> usize {
        self.batches.len()
    }
}

impl SuggestionOracle for ScriptedOracle {
    fn suggest(&mut self, _facts: &[Fact], _symbols: &SymbolTable) -> Vec<Proposal> {
        self.batches.pop_front().unwrap_or_default()
    }
}
