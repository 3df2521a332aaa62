//! Error types crossing component boundaries.
//!
//! Unification failure never shows up here: it is an ordinary outcome that
//! the machine handles by backtracking. Running out of alternatives is not
//! an error either (see [`crate::inference::Derivation::Exhausted`]).

use crate::data::{CyclicTerm, RuleId, TrailUnderflow};
use thiserror::Error;

/// A rule that cannot be compiled. Fatal to that rule only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("{rule}: head `{head}` is not an atom or structure")]
    InvalidHead { rule: String, head: String },

    #[error("{rule}: body goal {index} `{goal}` is not an atom or structure")]
    InvalidGoal { rule: String, index: usize, goal: String },

    #[error("{rule}: body goal {index} calls unknown predicate {predicate}")]
    UnknownPredicate { rule: String, index: usize, predicate: String },

    #[error("{rule}: needs {needed} registers, machine has {available}")]
    RegisterOverflow { rule: String, needed: usize, available: usize },

    #[error("{rule}: structure `{term}` has more than 255 arguments")]
    ArityOverflow { rule: String, term: String },
}

/// Internal invariant violation inside the machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    #[error("trail underflow: mark {mark} beyond trail length {len}")]
    TrailUnderflow { mark: usize, len: usize },

    #[error("heap address {0} out of range")]
    BadAddress(u32),

    #[error("register X{0} read before it was written")]
    EmptyRegister(u16),

    #[error("register X{index} outside a bank of {size}")]
    BadRegister { index: u16, size: usize },

    #[error("permanent slot Y{index} outside a frame of {size}")]
    BadSlot { index: u16, size: usize },

    #[error("permanent slot Y{0} read before it was written")]
    EmptySlot(u16),

    #[error("no active environment frame")]
    NoFrame,

    #[error("structure argument written outside a structure")]
    NoStructure,

    #[error("cyclic term reached while building a fact")]
    CyclicTerm,

    #[error("structure with {0} arguments does not fit a functor")]
    ArityOverflow(usize),

    #[error("program counter {0} past the end of the code")]
    BadProgramCounter(usize),
}

impl From<TrailUnderflow> for FaultKind {
    fn from(err: TrailUnderflow) -> Self {
        FaultKind::TrailUnderflow { mark: err.mark, len: err.len }
    }
}

impl From<CyclicTerm> for FaultKind {
    fn from(_: CyclicTerm) -> Self {
        FaultKind::CyclicTerm
    }
}

/// A fault together with where it happened.
///
/// Always fatal to the current derivation attempt; the fact database is
/// never touched after a fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("machine fault in {} at instruction {}: {}", rule_label(.rule), .offset, .kind)]
pub struct MachineFault {
    pub rule: Option<RuleId>,
    pub offset: usize,
    pub kind: FaultKind,
}

fn rule_label(rule: &Option<RuleId>) -> String {
    match rule {
        Some(id) => id.to_string(),
        None => "query".to_string(),
    }
}

/// Malformed text handed to the parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self { line, column, message: message.into() }
    }

    /// Move a single-line error to `line` of a larger source.
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }
}

/// Configuration that cannot be read or decoded.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Decode(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Crate-level error.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Fault(#[from] MachineFault),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0} not present in the program")]
    UnknownRule(RuleId),

    #[error("step limit of {limit} instructions exceeded")]
    StepLimit { limit: u64 },

    #[error("derivation attempt cancelled")]
    Cancelled,
}

pub type EngineResult<T> = Result<T, EngineError>;
