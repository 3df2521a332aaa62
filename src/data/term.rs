use super::symbol::{SymbolId, SymbolTable};
use std::collections::HashSet;
use std::fmt;

/// Identifier used for rule variables.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub u32);

impl VariableId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Name and arity of a structure. Atoms are functors of arity zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Functor {
    pub symbol: SymbolId,
    pub arity: u8,
}

impl Functor {
    /// Widest structure a functor can describe.
    pub const MAX_ARITY: usize = u8::MAX as usize;

    pub const fn new(symbol: SymbolId, arity: u8) -> Self {
        Self { symbol, arity }
    }

    pub fn display<'a>(&self, symbols: &'a SymbolTable) -> FunctorDisplay<'a> {
        FunctorDisplay { functor: *self, symbols }
    }
}

pub struct FunctorDisplay<'a> {
    functor: Functor,
    symbols: &'a SymbolTable,
}

impl fmt::Display for FunctorDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.symbols.name_or_placeholder(self.functor.symbol),
            self.functor.arity
        )
    }
}

/// Basic classification of terms.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TermKind {
    Atom,
    Variable,
    Struct,
    Number,
}

/// Representation of a first-order term.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Atom(SymbolId),
    Variable(VariableId),
    Struct { functor: SymbolId, args: Vec<Term> },
    Number(i64),
}

impl Term {
    pub fn atom(symbol: SymbolId) -> Self {
        Self::Atom(symbol)
    }

    pub fn variable(id: VariableId) -> Self {
        Self::Variable(id)
    }

    /// Build a structure. A structure without arguments collapses to an atom.
    pub fn structure(functor: SymbolId, args: Vec<Term>) -> Self {
        if args.is_empty() {
            Self::Atom(functor)
        } else {
            Self::Struct { functor, args }
        }
    }

    pub fn number(value: i64) -> Self {
        Self::Number(value)
    }

    pub fn kind(&self) -> TermKind {
        match self {
            Term::Atom(_) => TermKind::Atom,
            Term::Variable(_) => TermKind::Variable,
            Term::Struct { .. } => TermKind::Struct,
            Term::Number(_) => TermKind::Number,
        }
    }

    /// Functor of a callable term (atom or structure). `None` for a
    /// structure wider than [`Functor::MAX_ARITY`].
    pub fn functor(&self) -> Option<Functor> {
        match self {
            Term::Atom(symbol) => Some(Functor::new(*symbol, 0)),
            Term::Struct { functor, args } => u8::try_from(args.len())
                .ok()
                .map(|arity| Functor::new(*functor, arity)),
            Term::Variable(_) | Term::Number(_) => None,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Term::Struct { args, .. } => args.len(),
            _ => 0,
        }
    }

    pub fn args(&self) -> &[Term] {
        match self {
            Term::Struct { args, .. } => args,
            _ => &[],
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    pub fn is_ground(&self) -> bool {
        match self {
            Term::Variable(_) => false,
            Term::Struct { args, .. } => args.iter().all(Term::is_ground),
            Term::Atom(_) | Term::Number(_) => true,
        }
    }

    /// Variables of the term in first-occurrence order, without repeats.
    pub fn variables(&self) -> Vec<VariableId> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        self.collect_variables(&mut seen, &mut ordered);
        ordered
    }

    pub(crate) fn collect_variables(
        &self,
        seen: &mut HashSet<VariableId>,
        ordered: &mut Vec<VariableId>,
    ) {
        match self {
            Term::Variable(id) => {
                if seen.insert(*id) {
                    ordered.push(*id);
                }
            }
            Term::Struct { args, .. } => {
                for arg in args {
                    arg.collect_variables(seen, ordered);
                }
            }
            Term::Atom(_) | Term::Number(_) => {}
        }
    }

    /// True if no structure inside the term is wider than
    /// [`Functor::MAX_ARITY`].
    pub fn fits_arity(&self) -> bool {
        match self {
            Term::Struct { args, .. } => {
                args.len() <= Functor::MAX_ARITY && args.iter().all(Term::fits_arity)
            }
            Term::Atom(_) | Term::Variable(_) | Term::Number(_) => true,
        }
    }

    pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> TermDisplay<'a> {
        TermDisplay { term: self, symbols }
    }
}

/// Renders a term with its symbol names, variables as `_G<id>`.
pub struct TermDisplay<'a> {
    term: &'a Term,
    symbols: &'a SymbolTable,
}

impl fmt::Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.term {
            Term::Atom(symbol) => {
                write!(f, "{}", self.symbols.name_or_placeholder(*symbol))
            }
            Term::Variable(id) => write!(f, "_G{}", id.0),
            Term::Number(value) => write!(f, "{}", value),
            Term::Struct { functor, args } => {
                write!(f, "{}(", self.symbols.name_or_placeholder(*functor))?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg.display(self.symbols))?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A ground term held by the fact database.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fact {
    functor: Functor,
    term: Term,
}

impl Fact {
    /// Wrap a term as a fact. Returns `None` for terms that are not ground,
    /// not callable or hold a structure too wide for a functor.
    pub fn new(term: Term) -> Option<Self> {
        if !term.is_ground() || !term.fits_arity() {
            return None;
        }
        let functor = term.functor()?;
        Some(Self { functor, term })
    }

    pub fn term(&self) -> &Term {
        &self.term
    }

    pub fn into_term(self) -> Term {
        self.term
    }

    pub fn functor(&self) -> Functor {
        self.functor
    }

    pub fn args(&self) -> &[Term] {
        self.term.args()
    }

    pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> TermDisplay<'a> {
        self.term.display(symbols)
    }
}
