//! Builtin predicates run inside the machine without touching the fact
//! database. All of them are deterministic: they succeed once or fail.

use crate::data::{Addr, Functor, Heap, SymbolTable, Term, Trail};
use crate::error::FaultKind;
use crate::inference::Unifier;
use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// `true/0`
    True,
    /// `distinct/N`: every argument ground and pairwise different.
    Distinct,
    /// `eq/2`: unify both arguments.
    Eq,
    /// `neq/2`: both arguments ground and different.
    Neq,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::True => "true",
            Builtin::Distinct => "distinct",
            Builtin::Eq => "eq",
            Builtin::Neq => "neq",
        }
    }

    /// Builtin called by `name/arity`, if any.
    pub fn lookup(name: &str, arity: u8) -> Option<Builtin> {
        match (name, arity) {
            ("true", 0) => Some(Builtin::True),
            ("distinct", _) => Some(Builtin::Distinct),
            ("eq", 2) => Some(Builtin::Eq),
            ("neq", 2) => Some(Builtin::Neq),
            _ => None,
        }
    }

    pub fn resolve(symbols: &SymbolTable, functor: Functor) -> Option<Builtin> {
        let name = symbols.name(functor.symbol)?;
        Self::lookup(&name, functor.arity)
    }

    /// Run the builtin over the argument addresses. Bindings made by `eq`
    /// are recorded on `trail`; a failed run leaves no binding behind.
    pub fn run(
        self,
        heap: &mut Heap,
        trail: &mut Trail<Addr>,
        unifier: &Unifier,
        args: &[Addr],
    ) -> Result<bool, FaultKind> {
        match self {
            Builtin::True => Ok(true),
            Builtin::Eq => match args {
                [left, right] => unifier.unify_cells(heap, trail, *left, *right),
                _ => Ok(false),
            },
            Builtin::Neq => {
                if args.len() != 2 {
                    return Ok(false);
                }
                Ok(matches!(ground_terms(heap, args)?, Some(terms) if terms[0] != terms[1]))
            }
            Builtin::Distinct => {
                let Some(terms) = ground_terms(heap, args)? else {
                    return Ok(false);
                };
                for (index, term) in terms.iter().enumerate() {
                    if terms[index + 1..].contains(term) {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read every argument back as a term, or `None` if one is not ground.
fn ground_terms(heap: &Heap, args: &[Addr]) -> Result<Option<Vec<Term>>, FaultKind> {
    let mut terms = Vec::with_capacity(args.len());
    for &arg in args {
        if !heap.is_ground(arg)? {
            return Ok(None);
        }
        terms.push(heap.extract(arg)?);
    }
    Ok(Some(terms))
}
