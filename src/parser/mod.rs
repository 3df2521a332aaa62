//! Text syntax for terms, facts and rules.
//!
//! Statements look like Prolog clauses:
//!
//! ```text
//! on_line(a, l1).
//! collinear(A, B, C) :- on_line(A, L), on_line(B, L), on_line(C, L).
//! ?- collinear(a, b, X).
//! :- declare(circle/1).
//! ```

mod syntax;

pub use syntax::{Parser, Source, Statement};
