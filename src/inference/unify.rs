//! Unification algorithm for first-order terms.
//!
//! One policy, two representations: term-level unification over an
//! [`Environment`] (used for standalone matching and reported bindings) and
//! cell-level unification over the machine [`Heap`]. Both record every
//! binding on a trail and rewind it before reporting failure, so a failed
//! attempt leaves no bindings behind.
//!
//! With the occurs check off both sides may be cyclic. Unification then
//! works on rational trees: a pair of structures met a second time is
//! taken as already unified, so every call terminates.

use crate::config::OccursCheck;
use crate::data::{Addr, Environment, Heap, Term, Trail, Value, VariableId};
use crate::error::FaultKind;
use std::collections::HashSet;

/// Unifier for first-order terms.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unifier {
    occurs_check: OccursCheck,
}

impl Unifier {
    pub fn new(occurs_check: OccursCheck) -> Self {
        Self { occurs_check }
    }

    pub fn occurs_check(&self) -> OccursCheck {
        self.occurs_check
    }

    /// Attempt to unify two terms under `env`.
    ///
    /// On success the new bindings stay in `env` and on its trail. On
    /// failure `env` is restored to its state before the call.
    pub fn unify(&self, a: &Term, b: &Term, env: &mut Environment) -> bool {
        let mark = env.mark();
        let mut seen = HashSet::new();
        if self.unify_terms(a, b, env, &mut seen) {
            return true;
        }
        let rewound = env.undo_to(mark);
        debug_assert!(rewound.is_ok(), "mark taken from the same trail");
        false
    }

    fn unify_terms(
        &self,
        a: &Term,
        b: &Term,
        env: &mut Environment,
        seen: &mut HashSet<(Term, Term)>,
    ) -> bool {
        let a = env.resolve(a).clone();
        let b = env.resolve(b).clone();

        match (&a, &b) {
            // Same unbound variable on both sides: nothing to bind
            (Term::Variable(x), Term::Variable(y)) if x == y => true,
            (Term::Variable(x), _) => self.bind_term(*x, b, env),
            (_, Term::Variable(y)) => self.bind_term(*y, a, env),
            (Term::Atom(p), Term::Atom(q)) => p == q,
            (Term::Number(m), Term::Number(n)) => m == n,
            (
                Term::Struct { functor: f, args: xs },
                Term::Struct { functor: g, args: ys },
            ) => {
                if f != g || xs.len() != ys.len() {
                    return false;
                }
                if !self.occurs_check.is_on() && !seen.insert((a.clone(), b.clone())) {
                    return true;
                }
                xs.iter()
                    .zip(ys.iter())
                    .all(|(x, y)| self.unify_terms(x, y, env, seen))
            }
            _ => false,
        }
    }

    fn bind_term(&self, var: VariableId, term: Term, env: &mut Environment) -> bool {
        if self.occurs_check.is_on() && Self::occurs_in_term(var, &term, env) {
            return false;
        }
        env.bind(var, term);
        true
    }

    fn occurs_in_term(var: VariableId, term: &Term, env: &Environment) -> bool {
        match env.resolve(term) {
            Term::Variable(id) => *id == var,
            Term::Struct { args, .. } => {
                args.iter().any(|arg| Self::occurs_in_term(var, arg, env))
            }
            Term::Atom(_) | Term::Number(_) => false,
        }
    }

    /// Attempt to unify the heap terms at `a` and `b`.
    ///
    /// Bound variables are pushed on `trail`. On failure the trail is
    /// rewound to its length at entry and `Ok(false)` is returned. Errors
    /// are reserved for corrupt heap addresses.
    pub fn unify_cells(
        &self,
        heap: &mut Heap,
        trail: &mut Trail<Addr>,
        a: Addr,
        b: Addr,
    ) -> Result<bool, FaultKind> {
        let mark = trail.mark();
        if self.unify_cells_inner(heap, trail, a, b)? {
            return Ok(true);
        }
        trail.rewind(mark, |var| heap.unbind(var))?;
        Ok(false)
    }

    fn unify_cells_inner(
        &self,
        heap: &mut Heap,
        trail: &mut Trail<Addr>,
        a: Addr,
        b: Addr,
    ) -> Result<bool, FaultKind> {
        // Pending pairs, popped in argument order.
        let mut pending = vec![(a, b)];
        // Structure header pairs already expanded. Only filled without the
        // occurs check, where terms can be cyclic.
        let mut seen = HashSet::new();

        while let Some((a, b)) = pending.pop() {
            let (a, left) = heap.value(a)?;
            let (b, right) = heap.value(b)?;
            if a == b {
                continue;
            }

            match (left, right) {
                (Value::Unbound, Value::Unbound) => {
                    // Younger variable points at the older one.
                    let (young, old) = if a > b { (a, b) } else { (b, a) };
                    heap.bind(young, old)?;
                    trail.push(young);
                }
                (Value::Unbound, _) => {
                    if !self.bind_cell(heap, trail, a, b)? {
                        return Ok(false);
                    }
                }
                (_, Value::Unbound) => {
                    if !self.bind_cell(heap, trail, b, a)? {
                        return Ok(false);
                    }
                }
                (Value::Atom(p), Value::Atom(q)) => {
                    if p != q {
                        return Ok(false);
                    }
                }
                (Value::Int(m), Value::Int(n)) => {
                    if m != n {
                        return Ok(false);
                    }
                }
                (Value::Structure(f, ha), Value::Structure(g, hb)) => {
                    if f != g {
                        return Ok(false);
                    }
                    if !self.occurs_check.is_on() && !seen.insert((ha, hb)) {
                        continue;
                    }
                    for index in (0..f.arity as usize).rev() {
                        pending.push((
                            Heap::argument(ha, index),
                            Heap::argument(hb, index),
                        ));
                    }
                }
                _ => return Ok(false),
            }
        }

        Ok(true)
    }

    fn bind_cell(
        &self,
        heap: &mut Heap,
        trail: &mut Trail<Addr>,
        var: Addr,
        target: Addr,
    ) -> Result<bool, FaultKind> {
        if self.occurs_check.is_on() && heap.occurs(var, target)? {
            return Ok(false);
        }
        heap.bind(var, target)?;
        trail.push(var);
        Ok(true)
    }
}

/// Convenience function: unify two terms in a fresh environment.
///
/// Returns the environment holding the most general unifier, or `None`.
pub fn unify(a: &Term, b: &Term) -> Option<Environment> {
    let mut env = Environment::new();
    Unifier::default().unify(a, b, &mut env).then_some(env)
}
