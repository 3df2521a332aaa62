//! Property tests for unification, the fact store and the compiler.

use std::sync::Arc;

use proptest::prelude::*;

use geowam::data::Environment;
use geowam::inference::unify;
use geowam::{
    EngineConfig, Fact, FactSource, FactStore, OccursCheck, Program, Rule, SymbolId,
    SymbolTable, Term, Unifier, VariableId,
};

const NAMES: [&str; 5] = ["a", "b", "c", "f", "g"];

/// Symbol table where raw ids 0..5 are `NAMES`, matching the strategies.
fn table() -> Arc<SymbolTable> {
    let table = SymbolTable::new();
    for name in NAMES {
        table.intern(name);
    }
    Arc::new(table)
}

fn arb_leaf() -> impl Strategy<Value = Term> {
    prop_oneof![
        (0u32..3).prop_map(|raw| Term::atom(SymbolId::from_raw(raw))),
        (0u32..4).prop_map(|id| Term::variable(VariableId::new(id))),
        (-2i64..3).prop_map(Term::number),
    ]
}

fn arb_term() -> impl Strategy<Value = Term> {
    arb_leaf().prop_recursive(3, 16, 2, |inner| {
        (3u32..5, prop::collection::vec(inner, 1..=2))
            .prop_map(|(raw, args)| Term::structure(SymbolId::from_raw(raw), args))
    })
}

fn arb_ground_args() -> impl Strategy<Value = Vec<Term>> {
    prop::collection::vec(
        (0u32..3).prop_map(|raw| Term::atom(SymbolId::from_raw(raw))),
        1..=3,
    )
}

proptest! {
    #[test]
    fn unification_is_reflexive(term in arb_term()) {
        let env = unify(&term, &term);
        prop_assert!(env.is_some());
        prop_assert_eq!(env.map(|env| env.trail().len()), Some(0));
    }

    #[test]
    fn unification_is_symmetric(a in arb_term(), b in arb_term()) {
        let unifier = Unifier::new(OccursCheck::On);
        let mut left = Environment::new();
        let mut right = Environment::new();
        let forward = unifier.unify(&a, &b, &mut left);
        let backward = unifier.unify(&b, &a, &mut right);
        prop_assert_eq!(forward, backward);
        if forward {
            prop_assert_eq!(left.apply(&a).ok(), left.apply(&b).ok());
            prop_assert_eq!(right.apply(&a).ok(), right.apply(&b).ok());
        }
    }

    #[test]
    fn unification_without_occurs_check_is_symmetric(a in arb_term(), b in arb_term()) {
        // Shared variables may close cycles here; both orders must still
        // terminate with the same answer.
        let unifier = Unifier::new(OccursCheck::Off);
        let mut left = Environment::new();
        let mut right = Environment::new();
        let forward = unifier.unify(&a, &b, &mut left);
        let backward = unifier.unify(&b, &a, &mut right);
        prop_assert_eq!(forward, backward);
        if forward {
            for env in [&left, &right] {
                if let (Ok(x), Ok(y)) = (env.apply(&a), env.apply(&b)) {
                    prop_assert_eq!(x, y);
                }
            }
        }
    }

    #[test]
    fn occurs_check_only_removes_answers(a in arb_term(), b in arb_term()) {
        let mut checked = Environment::new();
        let mut unchecked = Environment::new();
        if Unifier::new(OccursCheck::On).unify(&a, &b, &mut checked) {
            prop_assert!(Unifier::new(OccursCheck::Off).unify(&a, &b, &mut unchecked));
            prop_assert_eq!(checked.apply(&a).ok(), unchecked.apply(&a).ok());
        }
    }

    #[test]
    fn failed_unification_commits_nothing(a in arb_term(), b in arb_term(), seed in arb_leaf()) {
        let unifier = Unifier::new(OccursCheck::On);
        let mut env = Environment::new();
        if !seed.is_variable() {
            env.bind(VariableId::new(0), seed);
        }
        let before = env.clone();
        if !unifier.unify(&a, &b, &mut env) {
            prop_assert_eq!(env, before);
        }
    }

    #[test]
    fn assert_is_idempotent(args in arb_ground_args(), repeats in 1usize..4) {
        let table = table();
        let fact = Fact::new(Term::structure(table.intern("on_line"), args)).expect("ground");
        let store = FactStore::new();
        prop_assert!(store.assert(fact.clone()));
        for _ in 0..repeats {
            prop_assert!(!store.assert(fact.clone()));
        }
        prop_assert_eq!(store.len(), 1);
        prop_assert!(store.contains(&fact));
    }

    #[test]
    fn compilation_is_deterministic(
        head in prop::collection::vec(arb_term(), 1..=3),
        body in prop::collection::vec(prop::collection::vec(arb_term(), 1..=3), 0..=3),
    ) {
        let compile = || {
            let table = table();
            let mut program = Program::new(table.clone(), &EngineConfig::default());
            let mut goals = Vec::new();
            for args in &body {
                let functor = program.declare_name("q", args.len() as u8);
                goals.push(Term::structure(functor.symbol, args.clone()));
            }
            let rule = Rule::new(Term::structure(table.intern("p"), head.clone()), goals);
            program.compile(&rule).map(|compiled| compiled.code.listing(&table))
        };
        prop_assert_eq!(compile(), compile());
    }
}
