//! Single derivation attempts and forward saturation.

use crate::config::{EngineConfig, Statistics};
use crate::data::{Fact, RuleId, Term};
use crate::database::FactSource;
use crate::error::{EngineError, EngineResult};
use crate::machine::{Machine, Program, Solution};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one derivation attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Derivation {
    /// At least one solution was reached. `new_facts` holds the ground
    /// heads the database did not know before, in the order they were
    /// asserted; `solutions` holds every solution, including non-ground
    /// heads and heads that were already known.
    Derived {
        new_facts: Vec<Fact>,
        solutions: Vec<Solution>,
    },
    /// Every alternative failed.
    Exhausted,
}

impl Derivation {
    pub fn is_derived(&self) -> bool {
        matches!(self, Derivation::Derived { .. })
    }

    pub fn new_facts(&self) -> &[Fact] {
        match self {
            Derivation::Derived { new_facts, .. } => new_facts,
            Derivation::Exhausted => &[],
        }
    }

    pub fn solutions(&self) -> &[Solution] {
        match self {
            Derivation::Derived { solutions, .. } => solutions,
            Derivation::Exhausted => &[],
        }
    }
}

/// One attempt to run: a rule and an optional goal for its head.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempt {
    pub rule: RuleId,
    pub goal: Option<Term>,
}

impl Attempt {
    pub fn rule(rule: RuleId) -> Self {
        Self { rule, goal: None }
    }

    pub fn goal(rule: RuleId, goal: Term) -> Self {
        Self { rule, goal: Some(goal) }
    }
}

/// Run `attempt` to exhaustion on a fresh machine.
///
/// Each confirmed solution with a ground head is asserted before the next
/// one is searched for, so later alternatives of the same attempt already
/// see it. An error aborts the attempt; facts asserted at solutions reached
/// before the error stay in the database.
pub fn derive<S: FactSource + ?Sized>(
    program: &Program,
    facts: &S,
    config: &EngineConfig,
    attempt: &Attempt,
    cancel: Option<&Arc<AtomicBool>>,
) -> (EngineResult<Derivation>, Statistics) {
    let mut machine = Machine::new(program, facts, config);
    if let Some(flag) = cancel {
        machine = machine.with_cancel(flag.clone());
    }
    let result = run(&mut machine, facts, attempt);
    let mut stats = *machine.statistics();
    if let Ok(derivation) = &result {
        stats.facts_asserted += derivation.new_facts().len() as u64;
    }
    (result, stats)
}

fn run<S: FactSource + ?Sized>(
    machine: &mut Machine<'_, S>,
    facts: &S,
    attempt: &Attempt,
) -> EngineResult<Derivation> {
    machine.start(attempt.rule, attempt.goal.as_ref())?;
    let mut new_facts = Vec::new();
    let mut solutions = Vec::new();
    while let Some(solution) = machine.next_solution()? {
        if let Some(fact) = solution.fact() {
            if facts.assert(fact.clone()) {
                new_facts.push(fact);
            }
        }
        solutions.push(solution);
    }
    if solutions.is_empty() {
        return Ok(Derivation::Exhausted);
    }
    debug!(
        rule = %attempt.rule,
        solutions = solutions.len(),
        new_facts = new_facts.len(),
        "attempt derived"
    );
    Ok(Derivation::Derived { new_facts, solutions })
}

/// Run independent attempts, on the rayon pool when `config.parallel` is
/// set. Results come back in the order of `attempts`; statistics are
/// summed over all of them.
pub fn attempt_all<S: FactSource + ?Sized>(
    program: &Program,
    facts: &S,
    config: &EngineConfig,
    attempts: &[Attempt],
    cancel: Option<&Arc<AtomicBool>>,
) -> (Vec<EngineResult<Derivation>>, Statistics) {
    let outcomes: Vec<(EngineResult<Derivation>, Statistics)> = if config.parallel {
        attempts
            .par_iter()
            .map(|attempt| derive(program, facts, config, attempt, cancel))
            .collect()
    } else {
        attempts
            .iter()
            .map(|attempt| derive(program, facts, config, attempt, cancel))
            .collect()
    };
    let mut total = Statistics::new();
    let results = outcomes
        .into_iter()
        .map(|(result, stats)| {
            total.merge(&stats);
            result
        })
        .collect();
    (results, total)
}

/// Summary of a saturation run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Saturation {
    pub rounds: usize,
    /// Facts added across every round, in assertion order per round.
    pub new_facts: Vec<Fact>,
    /// Whether a round finished without adding anything.
    pub fixpoint: bool,
    /// Attempts aborted by a step limit or a machine fault.
    pub aborted: Vec<RuleId>,
    pub stats: Statistics,
}

/// Run every rule of `program` without a goal, round after round, until a
/// round adds no fact or `config.max_rounds` rounds have run.
///
/// Step limits and faults abort only the attempt that hit them; the rule is
/// retried in the next round. Cancellation stops the whole run.
pub fn saturate<S: FactSource + ?Sized>(
    program: &Program,
    facts: &S,
    config: &EngineConfig,
    cancel: Option<&Arc<AtomicBool>>,
) -> EngineResult<Saturation> {
    let attempts: Vec<Attempt> = program.rule_ids().map(Attempt::rule).collect();
    let mut saturation = Saturation::default();
    if attempts.is_empty() {
        saturation.fixpoint = true;
        return Ok(saturation);
    }

    while saturation.rounds < config.max_rounds {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(EngineError::Cancelled);
        }
        saturation.rounds += 1;
        let before = saturation.new_facts.len();
        let (results, stats) = attempt_all(program, facts, config, &attempts, cancel);
        saturation.stats.merge(&stats);

        for (attempt, result) in attempts.iter().zip(results) {
            match result {
                Ok(Derivation::Derived { new_facts, .. }) => {
                    saturation.new_facts.extend(new_facts)
                }
                Ok(Derivation::Exhausted) => {}
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(err) => {
                    warn!(rule = %attempt.rule, error = %err, "attempt aborted");
                    saturation.aborted.push(attempt.rule);
                }
            }
        }

        let added = saturation.new_facts.len() - before;
        info!(round = saturation.rounds, added, total = facts.len(), "saturation round");
        if added == 0 {
            saturation.fixpoint = true;
            return Ok(saturation);
        }
    }

    warn!(rounds = saturation.rounds, "round budget exhausted before fixpoint");
    Ok(saturation)
}

#[cfg(test)]
mod tests {
    use super::{attempt_all, derive, saturate, Attempt, Derivation};
    use crate::config::EngineConfig;
    use crate::data::{RuleId, SymbolTable};
    use crate::database::{FactSource, FactStore};
    use crate::error::EngineError;
    use crate::machine::Program;
    use crate::parser::Parser;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn setup(source: &str, config: &EngineConfig) -> (Arc<SymbolTable>, Program, FactStore) {
        let symbols = Arc::new(SymbolTable::new());
        let parsed = Parser::new(&symbols).parse_str(source).expect("parses");
        let store = FactStore::with_facts(parsed.facts().cloned());
        let mut program = Program::new(symbols.clone(), config);
        program.declare_facts(&store);
        parsed.declarations().for_each(|functor| program.declare(functor));
        for rule in parsed.rules() {
            program.add_rule(rule.clone()).expect("compiles");
        }
        (symbols, program, store)
    }

    const CHAIN: &str = "
        edge(a, b). edge(b, c). edge(c, d).
        :- declare(path/2).
        path(X, Y) :- edge(X, Y).
        path(X, Z) :- edge(X, Y), path(Y, Z).
    ";

    #[test]
    fn derive_asserts_new_ground_heads() {
        let config = EngineConfig::default();
        let (symbols, program, store) = setup(CHAIN, &config);
        let (result, stats) = derive(&program, &store, &config, &Attempt::rule(RuleId(0)), None);
        let derivation = result.expect("runs");
        assert_eq!(derivation.new_facts().len(), 3);
        assert_eq!(stats.facts_asserted, 3);
        assert!(store.contains(&Parser::new(&symbols).parse_fact("path(a, b)").expect("fact")));

        let (again, _) = derive(&program, &store, &config, &Attempt::rule(RuleId(0)), None);
        let again = again.expect("runs");
        assert!(again.is_derived());
        assert!(again.new_facts().is_empty());
        assert_eq!(again.solutions().len(), 3);
    }

    #[test]
    fn goal_that_cannot_hold_is_exhausted() {
        let config = EngineConfig::default();
        let (symbols, program, store) = setup(CHAIN, &config);
        let goal = Parser::new(&symbols).parse_term("path(d, a)").expect("term");
        let (result, stats) = derive(&program, &store, &config, &Attempt::goal(RuleId(0), goal), None);
        assert_eq!(result.expect("runs"), Derivation::Exhausted);
        assert_eq!(stats.facts_asserted, 0);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let sequential = EngineConfig::default().with_parallel(false);
        let parallel = EngineConfig::default().with_parallel(true);
        let mut dumps = Vec::new();
        for config in [sequential, parallel] {
            let (symbols, program, store) = setup(CHAIN, &config);
            let attempts = vec![Attempt::rule(RuleId(0)), Attempt::rule(RuleId(0))];
            let (results, _) = attempt_all(&program, &store, &config, &attempts, None);
            assert_eq!(results.len(), 2);
            assert!(results.iter().all(|result| result.is_ok()));
            dumps.push(store.dump(&symbols));
        }
        assert_eq!(dumps[0], dumps[1]);
    }

    #[test]
    fn saturation_reaches_transitive_closure() {
        let config = EngineConfig::default();
        let (symbols, program, store) = setup(CHAIN, &config);
        let saturation = saturate(&program, &store, &config, None).expect("saturates");
        assert!(saturation.fixpoint);
        assert_eq!(saturation.new_facts.len(), 6);
        assert!(saturation.aborted.is_empty());
        let parser = Parser::new(&symbols);
        assert!(store.contains(&parser.parse_fact("path(a, d)").expect("fact")));
        assert!(!store.contains(&parser.parse_fact("path(d, a)").expect("fact")));
    }

    #[test]
    fn round_budget_stops_saturation() {
        let config = EngineConfig { max_rounds: 1, parallel: false, ..EngineConfig::default() };
        let (_, program, store) = setup(CHAIN, &config);
        let saturation = saturate(&program, &store, &config, None).expect("runs");
        assert_eq!(saturation.rounds, 1);
        assert!(!saturation.fixpoint);
    }

    #[test]
    fn step_limit_aborts_only_the_attempt() {
        let config = EngineConfig { max_steps: 3, parallel: false, ..EngineConfig::default() };
        let (_, program, store) = setup(CHAIN, &config);
        let before = store.len();
        let (result, _) = derive(&program, &store, &config, &Attempt::rule(RuleId(1)), None);
        assert!(matches!(result, Err(EngineError::StepLimit { .. })));
        assert_eq!(store.len(), before);
        let saturation = saturate(&program, &store, &config, None).expect("runs");
        assert!(!saturation.aborted.is_empty());
    }

    #[test]
    fn cancelled_saturation_reports_cancellation() {
        let config = EngineConfig::default();
        let (_, program, store) = setup(CHAIN, &config);
        let flag = Arc::new(AtomicBool::new(true));
        assert!(matches!(
            saturate(&program, &store, &config, Some(&flag)),
            Err(EngineError::Cancelled)
        ));
    }
}
