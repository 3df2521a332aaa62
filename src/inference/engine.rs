//! The deduction engine: a symbol table, a compiled program and a fact
//! store, with the operations callers drive them through.

use super::derivation::{attempt_all, derive, saturate, Attempt, Derivation, Saturation};
use super::oracle::{Suggestion, SuggestionOracle};
use crate::config::{EngineConfig, Statistics};
use crate::data::{Fact, Functor, Rule, RuleId, SymbolTable, Term};
use crate::database::{FactSource, FactStore};
use crate::error::{CompileError, EngineResult};
use crate::machine::Program;
use crate::parser::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What came of one round of oracle proposals.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Consultation {
    /// Rules compiled into the program.
    pub rules: Vec<RuleId>,
    /// One derivation per goal, in proposal order.
    pub derivations: Vec<Derivation>,
    /// Proposals that did not parse or compile, with the reason.
    pub rejected: Vec<String>,
}

impl Consultation {
    pub fn new_facts(&self) -> impl Iterator<Item = &Fact> {
        self.derivations.iter().flat_map(|derivation| derivation.new_facts())
    }
}

pub struct Engine {
    config: EngineConfig,
    symbols: Arc<SymbolTable>,
    program: Program,
    store: FactStore,
    goals: Vec<Term>,
    cancel: Arc<AtomicBool>,
    stats: Statistics,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_symbols(Arc::new(SymbolTable::new()), config)
    }

    pub fn with_symbols(symbols: Arc<SymbolTable>, config: EngineConfig) -> Self {
        Self {
            program: Program::new(symbols.clone(), &config),
            config,
            symbols,
            store: FactStore::new(),
            goals: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            stats: Statistics::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    /// A parser sharing this engine's symbol table.
    pub fn parser(&self) -> Parser<'_> {
        Parser::new(&self.symbols)
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn store(&self) -> &FactStore {
        &self.store
    }

    /// Goals loaded from `?-` statements, in source order.
    pub fn goals(&self) -> &[Term] {
        &self.goals
    }

    pub fn add_goal(&mut self, goal: Term) {
        self.goals.push(goal);
    }

    /// Counters summed over every attempt run so far.
    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Flag that stops running attempts at their next instruction. Stays
    /// set until [`Engine::reset_cancel`] is called.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn reset_cancel(&self) {
        self.cancel.store(false, Ordering::Relaxed);
    }

    /// Make `functor` callable from rule bodies and known to the store.
    pub fn declare(&mut self, functor: Functor) {
        self.program.declare(functor);
        self.store.declare(functor);
    }

    /// Add a fact. `false` if it was already known.
    pub fn assert_fact(&mut self, fact: Fact) -> bool {
        self.program.declare(fact.functor());
        self.store.assert(fact)
    }

    pub fn add_rule(&mut self, rule: Rule) -> Result<RuleId, CompileError> {
        self.program.add_rule(rule)
    }

    /// Run one attempt to exhaustion, asserting what it derives.
    pub fn derive(&mut self, attempt: &Attempt) -> EngineResult<Derivation> {
        let (result, stats) = derive(
            &self.program,
            &self.store,
            &self.config,
            attempt,
            Some(&self.cancel),
        );
        self.stats.merge(&stats);
        result
    }

    /// Attempt `goal` against every clause of its predicate and merge the
    /// outcomes. Exhausted when no clause yields a solution, including when
    /// the predicate has no clauses at all.
    pub fn solve(&mut self, goal: &Term) -> EngineResult<Derivation> {
        let attempts: Vec<Attempt> = match goal.functor() {
            Some(functor) => self
                .program
                .clauses(functor)
                .iter()
                .map(|rule| Attempt::goal(*rule, goal.clone()))
                .collect(),
            None => Vec::new(),
        };
        debug!(goal = %goal.display(&self.symbols), clauses = attempts.len(), "solving goal");

        let (results, stats) = attempt_all(
            &self.program,
            &self.store,
            &self.config,
            &attempts,
            Some(&self.cancel),
        );
        self.stats.merge(&stats);

        let mut all_facts = Vec::new();
        let mut all_solutions = Vec::new();
        for result in results {
            if let Derivation::Derived { new_facts, solutions } = result? {
                all_facts.extend(new_facts);
                all_solutions.extend(solutions);
            }
        }
        if all_solutions.is_empty() {
            return Ok(Derivation::Exhausted);
        }
        Ok(Derivation::Derived { new_facts: all_facts, solutions: all_solutions })
    }

    /// Saturate the store under every rule of the program.
    pub fn saturate(&mut self) -> EngineResult<Saturation> {
        let saturation = saturate(&self.program, &self.store, &self.config, Some(&self.cancel))?;
        self.stats.merge(&saturation.stats);
        info!(
            rounds = saturation.rounds,
            new_facts = saturation.new_facts.len(),
            fixpoint = saturation.fixpoint,
            "saturation finished"
        );
        Ok(saturation)
    }

    /// Ask `oracle` for proposals and act on them in order: rules are
    /// compiled into the program, goals are solved.
    ///
    /// Proposals that fail to parse or compile are rejected one by one;
    /// an aborted goal attempt ends the consultation with its error.
    pub fn consult<O: SuggestionOracle + ?Sized>(
        &mut self,
        oracle: &mut O,
    ) -> EngineResult<Consultation> {
        let symbols = self.symbols.clone();
        let parser = Parser::new(&symbols);
        let proposals = oracle.suggest(&self.store.snapshot(), &symbols);
        let mut consultation = Consultation::default();

        for proposal in proposals {
            let suggestion = match proposal.normalize(&parser) {
                Ok(suggestion) => suggestion,
                Err(err) => {
                    warn!(error = %err, "proposal rejected");
                    consultation.rejected.push(err.to_string());
                    continue;
                }
            };
            match suggestion {
                Suggestion::Rule(rule) => match self.add_rule(rule) {
                    Ok(id) => consultation.rules.push(id),
                    Err(err) => {
                        warn!(error = %err, "suggested rule rejected");
                        consultation.rejected.push(err.to_string());
                    }
                },
                Suggestion::Goal(goal) => {
                    let derivation = self.solve(&goal)?;
                    consultation.derivations.push(derivation);
                }
            }
        }

        info!(
            rules = consultation.rules.len(),
            goals = consultation.derivations.len(),
            rejected = consultation.rejected.len(),
            "oracle consulted"
        );
        Ok(consultation)
    }
}

#[cfg(test)]
mod tests {
    use super::Engine;
    use crate::config::EngineConfig;
    use crate::data::Fact;
    use crate::database::FactSource;
    use crate::error::EngineError;
    use crate::inference::{Derivation, ScriptedOracle};
    use std::sync::atomic::Ordering;

    fn engine() -> Engine {
        let mut engine = Engine::new(EngineConfig::default().with_parallel(false));
        let parser = engine.parser();
        let facts: Vec<Fact> = ["on_line(a, l1)", "on_line(b, l1)", "on_line(c, l1)", "point(a)"]
            .iter()
            .map(|text| parser.parse_fact(text).expect("fact"))
            .collect();
        let rule = parser
            .parse_rule("coll(A, B, C) :- on_line(A, L), on_line(B, L), on_line(C, L), distinct(A, B, C).")
            .expect("rule");
        for fact in facts {
            engine.assert_fact(fact);
        }
        engine.add_rule(rule).expect("compiles");
        engine
    }

    #[test]
    fn solve_tries_every_clause() {
        let mut engine = engine();
        let more = engine.parser().parse_rule("coll(A, A, A) :- point(A).").expect("rule");
        engine.add_rule(more).expect("compiles");
        let goal = engine.parser().parse_term("coll(a, X, Y)").expect("goal");
        let derivation = engine.solve(&goal).expect("solves");
        assert_eq!(derivation.solutions().len(), 3);
        let aaa = engine.parser().parse_fact("coll(a, a, a)").expect("fact");
        assert!(engine.store().contains(&aaa));
        assert!(engine.statistics().solutions >= 3);
    }

    #[test]
    fn solve_unknown_predicate_is_exhausted() {
        let mut engine = engine();
        let goal = engine.parser().parse_term("para(a, b)").expect("goal");
        assert_eq!(engine.solve(&goal).expect("solves"), Derivation::Exhausted);
    }

    #[test]
    fn consultation_compiles_rules_and_solves_goals() {
        let mut engine = engine();
        let mut oracle = ScriptedOracle::new().with_batch([
            "same(P, Q) :- on_line(P, L), on_line(Q, L).",
            "?- same(a, c).",
            "broken(X) :- nowhere(X).",
            "?- oops(",
        ]);
        let consultation = engine.consult(&mut oracle).expect("consults");
        assert_eq!(consultation.rules.len(), 1);
        assert_eq!(consultation.derivations.len(), 1);
        assert_eq!(consultation.rejected.len(), 2);
        let same = engine.parser().parse_fact("same(a, c)").expect("fact");
        assert_eq!(consultation.new_facts().cloned().collect::<Vec<_>>(), vec![same]);
    }

    #[test]
    fn cancel_handle_stops_saturation() {
        let mut engine = engine();
        let handle = engine.cancel_handle();
        handle.store(true, Ordering::Relaxed);
        assert!(matches!(engine.saturate(), Err(EngineError::Cancelled)));
        engine.reset_cancel();
        let saturation = engine.saturate().expect("saturates");
        assert_eq!(saturation.new_facts.len(), 6);
    }
}
