//! Builder to construct an engine from a parsed rule source.

use super::engine::Engine;
use crate::config::EngineConfig;
use crate::data::SymbolTable;
use crate::error::EngineResult;
use crate::parser::{Parser, Source};
use std::sync::Arc;
use tracing::info;

/// Build an engine from a parsed rule source.
///
/// A [`Source`] must be parsed with the builder's symbol table, so either
/// parse through [`EngineBuilder::symbols`] or hand the text to
/// [`EngineBuilder::build_str`].
pub struct EngineBuilder {
    config: EngineConfig,
    symbols: Arc<SymbolTable>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            symbols: Arc::new(SymbolTable::new()),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing symbol table.
    pub fn with_symbols(mut self, symbols: Arc<SymbolTable>) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    /// Parse `text` and build from it.
    pub fn build_str(self, text: &str) -> EngineResult<Engine> {
        let source = Parser::new(&self.symbols).parse_str(text)?;
        self.build(&source)
    }

    /// Build an engine holding the facts, rules and goals of `source`.
    ///
    /// Declarations and rule heads are registered before any rule is
    /// compiled, so rules may call predicates defined further down. The
    /// first rule that fails to compile fails the build.
    pub fn build(self, source: &Source) -> EngineResult<Engine> {
        self.config.validate()?;
        let mut engine = Engine::with_symbols(self.symbols, self.config);

        for functor in source.declarations() {
            engine.declare(functor);
        }
        let mut facts = 0;
        for fact in source.facts() {
            if engine.assert_fact(fact.clone()) {
                facts += 1;
            }
        }
        for rule in source.rules() {
            if let Some(head) = rule.head.functor() {
                engine.declare(head);
            }
        }
        let mut rules = 0;
        for rule in source.rules() {
            engine.add_rule(rule.clone())?;
            rules += 1;
        }
        for goal in source.goals() {
            engine.add_goal(goal.clone());
        }

        info!(facts, rules, goals = engine.goals().len(), "engine built");
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::EngineBuilder;
    use crate::config::EngineConfig;
    use crate::database::FactSource;
    use crate::error::{CompileError, EngineError};

    #[test]
    fn rules_may_call_later_heads() {
        let engine = EngineBuilder::new()
            .build_str(
                "
                perp(a, b).
                para(X, Y) :- perp(X, Z), perp_of(Z, Y).
                perp_of(Y, X) :- perp(X, Y).
                ?- para(a, a).
                ",
            )
            .expect("builds");
        assert_eq!(engine.program().len(), 2);
        assert_eq!(engine.store().len(), 1);
        assert_eq!(engine.goals().len(), 1);
    }

    #[test]
    fn unknown_body_predicate_fails_the_build() {
        let err = EngineBuilder::new()
            .build_str("p(X) :- nowhere(X).")
            .err()
            .expect("fails");
        assert!(matches!(
            err,
            EngineError::Compile(CompileError::UnknownPredicate { .. })
        ));
    }

    #[test]
    fn parse_and_config_errors_surface() {
        assert!(matches!(
            EngineBuilder::new().build_str("p(a"),
            Err(EngineError::Parse(_))
        ));
        let config = EngineConfig { registers: 0, ..EngineConfig::default() };
        assert!(matches!(
            EngineBuilder::new().with_config(config).build_str("p(a)."),
            Err(EngineError::Config(_))
        ));
    }
}
