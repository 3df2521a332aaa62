use super::builtin::Builtin;
use super::compiler::{CompiledRule, Compiler, Signatures};
use super::instruction::Target;
use crate::config::EngineConfig;
use crate::data::{Functor, Rule, RuleId, SymbolTable};
use crate::database::FactStore;
use crate::error::CompileError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Library of compiled rules, shared read-only by every execution.
///
/// Rules are compiled once when added. Clauses of a predicate are tried
/// in the order they were added.
#[derive(Debug)]
pub struct Program {
    symbols: Arc<SymbolTable>,
    registers: usize,
    rules: Vec<CompiledRule>,
    by_predicate: HashMap<Functor, Vec<RuleId>>,
    declared: HashSet<Functor>,
}

impl Program {
    pub fn new(symbols: Arc<SymbolTable>, config: &EngineConfig) -> Self {
        Self {
            symbols,
            registers: config.registers,
            rules: Vec::new(),
            by_predicate: HashMap::new(),
            declared: HashSet::new(),
        }
    }

    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    /// Size of the register bank machines running this program need.
    pub fn registers(&self) -> usize {
        self.registers
    }

    /// Make `functor` callable from rule bodies. Calls are answered by the
    /// fact database alone until a rule with that head is added.
    pub fn declare(&mut self, functor: Functor) {
        self.declared.insert(functor);
    }

    pub fn declare_name(&mut self, name: &str, arity: u8) -> Functor {
        let functor = Functor::new(self.symbols.intern(name), arity);
        self.declare(functor);
        functor
    }

    /// Declare every predicate the store knows about.
    pub fn declare_facts(&mut self, store: &FactStore) {
        for functor in store.predicates() {
            self.declare(functor);
        }
    }

    /// Compile `rule` and add it as the last clause of its predicate.
    pub fn add_rule(&mut self, rule: Rule) -> Result<RuleId, CompileError> {
        let compiled = self.compile(&rule)?;
        let id = RuleId(self.rules.len() as u32);
        debug!(
            rule = %id,
            head = %compiled.head.display(&self.symbols),
            instructions = compiled.code.len(),
            "rule compiled"
        );
        self.by_predicate.entry(compiled.head).or_default().push(id);
        self.rules.push(compiled);
        Ok(id)
    }

    /// Compile `rule` against the current signatures without adding it.
    pub fn compile(&self, rule: &Rule) -> Result<CompiledRule, CompileError> {
        Compiler::new(self, self.registers).compile(rule)
    }

    pub fn rule(&self, id: RuleId) -> Option<&CompiledRule> {
        self.rules.get(id.0 as usize)
    }

    /// Clauses answering `functor`, in trial order.
    pub fn clauses(&self, functor: Functor) -> &[RuleId] {
        self.by_predicate
            .get(&functor)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = RuleId> + '_ {
        (0..self.rules.len()).map(|index| RuleId(index as u32))
    }

    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &CompiledRule)> {
        self.rules
            .iter()
            .enumerate()
            .map(|(index, rule)| (RuleId(index as u32), rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Code listing of every rule, for debugging output.
    pub fn listing(&self) -> String {
        self.rules()
            .map(|(id, compiled)| {
                format!(
                    "{} {}\n{}",
                    id,
                    compiled.rule.display(&self.symbols),
                    compiled.code.listing(&self.symbols)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Signatures for Program {
    fn target(&self, functor: Functor) -> Option<Target> {
        if let Some(builtin) = Builtin::resolve(&self.symbols, functor) {
            return Some(Target::Builtin { builtin, arity: functor.arity });
        }
        (self.declared.contains(&functor) || self.by_predicate.contains_key(&functor))
            .then_some(Target::Predicate(functor))
    }

    fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }
}
