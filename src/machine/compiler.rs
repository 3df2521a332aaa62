//! Rule to instruction sequence translation.
//!
//! Every named variable of a rule gets a permanent slot in the clause's
//! environment frame, so bindings survive calls and can be reported once
//! the rule succeeds. Temporary registers only carry nested structures
//! between their parent and the instructions that build or match them.

use super::instruction::{
    Constant, Instruction, InstructionSequence, Reg, Slot, Target, Var,
};
use crate::data::{Functor, Rule, SymbolTable, Term, VariableId};
use crate::error::CompileError;
use std::collections::{HashMap, HashSet, VecDeque};

/// Resolves the predicates a rule body may call.
pub trait Signatures {
    /// Call target for `functor`, or `None` if nothing answers it.
    fn target(&self, functor: Functor) -> Option<Target>;

    fn symbols(&self) -> &SymbolTable;
}

/// A rule together with its code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledRule {
    pub rule: Rule,
    pub head: Functor,
    pub code: InstructionSequence,
    /// Permanent slot of each rule variable, in first-occurrence order.
    pub slots: Vec<(VariableId, Slot)>,
    /// Registers the code touches (arguments plus temporaries).
    pub registers: usize,
}

impl CompiledRule {
    pub fn frame_size(&self) -> usize {
        self.slots.len()
    }
}

pub struct Compiler<'a, S: Signatures + ?Sized> {
    signatures: &'a S,
    registers: usize,
}

impl<'a, S: Signatures + ?Sized> Compiler<'a, S> {
    pub fn new(signatures: &'a S, registers: usize) -> Self {
        Self { signatures, registers }
    }

    /// Compile `rule`. The result depends only on the rule and the
    /// signatures, never on earlier compilations.
    pub fn compile(&self, rule: &Rule) -> Result<CompiledRule, CompileError> {
        let symbols = self.signatures.symbols();
        let label = rule_label(rule, symbols);

        check_arity(&rule.head, &label, symbols)?;
        let head = match &rule.head {
            Term::Atom(_) | Term::Struct { .. } => rule.head.functor(),
            _ => None,
        }
        .ok_or_else(|| CompileError::InvalidHead {
            rule: label.clone(),
            head: rule.head.display(symbols).to_string(),
        })?;

        let mut goals = Vec::with_capacity(rule.body.len());
        for (index, goal) in rule.body.iter().enumerate() {
            let functor = match goal {
                Term::Atom(_) | Term::Struct { .. } => goal.functor(),
                _ => None,
            }
            .ok_or_else(|| CompileError::InvalidGoal {
                rule: label.clone(),
                index,
                goal: goal.display(symbols).to_string(),
            })?;
            check_arity(goal, &label, symbols)?;

            if is_false(goal, symbols) {
                goals.push(None);
                continue;
            }
            let target = if functor == head {
                Some(Target::Predicate(head))
            } else {
                self.signatures.target(functor)
            }
            .ok_or_else(|| CompileError::UnknownPredicate {
                rule: label.clone(),
                index,
                predicate: functor.display(symbols).to_string(),
            })?;
            goals.push(Some((goal, target)));
        }

        let variables = rule.variables();
        let slots: Vec<(VariableId, Slot)> = variables
            .iter()
            .enumerate()
            .map(|(index, var)| (*var, Slot(index as u16)))
            .collect();
        if slots.len() > u16::MAX as usize {
            return Err(CompileError::RegisterOverflow {
                rule: label,
                needed: slots.len(),
                available: u16::MAX as usize,
            });
        }

        let arity = std::iter::once(&rule.head)
            .chain(rule.body.iter())
            .map(Term::arity)
            .max()
            .unwrap_or(0);

        let mut emitter = Emitter {
            code: InstructionSequence::new(),
            slots: slots.iter().copied().collect(),
            seen: HashSet::new(),
            base: arity,
            next_temp: arity,
            high_water: arity,
        };

        emitter.emit(Instruction::Allocate { size: slots.len() as u16 });
        emitter.head(&rule.head);
        let mut failed = false;
        for goal in &goals {
            match goal {
                Some((goal, target)) => emitter.goal(goal, *target),
                None => {
                    emitter.emit(Instruction::Fail);
                    failed = true;
                    break;
                }
            }
        }
        if !failed {
            emitter.emit(Instruction::Deallocate);
            emitter.emit(Instruction::Proceed);
        }

        if emitter.high_water > self.registers {
            return Err(CompileError::RegisterOverflow {
                rule: label,
                needed: emitter.high_water,
                available: self.registers,
            });
        }

        Ok(CompiledRule {
            rule: rule.clone(),
            head,
            code: emitter.code,
            slots,
            registers: emitter.high_water,
        })
    }
}

fn rule_label(rule: &Rule, symbols: &SymbolTable) -> String {
    match &rule.label {
        Some(label) => label.clone(),
        None => rule.head.display(symbols).to_string(),
    }
}

fn is_false(goal: &Term, symbols: &SymbolTable) -> bool {
    match goal {
        Term::Atom(symbol) => symbols.name(*symbol).as_deref() == Some("false"),
        _ => false,
    }
}

fn check_arity(term: &Term, label: &str, symbols: &SymbolTable) -> Result<(), CompileError> {
    if let Term::Struct { args, .. } = term {
        if args.len() > Functor::MAX_ARITY {
            return Err(CompileError::ArityOverflow {
                rule: label.to_string(),
                term: term.display(symbols).to_string(),
            });
        }
        for arg in args {
            check_arity(arg, label, symbols)?;
        }
    }
    Ok(())
}

fn constant(term: &Term) -> Option<Constant> {
    match term {
        Term::Atom(symbol) => Some(Constant::Atom(*symbol)),
        Term::Number(value) => Some(Constant::Int(*value)),
        _ => None,
    }
}

fn struct_functor(term: &Term) -> Option<(Functor, &[Term])> {
    match term {
        Term::Struct { args, .. } => Some((term.functor()?, args.as_slice())),
        _ => None,
    }
}

struct Emitter {
    code: InstructionSequence,
    slots: HashMap<VariableId, Slot>,
    /// Variables already given a binding instruction, in emission order.
    seen: HashSet<VariableId>,
    /// First temporary register (largest arity in the rule).
    base: usize,
    next_temp: usize,
    high_water: usize,
}

impl Emitter {
    fn emit(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    fn temp(&mut self) -> Reg {
        let reg = Reg(self.next_temp.min(u16::MAX as usize) as u16);
        self.next_temp += 1;
        self.high_water = self.high_water.max(self.next_temp);
        reg
    }

    fn perm(&self, var: VariableId) -> Var {
        // Slots come from `Rule::variables`, so every id is present.
        Var::Perm(self.slots.get(&var).copied().unwrap_or(Slot(0)))
    }

    /// True the first time `var` is emitted.
    fn first(&mut self, var: VariableId) -> bool {
        self.seen.insert(var)
    }

    fn head(&mut self, head: &Term) {
        for (index, arg) in head.args().iter().enumerate() {
            self.next_temp = self.base;
            let reg = Reg(index as u16);
            match arg {
                Term::Variable(var) => {
                    let slot = self.perm(*var);
                    if self.first(*var) {
                        self.emit(Instruction::GetVariable { var: slot, arg: reg });
                    } else {
                        self.emit(Instruction::GetValue { var: slot, arg: reg });
                    }
                }
                Term::Struct { .. } => self.match_structure(arg, reg),
                _ => {
                    if let Some(constant) = constant(arg) {
                        self.emit(Instruction::GetConstant { constant, arg: reg });
                    }
                }
            }
        }
    }

    /// `get_structure` for `term` in `reg`, then its nested structures
    /// breadth first through temporaries.
    fn match_structure(&mut self, term: &Term, reg: Reg) {
        let mut pending = VecDeque::from([(term, reg)]);
        while let Some((term, reg)) = pending.pop_front() {
            let Some((functor, args)) = struct_functor(term) else {
                continue;
            };
            self.emit(Instruction::GetStructure { functor, arg: reg });
            for arg in args {
                match arg {
                    Term::Variable(var) => {
                        let slot = self.perm(*var);
                        if self.first(*var) {
                            self.emit(Instruction::UnifyVariable { var: slot });
                        } else {
                            self.emit(Instruction::UnifyValue { var: slot });
                        }
                    }
                    Term::Struct { .. } => {
                        let temp = self.temp();
                        self.emit(Instruction::UnifyVariable { var: Var::Temp(temp) });
                        pending.push_back((arg, temp));
                    }
                    _ => {
                        if let Some(constant) = constant(arg) {
                            self.emit(Instruction::UnifyConstant { constant });
                        }
                    }
                }
            }
        }
    }

    fn goal(&mut self, goal: &Term, target: Target) {
        self.next_temp = self.base;
        for (index, arg) in goal.args().iter().enumerate() {
            let reg = Reg(index as u16);
            match arg {
                Term::Variable(var) => {
                    let slot = self.perm(*var);
                    if self.first(*var) {
                        self.emit(Instruction::PutVariable { var: slot, arg: reg });
                    } else {
                        self.emit(Instruction::PutValue { var: slot, arg: reg });
                    }
                }
                Term::Struct { .. } => self.build_structure(arg, reg),
                _ => {
                    if let Some(constant) = constant(arg) {
                        self.emit(Instruction::PutConstant { constant, arg: reg });
                    }
                }
            }
        }
        self.emit(Instruction::Call { target });
    }

    /// Build `term` into `reg`, innermost structures first.
    fn build_structure(&mut self, term: &Term, reg: Reg) {
        let Some((functor, args)) = struct_functor(term) else {
            return;
        };
        let mut built = Vec::new();
        for arg in args {
            if matches!(arg, Term::Struct { .. }) {
                let temp = self.temp();
                self.build_structure(arg, temp);
                built.push(temp);
            }
        }
        let mut built = built.into_iter();

        self.emit(Instruction::PutStructure { functor, reg });
        for arg in args {
            match arg {
                Term::Variable(var) => {
                    let slot = self.perm(*var);
                    if self.first(*var) {
                        self.emit(Instruction::SetVariable { var: slot });
                    } else {
                        self.emit(Instruction::SetValue { var: slot });
                    }
                }
                Term::Struct { .. } => {
                    if let Some(temp) = built.next() {
                        self.emit(Instruction::SetValue { var: Var::Temp(temp) });
                    }
                }
                _ => {
                    if let Some(constant) = constant(arg) {
                        self.emit(Instruction::SetConstant { constant });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::builtin::Builtin;

    struct Declared<'a> {
        predicates: HashSet<Functor>,
        symbols: &'a SymbolTable,
    }

    impl Signatures for Declared<'_> {
        fn target(&self, functor: Functor) -> Option<Target> {
            if let Some(builtin) = Builtin::resolve(self.symbols, functor) {
                return Some(Target::Builtin { builtin, arity: functor.arity });
            }
            self.predicates
                .contains(&functor)
                .then_some(Target::Predicate(functor))
        }

        fn symbols(&self) -> &SymbolTable {
            self.symbols
        }
    }

    fn var(id: u32) -> Term {
        Term::variable(VariableId::new(id))
    }

    struct Fixture {
        table: SymbolTable,
    }

    impl Fixture {
        fn new() -> Self {
            Self { table: SymbolTable::new() }
        }

        fn atom(&self, name: &str) -> Term {
            Term::atom(self.table.intern(name))
        }

        fn s(&self, name: &str, args: Vec<Term>) -> Term {
            Term::structure(self.table.intern(name), args)
        }

        fn functor(&self, name: &str, arity: u8) -> Functor {
            Functor::new(self.table.intern(name), arity)
        }

        fn compile(
            &self,
            declared: &[(&str, u8)],
            rule: &Rule,
        ) -> Result<CompiledRule, CompileError> {
            let predicates = declared
                .iter()
                .map(|(name, arity)| self.functor(name, *arity))
                .collect();
            let signatures = Declared { predicates, symbols: &self.table };
            Compiler::new(&signatures, 256).compile(rule)
        }
    }

    fn listing(fx: &Fixture, compiled: &CompiledRule) -> Vec<String> {
        compiled
            .code
            .iter()
            .map(|instruction| instruction.display(&fx.table).to_string())
            .collect()
    }

    #[test]
    fn collinear_rule_layout() {
        let fx = Fixture::new();
        // collinear(A, B, C) :- on_line(A, L), on_line(B, L), on_line(C, L).
        let (a, b, c, l) = (var(0), var(1), var(2), var(3));
        let rule = Rule::new(
            fx.s("collinear", vec![a.clone(), b.clone(), c.clone()]),
            vec![
                fx.s("on_line", vec![a, l.clone()]),
                fx.s("on_line", vec![b, l.clone()]),
                fx.s("on_line", vec![c, l]),
            ],
        );
        let compiled = fx.compile(&[("on_line", 2)], &rule).expect("compiles");
        assert_eq!(
            listing(&fx, &compiled),
            vec![
                "allocate 4",
                "get_variable Y0, A0",
                "get_variable Y1, A1",
                "get_variable Y2, A2",
                "put_value Y0, A0",
                "put_variable Y3, A1",
                "call on_line/2",
                "put_value Y1, A0",
                "put_value Y3, A1",
                "call on_line/2",
                "put_value Y2, A0",
                "put_value Y3, A1",
                "call on_line/2",
                "deallocate",
                "proceed",
            ]
        );
        assert_eq!(compiled.frame_size(), 4);
        assert_eq!(compiled.registers, 3);
    }

    #[test]
    fn nested_head_structures_go_through_temporaries() {
        let fx = Fixture::new();
        // p(f(X, g(X)), a).
        let x = var(0);
        let rule = Rule::new(
            fx.s(
                "p",
                vec![
                    fx.s("f", vec![x.clone(), fx.s("g", vec![x])]),
                    fx.atom("a"),
                ],
            ),
            vec![],
        );
        let compiled = fx.compile(&[], &rule).expect("compiles");
        assert_eq!(
            listing(&fx, &compiled),
            vec![
                "allocate 1",
                "get_structure f/2, A0",
                "unify_variable Y0",
                "unify_variable X2",
                "get_structure g/1, A2",
                "unify_value Y0",
                "get_constant a, A1",
                "deallocate",
                "proceed",
            ]
        );
        assert_eq!(compiled.registers, 3);
    }

    #[test]
    fn body_structures_are_built_bottom_up() {
        let fx = Fixture::new();
        // q(X) :- r(f(g(X), X)).
        let x = var(0);
        let rule = Rule::new(
            fx.s("q", vec![x.clone()]),
            vec![fx.s("r", vec![fx.s("f", vec![fx.s("g", vec![x.clone()]), x])])],
        );
        let compiled = fx.compile(&[("r", 1)], &rule).expect("compiles");
        assert_eq!(
            listing(&fx, &compiled),
            vec![
                "allocate 1",
                "get_variable Y0, A0",
                "put_structure g/1, X1",
                "set_value Y0",
                "put_structure f/2, X0",
                "set_value X1",
                "set_value Y0",
                "call r/1",
                "deallocate",
                "proceed",
            ]
        );
    }

    #[test]
    fn first_occurrence_follows_emission_order() {
        let fx = Fixture::new();
        // p(f(X), X): the nested X is met before the second argument.
        let x = var(0);
        let rule = Rule::new(fx.s("p", vec![fx.s("f", vec![x.clone()]), x]), vec![]);
        let compiled = fx.compile(&[], &rule).expect("compiles");
        assert_eq!(
            listing(&fx, &compiled)[1..4],
            ["get_structure f/1, A0", "unify_variable Y0", "get_value Y0, A1"]
        );
    }

    #[test]
    fn false_body_compiles_to_fail() {
        let fx = Fixture::new();
        let rule = Rule::new(fx.s("p", vec![var(0)]), vec![fx.atom("false")]);
        let compiled = fx.compile(&[], &rule).expect("compiles");
        assert_eq!(
            listing(&fx, &compiled),
            vec!["allocate 1", "get_variable Y0, A0", "fail"]
        );
    }

    #[test]
    fn builtins_and_recursion_resolve() {
        let fx = Fixture::new();
        let (x, y) = (var(0), var(1));
        let rule = Rule::new(
            fx.s("anc", vec![x.clone(), y.clone()]),
            vec![
                fx.s("distinct", vec![x.clone(), y.clone()]),
                fx.s("anc", vec![y, x]),
            ],
        );
        let compiled = fx.compile(&[], &rule).expect("compiles");
        let calls: Vec<_> = compiled
            .code
            .iter()
            .filter_map(|instruction| match instruction {
                Instruction::Call { target } => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(
            calls,
            vec![
                Target::Builtin { builtin: Builtin::Distinct, arity: 2 },
                Target::Predicate(fx.functor("anc", 2)),
            ]
        );
    }

    #[test]
    fn compile_errors() {
        let fx = Fixture::new();
        let bad_head = Rule::new(var(0), vec![]);
        assert!(matches!(
            fx.compile(&[], &bad_head),
            Err(CompileError::InvalidHead { .. })
        ));

        let bad_goal = Rule::new(fx.atom("p"), vec![Term::number(3)]);
        assert!(matches!(
            fx.compile(&[], &bad_goal),
            Err(CompileError::InvalidGoal { index: 0, .. })
        ));

        let unknown = Rule::new(fx.atom("p"), vec![fx.s("mystery", vec![var(0)])])
            .with_label("r1");
        match fx.compile(&[], &unknown) {
            Err(CompileError::UnknownPredicate { rule, predicate, .. }) => {
                assert_eq!(rule, "r1");
                assert_eq!(predicate, "mystery/1");
            }
            other => panic!("expected unknown predicate, got {:?}", other),
        }
    }

    #[test]
    fn register_overflow_is_reported() {
        let fx = Fixture::new();
        let rule = Rule::new(fx.s("p", vec![var(0), var(1), var(2)]), vec![]);
        let signatures = Declared { predicates: HashSet::new(), symbols: &fx.table };
        let result = Compiler::new(&signatures, 2).compile(&rule);
        assert!(matches!(
            result,
            Err(CompileError::RegisterOverflow { needed: 3, available: 2, .. })
        ));
    }

    #[test]
    fn head_only_variables_are_legal() {
        let fx = Fixture::new();
        let rule = Rule::new(
            fx.s("p", vec![var(0), var(1)]),
            vec![fx.s("q", vec![var(0)])],
        );
        assert!(fx.compile(&[("q", 1)], &rule).is_ok());
    }

    #[test]
    fn compilation_is_deterministic() {
        let fx = Fixture::new();
        let rule = Rule::new(
            fx.s("p", vec![fx.s("f", vec![var(0), var(1)]), var(1)]),
            vec![fx.s("q", vec![fx.s("g", vec![var(1), var(2)]), var(0)])],
        );
        let first = fx.compile(&[("q", 2)], &rule).expect("compiles");
        let second = fx.compile(&[("q", 2)], &rule).expect("compiles");
        assert_eq!(first, second);
    }
}
