//! The abstract machine.
//!
//! A [`Machine`] runs one derivation attempt: it loads a compiled rule,
//! unifies its head with an optional goal and executes the body against the
//! fact database, enumerating every solution by backtracking. Nothing is
//! written to the database here; callers assert facts from the solutions.

use super::choice::{Alternative, ChoicePoint, Continuation, Frame};
use super::compiler::CompiledRule;
use super::instruction::{Constant, Instruction, Reg, Target, Var};
use super::program::Program;
use crate::config::{EngineConfig, Statistics};
use crate::data::{
    Addr, Cell, Environment, Fact, Functor, Heap, RuleId, Term, Trail, Value, VariableId,
    VariableNames,
};
use crate::database::FactSource;
use crate::error::{EngineError, FaultKind, MachineFault};
use crate::inference::Unifier;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Execution state of a machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// No attempt started.
    Idle,
    Running,
    /// A solution was reached; `next_solution` resumes from it.
    Succeeded,
    /// Every alternative is exhausted.
    Failed,
    Backtracking,
}

/// One answer of a derivation attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution {
    pub rule: RuleId,
    /// Rule head under the answer's bindings. Variables left unbound are
    /// named after their heap address.
    pub head: Term,
    /// Every rule variable and the term it was bound to.
    pub bindings: Environment,
}

impl Solution {
    /// The head as a fact, if it is ground.
    pub fn fact(&self) -> Option<Fact> {
        Fact::new(self.head.clone())
    }

    pub fn binding(&self, var: VariableId) -> Option<&Term> {
        self.bindings.lookup(var)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mode {
    /// Matching an existing structure; the address is the next argument.
    Read(Addr),
    /// Building a structure at the top of the heap.
    Write,
}

#[derive(Clone, Debug)]
struct Entry {
    rule: RuleId,
    head: Functor,
    arguments: Vec<Addr>,
}

enum Next {
    Fact(Fact),
    Clause { rule: RuleId, last: bool },
    OpenClauses,
    Exhausted,
}

pub struct Machine<'a, S: FactSource + ?Sized> {
    program: &'a Program,
    facts: &'a S,
    unifier: Unifier,
    max_steps: u64,
    cancel: Option<Arc<AtomicBool>>,

    registers: Vec<Option<Addr>>,
    heap: Heap,
    trail: Trail<Addr>,
    frames: Vec<Frame>,
    environment: Option<usize>,
    choices: Vec<ChoicePoint>,

    rule: Option<RuleId>,
    pc: usize,
    /// Offset of the instruction being executed, for fault reports.
    offset: usize,
    continuation: Continuation,
    mode: Mode,
    state: State,

    entry: Option<Entry>,
    answer: Option<Vec<Option<Addr>>>,
    pending: Option<Solution>,
    steps: u64,
    stats: Statistics,
}

impl<'a, S: FactSource + ?Sized> Machine<'a, S> {
    pub fn new(program: &'a Program, facts: &'a S, config: &EngineConfig) -> Self {
        Self {
            program,
            facts,
            unifier: Unifier::new(config.occurs_check),
            max_steps: config.max_steps,
            cancel: None,
            registers: vec![None; program.registers()],
            heap: Heap::new(),
            trail: Trail::new(),
            frames: Vec::new(),
            environment: None,
            choices: Vec::new(),
            rule: None,
            pc: 0,
            offset: 0,
            continuation: Continuation::Halt,
            mode: Mode::Write,
            state: State::Idle,
            entry: None,
            answer: None,
            pending: None,
            steps: 0,
            stats: Statistics::new(),
        }
    }

    /// Stop at the next instruction boundary once `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn trail(&self) -> &Trail<Addr> {
        &self.trail
    }

    /// Number of live choice points.
    pub fn choice_depth(&self) -> usize {
        self.choices.len()
    }

    /// Begin an attempt of `rule`. With a goal, the head must unify with
    /// it; a goal of another predicate gives no solutions.
    pub fn start(&mut self, rule: RuleId, goal: Option<&Term>) -> Result<(), EngineError> {
        let program = self.program;
        let compiled = program.rule(rule).ok_or(EngineError::UnknownRule(rule))?;
        self.reset();
        self.rule = Some(rule);

        let arity = compiled.head.arity as usize;
        if arity > self.registers.len() {
            return Err(self
                .fault(FaultKind::BadRegister {
                    index: arity as u16,
                    size: self.registers.len(),
                })
                .into());
        }

        let mut arguments = Vec::with_capacity(arity);
        match goal {
            Some(goal) => {
                if goal.args().len() != arity
                    || goal.functor() != Some(compiled.head)
                    || !goal.fits_arity()
                {
                    debug!(rule = %rule, "goal does not match rule head");
                    self.state = State::Failed;
                    return Ok(());
                }
                let mut vars = HashMap::new();
                for arg in goal.args() {
                    let addr = self
                        .heap
                        .load(arg, &mut vars)
                        .map_err(|kind| self.fault(kind))?;
                    arguments.push(addr);
                }
            }
            None => {
                for _ in 0..arity {
                    arguments.push(self.heap.new_variable());
                }
            }
        }
        for (index, addr) in arguments.iter().enumerate() {
            self.set_register(Reg(index as u16), *addr)
                .map_err(|kind| self.fault(kind))?;
        }

        debug!(rule = %rule, goal = goal.is_some(), "attempt started");
        self.entry = Some(Entry { rule, head: compiled.head, arguments });
        self.state = State::Running;
        Ok(())
    }

    /// Run to the next solution. `Ok(None)` once every alternative is
    /// exhausted.
    pub fn next_solution(&mut self) -> Result<Option<Solution>, EngineError> {
        match self.state {
            State::Idle | State::Failed => return Ok(None),
            State::Succeeded => self.state = State::Backtracking,
            State::Running | State::Backtracking => {}
        }
        loop {
            let advanced = match self.state {
                State::Running => self.step(),
                State::Backtracking => self.backtrack(),
                State::Succeeded => return Ok(self.pending.take()),
                State::Failed | State::Idle => return Ok(None),
            };
            if let Err(err) = advanced {
                // An aborted attempt cannot be resumed.
                self.state = State::Failed;
                return Err(err);
            }
        }
    }

    /// Collect every remaining solution.
    pub fn solutions(&mut self) -> Result<Vec<Solution>, EngineError> {
        let mut solutions = Vec::new();
        while let Some(solution) = self.next_solution()? {
            solutions.push(solution);
        }
        Ok(solutions)
    }

    fn reset(&mut self) {
        self.registers.iter_mut().for_each(|reg| *reg = None);
        self.heap.clear();
        self.trail.clear();
        self.frames.clear();
        self.environment = None;
        self.choices.clear();
        self.rule = None;
        self.pc = 0;
        self.offset = 0;
        self.continuation = Continuation::Halt;
        self.mode = Mode::Write;
        self.state = State::Idle;
        self.entry = None;
        self.answer = None;
        self.pending = None;
        self.steps = 0;
    }

    fn fault(&self, kind: FaultKind) -> MachineFault {
        MachineFault { rule: self.rule, offset: self.offset, kind }
    }

    fn step(&mut self) -> Result<(), EngineError> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                debug!("attempt cancelled");
                return Err(EngineError::Cancelled);
            }
        }
        if self.max_steps > 0 && self.steps >= self.max_steps {
            debug!(limit = self.max_steps, "step limit reached");
            return Err(EngineError::StepLimit { limit: self.max_steps });
        }
        self.steps += 1;
        self.stats.instructions += 1;

        let program = self.program;
        let rule = self
            .rule
            .ok_or_else(|| self.fault(FaultKind::BadProgramCounter(self.pc)))?;
        let compiled = program.rule(rule).ok_or(EngineError::UnknownRule(rule))?;
        let instruction = *compiled
            .code
            .get(self.pc)
            .ok_or_else(|| self.fault(FaultKind::BadProgramCounter(self.pc)))?;
        self.offset = self.pc;
        self.pc += 1;
        trace!(
            rule = %rule,
            offset = self.offset,
            instruction = %instruction.display(program.symbols()),
            "step"
        );

        let proceed = self
            .execute(instruction, compiled)
            .map_err(|kind| self.fault(kind))?;
        if !proceed {
            self.state = State::Backtracking;
        }
        Ok(())
    }

    /// Execute one instruction. `Ok(false)` means the machine must
    /// backtrack.
    fn execute(
        &mut self,
        instruction: Instruction,
        compiled: &CompiledRule,
    ) -> Result<bool, FaultKind> {
        match instruction {
            Instruction::Allocate { size } => {
                self.frames.push(Frame::new(
                    size as usize,
                    self.continuation,
                    self.environment,
                ));
                self.environment = Some(self.frames.len() - 1);
            }
            Instruction::Deallocate => {
                let frame = self
                    .environment
                    .and_then(|index| self.frames.get(index))
                    .ok_or(FaultKind::NoFrame)?;
                if frame.continuation == Continuation::Halt {
                    self.answer = Some(frame.slots.clone());
                }
                self.continuation = frame.continuation;
                self.environment = frame.previous;
            }
            Instruction::GetVariable { var, arg } => {
                let addr = self.register(arg)?;
                self.store(var, addr)?;
            }
            Instruction::GetValue { var, arg } => {
                let left = self.load(var)?;
                let right = self.register(arg)?;
                return self.unify(left, right);
            }
            Instruction::GetConstant { constant, arg } => {
                let addr = self.register(arg)?;
                return self.match_constant(addr, constant);
            }
            Instruction::GetStructure { functor, arg } => {
                let addr = self.register(arg)?;
                match self.heap.value(addr)? {
                    (var, Value::Unbound) => {
                        let structure = self.heap.new_structure(functor);
                        self.bind(var, structure)?;
                        self.mode = Mode::Write;
                    }
                    (_, Value::Structure(found, header)) if found == functor => {
                        self.mode = Mode::Read(Heap::argument(header, 0));
                    }
                    _ => return Ok(false),
                }
            }
            Instruction::UnifyVariable { var } => match self.mode {
                Mode::Read(next) => {
                    self.store(var, next)?;
                    self.mode = Mode::Read(next.offset(1));
                }
                Mode::Write => {
                    let addr = self.heap.new_variable();
                    self.store(var, addr)?;
                }
            },
            Instruction::UnifyValue { var } => {
                let value = self.load(var)?;
                match self.mode {
                    Mode::Read(next) => {
                        self.mode = Mode::Read(next.offset(1));
                        return self.unify(value, next);
                    }
                    Mode::Write => {
                        self.heap.push(Cell::Ref(value));
                    }
                }
            }
            Instruction::UnifyConstant { constant } => match self.mode {
                Mode::Read(next) => {
                    self.mode = Mode::Read(next.offset(1));
                    return self.match_constant(next, constant);
                }
                Mode::Write => {
                    self.push_constant(constant);
                }
            },
            Instruction::PutVariable { var, arg } => {
                let addr = self.heap.new_variable();
                self.store(var, addr)?;
                self.set_register(arg, addr)?;
            }
            Instruction::PutValue { var, arg } => {
                let addr = self.load(var)?;
                self.set_register(arg, addr)?;
            }
            Instruction::PutConstant { constant, arg } => {
                let addr = self.push_constant(constant);
                self.set_register(arg, addr)?;
            }
            Instruction::PutStructure { functor, reg } => {
                let addr = self.heap.new_structure(functor);
                self.set_register(reg, addr)?;
                self.mode = Mode::Write;
            }
            Instruction::SetVariable { var } => {
                let addr = self.heap.new_variable();
                self.store(var, addr)?;
            }
            Instruction::SetValue { var } => {
                let addr = self.load(var)?;
                self.heap.push(Cell::Ref(addr));
            }
            Instruction::SetConstant { constant } => {
                self.push_constant(constant);
            }
            Instruction::Call { target } => return self.call(target),
            Instruction::Proceed => self.proceed(compiled)?,
            Instruction::Fail => return Ok(false),
        }
        Ok(true)
    }

    fn register(&self, reg: Reg) -> Result<Addr, FaultKind> {
        self.registers
            .get(reg.index())
            .ok_or(FaultKind::BadRegister { index: reg.0, size: self.registers.len() })?
            .ok_or(FaultKind::EmptyRegister(reg.0))
    }

    fn set_register(&mut self, reg: Reg, addr: Addr) -> Result<(), FaultKind> {
        let size = self.registers.len();
        let slot = self
            .registers
            .get_mut(reg.index())
            .ok_or(FaultKind::BadRegister { index: reg.0, size })?;
        *slot = Some(addr);
        Ok(())
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, FaultKind> {
        let index = self.environment.ok_or(FaultKind::NoFrame)?;
        self.frames.get_mut(index).ok_or(FaultKind::NoFrame)
    }

    fn load(&self, var: Var) -> Result<Addr, FaultKind> {
        match var {
            Var::Temp(reg) => self.register(reg),
            Var::Perm(slot) => {
                let frame = self
                    .environment
                    .and_then(|index| self.frames.get(index))
                    .ok_or(FaultKind::NoFrame)?;
                frame
                    .slots
                    .get(slot.index())
                    .ok_or(FaultKind::BadSlot { index: slot.0, size: frame.slots.len() })?
                    .ok_or(FaultKind::EmptySlot(slot.0))
            }
        }
    }

    fn store(&mut self, var: Var, addr: Addr) -> Result<(), FaultKind> {
        match var {
            Var::Temp(reg) => self.set_register(reg, addr),
            Var::Perm(slot) => {
                let frame = self.frame_mut()?;
                let size = frame.slots.len();
                let cell = frame
                    .slots
                    .get_mut(slot.index())
                    .ok_or(FaultKind::BadSlot { index: slot.0, size })?;
                *cell = Some(addr);
                Ok(())
            }
        }
    }

    fn bind(&mut self, var: Addr, target: Addr) -> Result<(), FaultKind> {
        self.heap.bind(var, target)?;
        self.trail.push(var);
        Ok(())
    }

    fn unify(&mut self, left: Addr, right: Addr) -> Result<bool, FaultKind> {
        self.unifier
            .unify_cells(&mut self.heap, &mut self.trail, left, right)
    }

    fn push_constant(&mut self, constant: Constant) -> Addr {
        match constant {
            Constant::Atom(symbol) => self.heap.new_atom(symbol),
            Constant::Int(value) => self.heap.new_int(value),
        }
    }

    fn match_constant(&mut self, addr: Addr, constant: Constant) -> Result<bool, FaultKind> {
        match self.heap.value(addr)? {
            (var, Value::Unbound) => {
                let value = self.push_constant(constant);
                self.bind(var, value)?;
                Ok(true)
            }
            (_, Value::Atom(symbol)) => Ok(constant == Constant::Atom(symbol)),
            (_, Value::Int(value)) => Ok(constant == Constant::Int(value)),
            (_, Value::Structure(..)) => Ok(false),
        }
    }

    fn arguments(&self, arity: usize) -> Result<Vec<Option<Addr>>, FaultKind> {
        self.registers
            .get(..arity)
            .map(<[Option<Addr>]>::to_vec)
            .ok_or(FaultKind::BadRegister { index: arity as u16, size: self.registers.len() })
    }

    fn call(&mut self, target: Target) -> Result<bool, FaultKind> {
        self.stats.calls += 1;
        match target {
            Target::Builtin { builtin, arity } => {
                let args = (0..arity as u16)
                    .map(|index| self.register(Reg(index)))
                    .collect::<Result<Vec<_>, _>>()?;
                builtin.run(&mut self.heap, &mut self.trail, &self.unifier, &args)
            }
            Target::Predicate(goal) => {
                let rule = self.rule.ok_or(FaultKind::BadProgramCounter(self.pc))?;
                let arguments = self.arguments(goal.arity as usize)?;
                let pattern = self.pattern(goal, &arguments)?;
                let query = self.facts.query(&pattern);
                self.choices.push(ChoicePoint {
                    goal,
                    alternative: Alternative::Facts(query),
                    arguments,
                    environment: self.environment,
                    continuation: Continuation::Return { rule, offset: self.pc },
                    trail_len: self.trail.len(),
                    heap_len: self.heap.len(),
                    frames_len: self.frames.len(),
                });
                self.stats.choice_points += 1;
                trace!(
                    goal = %goal.display(self.program.symbols()),
                    depth = self.choices.len(),
                    "choice point pushed"
                );
                self.resume()
            }
        }
    }

    /// Term form of a call, used to narrow the fact query. Cyclic
    /// arguments only occur without the occurs check and match anything.
    fn pattern(&self, goal: Functor, arguments: &[Option<Addr>]) -> Result<Term, FaultKind> {
        let mut args = Vec::with_capacity(arguments.len());
        for (index, addr) in arguments.iter().enumerate() {
            let addr = addr.ok_or(FaultKind::EmptyRegister(index as u16))?;
            let term = match self.heap.extract(addr) {
                Ok(term) => term,
                Err(FaultKind::CyclicTerm) => Term::variable(VariableId::new(addr.0)),
                Err(other) => return Err(other),
            };
            args.push(term);
        }
        Ok(Term::structure(goal.symbol, args))
    }

    fn proceed(&mut self, compiled: &CompiledRule) -> Result<(), FaultKind> {
        match self.continuation {
            Continuation::Return { rule, offset } => {
                self.rule = Some(rule);
                self.pc = offset;
            }
            Continuation::Halt => {
                let solution = self.capture(compiled)?;
                self.stats.solutions += 1;
                debug!(
                    rule = %solution.rule,
                    head = %solution.head.display(self.program.symbols()),
                    "solution"
                );
                self.pending = Some(solution);
                self.state = State::Succeeded;
            }
        }
        Ok(())
    }

    /// Read the answer back to terms. `compiled` is the rule at the top
    /// level, since only its code can return to `Halt`. A cyclic head
    /// argument is a fault; a cyclic binding is only left out.
    fn capture(&mut self, compiled: &CompiledRule) -> Result<Solution, FaultKind> {
        let answer = self.answer.take();
        let entry = self.entry.as_ref().ok_or(FaultKind::NoFrame)?;
        // Unbound answer variables are named apart from the rule's own.
        let mut names = VariableNames::reserving(compiled.slots.iter().map(|(var, _)| *var));
        let args = entry
            .arguments
            .iter()
            .map(|addr| self.heap.extract_named(*addr, &mut names))
            .collect::<Result<Vec<_>, _>>()?;
        let head = Term::structure(entry.head.symbol, args);

        let mut bindings = Environment::new();
        if let Some(slots) = answer {
            for (var, slot) in &compiled.slots {
                if let Some(Some(addr)) = slots.get(slot.index()) {
                    match self.heap.extract_named(*addr, &mut names) {
                        Ok(term) => bindings.bind(*var, term),
                        // No finite term to report; the variable stays unbound.
                        Err(FaultKind::CyclicTerm) => {
                            trace!(var = var.as_u32(), "cyclic binding left out of the answer");
                        }
                        Err(other) => return Err(other),
                    }
                }
            }
        }
        Ok(Solution { rule: entry.rule, head, bindings })
    }

    /// Undo everything done since the newest choice point was pushed.
    fn restore(&mut self) -> Result<(), FaultKind> {
        let Some(choice) = self.choices.last() else {
            return Ok(());
        };
        let heap = &mut self.heap;
        self.trail.rewind(choice.trail_len, |var| heap.unbind(var))?;
        heap.truncate(choice.heap_len);
        self.frames.truncate(choice.frames_len);
        for (index, addr) in choice.arguments.iter().enumerate() {
            if let Some(reg) = self.registers.get_mut(index) {
                *reg = *addr;
            }
        }
        self.environment = choice.environment;
        self.continuation = choice.continuation;
        Ok(())
    }

    /// Take the next alternative of the newest choice point. Pops it when
    /// it runs out and returns `Ok(false)`.
    fn resume(&mut self) -> Result<bool, FaultKind> {
        let program = self.program;
        let facts = self.facts;
        loop {
            self.restore()?;
            let Some(choice) = self.choices.last_mut() else {
                return Ok(false);
            };
            let goal = choice.goal;
            let continuation = choice.continuation;
            let next = match &mut choice.alternative {
                Alternative::Facts(query) => match facts.next_match(query) {
                    Some(fact) => Next::Fact(fact),
                    None => Next::OpenClauses,
                },
                Alternative::Clauses(index) => {
                    let clauses = program.clauses(goal);
                    match clauses.get(*index) {
                        Some(&rule) => {
                            *index += 1;
                            Next::Clause { rule, last: *index == clauses.len() }
                        }
                        None => Next::Exhausted,
                    }
                }
            };

            match next {
                Next::OpenClauses => {
                    choice.alternative = Alternative::Clauses(0);
                }
                Next::Exhausted => {
                    self.choices.pop();
                    return Ok(false);
                }
                Next::Fact(fact) => {
                    if self.unify_fact(goal, &fact)? {
                        trace!(fact = %fact.display(program.symbols()), "fact matched");
                        if let Continuation::Return { rule, offset } = continuation {
                            self.rule = Some(rule);
                            self.pc = offset;
                        }
                        return Ok(true);
                    }
                }
                Next::Clause { rule, last } => {
                    if last {
                        self.choices.pop();
                    }
                    self.rule = Some(rule);
                    self.pc = 0;
                    return Ok(true);
                }
            }
        }
    }

    fn unify_fact(&mut self, goal: Functor, fact: &Fact) -> Result<bool, FaultKind> {
        if goal.arity == 0 {
            return Ok(true);
        }
        let addr = self.heap.load_ground(fact.term())?;
        let header = match self.heap.value(addr)? {
            (_, Value::Structure(functor, header)) if functor == goal => header,
            _ => return Ok(false),
        };
        for index in 0..goal.arity as usize {
            let arg = self.register(Reg(index as u16))?;
            if !self.unify(arg, Heap::argument(header, index))? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn backtrack(&mut self) -> Result<(), EngineError> {
        while !self.choices.is_empty() {
            self.stats.backtracks += 1;
            if self.resume().map_err(|kind| self.fault(kind))? {
                self.state = State::Running;
                return Ok(());
            }
        }
        debug!(rule = ?self.entry.as_ref().map(|entry| entry.rule), "attempt exhausted");
        self.state = State::Failed;
        Ok(())
    }
}
