//! The closed instruction set of the abstract machine.

use super::builtin::Builtin;
use crate::data::{Functor, SymbolId, SymbolTable};
use std::fmt;

/// Register in the bank. Argument registers are the lowest indices.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u16);

impl Reg {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Permanent variable slot in the current environment frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(pub u16);

impl Slot {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a compiled variable lives: a temporary register (`X`) or a
/// permanent slot (`Y`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Var {
    Temp(Reg),
    Perm(Slot),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Constant {
    Atom(SymbolId),
    Int(i64),
}

/// What a `call` jumps to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    /// Deterministic test run inside the machine.
    Builtin { builtin: Builtin, arity: u8 },
    /// Facts in the database, then the program's clauses for the predicate.
    Predicate(Functor),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Instruction {
    Allocate { size: u16 },
    Deallocate,
    GetVariable { var: Var, arg: Reg },
    GetValue { var: Var, arg: Reg },
    GetConstant { constant: Constant, arg: Reg },
    GetStructure { functor: Functor, arg: Reg },
    UnifyVariable { var: Var },
    UnifyValue { var: Var },
    UnifyConstant { constant: Constant },
    PutVariable { var: Var, arg: Reg },
    PutValue { var: Var, arg: Reg },
    PutConstant { constant: Constant, arg: Reg },
    PutStructure { functor: Functor, reg: Reg },
    SetVariable { var: Var },
    SetValue { var: Var },
    SetConstant { constant: Constant },
    Call { target: Target },
    Proceed,
    Fail,
}

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Allocate { .. } => "allocate",
            Instruction::Deallocate => "deallocate",
            Instruction::GetVariable { .. } => "get_variable",
            Instruction::GetValue { .. } => "get_value",
            Instruction::GetConstant { .. } => "get_constant",
            Instruction::GetStructure { .. } => "get_structure",
            Instruction::UnifyVariable { .. } => "unify_variable",
            Instruction::UnifyValue { .. } => "unify_value",
            Instruction::UnifyConstant { .. } => "unify_constant",
            Instruction::PutVariable { .. } => "put_variable",
            Instruction::PutValue { .. } => "put_value",
            Instruction::PutConstant { .. } => "put_constant",
            Instruction::PutStructure { .. } => "put_structure",
            Instruction::SetVariable { .. } => "set_variable",
            Instruction::SetValue { .. } => "set_value",
            Instruction::SetConstant { .. } => "set_constant",
            Instruction::Call { .. } => "call",
            Instruction::Proceed => "proceed",
            Instruction::Fail => "fail",
        }
    }

    /// True for instructions that may send the machine into backtracking.
    pub fn can_fail(&self) -> bool {
        matches!(
            self,
            Instruction::GetValue { .. }
                | Instruction::GetConstant { .. }
                | Instruction::GetStructure { .. }
                | Instruction::UnifyValue { .. }
                | Instruction::UnifyConstant { .. }
                | Instruction::Call { .. }
                | Instruction::Fail
        )
    }

    pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> InstructionDisplay<'a> {
        InstructionDisplay { instruction: self, symbols }
    }
}

pub struct InstructionDisplay<'a> {
    instruction: &'a Instruction,
    symbols: &'a SymbolTable,
}

struct Operand<'a>(&'a Var);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Var::Temp(reg) => write!(f, "X{}", reg.0),
            Var::Perm(slot) => write!(f, "Y{}", slot.0),
        }
    }
}

impl fmt::Display for InstructionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbols = self.symbols;
        let constant = |c: &Constant| match c {
            Constant::Atom(symbol) => symbols.name_or_placeholder(*symbol),
            Constant::Int(value) => value.to_string(),
        };
        let name = self.instruction.mnemonic();
        match self.instruction {
            Instruction::Allocate { size } => write!(f, "{} {}", name, size),
            Instruction::Deallocate
            | Instruction::Proceed
            | Instruction::Fail => write!(f, "{}", name),
            Instruction::GetVariable { var, arg }
            | Instruction::GetValue { var, arg }
            | Instruction::PutVariable { var, arg }
            | Instruction::PutValue { var, arg } => {
                write!(f, "{} {}, A{}", name, Operand(var), arg.0)
            }
            Instruction::GetConstant { constant: c, arg }
            | Instruction::PutConstant { constant: c, arg } => {
                write!(f, "{} {}, A{}", name, constant(c), arg.0)
            }
            Instruction::GetStructure { functor, arg } => {
                write!(f, "{} {}, A{}", name, functor.display(symbols), arg.0)
            }
            Instruction::PutStructure { functor, reg } => {
                write!(f, "{} {}, X{}", name, functor.display(symbols), reg.0)
            }
            Instruction::UnifyVariable { var }
            | Instruction::UnifyValue { var }
            | Instruction::SetVariable { var }
            | Instruction::SetValue { var } => {
                write!(f, "{} {}", name, Operand(var))
            }
            Instruction::UnifyConstant { constant: c }
            | Instruction::SetConstant { constant: c } => {
                write!(f, "{} {}", name, constant(c))
            }
            Instruction::Call { target } => match target {
                Target::Builtin { builtin, arity } => {
                    write!(f, "{} ${}/{}", name, builtin.name(), arity)
                }
                Target::Predicate(functor) => {
                    write!(f, "{} {}", name, functor.display(symbols))
                }
            },
        }
    }
}

/// Compiled code of one rule.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstructionSequence {
    code: Vec<Instruction>,
}

impl InstructionSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    pub fn get(&self, offset: usize) -> Option<&Instruction> {
        self.code.get(offset)
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.code.iter()
    }

    /// One instruction per line, prefixed with its offset.
    pub fn listing(&self, symbols: &SymbolTable) -> String {
        self.code
            .iter()
            .enumerate()
            .map(|(offset, instruction)| {
                format!("{:>4}: {}", offset, instruction.display(symbols))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl FromIterator<Instruction> for InstructionSequence {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Self { code: iter.into_iter().collect() }
    }
}
