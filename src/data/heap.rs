//! Arena of term cells used by the abstract machine.
//!
//! Every term the machine touches lives here. A variable is a `Ref` cell:
//! unbound when it points at itself, bound when it points anywhere else.
//! Structures are a `Str` pointer to a `Functor` header followed by exactly
//! `arity` argument cells. Addresses are plain indices, so backtracking is a
//! truncation back to a recorded high-water mark.

use super::symbol::SymbolId;
use super::term::{Functor, Term, VariableId};
use crate::error::FaultKind;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Index of a heap cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr(pub u32);

impl Addr {
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn offset(self, by: u32) -> Addr {
        Addr(self.0 + by)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cell {
    Ref(Addr),
    Str(Addr),
    Functor(Functor),
    Atom(SymbolId),
    Int(i64),
}

/// What a dereferenced address holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Unbound,
    /// Structure whose header sits at the given address.
    Structure(Functor, Addr),
    Atom(SymbolId),
    Int(i64),
}

/// Names given to unbound heap variables when they are read back.
///
/// Each new variable gets the lowest id that is neither handed out already
/// nor reserved. Reserving the ids of a rule's own variables keeps the two
/// apart in one answer.
#[derive(Clone, Debug, Default)]
pub struct VariableNames {
    names: HashMap<Addr, VariableId>,
    reserved: HashSet<VariableId>,
    next: u32,
}

impl VariableNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserving(ids: impl IntoIterator<Item = VariableId>) -> Self {
        Self { reserved: ids.into_iter().collect(), ..Self::default() }
    }

    pub fn name(&mut self, addr: Addr) -> VariableId {
        if let Some(id) = self.names.get(&addr) {
            return *id;
        }
        while self.reserved.contains(&VariableId::new(self.next)) {
            self.next += 1;
        }
        let id = VariableId::new(self.next);
        self.next += 1;
        self.names.insert(addr, id);
        id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Heap {
    cells: Vec<Cell>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Address the next pushed cell will get.
    pub fn top(&self) -> Addr {
        Addr(self.cells.len() as u32)
    }

    pub fn truncate(&mut self, len: usize) {
        self.cells.truncate(len);
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn cell(&self, addr: Addr) -> Result<Cell, FaultKind> {
        self.cells
            .get(addr.index())
            .copied()
            .ok_or(FaultKind::BadAddress(addr.0))
    }

    fn set(&mut self, addr: Addr, cell: Cell) -> Result<(), FaultKind> {
        let slot = self
            .cells
            .get_mut(addr.index())
            .ok_or(FaultKind::BadAddress(addr.0))?;
        *slot = cell;
        Ok(())
    }

    pub fn push(&mut self, cell: Cell) -> Addr {
        let addr = self.top();
        self.cells.push(cell);
        addr
    }

    pub fn new_variable(&mut self) -> Addr {
        let addr = self.top();
        self.cells.push(Cell::Ref(addr));
        addr
    }

    pub fn new_atom(&mut self, symbol: SymbolId) -> Addr {
        self.push(Cell::Atom(symbol))
    }

    pub fn new_int(&mut self, value: i64) -> Addr {
        self.push(Cell::Int(value))
    }

    /// Push a `Str` cell and its functor header. Arguments must be pushed
    /// right after, in order.
    pub fn new_structure(&mut self, functor: Functor) -> Addr {
        let addr = self.top();
        self.cells.push(Cell::Str(addr.offset(1)));
        self.cells.push(Cell::Functor(functor));
        addr
    }

    /// Follow `Ref` links until an unbound variable or a non-variable cell.
    pub fn deref(&self, mut addr: Addr) -> Result<Addr, FaultKind> {
        loop {
            match self.cell(addr)? {
                Cell::Ref(next) if next != addr => addr = next,
                _ => return Ok(addr),
            }
        }
    }

    /// Dereference `addr` and classify what it holds.
    pub fn value(&self, addr: Addr) -> Result<(Addr, Value), FaultKind> {
        let addr = self.deref(addr)?;
        let value = match self.cell(addr)? {
            Cell::Ref(_) => Value::Unbound,
            Cell::Str(header) => match self.cell(header)? {
                Cell::Functor(functor) => Value::Structure(functor, header),
                _ => return Err(FaultKind::BadAddress(header.0)),
            },
            Cell::Functor(functor) => Value::Structure(functor, addr),
            Cell::Atom(symbol) => Value::Atom(symbol),
            Cell::Int(value) => Value::Int(value),
        };
        Ok((addr, value))
    }

    /// Address of argument `index` (zero based) of the structure whose
    /// header is at `header`.
    pub fn argument(header: Addr, index: usize) -> Addr {
        header.offset(1 + index as u32)
    }

    /// Point the unbound variable at `var` to `target`. The caller records
    /// the binding on the trail.
    pub fn bind(&mut self, var: Addr, target: Addr) -> Result<(), FaultKind> {
        self.set(var, Cell::Ref(target))
    }

    /// Reset a variable to unbound. Used when rewinding the trail.
    pub fn unbind(&mut self, var: Addr) {
        if let Some(slot) = self.cells.get_mut(var.index()) {
            *slot = Cell::Ref(var);
        }
    }

    /// Copy a term onto the heap. Variables are shared through `vars`, so
    /// loading several terms with the same map keeps their variables linked.
    ///
    /// A structure wider than a functor header can describe is a fault.
    /// Cells pushed before it stay until the caller truncates the heap.
    pub fn load(
        &mut self,
        term: &Term,
        vars: &mut HashMap<VariableId, Addr>,
    ) -> Result<Addr, FaultKind> {
        match term {
            Term::Variable(id) => Ok(*vars.entry(*id).or_insert_with(|| {
                let addr = self.top();
                self.cells.push(Cell::Ref(addr));
                addr
            })),
            Term::Atom(symbol) => Ok(self.new_atom(*symbol)),
            Term::Number(value) => Ok(self.new_int(*value)),
            Term::Struct { functor, args } => {
                let arity = u8::try_from(args.len())
                    .map_err(|_| FaultKind::ArityOverflow(args.len()))?;
                let addr = self.new_structure(Functor::new(*functor, arity));
                let first = self.top();
                for _ in args {
                    self.cells.push(Cell::Ref(Addr(0)));
                }
                for (index, arg) in args.iter().enumerate() {
                    let slot = first.offset(index as u32);
                    let cell = match arg {
                        Term::Atom(symbol) => Cell::Atom(*symbol),
                        Term::Number(value) => Cell::Int(*value),
                        Term::Variable(id) => match vars.get(id) {
                            Some(existing) => Cell::Ref(*existing),
                            None => {
                                vars.insert(*id, slot);
                                Cell::Ref(slot)
                            }
                        },
                        Term::Struct { .. } => Cell::Ref(self.load(arg, vars)?),
                    };
                    self.cells[slot.index()] = cell;
                }
                Ok(addr)
            }
        }
    }

    /// Copy a ground term onto the heap.
    pub fn load_ground(&mut self, term: &Term) -> Result<Addr, FaultKind> {
        self.load(term, &mut HashMap::new())
    }

    /// Read a term back from the heap. Unbound variables are numbered
    /// from zero in the order they are first met.
    pub fn extract(&self, addr: Addr) -> Result<Term, FaultKind> {
        self.extract_named(addr, &mut VariableNames::new())
    }

    /// Read a term back, naming unbound variables through `names`. Reusing
    /// one `names` across several reads keeps shared variables equal.
    pub fn extract_named(
        &self,
        addr: Addr,
        names: &mut VariableNames,
    ) -> Result<Term, FaultKind> {
        let mut path = HashSet::new();
        self.extract_inner(addr, names, &mut path)
    }

    fn extract_inner(
        &self,
        addr: Addr,
        names: &mut VariableNames,
        path: &mut HashSet<Addr>,
    ) -> Result<Term, FaultKind> {
        let (addr, value) = self.value(addr)?;
        match value {
            Value::Unbound => Ok(Term::Variable(names.name(addr))),
            Value::Atom(symbol) => Ok(Term::Atom(symbol)),
            Value::Int(value) => Ok(Term::Number(value)),
            Value::Structure(functor, header) => {
                if !path.insert(header) {
                    return Err(FaultKind::CyclicTerm);
                }
                let mut args = Vec::with_capacity(functor.arity as usize);
                for index in 0..functor.arity as usize {
                    args.push(self.extract_inner(
                        Self::argument(header, index),
                        names,
                        path,
                    )?);
                }
                path.remove(&header);
                Ok(Term::structure(functor.symbol, args))
            }
        }
    }

    /// True if the term at `addr` contains no unbound variable.
    pub fn is_ground(&self, addr: Addr) -> Result<bool, FaultKind> {
        let mut path = HashSet::new();
        self.is_ground_inner(addr, &mut path)
    }

    fn is_ground_inner(
        &self,
        addr: Addr,
        path: &mut HashSet<Addr>,
    ) -> Result<bool, FaultKind> {
        match self.value(addr)? {
            (_, Value::Unbound) => Ok(false),
            (_, Value::Atom(_)) | (_, Value::Int(_)) => Ok(true),
            (_, Value::Structure(functor, header)) => {
                if !path.insert(header) {
                    return Err(FaultKind::CyclicTerm);
                }
                for index in 0..functor.arity as usize {
                    if !self.is_ground_inner(Self::argument(header, index), path)? {
                        return Ok(false);
                    }
                }
                path.remove(&header);
                Ok(true)
            }
        }
    }

    /// True if the unbound variable `var` occurs in the term at `addr`.
    pub fn occurs(&self, var: Addr, addr: Addr) -> Result<bool, FaultKind> {
        match self.value(addr)? {
            (found, Value::Unbound) => Ok(found == var),
            (_, Value::Atom(_)) | (_, Value::Int(_)) => Ok(false),
            (_, Value::Structure(functor, header)) => {
                for index in 0..functor.arity as usize {
                    if self.occurs(var, Self::argument(header, index))? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}
