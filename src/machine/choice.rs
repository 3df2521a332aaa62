//! Environment frames and choice points.

use crate::data::{Addr, Functor, RuleId};
use crate::database::FactQuery;

/// Where `proceed` returns to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Continuation {
    /// Top level: reaching it is a solution.
    Halt,
    /// Instruction `offset` of `rule`.
    Return { rule: RuleId, offset: usize },
}

/// Activation record of one clause: its permanent variable slots and the
/// continuation of its caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub slots: Vec<Option<Addr>>,
    pub continuation: Continuation,
    /// Frame that was current when this one was allocated.
    pub previous: Option<usize>,
}

impl Frame {
    pub fn new(size: usize, continuation: Continuation, previous: Option<usize>) -> Self {
        Self { slots: vec![None; size], continuation, previous }
    }
}

/// Remaining ways to answer a call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Alternative {
    /// Facts from the database first, then clauses from index zero.
    Facts(FactQuery),
    /// Clause at this index of the predicate's clause list.
    Clauses(usize),
}

/// Snapshot taken at a call with alternatives left. Backtracking restores
/// the machine to exactly this state before the next alternative runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChoicePoint {
    pub goal: Functor,
    pub alternative: Alternative,
    pub arguments: Vec<Option<Addr>>,
    pub environment: Option<usize>,
    pub continuation: Continuation,
    pub trail_len: usize,
    pub heap_len: usize,
    pub frames_len: usize,
}

#[cfg(test)]
mod tests {
    use super::{Continuation, Frame};
    use crate::data::RuleId;

    #[test]
    fn new_frame_slots_are_empty() {
        let frame = Frame::new(3, Continuation::Return { rule: RuleId(1), offset: 4 }, Some(0));
        assert_eq!(frame.slots, vec![None, None, None]);
        assert_eq!(frame.previous, Some(0));
    }
}
