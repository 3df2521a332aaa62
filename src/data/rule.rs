use super::symbol::SymbolTable;
use super::term::{Term, VariableId};
use std::collections::HashSet;
use std::fmt;

/// Identifier for rules registered in a program.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub u32);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule#{}", self.0)
    }
}

/// A deduction rule: `head :- body[0], body[1], ...`.
///
/// A rule with an empty body is a clause that holds unconditionally.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rule {
    pub head: Term,
    pub body: Vec<Term>,
    pub label: Option<String>,
}

impl Rule {
    pub fn new(head: Term, body: Vec<Term>) -> Self {
        Self { head, body, label: None }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn add_goal(&mut self, goal: Term) {
        self.body.push(goal);
    }

    /// Distinct variables in first-occurrence order, head first.
    pub fn variables(&self) -> Vec<VariableId> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        self.head.collect_variables(&mut seen, &mut ordered);
        for goal in &self.body {
            goal.collect_variables(&mut seen, &mut ordered);
        }
        ordered
    }

    /// Head variables that never occur in the body.
    pub fn head_only_variables(&self) -> Vec<VariableId> {
        let mut body_vars = HashSet::new();
        let mut ignored = Vec::new();
        for goal in &self.body {
            goal.collect_variables(&mut body_vars, &mut ignored);
        }
        self.head
            .variables()
            .into_iter()
            .filter(|var| !body_vars.contains(var))
            .collect()
    }

    pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> RuleDisplay<'a> {
        RuleDisplay { rule: self, symbols }
    }
}

pub struct RuleDisplay<'a> {
    rule: &'a Rule,
    symbols: &'a SymbolTable,
}

impl fmt::Display for RuleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rule.head.display(self.symbols))?;
        for (index, goal) in self.rule.body.iter().enumerate() {
            let sep = if index == 0 { " :- " } else { ", " };
            write!(f, "{}{}", sep, goal.display(self.symbols))?;
        }
        write!(f, ".")
    }
}

#[cfg(test)]
mod tests {
    use super::Rule;
    use crate::data::{SymbolTable, Term, VariableId};

    fn var(id: u32) -> Term {
        Term::variable(VariableId::new(id))
    }

    #[test]
    fn rule_variables_head_first() {
        let table = SymbolTable::new();
        let on_line = table.intern("on_line");
        let collinear = table.intern("collinear");
        let rule = Rule::new(
            Term::structure(collinear, vec![var(0), var(1)]),
            vec![
                Term::structure(on_line, vec![var(0), var(2)]),
                Term::structure(on_line, vec![var(1), var(2)]),
            ],
        );
        assert_eq!(
            rule.variables(),
            vec![VariableId::new(0), VariableId::new(1), VariableId::new(2)]
        );
        assert!(rule.head_only_variables().is_empty());
    }

    #[test]
    fn head_only_variables_are_reported() {
        let table = SymbolTable::new();
        let rule = Rule::new(
            Term::structure(table.intern("p"), vec![var(0), var(1)]),
            vec![Term::structure(table.intern("q"), vec![var(0)])],
        );
        assert_eq!(rule.head_only_variables(), vec![VariableId::new(1)]);
    }

    #[test]
    fn display_renders_clause_syntax() {
        let table = SymbolTable::new();
        let rule = Rule::new(
            Term::structure(table.intern("p"), vec![var(0)]),
            vec![Term::structure(table.intern("q"), vec![var(0)])],
        )
        .with_label("demo");
        assert_eq!(rule.display(&table).to_string(), "p(_G0) :- q(_G0).");
        assert_eq!(rule.label.as_deref(), Some("demo"));
    }
}
