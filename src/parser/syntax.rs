use crate::data::{Fact, Functor, Rule, SymbolTable, Term, VariableId};
use crate::error::ParseError;
use std::cell::RefCell;
use std::collections::HashMap;

/// One statement of a rule source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    /// Ground term terminated by `.`
    Fact(Fact),
    /// `head :- goal, ... .` or a head with variables and no body.
    Rule(Rule),
    /// `?- goal.` a goal to attempt against the rules of its predicate.
    Goal(Term),
    /// `:- declare(name/arity, ...).`
    Declare(Vec<Functor>),
}

/// Parsed rule source, statements in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Source {
    pub statements: Vec<Statement>,
}

impl Source {
    pub fn facts(&self) -> impl Iterator<Item = &Fact> {
        self.statements.iter().filter_map(|statement| match statement {
            Statement::Fact(fact) => Some(fact),
            _ => None,
        })
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.statements.iter().filter_map(|statement| match statement {
            Statement::Rule(rule) => Some(rule),
            _ => None,
        })
    }

    pub fn goals(&self) -> impl Iterator<Item = &Term> {
        self.statements.iter().filter_map(|statement| match statement {
            Statement::Goal(goal) => Some(goal),
            _ => None,
        })
    }

    pub fn declarations(&self) -> impl Iterator<Item = Functor> + '_ {
        self.statements
            .iter()
            .filter_map(|statement| match statement {
                Statement::Declare(functors) => Some(functors.iter().copied()),
                _ => None,
            })
            .flatten()
    }
}

/// Parser for a small Prolog-like syntax.
///
/// Variables start with an uppercase letter or `_`; a lone `_` is a fresh
/// variable at each occurrence. Atoms start with a lowercase letter.
/// Numbers are signed 64-bit integers. `%` starts a comment.
pub struct Parser<'a> {
    symbols: &'a SymbolTable,
}

/// Variable names of one statement.
#[derive(Default)]
struct Scope {
    names: RefCell<HashMap<String, VariableId>>,
    next: RefCell<u32>,
}

impl Scope {
    fn variable(&self, name: &str) -> VariableId {
        if name == "_" {
            return self.fresh();
        }
        if let Some(id) = self.names.borrow().get(name) {
            return *id;
        }
        let id = self.fresh();
        self.names.borrow_mut().insert(name.to_string(), id);
        id
    }

    fn fresh(&self) -> VariableId {
        let mut next = self.next.borrow_mut();
        let id = VariableId::new(*next);
        *next += 1;
        id
    }
}

impl<'a> Parser<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self { symbols }
    }

    pub fn symbols(&self) -> &SymbolTable {
        self.symbols
    }

    /// Parse a single term. Variables are numbered from zero in order of
    /// first occurrence.
    pub fn parse_term(&self, text: &str) -> Result<Term, ParseError> {
        self.term(strip_period(text), &Scope::default())
    }

    /// Parse a ground fact such as `on_line(a, l1).`
    pub fn parse_fact(&self, text: &str) -> Result<Fact, ParseError> {
        let term = self.parse_term(text)?;
        if term.is_variable() || matches!(term, Term::Number(_)) {
            return Err(ParseError::new(1, 1, "a fact must be an atom or structure"));
        }
        Fact::new(term).ok_or_else(|| ParseError::new(1, 1, "a fact must be ground"))
    }

    /// Parse `head :- goal, ... .` or a bare head.
    pub fn parse_rule(&self, text: &str) -> Result<Rule, ParseError> {
        let text = strip_period(text);
        let scope = Scope::default();
        match find_top_level(text, ":-") {
            Some(index) => {
                let head = self.term(&text[..index], &scope)?;
                let body_text = &text[index + 2..];
                let goals = split_top_level(body_text, |ch| ch == ',');
                if goals.is_empty() {
                    return Err(ParseError::new(1, index + 3, "rule body is empty"));
                }
                let body = goals
                    .into_iter()
                    .map(|goal| self.term(goal, &scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Rule::new(head, body))
            }
            None => Ok(Rule::new(self.term(text, &scope)?, Vec::new())),
        }
    }

    /// Classify and parse one statement.
    pub fn parse_statement(&self, text: &str) -> Result<Statement, ParseError> {
        let trimmed = text.trim();
        if let Some(goal) = trimmed.strip_prefix("?-") {
            return Ok(Statement::Goal(self.parse_term(goal)?));
        }
        if let Some(directive) = trimmed.strip_prefix(":-") {
            return self.directive(strip_period(directive));
        }
        let rule = self.parse_rule(trimmed)?;
        if rule.body.is_empty() {
            if let Some(fact) = Fact::new(rule.head.clone()) {
                return Ok(Statement::Fact(fact));
            }
        }
        Ok(Statement::Rule(rule))
    }

    /// Parse a whole source text. Statements end with a `.` outside
    /// parentheses followed by whitespace or the end of input.
    pub fn parse_str(&self, source: &str) -> Result<Source, ParseError> {
        let mut statements = Vec::new();
        for (line, text) in split_statements(source)? {
            let statement = self
                .parse_statement(&text)
                .map_err(|err| err.at_line(line))?;
            statements.push(statement);
        }
        Ok(Source { statements })
    }

    fn directive(&self, text: &str) -> Result<Statement, ParseError> {
        let text = text.trim();
        let inner = text
            .strip_prefix("declare(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| {
                ParseError::new(1, 1, format!("unsupported directive `{}`", text))
            })?;
        let functors = split_top_level(inner, |ch| ch == ',')
            .into_iter()
            .map(|spec| self.predicate_indicator(spec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Statement::Declare(functors))
    }

    fn predicate_indicator(&self, text: &str) -> Result<Functor, ParseError> {
        let (name, arity) = text.rsplit_once('/').ok_or_else(|| {
            ParseError::new(1, 1, format!("expected name/arity, found `{}`", text))
        })?;
        let name = name.trim();
        if !is_atom_name(name) {
            return Err(ParseError::new(1, 1, format!("invalid predicate name `{}`", name)));
        }
        let arity = arity
            .trim()
            .parse::<u8>()
            .map_err(|_| ParseError::new(1, 1, format!("invalid arity in `{}`", text)))?;
        Ok(Functor::new(self.symbols.intern(name), arity))
    }

    fn term(&self, text: &str, scope: &Scope) -> Result<Term, ParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ParseError::new(1, 1, "empty term"));
        }

        if let Some(open_paren) = text.find('(') {
            let close_paren = matching_paren_index(text, open_paren)
                .ok_or_else(|| ParseError::new(1, open_paren + 1, "unterminated term"))?;
            if close_paren + 1 != text.len() {
                return Err(ParseError::new(
                    1,
                    close_paren + 2,
                    format!("unexpected text after `{}`", &text[..=close_paren]),
                ));
            }
            let name = text[..open_paren].trim();
            if !is_atom_name(name) {
                return Err(ParseError::new(1, 1, format!("invalid functor name `{}`", name)));
            }
            let args = split_top_level(&text[open_paren + 1..close_paren], |ch| ch == ',')
                .into_iter()
                .map(|arg| self.term(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            if args.len() > u8::MAX as usize {
                return Err(ParseError::new(1, 1, format!("too many arguments for `{}`", name)));
            }
            return Ok(Term::structure(self.symbols.intern(name), args));
        }

        if is_variable_name(text) {
            return Ok(Term::variable(scope.variable(text)));
        }
        if is_atom_name(text) {
            return Ok(Term::atom(self.symbols.intern(text)));
        }
        if let Ok(value) = text.parse::<i64>() {
            return Ok(Term::number(value));
        }
        Err(ParseError::new(1, 1, format!("unsupported token `{}`", text)))
    }
}

fn is_variable_name(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(ch) if ch.is_ascii_uppercase() || ch == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn is_atom_name(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(ch) if ch.is_ascii_lowercase())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn strip_period(text: &str) -> &str {
    let text = text.trim();
    text.strip_suffix('.').unwrap_or(text)
}

fn strip_comment(line: &str) -> &str {
    if let Some(idx) = line.find('%') { &line[..idx] } else { line }
}

/// Split a source into `(line, statement)` pairs, comments removed.
fn split_statements(source: &str) -> Result<Vec<(usize, String)>, ParseError> {
    let mut statements = Vec::new();
    let mut buffer = String::new();
    let mut start_line = 1;
    let mut depth = 0i32;

    for (index, raw) in source.lines().enumerate() {
        let line = strip_comment(raw);
        let mut chars = line.chars().peekable();
        while let Some(ch) = chars.next() {
            if buffer.trim().is_empty() {
                start_line = index + 1;
            }
            match ch {
                '(' => depth += 1,
                ')' => depth -= 1,
                '.' if depth == 0
                    && chars.peek().map_or(true, |next| next.is_whitespace()) =>
                {
                    statements.push((start_line, std::mem::take(&mut buffer)));
                    continue;
                }
                _ => {}
            }
            buffer.push(ch);
        }
        buffer.push(' ');
    }

    if !buffer.trim().is_empty() {
        return Err(ParseError::new(
            start_line,
            1,
            "statement is missing its terminating `.`",
        ));
    }
    Ok(statements)
}

fn split_top_level<F>(text: &str, is_sep: F) -> Vec<&str>
where
    F: Fn(char) -> bool,
{
    let mut parts = Vec::new();
    let mut depth_paren = 0i32;
    let mut start = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' => depth_paren += 1,
            ')' => depth_paren -= 1,
            _ if depth_paren == 0 && is_sep(ch) => {
                parts.push(text[start..idx].trim());
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    if parts.iter().all(|part| part.is_empty()) {
        return Vec::new();
    }
    parts
}

fn find_top_level(text: &str, needle: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ if depth == 0 && text[idx..].starts_with(needle) => return Some(idx),
            _ => {}
        }
    }
    None
}

fn matching_paren_index(text: &str, open_index: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (idx, ch) in text.char_indices().skip_while(|(idx, _)| *idx < open_index) {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}
