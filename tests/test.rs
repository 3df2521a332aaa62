use std::sync::Arc;

use geowam::data::Heap;
use geowam::machine::State;
use geowam::{
    EngineConfig, FactSource, FactStore, Machine, Parser, Program, SymbolTable, Term,
    TermKind,
};

#[test]
fn symbol_table_interning() {
    let table = SymbolTable::new();
    let first = table.intern("on_line");
    let second = table.intern("on_line");
    assert_eq!(first, second, "interning must avoid duplicates");
    assert_eq!(table.name(first).as_deref(), Some("on_line"));
    assert_eq!(table.len(), 1);
}

#[test]
fn parsed_terms_have_expected_kinds() {
    let table = SymbolTable::new();
    let parser = Parser::new(&table);
    assert_eq!(parser.parse_term("a").expect("atom").kind(), TermKind::Atom);
    assert_eq!(parser.parse_term("X").expect("var").kind(), TermKind::Variable);
    assert_eq!(parser.parse_term("7").expect("number").kind(), TermKind::Number);
    let term = parser.parse_term("cong(A, B, A, c)").expect("struct");
    assert_eq!(term.kind(), TermKind::Struct);
    assert_eq!(term.variables().len(), 2);
}

#[test]
fn heap_round_trips_nested_terms() {
    let table = SymbolTable::new();
    let term = Parser::new(&table)
        .parse_term("eqangle(angle(a, b, c), angle(d, e, f))")
        .expect("term");
    let mut heap = Heap::new();
    let addr = heap.load_ground(&term).expect("load");
    assert_eq!(heap.extract(addr).expect("extract"), term);
    assert!(heap.is_ground(addr).expect("ground check"));
}

#[test]
fn program_listing_shows_compiled_code() {
    let table = Arc::new(SymbolTable::new());
    let parser = Parser::new(&table);
    let mut program = Program::new(table.clone(), &EngineConfig::default());
    program.declare_name("on_line", 2);
    let rule = parser
        .parse_rule("same(P, Q) :- on_line(P, L), on_line(Q, L).")
        .expect("rule");
    program.add_rule(rule).expect("compiles");

    let listing = program.listing();
    assert!(listing.contains("allocate 3"));
    assert!(listing.contains("call on_line/2"));
    assert!(listing.trim_end().ends_with("proceed"));
}

#[test]
fn machine_enumerates_then_fails() {
    let table = Arc::new(SymbolTable::new());
    let parser = Parser::new(&table);
    let store = FactStore::with_facts(
        ["point(a)", "point(b)"]
            .iter()
            .map(|text| parser.parse_fact(text).expect("fact")),
    );
    let mut program = Program::new(table.clone(), &EngineConfig::default());
    program.declare_facts(&store);
    let id = program
        .add_rule(parser.parse_rule("p(X) :- point(X).").expect("rule"))
        .expect("compiles");

    let config = EngineConfig::default();
    let mut machine = Machine::new(&program, &store, &config);
    assert_eq!(machine.state(), State::Idle);
    machine.start(id, None).expect("starts");

    let first = machine.next_solution().expect("runs").expect("first solution");
    assert_eq!(machine.state(), State::Succeeded);
    assert_eq!(first.head, parser.parse_term("p(a)").expect("term"));
    let second = machine.next_solution().expect("runs").expect("second solution");
    assert_eq!(second.head, parser.parse_term("p(b)").expect("term"));
    assert!(machine.next_solution().expect("runs").is_none());
    assert_eq!(machine.state(), State::Failed);
    assert_eq!(machine.statistics().solutions, 2);
    assert_eq!(store.len(), 2, "the machine never asserts");
    assert!(matches!(first.head, Term::Struct { .. }));
}
