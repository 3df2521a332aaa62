//! Saturate a small geometry problem and ask a follow-up goal.
//!
//! Run with `cargo run --example basic`.

use geowam::{EngineBuilder, EngineConfig, EngineResult};

const PROBLEM: &str = r#"
% Points on two lines through a.
on_line(a, l1). on_line(b, l1). on_line(c, l1).
on_line(a, l2). on_line(d, l2).
perp(l1, l3). perp(l2, l4). perp(l5, l3).

coll(A, B, C) :- on_line(A, L), on_line(B, L), on_line(C, L), distinct(A, B, C).
para(X, Y) :- perp(X, M), perp(Y, M), neq(X, Y).

?- coll(a, b, X).
"#;

fn main() -> EngineResult<()> {
    let mut engine = EngineBuilder::new()
        .with_config(EngineConfig::default())
        .build_str(PROBLEM)?;

    println!("Compiled rules:\n{}\n", engine.program().listing());

    let saturation = engine.saturate()?;
    println!("Derived {} facts in {} rounds:", saturation.new_facts.len(), saturation.rounds);
    for fact in &saturation.new_facts {
        println!("  {}.", fact.display(engine.symbols()));
    }

    for goal in engine.goals().to_vec() {
        let derivation = engine.solve(&goal)?;
        println!("\n?- {}.", goal.display(engine.symbols()));
        for solution in derivation.solutions() {
            println!("  {}", solution.head.display(engine.symbols()));
        }
    }

    println!("\nStatistics:\n{}", engine.statistics());
    Ok(())
}
