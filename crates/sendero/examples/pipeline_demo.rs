//! Full pipeline walkthrough: author a nested model, generate its test
//! cases, print the DOT rendering of each case diagram, then administer
//! everything against the loopback connection.
//!
//! ```sh
//! RUST_LOG=debug cargo run --example pipeline_demo
//! ```

use sendero::{
    shared, to_dot, DummyAttribute, Graph, LoopbackConnection, SenderoResult, State, TestAdmin,
    TestCaseGenerator, Value,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn build_model() -> SenderoResult<Graph> {
    // Mixing superstate: Fill then Agitate
    let mut mixing = Graph::new("mixing");
    let fill = mixing.add_state(State::new("Fill").with_attribute(shared(
        DummyAttribute::new("TANK/FILL_VALVE").with_target(Value::Float(1.0)),
    )))?;
    let agitate = mixing.add_state(State::new("Agitate").with_attribute(shared(
        DummyAttribute::new("TANK/AGITATOR").with_target(Value::Float(1.0)),
    )))?;
    mixing.connect(fill, agitate, vec![shared(DummyAttribute::new("TANK/LEVEL_OK"))]);

    // Top level: Idle -> Mixing -> (Discharge | Drain)
    let mut model = Graph::new("batch_plant");
    let idle = model.add_state(State::new("Idle"))?;
    let mix = model.add_state(State::new("Mixing").with_subgraph(mixing))?;
    let discharge = model.add_state(State::new("Discharge"))?;
    let drain = model.add_state(State::new("Drain"))?;
    model.connect(idle, mix, vec![shared(DummyAttribute::new("SEQ/START"))]);
    model.connect(
        mix,
        discharge,
        vec![shared(
            DummyAttribute::new("QA/PASS").with_target(Value::Float(1.0)),
        )],
    );
    model.connect(
        mix,
        drain,
        vec![shared(
            DummyAttribute::new("QA/FAIL").with_target(Value::Float(1.0)),
        )],
    );
    Ok(model)
}

fn main() -> SenderoResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut generator = TestCaseGenerator::new(build_model()?);
    generator.generate()?;
    println!(
        "generated {} cases, flattened complexity {}",
        generator.cases().len(),
        generator.complexity()?
    );
    for case in generator.cases() {
        println!("\n== {} ==\n{}", case.name(), to_dot(case.diagram()));
    }

    let admin = TestAdmin::new(Arc::new(LoopbackConnection::new()));
    let results = admin.run_all(generator.cases_mut());
    for (case, result) in generator.cases().iter().zip(results) {
        println!("{}: {:?}", case.name(), result?);
    }

    for report in generator.reports() {
        println!("{}", report.to_json()?);
    }
    Ok(())
}
