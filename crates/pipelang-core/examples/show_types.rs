//! Build a small pipeline program, infer its types and print every binding.
//!
//! ```text
//! cargo run --example show_types [options.toml]
//! RUST_LOG=pipelang_core=trace cargo run --example show_types
//! ```

use anyhow::{Context, Result};
use pipelang_core::agg_types::AggregateTable;
use pipelang_core::ast::{BinOp, ProgramBuilder, SlotId, TypeExpr};
use pipelang_core::config::InferOptions;
use pipelang_core::infer::infer_program_with;
use pipelang_core::types::ConcreteType;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            InferOptions::from_toml_str(&text).with_context(|| format!("parsing {path}"))?
        }
        None => InferOptions::default(),
    };

    let mut aggs = AggregateTable::new();
    aggs.define(
        "Packet",
        [("tag", ConcreteType::bits(4)), ("payload", ConcreteType::bits(12))],
    )?;

    let mut b = ProgramBuilder::new();
    let mut bindings: Vec<(&str, SlotId)> = Vec::new();

    // let input = port "input";
    let def = b.port_def("input");
    let input = b.let_("input", Some(TypeExpr::Port(Box::new(TypeExpr::named("Packet")))), def);
    bindings.push(("input", input));

    // let pkt = read input;
    b.at(2, 1);
    let port = b.var("input", input);
    let read = b.port_read(port);
    let pkt = b.let_("pkt", None, read);
    bindings.push(("pkt", pkt));

    // let acc = reg(0u12);
    b.at(3, 1);
    let zero = b.lit(0, Some(12));
    let def = b.reg_def(Some(zero));
    let acc = b.let_("acc", None, def);
    bindings.push(("acc", acc));

    // let sum = *acc + pkt.payload;
    b.at(4, 1);
    let reg = b.var("acc", acc);
    let current = b.reg_ref(reg);
    let packet = b.var("pkt", pkt);
    let payload = b.field(packet, "payload");
    let add = b.binary(BinOp::Add, current, payload);
    let sum = b.let_("sum", None, add);
    bindings.push(("sum", sum));

    // let word = {pkt.tag, sum};
    b.at(5, 1);
    let packet = b.var("pkt", pkt);
    let tag = b.field(packet, "tag");
    let total = b.var("sum", sum);
    let joined = b.concat(vec![tag, total]);
    let word = b.let_("word", None, joined);
    bindings.push(("word", word));

    // write output, word as Packet;
    b.at(6, 1);
    let def = b.port_def("output");
    let output = b.let_("output", None, def);
    bindings.push(("output", output));
    let port = b.var("output", output);
    let value = b.var("word", word);
    let packed = b.cast(TypeExpr::named("Packet"), value);
    b.write(port, packed);

    let mut program = b.finish();
    let report = infer_program_with(&mut program, &aggs, &options);

    println!("=== Inferred types ===");
    for (name, slot) in &bindings {
        println!("  {name:8} : {}", program.slots.get(*slot));
    }

    let stats = report.into_result()?;
    println!();
    println!(
        "{} nodes, {} edges, fixpoint after {} passes, {} slots typed",
        stats.nodes, stats.edges, stats.passes, stats.slots
    );
    Ok(())
}
