//! Rendering of diagnostics collected over a whole program

use insta::assert_snapshot;
use pipelang_core::agg_types::AggregateTable;
use pipelang_core::ast::{Block, ProgramBuilder, StmtKind, TypeExpr};
use pipelang_core::infer::infer_program;

#[test]
fn test_all_errors_are_reported_in_one_run() {
    let mut b = ProgramBuilder::new();

    // let v = 300u16;
    let wide = b.lit(300, Some(16));
    let v = b.let_("v", None, wide);

    // let c: u8 = v;
    b.at(2, 1);
    let use_v = b.var("v", v);
    b.let_("c", Some(TypeExpr::uint(8)), use_v);

    // let p: port u8 = port "p"; if p {}
    b.at(3, 1);
    let def = b.port_def("p");
    let p = b.let_("p", Some(TypeExpr::Port(Box::new(TypeExpr::uint(8)))), def);
    b.at(4, 1);
    let cond = b.var("p", p);
    let stmt = b.stmt(StmtKind::If {
        cond,
        then_body: Block::default(),
        else_body: None,
    });
    b.push(stmt);

    // let w = v.z;
    b.at(5, 7);
    let base = b.var("v", v);
    let proj = b.field(base, "z");
    b.at(5, 1);
    b.let_("w", None, proj);

    let mut program = b.finish();
    let report = infer_program(&mut program, &AggregateTable::new());
    assert!(!report.is_ok());

    let rendered = report.diagnostics.to_string();
    assert_snapshot!(rendered.trim_end(), @r"
    5:7: error: no aggregate type declares field `z`
    2:1: error: could not unify types (`u8` vs `u16`)
    3:1: error: expected a simple value (scalar or aggregate), found `port u8`
    ");
}

#[test]
fn test_into_result_error_message() {
    let mut b = ProgramBuilder::new();
    b.at(7, 3);
    let value = b.lit(1, Some(4));
    let bad = b.slice(value, 1, 2);
    b.let_("x", None, bad);

    let mut program = b.finish();
    let err = infer_program(&mut program, &AggregateTable::new())
        .into_result()
        .unwrap_err();
    assert_snapshot!(format!("{err:#}"), @"7:3: error: bit slice [1:2] has its high bit below its low bit: type inference failed with 1 error(s)");
}
