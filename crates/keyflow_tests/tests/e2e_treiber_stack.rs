//! End-to-end: the Treiber-style stack — no flow reasoning, data used
//! only for equality — passes with footprint depth 1.

mod common;

use keyflow_prove::{check_linearizability, Verdict};
use keyflow_tests::treiber_stack_fixture;

#[test]
fn treiber_stack_is_linearizable() {
    common::init();
    let fixture = treiber_stack_fixture();
    let verdict = check_linearizability(&fixture.program, &fixture.config).unwrap();
    assert_eq!(verdict, Verdict::Linearizable, "verdict: {}", verdict);
}
