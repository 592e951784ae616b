//! End-to-end: the Michael–Scott-style queue with a forward-everything
//! outflow and footprint depth 2.

mod common;

use keyflow_prove::{check_linearizability, Verdict};
use keyflow_tests::michael_scott_queue_fixture;

#[test]
fn michael_scott_queue_is_linearizable() {
    common::init();
    let fixture = michael_scott_queue_fixture();
    let verdict = check_linearizability(&fixture.program, &fixture.config).unwrap();
    assert_eq!(verdict, Verdict::Linearizable, "verdict: {}", verdict);
}
