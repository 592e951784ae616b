//! End-to-end: the sorted singly-linked list set with `MIN`/`MAX`
//! sentinels verifies as linearizable, and the verdict is deterministic
//! across runs.

mod common;

use keyflow_prove::{check_linearizability, Verdict};
use keyflow_tests::sorted_list_fixture;

#[test]
fn sorted_list_set_is_linearizable() {
    common::init();
    let fixture = sorted_list_fixture(2);
    let verdict = check_linearizability(&fixture.program, &fixture.config).unwrap();
    assert_eq!(verdict, Verdict::Linearizable, "verdict: {}", verdict);
}

#[test]
fn verdict_is_deterministic() {
    common::init();
    let fixture = sorted_list_fixture(2);
    let first = check_linearizability(&fixture.program, &fixture.config).unwrap();
    let second = check_linearizability(&fixture.program, &fixture.config).unwrap();
    assert_eq!(first, second);
}
