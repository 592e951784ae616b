//! End-to-end: the lock-coupling set — hand-over-hand locking rendered
//! as per-step atomic sections over the sorted list.

mod common;

use keyflow_prove::{check_linearizability, Verdict};
use keyflow_tests::lock_coupling_fixture;

#[test]
fn lock_coupling_set_is_linearizable() {
    common::init();
    let fixture = lock_coupling_fixture();
    let verdict = check_linearizability(&fixture.program, &fixture.config).unwrap();
    assert_eq!(verdict, Verdict::Linearizable, "verdict: {}", verdict);
}
