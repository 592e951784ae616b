//! End-to-end: the Vechev-style DCAS set — updates validate the edge and
//! both adjacent values inside one atomic section, delete compares the
//! word pair `(l->next, r->next)` — under the sorted-list flow domain
//! with footprint depth 1.

mod common;

use keyflow_prove::{check_linearizability, Verdict};
use keyflow_tests::dcas_set_fixture;

#[test]
fn dcas_set_is_linearizable_at_depth_one() {
    common::init();
    let fixture = dcas_set_fixture();
    assert_eq!(fixture.config.max_footprint_depth, 1);
    let verdict = check_linearizability(&fixture.program, &fixture.config).unwrap();
    assert_eq!(verdict, Verdict::Linearizable, "verdict: {}", verdict);
}

#[test]
fn verdict_is_deterministic() {
    common::init();
    let fixture = dcas_set_fixture();
    let first = check_linearizability(&fixture.program, &fixture.config).unwrap();
    let second = check_linearizability(&fixture.program, &fixture.config).unwrap();
    assert_eq!(first, second);
}
