//! Fuzz harness for the create operations.
//!
//! Arbitrary bytes are fed to both `create_proof_record` and `create_ticket`.
//! Neither may panic, and both must always answer with a JSON object carrying
//! a boolean `success`.

#![no_main]
use libfuzzer_sys::fuzz_target;
use proofledger_core::prelude::*;

fn assert_response(body: &str) {
    let value: serde_json::Value =
        serde_json::from_str(body).unwrap_or_else(|e| panic!("response is not JSON ({e}): {body}"));
    assert!(value["success"].is_boolean(), "missing success flag: {body}");
}

fuzz_target!(|data: &[u8]| {
    let Ok(payload) = std::str::from_utf8(data) else {
        return;
    };

    let contract = ProofRecordsContract::new(InMemoryLedgerStore::new(), UnresolvedIdentity)
        .with_clock(FixedClock::from_millis(0));

    assert_response(&contract.create_proof_record(payload));
    assert_response(&contract.create_ticket(payload));
    // A second submission exercises the duplicate path.
    assert_response(&contract.create_ticket(payload));
    assert_response(&contract.compare_weights_by_press_increment("true"));
});
