#![no_main]

use libfuzzer_sys::fuzz_target;

use charter_ledger::VersionRecord;

// Parsing an exported version record must never panic, and anything that
// parses must still verify after being written back out.
fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(record) = VersionRecord::parse(input) else {
        return;
    };
    assert!(record.verify().is_ok());

    let json = record.to_json().expect("parsed record must serialize");
    let reparsed = VersionRecord::parse(&json).expect("exported record must re-import");
    assert_eq!(reparsed.metadata.content_hash, record.metadata.content_hash);
    assert_eq!(reparsed.metadata.version, record.metadata.version);
});
