#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Exercise the raw-byte deserialization path (includes serde_json's
    // own UTF-8 validation and error handling for invalid sequences).
    let _ = serde_json::from_slice::<connect_four_client::protocol::ServerMessage>(data);

    // Also exercise the str-based decode path used by the session loop.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = connect_four_client::protocol::ServerMessage::decode(s);
    }
});
