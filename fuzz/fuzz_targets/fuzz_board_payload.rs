#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (Vec<Vec<u8>>, u8)| {
    // Shape validation must reject or accept, never panic.
    let (grid, current_player) = input;
    let _ = connect_four_client::Board::from_wire(&grid, current_player);
});
