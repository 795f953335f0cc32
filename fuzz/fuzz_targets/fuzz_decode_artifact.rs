//! Arbitrary bytes must decode to an index or a storage error, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(index) = annvault::storage::decode(data) {
        // A decoded index must be internally consistent enough to query.
        if let Some(dim) = index.dimension() {
            let query = annvault::Matrix::filled(1, dim, 0.0f32);
            let _ = index.query(&query, 3);
        }
    }
});
