//! Training file decoding must never panic on arbitrary content.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&width, body)) = data.split_first() else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("train.bin");
    std::fs::write(&path, body).unwrap();

    if let Ok(vectors) = annvault::read_training_file(&path, usize::from(width)) {
        assert_eq!(vectors.cols(), usize::from(width));
    }
});
