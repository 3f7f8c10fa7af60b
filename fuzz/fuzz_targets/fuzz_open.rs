#![no_main]
use compound_rs::{Filesystem, Options};
use libfuzzer_sys::fuzz_target;
use std::io::Read;

// Arbitrary bytes must either fail to load or load into something that can
// be walked, read and re-serialized without panicking.
fuzz_target!(|data: &[u8]| {
    let loaded = match Filesystem::load(data.to_vec(), Options::default()) {
        Ok(loaded) => loaded,
        Err(_) => return,
    };
    let fs = loaded.filesystem;

    let _ = fs.check_integrity();
    let _ = fs.stats();
    let _ = fs.describe_json();

    let mut pending = vec![fs.root()];
    while let Some(id) = pending.pop() {
        if let Ok(children) = fs.children(id) {
            pending.extend_from_slice(children);
        }
        if let Ok(mut reader) = fs.document_reader(id) {
            let mut sink = Vec::new();
            let _ = reader.read_to_end(&mut sink);
        }
    }

    let mut sink = Vec::new();
    let _ = fs.write_to(&mut sink);
});
