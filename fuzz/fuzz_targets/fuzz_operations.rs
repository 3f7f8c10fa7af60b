#![no_main]
use arbitrary::Arbitrary;
use compound_rs::CompoundFile;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Operation {
    Write { path: u8, len: u16, fill: u8 },
    Delete { path: u8 },
    DeleteAll { path: u8 },
    CreateDir { path: u8 },
    Rename { path: u8, to: u8 },
}

const PATHS: [&str; 8] = ["A", "B", "Dir/A", "Dir/B", "Dir/Sub/C", "Other/D", "Dir", "Dir/Sub"];

fn path(index: u8) -> &'static str {
    PATHS[index as usize % PATHS.len()]
}

// Any sequence of path operations must leave a file that reloads cleanly.
fuzz_target!(|ops: Vec<Operation>| {
    let mut file = match CompoundFile::in_memory() {
        Ok(file) => file,
        Err(_) => return,
    };

    for op in ops.iter().take(64) {
        let _ = match *op {
            Operation::Write { path: p, len, fill } => {
                file.write(path(p), &vec![fill; len as usize % 20_000])
            }
            Operation::Delete { path: p } => file.delete(path(p)),
            Operation::DeleteAll { path: p } => file.delete_all(path(p)),
            Operation::CreateDir { path: p } => file.create_dir(path(p)),
            Operation::Rename { path: p, to } => {
                let name = path(to).rsplit('/').next().unwrap_or("X");
                file.rename(path(p), name)
            }
        };
    }

    let report = file.check_integrity().expect("integrity check failed to run");
    assert!(report.is_clean(), "{:?}", report.issues);

    let bytes = file.into_bytes().expect("flush failed");
    let reopened = CompoundFile::from_bytes(bytes).expect("reload failed");
    assert!(reopened.check_integrity().unwrap().is_clean());
});
