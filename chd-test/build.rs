use chd::{Builder, ValueMode};
use std::path::PathBuf;

/// Number of symbols in the prebuilt table.
const SYMBOLS: u64 = 20000;

fn main() {
    println!("cargo::rerun-if-changed=build.rs");

    let mut builder = Builder::new(ValueMode::UInt64, SYMBOLS as usize);
    for i in 0..SYMBOLS {
        builder.add_uvarint64(format!("sym_{i}"), i * 7);
    }
    let table = builder.build().expect("Failed to build symbol table");

    let out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());
    let file = std::fs::File::create(out_dir.join("symbols.chd")).expect("Failed to create file");
    table.write(file).expect("Failed to write symbol table");
}
