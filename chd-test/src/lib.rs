//! A symbol table built by the build script and loaded straight from the binary.

use chd::{Error, Table};
use std::sync::OnceLock;

/// The encoded table, embedded at compile time.
static SYMBOLS: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/symbols.chd"));

/// Get the embedded symbol table.
///
/// The table is loaded without copying on first use and shared afterwards.
///
/// # Errors
///
/// Fails if the embedded table was written by an incompatible version of `chd`.
#[inline]
pub fn symbols() -> Result<&'static Table<'static>, &'static Error> {
    static TABLE: OnceLock<chd::Result<Table<'static>>> = OnceLock::new();
    TABLE
        .get_or_init(|| Table::load_from_bytes(SYMBOLS, false))
        .as_ref()
}

/// Look up the address of a symbol.
#[inline]
pub fn address(name: &str) -> Option<u64> {
    symbols().ok()?.get_u64(name.as_bytes())
}
