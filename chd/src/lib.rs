//! Static perfect hash tables with a zero-copy binary format.
//!
//! This crate builds [perfect hash tables][phf] with the CHD ("Compress, Hash, and Displace")
//! algorithm. A table maps a fixed set of byte-string keys to values without collisions, so a
//! lookup is one bucket probe and one slot probe. Tables are immutable: to change the key set,
//! build a new table.
//!
//! [phf]: https://en.wikipedia.org/wiki/Perfect_hash_function
//!
//!
//! # Usage
//!
//! Entries are collected with a [`Builder`] and turned into a [`Table`] by [`Builder::build`].
//! Values are either opaque byte strings or unsigned 64-bit integers, chosen per builder with
//! [`ValueMode`].
//!
//! A table can be written out with [`Table::write`] and loaded back with
//! [`Table::load_from_bytes`]. Loading validates the buffer once and then answers lookups directly
//! from it, which makes the format suitable for memory-mapped indexes.
//!
//! ```rust
//! # fn main() -> chd::Result<()> {
//! use chd::{Builder, Table, Value, ValueMode};
//!
//! let mut builder = Builder::new(ValueMode::Bytes, 2);
//! builder.add("one", "1");
//! builder.add("two", "2");
//! let table = builder.build()?;
//!
//! let mut bytes = Vec::new();
//! table.write(&mut bytes)?;
//!
//! let loaded: Table = Table::load_from_bytes(&bytes, false)?;
//! assert_eq!(loaded.get(b"two"), Some(Value::Bytes(b"2")));
//! assert_eq!(loaded.get(b"three"), None);
//! # Ok(())
//! # }
//! ```
//!
//!
//! # Sizing
//!
//! For `K` keys, the builder allocates `m = max(1, K)` buckets and `n = 1 + 2m` slots. The table is
//! perfect but not minimal: about half of the slots stay empty, which keeps construction fast.
//! Both the bucket count and the number of distinct displacement seeds are limited to 16 bits.

#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub(crate) mod bitmap;
#[cfg(feature = "build")]
pub(crate) mod bucket;
#[cfg(feature = "build")]
mod builder;
mod error;
pub(crate) mod format;
pub mod hash;
mod table;
mod value;

#[cfg(feature = "build")]
pub use builder::Builder;
pub use error::{Error, Result};
pub use table::{Iter, Table};
pub use value::{Value, ValueMode};

#[cfg(all(test, feature = "build"))]
mod tests;
