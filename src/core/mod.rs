//! Compound file engine
//!
//! Leaf modules first: header codec and sector image, allocation tables,
//! mini store, stream engine, entry tree, then the [`Filesystem`] facade
//! that ties them together.

pub mod allocator;
pub mod catalog;
pub mod error;
pub mod filesystem;
pub mod header;
pub mod integrity;
pub mod io;
pub mod layout;
pub mod magic;
pub mod ministore;
pub mod options;
pub mod stream;
pub mod validation;

pub use filesystem::{EntrySummary, Filesystem, FilesystemStats, Loaded};
