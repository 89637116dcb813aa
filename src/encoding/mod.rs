//! Document encoding/decoding for storage
//!
//! Resources are stored as indented JSON text followed by a newline so the
//! files stay readable and diff cleanly.

pub mod document;

pub use document::{decode, encode};
