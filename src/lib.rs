//! A small document store that keeps every record as a JSON file.
//!
//! Records ("resources") are grouped into collections, one directory per
//! collection under a root directory. See [`Store`] for the operations.

pub mod config;
pub mod encoding;
pub mod error;
pub mod protocol;
pub mod server;
pub mod store;
pub mod util;

pub use error::{ErrorKind, Result, StoreError};
pub use store::{Options, Store, VERSION};
